use std::io::{Read, Write};

use qfit_geom::UnitCell;

use crate::density::DensityGrid;
use crate::error::FitError;

/// Reads and writes the CCP4/MRC binary density-map format: a 1024-byte
/// header followed by a flat array of `f32` voxels in (x fastest, then y,
/// then z) order. MTZ reflection files are out of scope entirely — this
/// format is the only map representation the fitter consumes (SPEC_FULL §6B).
pub struct DensityMap;

const HEADER_BYTES: usize = 1024;

impl DensityMap {
    /// Parses a CCP4/MRC grid from a reader into a [`DensityGrid`] forced to
    /// space group P1, as the working model grid always is.
    pub fn read<R: Read>(mut reader: R) -> Result<DensityGrid, FitError> {
        let mut header = [0u8; HEADER_BYTES];
        reader.read_exact(&mut header).map_err(FitError::IoFailure)?;

        let nx = read_i32(&header, 0) as usize;
        let ny = read_i32(&header, 4) as usize;
        let nz = read_i32(&header, 8) as usize;

        let a = read_f32(&header, 40) as f64;
        let b = read_f32(&header, 44) as f64;
        let c = read_f32(&header, 48) as f64;
        let alpha = read_f32(&header, 52) as f64;
        let beta = read_f32(&header, 56) as f64;
        let gamma = read_f32(&header, 60) as f64;

        let unit_cell = UnitCell::new(a, b, c, alpha, beta, gamma, "P 1").to_p1();
        let mut grid = DensityGrid::new(unit_cell, nx, ny, nz);

        let mut voxel_bytes = vec![0u8; nx * ny * nz * 4];
        reader.read_exact(&mut voxel_bytes).map_err(FitError::IoFailure)?;
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let offset = ((k * ny + j) * nx + i) * 4;
                    let value = f32::from_le_bytes(voxel_bytes[offset..offset + 4].try_into().unwrap()) as f64;
                    grid.set_raw(i, j, k, value);
                }
            }
        }
        Ok(grid)
    }

    /// Writes a [`DensityGrid`] back out in CCP4/MRC binary form.
    pub fn write<W: Write>(grid: &DensityGrid, mut writer: W) -> Result<(), FitError> {
        let mut header = [0u8; HEADER_BYTES];
        write_i32(&mut header, 0, grid.nx as i32);
        write_i32(&mut header, 4, grid.ny as i32);
        write_i32(&mut header, 8, grid.nz as i32);
        write_f32(&mut header, 40, grid.unit_cell.a as f32);
        write_f32(&mut header, 44, grid.unit_cell.b as f32);
        write_f32(&mut header, 48, grid.unit_cell.c as f32);
        write_f32(&mut header, 52, grid.unit_cell.alpha as f32);
        write_f32(&mut header, 56, grid.unit_cell.beta as f32);
        write_f32(&mut header, 60, grid.unit_cell.gamma as f32);
        writer.write_all(&header).map_err(FitError::IoFailure)?;

        for k in 0..grid.nz {
            for j in 0..grid.ny {
                for i in 0..grid.nx {
                    let v = grid.get(i, j, k) as f32;
                    writer.write_all(&v.to_le_bytes()).map_err(FitError::IoFailure)?;
                }
            }
        }
        Ok(())
    }
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

fn read_f32(buf: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_f32(buf: &mut [u8], offset: usize, value: f32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_map_reparses_to_the_same_dimensions_and_cell() {
        let grid = DensityGrid::new(UnitCell::new(20.0, 21.0, 22.0, 90.0, 90.0, 90.0, "P 1"), 8, 9, 10);
        let mut buf = Vec::new();
        DensityMap::write(&grid, &mut buf).unwrap();
        let reparsed = DensityMap::read(buf.as_slice()).unwrap();
        assert_eq!(reparsed.nx, 8);
        assert_eq!(reparsed.ny, 9);
        assert_eq!(reparsed.nz, 10);
        assert!((reparsed.unit_cell.a - 20.0).abs() < 1e-4);
    }

    #[test]
    fn voxel_values_round_trip() {
        let mut grid = DensityGrid::new(UnitCell::new(10.0, 10.0, 10.0, 90.0, 90.0, 90.0, "P 1"), 4, 4, 4);
        grid.set_raw(1, 2, 3, 7.5);
        let mut buf = Vec::new();
        DensityMap::write(&grid, &mut buf).unwrap();
        let reparsed = DensityMap::read(buf.as_slice()).unwrap();
        assert!((reparsed.get(1, 2, 3) - 7.5).abs() < 1e-4);
    }

    #[test]
    fn truncated_header_is_an_io_error() {
        let buf = vec![0u8; 10];
        assert!(matches!(DensityMap::read(buf.as_slice()), Err(FitError::IoFailure(_))));
    }
}
