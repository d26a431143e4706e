use std::collections::HashMap;
use std::f64::consts::PI;

use qfit_geom::{UnitCell, Vec3};
use qfit_model::Atom;

use crate::config::DensityParams;

/// A 3D grid of real-valued voxels over a unit cell, reduced to space
/// group P1 (SPEC_FULL §3 "Density grid"). Voxel `(i, j, k)` covers the
/// fractional-coordinate cell `([i, i+1) / nx, [j, j+1) / ny, [k, k+1) / nz)`.
#[derive(Clone, Debug)]
pub struct DensityGrid {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub unit_cell: UnitCell,
    values: Vec<f64>,
    mask: Vec<bool>,
}

impl DensityGrid {
    pub fn new(unit_cell: UnitCell, nx: usize, ny: usize, nz: usize) -> DensityGrid {
        let n = nx * ny * nz;
        DensityGrid { nx, ny, nz, unit_cell, values: vec![0.0; n], mask: vec![false; n] }
    }

    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.ny + j) * self.nx + i
    }

    fn wrap(v: i64, n: usize) -> usize {
        v.rem_euclid(n as i64) as usize
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[self.index(i, j, k)]
    }

    /// Directly sets a voxel's value, bypassing the mask — used by
    /// [`crate::map::DensityMap`] to populate a grid parsed from disk.
    pub fn set_raw(&mut self, i: usize, j: usize, k: usize, value: f64) {
        let idx = self.index(i, j, k);
        self.values[idx] = value;
    }

    pub fn is_masked(&self, i: usize, j: usize, k: usize) -> bool {
        self.mask[self.index(i, j, k)]
    }

    pub fn value_at_flat(&self, idx: usize) -> f64 {
        self.values[idx]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set_flat(&mut self, idx: usize, value: f64) {
        self.values[idx] = value;
    }

    pub fn is_masked_flat(&self, idx: usize) -> bool {
        self.mask[idx]
    }

    /// Element-wise `self -= other`, used to build the difference maps
    /// (`diff.mrc`/`diff_masked.mrc`) from the model and observed grids.
    pub fn subtract(&mut self, other: &DensityGrid) {
        for (v, o) in self.values.iter_mut().zip(other.values.iter()) {
            *v -= o;
        }
    }

    /// A grid of the same shape with a positive sentinel (`1.0`) at every
    /// masked voxel and zero elsewhere — the form `mask.mrc` is written in
    /// (SPEC_FULL §6 "Output files").
    pub fn sentinel_from_mask(&self) -> DensityGrid {
        let mut out = DensityGrid::new(self.unit_cell.clone(), self.nx, self.ny, self.nz);
        for idx in 0..self.mask.len() {
            if self.mask[idx] {
                out.values[idx] = 1.0;
            }
        }
        out.mask = self.mask.clone();
        out
    }

    /// Cartesian position of a voxel's center, for rendering and testing.
    pub fn cartesian_of(&self, i: usize, j: usize, k: usize) -> Vec3 {
        let frac = Vec3::new(
            (i as f64 + 0.5) / self.nx as f64,
            (j as f64 + 0.5) / self.ny as f64,
            (k as f64 + 0.5) / self.nz as f64,
        );
        self.unit_cell.fractional_to_cartesian(&frac)
    }

    /// Zeros either the masked voxels (`full = false`) or the entire grid
    /// and mask (`full = true`) — the model grid is reallocated once per
    /// residue and reset between passes, never reallocated (SPEC_FULL §5).
    pub fn reset(&mut self, full: bool) {
        if full {
            self.values.iter_mut().for_each(|v| *v = 0.0);
            self.mask.iter_mut().for_each(|m| *m = false);
        } else {
            for idx in 0..self.values.len() {
                if self.mask[idx] {
                    self.values[idx] = 0.0;
                }
            }
        }
    }

    /// Flat indices of every currently-masked voxel, in raster order —
    /// the column ordering the solver's model matrix rows are read out in.
    pub fn masked_indices(&self) -> Vec<usize> {
        (0..self.values.len()).filter(|&idx| self.mask[idx]).collect()
    }

    /// Iterates over voxels within `radius` Å of `center`, in the local
    /// cubic bounding box, wrapping indices modulo the grid dimensions (P1).
    fn voxels_within(&self, center: &Vec3, radius: f64) -> Vec<(usize, usize, usize, f64)> {
        let frac = self.unit_cell.cartesian_to_fractional(center);
        let da = radius / self.unit_cell.a * self.nx as f64;
        let db = radius / self.unit_cell.b * self.ny as f64;
        let dc = radius / self.unit_cell.c * self.nz as f64;

        let ci = (frac.x * self.nx as f64).round() as i64;
        let cj = (frac.y * self.ny as f64).round() as i64;
        let ck = (frac.z * self.nz as f64).round() as i64;

        let mut out = Vec::new();
        let ri = da.ceil() as i64 + 1;
        let rj = db.ceil() as i64 + 1;
        let rk = dc.ceil() as i64 + 1;
        for di in -ri..=ri {
            for dj in -rj..=rj {
                for dk in -rk..=rk {
                    let i = Self::wrap(ci + di, self.nx);
                    let j = Self::wrap(cj + dj, self.ny);
                    let k = Self::wrap(ck + dk, self.nz);
                    let voxel_pos = self.cartesian_of(i, j, k);
                    let d = voxel_pos.distance_to(center);
                    if d <= radius {
                        out.push((i, j, k, d));
                    }
                }
            }
        }
        out
    }

    /// Marks every voxel within `radius` of any active atom as part of the
    /// footprint mask. Successive calls accumulate (union), as required so
    /// the solver's target voxel set covers every candidate's footprint.
    pub fn mask_atoms(&mut self, atoms: &[Atom], active_indices: &[usize], radius: f64) {
        for &i in active_indices {
            let voxels = self.voxels_within(&atoms[i].pos, radius);
            for (vi, vj, vk, _) in voxels {
                let idx = self.index(vi, vj, vk);
                self.mask[idx] = true;
            }
        }
    }

    fn add_at(&mut self, i: usize, j: usize, k: usize, value: f64) {
        let idx = self.index(i, j, k);
        self.values[idx] += value;
    }
}

/// Per-element scattering weight, a coarse stand-in for tabulated X-ray/
/// electron form factors (SPEC_FULL §4.3; exact form-factor tables are out
/// of scope — map computation from reflections is a stated Non-goal).
fn element_weight(element: &str, scattering: crate::config::ScatteringTable) -> f64 {
    use crate::config::ScatteringTable::*;
    let z = match element.trim().to_ascii_uppercase().as_str() {
        "H" => 1.0,
        "C" => 6.0,
        "N" => 7.0,
        "O" => 8.0,
        "S" => 16.0,
        "P" => 15.0,
        "SE" => 34.0,
        _ => 6.0,
    };
    match scattering {
        Xray => z,
        // electron scattering falls off faster with atomic number than X-ray
        Electron => z.powf(0.75),
    }
}

/// Forward model that paints atoms into a [`DensityGrid`] as radial,
/// B-factor-weighted scattering contributions (SPEC_FULL §4.3).
pub struct DensityTransformer {
    params: DensityParams,
    scattering: crate::config::ScatteringTable,
    radial_cache: HashMap<(String, u32), Vec<f64>>,
    dr: f64,
}

const RADIAL_SAMPLES: usize = 256;

impl DensityTransformer {
    pub fn new(params: DensityParams, scattering: crate::config::ScatteringTable) -> DensityTransformer {
        DensityTransformer { params, scattering, radial_cache: HashMap::new(), dr: 0.0 }
    }

    /// Builds the per-element radial lookup tables used by `density()`.
    /// Cheap and idempotent; called once before the first render.
    pub fn initialize(&mut self) {
        self.dr = 0.0; // tables are built lazily, keyed by (element, bfactor bucket)
    }

    fn sigma_for(&self, bfactor: f64) -> f64 {
        let thermal = (bfactor.max(1.0) / (8.0 * PI * PI)).sqrt();
        match self.params.smax {
            Some(smax) if smax > 0.0 => {
                let resolution_blur = 1.0 / (2.0 * PI * smax);
                (thermal * thermal + resolution_blur * resolution_blur).sqrt()
            }
            _ => thermal,
        }
    }

    fn cutoff_for(&self, sigma: f64) -> f64 {
        (4.0 * sigma).max(self.params.rmask)
    }

    /// Linearly-interpolated radial profile for one atom, built once per
    /// distinct `(element, rounded B-factor)` pair and cached for reuse
    /// across candidates that share the same residue geometry.
    fn radial_table(&mut self, element: &str, bfactor: f64) -> (&[f64], f64, f64) {
        let bucket = (bfactor * 4.0).round() as u32;
        let key = (element.to_string(), bucket);
        let sigma = self.sigma_for(bfactor);
        let cutoff = self.cutoff_for(sigma);
        let dr = cutoff / RADIAL_SAMPLES as f64;
        let weight = element_weight(element, self.scattering);

        self.radial_cache.entry(key).or_insert_with(|| {
            (0..=RADIAL_SAMPLES)
                .map(|i| {
                    let r = i as f64 * dr;
                    weight * (-0.5 * (r * r) / (sigma * sigma)).exp()
                })
                .collect()
        });
        (self.radial_cache.get(&(element.to_string(), bucket)).unwrap(), dr, cutoff)
    }

    fn interpolate(table: &[f64], dr: f64, r: f64) -> f64 {
        let pos = r / dr;
        let i = pos.floor() as usize;
        if i + 1 >= table.len() {
            return 0.0;
        }
        let frac = pos - i as f64;
        table[i] * (1.0 - frac) + table[i + 1] * frac
    }

    /// Sets every masked voxel within `radius` of any active atom to a
    /// positive sentinel footprint marker.
    pub fn mask(&self, grid: &mut DensityGrid, atoms: &[Atom], active_indices: &[usize], radius: f64) {
        grid.mask_atoms(atoms, active_indices, radius);
    }

    /// Adds the scattering contribution (scaled by occupancy) of every
    /// active atom into the grid.
    pub fn density(&mut self, grid: &mut DensityGrid, atoms: &[Atom], active_indices: &[usize]) {
        for &i in active_indices {
            let atom = &atoms[i];
            let (table, dr, cutoff) = self.radial_table(&atom.element, atom.temp_factor);
            let table = table.to_vec();
            let voxels = grid.voxels_within(&atom.pos, cutoff);
            for (vi, vj, vk, dist) in voxels {
                let v = Self::interpolate(&table, dr, dist) * atom.occupancy;
                grid.add_at(vi, vj, vk, v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScatteringTable;

    fn test_grid() -> DensityGrid {
        DensityGrid::new(UnitCell::padded_p1(20.0), 40, 40, 40)
    }

    fn params(simple: bool) -> DensityParams {
        DensityParams { smax: if simple { None } else { Some(1.0 / 3.0) }, smin: Some(0.0), rmask: 1.5, simple }
    }

    #[test]
    fn mask_accumulates_across_calls() {
        let mut grid = test_grid();
        let atoms = vec![Atom::new("CA", "ALA", "A", 1, Vec3::new(10.0, 10.0, 10.0))];
        let transformer = DensityTransformer::new(params(true), ScatteringTable::Xray);
        transformer.mask(&mut grid, &atoms, &[0], 1.5);
        let first = grid.masked_indices().len();
        transformer.mask(&mut grid, &atoms, &[0], 1.5);
        let second = grid.masked_indices().len();
        assert_eq!(first, second);
        assert!(first > 0);
    }

    #[test]
    fn density_peaks_at_the_atom_center() {
        let mut grid = test_grid();
        let atoms = vec![Atom::new("CA", "ALA", "A", 1, Vec3::new(10.0, 10.0, 10.0))];
        let mut transformer = DensityTransformer::new(params(true), ScatteringTable::Xray);
        transformer.initialize();
        transformer.density(&mut grid, &atoms, &[0]);
        let frac = grid.unit_cell.cartesian_to_fractional(&Vec3::new(10.0, 10.0, 10.0));
        let ci = (frac.x * grid.nx as f64).round() as usize;
        let cj = (frac.y * grid.ny as f64).round() as usize;
        let ck = (frac.z * grid.nz as f64).round() as usize;
        let center_val = grid.get(ci, cj, ck);
        let offset_val = grid.get((ci + 5) % grid.nx, cj, ck);
        assert!(center_val > offset_val);
        assert!(center_val > 0.0);
    }

    #[test]
    fn reset_full_clears_mask_and_values() {
        let mut grid = test_grid();
        let atoms = vec![Atom::new("CA", "ALA", "A", 1, Vec3::new(10.0, 10.0, 10.0))];
        let mut transformer = DensityTransformer::new(params(true), ScatteringTable::Xray);
        transformer.mask(&mut grid, &atoms, &[0], 1.5);
        transformer.density(&mut grid, &atoms, &[0]);
        grid.reset(true);
        assert_eq!(grid.masked_indices().len(), 0);
        assert!(grid.masked_indices().iter().all(|&i| grid.value_at_flat(i) == 0.0));
    }
}
