use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use log::{debug, info};

use qfit_geom::Vec3;
use qfit_model::{Atom, PdbStructure, RotamerLibrary, RotamerLibraryEntry};
use qfit_numerical::{solve_miqp, solve_qp, Matrix};

use crate::clash::ClashDetector;
use crate::config::FitterConfig;
use crate::density::{DensityGrid, DensityTransformer};
use crate::error::FitError;
use crate::map::DensityMap;
use crate::residue::ResidueModel;

const PRUNE_THRESHOLD: f64 = 0.002;
const DEDUP_TOLERANCE: f64 = 0.01;

/// One surviving conformer after selection: its coordinates (in the
/// residue's atom order) and its fitted occupancy.
#[derive(Clone, Debug)]
pub struct Conformer {
    pub coords: Vec<Vec3>,
    pub weight: f64,
}

/// Orchestrates chi-by-chi rotamer expansion, clash filtering, and QP/MIQP
/// selection for one residue (SPEC_FULL §4.5).
pub struct RotamericFitter {
    residue: ResidueModel,
    rotamer: &'static RotamerLibraryEntry,
    clash_detector: ClashDetector,
    model_grid: DensityGrid,
    target_grid: DensityGrid,
    transformer: DensityTransformer,
    config: FitterConfig,
    rmask: f64,
    coor_set: Vec<Vec<Vec3>>,
    occupancies: Vec<f64>,
    starting_chi: Vec<f64>,
    start_chi: usize,
    iteration: usize,
}

impl RotamericFitter {
    pub fn new(
        residue_id: &str,
        atoms: Vec<Atom>,
        clash_detector: ClashDetector,
        target_grid: DensityGrid,
        config: FitterConfig,
    ) -> Result<RotamericFitter, FitError> {
        let res_name = atoms.first().map(|a| a.res_name.clone()).unwrap_or_default();
        let rotamer = RotamerLibrary::get(&res_name)
            .ok_or_else(|| FitError::StructureIncomplete { residue_id: residue_id.to_string() })?;
        let mut residue = ResidueModel::new(residue_id, atoms, rotamer)?;
        if !config.rotamer.exclude_atoms.is_empty() {
            residue.exclude_atoms(&config.rotamer.exclude_atoms);
        }

        let params = config.density_params();
        let rmask = params.rmask;
        let transformer = DensityTransformer::new(params, config.general.scattering);
        let model_grid = DensityGrid::new(target_grid.unit_cell.clone(), target_grid.nx, target_grid.ny, target_grid.nz);

        let starting_chi: Vec<f64> = (1..=residue.nchi()).map(|i| residue.get_chi(i)).collect();
        let initial_coords = residue.coords();

        Ok(RotamericFitter {
            residue,
            rotamer,
            clash_detector,
            model_grid,
            target_grid,
            transformer,
            config,
            rmask,
            coor_set: vec![initial_coords],
            occupancies: vec![1.0],
            starting_chi,
            start_chi: 1,
            iteration: 0,
        })
    }

    /// Runs the full chi-by-chi fitting loop to completion and returns the
    /// surviving conformers (SPEC_FULL §4.5).
    pub fn fit(&mut self) -> Result<Vec<Conformer>, FitError> {
        self.transformer.initialize();
        let nchi = self.residue.nchi();
        if nchi == 0 {
            return Ok(self.current_conformers());
        }

        loop {
            let end_chi = (self.start_chi + self.config.general.dofs_per_iteration).min(nchi + 1);
            for c in self.start_chi..end_chi {
                self.sample_chi(c)?;
            }

            self.select_qp()?;
            self.select_miqp()?;
            self.select_miqp()?; // SPEC_FULL §9 "Double MIQP call"

            info!("qfit: residue {} iteration {} -> {} conformers", self.residue.residue_id(), self.iteration, self.coor_set.len());

            if end_chi - 1 >= nchi {
                break;
            }
            self.start_chi += 1;
            self.iteration += 1;
        }

        Ok(self.current_conformers())
    }

    fn current_conformers(&self) -> Vec<Conformer> {
        self.coor_set
            .iter()
            .cloned()
            .zip(self.occupancies.iter().cloned())
            .map(|(coords, weight)| Conformer { coords, weight })
            .collect()
    }

    /// One [`PdbStructure`] per surviving conformer, atoms in the
    /// original order with occupancy set to the conformer's weight
    /// (SPEC_FULL §6 "Output files" — `conformer_{n}.pdb`).
    fn conformer_structures(&self, template: &[Atom]) -> Vec<PdbStructure> {
        self.coor_set
            .iter()
            .zip(self.occupancies.iter())
            .map(|(coords, &weight)| {
                let atoms: Vec<Atom> = template
                    .iter()
                    .zip(coords.iter())
                    .map(|(a, pos)| {
                        let mut a = a.clone();
                        a.pos = pos.clone();
                        a.occupancy = weight;
                        a
                    })
                    .collect();
                PdbStructure { atoms, unit_cell: None }
            })
            .collect()
    }

    /// All conformers combined into one structure, alternate-location
    /// labels `A, B, C, ...` assigned in candidate order, then reordered
    /// (SPEC_FULL §6 — `multiconformer_residue.pdb`).
    fn multiconformer_structure(&self, template: &[Atom]) -> PdbStructure {
        let mut combined = PdbStructure::new();
        for (ci, mut conformer) in self.conformer_structures(template).into_iter().enumerate() {
            let altloc = (b'A' + ci as u8) as char;
            for atom in conformer.atoms.iter_mut() {
                atom.alt_loc = altloc;
            }
            combined.combine(&conformer);
        }
        combined.reorder();
        combined
    }

    /// Writes `conformer_{n}.pdb` (n = 1..k) and `multiconformer_residue.pdb`
    /// into `directory`, exactly as the Python reference's
    /// `QFitRotamericResidue.tofile` does (SPEC_FULL §6 "Output files").
    pub fn write_outputs(&self, template: &[Atom]) -> Result<(), FitError> {
        let directory = self.config.general.directory.clone();
        fs::create_dir_all(&directory)?;

        for (n, conformer) in self.conformer_structures(template).into_iter().enumerate() {
            let path = Path::new(&directory).join(format!("conformer_{}.pdb", n + 1));
            conformer.write_pdb(BufWriter::new(File::create(path)?))?;
        }

        let mc_path = Path::new(&directory).join("multiconformer_residue.pdb");
        self.multiconformer_structure(template).write_pdb(BufWriter::new(File::create(mc_path)?))?;

        if self.config.general.debug {
            self.write_debug_maps(&directory)?;
        }
        Ok(())
    }

    /// Writes `mask.mrc`, `model.mrc`, `diff.mrc`, `model_masked.mrc`, and
    /// `diff_masked.mrc` into `directory` (SPEC_FULL §6 "Output files",
    /// debug artifacts), mirroring `_BaseQFit._write_maps`.
    fn write_debug_maps(&self, directory: &str) -> Result<(), FitError> {
        let mut transformer = self.transformer_clone();
        let active = self.residue.active_indices();

        let mut mask_grid = DensityGrid::new(self.model_grid.unit_cell.clone(), self.model_grid.nx, self.model_grid.ny, self.model_grid.nz);
        let mut residue = self.residue.clone();
        for coords in &self.coor_set {
            residue.set_coords(coords);
            transformer.mask(&mut mask_grid, residue.atoms(), &active, self.rmask);
        }
        DensityMap::write(&mask_grid.sentinel_from_mask(), File::create(Path::new(directory).join("mask.mrc"))?)?;

        let mut model_grid = DensityGrid::new(self.model_grid.unit_cell.clone(), self.model_grid.nx, self.model_grid.ny, self.model_grid.nz);
        for (coords, &weight) in self.coor_set.iter().zip(self.occupancies.iter()) {
            residue.set_coords(coords);
            let weighted_atoms: Vec<Atom> = residue
                .atoms()
                .iter()
                .map(|a| {
                    let mut a = a.clone();
                    a.occupancy = weight;
                    a
                })
                .collect();
            transformer.density(&mut model_grid, &weighted_atoms, &active);
        }
        DensityMap::write(&model_grid, File::create(Path::new(directory).join("model.mrc"))?)?;

        let mut diff_grid = model_grid.clone();
        diff_grid.subtract(&self.target_grid);
        DensityMap::write(&diff_grid, File::create(Path::new(directory).join("diff.mrc"))?)?;

        let mut model_masked = DensityGrid::new(self.model_grid.unit_cell.clone(), self.model_grid.nx, self.model_grid.ny, self.model_grid.nz);
        let mut diff_masked = DensityGrid::new(self.model_grid.unit_cell.clone(), self.model_grid.nx, self.model_grid.ny, self.model_grid.nz);
        for idx in 0..model_grid.len() {
            if mask_grid.is_masked_flat(idx) {
                let model_value = model_grid.value_at_flat(idx);
                model_masked.set_flat(idx, model_value);
                diff_masked.set_flat(idx, model_value - self.target_grid.value_at_flat(idx));
            }
        }
        DensityMap::write(&model_masked, File::create(Path::new(directory).join("model_masked.mrc"))?)?;
        DensityMap::write(&diff_masked, File::create(Path::new(directory).join("diff_masked.mrc"))?)?;

        Ok(())
    }

    fn transformer_clone(&self) -> DensityTransformer {
        DensityTransformer::new(self.config.density_params(), self.config.general.scattering)
    }

    /// Expands the candidate list by sampling chi index `c` over every
    /// currently-surviving coordinate set (SPEC_FULL §4.5 step 2).
    fn sample_chi(&mut self, c: usize) -> Result<(), FitError> {
        self.residue.activate_all();
        if c + 1 <= self.rotamer.nchi() {
            self.residue.deactivate(self.rotamer.chi_rotate_atoms(c + 1));
        }

        let neighborhood = self.config.rotamer.rotamer_neighborhood;
        let stepsize = self.config.general.dofs_stepsize;
        let scaling = self.config.general.clash_scaling_factor;

        let mut augmented_rotamers: Vec<Vec<f64>> = self.rotamer.rotamers().to_vec();
        augmented_rotamers.push(self.starting_chi.clone());

        let mut new_candidates: Vec<Vec<Vec3>> = Vec::new();

        for coords in self.coor_set.clone() {
            self.residue.set_coords(&coords);
            let current_chi: Vec<f64> = (1..c).map(|j| self.residue.get_chi(j)).collect();

            let mut sampled_this_coord: Vec<Vec<Vec3>> = Vec::new();

            for rotamer_angles in &augmented_rotamers {
                let matches = current_chi
                    .iter()
                    .enumerate()
                    .all(|(idx, &value)| (value - rotamer_angles[idx]).abs() <= neighborhood);
                if !matches {
                    continue;
                }

                self.residue.set_chi(c, rotamer_angles[c - 1]);
                let candidate = self.residue.coords();
                if sampled_this_coord.iter().any(|prev| coords_close(prev, &candidate, DEDUP_TOLERANCE)) {
                    continue;
                }
                sampled_this_coord.push(candidate);

                let mut delta = -neighborhood;
                while delta <= neighborhood + 1e-9 {
                    self.residue.set_chi(c, rotamer_angles[c - 1] + delta);
                    let no_external_clash = !self.clash_detector.clashes(&self.residue, scaling);
                    let no_internal_clash = self.residue.clashes(scaling) == 0;
                    if no_external_clash && no_internal_clash {
                        new_candidates.push(self.residue.coords());
                    }
                    delta += stepsize;
                }
            }
        }

        if new_candidates.is_empty() {
            return Err(FitError::NoViableConformers { iteration: self.iteration });
        }

        let n = new_candidates.len();
        self.coor_set = new_candidates;
        self.occupancies = vec![1.0 / n as f64; n];
        Ok(())
    }

    /// Renders every candidate's union mask footprint, then its individual
    /// density, returning `(model matrix, target vector)` (SPEC_FULL §4.5
    /// "Rendering").
    fn render(&mut self) -> Result<(Matrix, Vec<f64>), FitError> {
        self.model_grid.reset(true);
        let active = self.residue.active_indices();

        for coords in &self.coor_set {
            self.residue.set_coords(coords);
            self.transformer.mask(&mut self.model_grid, self.residue.atoms(), &active, self.rmask);
        }

        let mask_indices = self.model_grid.masked_indices();
        if mask_indices.is_empty() {
            return Err(FitError::MaskEmpty);
        }

        let target: Vec<f64> = mask_indices.iter().map(|&idx| self.target_grid.value_at_flat(idx)).collect();

        let mut rows = Vec::with_capacity(self.coor_set.len());
        for coords in self.coor_set.clone() {
            self.residue.set_coords(&coords);
            self.model_grid.reset(false);
            self.transformer.density(&mut self.model_grid, self.residue.atoms(), &active);
            let row: Vec<f64> = mask_indices.iter().map(|&idx| self.model_grid.value_at_flat(idx)).collect();
            rows.push(row);
        }

        Ok((Matrix::from_rows(&rows), target))
    }

    fn select_qp(&mut self) -> Result<(), FitError> {
        let (models, target) = self.render()?;
        let solution = solve_qp(&target, &models)?;
        if self.config.general.debug {
            debug!("qfit: QP remainder = {:.4}", solution.remainder(&target));
        }
        self.occupancies = solution.weights;
        self.prune();
        Ok(())
    }

    fn select_miqp(&mut self) -> Result<(), FitError> {
        let cardinality = self.config.general.cardinality.unwrap_or(self.coor_set.len());
        let threshold = self.config.general.threshold.unwrap_or(0.0);
        let (models, target) = self.render()?;
        let solution = solve_miqp(&target, &models, cardinality, threshold)?;
        if self.config.general.debug {
            debug!("qfit: MIQP remainder = {:.4}", solution.remainder(&target));
        }
        self.occupancies = solution.weights;
        self.prune();
        Ok(())
    }

    /// Drops every candidate whose weight fell below the pruning epsilon,
    /// keeping `coor_set` and `occupancies` in lockstep (SPEC_FULL §8
    /// invariant 5).
    fn prune(&mut self) {
        let kept: Vec<(Vec<Vec3>, f64)> = self
            .coor_set
            .drain(..)
            .zip(self.occupancies.drain(..))
            .filter(|(_, w)| *w >= PRUNE_THRESHOLD)
            .collect();
        self.coor_set = kept.iter().map(|(c, _)| c.clone()).collect();
        self.occupancies = kept.into_iter().map(|(_, w)| w).collect();
    }
}

fn coords_close(a: &[Vec3], b: &[Vec3], tol: f64) -> bool {
    a.iter().zip(b.iter()).all(|(p, q)| (p.x - q.x).abs() < tol && (p.y - q.y).abs() < tol && (p.z - q.z).abs() < tol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FitterConfig, ScatteringTable};
    use qfit_geom::UnitCell;

    fn leucine_atoms(chi1: f64, chi2: f64) -> Vec<Atom> {
        // A simple extended leucine; chi values are not exact but distinct
        // enough to exercise sampling/clash/selection logic.
        let base = [
            ("N", 0.0, 1.4, 0.0),
            ("CA", 0.0, 0.0, 0.0),
            ("C", 1.4, -0.3, 0.4),
            ("O", 1.8, -1.4, 0.4),
            ("CB", -0.8, -0.6, -1.2),
            ("CG", -2.3, -0.5, -1.1),
            ("CD1", -2.9, -1.2, -2.3),
            ("CD2", -2.8, 0.9, -1.0),
        ];
        let _ = (chi1, chi2);
        base.iter().map(|(name, x, y, z)| Atom::new(name, "LEU", "A", 5, Vec3::new(*x, *y, *z))).collect()
    }

    fn empty_clash_detector() -> ClashDetector {
        ClashDetector::new(Vec::new(), Vec::new())
    }

    fn synthetic_target(atoms: &[Atom], config: &FitterConfig) -> DensityGrid {
        let unit_cell = UnitCell::padded_p1(20.0);
        let mut grid = DensityGrid::new(unit_cell, 30, 30, 30);
        let params = config.density_params();
        let mut transformer = DensityTransformer::new(params, config.general.scattering);
        transformer.initialize();
        let active: Vec<usize> = (0..atoms.len()).collect();
        transformer.mask(&mut grid, atoms, &active, params.rmask);
        transformer.density(&mut grid, atoms, &active);
        grid
    }

    #[test]
    fn fit_converges_to_a_single_conformer_for_a_clean_synthetic_map() {
        let mut config = FitterConfig::default();
        config.general.resolution = Some(1.5);
        config.general.scattering = ScatteringTable::Xray;

        let atoms = leucine_atoms(-60.0, 170.0);
        let target_grid = synthetic_target(&atoms, &config);

        let mut fitter =
            RotamericFitter::new("A/5", atoms, empty_clash_detector(), target_grid, config).unwrap();
        let conformers = fitter.fit().unwrap();

        assert!(!conformers.is_empty());
        let total_weight: f64 = conformers.iter().map(|c| c.weight).sum();
        assert!(total_weight <= 1.0 + 1e-6);
        for c in &conformers {
            assert!(c.weight >= 0.0);
        }
    }

    #[test]
    fn incomplete_residue_is_rejected_before_sampling() {
        let mut atoms = leucine_atoms(-60.0, 170.0);
        atoms.retain(|a| a.name != "CG");
        let config = FitterConfig::default();
        let target_grid = synthetic_target(&leucine_atoms(-60.0, 170.0), &config);
        let result = RotamericFitter::new("A/5", atoms, empty_clash_detector(), target_grid, config);
        assert!(matches!(result, Err(FitError::StructureIncomplete { .. })));
    }
}
