//! Rotameric side-chain fitting engine: samples a residue's chi-angle
//! rotamers against a crystallographic density map, filters steric clashes,
//! and selects a sparse multiconformer occupancy model via QP/MIQP
//! (SPEC_FULL §2 "Overview").

mod clash;
mod config;
mod density;
mod error;
mod fitter;
mod map;
mod residue;
mod vdw;

pub use clash::ClashDetector;
pub use config::{DensityParams, FitterConfig, GeneralOptions, RotamerOptions, ScatteringTable};
pub use density::{DensityGrid, DensityTransformer};
pub use error::FitError;
pub use fitter::{Conformer, RotamericFitter};
pub use map::DensityMap;
pub use residue::ResidueModel;
pub use vdw::vdw_radius;

pub use qfit_geom::{dihedral_angle4, Matrix3x3, UnitCell, Vec3};
pub use qfit_model::{Atom, ModelError, PdbStructure, ResidueView, RotamerLibrary, RotamerLibraryEntry};
pub use qfit_numerical::{solve_miqp, solve_qp, Matrix, Solution, SolverError};
