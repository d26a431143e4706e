//! Minimal structural model backing the rotameric fitting engine: a PDB
//! atom record, a flat column-array structure with residue grouping, and
//! the compiled-in rotamer library (SPEC_FULL §6A, §9 "Global rotamer table").

mod atom;
mod error;
mod rotamer;
mod structure;

pub use atom::Atom;
pub use error::ModelError;
pub use rotamer::{RotamerLibrary, RotamerLibraryEntry};
pub use structure::{PdbStructure, ResidueView};
