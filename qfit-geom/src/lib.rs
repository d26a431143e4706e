//! 3D vector/matrix kernel and unit-cell geometry shared by the qfit-rs
//! crates: atomic coordinates, dihedral/planar angles, Rodrigues-formula
//! axis rotation, and the crystallographic unit-cell fractional/orthogonal
//! transform used by the density grid.

mod matrix3;
mod unit_cell;
mod vec3;

pub use matrix3::Matrix3x3;
pub use unit_cell::UnitCell;
pub use vec3::{dihedral_angle4, outer, planar_angle2, planar_angle3, Vec3};
