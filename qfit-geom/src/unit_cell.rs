use crate::{Matrix3x3, Vec3};

/// A crystallographic unit cell: its dimensions, angles, and space group.
///
/// Mirrors `bioshell_pdb::UnitCell`, extended with the fractional/orthogonal
/// coordinate transform the density transformer needs to map a Cartesian
/// atom position onto voxel indices.
#[derive(Clone, Debug)]
pub struct UnitCell {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub space_group: String,
}

impl UnitCell {
    pub fn new(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64, space_group: &str) -> Self {
        Self { a, b, c, alpha, beta, gamma, space_group: space_group.to_string() }
    }

    /// A unit cell large enough to hold a single residue with generous
    /// padding, forced to space group P1 — used when no map file backs the
    /// fit (e.g. synthetic-density tests).
    pub fn padded_p1(extent: f64) -> Self {
        Self::new(extent, extent, extent, 90.0, 90.0, 90.0, "P 1")
    }

    /// Parses the `CRYST1` record of a PDB file.
    pub fn from_cryst1_line(line: &str) -> UnitCell {
        let a = line[6..15].trim().parse::<f64>().unwrap();
        let b = line[15..24].trim().parse::<f64>().unwrap();
        let c = line[24..33].trim().parse::<f64>().unwrap();
        let alpha = line[33..40].trim().parse::<f64>().unwrap();
        let beta = line[40..47].trim().parse::<f64>().unwrap();
        let gamma = line[47..54].trim().parse::<f64>().unwrap();
        let space_group = line[55..66].trim();
        UnitCell::new(a, b, c, alpha, beta, gamma, space_group)
    }

    /// Returns this cell reduced to space group P1, as the fitter's working
    /// model grid always is (SPEC_FULL §3/§4.3).
    pub fn to_p1(&self) -> UnitCell {
        UnitCell::new(self.a, self.b, self.c, self.alpha, self.beta, self.gamma, "P 1")
    }

    pub fn volume(&self) -> f64 {
        let (a, b, c) = (self.a, self.b, self.c);
        let (al, be, ga) = (self.alpha.to_radians(), self.beta.to_radians(), self.gamma.to_radians());
        let cos_al = al.cos();
        let cos_be = be.cos();
        let cos_ga = ga.cos();
        let factor = 1.0 - cos_al * cos_al - cos_be * cos_be - cos_ga * cos_ga
            + 2.0 * cos_al * cos_be * cos_ga;
        a * b * c * factor.max(0.0).sqrt()
    }

    /// The matrix mapping fractional coordinates to orthogonal (Cartesian)
    /// Angstroms, using the standard crystallographic convention (a along x,
    /// b in the xy-plane).
    pub fn frac_to_orth(&self) -> Matrix3x3 {
        let (a, b, c) = (self.a, self.b, self.c);
        let (al, be, ga) = (self.alpha.to_radians(), self.beta.to_radians(), self.gamma.to_radians());
        let (cos_al, cos_be, cos_ga) = (al.cos(), be.cos(), ga.cos());
        let sin_ga = ga.sin();
        let v = self.volume();

        let m13 = c * cos_be;
        let m23 = c * (cos_al - cos_be * cos_ga) / sin_ga;
        let m33 = v / (a * b * sin_ga);

        Matrix3x3::from_array([
            a, b * cos_ga, m13,
            0.0, b * sin_ga, m23,
            0.0, 0.0, m33,
        ])
    }

    pub fn orth_to_frac(&self) -> Matrix3x3 {
        self.frac_to_orth().inverse()
    }

    pub fn fractional_to_cartesian(&self, frac: &Vec3) -> Vec3 {
        self.frac_to_orth().mul_vec(frac)
    }

    pub fn cartesian_to_fractional(&self, cart: &Vec3) -> Vec3 {
        self.orth_to_frac().mul_vec(cart)
    }
}
