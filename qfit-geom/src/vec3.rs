use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{AddAssign, DivAssign, Index, IndexMut, MulAssign, SubAssign};

use crate::Matrix3x3;

/// A 3D Cartesian vector, used for atomic coordinates and for the geometric
/// quantities derived from them (bond vectors, rotation axes, ...).
#[derive(Clone, Copy, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Index<usize> for Vec3 {
    type Output = f64;
    fn index(&self, index: usize) -> &f64 {
        match index {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Index out of range for Vec3"),
        }
    }
}

impl IndexMut<usize> for Vec3 {
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        match index {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("Index out of range for Vec3"),
        }
    }
}

macro_rules! vec_operation {
    ($lhs:expr, $rhs:expr, $OP:tt ) => {
        $lhs.x $OP $rhs.x;
        $lhs.y $OP $rhs.y;
        $lhs.z $OP $rhs.z;
    };
}

macro_rules! scalar_operation {
    ($lhs:expr, $rhs:expr, $OP:tt ) => {
        $lhs.x $OP $rhs;
        $lhs.y $OP $rhs;
        $lhs.z $OP $rhs;
    };
}

impl SubAssign<&Vec3> for Vec3 {
    fn sub_assign(&mut self, other: &Vec3) {
        vec_operation!(self, other, -=);
    }
}

impl AddAssign<&Vec3> for Vec3 {
    fn add_assign(&mut self, other: &Vec3) {
        vec_operation!(self, other, +=);
    }
}

impl MulAssign<f64> for Vec3 {
    fn mul_assign(&mut self, rhs: f64) {
        scalar_operation!(self, rhs, *=);
    }
}

impl DivAssign<f64> for Vec3 {
    fn div_assign(&mut self, rhs: f64) {
        scalar_operation!(self, rhs, /=);
    }
}

impl fmt::Debug for Vec3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3} {:.3} {:.3}]", self.x, self.y, self.z)
    }
}

impl Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.3} {:.3} {:.3}", self.x, self.y, self.z)
    }
}

impl PartialEq for Vec3 {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y && self.z == other.z
    }
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Vec3 {
        Vec3 { x, y, z }
    }

    pub fn from_float(value: f64) -> Vec3 {
        Vec3 { x: value, y: value, z: value }
    }

    pub fn from_array(values: &[f64; 3]) -> Vec3 {
        Vec3 { x: values[0], y: values[1], z: values[2] }
    }

    pub fn set(&mut self, v: &Vec3) {
        vec_operation!(self, v, =);
    }

    pub fn set3(&mut self, x: f64, y: f64, z: f64) {
        self.x = x;
        self.y = y;
        self.z = z;
    }

    pub fn add_s(a: &Vec3, b: &Vec3) -> Vec3 {
        Vec3::new(a.x + b.x, a.y + b.y, a.z + b.z)
    }

    pub fn sub_s(a: &Vec3, b: &Vec3) -> Vec3 {
        Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z)
    }

    pub fn opposite(&mut self) {
        self.x = -self.x;
        self.y = -self.y;
        self.z = -self.z;
    }

    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    pub fn length_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn normalized(&self) -> Vec3 {
        let mut v = *self;
        v /= self.length();
        v
    }

    pub fn normalize(&mut self) {
        *self /= self.length();
    }

    pub fn dot(a: &Vec3, b: &Vec3) -> f64 {
        a.x * b.x + a.y * b.y + a.z * b.z
    }

    pub fn distance_square_to(&self, p: &Vec3) -> f64 {
        let dx = self.x - p.x;
        let dy = self.y - p.y;
        let dz = self.z - p.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance_to(&self, p: &Vec3) -> f64 {
        self.distance_square_to(p).sqrt()
    }

    pub fn cross(a: &Vec3, b: &Vec3) -> Vec3 {
        Vec3 {
            x: a.y * b.z - a.z * b.y,
            y: a.z * b.x - a.x * b.z,
            z: a.x * b.y - a.y * b.x,
        }
    }

    /// Rotates this point about an axis (defined by `origin` and a normalized
    /// `axis` direction) by `angle_rad` radians, using Rodrigues' rotation formula.
    pub fn rotated_about_axis(&self, origin: &Vec3, axis: &Vec3, angle_rad: f64) -> Vec3 {
        let mut p = *self;
        p -= origin;
        let k = axis.normalized();
        let cos_t = angle_rad.cos();
        let sin_t = angle_rad.sin();
        let k_cross_p = Vec3::cross(&k, &p);
        let k_dot_p = Vec3::dot(&k, &p);

        let mut rotated = p;
        rotated *= cos_t;
        let mut term2 = k_cross_p;
        term2 *= sin_t;
        rotated += &term2;
        let mut term3 = k;
        term3 *= k_dot_p * (1.0 - cos_t);
        rotated += &term3;

        rotated += origin;
        rotated
    }
}

/// Calculates a planar angle between two vectors in 3D, in radians.
pub fn planar_angle2(a: &Vec3, b: &Vec3) -> f64 {
    let v = Vec3::dot(a, b);
    (v / (a.length() * b.length())).acos()
}

/// Calculates the planar angle of the a-b-c triangle in 3D, in radians.
pub fn planar_angle3(a: &Vec3, b: &Vec3, c: &Vec3) -> f64 {
    let mut v1 = *a;
    v1 -= b;
    let mut v2 = *c;
    v2 -= b;
    planar_angle2(&v1, &v2)
}

/// Calculates the dihedral angle defined by the four a-b-c-d points in 3D, in radians,
/// in `(-pi, pi]`.
pub fn dihedral_angle4(a: &Vec3, b: &Vec3, c: &Vec3, d: &Vec3) -> f64 {
    let mut b0 = *b;
    b0 -= a;
    b0.opposite();
    let mut b1 = *c;
    b1 -= b;
    b1.normalize();
    let mut b2 = *d;
    b2 -= c;

    let mut v = b1;
    v *= -Vec3::dot(&b0, &b1);
    v += &b0;

    let mut w = b1;
    w *= -Vec3::dot(&b2, &b1);
    w += &b2;

    let x = Vec3::dot(&v, &w);
    let y = Vec3::dot(&Vec3::cross(&b1, &v), &w);

    f64::atan2(y, x)
}

/// Outer product of two vectors, producing a 3x3 matrix.
pub fn outer(lhs: &Vec3, rhs: &Vec3) -> Matrix3x3 {
    Matrix3x3::from_array([
        lhs.x * rhs.x, lhs.x * rhs.y, lhs.x * rhs.z,
        lhs.y * rhs.x, lhs.y * rhs.y, lhs.y * rhs.z,
        lhs.z * rhs.x, lhs.z * rhs.y, lhs.z * rhs.z,
    ])
}
