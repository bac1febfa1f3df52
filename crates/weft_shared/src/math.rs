//! Mathematical types shared between the producer and render threads.
//!
//! Matrices are column-major. Column 3 of a [`Mat44`] holds the translation.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D Vector - position, velocity, direction
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Unit X vector
    pub const X: Self = Self::new(1.0, 0.0, 0.0);

    /// Unit Y vector
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);

    /// Unit Z vector
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Distance squared (avoids sqrt)
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        (self - other).length_squared()
    }

    /// Returns the unit vector, or zero for a degenerate input.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            Self::ZERO
        } else {
            self * (1.0 / len)
        }
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// 3x3 matrix stored as three basis columns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat33 {
    /// Basis columns.
    pub cols: [Vec3; 3],
}

impl Mat33 {
    /// Identity matrix
    pub const IDENTITY: Self = Self::from_cols(Vec3::X, Vec3::Y, Vec3::Z);

    /// Creates a matrix from three columns.
    #[must_use]
    pub const fn from_cols(c0: Vec3, c1: Vec3, c2: Vec3) -> Self {
        Self { cols: [c0, c1, c2] }
    }

    /// Element at `(row, col)`.
    #[must_use]
    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.cols[col].to_array()[row]
    }

    /// Sum of the diagonal.
    #[must_use]
    pub fn trace(&self) -> f32 {
        self.cols[0].x + self.cols[1].y + self.cols[2].z
    }

    /// Determinant.
    #[must_use]
    pub fn determinant(&self) -> f32 {
        self.cols[0].dot(self.cols[1].cross(self.cols[2]))
    }

    /// Transpose.
    #[must_use]
    pub fn transpose(&self) -> Self {
        let [a, b, c] = self.cols;
        Self::from_cols(
            Vec3::new(a.x, b.x, c.x),
            Vec3::new(a.y, b.y, c.y),
            Vec3::new(a.z, b.z, c.z),
        )
    }

    /// Inverse, or `None` for a singular matrix.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() <= f32::EPSILON {
            return None;
        }
        let [a, b, c] = self.cols;
        // Rows of the inverse are the cross products of column pairs.
        let inv_det = 1.0 / det;
        let rows = Self::from_cols(b.cross(c) * inv_det, c.cross(a) * inv_det, a.cross(b) * inv_det);
        Some(rows.transpose())
    }

    /// Transforms a vector.
    #[must_use]
    pub fn transform(&self, v: Vec3) -> Vec3 {
        self.cols[0] * v.x + self.cols[1] * v.y + self.cols[2] * v.z
    }
}

impl std::ops::Mul for Mat33 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::from_cols(
            self.transform(rhs.cols[0]),
            self.transform(rhs.cols[1]),
            self.transform(rhs.cols[2]),
        )
    }
}

/// 4x4 affine transform, column-major.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Mat44 {
    /// Columns; column 3 is the translation.
    pub cols: [[f32; 4]; 4],
}

impl Mat44 {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Builds a transform from a rotation basis and a translation.
    #[must_use]
    pub fn from_basis_position(basis: Mat33, position: Vec3) -> Self {
        let [a, b, c] = basis.cols;
        Self {
            cols: [
                [a.x, a.y, a.z, 0.0],
                [b.x, b.y, b.z, 0.0],
                [c.x, c.y, c.z, 0.0],
                [position.x, position.y, position.z, 1.0],
            ],
        }
    }

    /// Pure translation.
    #[must_use]
    pub fn from_translation(position: Vec3) -> Self {
        Self::from_basis_position(Mat33::IDENTITY, position)
    }

    /// Rotation of `angle_rad` around `axis` (Rodrigues).
    #[must_use]
    pub fn from_axis_angle(axis: Vec3, angle_rad: f32) -> Self {
        let k = axis.normalized();
        let (s, c) = angle_rad.sin_cos();
        let t = 1.0 - c;
        let basis = Mat33::from_cols(
            Vec3::new(t * k.x * k.x + c, t * k.x * k.y + s * k.z, t * k.x * k.z - s * k.y),
            Vec3::new(t * k.x * k.y - s * k.z, t * k.y * k.y + c, t * k.y * k.z + s * k.x),
            Vec3::new(t * k.x * k.z + s * k.y, t * k.y * k.z - s * k.x, t * k.z * k.z + c),
        );
        Self::from_basis_position(basis, Vec3::ZERO)
    }

    /// Uniform scale.
    #[must_use]
    pub fn from_scale(x: f32, y: f32, z: f32) -> Self {
        let basis = Mat33::from_cols(Vec3::X * x, Vec3::Y * y, Vec3::Z * z);
        Self::from_basis_position(basis, Vec3::ZERO)
    }

    /// Basis column `index` (0..3) as a vector.
    #[must_use]
    pub fn basis(&self, index: usize) -> Vec3 {
        let c = self.cols[index];
        Vec3::new(c[0], c[1], c[2])
    }

    /// Upper-left 3x3 block.
    #[must_use]
    pub fn basis_matrix(&self) -> Mat33 {
        Mat33::from_cols(self.basis(0), self.basis(1), self.basis(2))
    }

    /// Translation.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.basis(3)
    }

    /// Returns a copy with the translation replaced.
    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.cols[3] = [position.x, position.y, position.z, 1.0];
        self
    }

    /// Length of each basis column.
    #[must_use]
    pub fn column_scales(&self) -> [f32; 3] {
        [self.basis(0).length(), self.basis(1).length(), self.basis(2).length()]
    }
}

impl Default for Mat44 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for Mat44 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let mut out = [[0.0_f32; 4]; 4];
        for (col, out_col) in out.iter_mut().enumerate() {
            for (row, cell) in out_col.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.cols[k][row] * rhs.cols[col][k]).sum();
            }
        }
        Self { cols: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        let sum = a + b;
        assert_eq!(sum, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(a.dot(b), 32.0); // 1*4 + 2*5 + 3*6
        assert_eq!(Vec3::X.cross(Vec3::Y), Vec3::Z);
    }

    #[test]
    fn test_mat33_inverse() {
        let rot = Mat44::from_axis_angle(Vec3::Z, 0.7).basis_matrix();
        let inv = rot.inverse().unwrap();
        let product = rot * inv;
        for row in 0..3 {
            for col in 0..3 {
                let expected = if row == col { 1.0 } else { 0.0 };
                assert!(approx(product.at(row, col), expected));
            }
        }
    }

    #[test]
    fn test_singular_matrix_has_no_inverse() {
        let flat = Mat33::from_cols(Vec3::X, Vec3::X, Vec3::Z);
        assert!(flat.inverse().is_none());
    }

    #[test]
    fn test_rotation_trace() {
        // trace(R) = 1 + 2cos(theta)
        let angle = 0.5_f32;
        let rot = Mat44::from_axis_angle(Vec3::Y, angle).basis_matrix();
        assert!(approx(rot.trace(), 1.0 + 2.0 * angle.cos()));
    }

    #[test]
    fn test_mat44_bytemuck() {
        let m = Mat44::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let bytes: &[u8] = bytemuck::bytes_of(&m);
        assert_eq!(bytes.len(), 64); // 16 * 4 bytes
        assert_eq!(m.position(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_column_scales() {
        let m = Mat44::from_scale(2.0, 2.0, 3.0);
        assert_eq!(m.column_scales(), [2.0, 2.0, 3.0]);
    }
}
