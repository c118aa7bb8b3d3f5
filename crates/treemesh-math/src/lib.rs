#![warn(missing_docs)]

//! Math types for the treemesh tube generators.
//!
//! Thin wrappers around nalgebra providing the types the bifurcation
//! pipeline works in: points, vectors, directions, rigid transforms,
//! tolerance constants, and the cubic Hermite toolkit in [`hermite`].

pub mod hermite;

use nalgebra::{Matrix3, Matrix4, Unit, Vector3, Vector4};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// Norm below which a vector is treated as zero length.
pub const ZERO_LENGTH: f64 = 1e-12;

/// Normalize `v`, or `None` if it has (effectively) zero length.
pub fn try_normalize(v: &Vec3) -> Option<Vec3> {
    let len = v.norm();
    if len < ZERO_LENGTH || !len.is_finite() {
        None
    } else {
        Some(v / len)
    }
}

/// Component of `v` orthogonal to the unit vector `axis`.
pub fn reject_from(v: &Vec3, axis: &Vec3) -> Vec3 {
    v - v.dot(axis) * axis
}

/// Arithmetic mean of a set of points.
pub fn centroid(points: &[Point3]) -> Point3 {
    let sum = points.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum / points.len().max(1) as f64)
}

/// A 4x4 affine transformation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// The underlying 4x4 matrix.
    pub matrix: Matrix4<f64>,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Rotation about an arbitrary axis through the origin by `angle` radians.
    ///
    /// Uses Rodrigues' rotation formula.
    pub fn rotation_about_axis(axis: &Dir3, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        let (x, y, z) = (axis.as_ref().x, axis.as_ref().y, axis.as_ref().z);
        let mut m = Matrix4::identity();
        m[(0, 0)] = t * x * x + c;
        m[(0, 1)] = t * x * y - s * z;
        m[(0, 2)] = t * x * z + s * y;
        m[(1, 0)] = t * x * y + s * z;
        m[(1, 1)] = t * y * y + c;
        m[(1, 2)] = t * y * z - s * x;
        m[(2, 0)] = t * x * z - s * y;
        m[(2, 1)] = t * y * z + s * x;
        m[(2, 2)] = t * z * z + c;
        Self { matrix: m }
    }

    /// Compose: `self` then `other` (self * other).
    ///
    /// Applying the result to `p` gives `self(other(p))`.
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Transform a direction vector (ignores translation).
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        let r = self.matrix * Vector4::new(v.x, v.y, v.z, 0.0);
        Vec3::new(r.x, r.y, r.z)
    }

    /// Upper-left 3x3 block (rotation/scale part).
    pub fn rotation_part(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Inverse of a pure rotation: the transpose of the 3x3 block.
    ///
    /// Only valid when `self` has no translation or scale.
    pub fn rotation_inverse(&self) -> Self {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation_part().transpose());
        Self { matrix: m }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Tolerance for geometric comparisons.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Angular tolerance in radians.
    pub angular: f64,
}

impl Tolerance {
    /// Default tolerance (1e-9 rad).
    pub const DEFAULT: Self = Self { angular: 1e-9 };

    /// Check if the sine of an angle is effectively zero.
    pub fn is_parallel(&self, sin_angle: f64) -> bool {
        sin_angle.abs() < self.angular
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}
