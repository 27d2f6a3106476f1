//! Rigid-body geometry for tracked devices.
//!
//! Tracking hardware reports a device pose as a row-major 3×4 matrix: the
//! left 3×3 block is the orientation and the last column is the position,
//! both in the tracking-space frame defined by the hardware's calibration.
//! [`TrackerTransform`] holds that pose; [`RotationMatrix::to_quaternion`]
//! produces the unit quaternion sent over the wire.
//!
//! # Example
//!
//! ```rust
//! use sensorbridge_types::{TrackerTransform, Quaternion};
//!
//! let t = TrackerTransform::from_rows_3x4(&[
//!     [1.0, 0.0, 0.0, 1.0],
//!     [0.0, 1.0, 0.0, 2.0],
//!     [0.0, 0.0, 1.0, 3.0],
//! ]);
//! let q = t.rotation.to_quaternion().unwrap();
//! assert_eq!(q, Quaternion::identity());
//! assert!((t.position.z - 3.0).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};

use crate::BridgeError;

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D position vector (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    /// Euclidean length.
    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
///
/// Field order is also the wire order of the `rotation` object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    pub fn norm(self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// The 3×3 rotation matrix equivalent to this unit quaternion.
    pub fn to_matrix(self) -> RotationMatrix {
        let Self { w, x, y, z } = self;
        RotationMatrix([
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - w * z),
                2.0 * (x * z + w * y),
            ],
            [
                2.0 * (x * y + w * z),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - w * x),
            ],
            [
                2.0 * (x * z - w * y),
                2.0 * (y * z + w * x),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RotationMatrix
// ────────────────────────────────────────────────────────────────────────────

/// A row-major 3×3 orientation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationMatrix(pub [[f64; 3]; 3]);

impl RotationMatrix {
    pub fn identity() -> Self {
        Self([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn rows(&self) -> &[[f64; 3]; 3] {
        &self.0
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.0;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().flatten().all(|v| v.is_finite())
    }

    /// Convert to a canonical unit quaternion (`w >= 0`).
    ///
    /// Uses Shepperd's method, branching on the largest diagonal term so the
    /// square root argument stays well away from zero. Slightly non-orthogonal
    /// input (accumulated float error from the driver) is tolerated; the
    /// result is renormalised.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Conversion`] when the matrix contains non-finite
    /// values or is not a proper rotation (determinant ≤ 0).
    pub fn to_quaternion(&self) -> Result<Quaternion, BridgeError> {
        if !self.is_finite() {
            return Err(BridgeError::Conversion(
                "rotation matrix contains non-finite values".to_string(),
            ));
        }
        let det = self.determinant();
        if det <= 1e-9 {
            return Err(BridgeError::Conversion(format!(
                "matrix is not a proper rotation (determinant {det})"
            )));
        }

        let m = &self.0;
        let trace = m[0][0] + m[1][1] + m[2][2];
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Quaternion::new(
                0.25 * s,
                (m[2][1] - m[1][2]) / s,
                (m[0][2] - m[2][0]) / s,
                (m[1][0] - m[0][1]) / s,
            )
        } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
            let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
            Quaternion::new(
                (m[2][1] - m[1][2]) / s,
                0.25 * s,
                (m[0][1] + m[1][0]) / s,
                (m[0][2] + m[2][0]) / s,
            )
        } else if m[1][1] > m[2][2] {
            let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
            Quaternion::new(
                (m[0][2] - m[2][0]) / s,
                (m[0][1] + m[1][0]) / s,
                0.25 * s,
                (m[1][2] + m[2][1]) / s,
            )
        } else {
            let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
            Quaternion::new(
                (m[1][0] - m[0][1]) / s,
                (m[0][2] + m[2][0]) / s,
                (m[1][2] + m[2][1]) / s,
                0.25 * s,
            )
        };

        let n = q.norm();
        if !n.is_finite() || n < 1e-9 {
            return Err(BridgeError::Conversion(format!(
                "degenerate rotation (quaternion norm {n})"
            )));
        }
        let q = Quaternion::new(q.w / n, q.x / n, q.y / n, q.z / n);
        // q and -q are the same rotation; keep the scalar part non-negative.
        Ok(if q.w < 0.0 {
            Quaternion::new(-q.w, -q.x, -q.y, -q.z)
        } else {
            q
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TrackerTransform
// ────────────────────────────────────────────────────────────────────────────

/// Pose of a tracked device in tracking space: rotate by `rotation`, then
/// translate by `position`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerTransform {
    pub position: Vec3,
    pub rotation: RotationMatrix,
}

impl TrackerTransform {
    pub fn new(position: Vec3, rotation: RotationMatrix) -> Self {
        Self { position, rotation }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), RotationMatrix::identity())
    }

    /// Split a row-major 3×4 device-to-tracking matrix into position and
    /// orientation.
    pub fn from_rows_3x4(m: &[[f64; 4]; 3]) -> Self {
        let position = Vec3::new(m[0][3], m[1][3], m[2][3]);
        let rotation = RotationMatrix([
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ]);
        Self::new(position, rotation)
    }

    /// Inverse of [`from_rows_3x4`](Self::from_rows_3x4).
    pub fn to_rows_3x4(&self) -> [[f64; 4]; 3] {
        let r = &self.rotation.0;
        let p = self.position;
        [
            [r[0][0], r[0][1], r[0][2], p.x],
            [r[1][0], r[1][1], r[1][2], p.y],
            [r[2][0], r[2][1], r[2][2], p.z],
        ]
    }
}

impl Default for TrackerTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_3};

    fn assert_matrix_close(a: &RotationMatrix, b: &RotationMatrix) {
        for i in 0..3 {
            for j in 0..3 {
                assert!(
                    (a.0[i][j] - b.0[i][j]).abs() < 1e-9,
                    "element [{i}][{j}]: {} vs {}",
                    a.0[i][j],
                    b.0[i][j]
                );
            }
        }
    }

    /// Rotation of `angle` radians about the (unnormalised) axis.
    fn axis_angle(axis: Vec3, angle: f64) -> Quaternion {
        let a = axis.scale(1.0 / axis.norm());
        let (s, c) = (angle / 2.0).sin_cos();
        Quaternion::new(c, a.x * s, a.y * s, a.z * s)
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_90deg_yaw_gives_yaw_matrix() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let expected = RotationMatrix([[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_matrix_close(&q.to_matrix(), &expected);
    }

    #[test]
    fn quaternion_half_turn_about_x_flips_y_and_z() {
        let q = Quaternion::new(0.0, 1.0, 0.0, 0.0);
        let expected = RotationMatrix([[1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]]);
        assert_matrix_close(&q.to_matrix(), &expected);
    }

    #[test]
    fn quaternion_120deg_about_diagonal_cycles_axes() {
        // Rotating 120 degrees about (1,1,1) maps x to y, y to z, z to x.
        let q = Quaternion::new(0.5, 0.5, 0.5, 0.5);
        let expected = RotationMatrix([[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        assert_matrix_close(&q.to_matrix(), &expected);
    }

    // ── RotationMatrix → Quaternion ─────────────────────────────────────────

    #[test]
    fn identity_matrix_is_identity_quaternion() {
        let q = RotationMatrix::identity().to_quaternion().unwrap();
        assert_eq!(q, Quaternion::identity());
    }

    #[test]
    fn yaw_matrix_converts_to_yaw_quaternion() {
        let m = RotationMatrix([[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        let q = m.to_quaternion().unwrap();
        assert!((q.w - FRAC_1_SQRT_2).abs() < 1e-9);
        assert!((q.z - FRAC_1_SQRT_2).abs() < 1e-9);
        assert!(q.x.abs() < 1e-9 && q.y.abs() < 1e-9);
    }

    #[test]
    fn matrix_quaternion_matrix_roundtrip_covers_every_branch() {
        // Angles near π push the conversion through the diagonal branches.
        let cases = [
            axis_angle(Vec3::new(0.0, 0.0, 1.0), FRAC_PI_3),
            axis_angle(Vec3::new(1.0, 0.0, 0.0), 3.0),
            axis_angle(Vec3::new(0.0, 1.0, 0.0), 3.1),
            axis_angle(Vec3::new(0.1, 0.2, 1.0), 3.05),
            axis_angle(Vec3::new(-0.4, 0.9, 0.2), 2.2),
        ];
        for q in cases {
            let m = q.to_matrix();
            let back = m.to_quaternion().unwrap();
            assert!((back.norm() - 1.0).abs() < 1e-9);
            assert!(back.w >= 0.0);
            assert_matrix_close(&back.to_matrix(), &m);
        }
    }

    #[test]
    fn half_turn_is_canonical() {
        let m = axis_angle(Vec3::new(1.0, 0.0, 0.0), std::f64::consts::PI).to_matrix();
        let q = m.to_quaternion().unwrap();
        assert!(q.w.abs() < 1e-9);
        assert!((q.x.abs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn non_finite_matrix_is_rejected() {
        let mut m = RotationMatrix::identity();
        m.0[1][2] = f64::NAN;
        assert!(matches!(m.to_quaternion(), Err(BridgeError::Conversion(_))));
    }

    #[test]
    fn reflection_and_zero_matrix_are_rejected() {
        let reflection = RotationMatrix([[-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(reflection.to_quaternion().is_err());
        let zero = RotationMatrix([[0.0; 3]; 3]);
        assert!(zero.to_quaternion().is_err());
    }

    // ── TrackerTransform ────────────────────────────────────────────────────

    #[test]
    fn from_rows_3x4_splits_position_and_rotation() {
        let t = TrackerTransform::from_rows_3x4(&[
            [0.0, -1.0, 0.0, 0.5],
            [1.0, 0.0, 0.0, -0.25],
            [0.0, 0.0, 1.0, 1.75],
        ]);
        assert_eq!(t.position, Vec3::new(0.5, -0.25, 1.75));
        assert_eq!(t.rotation.0[1][0], 1.0);
        assert_eq!(TrackerTransform::from_rows_3x4(&t.to_rows_3x4()), t);
    }
}
