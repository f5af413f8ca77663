//! 2D math primitives layered on glam.
//!
//! Rotations are stored as a `(sin, cos)` pair so composing and applying them
//! never calls trig functions. Matrix solves mirror the small dense systems
//! the constraint solver builds (2x2 point constraints, 3x3 block limits).

use glam::{Mat2, Mat3, Vec2, Vec3};

/// 2D cross product of two vectors (a scalar).
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a vector and a scalar: `(s * v.y, -s * v.x)`.
#[inline]
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Cross product of a scalar and a vector: `(-s * v.y, s * v.x)`.
#[inline]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Rotation stored as sine and cosine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rot {
    pub s: f32,
    pub c: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Self = Self { s: 0.0, c: 1.0 };

    /// Rotation by `angle` radians.
    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    #[inline]
    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    #[inline]
    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    #[inline]
    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Compose rotations: `self * other`.
    #[inline]
    pub fn mul(&self, other: Rot) -> Rot {
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// Relative rotation: `self^T * other`.
    #[inline]
    pub fn mul_t(&self, other: Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }

    /// Rotate a vector.
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse-rotate a vector.
    #[inline]
    pub fn apply_inv(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }
}

/// Rigid transform: translation plus rotation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub p: Vec2,
    pub q: Rot,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    #[inline]
    pub fn new(position: Vec2, angle: f32) -> Self {
        Self {
            p: position,
            q: Rot::from_angle(angle),
        }
    }

    #[inline]
    pub fn from_translation(position: Vec2) -> Self {
        Self {
            p: position,
            q: Rot::IDENTITY,
        }
    }

    /// Map a local point to world space.
    #[inline]
    pub fn transform_point(&self, v: Vec2) -> Vec2 {
        self.q.apply(v) + self.p
    }

    /// Map a world point to local space.
    #[inline]
    pub fn inv_transform_point(&self, v: Vec2) -> Vec2 {
        self.q.apply_inv(v - self.p)
    }

    /// Compose transforms: `self * other`.
    #[inline]
    pub fn mul(&self, other: &Transform) -> Transform {
        Transform {
            p: self.q.apply(other.p) + self.p,
            q: self.q.mul(other.q),
        }
    }

    /// Relative transform: `self^-1 * other`.
    #[inline]
    pub fn mul_t(&self, other: &Transform) -> Transform {
        Transform {
            p: self.q.apply_inv(other.p - self.p),
            q: self.q.mul_t(other.q),
        }
    }
}

/// Motion of a body's center of mass over a step, used by continuous
/// collision to interpolate between the previous and current pose.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sweep {
    /// Center of mass in body-local coordinates.
    pub local_center: Vec2,
    /// World center at `alpha0`.
    pub c0: Vec2,
    /// World center at the end of the step.
    pub c: Vec2,
    /// Angle at `alpha0`.
    pub a0: f32,
    /// Angle at the end of the step.
    pub a: f32,
    /// Fraction of the step already consumed, in `[0, 1)`.
    pub alpha0: f32,
}

impl Sweep {
    /// Interpolated body transform at `beta` in `[0, 1]`, where 0 is `alpha0`.
    pub fn transform_at(&self, beta: f32) -> Transform {
        let p = self.c0 * (1.0 - beta) + self.c * beta;
        let angle = self.a0 * (1.0 - beta) + self.a * beta;
        let q = Rot::from_angle(angle);
        Transform {
            p: p - q.apply(self.local_center),
            q,
        }
    }

    /// Move the start of the sweep forward to `alpha`.
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += (self.a - self.a0) * beta;
        self.alpha0 = alpha;
    }

    /// Wrap the start angle into `[0, 2π)`, shifting the end angle with it.
    pub fn normalize(&mut self) {
        debug_assert!(self.a0.is_finite() && self.a.is_finite());
        let two_pi = 2.0 * std::f32::consts::PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

/// Solve `m * x = b` for a 2x2 matrix, returning zero when singular.
#[inline]
pub fn solve22(m: &Mat2, b: Vec2) -> Vec2 {
    let (a11, a12, a21, a22) = (m.x_axis.x, m.y_axis.x, m.x_axis.y, m.y_axis.y);
    let mut det = a11 * a22 - a12 * a21;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
}

/// Inverse of a 2x2 matrix, or zero when singular.
#[inline]
pub fn inverse22(m: &Mat2) -> Mat2 {
    let (a, b, c, d) = (m.x_axis.x, m.y_axis.x, m.x_axis.y, m.y_axis.y);
    let mut det = a * d - b * c;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Mat2::from_cols(Vec2::new(det * d, -det * c), Vec2::new(-det * b, det * a))
}

/// Solve `m * x = b` for a 3x3 matrix, returning zero when singular.
#[inline]
pub fn solve33(m: &Mat3, b: Vec3) -> Vec3 {
    let (ex, ey, ez) = (m.x_axis, m.y_axis, m.z_axis);
    let mut det = ex.dot(ey.cross(ez));
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec3::new(
        det * b.dot(ey.cross(ez)),
        det * ex.dot(b.cross(ez)),
        det * ex.dot(ey.cross(b)),
    )
}

/// Solve the upper-left 2x2 block of `m` against `b`.
#[inline]
pub fn solve22_of33(m: &Mat3, b: Vec2) -> Vec2 {
    let (a11, a12, a21, a22) = (m.x_axis.x, m.y_axis.x, m.x_axis.y, m.y_axis.y);
    let mut det = a11 * a22 - a12 * a21;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
}

/// Inverse of the upper-left 2x2 block, embedded in a 3x3 with a zero third row/column.
pub fn inverse22_of33(m: &Mat3) -> Mat3 {
    let (a, b, c, d) = (m.x_axis.x, m.y_axis.x, m.x_axis.y, m.y_axis.y);
    let mut det = a * d - b * c;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Mat3::from_cols(
        Vec3::new(det * d, -det * c, 0.0),
        Vec3::new(-det * b, det * a, 0.0),
        Vec3::ZERO,
    )
}

/// Inverse of a symmetric 3x3 matrix, or zero when singular.
pub fn sym_inverse33(m: &Mat3) -> Mat3 {
    let (ex, ey, ez) = (m.x_axis, m.y_axis, m.z_axis);
    let mut det = ex.dot(ey.cross(ez));
    if det != 0.0 {
        det = 1.0 / det;
    }

    let (a11, a12, a13) = (ex.x, ey.x, ez.x);
    let (a22, a23) = (ey.y, ez.y);
    let a33 = ez.z;

    let x = Vec3::new(
        det * (a22 * a33 - a23 * a23),
        det * (a13 * a23 - a12 * a33),
        det * (a12 * a23 - a13 * a22),
    );
    let y = Vec3::new(
        x.y,
        det * (a11 * a33 - a13 * a13),
        det * (a13 * a12 - a11 * a23),
    );
    let z = Vec3::new(x.z, y.z, det * (a11 * a22 - a12 * a12));
    Mat3::from_cols(x, y, z)
}

/// Multiply the upper-left 2x2 block of `m` by `v`.
#[inline]
pub fn mul22_of33(m: &Mat3, v: Vec2) -> Vec2 {
    Vec2::new(
        m.x_axis.x * v.x + m.y_axis.x * v.y,
        m.x_axis.y * v.x + m.y_axis.y * v.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_rot_apply_and_inverse() {
        let q = Rot::from_angle(FRAC_PI_2);
        let v = q.apply(Vec2::X);
        assert!((v - Vec2::Y).length() < 1e-6);
        let back = q.apply_inv(v);
        assert!((back - Vec2::X).length() < 1e-6);
        assert!((q.angle() - FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_transform_mul_t_is_relative() {
        let a = Transform::new(Vec2::new(1.0, 2.0), 0.3);
        let b = Transform::new(Vec2::new(-2.0, 0.5), -1.1);
        let rel = a.mul_t(&b);
        let p = Vec2::new(0.7, -0.2);
        let direct = a.inv_transform_point(b.transform_point(p));
        assert!((rel.transform_point(p) - direct).length() < 1e-5);
        assert!((a.mul(&rel).transform_point(p) - b.transform_point(p)).length() < 1e-5);
    }

    #[test]
    fn test_sweep_advance_and_interpolate() {
        let mut sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: Vec2::ZERO,
            c: Vec2::new(10.0, 0.0),
            a0: 0.0,
            a: 1.0,
            alpha0: 0.0,
        };
        let mid = sweep.transform_at(0.5);
        assert!((mid.p - Vec2::new(5.0, 0.0)).length() < 1e-6);

        sweep.advance(0.5);
        assert!((sweep.c0 - Vec2::new(5.0, 0.0)).length() < 1e-6);
        assert!((sweep.a0 - 0.5).abs() < 1e-6);
        assert_eq!(sweep.alpha0, 0.5);
    }

    #[test]
    fn test_sweep_normalize_keeps_delta() {
        let mut sweep = Sweep {
            a0: 7.0,
            a: 7.5,
            ..Default::default()
        };
        sweep.normalize();
        assert!(sweep.a0 >= 0.0 && sweep.a0 < 2.0 * std::f32::consts::PI);
        assert!((sweep.a - sweep.a0 - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_solves() {
        let m = Mat2::from_cols(Vec2::new(4.0, 1.0), Vec2::new(2.0, 3.0));
        let x = solve22(&m, Vec2::new(8.0, 7.0));
        assert!((m * x - Vec2::new(8.0, 7.0)).length() < 1e-5);
        let inv = inverse22(&m);
        assert!((inv * (m * Vec2::new(1.0, -2.0)) - Vec2::new(1.0, -2.0)).length() < 1e-5);

        let m3 = Mat3::from_cols(
            Vec3::new(4.0, 1.0, 0.5),
            Vec3::new(1.0, 3.0, 0.2),
            Vec3::new(0.5, 0.2, 2.0),
        );
        let b = Vec3::new(1.0, 2.0, 3.0);
        let x3 = solve33(&m3, b);
        assert!((m3 * x3 - b).length() < 1e-5);
        let inv3 = sym_inverse33(&m3);
        assert!((inv3 * b - x3).length() < 1e-5);
    }

    #[test]
    fn test_singular_solve_is_zero() {
        let m = Mat2::from_cols(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert_eq!(solve22(&m, Vec2::ONE), Vec2::ZERO);
    }
}
