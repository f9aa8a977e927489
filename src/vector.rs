//! Degenerate-safe vector operations on top of [`nalgebra::Vector3`].
//!
//! Points, directions and velocities all share the same representation. The
//! extension trait adds the operations the tracing code needs that nalgebra
//! does not provide, with degenerate inputs mapped to sentinel values instead
//! of NaNs:
//! - Division and normalization that never divide by zero
//! - The 2-D turn test used for polygon containment
//! - Component-wise betweenness and R-Z projection

use nalgebra::Vector3;

use crate::helpers::{sign_eqt, BIG, SMALL};

/// Cartesian point, direction or velocity.
pub type Vector3d = Vector3<f64>;

/// The sentinel returned by degenerate divisions.
pub fn big() -> Vector3d {
    Vector3d::new(BIG, BIG, BIG)
}

/// The sentinel hit point of an intercept that does not exist.
pub fn neg_big() -> Vector3d {
    Vector3d::new(-BIG, -BIG, -BIG)
}

/// Unit vector from polar angle `theta` (from +z) and azimuth `phi`, both in radians.
pub fn spherical(theta: f64, phi: f64) -> Vector3d {
    let (st, ct) = theta.sin_cos();
    let (sp, cp) = phi.sin_cos();
    Vector3d::new(st * cp, st * sp, ct)
}

/// Point at distance `f` from `a` along the segment towards `b`.
pub fn linear_fit(f: f64, a: &Vector3d, b: &Vector3d) -> Vector3d {
    let d = f / (a - b).norm();
    a * (1.0 - d) + b * d
}


/// Operations on [`Vector3d`] that tolerate degenerate input.
pub trait VectorExt {
    /// Divides by `f`, or returns `(BIG, BIG, BIG)` when `|f| < SMALL`.
    fn safe_div(&self, f: f64) -> Vector3d;
    /// Unit vector in the same direction; a null vector is returned unchanged.
    fn safe_unit(&self) -> Vector3d;
    /// Cosine of the angle to `o`, or `-4` when either vector is null.
    fn cos_angle(&self, o: &Vector3d) -> f64;
    /// Angle to `o` in radians, or `BIG` when either vector is null.
    fn angle_rad(&self, o: &Vector3d) -> f64;
    /// Unit normal to the right of this direction in the x-y plane.
    fn right_normal(&self) -> Vector3d;
    /// Turn sign of this point relative to the directed segment `tail -> head`,
    /// evaluated in the x-y plane: `1` for left, `-1` for right, `0` on the line.
    fn turn(&self, tail: &Vector3d, head: &Vector3d) -> i32;
    /// Component of this vector along `o`.
    fn parallel_to(&self, o: &Vector3d) -> Vector3d;
    /// Component of this vector normal to `o`.
    fn perpendicular_to(&self, o: &Vector3d) -> Vector3d;
    /// True if every component lies within the closed range spanned by `tail` and `head`.
    fn is_between(&self, tail: &Vector3d, head: &Vector3d) -> bool;
    /// Projection into the R-Z half-plane, stored as `(r, z, 0)`.
    fn rz(&self) -> Vector3d;
    /// Largest absolute component difference.
    fn abs_diff(&self, o: &Vector3d) -> f64;
}

impl VectorExt for Vector3d {
    fn safe_div(&self, f: f64) -> Vector3d {
        if f.abs() < SMALL {
            big()
        } else {
            self / f
        }
    }

    fn safe_unit(&self) -> Vector3d {
        let norm = self.norm();
        if norm > 0.0 {
            self / norm
        } else {
            *self
        }
    }

    fn cos_angle(&self, o: &Vector3d) -> f64 {
        let denom = self.norm() * o.norm();
        if denom > 0.0 {
            self.dot(o) / denom
        } else {
            -4.0
        }
    }

    fn angle_rad(&self, o: &Vector3d) -> f64 {
        let c = self.cos_angle(o);
        if c < -1.5 {
            BIG
        } else {
            c.clamp(-1.0, 1.0).acos()
        }
    }

    fn right_normal(&self) -> Vector3d {
        Vector3d::new(self.y, -self.x, 0.0).safe_unit()
    }

    fn turn(&self, tail: &Vector3d, head: &Vector3d) -> i32 {
        let w = head - tail;
        let v = self - tail;
        sign_eqt(w.x * v.y - w.y * v.x, SMALL)
    }

    fn parallel_to(&self, o: &Vector3d) -> Vector3d {
        let n = o.safe_unit();
        n * self.dot(&n)
    }

    fn perpendicular_to(&self, o: &Vector3d) -> Vector3d {
        self - self.parallel_to(o)
    }

    fn is_between(&self, tail: &Vector3d, head: &Vector3d) -> bool {
        (0..3).all(|i| (self[i] - tail[i]) * (self[i] - head[i]) <= 0.0)
    }

    fn rz(&self) -> Vector3d {
        Vector3d::new((self.x * self.x + self.y * self.y).sqrt(), self.z, 0.0)
    }

    fn abs_diff(&self, o: &Vector3d) -> f64 {
        (self - o).abs().max()
    }
}
