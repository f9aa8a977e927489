//! Numeric constants and scalar helpers shared by the geometry and transport code.
//!
//! This module provides:
//! - Sentinel magnitudes used for degenerate geometry
//! - Tolerances used by intercept searches
//! - A tolerance-aware sign function and quadratic solver
//! - The Planck blackbody function in spectroscopic units

/// Sentinel magnitude returned by degenerate vector operations.
pub const BIG: f64 = 1.0e100;
/// Reciprocal of [`BIG`]; anything smaller in magnitude is treated as zero by divisions.
pub const SMALL: f64 = 1.0 / BIG;
/// Speed of light in cm/s. Detector rays travel with this speed.
pub const CV: f64 = 2.99792458e10;
pub const PI: f64 = std::f64::consts::PI;
pub const TWO_PI: f64 = 2.0 * PI;
pub const FOUR_PI: f64 = 4.0 * PI;
/// Tolerance passed to every face intercept while resolving a zone exit.
pub const ZONE_HIT_TOLERANCE: f64 = 1.0e-19;
/// Tolerance for checking that a detector ray reaches the bounding sphere.
pub const DETECTOR_HIT_TOLERANCE: f64 = 1.0e-15;
/// Column width for integer identifiers in text output.
pub const INT_WIDTH: usize = 11;
/// Transmission above which the optically thin transport formula is used.
pub fn thin_transmission() -> f64 {
    (-2.0e-10_f64).exp()
}


/// Sign of `x`, treating anything within `|eqt|` of zero as zero.
pub fn sign_eqt(x: f64, eqt: f64) -> i32 {
    let eqt = eqt.abs();
    if x > eqt {
        1
    } else if x < -eqt {
        -1
    } else {
        0
    }
}

/// Real roots of a quadratic, largest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuadraticRoots {
    None,
    /// Linear equation (vanishing leading coefficient).
    One(f64),
    /// Repeated root: the line is tangent.
    Double(f64),
    /// Two distinct roots with `x1 > x2`.
    Two(f64, f64),
}

/// Solves `a x^2 + b x + c = 0` with coefficients smaller than `tol` treated as zero.
///
/// **Context**: Sphere and cone intercepts reduce to a quadratic in the ray
/// parameter. Rays that start on the surface produce a root at (or very near)
/// zero, so cancellation in the textbook formula must be avoided.
///
/// **How it Works**: Uses the `q = -(b + sgn(b) sqrt(d)) / 2` form so that
/// neither root is computed as a difference of nearly equal numbers, then
/// orders the roots so that the first is the larger.
pub fn solve_quadratic(a: f64, b: f64, c: f64, tol: f64) -> QuadraticRoots {
    if a.abs() <= tol {
        if b.abs() <= tol {
            return QuadraticRoots::None;
        }
        return QuadraticRoots::One(-c / b);
    }

    let mut d = b * b - 4.0 * a * c;
    if d.abs() <= tol {
        d = 0.0;
    }
    if d < 0.0 {
        return QuadraticRoots::None;
    }

    let (x1, x2) = if b.abs() <= tol {
        let x = (-c / a).sqrt();
        (x, -x)
    } else {
        let q = -0.5 * (b + b.signum() * d.sqrt());
        (q / a, c / q)
    };
    let (x1, x2) = if x1 < x2 { (x2, x1) } else { (x1, x2) };

    if d == 0.0 {
        QuadraticRoots::Double(x1)
    } else {
        QuadraticRoots::Two(x1, x2)
    }
}

/// Blackbody specific intensity in W/cm2/sr/eV at photon energy `hv` for temperature `tev`, both in eV.
pub fn planckian(hv: f64, tev: f64) -> f64 {
    if tev <= 0.0 {
        return 0.0;
    }
    5040.367 * hv.powi(3) / ((hv / tev).exp() - 1.0)
}

/// Number of decimal digits needed to print `n`.
pub fn ndigits(n: usize) -> usize {
    let mut digits = 1;
    let mut k = n / 10;
    while k > 0 {
        digits += 1;
        k /= 10;
    }
    digits
}
