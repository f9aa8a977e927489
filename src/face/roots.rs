//! Root selection for faces whose intercept is a quadratic in the ray parameter.

use log::trace;

use super::{FaceId, Intercept};
use crate::error::Result;
use crate::helpers::{sign_eqt, QuadraticRoots};
use crate::vector::Vector3d;

/// Picks the intercept of a curved face from the roots of its quadratic.
///
/// **Context**: A ray crossing a sphere or cone ribbon meets its surface
/// twice. The ray must move to the nearest forward hit that lies within the
/// face's bounds, and must never be reported as hitting the face it is
/// leaving, where one root sits at (or within round-off of) zero.
///
/// **How it Works**: When the ray left this very face, the root nearer zero
/// is that departure point and only the other root is considered. Otherwise
/// the roots above tolerance are tried in ascending order. The first one
/// whose hit point passes `contains` is returned as found. A tangent line
/// or a failed search is still reported with its `t` and hit point, but
/// flagged as not found.
pub(crate) fn choose_root<F>(
    roots: QuadraticRoots,
    p: &Vector3d,
    u: &Vector3d,
    eqt: f64,
    own: FaceId,
    leaving: bool,
    contains: F,
) -> Result<Intercept>
where
    F: Fn(&Vector3d) -> Result<bool>,
{
    let (candidates, fallback): (Vec<f64>, f64) = match roots {
        QuadraticRoots::None => return Ok(Intercept::missed(own)),
        QuadraticRoots::Double(x) => return Ok(Intercept::at(p, u, x, own, false)),
        QuadraticRoots::One(x) => (vec![x], x),
        QuadraticRoots::Two(x1, x2) if leaving => {
            let other = if x2.abs() < x1.abs() { x1 } else { x2 };
            (vec![other], x1)
        }
        QuadraticRoots::Two(x1, x2) => (vec![x2, x1], x1),
    };

    let mut rejected = None;
    for t in candidates.into_iter().filter(|t| sign_eqt(*t, eqt) == 1) {
        let hit = Intercept::at(p, u, t, own, true);
        if contains(&hit.w)? {
            return Ok(hit);
        }
        trace!("root t={t:e} of face {own:?} lies outside its bounds");
        rejected = Some(t);
    }

    Ok(Intercept::at(p, u, rejected.unwrap_or(fallback), own, false))
}
