//! Conical ribbons for axisymmetric (R-Z) geometry.
//!
//! A cone face holds two nodes whose coordinates live in the R-Z half-plane,
//! stored as `(r, z, 0)`. Revolving the segment between them around the z
//! axis gives a frustum; a segment at constant z gives an annular disk and a
//! segment at constant r a cylinder. Points handed to a cone are Cartesian
//! and are projected into R-Z with [`VectorExt::rz`].

use serde::{Deserialize, Serialize};

use super::roots::choose_root;
use super::{FaceData, FaceId, Intercept, Shape};
use crate::error::Result;
use crate::grid::Grid;
use crate::helpers::{sign_eqt, solve_quadratic, SMALL, TWO_PI};
use crate::vector::{Vector3d, VectorExt};

/// A cone whose nodes differ in z by no more than this is a flat disk (cm).
pub const CONE_FLAT_TOLERANCE: f64 = 1.0e-8;
/// Slack of the R-Z segment containment test.
pub const CONE_CONTAINS_TOLERANCE: f64 = 1.0e-19;


/// Conical ribbon between two R-Z nodes; the node order sets the normal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cone {
    #[serde(flatten)]
    pub data: FaceData,
}

impl Cone {
    pub fn new(data: FaceData) -> Self {
        Self { data }
    }

    fn ends(&self, grid: &Grid) -> Result<(Vector3d, Vector3d)> {
        Ok((self.data.point(grid, 0)?, self.data.point(grid, 1)?))
    }
}

impl Shape for Cone {
    fn data(&self) -> &FaceData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut FaceData {
        &mut self.data
    }

    fn is_curved(&self, grid: &Grid) -> Result<bool> {
        let (a, b) = self.ends(grid)?;
        Ok((b.y - a.y).abs() > CONE_FLAT_TOLERANCE)
    }

    /// Lateral area of the frustum.
    fn area2_normal_center(&self, grid: &Grid) -> Result<(Vector3d, Vector3d)> {
        let (a, b) = self.ends(grid)?;
        let v = b - a;
        let s = v.x.hypot(v.y);
        let area2 = TWO_PI * (a.x + b.x) * s;
        Ok((v.right_normal() * area2, (a + b) / 2.0))
    }

    fn distance(&self, grid: &Grid, w: &Vector3d) -> Result<f64> {
        let d = w.rz() - self.subpoint(grid, w)?.rz();
        Ok(d.dot(&self.normal(grid)?))
    }

    fn subpoint(&self, grid: &Grid, w: &Vector3d) -> Result<Vector3d> {
        let (a, b) = self.ends(grid)?;
        let wr = w.x.hypot(w.y);
        let phi = w.y.atan2(w.x);
        let dr = b.x - a.x;
        let dz = b.y - a.y;
        let t = ((wr - a.x) * dr + (w.z - a.y) * dz) / (dr * dr + dz * dz);
        let rs = a.x + t * dr;
        Ok(Vector3d::new(rs * phi.cos(), rs * phi.sin(), a.y + t * dz))
    }

    fn contains(&self, grid: &Grid, w: &Vector3d) -> Result<bool> {
        let (a, b) = self.ends(grid)?;
        let v = w.rz();
        Ok((v - a).dot(&(v - b)) <= CONE_CONTAINS_TOLERANCE)
    }

    fn intercept(
        &self,
        grid: &Grid,
        p: &Vector3d,
        u: &Vector3d,
        eqt: f64,
        fid: FaceId,
    ) -> Result<Intercept> {
        let own = self.data.fid();
        let (a, b) = self.ends(grid)?;
        let (ra, za) = (a.x, a.y);

        if !self.is_curved(grid)? {
            if own == fid || u.z.abs() < SMALL {
                return Ok(Intercept::missed(own));
            }
            let t = (za - p.z) / u.z;
            let mut hit = Intercept::at(p, u, t, own, false);
            hit.is_found = sign_eqt(t, eqt) == 1 && self.contains(grid, &hit.w)?;
            return Ok(hit);
        }

        let dr = b.x - ra;
        let dz = b.y - za;
        let zd = p.z - za;
        let dz2 = dz * dz;
        let g = dz * ra * dr;
        let h = g + zd * dr * dr;
        let uzdr = u.z * dr;

        let qa = dz2 * (u.x * u.x + u.y * u.y) - uzdr * uzdr;
        let qb = 2.0 * (dz2 * (p.x * u.x + p.y * u.y) - u.z * h);
        let qc = dz2 * (p.x * p.x + p.y * p.y - ra * ra) - zd * (g + h);

        choose_root(
            solve_quadratic(qa, qb, qc, eqt),
            p,
            u,
            eqt,
            own,
            own == fid,
            |w| self.contains(grid, w),
        )
    }

    /// Inverse-distance weighting of the node velocities, which are stored in R-Z.
    fn velocity(&self, grid: &Grid, w: &Vector3d) -> Result<Vector3d> {
        let wrz = w.rz();
        let phi = w.y.atan2(w.x);
        let mut u = Vector3d::zeros();
        let mut s = 0.0;
        for i in 0..2 {
            let node = grid.node(self.data.node(i)?)?;
            let d = (node.position - wrz).norm();
            if d < SMALL {
                u = node.velocity;
                s = 1.0;
                break;
            }
            s += 1.0 / d;
            u += node.velocity / d;
        }
        u /= s;
        Ok(Vector3d::new(u.x * phi.cos(), u.x * phi.sin(), u.y))
    }
}
