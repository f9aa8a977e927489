use serde::{Deserialize, Serialize};

use super::roots::choose_root;
use super::{FaceData, FaceId, Intercept, Shape};
use crate::error::Result;
use crate::grid::Grid;
use crate::helpers::{solve_quadratic, FOUR_PI};
use crate::vector::{neg_big, Vector3d, VectorExt};


/// Sphere around a single center node.
///
/// The sign of `r` gives the orientation relative to the owning zone: a
/// positive radius has its normal pointing away from the center. The
/// surface moves with the center node plus `v` along the local normal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    #[serde(flatten)]
    pub data: FaceData,
    pub r: f64,
    #[serde(default)]
    pub v: f64,
}

impl Sphere {
    pub fn new(data: FaceData, r: f64, v: f64) -> Self {
        Self { data, r, v }
    }

    pub fn radius(&self) -> f64 {
        self.r.abs()
    }

    /// `1` for an outward facing sphere, `-1` for an inward facing one.
    pub fn orientation(&self) -> f64 {
        if self.r < 0.0 {
            -1.0
        } else {
            1.0
        }
    }

    fn center(&self, grid: &Grid) -> Result<Vector3d> {
        self.data.point(grid, 0)
    }
}

impl Shape for Sphere {
    fn data(&self) -> &FaceData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut FaceData {
        &mut self.data
    }

    fn is_curved(&self, _grid: &Grid) -> Result<bool> {
        Ok(true)
    }

    /// Orientation only: the normal of a sphere depends on the point.
    fn area2_normal_center(&self, grid: &Grid) -> Result<(Vector3d, Vector3d)> {
        let area2 = 2.0 * self.orientation() * self.area(grid)?;
        Ok((Vector3d::new(area2, 0.0, 0.0), Vector3d::zeros()))
    }

    fn normal(&self, _grid: &Grid) -> Result<Vector3d> {
        Ok(Vector3d::new(self.orientation(), 0.0, 0.0))
    }

    fn area(&self, _grid: &Grid) -> Result<f64> {
        Ok(FOUR_PI * self.r * self.r)
    }

    fn face_point(&self, grid: &Grid) -> Result<Vector3d> {
        self.center(grid)
    }

    fn distance(&self, grid: &Grid, w: &Vector3d) -> Result<f64> {
        let c = self.center(grid)?;
        Ok(((w - c).norm() - self.radius()) * self.orientation())
    }

    fn subpoint(&self, grid: &Grid, w: &Vector3d) -> Result<Vector3d> {
        let c = self.center(grid)?;
        let d = w - c;
        let norm = d.norm();
        if norm > 0.0 {
            Ok(c + d * (self.radius() / norm))
        } else {
            Ok(neg_big())
        }
    }

    fn contains(&self, _grid: &Grid, _w: &Vector3d) -> Result<bool> {
        Ok(true)
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
        let d = p - self.center(grid)?;
        let a = u.dot(u);
        let b = 2.0 * d.dot(u);
        let c = d.dot(&d) - self.r * self.r;
        choose_root(solve_quadratic(a, b, c, eqt), p, u, eqt, own, own == fid, |_| Ok(true))
    }

    fn velocity(&self, grid: &Grid, w: &Vector3d) -> Result<Vector3d> {
        let c = self.center(grid)?;
        let n = (w - c).safe_unit();
        Ok(self.data.node(0).and_then(|i| grid.velocity(i))? + n * self.v)
    }
}
