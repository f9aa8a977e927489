//! Composite faces.
//!
//! The bounding zone of a mesh is enclosed on the inside by the union of the
//! outward faces of every other zone. A [`Surface`] gathers those faces
//! behind one identity so that the bounding zone needs only two faces.

use serde::{Deserialize, Serialize};

use super::{FaceData, FaceId, Intercept, Primitive, Shape};
use crate::error::{Result, TraceError};
use crate::grid::Grid;
use crate::vector::Vector3d;

/// Relative distance under which a point counts as lying on a constituent.
const ON_FACE_TOLERANCE: f64 = 1.0e-12;


/// Ordered collection of primitive faces that behaves as a single face.
///
/// The intercept of a surface reports the constituent it hit as
/// `FaceId(index, -1)`. Mesh adjacency uses that index to pick the
/// matching entry in the surface's neighbor list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    #[serde(flatten)]
    pub data: FaceData,
    #[serde(default)]
    pub faces: Vec<Primitive>,
}

impl Surface {
    pub fn new(data: FaceData) -> Self {
        Self {
            data,
            faces: Vec::new(),
        }
    }

    pub fn add_face(&mut self, face: Primitive) {
        self.faces.push(face);
    }

    pub fn face(&self, i: usize) -> Result<&Primitive> {
        self.faces
            .get(i)
            .ok_or_else(|| TraceError::out_of_range("surface face", i, self.faces.len()))
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn clear(&mut self) {
        self.faces.clear();
        self.data.clear();
    }
}

impl Shape for Surface {
    fn data(&self) -> &FaceData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut FaceData {
        &mut self.data
    }

    fn is_curved(&self, _grid: &Grid) -> Result<bool> {
        Ok(true)
    }

    fn area2_normal_center(&self, _grid: &Grid) -> Result<(Vector3d, Vector3d)> {
        Ok((Vector3d::zeros(), Vector3d::zeros()))
    }

    fn area(&self, grid: &Grid) -> Result<f64> {
        self.faces.iter().map(|f| f.shape().area(grid)).sum()
    }

    fn distance(&self, _grid: &Grid, _w: &Vector3d) -> Result<f64> {
        Ok(0.0)
    }

    fn subpoint(&self, _grid: &Grid, _w: &Vector3d) -> Result<Vector3d> {
        Ok(Vector3d::zeros())
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
        let on_face = ON_FACE_TOLERANCE * (1.0 + p.norm());
        let mut best: Option<Intercept> = None;
        for (i, face) in self.faces.iter().enumerate() {
            let shape = face.shape();
            let from = if fid == own && shape.distance(grid, p)?.abs() <= on_face {
                face.fid()
            } else {
                fid
            };
            let h = shape.intercept(grid, p, u, eqt, from)?;
            if h.is_found && best.map_or(true, |b| h.t < b.t) {
                best = Some(Intercept {
                    fid: FaceId::new(i, FaceId::COMPOSITE),
                    ..h
                });
            }
        }
        Ok(best.unwrap_or_else(|| Intercept::missed(own)))
    }

    fn velocity(&self, _grid: &Grid, _w: &Vector3d) -> Result<Vector3d> {
        Ok(Vector3d::zeros())
    }
}
