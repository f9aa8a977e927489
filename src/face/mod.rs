//! Boundary faces of mesh zones and the ray intercept contract.
//!
//! A zone is bounded by faces of four kinds. Each kind answers the same
//! geometric questions through the [`Shape`] trait, given the [`Grid`] that
//! holds its node coordinates:
//! - Area, normal and center
//! - Signed distance and perpendicular projection of a point
//! - Containment of a point already on the face's surface
//! - The next forward intercept of a ray
//! - Interpolated surface velocity
//!
//! # Key Components
//!
//! - [`FaceId`]: `(zone, local id)` identity with sentinels
//! - [`Intercept`]: result of a ray/face intersection
//! - [`Face`]: closed set of variants stored by a zone
//! - [`Primitive`]: the non-composite variants a [`Surface`] may hold

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::grid::Grid;
use crate::helpers::{BIG, INT_WIDTH};
use crate::vector::{neg_big, Vector3d, VectorExt};

mod cone;
mod polygon;
mod roots;
mod sphere;
mod surface;

pub use cone::Cone;
pub use polygon::Polygon;
pub use sphere::Sphere;
pub use surface::Surface;

/// Identity of a face within the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceId {
    pub zone: usize,
    pub id: i16,
}

impl FaceId {
    /// Local id of a face that belongs to a composite surface.
    pub const COMPOSITE: i16 = -1;
    /// Local id of an uninitialized face, also returned when a ray leaves the mesh.
    pub const UNSET: i16 = -2;
    /// The mesh's outer boundary.
    pub const BOUNDING_SPHERE: FaceId = FaceId { zone: 0, id: 0 };
    /// The inner composite face of the bounding zone.
    pub const BOUNDING_SURFACE: FaceId = FaceId { zone: 0, id: 1 };
    /// Returned by [`crate::mesh::Mesh::next_face`] when there is no zone beyond the exit.
    pub const EXIT: FaceId = FaceId {
        zone: 0,
        id: FaceId::UNSET,
    };

    pub const fn new(zone: usize, id: i16) -> Self {
        Self { zone, id }
    }

    /// True for a face identified only by its position inside a composite surface.
    pub fn is_composite_member(&self) -> bool {
        self.id == Self::COMPOSITE
    }

    /// Local index of a regular face; composite members and sentinels have none.
    pub fn index(&self) -> Option<usize> {
        usize::try_from(self.id).ok()
    }
}

impl Default for FaceId {
    fn default() -> Self {
        Self::EXIT
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>w$}{:>w$}", self.zone, self.id, w = INT_WIDTH)
    }
}

/// Where a ray meets a face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intercept {
    /// Ray parameter of the hit; the hit point is `p + u * t`.
    pub t: f64,
    pub w: Vector3d,
    pub fid: FaceId,
    pub is_found: bool,
}

impl Default for Intercept {
    fn default() -> Self {
        Self {
            t: BIG,
            w: Vector3d::zeros(),
            fid: FaceId::default(),
            is_found: false,
        }
    }
}

impl Intercept {
    /// No forward intersection exists.
    pub fn missed(fid: FaceId) -> Self {
        Self {
            t: -BIG,
            w: neg_big(),
            fid,
            is_found: false,
        }
    }

    /// A candidate intersection at `t` along the ray.
    pub fn at(p: &Vector3d, u: &Vector3d, t: f64, fid: FaceId, is_found: bool) -> Self {
        Self {
            t,
            w: p + u * t,
            fid,
            is_found,
        }
    }
}

/// Fields common to every face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceData {
    pub zone: usize,
    pub id: i16,
    /// Indices into the grid, in winding order.
    #[serde(default)]
    pub nodes: Vec<usize>,
    /// Faces on the other side of this one.
    #[serde(default)]
    pub neighbors: Vec<FaceId>,
}

impl FaceData {
    pub fn new(zone: usize, id: i16, nodes: Vec<usize>) -> Self {
        Self {
            zone,
            id,
            nodes,
            neighbors: Vec::new(),
        }
    }

    pub fn fid(&self) -> FaceId {
        FaceId::new(self.zone, self.id)
    }

    /// Grid index of the `i`-th node.
    pub fn node(&self, i: usize) -> Result<usize> {
        self.nodes
            .get(i)
            .copied()
            .ok_or_else(|| TraceError::out_of_range("face node", i, self.nodes.len()))
    }

    /// Position of the `i`-th node.
    pub fn point(&self, grid: &Grid, i: usize) -> Result<Vector3d> {
        grid.position(self.node(i)?)
    }

    pub fn neighbor(&self, i: usize) -> Result<FaceId> {
        self.neighbors
            .get(i)
            .copied()
            .ok_or_else(|| TraceError::out_of_range("face neighbor", i, self.neighbors.len()))
    }

    pub fn add_neighbor(&mut self, zone: usize, id: i16) {
        self.neighbors.push(FaceId::new(zone, id));
    }

    /// Resets to the state of a default face.
    pub fn clear(&mut self) {
        *self = Self {
            id: FaceId::UNSET,
            ..Self::default()
        };
    }
}

/// The geometric contract every face kind fulfils.
pub trait Shape {
    fn data(&self) -> &FaceData;

    fn data_mut(&mut self) -> &mut FaceData;

    /// False only for planar faces.
    fn is_curved(&self, grid: &Grid) -> Result<bool>;

    /// Normal scaled by twice the face area, and the face center.
    fn area2_normal_center(&self, grid: &Grid) -> Result<(Vector3d, Vector3d)>;

    /// Signed distance of `w`, positive on the side the normal points to.
    fn distance(&self, grid: &Grid, w: &Vector3d) -> Result<f64>;

    /// Foot of the perpendicular from `w` onto the face's surface.
    fn subpoint(&self, grid: &Grid, w: &Vector3d) -> Result<Vector3d>;

    /// True if `w`, already on the face's surface, lies within its bounds.
    fn contains(&self, grid: &Grid, w: &Vector3d) -> Result<bool>;

    /// Next forward intersection of the ray `p + u t`, excluding the face `fid` the ray left.
    fn intercept(
        &self,
        grid: &Grid,
        p: &Vector3d,
        u: &Vector3d,
        eqt: f64,
        fid: FaceId,
    ) -> Result<Intercept>;

    /// Surface velocity interpolated at `w`.
    fn velocity(&self, grid: &Grid, w: &Vector3d) -> Result<Vector3d>;

    fn normal(&self, grid: &Grid) -> Result<Vector3d> {
        Ok(self.area2_normal_center(grid)?.0.safe_unit())
    }

    fn area(&self, grid: &Grid) -> Result<f64> {
        Ok(0.5 * self.area2_normal_center(grid)?.0.norm())
    }

    fn is_flat(&self, grid: &Grid) -> Result<bool> {
        Ok(!self.is_curved(grid)?)
    }

    /// A representative point on the face.
    fn face_point(&self, grid: &Grid) -> Result<Vector3d> {
        Ok(self.area2_normal_center(grid)?.1)
    }

    fn has_above(&self, grid: &Grid, w: &Vector3d) -> Result<bool> {
        Ok(self.distance(grid, w)? > 0.0)
    }

    fn has_below(&self, grid: &Grid, w: &Vector3d) -> Result<bool> {
        Ok(self.distance(grid, w)? < 0.0)
    }
}

/// A single zone boundary face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Face {
    Sphere(Sphere),
    Cone(Cone),
    Polygon(Polygon),
    Surface(Surface),
}

/// A face that may appear inside a [`Surface`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Primitive {
    Sphere(Sphere),
    Cone(Cone),
    Polygon(Polygon),
}

impl Face {
    pub fn shape(&self) -> &dyn Shape {
        match self {
            Face::Sphere(f) => f,
            Face::Cone(f) => f,
            Face::Polygon(f) => f,
            Face::Surface(f) => f,
        }
    }

    pub fn shape_mut(&mut self) -> &mut dyn Shape {
        match self {
            Face::Sphere(f) => f,
            Face::Cone(f) => f,
            Face::Polygon(f) => f,
            Face::Surface(f) => f,
        }
    }

    pub fn fid(&self) -> FaceId {
        self.shape().data().fid()
    }

    pub fn neighbor(&self, i: usize) -> Result<FaceId> {
        self.shape().data().neighbor(i)
    }

    pub fn neighbors(&self) -> &[FaceId] {
        &self.shape().data().neighbors
    }

    pub fn as_surface(&self) -> Option<&Surface> {
        match self {
            Face::Surface(s) => Some(s),
            _ => None,
        }
    }
}

impl Primitive {
    pub fn shape(&self) -> &dyn Shape {
        match self {
            Primitive::Sphere(f) => f,
            Primitive::Cone(f) => f,
            Primitive::Polygon(f) => f,
        }
    }

    pub fn shape_mut(&mut self) -> &mut dyn Shape {
        match self {
            Primitive::Sphere(f) => f,
            Primitive::Cone(f) => f,
            Primitive::Polygon(f) => f,
        }
    }

    pub fn fid(&self) -> FaceId {
        self.shape().data().fid()
    }
}

impl From<Primitive> for Face {
    fn from(p: Primitive) -> Self {
        match p {
            Primitive::Sphere(f) => Face::Sphere(f),
            Primitive::Cone(f) => Face::Cone(f),
            Primitive::Polygon(f) => Face::Polygon(f),
        }
    }
}

impl From<Sphere> for Face {
    fn from(f: Sphere) -> Self {
        Face::Sphere(f)
    }
}

impl From<Cone> for Face {
    fn from(f: Cone) -> Self {
        Face::Cone(f)
    }
}

impl From<Polygon> for Face {
    fn from(f: Polygon) -> Self {
        Face::Polygon(f)
    }
}

impl From<Surface> for Face {
    fn from(f: Surface) -> Self {
        Face::Surface(f)
    }
}

impl From<Sphere> for Primitive {
    fn from(f: Sphere) -> Self {
        Primitive::Sphere(f)
    }
}

impl From<Cone> for Primitive {
    fn from(f: Cone) -> Self {
        Primitive::Cone(f)
    }
}

impl From<Polygon> for Primitive {
    fn from(f: Polygon) -> Self {
        Primitive::Polygon(f)
    }
}
