//! Zone collection and zone-to-zone adjacency.
//!
//! Zone 0 is the bounding zone. Its face 0 is the outer bounding sphere,
//! through which rays leave the mesh. Its face 1 is usually a [`Surface`]
//! made of the outward faces of the other zones, whose neighbor list is
//! parallel to its constituents: entry `k` names the zone face behind
//! constituent `k`. Nested spherical shells use a plain inner sphere instead.

use std::fs;
use std::path::Path;

use anyhow::Context;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::face::{Face, FaceId, Intercept, Shape, Surface};
use crate::grid::Grid;
use crate::helpers::ndigits;
use crate::zone::Zone;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::{FaceData, Polygon, Sphere};
    use crate::grid::Node;
    use crate::vector::Vector3d;

    /// A unit cube inside a bounding sphere.
    fn boxed_cube() -> (Grid, Mesh) {
        let mut g = Grid::with_capacity(9);
        for i in 0..8 {
            let r = Vector3d::new((i / 4) as f64, ((i / 2) % 2) as f64, (i % 2) as f64);
            g.add_node(Node::at(i, r)).unwrap();
        }
        g.add_node(Node::at(8, Vector3d::new(0.5, 0.5, 0.5))).unwrap();

        let quads = [
            [0, 4, 5, 1],
            [2, 3, 7, 6],
            [0, 1, 3, 2],
            [4, 6, 7, 5],
            [0, 2, 6, 4],
            [1, 5, 7, 3],
        ];
        let mut outer = Zone::new(0);
        outer.add_face(Sphere::new(FaceData::new(0, 0, vec![8]), 10.0, 0.0));
        let mut surface = Surface::new(FaceData::new(0, 1, Vec::new()));
        let mut cube = Zone::new(1);
        for (i, q) in quads.iter().enumerate() {
            surface.add_face(Polygon::new(FaceData::new(i, FaceId::COMPOSITE, q.to_vec())).into());
            surface.data.add_neighbor(1, i as i16);
            let mut data = FaceData::new(1, i as i16, q.to_vec());
            data.add_neighbor(0, 1);
            cube.add_face(Polygon::new(data));
        }
        outer.add_face(surface);

        let mut m = Mesh::new();
        m.add_zone(outer).unwrap();
        m.add_zone(cube).unwrap();
        (g, m)
    }

    fn hit(fid: FaceId, w: Vector3d) -> Intercept {
        Intercept {
            t: 1.0,
            w,
            fid,
            is_found: true,
        }
    }

    #[test]
    fn layout_is_valid() {
        let (g, m) = boxed_cube();
        m.validate(&g).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.zone_digits(), 1);
        assert!(m.zone(2).is_err());
        assert!(m.face(FaceId::new(1, 6)).is_err());
        assert!(m.face(FaceId::new(1, -1)).is_err());
    }

    #[test]
    fn composite_hit_enters_zone_behind_constituent() {
        let (g, m) = boxed_cube();
        let h = hit(FaceId::new(2, -1), Vector3d::new(0.0, 0.5, 0.5));
        assert_eq!(m.next_face(&g, &h).unwrap(), FaceId::new(1, 2));
    }

    #[test]
    fn zone_face_leads_back_to_surface() {
        let (g, m) = boxed_cube();
        let h = hit(FaceId::new(1, 3), Vector3d::new(1.0, 0.5, 0.5));
        assert_eq!(m.next_face(&g, &h).unwrap(), FaceId::BOUNDING_SURFACE);
    }

    #[test]
    fn bounding_sphere_exits_mesh() {
        let (g, m) = boxed_cube();
        let h = hit(FaceId::BOUNDING_SPHERE, Vector3d::new(10.5, 0.5, 0.5));
        assert_eq!(m.next_face(&g, &h).unwrap(), FaceId::EXIT);
    }

    #[test]
    fn broken_adjacency_is_reported() {
        let (g, mut m) = boxed_cube();
        m.zones[1].faces[0] = Polygon::new({
            let mut d = FaceData::new(1, 0, vec![0, 4, 5, 1]);
            d.add_neighbor(7, 0);
            d
        })
        .into();
        assert!(m.validate(&g).is_err());
    }

    #[test]
    fn geometry_round_trips_through_json() {
        let (grid, mesh) = boxed_cube();
        let geometry = Geometry { grid, mesh };
        let text = serde_json::to_string(&geometry).unwrap();
        let back: Geometry = serde_json::from_str(&text).unwrap();
        back.mesh.validate(&back.grid).unwrap();
        assert_eq!(back.mesh.zone(1).unwrap().len(), 6);
        assert_eq!(back.grid, geometry.grid);
    }
}

/// Indexed collection of zones, read-only while rays are traced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    zones: Vec<Zone>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a zone, whose id must equal the current size.
    pub fn add_zone(&mut self, zone: Zone) -> Result<()> {
        if zone.id != self.zones.len() {
            return Err(TraceError::InvalidMesh(format!(
                "zone id {} added at position {}",
                zone.id,
                self.zones.len()
            )));
        }
        self.zones.push(zone);
        Ok(())
    }

    pub fn zone(&self, i: usize) -> Result<&Zone> {
        self.zones
            .get(i)
            .ok_or_else(|| TraceError::out_of_range("zone", i, self.zones.len()))
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Digits needed to print any zone id.
    pub fn zone_digits(&self) -> usize {
        ndigits(self.zones.len())
    }

    /// The zone face named by `fid`.
    pub fn face(&self, fid: FaceId) -> Result<&Face> {
        let index = fid.index().ok_or_else(|| {
            TraceError::InvalidMesh(format!("{fid:?} does not name a zone face"))
        })?;
        self.zone(fid.zone)?.face(index)
    }

    /// The composite face of the bounding zone.
    pub fn bounding_surface(&self) -> Result<&Surface> {
        self.face(FaceId::BOUNDING_SURFACE)?
            .as_surface()
            .ok_or_else(|| TraceError::InvalidMesh("zone 0 face 1 is not a surface".to_string()))
    }

    /// Forgets every zone's cached spectra.
    pub fn clear_caches(&self) {
        self.zones.iter().for_each(Zone::clear_cache);
    }

    /// Resolves the face a ray enters after leaving a zone at `h`.
    ///
    /// Returns [`FaceId::EXIT`] when nothing lies beyond the exit face. An
    /// exit face with several neighbors is shared by several zones; the
    /// neighbor whose face contains the hit point is taken, in list order.
    pub fn next_face(&self, grid: &Grid, h: &Intercept) -> Result<FaceId> {
        if h.fid.is_composite_member() {
            return self.bounding_surface()?.data.neighbor(h.fid.zone);
        }

        let neighbors = self.face(h.fid)?.neighbors();
        if let [only] = neighbors {
            return Ok(self.resolve(*only));
        }
        for nbr in neighbors {
            let contains = if nbr.is_composite_member() {
                self.bounding_surface()?
                    .face(nbr.zone)?
                    .shape()
                    .contains(grid, &h.w)?
            } else {
                self.face(*nbr)?.shape().contains(grid, &h.w)?
            };
            trace!("neighbor {nbr:?} of {:?} contains hit: {contains}", h.fid);
            if contains {
                return Ok(self.resolve(*nbr));
            }
        }

        if !neighbors.is_empty() {
            debug!(
                "no neighbor of {:?} contains ({}, {}, {})",
                h.fid, h.w.x, h.w.y, h.w.z
            );
        }
        Ok(FaceId::EXIT)
    }

    /// A constituent reference enters the bounding zone through its surface.
    fn resolve(&self, nbr: FaceId) -> FaceId {
        if nbr.is_composite_member() {
            FaceId::BOUNDING_SURFACE
        } else {
            nbr
        }
    }

    /// Checks ids, node references and adjacency.
    pub fn validate(&self, grid: &Grid) -> Result<()> {
        grid.validate()?;
        let outer = self.zone(0)?;
        match outer.face(0)? {
            Face::Sphere(s) if s.data.neighbors.is_empty() => {}
            _ => {
                return Err(TraceError::InvalidMesh(
                    "zone 0 face 0 must be a bounding sphere without neighbors".to_string(),
                ))
            }
        }

        for (iz, zone) in self.zones.iter().enumerate() {
            if zone.id != iz {
                return Err(TraceError::InvalidMesh(format!(
                    "zone at index {iz} has id {}",
                    zone.id
                )));
            }
            for (i, face) in zone.faces.iter().enumerate() {
                let fid = face.fid();
                if fid != FaceId::new(iz, i as i16) {
                    return Err(TraceError::InvalidMesh(format!(
                        "face {i} of zone {iz} is labelled {fid:?}"
                    )));
                }
                if face.as_surface().is_none() {
                    self.check_nodes(grid, face.shape())?;
                }
                for nbr in face.neighbors() {
                    self.check_neighbor(fid, *nbr)?;
                }
            }
        }

        if let Some(surface) = outer.faces.get(1).and_then(Face::as_surface) {
            if surface.data.neighbors.len() != surface.len() {
                return Err(TraceError::InvalidMesh(format!(
                    "bounding surface has {} constituents but {} neighbors",
                    surface.len(),
                    surface.data.neighbors.len()
                )));
            }
            for f in &surface.faces {
                self.check_nodes(grid, f.shape())?;
            }
        }
        Ok(())
    }

    fn check_nodes(&self, grid: &Grid, shape: &dyn Shape) -> Result<()> {
        let nodes = &shape.data().nodes;
        if nodes.is_empty() {
            return Err(TraceError::InvalidMesh(format!(
                "{:?} has no nodes",
                shape.data().fid()
            )));
        }
        nodes.iter().try_for_each(|&n| grid.node(n).map(|_| ()))
    }

    fn check_neighbor(&self, from: FaceId, nbr: FaceId) -> Result<()> {
        let exists = if nbr.is_composite_member() {
            self.bounding_surface()?.face(nbr.zone).is_ok()
        } else {
            self.face(nbr).is_ok()
        };
        if exists {
            Ok(())
        } else {
            Err(TraceError::InvalidMesh(format!(
                "{from:?} names missing neighbor {nbr:?}"
            )))
        }
    }
}

/// A grid together with the mesh whose faces index into it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub grid: Grid,
    pub mesh: Mesh,
}

impl Geometry {
    /// Loads and validates a geometry from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading geometry {}", path.display()))?;
        let geometry: Geometry = serde_json::from_str(&text)
            .with_context(|| format!("parsing geometry {}", path.display()))?;
        geometry
            .mesh
            .validate(&geometry.grid)
            .with_context(|| format!("validating geometry {}", path.display()))?;
        debug!(
            "loaded {} nodes and {} zones from {}",
            geometry.grid.len(),
            geometry.mesh.len(),
            path.display()
        );
        Ok(geometry)
    }
}
