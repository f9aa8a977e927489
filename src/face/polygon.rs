use serde::{Deserialize, Serialize};

use super::{FaceData, FaceId, Intercept, Shape};
use crate::error::{Result, TraceError};
use crate::grid::Grid;
use crate::helpers::{sign_eqt, SMALL};
use crate::vector::{Vector3d, VectorExt};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Node;
    use approx::assert_relative_eq;

    const EQT: f64 = 1e-15;

    /// Unit cube nodes, with node index `4x + 2y + z`.
    fn cube_grid() -> Grid {
        let mut g = Grid::with_capacity(8);
        for i in 0..8 {
            let r = Vector3d::new((i / 4) as f64, ((i / 2) % 2) as f64, (i % 2) as f64);
            g.add_node(Node::new(i, r, r * 2.0)).unwrap();
        }
        g
    }

    fn cube_faces() -> Vec<Polygon> {
        [
            [0, 4, 5, 1],
            [2, 3, 7, 6],
            [0, 1, 3, 2],
            [4, 6, 7, 5],
            [0, 2, 6, 4],
            [1, 5, 7, 3],
        ]
        .iter()
        .enumerate()
        .map(|(i, n)| Polygon::new(FaceData::new(1, i as i16, n.to_vec())))
        .collect()
    }

    #[test]
    fn cube_faces_point_outwards() {
        let g = cube_grid();
        let faces = cube_faces();
        let expected = [
            Vector3d::new(0.0, -1.0, 0.0),
            Vector3d::new(0.0, 1.0, 0.0),
            Vector3d::new(-1.0, 0.0, 0.0),
            Vector3d::new(1.0, 0.0, 0.0),
            Vector3d::new(0.0, 0.0, -1.0),
            Vector3d::new(0.0, 0.0, 1.0),
        ];
        for (f, n) in faces.iter().zip(expected) {
            assert_relative_eq!(f.normal(&g).unwrap(), n);
            assert_relative_eq!(f.area(&g).unwrap(), 1.0);
        }
        let total: Vector3d = faces
            .iter()
            .map(|f| f.normal(&g).unwrap() * f.area(&g).unwrap())
            .sum();
        assert_relative_eq!(total, Vector3d::zeros());
    }

    #[test]
    fn center_is_area_weighted() {
        let g = cube_grid();
        let (_, c) = cube_faces()[3].area2_normal_center(&g).unwrap();
        assert_relative_eq!(c, Vector3d::new(1.0, 0.5, 0.5));
    }

    #[test]
    fn edge_points_are_contained() {
        let g = cube_grid();
        let f = &cube_faces()[0];
        assert!(f.contains(&g, &Vector3d::new(0.5, 0.0, 0.5)).unwrap());
        assert!(f.contains(&g, &Vector3d::new(1.0, 0.0, 0.5)).unwrap());
        assert!(f.contains(&g, &Vector3d::new(1.0, 0.0, 1.0)).unwrap());
        assert!(!f.contains(&g, &Vector3d::new(1.0 + 1e-9, 0.0, 0.5)).unwrap());
    }

    #[test]
    fn distance_and_subpoint() {
        let g = cube_grid();
        let f = &cube_faces()[3];
        let w = Vector3d::new(3.0, 0.25, 0.75);
        assert_relative_eq!(f.distance(&g, &w).unwrap(), 2.0);
        assert_relative_eq!(f.subpoint(&g, &w).unwrap(), Vector3d::new(1.0, 0.25, 0.75));
        assert!(f.has_below(&g, &Vector3d::new(0.5, 0.5, 0.5)).unwrap());
    }

    #[test]
    fn plane_intercept() {
        let g = cube_grid();
        let f = &cube_faces()[2];
        let p = Vector3d::new(-5.0, 0.75, 0.5);
        let u = Vector3d::new(2.0, 0.0, 0.0);
        let h = f.intercept(&g, &p, &u, EQT, FaceId::new(0, 0)).unwrap();
        assert!(h.is_found);
        assert_relative_eq!(h.t, 2.5);
        assert_relative_eq!(h.w, Vector3d::new(0.0, 0.75, 0.5));
        assert_eq!(h.fid, FaceId::new(1, 2));

        let h = f.intercept(&g, &p, &u, EQT, FaceId::new(1, 2)).unwrap();
        assert_eq!(h, Intercept::missed(FaceId::new(1, 2)));

        let h = f
            .intercept(&g, &p, &Vector3d::new(0.0, 1.0, 0.0), EQT, FaceId::new(0, 0))
            .unwrap();
        assert!(!h.is_found);
        assert_eq!(h.t, -crate::helpers::BIG);

        let h = f.intercept(&g, &p, &-u, EQT, FaceId::new(0, 0)).unwrap();
        assert!(!h.is_found);
        assert_relative_eq!(h.t, -2.5);
    }

    #[test]
    fn velocity_is_inverse_distance_weighted() {
        let g = cube_grid();
        let f = &cube_faces()[0];
        assert_relative_eq!(
            f.velocity(&g, &Vector3d::new(0.5, 0.0, 0.5)).unwrap(),
            Vector3d::new(1.0, 0.0, 1.0)
        );
        assert_eq!(
            f.velocity(&g, &Vector3d::new(1.0, 0.0, 1.0)).unwrap(),
            Vector3d::new(2.0, 0.0, 2.0)
        );
    }

    #[test]
    fn too_few_nodes_is_an_error() {
        let g = cube_grid();
        let f = Polygon::new(FaceData::new(1, 0, vec![0, 1]));
        assert!(matches!(
            f.area2_normal_center(&g),
            Err(TraceError::InvalidMesh(_))
        ));
    }
}

/// Planar convex polygon; the winding order sets the normal by the right-hand rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    #[serde(flatten)]
    pub data: FaceData,
}

impl Polygon {
    pub fn new(data: FaceData) -> Self {
        Self { data }
    }

    fn points(&self, grid: &Grid) -> Result<Vec<Vector3d>> {
        let points = self
            .data
            .nodes
            .iter()
            .map(|&i| grid.position(i))
            .collect::<Result<Vec<_>>>()?;
        if points.len() < 3 {
            return Err(TraceError::InvalidMesh(format!(
                "polygon {:?} has {} nodes",
                self.data.fid(),
                points.len()
            )));
        }
        Ok(points)
    }
}

impl Shape for Polygon {
    fn data(&self) -> &FaceData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut FaceData {
        &mut self.data
    }

    fn is_curved(&self, _grid: &Grid) -> Result<bool> {
        Ok(false)
    }

    /// Fans triangles out of the first node; the center is their area-weighted centroid.
    fn area2_normal_center(&self, grid: &Grid) -> Result<(Vector3d, Vector3d)> {
        let points = self.points(grid)?;
        let origin = points[0];
        let mut s = Vector3d::zeros();
        let mut c = Vector3d::zeros();
        for pair in points[1..].windows(2) {
            let a = (pair[0] - origin).cross(&(pair[1] - origin));
            s += a;
            c += (origin + pair[0] + pair[1]) / 3.0 * a.norm();
        }
        c /= s.norm();
        Ok((s, c))
    }

    fn distance(&self, grid: &Grid, w: &Vector3d) -> Result<f64> {
        Ok((w - self.data.point(grid, 0)?).dot(&self.normal(grid)?))
    }

    fn subpoint(&self, grid: &Grid, w: &Vector3d) -> Result<Vector3d> {
        Ok(w - self.normal(grid)? * self.distance(grid, w)?)
    }

    /// Half-plane test in the polygon's own plane; points on an edge line
    /// do not constrain the result.
    fn contains(&self, grid: &Grid, w: &Vector3d) -> Result<bool> {
        let points = self.points(grid)?;
        let origin = points[0];
        let zhat = self.normal(grid)?;
        let xhat = (points[1] - origin).safe_unit();
        let yhat = zhat.cross(&xhat);
        let local = |v: Vector3d| {
            let d = v - origin;
            Vector3d::new(d.dot(&xhat), d.dot(&yhat), 0.0)
        };

        let q = local(*w);
        let mut first_turn = None;
        for (j, tail) in points.iter().enumerate() {
            let head = points[(j + 1) % points.len()];
            let turn = q.turn(&local(*tail), &local(head));
            if turn == 0 {
                continue;
            }
            match first_turn {
                None => first_turn = Some(turn),
                Some(first) if first != turn => return Ok(false),
                Some(_) => {}
            }
        }
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
        let n = self.normal(grid)?;
        let denominator = u.dot(&n);
        if own == fid || denominator.abs() < SMALL {
            return Ok(Intercept::missed(own));
        }
        let t = (self.data.point(grid, 0)? - p).dot(&n) / denominator;
        let mut hit = Intercept::at(p, u, t, own, false);
        hit.is_found = sign_eqt(t, eqt) == 1 && self.contains(grid, &hit.w)?;
        Ok(hit)
    }

    fn velocity(&self, grid: &Grid, w: &Vector3d) -> Result<Vector3d> {
        let mut u = Vector3d::zeros();
        let mut s = 0.0;
        for &i in &self.data.nodes {
            let node = grid.node(i)?;
            let d = (node.position - w).norm();
            if d < SMALL {
                return Ok(node.velocity);
            }
            s += 1.0 / d;
            u += node.velocity / d;
        }
        Ok(u / s)
    }
}
