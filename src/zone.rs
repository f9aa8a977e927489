//! Material zones and their boundary faces.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use log::{debug, trace};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::database::{LookupIndices, OpticalDatabase, Spectra};
use crate::error::{Result, TraceError};
use crate::face::{Face, FaceId, Intercept};
use crate::grid::Grid;
use crate::helpers::ZONE_HIT_TOLERANCE;
use crate::vector::Vector3d;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MaterialTable, TableDatabase};
    use crate::face::{FaceData, Polygon};
    use crate::grid::Node;
    use approx::assert_relative_eq;
    use ndarray::{Array3, Array4};

    fn cube() -> (Grid, Zone) {
        let mut g = Grid::with_capacity(8);
        for i in 0..8 {
            let r = Vector3d::new((i / 4) as f64, ((i / 2) % 2) as f64, (i % 2) as f64);
            g.add_node(Node::at(i, r)).unwrap();
        }
        let mut z = Zone::new(1);
        for (i, n) in [
            [0, 4, 5, 1],
            [2, 3, 7, 6],
            [0, 1, 3, 2],
            [4, 6, 7, 5],
            [0, 2, 6, 4],
            [1, 5, 7, 3],
        ]
        .iter()
        .enumerate()
        {
            z.add_face(Polygon::new(FaceData::new(1, i as i16, n.to_vec())));
        }
        (g, z)
    }

    fn database() -> TableDatabase {
        let mut db = TableDatabase::new(vec![1.0, 2.0], vec![1.0], vec![0.0], vec![1.0, 2.0]);
        db.insert_material(
            "D",
            MaterialTable {
                zbar: Array3::from_elem((1, 1, 2), 1.0),
                emissivity: Array4::from_shape_fn((1, 1, 2, 2), |(_, _, ine, j)| {
                    (10 * ine + j + 1) as f64
                }),
                absorption: Array4::from_elem((1, 1, 2, 2), 3.0),
                scattering: Array4::from_elem((1, 1, 2, 2), 0.5),
            },
        )
        .unwrap();
        db
    }

    fn material(np: f64) -> MaterialState {
        MaterialState {
            te: 1.0,
            tr: 0.0,
            np,
            materials: vec!["D".into()],
            fractions: vec![1.0],
        }
    }

    #[test]
    fn nearest_exit_of_a_cube() {
        let (g, z) = cube();
        let h = z
            .hit(
                &g,
                &Vector3d::new(0.0, 0.75, 0.5),
                &Vector3d::new(2.0, 0.0, 0.0),
                FaceId::new(1, 2),
            )
            .unwrap();
        assert!(h.is_found);
        assert_relative_eq!(h.t, 0.5);
        assert_eq!(h.fid, FaceId::new(1, 3));
    }

    #[test]
    fn corner_exit_keeps_first_face() {
        let (g, z) = cube();
        let h = z
            .hit(
                &g,
                &Vector3d::new(0.5, 0.5, 0.5),
                &Vector3d::new(1.0, 1.0, 0.0),
                FaceId::default(),
            )
            .unwrap();
        assert_relative_eq!(h.w, Vector3d::new(1.0, 1.0, 0.5));
        assert_eq!(h.fid, FaceId::new(1, 1));
    }

    #[test]
    fn missing_exit_is_fatal() {
        let (g, z) = cube();
        let err = z
            .hit(
                &g,
                &Vector3d::new(5.0, 0.5, 0.5),
                &Vector3d::new(1.0, 0.0, 0.0),
                FaceId::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TraceError::NoExit { zone: 1, .. }));
    }

    #[test]
    fn zone_point_is_inside() {
        let (g, z) = cube();
        assert_relative_eq!(z.zone_point(&g).unwrap(), Vector3d::new(0.5, 0.5, 0.5));
        let total: Vector3d = z
            .faces
            .iter()
            .map(|f| f.shape().area2_normal_center(&g).unwrap().0)
            .sum();
        assert_relative_eq!(total, Vector3d::zeros());
    }

    #[test]
    fn empty_zone_has_zero_spectra() {
        let z = Zone::new(4);
        let s = z
            .load_spectra(&database(), &mut LookupIndices::default(), Symmetry::None, 0, false, 0, 1)
            .unwrap();
        assert_eq!(s, Spectra::zeros(2));
        assert_eq!(z.ne(), None);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let empty = Zone::new(4);
        let err = empty
            .load_spectra(&database(), &mut LookupIndices::default(), Symmetry::None, 0, false, 2, 0)
            .unwrap_err();
        assert!(matches!(err, TraceError::Material(_)));

        let mut filled = Zone::new(2);
        filled.material = material(1.0);
        let err = filled
            .load_spectra(&database(), &mut LookupIndices::default(), Symmetry::Spherical, 0, false, 1, 0)
            .unwrap_err();
        assert!(matches!(err, TraceError::Material(_)));
    }

    #[test]
    fn spectra_are_mixed_and_scaled() {
        let mut z = Zone::new(2);
        z.material = material(2.0);
        let mut seeds = LookupIndices::default();
        let s = z
            .load_spectra(&database(), &mut seeds, Symmetry::None, 0, false, 0, 1)
            .unwrap();
        assert_eq!(seeds.ine, 1);
        assert_eq!(s.em.to_vec(), vec![22.0, 24.0]);
        assert_eq!(s.ab.to_vec(), vec![6.0, 6.0]);
        assert_eq!(s.sc.to_vec(), vec![1.0, 1.0]);
        assert_eq!(z.ne(), Some(2.0));
    }

    #[test]
    fn symmetric_lookups_are_cached_per_patch() {
        let mut z = Zone::new(2);
        z.material = material(2.0);
        let db = database();
        let first = z
            .load_spectra(&db, &mut LookupIndices::default(), Symmetry::Spherical, 3, false, 0, 1)
            .unwrap();

        z.material.np = 1.0;
        let mut untouched = LookupIndices::default();
        let cached = z
            .load_spectra(&db, &mut untouched, Symmetry::Spherical, 3, false, 0, 1)
            .unwrap();
        assert_eq!(cached, first);
        assert_eq!(untouched, LookupIndices::default());

        let other_patch = z
            .load_spectra(&db, &mut LookupIndices::default(), Symmetry::Spherical, 4, false, 0, 1)
            .unwrap();
        assert_ne!(other_patch, first);

        let analysis = z
            .load_spectra(&db, &mut LookupIndices::default(), Symmetry::Spherical, 3, true, 0, 1)
            .unwrap();
        assert_ne!(analysis, first);
    }
}

/// Spatial symmetry of the problem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symmetry {
    /// Full 3-D problem.
    #[default]
    None,
    /// 1-D spherical problem; rays at the same patch cross identical zones.
    Spherical,
}

impl fmt::Display for Symmetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symmetry::None => write!(f, "none"),
            Symmetry::Spherical => write!(f, "spherical"),
        }
    }
}

/// Plasma conditions and composition of a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialState {
    /// Electron temperature, eV.
    pub te: f64,
    /// Radiation temperature, eV.
    #[serde(default)]
    pub tr: f64,
    /// Total ion number density, 1/cm3.
    #[serde(default = "unset_density")]
    pub np: f64,
    #[serde(default)]
    pub materials: Vec<String>,
    /// Number fraction of each material.
    #[serde(default)]
    pub fractions: Vec<f64>,
}

fn unset_density() -> f64 {
    -1.0
}

impl Default for MaterialState {
    fn default() -> Self {
        Self {
            te: 0.0,
            tr: 0.0,
            np: unset_density(),
            materials: Vec::new(),
            fractions: Vec::new(),
        }
    }
}

impl MaterialState {
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

/// Spectra computed once per patch index.
#[derive(Default)]
struct SpectraCache(Mutex<HashMap<usize, Arc<OnceCell<Spectra>>>>);

impl SpectraCache {
    fn cell(&self, key: usize) -> Arc<OnceCell<Spectra>> {
        let mut map = self.0.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(map.entry(key).or_default())
    }

    fn clear(&self) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Clone for SpectraCache {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl fmt::Debug for SpectraCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.0.lock().map(|m| m.len()).unwrap_or(0);
        write!(f, "SpectraCache({n} patches)")
    }
}

/// A closed region of uniform material bounded by faces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Zone {
    pub id: usize,
    pub faces: Vec<Face>,
    #[serde(default)]
    pub material: MaterialState,
    #[serde(skip)]
    ne: OnceCell<f64>,
    #[serde(skip)]
    cache: SpectraCache,
}

impl Zone {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn add_face(&mut self, face: impl Into<Face>) {
        self.faces.push(face.into());
    }

    pub fn face(&self, i: usize) -> Result<&Face> {
        self.faces
            .get(i)
            .ok_or_else(|| TraceError::out_of_range("zone face", i, self.faces.len()))
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Charge-neutral electron density from the first material lookup.
    pub fn ne(&self) -> Option<f64> {
        self.ne.get().copied()
    }

    /// Forgets cached spectra, e.g. after the material state changed.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Average of the faces' representative points.
    pub fn zone_point(&self, grid: &Grid) -> Result<Vector3d> {
        let mut s = Vector3d::zeros();
        for face in &self.faces {
            s += face.shape().face_point(grid)?;
        }
        Ok(s / self.faces.len().max(1) as f64)
    }

    /// Finds where the ray `p + u t` leaves this zone.
    ///
    /// `fid` is the face the ray entered through. Of all faces reporting a
    /// found intercept, the one with the smallest `t` wins; on equal `t` the
    /// face listed first is kept.
    pub fn hit(&self, grid: &Grid, p: &Vector3d, u: &Vector3d, fid: FaceId) -> Result<Intercept> {
        let mut best = Intercept::default();
        for face in &self.faces {
            let h = face.shape().intercept(grid, p, u, ZONE_HIT_TOLERANCE, fid)?;
            trace!(
                "zone {} face {:?}: t={:e} found={}",
                self.id,
                face.fid(),
                h.t,
                h.is_found
            );
            if h.is_found && h.t < best.t {
                best = h;
            }
        }

        if !best.is_found {
            debug!(
                "no exit from zone {} (entered through {:?}), zone point {:?}",
                self.id,
                fid,
                self.zone_point(grid).ok()
            );
            return Err(TraceError::NoExit {
                zone: self.id,
                position: *p,
            });
        }
        Ok(best)
    }

    /// Emissivity, absorption and scattering of this zone's mixture over bins `jmin..=jmax`.
    ///
    /// Under symmetry, outside of analysis mode, the first lookup for each
    /// `patch_index` is stored and returned unchanged by later lookups.
    #[allow(clippy::too_many_arguments)]
    pub fn load_spectra<D: OpticalDatabase + ?Sized>(
        &self,
        db: &D,
        seeds: &mut LookupIndices,
        symmetry: Symmetry,
        patch_index: usize,
        analysis: bool,
        jmin: usize,
        jmax: usize,
    ) -> Result<Spectra> {
        let nbins = window_len(jmin, jmax)?;
        if self.material.is_empty() {
            return Ok(Spectra::zeros(nbins));
        }
        if symmetry == Symmetry::None || analysis {
            return self.mix_spectra(db, seeds, jmin, jmax);
        }
        let cell = self.cache.cell(patch_index);
        cell.get_or_try_init(|| self.mix_spectra(db, seeds, jmin, jmax))
            .cloned()
    }

    fn mix_spectra<D: OpticalDatabase + ?Sized>(
        &self,
        db: &D,
        seeds: &mut LookupIndices,
        jmin: usize,
        jmax: usize,
    ) -> Result<Spectra> {
        let state = &self.material;
        if state.materials.len() != state.fractions.len() {
            return Err(TraceError::Material(format!(
                "zone {} lists {} materials but {} fractions",
                self.id,
                state.materials.len(),
                state.fractions.len()
            )));
        }

        let ne = db.find_ne(state, seeds)?;
        let _ = self.ne.set(ne);

        let mut mix = Spectra::zeros(window_len(jmin, jmax)?);
        for (name, fraction) in state.materials.iter().zip(&state.fractions) {
            mix += &db.material_spectra(name, seeds, jmin, jmax)?.scaled(*fraction);
        }
        Ok(mix.scaled(state.np))
    }
}

/// Number of bins in `jmin..=jmax`.
fn window_len(jmin: usize, jmax: usize) -> Result<usize> {
    (jmax + 1).checked_sub(jmin).filter(|n| *n > 0).ok_or_else(|| {
        TraceError::Material(format!("empty photon energy window {jmin}..={jmax}"))
    })
}
