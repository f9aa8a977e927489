//! Rays: geometric tracing through the mesh and radiative transfer back along the path.
//!
//! **Context**: A detector sees the radiation that reaches it along a line of
//! sight. The intensity arriving at the detector is found by integrating the
//! transfer equation from the far edge of the plasma towards the detector,
//! but the zones along the line of sight can only be discovered by walking
//! away from the detector.
//!
//! **How it Works**: [`Ray::trace`] walks from the detector-side point out of
//! the mesh, pushing one [`Waypoint`] per zone crossed. The stack is then
//! popped by [`Ray::cross_mesh`], which replays the path from the far side
//! towards the detector, and [`Ray::transport`] applies the analytic slab
//! solution in each zone.

use std::fmt;
use std::path::Path;

use log::{debug, trace};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::database::{LookupIndices, OpticalDatabase, Spectra};
use crate::error::{Result, TraceError};
use crate::face::FaceId;
use crate::grid::Grid;
use crate::helpers::{ndigits, planckian, thin_transmission, INT_WIDTH};
use crate::mesh::Mesh;
use crate::output::{format_value, write_column};
use crate::vector::{Vector3d, VectorExt};
use crate::zone::{Symmetry, Zone};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MaterialTable, TableDatabase};
    use crate::face::{FaceData, Sphere};
    use crate::grid::Node;
    use approx::assert_relative_eq;
    use ndarray::{array, Array3, Array4};

    /// Two concentric shells: vacuum out to radius 13 around a radius 5 core.
    fn shells() -> (Grid, Mesh) {
        let mut g = Grid::new();
        g.add_node(Node::at(0, Vector3d::zeros())).unwrap();

        let mut outer = Zone::new(0);
        outer.add_face(Sphere::new(FaceData::new(0, 0, vec![0]), 13.0, 0.0));
        let mut inner = FaceData::new(0, 1, vec![0]);
        inner.add_neighbor(1, 0);
        outer.add_face(Sphere::new(inner, -5.0, 0.0));

        let mut core = Zone::new(1);
        let mut data = FaceData::new(1, 0, vec![0]);
        data.add_neighbor(0, 1);
        core.add_face(Sphere::new(data, 5.0, 0.0));
        core.material.te = 1.0;
        core.material.np = 1.0;
        core.material.materials = vec!["X".into()];
        core.material.fractions = vec![1.0];

        let mut m = Mesh::new();
        m.add_zone(outer).unwrap();
        m.add_zone(core).unwrap();
        (g, m)
    }

    fn database() -> TableDatabase {
        let mut db = TableDatabase::new(vec![1.0, 2.0, 3.0], vec![1.0], vec![0.0], vec![1.0]);
        db.insert_material(
            "X",
            MaterialTable {
                zbar: Array3::from_elem((1, 1, 1), 1.0),
                emissivity: Array4::from_elem((1, 1, 1, 3), 2.0),
                absorption: Array4::from_elem((1, 1, 1, 3), 0.5),
                scattering: Array4::zeros((1, 1, 1, 3)),
            },
        )
        .unwrap();
        db
    }

    fn inward_ray() -> Ray {
        Ray::new(Vector3d::new(0.0, 0.0, 13.0), Vector3d::new(0.0, 0.0, -1.0), 0, 2)
    }

    #[test]
    fn vacuum_transport_is_identity() {
        let mut ray = inward_ray().with_spectrum(array![1.0, 2.0, 3.0]);
        ray.spectra = Spectra::zeros(3);
        ray.transport(1.0e6);
        assert_eq!(ray.y, array![1.0, 2.0, 3.0]);
    }

    #[test]
    fn thin_slab_adds_emission() {
        let mut ray = inward_ray().with_spectrum(array![1.0, 1.0, 1.0]);
        ray.spectra.em.fill(4.06e30);
        ray.spectra.ab.fill(1.0e-300);
        ray.transport(1.0);
        assert_relative_eq!(ray.y[0], 1.0 + 4.06e30);
    }

    #[test]
    fn thick_slab_approaches_source_function() {
        let mut ray = inward_ray().with_spectrum(array![7.0, 7.0, 7.0]);
        ray.spectra.em.fill(2.0);
        ray.spectra.ab.fill(0.25);
        ray.spectra.sc.fill(0.25);
        ray.transport(2.0);
        let tr = (-1.0_f64).exp();
        assert_relative_eq!(ray.y[1], 7.0 * tr + (1.0 - tr) * 4.0);
    }

    #[test]
    fn backlighters() {
        let hv = [1.0, 2.0, 3.0, 4.0];
        let mut ray = Ray::new(Vector3d::zeros(), Vector3d::zeros(), 1, 3);
        ray.set_backlighter(BacklighterKind::Flat, 5.0, &hv).unwrap();
        assert_eq!(ray.y, array![5.0, 5.0, 5.0]);
        ray.set_backlighter(BacklighterKind::Blackbody, 2.0, &hv).unwrap();
        assert_relative_eq!(ray.y[0], planckian(2.0, 2.0));
        assert_relative_eq!(ray.y[2], planckian(4.0, 2.0));
        assert!(ray.set_backlighter(BacklighterKind::Flat, 1.0, &hv[..2]).is_err());
    }

    #[test]
    fn trace_builds_path_through_shells() {
        let (g, m) = shells();
        let mut ray = inward_ray();
        ray.trace(&g, &m).unwrap();
        assert_eq!(ray.path_len(), 3);
        assert_eq!(ray.nzones(), 3);
        assert_relative_eq!(ray.r, Vector3d::new(0.0, 0.0, -13.0));
        assert_eq!(ray.v, Vector3d::new(0.0, 0.0, 1.0));

        let path = ray.path();
        assert_eq!(path[1].outface, FaceId::new(1, 0));
        assert_eq!(path[1].inface, FaceId::new(0, 1));
        assert_relative_eq!(path[1].hitpt, Vector3d::new(0.0, 0.0, 5.0));
        assert_eq!(path[2].outface, FaceId::new(0, 1));
        assert_relative_eq!(path[2].hitpt, Vector3d::new(0.0, 0.0, -5.0));
    }

    #[test]
    fn transport_through_shells() {
        let (g, m) = shells();
        let db = database();
        let mut ray = inward_ray();
        ray.trace(&g, &m).unwrap();
        ray.set_backlighter(BacklighterKind::Flat, 1.0, db.photon_energies())
            .unwrap();
        ray.cross_mesh(&m, &db, Symmetry::None, 0).unwrap();

        assert_eq!(ray.path_len(), 0);
        assert_eq!(ray.zid, 0);
        assert_relative_eq!(ray.r, Vector3d::new(0.0, 0.0, 13.0));
        let tr = (-5.0_f64).exp();
        for y in ray.y.iter() {
            assert_relative_eq!(*y, tr + (1.0 - tr) * 4.0, max_relative = 1e-14);
        }
        assert_eq!(m.zone(1).unwrap().ne(), Some(1.0));
    }

    #[test]
    fn crossing_an_empty_path_does_nothing() {
        let (_, m) = shells();
        let db = database();
        let mut ray = inward_ray();
        ray.path.clear();
        ray.cross_zone(m.zone(1).unwrap(), &db, Symmetry::None, 0, 1)
            .unwrap();
        assert_eq!(ray.r, Vector3d::new(0.0, 0.0, 13.0));
    }

    #[test]
    fn tracking_files_per_zone() {
        let (g, m) = shells();
        let db = database();
        let dir = std::env::temp_dir().join(format!("spectrace-ray-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let froot = dir.join("track").to_string_lossy().into_owned();

        let mut ray = inward_ray().with_tracking(&froot, "shells\nline of sight");
        ray.trace(&g, &m).unwrap();
        ray.set_backlighter(BacklighterKind::Flat, 0.0, db.photon_energies())
            .unwrap();
        ray.cross_mesh(&m, &db, Symmetry::None, 0).unwrap();

        let text = std::fs::read_to_string(format!("{froot}_iz1.txt")).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "shells_iz1");
        assert_eq!(lines[1], "line of sight");
        assert_eq!(lines[2], format!("iz 1{} cm", format_value(18.0)));
        assert_eq!(lines[3], "ZoneID 1");
        assert_eq!(lines[4], "data in W/cm2/sr/eV");
        assert_eq!(lines.len(), 8);
        assert!(std::path::Path::new(&format!("{froot}_iz2.txt")).exists());
        std::fs::remove_dir_all(dir).unwrap();
    }
}

/// Shape of the spectrum a ray starts with at the far side of the mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BacklighterKind {
    /// Planck spectrum; the value is the temperature in eV.
    Blackbody,
    /// Uniform specific intensity in W/cm2/sr/eV.
    #[default]
    Flat,
}

impl fmt::Display for BacklighterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BacklighterKind::Blackbody => write!(f, "blackbody"),
            BacklighterKind::Flat => write!(f, "flat"),
        }
    }
}

/// One boundary crossing along a traced path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    /// Face the ray enters beyond the crossing.
    pub outface: FaceId,
    /// Face the ray left through.
    pub inface: FaceId,
    pub hitpt: Vector3d,
}

impl Waypoint {
    /// The starting point of a ray, on the bounding sphere.
    pub fn start(hitpt: Vector3d) -> Self {
        Self {
            outface: FaceId::BOUNDING_SPHERE,
            inface: FaceId::BOUNDING_SPHERE,
            hitpt,
        }
    }
}

/// Where a ray came from in the detector layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RayIds {
    pub diag: Option<usize>,
    pub patch: (usize, usize),
    pub bundle: (usize, usize),
}

#[derive(Debug, Clone)]
struct Tracking {
    froot: String,
    hroot: String,
}

/// A line of sight carrying a spectrum over the bins `jmin..=jmax`.
#[derive(Debug, Clone)]
pub struct Ray {
    pub r: Vector3d,
    pub v: Vector3d,
    /// Zone currently being crossed.
    pub zid: usize,
    pub y: Array1<f64>,
    pub ids: RayIds,
    path: Vec<Waypoint>,
    seeds: LookupIndices,
    spectra: Spectra,
    jmin: usize,
    jmax: usize,
    analysis: bool,
    tracking: Option<Tracking>,
    distance: f64,
    iz: usize,
    nzones: usize,
    nzd: usize,
}

impl Ray {
    /// A dark ray starting at `r` on the bounding sphere and moving along `v`.
    pub fn new(r: Vector3d, v: Vector3d, jmin: usize, jmax: usize) -> Self {
        let n = (jmax + 1).saturating_sub(jmin);
        Self {
            r,
            v,
            zid: 0,
            y: Array1::zeros(n),
            ids: RayIds::default(),
            path: vec![Waypoint::start(r)],
            seeds: LookupIndices::default(),
            spectra: Spectra::zeros(n),
            jmin,
            jmax,
            analysis: false,
            tracking: None,
            distance: 0.0,
            iz: 0,
            nzones: 0,
            nzd: 0,
        }
    }

    /// Starts from a given spectrum instead of darkness.
    pub fn with_spectrum(mut self, y: Array1<f64>) -> Self {
        self.y = y;
        self
    }

    /// Writes the partial spectrum to `{froot}_izNN.txt` after every zone crossed.
    pub fn with_tracking(mut self, froot: &str, hroot: &str) -> Self {
        self.tracking = Some(Tracking {
            froot: froot.to_string(),
            hroot: hroot.to_string(),
        });
        self
    }

    /// Bypasses the symmetry cache in every zone.
    pub fn with_analysis(mut self, analysis: bool) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_ids(mut self, ids: RayIds) -> Self {
        self.ids = ids;
        self
    }

    /// Number of zones found by [`Ray::trace`].
    pub fn nzones(&self) -> usize {
        self.nzones
    }

    pub fn path_len(&self) -> usize {
        self.path.len()
    }

    /// Waypoints still to be crossed, nearest the detector first.
    pub fn path(&self) -> &[Waypoint] {
        &self.path
    }

    /// Sum of absolute differences in position, direction and spectrum.
    pub fn abs_diff(&self, o: &Ray) -> f64 {
        let dy: f64 = self
            .y
            .iter()
            .zip(o.y.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        self.r.abs_diff(&o.r) + self.v.abs_diff(&o.v) + dy
    }

    /// Initializes the spectrum from the photon energy grid `hv`.
    pub fn set_backlighter(&mut self, kind: BacklighterKind, value: f64, hv: &[f64]) -> Result<()> {
        let n = (self.jmax + 1).saturating_sub(self.jmin);
        let window = hv
            .get(self.jmin..=self.jmax)
            .ok_or_else(|| TraceError::out_of_range("photon energy", self.jmax, hv.len()))?;
        self.y = match kind {
            BacklighterKind::Blackbody => window.iter().map(|&e| planckian(e, value)).collect(),
            BacklighterKind::Flat => Array1::from_elem(n, value),
        };
        Ok(())
    }

    /// Walks away from the detector until the ray leaves through the bounding sphere.
    ///
    /// Every zone boundary crossed is pushed onto the path. On return the ray
    /// sits on the bounding sphere at the far side, pointing back towards the
    /// detector.
    pub fn trace(&mut self, grid: &Grid, mesh: &Mesh) -> Result<()> {
        let mut w = self
            .path
            .last()
            .copied()
            .unwrap_or_else(|| Waypoint::start(self.r));
        let mut zid = self.zid;

        loop {
            self.nzones += 1;
            let h = mesh.zone(zid)?.hit(grid, &self.r, &self.v, w.outface)?;
            w.hitpt = h.w;
            w.inface = h.fid;
            w.outface = mesh.next_face(grid, &h)?;
            self.r = h.w;
            debug!(
                "zone {zid}: left through {:?} at t={:e}, entering {:?}",
                w.inface, h.t, w.outface
            );
            if w.inface == FaceId::BOUNDING_SPHERE {
                break;
            }
            zid = w.outface.zone;
            self.path.push(w);
        }

        self.nzd = ndigits(self.nzones);
        self.v = -self.v;
        Ok(())
    }

    /// Applies the homogeneous slab solution over chord length `ct` to every bin.
    pub fn transport(&mut self, ct: f64) {
        let thin = thin_transmission();
        let s = &self.spectra;
        for (j, y) in self.y.iter_mut().enumerate() {
            let op = s.ab[j] + s.sc[j];
            let tr = (-op * ct).exp();
            let se = if tr > thin {
                s.em[j] * ct
            } else {
                (1.0 - tr) * s.em[j] / op
            };
            *y = *y * tr + se;
        }
    }

    /// Crosses the zone ending at the top waypoint and pops it.
    ///
    /// No-op once the path is exhausted.
    pub fn cross_zone<D: OpticalDatabase + ?Sized>(
        &mut self,
        zone: &Zone,
        db: &D,
        symmetry: Symmetry,
        patch_index: usize,
        mesh_digits: usize,
    ) -> Result<()> {
        let Some(w) = self.path.pop() else {
            return Ok(());
        };
        let ct = (w.hitpt - self.r).norm();
        self.r = w.hitpt;
        self.zid = zone.id;

        self.spectra = zone.load_spectra(
            db,
            &mut self.seeds,
            symmetry,
            patch_index,
            self.analysis,
            self.jmin,
            self.jmax,
        )?;
        self.transport(ct);
        trace!("zone {}: chord {:e}, y[0]={:?}", zone.id, ct, self.y.get(0));

        if let Some(tracking) = &self.tracking {
            self.distance += ct;
            let izlabel = format!("iz{:0>w$}", self.iz, w = self.nzd);
            let izstring = format!("iz {:>w$}", self.iz, w = self.nzd);
            let mut header = tracking.hroot.replace('\n', &format!("_{izlabel}\n"));
            header += &format!("\n{izstring}{} cm", format_value(self.distance));
            header += &format!("\nZoneID {:>w$}", zone.id, w = mesh_digits);
            header += "\ndata in W/cm2/sr/eV";
            let fname = format!("{}_{}.txt", tracking.froot, izlabel);
            write_column(Path::new(&fname), &header, &self.y.to_vec())?;
            self.iz += 1;
        }
        Ok(())
    }

    /// Pops the whole path, transporting the spectrum towards the detector.
    pub fn cross_mesh<D: OpticalDatabase + ?Sized>(
        &mut self,
        mesh: &Mesh,
        db: &D,
        symmetry: Symmetry,
        patch_index: usize,
    ) -> Result<()> {
        let mesh_digits = mesh.zone_digits();
        while let Some(top) = self.path.last() {
            let zone = mesh.zone(top.outface.zone)?;
            self.cross_zone(zone, db, symmetry, patch_index, mesh_digits)?;
        }
        Ok(())
    }
}

impl fmt::Display for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for x in self.r.iter().chain(self.v.iter()) {
            write!(f, "{}", format_value(*x))?;
        }
        write!(f, "\n{:>w$}\n{:>w$}", self.zid, self.y.len(), w = INT_WIDTH)?;
        for y in &self.y {
            write!(f, "\n{}", format_value(*y))?;
        }
        Ok(())
    }
}
