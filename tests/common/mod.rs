#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array3, Array4};
use spectrace::database::{LookupIndices, MaterialTable, OpticalDatabase, Spectra, TableDatabase};
use spectrace::error::Result;
use spectrace::face::{Cone, FaceData, FaceId, Sphere, Surface};
use spectrace::grid::{Grid, Node};
use spectrace::mesh::{Geometry, Mesh};
use spectrace::settings;
use spectrace::vector::Vector3d;
use spectrace::zone::{MaterialState, Zone};

/// Emissivity and absorption of the uniform test material.
pub const EM: f64 = 2.0;
pub const AB: f64 = 0.5;

pub fn data_path(name: &str) -> PathBuf {
    settings::retrieve_project_root().unwrap().join("data").join(name)
}

pub fn three_boxes() -> Geometry {
    Geometry::from_file(&data_path("three_boxes.json")).unwrap()
}

pub fn opacity_table() -> TableDatabase {
    TableDatabase::from_file(&data_path("opacity_table.json")).unwrap()
}

/// Concentric spheres around the origin; `radii` decrease outwards-in.
///
/// Zone 0 is vacuum out to the first radius. Every other zone is filled with
/// material `X` at unit density.
pub fn shells(radii: &[f64]) -> Geometry {
    let mut grid = Grid::new();
    grid.add_node(Node::at(0, Vector3d::zeros())).unwrap();

    let mut mesh = Mesh::new();
    for (k, r) in radii.iter().enumerate() {
        let mut zone = Zone::new(k);
        let mut outer = FaceData::new(k, 0, vec![0]);
        if k > 0 {
            outer.add_neighbor(k - 1, 1);
            zone.material = MaterialState {
                te: 1.0,
                np: 1.0,
                materials: vec!["X".into()],
                fractions: vec![1.0],
                ..MaterialState::default()
            };
        }
        zone.add_face(Sphere::new(outer, *r, 0.0));
        if let Some(inner) = radii.get(k + 1) {
            let mut data = FaceData::new(k, 1, vec![0]);
            data.add_neighbor(k + 1, 0);
            zone.add_face(Sphere::new(data, -inner, 0.0));
        }
        mesh.add_zone(zone).unwrap();
    }
    mesh.validate(&grid).unwrap();
    Geometry { grid, mesh }
}

/// A cylinder (zone 1) sleeved by a cone (zone 2), inside a sphere of radius 100.
///
/// R-Z outline: the cylinder spans `r <= 5`, `1 <= z <= 9`. The sleeve is the
/// triangle `(5, 1)`, `(13, 1)`, `(5, 9)`, so its slanted side is `r = 14 - z`.
/// The bounding surface holds, in order, the cylinder bottom and top, the
/// sleeve bottom and the slanted side.
pub fn cones() -> Geometry {
    let mut grid = Grid::new();
    let rz = [(0.0, 0.0), (0.0, 1.0), (5.0, 1.0), (5.0, 9.0), (0.0, 9.0), (13.0, 1.0)];
    for (i, (r, z)) in rz.iter().enumerate() {
        grid.add_node(Node::at(i, Vector3d::new(*r, *z, 0.0))).unwrap();
    }

    let ribbon = |zone: usize, id: i16, a: usize, b: usize, nbr: FaceId| {
        let mut data = FaceData::new(zone, id, vec![a, b]);
        data.add_neighbor(nbr.zone, nbr.id);
        Cone::new(data)
    };
    let outside = FaceId::BOUNDING_SURFACE;

    let mut bounding = Zone::new(0);
    bounding.add_face(Sphere::new(FaceData::new(0, 0, vec![0]), 100.0, 0.0));
    let mut surface = Surface::new(FaceData::new(0, 1, Vec::new()));
    let constituents = [
        ((2, 1), FaceId::new(1, 0)),
        ((4, 3), FaceId::new(1, 2)),
        ((5, 2), FaceId::new(2, 0)),
        ((3, 5), FaceId::new(2, 1)),
    ];
    for (k, ((a, b), nbr)) in constituents.into_iter().enumerate() {
        surface.add_face(ribbon(k, FaceId::COMPOSITE, a, b, nbr).into());
        surface.data.add_neighbor(nbr.zone, nbr.id);
    }
    bounding.add_face(surface);

    let mut cylinder = Zone::new(1);
    cylinder.add_face(ribbon(1, 0, 1, 2, outside));
    cylinder.add_face(ribbon(1, 1, 2, 3, FaceId::new(2, 2)));
    cylinder.add_face(ribbon(1, 2, 3, 4, outside));

    let mut sleeve = Zone::new(2);
    sleeve.add_face(ribbon(2, 0, 2, 5, outside));
    sleeve.add_face(ribbon(2, 1, 5, 3, outside));
    sleeve.add_face(ribbon(2, 2, 3, 2, FaceId::new(1, 1)));

    let mut mesh = Mesh::new();
    for zone in [bounding, cylinder, sleeve] {
        mesh.add_zone(zone).unwrap();
    }
    mesh.validate(&grid).unwrap();
    Geometry { grid, mesh }
}

/// A one-point database with a single material of constant opacity.
pub fn uniform_database(nbins: usize) -> TableDatabase {
    let hv = (1..=nbins).map(|j| j as f64).collect();
    let mut db = TableDatabase::new(hv, vec![1.0], vec![0.0], vec![1.0]);
    db.insert_material(
        "X",
        MaterialTable {
            zbar: Array3::from_elem((1, 1, 1), 1.0),
            emissivity: Array4::from_elem((1, 1, 1, nbins), EM),
            absorption: Array4::from_elem((1, 1, 1, nbins), AB),
            scattering: Array4::zeros((1, 1, 1, nbins)),
        },
    )
    .unwrap();
    db
}

/// Wraps a database and counts material lookups.
pub struct CountingDatabase {
    pub inner: TableDatabase,
    pub lookups: AtomicUsize,
}

impl CountingDatabase {
    pub fn new(inner: TableDatabase) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl OpticalDatabase for CountingDatabase {
    fn photon_energies(&self) -> &[f64] {
        self.inner.photon_energies()
    }

    fn find_ne(&self, state: &MaterialState, seeds: &mut LookupIndices) -> Result<f64> {
        self.inner.find_ne(state, seeds)
    }

    fn material_spectra(
        &self,
        name: &str,
        seeds: &LookupIndices,
        jmin: usize,
        jmax: usize,
    ) -> Result<Spectra> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.material_spectra(name, seeds, jmin, jmax)
    }
}

/// Specific intensity leaving a uniform slab of length `chord` lit by `y0`.
pub fn slab(y0: f64, chord: f64) -> f64 {
    let tr = (-AB * chord).exp();
    y0 * tr + (1.0 - tr) * EM / AB
}

pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("spectrace-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
