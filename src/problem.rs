//! Detector layout and the parallel driver that turns a mesh into spectra.
//!
//! A detector is a rectangle divided into patches. Each patch launches
//! either one ray parallel to the detector axis or a bundle of rays spread
//! over a cone, traces them through the mesh, and records the transported
//! spectrum. Patch spectra are then integrated over the detector.
//!
//! # Key Components
//!
//! - [`Detector`]: patch grid, ray directions and integration weights
//! - [`Problem`]: loaded geometry and database plus the solve loop

use std::fs;
use std::time::Instant;

use anyhow::{ensure, Context};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use itertools::iproduct;
use log::{debug, info};
use ndarray::Array1;
use rayon::prelude::*;

use crate::database::{OpticalDatabase, TableDatabase};
use crate::error::Result;
use crate::face::FaceId;
use crate::helpers::{CV, DETECTOR_HIT_TOLERANCE, FOUR_PI, PI, TWO_PI};
use crate::mesh::Geometry;
use crate::output;
use crate::ray::{Ray, RayIds};
use crate::result::{PatchSpectrum, Results};
use crate::settings::{validate_config, DetectorSettings, Settings};
use crate::vector::{spherical, Vector3d, VectorExt};
use crate::zone::Symmetry;


/// Patch grid and ray directions of a rectangular detector.
#[derive(Debug, Clone)]
pub struct Detector {
    pub symmetry: Symmetry,
    /// Plane center and the origin of the patch grid.
    pub rc: Vector3d,
    pub ro: Vector3d,
    pub ex: Vector3d,
    pub ey: Vector3d,
    /// Plane normal `ex × ey`, facing back towards where the rays return.
    pub ez: Vector3d,
    pub ux: Vector3d,
    pub uy: Vector3d,
    /// Bundle basis, with `bz` pointing from the target to the detector.
    pub bx: Vector3d,
    pub by: Vector3d,
    pub bz: Vector3d,
    pub nx: usize,
    pub ny: usize,
    pub dx: f64,
    pub dy: f64,
    /// Patch area, or 1 when it varies by patch.
    pub da: f64,
    pub ntheta: usize,
    pub nphi: usize,
    pub dtheta: f64,
    pub dphi: f64,
}

impl Detector {
    pub fn new(s: &DetectorSettings, symmetry: Symmetry) -> anyhow::Result<Self> {
        let rc = Vector3d::from(s.center);
        let rx = Vector3d::from(s.half_x);
        let ry = Vector3d::from(s.half_y);
        ensure!(
            rx.norm() > 0.0 && ry.norm() > 0.0,
            "detector half-axes must be non-zero"
        );
        ensure!(s.dx > 0.0 && s.dy > 0.0, "patch spacings must be positive");

        let mut nx = (2.0 * rx.norm() / s.dx).round() as usize;
        let mut ny = (2.0 * ry.norm() / s.dy).round() as usize;
        let (mut dx, mut dy, mut da) = (s.dx, s.dy, s.dx * s.dy);
        if symmetry == Symmetry::Spherical {
            nx = nx / 2 + 1;
            dx = rx.norm() / (nx as f64 - 0.5);
            ny = 1;
            dy = 2.0 * ry.norm();
            da = 1.0;
        }
        ensure!(nx > 0 && ny > 0, "detector is smaller than one patch");

        let ex = rx.normalize();
        let ey = ry.normalize();
        let ez = ex.cross(&ey);
        let ux = ex * dx;
        let uy = ey * dy;

        let bz = (rc - Vector3d::from(s.target)).safe_unit();
        ensure!(
            ez.dot(&bz) > 0.0,
            "detector normal half_x × half_y must point from the target towards the detector"
        );
        let mut bx = ex.perpendicular_to(&bz);
        let mut by = ey.perpendicular_to(&bz);
        if bx.norm() > by.norm() {
            bx = bx.safe_unit();
            by = bz.cross(&bx);
        } else {
            by = by.safe_unit();
            bx = by.cross(&bz);
        }

        let dtheta = if s.ntheta > 0 {
            s.theta_max / s.ntheta as f64
        } else {
            0.0
        };
        let dphi = if s.nphi > 0 {
            TWO_PI / s.nphi as f64
        } else {
            0.0
        };

        Ok(Self {
            symmetry,
            rc,
            ro: rc - rx - ry + (ux + uy) / 2.0,
            ex,
            ey,
            ez,
            ux,
            uy,
            bx,
            by,
            bz,
            nx,
            ny,
            dx,
            dy,
            da,
            ntheta: s.ntheta,
            nphi: s.nphi,
            dtheta,
            dphi,
        })
    }

    /// Every `(ix, iy)` patch, row by row.
    pub fn patches(&self) -> Vec<(usize, usize)> {
        iproduct!(0..self.ny, 0..self.nx)
            .map(|(iy, ix)| (ix, iy))
            .collect()
    }

    pub fn patch_point(&self, ix: usize, iy: usize) -> Vector3d {
        match self.symmetry {
            Symmetry::None => self.ro + self.ux * ix as f64 + self.uy * iy as f64,
            Symmetry::Spherical => self.rc + self.ux * ix as f64,
        }
    }

    /// The central ray followed by the `(itheta, iphi)` rays of a bundle.
    pub fn directions(&self) -> Vec<(usize, usize)> {
        let mut dirs = vec![(0, 0)];
        dirs.extend(iproduct!(1..self.ntheta.max(1), 0..self.nphi));
        dirs
    }

    pub fn local_to_global(&self, v: &Vector3d) -> Vector3d {
        self.bx * v.x + self.by * v.y + self.bz * v.z
    }

    /// Velocity of the ray launched along bundle direction `(itheta, iphi)`.
    pub fn direction(&self, (itheta, iphi): (usize, usize)) -> Vector3d {
        let theta = itheta as f64 * self.dtheta;
        let phi = iphi as f64 * self.dphi;
        self.local_to_global(&(-CV * spherical(theta, phi)))
    }

    /// Solid angle represented by one bundle ray.
    pub fn solid_angle(&self, (itheta, iphi): (usize, usize)) -> f64 {
        if (itheta, iphi) == (0, 0) {
            FOUR_PI * (self.dtheta / 4.0).sin().powi(2)
        } else {
            let theta = itheta as f64 * self.dtheta;
            2.0 * self.dphi * theta.sin() * (self.dtheta / 2.0).sin()
        }
    }

    /// Area represented by patch column `ix`.
    pub fn patch_area(&self, ix: usize) -> f64 {
        match self.symmetry {
            Symmetry::None => self.da,
            Symmetry::Spherical if ix == 0 => PI * (self.dx / 2.0).powi(2),
            Symmetry::Spherical => TWO_PI * ix as f64 * self.dx.powi(2),
        }
    }

    /// Space-integrated spectrum over all patches, with its units.
    pub fn integrate(&self, patches: &[PatchSpectrum], nbins: usize) -> (Array1<f64>, &'static str) {
        let parallel = self.ntheta == 0;
        let mut ys = Array1::zeros(nbins);
        match (self.symmetry, parallel) {
            (Symmetry::Spherical, true) => {
                for p in patches {
                    let w = if p.ix == 0 { 0.125 } else { p.ix as f64 };
                    ys.scaled_add(w, &p.y);
                }
                ys *= TWO_PI * self.dx.powi(2);
            }
            _ => {
                for p in patches {
                    ys += &p.y;
                }
                if parallel {
                    ys *= self.da;
                }
            }
        }
        let units = if parallel {
            "data in W/sr/eV"
        } else {
            "data in W/eV"
        };
        (ys, units)
    }
}

/// A loaded geometry and database with the detector that views them.
#[derive(Debug)]
pub struct Problem<D: OpticalDatabase = TableDatabase> {
    pub geometry: Geometry,
    pub database: D,
    pub detector: Detector,
    pub settings: Settings,
    pub result: Results,
}

impl Problem<TableDatabase> {
    /// Loads the geometry and database named in the settings.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let geometry = Geometry::from_file(&settings.geometry)?;
        let database = TableDatabase::from_file(&settings.database)?;
        Problem::new(geometry, database, settings)
    }
}

impl<D: OpticalDatabase> Problem<D> {
    pub fn new(geometry: Geometry, database: D, settings: Settings) -> anyhow::Result<Self> {
        validate_config(&settings)?;
        let nhv = database.photon_energies().len();
        ensure!(
            settings.jmax < nhv,
            "jmax ({}) is beyond the {} photon energies of the database",
            settings.jmax,
            nhv
        );
        let detector = Detector::new(&settings.detector, settings.symmetry)?;
        let result = Results::new_empty(settings.jmax + 1 - settings.jmin);
        Ok(Self {
            geometry,
            database,
            detector,
            settings,
            result,
        })
    }

    /// Solves every patch in parallel and integrates over the detector.
    pub fn solve(&mut self) -> anyhow::Result<()> {
        let start = Instant::now();
        info!("solving {} patches...", self.detector.nx * self.detector.ny);
        if self.settings.tracking {
            fs::create_dir_all(&self.settings.output_dir).with_context(|| {
                format!("creating output directory {}", self.settings.output_dir.display())
            })?;
        }
        self.geometry.mesh.clear_caches();

        let patches = self.detector.patches();
        let m = MultiProgress::new();
        let pb = m.add(ProgressBar::new(patches.len() as u64));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg} ETA: {eta_precise}",
            )?
            .progress_chars("█▇▆▅▄▃▂▁"),
        );
        pb.set_message("patch".to_string());

        let nbins = self.settings.jmax + 1 - self.settings.jmin;
        let this = &*self;
        let mut result = patches
            .par_iter()
            .map(|&(ix, iy)| -> Result<Results> {
                let patch = this.solve_patch(ix, iy)?;
                pb.inc(1);
                Ok(Results {
                    patches: vec![patch],
                    ..Results::new_empty(nbins)
                })
            })
            .try_reduce(|| Results::new_empty(nbins), |acc, item| Ok(Results::reduce(acc, item)))
            .context("solving detector patches")?;
        pb.finish_and_clear();

        let (ys, units) = self.detector.integrate(&result.patches, nbins);
        result.ys = ys;
        result.units = units;
        self.result = result;

        let duration = start.elapsed();
        info!(
            "Time taken: {:.2?}, Time per patch: {:.2?}",
            duration,
            duration / (patches.len().max(1) as u32)
        );
        self.result.print();
        Ok(())
    }

    /// Spectrum of one patch, summed over its ray bundle.
    pub fn solve_patch(&self, ix: usize, iy: usize) -> Result<PatchSpectrum> {
        let nbins = self.settings.jmax + 1 - self.settings.jmin;
        let mut yp = Array1::zeros(nbins);
        let mut nzones = 0;
        let parallel = self.detector.ntheta == 0;

        for direction in self.detector.directions() {
            let Some(ray) = self.run_ray((ix, iy), direction)? else {
                continue;
            };
            if direction == (0, 0) {
                nzones = ray.nzones();
            }
            if parallel {
                yp = ray.y;
            } else {
                let weight = self.detector.solid_angle(direction) * self.detector.ez.cos_angle(&ray.v);
                yp.scaled_add(weight, &ray.y);
            }
        }
        if !parallel {
            yp *= self.detector.patch_area(ix);
        }

        debug!("patch ({ix}, {iy}): {nzones} zones");
        Ok(PatchSpectrum { ix, iy, nzones, y: yp })
    }

    /// Traces and transports one ray, or `None` if it misses the mesh.
    pub fn run_ray(&self, patch: (usize, usize), direction: (usize, usize)) -> Result<Option<Ray>> {
        let (ix, iy) = patch;
        let grid = &self.geometry.grid;
        let mesh = &self.geometry.mesh;
        let r0 = self.detector.patch_point(ix, iy);
        let v = self.detector.direction(direction);

        let outer = mesh.face(FaceId::BOUNDING_SPHERE)?;
        let h = outer
            .shape()
            .intercept(grid, &r0, &v, DETECTOR_HIT_TOLERANCE, FaceId::new(0, -3))?;
        if !h.is_found {
            debug!("ray {direction:?} of patch {patch:?} misses the mesh");
            return Ok(None);
        }

        let s = &self.settings;
        let mut ray = Ray::new(r0, v, s.jmin, s.jmax)
            .with_analysis(s.analysis)
            .with_ids(RayIds {
                diag: None,
                patch,
                bundle: direction,
            });
        if s.tracking {
            let cname = format!(
                "{}-yp{}_{}_{}_{}",
                s.name, ix, iy, direction.0, direction.1
            );
            let froot = s.output_dir.join(&cname).to_string_lossy().into_owned();
            let hroot = format!("{cname}\npatch ({ix}, {iy}) ray ({}, {})", direction.0, direction.1);
            ray = ray.with_tracking(&froot, &hroot);
        }

        ray.trace(grid, mesh)?;
        ray.set_backlighter(s.backlighter.kind, s.backlighter.value, self.database.photon_energies())?;
        ray.cross_mesh(mesh, &self.database, s.symmetry, ix)?;
        Ok(Some(ray))
    }

    /// Writes all spectra to the output directory.
    pub fn writeup(&self) -> anyhow::Result<()> {
        let hv = self
            .database
            .photon_energies()
            .get(self.settings.jmin..=self.settings.jmax)
            .context("photon window lies outside the database")?;
        output::write_results(&self.result, hv, &self.settings)
    }
}
