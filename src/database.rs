//! Optical properties of zone materials.
//!
//! Transport needs, for every zone a ray crosses, the emissivity, absorption
//! and scattering spectra of the zone's material mixture. Those come from an
//! [`OpticalDatabase`], which tabulates per-material spectra on a grid of
//! electron temperature, radiation temperature and electron density.
//!
//! # Key Components
//!
//! - [`OpticalDatabase`]: lookup contract used by zones
//! - [`TableDatabase`]: in-memory tables deserialized from JSON
//! - [`LookupIndices`]: grid indices a ray carries from zone to zone to seed the next search
//! - [`Spectra`]: emissivity, absorption and scattering over a photon energy window

use std::collections::HashMap;
use std::fs;
use std::ops::AddAssign;
use std::path::Path;

use anyhow::Context;
use log::debug;
use ndarray::{s, Array1, Array3, Array4};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::zone::MaterialState;


/// Grid indices of the last material lookup.
///
/// Consecutive zones along a ray usually have similar conditions, so each
/// lookup starts from the indices found in the previous zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupIndices {
    pub ite: usize,
    pub itr: usize,
    pub ine: usize,
}

/// Emissivity, absorption and scattering per photon energy bin.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectra {
    pub em: Array1<f64>,
    pub ab: Array1<f64>,
    pub sc: Array1<f64>,
}

impl Spectra {
    pub fn zeros(n: usize) -> Self {
        Self {
            em: Array1::zeros(n),
            ab: Array1::zeros(n),
            sc: Array1::zeros(n),
        }
    }

    pub fn len(&self) -> usize {
        self.em.len()
    }

    pub fn is_empty(&self) -> bool {
        self.em.is_empty()
    }

    pub fn scaled(&self, f: f64) -> Self {
        Self {
            em: &self.em * f,
            ab: &self.ab * f,
            sc: &self.sc * f,
        }
    }
}

impl AddAssign<&Spectra> for Spectra {
    fn add_assign(&mut self, o: &Spectra) {
        self.em += &o.em;
        self.ab += &o.ab;
        self.sc += &o.sc;
    }
}

/// Source of material optical properties.
pub trait OpticalDatabase: Send + Sync {
    /// Photon energy grid, in eV.
    fn photon_energies(&self) -> &[f64];

    /// Finds the charge-neutral electron density of a material mixture.
    ///
    /// Updates `seeds` with the nearest temperature indices and the density
    /// index whose tabulated value best matches charge neutrality.
    fn find_ne(&self, state: &MaterialState, seeds: &mut LookupIndices) -> Result<f64>;

    /// Spectra of one material at the grid point `seeds`, for bins `jmin..=jmax`.
    fn material_spectra(
        &self,
        name: &str,
        seeds: &LookupIndices,
        jmin: usize,
        jmax: usize,
    ) -> Result<Spectra>;
}

/// Index of the value in the increasing table `v` nearest to `x`.
///
/// The search brackets `x` by hunting outward from `seed`, then bisects.
/// Values outside the table clamp to its ends; ties go to the lower index.
pub fn nearest(x: f64, v: &[f64], seed: usize) -> usize {
    let n = v.len();
    if n <= 1 || x <= v[0] {
        return 0;
    }
    let imax = n - 1;
    if x >= v[imax] {
        return imax;
    }

    let seed = seed.min(imax);
    let mut lo = seed.saturating_sub(1);
    let mut hi = (seed + 1).min(imax);
    let mut step = 1;
    while v[lo] > x {
        step *= 2;
        lo = lo.saturating_sub(step);
    }
    while v[hi] <= x {
        step *= 2;
        hi = (hi + step).min(imax);
    }
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if v[mid] <= x {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    if v[hi] - x < x - v[lo] {
        hi
    } else {
        lo
    }
}

/// Tabulated properties of one material.
///
/// `zbar` is indexed `[ite][itr][ine]`; the spectra add the photon energy
/// bin as a fourth index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialTable {
    pub zbar: Array3<f64>,
    pub emissivity: Array4<f64>,
    pub absorption: Array4<f64>,
    pub scattering: Array4<f64>,
}

/// Optical database held in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDatabase {
    pub hv: Vec<f64>,
    pub te: Vec<f64>,
    pub tr: Vec<f64>,
    pub ne: Vec<f64>,
    #[serde(default)]
    materials: HashMap<String, MaterialTable>,
}

impl TableDatabase {
    pub fn new(hv: Vec<f64>, te: Vec<f64>, tr: Vec<f64>, ne: Vec<f64>) -> Self {
        Self {
            hv,
            te,
            tr,
            ne,
            materials: HashMap::new(),
        }
    }

    /// Loads and validates a database from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading optical database {}", path.display()))?;
        let db: TableDatabase = serde_json::from_str(&text)
            .with_context(|| format!("parsing optical database {}", path.display()))?;
        db.validate()?;
        debug!(
            "loaded {} materials on a {}x{}x{} grid with {} photon energies",
            db.materials.len(),
            db.te.len(),
            db.tr.len(),
            db.ne.len(),
            db.hv.len()
        );
        Ok(db)
    }

    pub fn insert_material(&mut self, name: &str, table: MaterialTable) -> Result<()> {
        self.check_table(name, &table)?;
        self.materials.insert(name.to_string(), table);
        Ok(())
    }

    pub fn material(&self, name: &str) -> Result<&MaterialTable> {
        self.materials
            .get(name)
            .ok_or_else(|| TraceError::Material(format!("unknown material '{name}'")))
    }

    pub fn material_names(&self) -> impl Iterator<Item = &str> {
        self.materials.keys().map(String::as_str)
    }

    /// Checks that the grids are non-empty and every table matches them.
    pub fn validate(&self) -> Result<()> {
        for (what, grid) in [
            ("hv", &self.hv),
            ("te", &self.te),
            ("tr", &self.tr),
            ("ne", &self.ne),
        ] {
            if grid.is_empty() {
                return Err(TraceError::Material(format!("empty {what} grid")));
            }
        }
        self.materials
            .iter()
            .try_for_each(|(name, table)| self.check_table(name, table))
    }

    fn check_table(&self, name: &str, table: &MaterialTable) -> Result<()> {
        let grid = (self.te.len(), self.tr.len(), self.ne.len());
        if table.zbar.dim() != grid {
            return Err(TraceError::Material(format!(
                "zbar of '{name}' has shape {:?}, expected {:?}",
                table.zbar.dim(),
                grid
            )));
        }
        let spectral = (grid.0, grid.1, grid.2, self.hv.len());
        for (what, array) in [
            ("emissivity", &table.emissivity),
            ("absorption", &table.absorption),
            ("scattering", &table.scattering),
        ] {
            if array.dim() != spectral {
                return Err(TraceError::Material(format!(
                    "{what} of '{name}' has shape {:?}, expected {:?}",
                    array.dim(),
                    spectral
                )));
            }
        }
        Ok(())
    }
}

impl OpticalDatabase for TableDatabase {
    fn photon_energies(&self) -> &[f64] {
        &self.hv
    }

    fn find_ne(&self, state: &MaterialState, seeds: &mut LookupIndices) -> Result<f64> {
        seeds.ite = nearest(state.te, &self.te, seeds.ite);
        seeds.itr = nearest(state.tr, &self.tr, seeds.itr);

        let tables = state
            .materials
            .iter()
            .map(|m| self.material(m))
            .collect::<Result<Vec<_>>>()?;
        let (ite, itr) = (seeds.ite, seeds.itr);
        let neutral = |ine: usize| {
            state.np
                * tables
                    .iter()
                    .zip(&state.fractions)
                    .map(|(t, f)| f * t.zbar[[ite, itr, ine]])
                    .sum::<f64>()
        };

        let ine = self
            .ne
            .iter()
            .enumerate()
            .map(|(i, ne)| (i, (ne - neutral(i)).abs()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
            .ok_or_else(|| TraceError::Material("empty ne grid".to_string()))?;
        seeds.ine = ine;
        Ok(neutral(ine))
    }

    fn material_spectra(
        &self,
        name: &str,
        seeds: &LookupIndices,
        jmin: usize,
        jmax: usize,
    ) -> Result<Spectra> {
        if jmin > jmax || jmax >= self.hv.len() {
            return Err(TraceError::Material(format!(
                "photon energy window {jmin}..={jmax} outside {} bins",
                self.hv.len()
            )));
        }
        let t = self.material(name)?;
        let LookupIndices { ite, itr, ine } = *seeds;
        Ok(Spectra {
            em: t.emissivity.slice(s![ite, itr, ine, jmin..=jmax]).to_owned(),
            ab: t.absorption.slice(s![ite, itr, ine, jmin..=jmax]).to_owned(),
            sc: t.scattering.slice(s![ite, itr, ine, jmin..=jmax]).to_owned(),
        })
    }
}
