use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use itertools::Itertools;

use crate::helpers::INT_WIDTH;
use crate::result::Results;
use crate::settings::{DetectorSettings, Settings};


/// Formats a spectral value as a 15 character wide scientific number.
pub fn format_value(x: f64) -> String {
    format!("{:>15.6e}", x)
}

/// Writes `header` (if non-empty) followed by one value per line.
pub fn write_column(path: &Path, header: &str, values: &[f64]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    if !header.is_empty() {
        writeln!(writer, "{}", header)?;
    }
    for value in values {
        writeln!(writer, "{}", format_value(*value))?;
    }
    writer.flush()
}

pub fn patch_path(dir: &Path, name: &str, ix: usize, iy: usize) -> PathBuf {
    dir.join(format!("{name}-yp{ix}_{iy}.txt"))
}

pub fn integrated_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}-ys.txt"))
}

/// Units of a patch spectrum: bundles are integrated over solid angle and area.
pub fn patch_units(detector: &DetectorSettings) -> &'static str {
    if detector.ntheta > 0 {
        "data in W/eV"
    } else {
        "data in W/cm2/sr/eV"
    }
}

/// Writes every spectrum of a finished run, plus a copy of its settings.
pub fn write_results(results: &Results, hv: &[f64], settings: &Settings) -> Result<()> {
    let dir = settings.output_dir.as_path();
    fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;
    let name = settings.name.as_str();
    let units = patch_units(&settings.detector);

    for patch in &results.patches {
        let path = patch_path(dir, name, patch.ix, patch.iy);
        let header = format!(
            "{name} patch ({}, {}) crossing {} zones\n{units}",
            patch.ix, patch.iy, patch.nzones
        );
        write_column(&path, &header, &patch.y.to_vec())
            .with_context(|| format!("writing {}", path.display()))?;
    }

    let path = integrated_path(dir, name);
    let header = format!("{name} space-integrated spectrum\n{}", results.units);
    write_column(&path, &header, &results.ys.to_vec())
        .with_context(|| format!("writing {}", path.display()))?;

    let path = dir.join(format!("{name}-hv.txt"));
    write_column(&path, &format!("{name} photon energies\ndata in eV"), hv)
        .with_context(|| format!("writing {}", path.display()))?;

    write_zone_counts(results, dir, name)?;
    write_settings(settings, dir)
}

/// One line per patch: indices and the number of zones its ray crossed.
fn write_zone_counts(results: &Results, dir: &Path, name: &str) -> Result<()> {
    let path = dir.join(format!("{name}-nzones.txt"));
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", format_zone_counts(results))?;
    writer.flush()?;
    Ok(())
}

fn format_zone_counts(results: &Results) -> String {
    results
        .patches
        .iter()
        .map(|p| format!("{:>w$}{:>w$}{:>w$}", p.ix, p.iy, p.nzones, w = INT_WIDTH))
        .join("\n")
}

fn write_settings(settings: &Settings, dir: &Path) -> Result<()> {
    let path = dir.join("settings.toml");
    let body = toml::to_string(settings).context("serializing settings")?;
    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    fs::write(&path, format!("# written {stamp}\n{body}"))
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
