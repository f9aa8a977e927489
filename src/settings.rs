use anyhow::{ensure, Context, Result};
use clap::{ArgAction, Parser};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::ray::BacklighterKind;
use crate::zone::Symmetry;


/// Initial spectrum of every ray.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Backlighter {
    pub kind: BacklighterKind,
    /// Temperature in eV for a blackbody, intensity in W/cm2/sr/eV otherwise.
    #[serde(default)]
    pub value: f64,
}

/// Detector plane and ray bundle layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorSettings {
    /// Center of the detector plane, cm.
    pub center: [f64; 3],
    /// Half-axes spanning the detector plane, cm.
    pub half_x: [f64; 3],
    pub half_y: [f64; 3],
    /// Patch spacing along each half-axis, cm.
    pub dx: f64,
    pub dy: f64,
    /// Point the ray bundles are aimed away from.
    #[serde(default)]
    pub target: [f64; 3],
    /// Half-angle of a ray bundle, radians.
    #[serde(default)]
    pub theta_max: f64,
    /// Polar rings per bundle; zero traces one parallel ray per patch.
    #[serde(default)]
    pub ntheta: usize,
    #[serde(default = "default_nphi")]
    pub nphi: usize,
}

fn default_nphi() -> usize {
    1
}

/// Runtime configuration for the application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Prefix of every output file.
    pub name: String,
    pub geometry: PathBuf,
    pub database: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub symmetry: Symmetry,
    /// Recompute zone spectra for every ray, ignoring the symmetry cache.
    #[serde(default)]
    pub analysis: bool,
    /// Write the partial spectrum of every ray after every zone.
    #[serde(default)]
    pub tracking: bool,
    /// First and last photon energy bins carried by rays.
    pub jmin: usize,
    pub jmax: usize,
    /// 0 shows warnings only; each step adds info, debug and trace.
    #[serde(default)]
    pub verbose: u8,
    pub backlighter: Backlighter,
    pub detector: DetectorSettings,
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("loading default configuration")?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("deserializing default configuration")?;
    resolve_paths(&mut config, &root);
    validate_config(&config)?;

    Ok(config)
}

pub fn load_config() -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    // Check if local config exists, if not use default
    let config_file = if local_config.exists() {
        local_config
    } else {
        default_config_file
    };

    let settings = Config::builder()
        .add_source(File::from(config_file.clone()).required(true))
        .add_source(Environment::with_prefix("spectrace"))
        .build()
        .with_context(|| format!("loading configuration {}", config_file.display()))?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("deserializing configuration")?;

    // Parse command-line arguments and override values
    let args = CliArgs::parse();
    apply_args(&mut config, &args);
    resolve_paths(&mut config, &root);
    validate_config(&config)?;

    Ok(config)
}

fn apply_args(config: &mut Settings, args: &CliArgs) {
    if let Some(geometry) = &args.geometry {
        config.geometry = geometry.clone();
    }
    if let Some(database) = &args.database {
        config.database = database.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(name) = &args.name {
        config.name = name.clone();
    }
    if let Some(symmetry) = args.symmetry {
        config.symmetry = symmetry;
    }
    if let Some(jmin) = args.jmin {
        config.jmin = jmin;
    }
    if let Some(jmax) = args.jmax {
        config.jmax = jmax;
    }
    if let Some(kind) = args.backlighter {
        config.backlighter.kind = kind;
    }
    if let Some(value) = args.back_value {
        config.backlighter.value = value;
    }
    if let Some(ntheta) = args.ntheta {
        config.detector.ntheta = ntheta;
    }
    if let Some(nphi) = args.nphi {
        config.detector.nphi = nphi;
    }
    config.tracking |= args.tracking;
    config.analysis |= args.analysis;
    config.verbose = config.verbose.max(args.verbose);
}

/// Relative input paths are taken from the project root.
fn resolve_paths(config: &mut Settings, root: &Path) {
    for path in [&mut config.geometry, &mut config.database] {
        if path.is_relative() {
            *path = root.join(&*path);
        }
    }
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the SPECTRACE_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
pub fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        // When running through cargo (e.g. cargo run, cargo test)
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("SPECTRACE_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("locating the current executable")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(Path::to_path_buf)
        .context("could not find a project root containing config/")
}

pub fn validate_config(config: &Settings) -> Result<()> {
    ensure!(
        config.jmin <= config.jmax,
        "jmin ({}) must not exceed jmax ({})",
        config.jmin,
        config.jmax
    );
    let d = &config.detector;
    ensure!(d.dx > 0.0 && d.dy > 0.0, "patch spacings must be positive");
    ensure!(d.theta_max >= 0.0, "bundle half-angle must not be negative");
    ensure!(
        d.ntheta == 0 || d.nphi > 0,
        "ray bundles need at least one azimuth"
    );
    ensure!(!config.name.is_empty(), "output name must not be empty");
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "spectrace - synthetic spectra from ray-traced hydrodynamic meshes")]
pub struct CliArgs {
    /// Geometry file (JSON grid and mesh).
    #[arg(short, long)]
    geometry: Option<PathBuf>,

    /// Optical database file (JSON tables).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Directory that receives the output spectra.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Prefix of every output file.
    #[arg(short, long)]
    name: Option<String>,

    /// Problem symmetry: none or spherical.
    #[arg(long, value_parser = parse_symmetry)]
    symmetry: Option<Symmetry>,

    /// Write the partial spectrum of every ray after each zone.
    #[arg(long)]
    tracking: bool,

    /// Bypass the per-patch spectra cache.
    #[arg(long)]
    analysis: bool,

    /// First photon energy bin.
    #[arg(long)]
    jmin: Option<usize>,

    /// Last photon energy bin.
    #[arg(long)]
    jmax: Option<usize>,

    /// Backlighter kind: flat or blackbody.
    #[arg(long, value_parser = parse_backlighter)]
    backlighter: Option<BacklighterKind>,

    /// Backlighter temperature (eV) or intensity (W/cm2/sr/eV).
    #[arg(long)]
    back_value: Option<f64>,

    /// Polar rings per ray bundle; 0 for parallel rays.
    #[arg(long)]
    ntheta: Option<usize>,

    /// Azimuthal rays per ring.
    #[arg(long)]
    nphi: Option<usize>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_symmetry(s: &str) -> Result<Symmetry, String> {
    match s {
        "none" => Ok(Symmetry::None),
        "spherical" => Ok(Symmetry::Spherical),
        _ => Err(format!("unknown symmetry '{}'; expected none or spherical", s)),
    }
}

fn parse_backlighter(s: &str) -> Result<BacklighterKind, String> {
    match s {
        "flat" => Ok(BacklighterKind::Flat),
        "blackbody" => Ok(BacklighterKind::Blackbody),
        _ => Err(format!("unknown backlighter '{}'; expected flat or blackbody", s)),
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.detector;
        write!(
            f,
            "Settings:
  - Name: {}
  - Geometry: {}
  - Database: {}
  - Output Directory: {}
  - Symmetry: {}
  - Photon Bins: {}..={}
  - Backlighter: {} {:.6}
  - Patch Spacing: {:.6} x {:.6} cm
  - Bundle: {} x {} rays within {:.6} rad
  - Tracking: {}
  - Analysis: {}
  ",
            self.name,
            self.geometry.display(),
            self.database.display(),
            self.output_dir.display(),
            self.symmetry,
            self.jmin,
            self.jmax,
            self.backlighter.kind,
            self.backlighter.value,
            d.dx,
            d.dy,
            d.ntheta,
            d.nphi,
            d.theta_max,
            self.tracking,
            self.analysis,
        )
    }
}
