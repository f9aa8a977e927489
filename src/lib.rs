//! Synthetic spectra from ray-traced hydrodynamic meshes.
//!
//! A [`mesh::Geometry`] describes zones bounded by spheres, cones, polygons
//! and composite surfaces. Rays launched from a [`problem::Detector`] are
//! traced through the zones, then carried back towards the detector while the
//! radiative-transfer equation is integrated zone by zone with material
//! properties from an [`database::OpticalDatabase`].

pub mod database;
pub mod error;
pub mod face;
pub mod grid;
pub mod helpers;
pub mod logging;
pub mod mesh;
pub mod output;
pub mod problem;
pub mod ray;
pub mod result;
pub mod settings;
pub mod vector;
pub mod zone;
