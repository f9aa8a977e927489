//! Error types for the tracing kernel.

use nalgebra::Vector3;
use thiserror::Error;

/// Errors that can occur while tracing or transporting a ray.
#[derive(Error, Debug)]
pub enum TraceError {
    /// Indexed access past the end of a grid, face, zone or mesh collection.
    #[error("{what} index {index} is out of range (size {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// No face of the zone accepted the ray as an exit, so the mesh is not watertight.
    #[error("no exit found from zone {zone} at ({}, {}, {})", position.x, position.y, position.z)]
    NoExit { zone: usize, position: Vector3<f64> },

    /// Mesh or grid data violates a structural invariant.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// Material lookup failed.
    #[error("material lookup failed: {0}")]
    Material(String),

    /// Tracking output could not be written.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraceError {
    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        TraceError::IndexOutOfRange { what, index, len }
    }
}

/// Result type for tracing operations.
pub type Result<T> = std::result::Result<T, TraceError>;
