//! Error types for bifurcation mesh generation.

use thiserror::Error;

use crate::input::BranchId;

/// Errors that can occur while generating a bifurcation mesh.
///
/// Every variant is raised by the stage that first sees the bad input,
/// before any node is emitted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BifurcationError {
    /// Input geometry or resolution that the pipeline cannot mesh.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// A branch centerline has too few control points.
    #[error("{branch} centerline needs at least {min} control points, got {actual}")]
    TooFewControlPoints {
        /// Branch whose centerline is short.
        branch: BranchId,
        /// Minimum required control points.
        min: usize,
        /// Actual control point count.
        actual: usize,
    },

    /// Radius is zero or negative at some station.
    #[error("invalid radius {radius} on {branch}")]
    InvalidRadius {
        /// Branch with the bad radius.
        branch: BranchId,
        /// Offending radius value.
        radius: f64,
    },

    /// Settings could not be parsed.
    #[error("invalid settings: {0}")]
    Settings(String),
}

impl BifurcationError {
    pub(crate) fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateInput(msg.into())
    }
}

/// Result type for bifurcation operations.
pub type Result<T> = std::result::Result<T, BifurcationError>;
