//! Error types for the autocalibration solver

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {parameter}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    #[error("missing required parameter {parameter}")]
    MissingParameter { parameter: String },
    #[error("anchor '{0}' is configured more than once")]
    DuplicateAnchor(String),
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by the solver and its data loaders.
///
/// Expected conditions under noisy data (too few references for an anchor,
/// optimizer budget exhausted, missing ranging records) are logged and
/// skipped instead of being reported here.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("need at least {required} reference anchors, got {available}")]
    InsufficientReferences { available: usize, required: usize },
    #[error("{what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("unknown anchor '{0}'")]
    UnknownAnchor(String),
    #[error("no range samples to solve")]
    NoSamples,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;
