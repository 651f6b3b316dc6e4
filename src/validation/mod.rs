//! Error types and accuracy reporting

pub mod accuracy;
pub mod error;

pub use accuracy::{align_to_ground_truth, AnchorReport, CalibrationReport, ErrorStatistics, PositionError};
pub use error::{CalibrationError, CalibrationResult, ConfigError};
