//! Anchor Autocalibration
//!
//! Estimates the 3D positions of fixed ranging anchors from noisy
//! inter-anchor range measurements and a rough initial guess, using local
//! trilateration refinement followed by a global simplex optimization,
//! repeated over many samples.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use crate::core::{Anchor, Coordinates, RangeMatrix, RefinementStatus};
pub use algorithms::{AutocalibrationSolver, EstimationResult, SampleSolution, TrilaterationSolver};
pub use processing::{RangeFilterConfig, RangingRecords, RobustRangeAggregator};
pub use validation::{CalibrationError, CalibrationReport, CalibrationResult, ConfigError};
pub use utils::{ConfigurationManager, SolverConfig};
pub use api::{CsvFormatter, JsonFormatter, OutputFormat, TextFormatter};
