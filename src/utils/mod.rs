//! Configuration loading

pub mod config;

pub use config::{CalibrationConfig, ConfigurationManager, SolverConfig};
