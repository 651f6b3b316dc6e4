//! Solver constants and default parameters

/// Minimum number of reference anchors for a 3D trilateration solve
pub const MIN_TRILATERATION_REFERENCES: usize = 4;

/// Sentinel used by raw ranging records for "no measurement"
pub const LEGACY_INVALID_RANGE: f64 = -1.0;

/// Singular values below this are treated as zero by the pseudo-inverse
pub const PSEUDO_INVERSE_EPSILON: f64 = 1e-10;

pub const DEFAULT_STAGE_ONE_MAX_ITERATIONS: usize = 100;
pub const DEFAULT_STAGE_ONE_TOLERANCE: f64 = 1e-6;

pub const DEFAULT_LOWER_PERCENTILE: f64 = 0.05;
pub const DEFAULT_UPPER_PERCENTILE: f64 = 0.95;
