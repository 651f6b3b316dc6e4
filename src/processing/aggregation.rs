//! Robust aggregation of repeated range readings
//!
//! Collapses one anchor pair's series of readings into a single distance:
//! the first reading is dropped as boot noise, invalid readings are ignored,
//! readings outside a percentile band are trimmed and the median of what is
//! left is returned.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::{DEFAULT_LOWER_PERCENTILE, DEFAULT_UPPER_PERCENTILE};

/// Fewer valid readings than this are reduced without percentile trimming
pub const MIN_TRIM_READINGS: usize = 3;

/// Filtering applied before a series is reduced
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeFilterConfig {
    /// Drop the first reading of every series
    pub discard_first: bool,
    /// Trim readings outside [lower_percentile, upper_percentile]
    pub percentile_trim: bool,
    /// Fraction in [0, 1]
    pub lower_percentile: f64,
    /// Fraction in [0, 1]
    pub upper_percentile: f64,
}

impl Default for RangeFilterConfig {
    fn default() -> Self {
        Self {
            discard_first: true,
            percentile_trim: true,
            lower_percentile: DEFAULT_LOWER_PERCENTILE,
            upper_percentile: DEFAULT_UPPER_PERCENTILE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RobustRangeAggregator {
    pub config: RangeFilterConfig,
}

impl RobustRangeAggregator {
    pub fn new(config: RangeFilterConfig) -> Self {
        Self { config }
    }

    /// Valid readings that survive the first-reading drop and percentile trim.
    /// `None` entries and negative or non-finite values count as invalid.
    pub fn filter(&self, readings: &[Option<f64>]) -> Vec<f64> {
        let skip = usize::from(self.config.discard_first);
        let mut valid: Vec<f64> = readings
            .iter()
            .skip(skip)
            .filter_map(|r| r.filter(|v| v.is_finite() && *v >= 0.0))
            .collect();

        if self.config.percentile_trim && valid.len() >= MIN_TRIM_READINGS {
            valid.sort_by(f64::total_cmp);
            let low = percentile(&valid, self.config.lower_percentile);
            let high = percentile(&valid, self.config.upper_percentile);
            valid.retain(|&v| v >= low && v <= high);
        }

        valid
    }

    /// Robust distance for one series, or `None` if nothing valid remains
    pub fn aggregate(&self, readings: &[Option<f64>]) -> Option<f64> {
        let mut valid = self.filter(readings);
        median(&mut valid)
    }

    /// Median of a with-replacement resample of the filtered series
    pub fn bootstrap<R: Rng + ?Sized>(&self, readings: &[Option<f64>], rng: &mut R) -> Option<f64> {
        let valid = self.filter(readings);
        if valid.is_empty() {
            return None;
        }
        let mut resample: Vec<f64> = (0..valid.len())
            .map(|_| valid[rng.gen_range(0..valid.len())])
            .collect();
        median(&mut resample)
    }
}

/// Percentile of sorted data with linear interpolation between order
/// statistics. `fraction` is clamped to [0, 1].
pub fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let position = fraction.clamp(0.0, 1.0) * (len - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let weight = position - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}

/// Median; even-length input averages the two central values
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
