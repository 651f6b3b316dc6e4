//! Per-anchor ranging records
//!
//! Each anchor logs an ordered series of readings; one reading holds that
//! anchor's measured range to every anchor in the network, with a negative
//! value meaning "no measurement". Reading `k` of every anchor together forms
//! the range matrix of sample `k`.

use std::fs;
use std::path::Path;

use rand::Rng;
use tracing::{debug, warn};

use super::aggregation::RobustRangeAggregator;
use crate::core::RangeMatrix;
use crate::validation::error::{CalibrationError, CalibrationResult};

/// Suffix of the per-anchor record files in a data directory
pub const RECORD_FILE_SUFFIX: &str = "_ranging_data.txt";

type Reading = Vec<Option<f64>>;

/// Range readings of every anchor, indexed `[anchor][reading][other]`
#[derive(Debug, Clone, PartialEq)]
pub struct RangingRecords {
    anchor_count: usize,
    series: Vec<Vec<Reading>>,
}

impl RangingRecords {
    /// Build from already decoded series, one per anchor. Readings are
    /// padded or cut to the anchor count and short series are padded with
    /// all-missing readings.
    pub fn from_series(series: Vec<Vec<Reading>>) -> Self {
        let anchor_count = series.len();
        let mut records = Self {
            anchor_count,
            series: series
                .into_iter()
                .map(|readings| {
                    readings
                        .into_iter()
                        .map(|reading| normalize_reading(reading, anchor_count))
                        .collect()
                })
                .collect(),
        };
        records.pad();
        records
    }

    /// Build from sentinel-encoded series
    pub fn from_legacy(series: Vec<Vec<Vec<f64>>>) -> Self {
        Self::from_series(
            series
                .into_iter()
                .map(|readings| {
                    readings
                        .into_iter()
                        .map(|reading| reading.into_iter().map(Some).collect())
                        .collect()
                })
                .collect(),
        )
    }

    /// Load `<id>_ranging_data.txt` for every anchor id from `dir`.
    ///
    /// A missing or unreadable file leaves that anchor with no valid
    /// readings. Only a missing data directory is an error.
    pub fn load_dir<P: AsRef<Path>>(dir: P, anchor_ids: &[String]) -> CalibrationResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(CalibrationError::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let anchor_count = anchor_ids.len();
        let mut series = Vec::with_capacity(anchor_count);
        for id in anchor_ids {
            let path = dir.join(format!("{id}{RECORD_FILE_SUFFIX}"));
            let readings = match fs::read_to_string(&path) {
                Ok(content) => match parse_series(&content, anchor_count) {
                    Ok(readings) => {
                        debug!(anchor = %id, readings = readings.len(), "loaded ranging records");
                        readings
                    }
                    Err(reason) => {
                        warn!(anchor = %id, path = %path.display(), %reason, "unreadable ranging records, treating as missing");
                        Vec::new()
                    }
                },
                Err(e) => {
                    warn!(anchor = %id, path = %path.display(), error = %e, "no ranging records, treating as missing");
                    Vec::new()
                }
            };
            series.push(readings);
        }

        let mut records = Self { anchor_count, series };
        records.pad();
        Ok(records)
    }

    pub fn anchor_count(&self) -> usize {
        self.anchor_count
    }

    /// Readings per anchor, including the first one
    pub fn reading_count(&self) -> usize {
        self.series.first().map_or(0, Vec::len)
    }

    /// Cut or pad every anchor to exactly `count` readings. Padding
    /// readings have no valid ranges.
    pub fn resize(&mut self, count: usize) {
        let blank = vec![None; self.anchor_count];
        for readings in &mut self.series {
            readings.resize(count, blank.clone());
        }
    }

    /// Readings of anchor `from` towards anchor `to`, in logging order
    pub fn pair_series(&self, from: usize, to: usize) -> Vec<Option<f64>> {
        self.series
            .get(from)
            .map(|readings| {
                readings
                    .iter()
                    .map(|reading| reading.get(to).copied().flatten())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// One range matrix per reading index. With `discard_first` the boot
    /// reading is left out.
    pub fn samples(&self, discard_first: bool) -> Vec<RangeMatrix> {
        let skip = usize::from(discard_first);
        (skip..self.reading_count())
            .map(|k| {
                RangeMatrix::from_rows(
                    self.series
                        .iter()
                        .map(|readings| readings[k].clone())
                        .collect(),
                )
            })
            .collect()
    }

    /// Single matrix of robust per-pair aggregates
    pub fn aggregated(&self, aggregator: &RobustRangeAggregator) -> RangeMatrix {
        let mut matrix = RangeMatrix::new(self.anchor_count);
        for i in 0..self.anchor_count {
            for j in 0..self.anchor_count {
                if i != j {
                    matrix.set(i, j, aggregator.aggregate(&self.pair_series(i, j)));
                }
            }
        }
        matrix
    }

    /// `draws` matrices, each entry the median of a resample of that pair's
    /// filtered readings
    pub fn bootstrap<R: Rng + ?Sized>(
        &self,
        aggregator: &RobustRangeAggregator,
        draws: usize,
        rng: &mut R,
    ) -> Vec<RangeMatrix> {
        let pairs: Vec<(usize, usize, Vec<Option<f64>>)> = (0..self.anchor_count)
            .flat_map(|i| (0..self.anchor_count).map(move |j| (i, j)))
            .filter(|(i, j)| i != j)
            .map(|(i, j)| (i, j, self.pair_series(i, j)))
            .collect();

        (0..draws)
            .map(|_| {
                let mut matrix = RangeMatrix::new(self.anchor_count);
                for (i, j, readings) in &pairs {
                    matrix.set(*i, *j, aggregator.bootstrap(readings, rng));
                }
                matrix
            })
            .collect()
    }

    fn pad(&mut self) {
        let longest = self.series.iter().map(Vec::len).max().unwrap_or(0);
        for readings in &mut self.series {
            readings.resize(longest, vec![None; self.anchor_count]);
        }
    }
}

/// Parse whitespace-separated readings, one per line. Blank lines and lines
/// starting with `#` are skipped.
pub fn parse_series(content: &str, anchor_count: usize) -> Result<Vec<Reading>, String> {
    content
        .lines()
        .enumerate()
        .map(|(number, line)| (number + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(number, line)| {
            let reading = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|token| !token.is_empty())
                .map(|token| {
                    token
                        .parse::<f64>()
                        .map(Some)
                        .map_err(|e| format!("line {number}: '{token}': {e}"))
                })
                .collect::<Result<Reading, String>>()?;
            Ok(normalize_reading(reading, anchor_count))
        })
        .collect()
}

fn normalize_reading(mut reading: Reading, anchor_count: usize) -> Reading {
    reading.resize(anchor_count, None);
    for value in &mut reading {
        *value = value.filter(|r| r.is_finite() && *r >= 0.0);
    }
    reading
}
