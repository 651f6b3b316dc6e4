//! Stage 2: global residual minimization
//!
//! All anchor coordinates are flattened into one vector and refined jointly
//! by minimizing
//!
//! ```text
//! Σ_{i≠j, range_ij valid} (‖p_i − p_j‖² − range_ij²)²
//! ```
//!
//! with a Nelder–Mead simplex. Held anchors stay nominal parameters of the
//! search but their coordinates are reset to the starting values before every
//! cost evaluation, so the optimizer cannot move them.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::nelder_mead::{NelderMead, NelderMeadConfig};
use crate::core::{Coordinates, RangeMatrix};
use crate::validation::error::{CalibrationError, CalibrationResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTwoConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub simplex: NelderMeadConfig,
}

impl Default for StageTwoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            simplex: NelderMeadConfig::default(),
        }
    }
}

/// Result of one Stage-2 run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTwoOutcome {
    pub initial_cost: f64,
    pub final_cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GlobalOptimizer {
    pub config: StageTwoConfig,
}

impl GlobalOptimizer {
    pub fn new(config: StageTwoConfig) -> Self {
        Self { config }
    }

    /// Jointly refine `positions` in place. Anchors flagged in `held` keep
    /// their incoming coordinates exactly.
    pub fn optimize(
        &self,
        positions: &mut [Coordinates],
        ranges: &RangeMatrix,
        held: &[bool],
    ) -> CalibrationResult<StageTwoOutcome> {
        let n = positions.len();
        if ranges.size() != n {
            return Err(CalibrationError::DimensionMismatch {
                what: "range matrix size",
                expected: n,
                actual: ranges.size(),
            });
        }
        if held.len() != n {
            return Err(CalibrationError::DimensionMismatch {
                what: "held anchor mask",
                expected: n,
                actual: held.len(),
            });
        }

        let start = flatten(positions);
        let initial_cost = flat_cost(&start, ranges);

        let pin = |x: &mut DVector<f64>| {
            for i in (0..held.len()).filter(|&i| held[i]) {
                for axis in 0..3 {
                    x[3 * i + axis] = start[3 * i + axis];
                }
            }
        };

        let minimum = NelderMead::new(self.config.simplex).minimize(start.clone(), |x| {
            let mut pinned = x.clone();
            pin(&mut pinned);
            flat_cost(&pinned, ranges)
        });

        let mut best = minimum.point;
        pin(&mut best);

        if !minimum.converged {
            debug!(
                iterations = minimum.iterations,
                evaluations = minimum.evaluations,
                "stage two stopped on its budget"
            );
        }

        for (i, position) in positions.iter_mut().enumerate() {
            if !held[i] {
                *position = Coordinates::new(best[3 * i], best[3 * i + 1], best[3 * i + 2]);
            }
        }

        Ok(StageTwoOutcome {
            initial_cost,
            final_cost: minimum.value,
            iterations: minimum.iterations,
            evaluations: minimum.evaluations,
            converged: minimum.converged,
        })
    }
}

/// Sum of squared squared-distance residuals over every valid ordered pair
pub fn residual_cost(positions: &[Coordinates], ranges: &RangeMatrix) -> f64 {
    flat_cost(&flatten(positions), ranges)
}

fn flat_cost(x: &DVector<f64>, ranges: &RangeMatrix) -> f64 {
    let n = ranges.size().min(x.len() / 3);
    let mut cost = 0.0;
    for i in 0..n {
        let pi = x.fixed_rows::<3>(3 * i);
        for (j, range) in ranges.row(i) {
            if j >= n {
                continue;
            }
            let pj = x.fixed_rows::<3>(3 * j);
            let residual = (&pi - &pj).norm_squared() - range * range;
            cost += residual * residual;
        }
    }
    cost
}

fn flatten(positions: &[Coordinates]) -> DVector<f64> {
    DVector::from_iterator(
        positions.len() * 3,
        positions.iter().flat_map(|p| p.iter().copied()),
    )
}
