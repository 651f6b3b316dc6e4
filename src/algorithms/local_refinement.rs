//! Stage 1: local trilateration refinement
//!
//! Every non-fixed anchor is re-trilaterated against the current estimates of
//! the anchors it has valid ranges to. Updates are applied in place, so later
//! anchors in the same sweep already see earlier anchors' new positions.
//!
//! Convergence is measured on the induced pairwise-distance matrix rather
//! than on raw coordinates, which keeps the test invariant to the rigid
//! motions a self-referenced solve is free to make.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::trilateration::TrilaterationSolver;
use crate::core::{
    pairwise_distances, Coordinates, RangeMatrix, RefinementStatus,
    DEFAULT_STAGE_ONE_MAX_ITERATIONS, DEFAULT_STAGE_ONE_TOLERANCE, MIN_TRILATERATION_REFERENCES,
};
use crate::validation::error::{CalibrationError, CalibrationResult};

/// Stage-1 iteration budget and termination threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOneConfig {
    pub max_iterations: usize,
    /// Frobenius norm of the distance-matrix change that counts as converged
    pub tolerance: f64,
}

impl Default for StageOneConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_STAGE_ONE_MAX_ITERATIONS,
            tolerance: DEFAULT_STAGE_ONE_TOLERANCE,
        }
    }
}

/// Result of one Stage-1 run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOneOutcome {
    pub status: RefinementStatus,
    pub iterations: usize,
    /// Last distance-matrix delta observed
    pub last_delta: f64,
    /// Anchors that were re-trilaterated at least once
    pub updated: Vec<bool>,
}

/// Stage-1 refinement engine
#[derive(Debug, Clone, Default)]
pub struct LocalRefinement {
    pub config: StageOneConfig,
    solver: TrilaterationSolver,
}

impl LocalRefinement {
    pub fn new(config: StageOneConfig) -> Self {
        Self {
            config,
            solver: TrilaterationSolver::default(),
        }
    }

    /// Refine `positions` in place. Fixed anchors are never written.
    pub fn refine(
        &self,
        positions: &mut [Coordinates],
        ranges: &RangeMatrix,
        fixed: &[bool],
    ) -> CalibrationResult<StageOneOutcome> {
        let n = positions.len();
        check_len("range matrix size", n, ranges.size())?;
        check_len("fixed anchor mask", n, fixed.len())?;

        let mut updated = vec![false; n];
        let mut previous = pairwise_distances(positions);
        let mut last_delta = f64::INFINITY;

        for iteration in 1..=self.config.max_iterations {
            for anchor in 0..n {
                if fixed[anchor] {
                    continue;
                }
                if self.update_anchor(anchor, positions, ranges) {
                    updated[anchor] = true;
                }
            }

            let current = pairwise_distances(positions);
            last_delta = (&current - &previous).norm();
            previous = current;

            if last_delta < self.config.tolerance {
                debug!(iteration, delta = last_delta, "stage one converged");
                return Ok(StageOneOutcome {
                    status: RefinementStatus::Converged,
                    iterations: iteration,
                    last_delta,
                    updated,
                });
            }
        }

        debug!(
            iterations = self.config.max_iterations,
            delta = last_delta,
            "stage one reached iteration budget"
        );
        Ok(StageOneOutcome {
            status: RefinementStatus::MaxItersReached,
            iterations: self.config.max_iterations,
            last_delta,
            updated,
        })
    }

    /// Re-trilaterate one anchor. Returns whether its position was replaced.
    fn update_anchor(
        &self,
        anchor: usize,
        positions: &mut [Coordinates],
        ranges: &RangeMatrix,
    ) -> bool {
        let (references, distances): (Vec<Coordinates>, Vec<f64>) = ranges
            .row(anchor)
            .map(|(other, range)| (positions[other], range))
            .unzip();

        if references.len() < MIN_TRILATERATION_REFERENCES {
            debug!(anchor, references = references.len(), "too few references, keeping position");
            return false;
        }

        match self.solver.solve(&references, &distances) {
            Ok(estimate) if estimate.iter().all(|c| c.is_finite()) => {
                positions[anchor] = estimate;
                true
            }
            Ok(_) => {
                debug!(anchor, "non-finite trilateration result, keeping position");
                false
            }
            Err(e) => {
                debug!(anchor, error = %e, "trilateration failed, keeping position");
                false
            }
        }
    }
}

/// Anchors with fewer valid references than a 3D trilateration needs
pub fn under_constrained(ranges: &RangeMatrix) -> Vec<bool> {
    (0..ranges.size())
        .map(|i| ranges.valid_count(i) < MIN_TRILATERATION_REFERENCES)
        .collect()
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> CalibrationResult<()> {
    if expected != actual {
        return Err(CalibrationError::DimensionMismatch { what, expected, actual });
    }
    Ok(())
}
