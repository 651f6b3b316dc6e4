use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::core::{Anchor, Coordinates};

/// Error of one estimate against its surveyed position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionError {
    /// Distance between estimate and ground truth (meters)
    pub euclidean: f64,
    /// Signed per-axis error, ground truth minus estimate (meters)
    pub axis: Coordinates,
}

impl PositionError {
    pub fn between(estimate: &Coordinates, ground_truth: &Coordinates) -> Self {
        let axis = ground_truth - estimate;
        Self {
            euclidean: axis.norm(),
            axis,
        }
    }
}

/// Final estimate of one anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorReport {
    pub id: String,
    pub fixed: bool,
    pub initial_guess: Coordinates,
    pub estimate: Coordinates,
    /// Per-axis standard deviation across samples
    pub spread: Coordinates,
    pub ground_truth: Option<Coordinates>,
    pub error: Option<PositionError>,
}

/// Accuracy over the solved anchors that have ground truth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    /// Number of anchors in the statistics
    pub count: usize,
    /// Mean Euclidean error (meters)
    pub mean: f64,
    /// Root Mean Square Error (meters)
    pub rmse: f64,
    /// Maximum observed error (meters)
    pub max: f64,
}

impl ErrorStatistics {
    pub fn from_errors<I: IntoIterator<Item = f64>>(errors: I) -> Self {
        let (count, sum, sum_sq, max) = errors
            .into_iter()
            .fold((0usize, 0.0, 0.0, 0.0f64), |(n, s, sq, m), e| (n + 1, s + e, sq + e * e, m.max(e)));

        if count == 0 {
            return Self {
                count: 0,
                mean: 0.0,
                rmse: 0.0,
                max: 0.0,
            };
        }

        let n = count as f64;
        Self {
            count,
            mean: sum / n,
            rmse: (sum_sq / n).sqrt(),
            max,
        }
    }
}

/// Position and error report of a calibration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub anchors: Vec<AnchorReport>,
    pub statistics: ErrorStatistics,
    /// Number of solves the estimates were reduced from
    pub sample_count: usize,
}

impl CalibrationReport {
    /// Pair every anchor with its estimate and, when surveyed, its error.
    /// Fixed anchors are reported but left out of the statistics.
    pub fn new(
        anchors: &[Anchor],
        estimates: &[Coordinates],
        spread: &[Coordinates],
        sample_count: usize,
    ) -> Self {
        let anchors: Vec<AnchorReport> = anchors
            .iter()
            .zip(estimates)
            .enumerate()
            .map(|(i, (anchor, estimate))| AnchorReport {
                id: anchor.id.clone(),
                fixed: anchor.fixed,
                initial_guess: anchor.initial_guess,
                estimate: *estimate,
                spread: spread.get(i).copied().unwrap_or_else(Coordinates::zeros),
                ground_truth: anchor.ground_truth,
                error: anchor
                    .ground_truth
                    .map(|truth| PositionError::between(estimate, &truth)),
            })
            .collect();

        let statistics = ErrorStatistics::from_errors(
            anchors
                .iter()
                .filter(|a| !a.fixed)
                .filter_map(|a| a.error.map(|e| e.euclidean)),
        );

        Self {
            anchors,
            statistics,
            sample_count,
        }
    }

    pub fn anchor(&self, id: &str) -> Option<&AnchorReport> {
        self.anchors.iter().find(|a| a.id == id)
    }
}

/// Rigidly move `estimates` onto the surveyed positions.
///
/// The rotation and translation are fitted (Kabsch) on the anchors with
/// ground truth and applied to every estimate. Returns `None` with fewer
/// than three surveyed anchors or when the fit fails.
pub fn align_to_ground_truth(anchors: &[Anchor], estimates: &[Coordinates]) -> Option<Vec<Coordinates>> {
    let pairs: Vec<(Coordinates, Coordinates)> = anchors
        .iter()
        .zip(estimates)
        .filter_map(|(a, e)| a.ground_truth.map(|t| (*e, t)))
        .collect();
    if pairs.len() < 3 {
        return None;
    }

    let n = pairs.len() as f64;
    let c_est = pairs.iter().fold(Coordinates::zeros(), |acc, (e, _)| acc + e) / n;
    let c_gt = pairs.iter().fold(Coordinates::zeros(), |acc, (_, t)| acc + t) / n;

    let mut h = Matrix3::<f64>::zeros();
    for (e, t) in &pairs {
        h += (t - c_gt) * (e - c_est).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }
    let t = c_gt - r * c_est;

    Some(estimates.iter().map(|p| r * p + t).collect())
}
