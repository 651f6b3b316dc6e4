//! Multi-sample anchor autocalibration
//!
//! Every sample is solved independently: the anchor positions are reset to
//! the initial guess, refined by Stage 1 (local trilateration) and then by
//! Stage 2 (global simplex). The per-sample results form one position cloud
//! per anchor whose centroid is the final estimate.

use rand::Rng;
use tracing::{debug, info};

use super::global_optimizer::{GlobalOptimizer, StageTwoOutcome};
use super::local_refinement::{under_constrained, LocalRefinement, StageOneOutcome};
use crate::core::{Anchor, Coordinates, RangeMatrix};
use crate::processing::aggregation::RobustRangeAggregator;
use crate::processing::records::RangingRecords;
use crate::utils::config::SolverConfig;
use crate::validation::accuracy::{align_to_ground_truth, CalibrationReport};
use crate::validation::error::{CalibrationError, CalibrationResult};

/// Anchor positions while one sample is being solved
#[derive(Debug, Clone, PartialEq)]
pub struct AutocalibrationState {
    positions: Vec<Coordinates>,
}

impl AutocalibrationState {
    fn from_anchors(anchors: &[Anchor]) -> Self {
        Self {
            positions: anchors.iter().map(|a| a.initial_guess).collect(),
        }
    }

    pub fn positions(&self) -> &[Coordinates] {
        &self.positions
    }
}

/// Final positions of one sample with the diagnostics of both stages
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSolution {
    pub positions: Vec<Coordinates>,
    pub stage_one: StageOneOutcome,
    /// `None` when Stage 2 is disabled
    pub stage_two: Option<StageTwoOutcome>,
    /// Anchors Stage 2 kept at their Stage-1 position
    pub held: Vec<bool>,
}

/// Two-stage solver over a fixed set of anchors
#[derive(Debug, Clone)]
pub struct AutocalibrationSolver {
    anchors: Vec<Anchor>,
    fixed: Vec<bool>,
    config: SolverConfig,
    stage_one: LocalRefinement,
    stage_two: GlobalOptimizer,
}

impl AutocalibrationSolver {
    pub fn new(anchors: Vec<Anchor>, config: SolverConfig) -> Self {
        let fixed = anchors.iter().map(|a| a.fixed).collect();
        Self {
            anchors,
            fixed,
            stage_one: LocalRefinement::new(config.stage_one),
            stage_two: GlobalOptimizer::new(config.stage_two),
            config,
        }
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Index of the anchor called `id`
    pub fn anchor_index(&self, id: &str) -> CalibrationResult<usize> {
        self.anchors
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| CalibrationError::UnknownAnchor(id.to_string()))
    }

    /// Shift x and y of every non-fixed initial guess by `magnitude` times
    /// -1, 0 or +1, drawn independently per axis
    pub fn perturb_initial_guess<R: Rng + ?Sized>(&mut self, magnitude: f64, rng: &mut R) {
        for anchor in self.anchors.iter_mut().filter(|a| !a.fixed) {
            for axis in 0..2 {
                anchor.initial_guess[axis] += f64::from(rng.gen_range(-1i32..=1)) * magnitude;
            }
            debug!(anchor = %anchor.id, guess = ?anchor.initial_guess.as_slice(), "perturbed initial guess");
        }
    }

    /// Run Stage 1 and Stage 2 on one sample from a fresh state
    pub fn solve_sample(&self, ranges: &RangeMatrix) -> CalibrationResult<SampleSolution> {
        if ranges.size() != self.anchors.len() {
            return Err(CalibrationError::DimensionMismatch {
                what: "range matrix size",
                expected: self.anchors.len(),
                actual: ranges.size(),
            });
        }

        let symmetrized;
        let ranges = if self.config.symmetrize_ranges {
            symmetrized = ranges.symmetrized();
            &symmetrized
        } else {
            ranges
        };

        let mut state = AutocalibrationState::from_anchors(&self.anchors);
        let stage_one = self.stage_one.refine(&mut state.positions, ranges, &self.fixed)?;

        let held: Vec<bool> = under_constrained(ranges)
            .into_iter()
            .zip(&self.fixed)
            .map(|(sparse, &fixed)| sparse || fixed)
            .collect();

        let stage_two = if self.config.stage_two.enabled {
            Some(self.stage_two.optimize(&mut state.positions, ranges, &held)?)
        } else {
            None
        };

        Ok(SampleSolution {
            positions: state.positions,
            stage_one,
            stage_two,
            held,
        })
    }

    /// Solve every sample independently and collect the position clouds
    pub fn solve_samples(&self, samples: &[RangeMatrix]) -> CalibrationResult<EstimationResult> {
        if samples.is_empty() {
            return Err(CalibrationError::NoSamples);
        }

        let total = samples.len();
        let mut solutions = Vec::with_capacity(total);
        for (index, ranges) in samples.iter().enumerate() {
            let solution = self.solve_sample(ranges)?;
            info!(
                sample = index + 1,
                total,
                stage_one = ?solution.stage_one.status,
                stage_one_iterations = solution.stage_one.iterations,
                final_cost = solution.stage_two.as_ref().map(|s| s.final_cost),
                "solved sample ({:.2}%)",
                (index + 1) as f64 / total as f64 * 100.0
            );
            solutions.push(solution);
        }

        Ok(EstimationResult {
            anchors: self.anchors.clone(),
            solutions,
        })
    }

    /// Solve each logged reading as its own sample
    pub fn solve_records(&self, records: &RangingRecords) -> CalibrationResult<EstimationResult> {
        self.check_records(records)?;
        self.solve_samples(&records.samples(self.config.range_filter.discard_first))
    }

    /// Single solve on the robust per-pair aggregate of all readings
    pub fn solve_aggregated(&self, records: &RangingRecords) -> CalibrationResult<EstimationResult> {
        self.check_records(records)?;
        let aggregator = RobustRangeAggregator::new(self.config.range_filter);
        self.solve_samples(&[records.aggregated(&aggregator)])
    }

    /// One solve per bootstrap resample of the readings
    pub fn solve_bootstrap<R: Rng + ?Sized>(
        &self,
        records: &RangingRecords,
        draws: usize,
        rng: &mut R,
    ) -> CalibrationResult<EstimationResult> {
        self.check_records(records)?;
        let aggregator = RobustRangeAggregator::new(self.config.range_filter);
        self.solve_samples(&records.bootstrap(&aggregator, draws, rng))
    }

    fn check_records(&self, records: &RangingRecords) -> CalibrationResult<()> {
        if records.anchor_count() != self.anchors.len() {
            return Err(CalibrationError::DimensionMismatch {
                what: "ranging record anchors",
                expected: self.anchors.len(),
                actual: records.anchor_count(),
            });
        }
        Ok(())
    }
}

/// Per-sample solutions of a calibration run
#[derive(Debug, Clone)]
pub struct EstimationResult {
    anchors: Vec<Anchor>,
    solutions: Vec<SampleSolution>,
}

impl EstimationResult {
    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn solutions(&self) -> &[SampleSolution] {
        &self.solutions
    }

    pub fn sample_count(&self) -> usize {
        self.solutions.len()
    }

    /// Per-sample positions of one anchor
    pub fn cloud(&self, anchor: usize) -> Vec<Coordinates> {
        self.solutions.iter().map(|s| s.positions[anchor]).collect()
    }

    /// Mean position of every anchor across samples
    pub fn centroids(&self) -> Vec<Coordinates> {
        let count = self.solutions.len().max(1) as f64;
        (0..self.anchors.len())
            .map(|i| {
                self.solutions
                    .iter()
                    .fold(Coordinates::zeros(), |acc, s| acc + s.positions[i])
                    / count
            })
            .collect()
    }

    /// Per-axis standard deviation of every anchor's cloud
    pub fn spread(&self) -> Vec<Coordinates> {
        let count = self.solutions.len().max(1) as f64;
        self.centroids()
            .into_iter()
            .enumerate()
            .map(|(i, centroid)| {
                let variance = self.solutions.iter().fold(Coordinates::zeros(), |acc, s| {
                    let d = s.positions[i] - centroid;
                    acc + d.component_mul(&d)
                }) / count;
                variance.map(f64::sqrt)
            })
            .collect()
    }

    /// Error report for the centroid estimates
    pub fn report(&self) -> CalibrationReport {
        CalibrationReport::new(&self.anchors, &self.centroids(), &self.spread(), self.sample_count())
    }

    /// Error report after rigidly aligning the centroids onto the surveyed
    /// positions. Falls back to the unaligned report when fewer than three
    /// anchors have ground truth.
    pub fn aligned_report(&self) -> CalibrationReport {
        let centroids = self.centroids();
        match align_to_ground_truth(&self.anchors, &centroids) {
            Some(aligned) => {
                CalibrationReport::new(&self.anchors, &aligned, &self.spread(), self.sample_count())
            }
            None => {
                debug!("not enough ground truth to align estimates");
                CalibrationReport::new(&self.anchors, &centroids, &self.spread(), self.sample_count())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RefinementStatus;
    use crate::processing::aggregation::RangeFilterConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn square_grid_anchors(guess: Coordinates) -> Vec<Anchor> {
        vec![
            Anchor::new("A0", Coordinates::new(0.0, 0.0, 0.0)).fixed(),
            Anchor::new("A1", Coordinates::new(0.0, 2.0, 0.0)).fixed(),
            Anchor::new("A2", Coordinates::new(2.0, 2.0, 0.0)).fixed(),
            Anchor::new("A3", Coordinates::new(2.0, 0.0, 0.0)).fixed(),
            Anchor::new("F0", guess).with_ground_truth(Coordinates::new(1.0, 1.0, 0.0)),
        ]
    }

    fn square_grid_truth() -> Vec<Coordinates> {
        vec![
            Coordinates::new(0.0, 0.0, 0.0),
            Coordinates::new(0.0, 2.0, 0.0),
            Coordinates::new(2.0, 2.0, 0.0),
            Coordinates::new(2.0, 0.0, 0.0),
            Coordinates::new(1.0, 1.0, 0.0),
        ]
    }

    fn noisy_ranges(truth: &[Coordinates], sigma: f64, rng: &mut StdRng) -> RangeMatrix {
        let noise = Normal::new(0.0, sigma).unwrap();
        let mut ranges = RangeMatrix::new(truth.len());
        for i in 0..truth.len() {
            for j in 0..truth.len() {
                let range = (truth[i] - truth[j]).norm() + noise.sample(rng);
                ranges.set(i, j, Some(range.max(0.0)));
            }
        }
        ranges
    }

    #[test]
    fn test_square_grid_stage_one_exact() {
        let anchors = square_grid_anchors(Coordinates::new(1.4, 0.7, 0.3));
        let config = SolverConfig {
            stage_two: crate::algorithms::StageTwoConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let solver = AutocalibrationSolver::new(anchors, config);
        let ranges = RangeMatrix::from_positions(&square_grid_truth());

        let solution = solver.solve_sample(&ranges).unwrap();

        assert_eq!(solution.stage_one.status, RefinementStatus::Converged);
        assert!(solution.stage_two.is_none());
        let error = (solution.positions[4] - Coordinates::new(1.0, 1.0, 0.0)).norm();
        assert!(error < 1e-6, "estimate: {:?}", solution.positions[4]);
    }

    #[test]
    fn test_square_grid_full_solve() {
        let solver = AutocalibrationSolver::new(
            square_grid_anchors(Coordinates::new(1.4, 0.7, 0.3)),
            SolverConfig::default(),
        );
        let truth = square_grid_truth();
        let solution = solver.solve_sample(&RangeMatrix::from_positions(&truth)).unwrap();

        let stage_two = solution.stage_two.as_ref().unwrap();
        assert!(stage_two.final_cost <= stage_two.initial_cost);
        assert!((solution.positions[4] - truth[4]).norm() < 1e-6);
        for i in 0..4 {
            assert_eq!(solution.positions[i], truth[i]);
        }
    }

    #[test]
    fn test_missing_data_anchor_keeps_initial_guess() {
        let truth = vec![
            Coordinates::new(0.0, 0.0, 0.0),
            Coordinates::new(4.0, 0.0, 0.0),
            Coordinates::new(0.0, 4.0, 0.0),
            Coordinates::new(0.0, 0.0, 3.0),
            Coordinates::new(1.5, 1.0, 1.0),
            Coordinates::new(3.0, 3.0, 1.0),
        ];
        let sparse_guess = Coordinates::new(2.0, 2.0, 2.0);
        let anchors = vec![
            Anchor::new("A0", truth[0]).fixed(),
            Anchor::new("A1", truth[1]).fixed(),
            Anchor::new("A2", truth[2]).fixed(),
            Anchor::new("A3", truth[3]).fixed(),
            Anchor::new("F0", Coordinates::new(2.5, 0.2, 2.0)),
            Anchor::new("S0", sparse_guess),
        ];

        let mut ranges = RangeMatrix::from_positions(&truth);
        // S0 only hears two fixed anchors and nobody ranges to it but them
        for j in 2..6 {
            ranges.set(5, j, None);
        }
        ranges.set(4, 5, None);

        let solver = AutocalibrationSolver::new(anchors, SolverConfig::default());
        let result = solver.solve_samples(&[ranges.clone(), ranges]).unwrap();

        for solution in result.solutions() {
            assert!(solution.held[5]);
            assert!(!solution.stage_one.updated[5]);
            assert_eq!(solution.positions[5], sparse_guess);
            assert!((solution.positions[4] - truth[4]).norm() < 1e-6);
        }
        assert_eq!(result.centroids()[5], sparse_guess);
    }

    #[test]
    fn test_noisy_samples_centroid() {
        let truth = square_grid_truth();
        let solver = AutocalibrationSolver::new(
            square_grid_anchors(Coordinates::new(1.4, 0.7, 0.3)),
            SolverConfig::default(),
        );
        let mut rng = StdRng::seed_from_u64(42);
        let samples: Vec<RangeMatrix> = (0..20).map(|_| noisy_ranges(&truth, 0.05, &mut rng)).collect();

        let result = solver.solve_samples(&samples).unwrap();
        assert_eq!(result.sample_count(), 20);

        let centroid = result.centroids()[4];
        assert!((centroid - truth[4]).norm() < 0.1, "centroid: {:?}", centroid);
        assert!(result.spread()[4].iter().all(|s| *s > 0.0));
    }

    #[test]
    fn test_fixed_anchors_never_move() {
        let truth = square_grid_truth();
        let anchors = square_grid_anchors(Coordinates::new(0.2, 1.8, -0.4));
        let initial: Vec<Coordinates> = anchors.iter().map(|a| a.initial_guess).collect();
        let solver = AutocalibrationSolver::new(anchors, SolverConfig::default());
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..5 {
            let solution = solver.solve_sample(&noisy_ranges(&truth, 0.2, &mut rng)).unwrap();
            for i in 0..4 {
                assert_eq!(solution.positions[i], initial[i]);
            }
        }
        for i in 0..4 {
            assert_eq!(solver.anchors()[i].initial_guess, initial[i]);
        }
    }

    #[test]
    fn test_symmetrized_ranges_fill_gaps() {
        let truth = square_grid_truth();
        let mut ranges = RangeMatrix::from_positions(&truth);
        ranges.set(4, 0, None);
        ranges.set(4, 1, None);

        let config = SolverConfig {
            symmetrize_ranges: true,
            ..Default::default()
        };
        let solver = AutocalibrationSolver::new(square_grid_anchors(Coordinates::new(1.4, 0.7, 0.3)), config);
        let solution = solver.solve_sample(&ranges).unwrap();

        assert!(!solution.held[4]);
        assert!((solution.positions[4] - truth[4]).norm() < 1e-6);
    }

    #[test]
    fn test_no_samples() {
        let solver = AutocalibrationSolver::new(square_grid_anchors(Coordinates::zeros()), SolverConfig::default());
        assert!(matches!(solver.solve_samples(&[]), Err(CalibrationError::NoSamples)));
        assert!(matches!(
            solver.solve_sample(&RangeMatrix::new(3)),
            Err(CalibrationError::DimensionMismatch { .. })
        ));
        assert!(matches!(solver.anchor_index("ZZ"), Err(CalibrationError::UnknownAnchor(_))));
        assert_eq!(solver.anchor_index("F0").unwrap(), 4);
    }

    #[test]
    fn test_perturbation_skips_fixed_anchors() {
        let mut solver = AutocalibrationSolver::new(
            square_grid_anchors(Coordinates::new(1.0, 1.0, 0.5)),
            SolverConfig::default(),
        );
        let before: Vec<Coordinates> = solver.anchors().iter().map(|a| a.initial_guess).collect();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..10 {
            solver.perturb_initial_guess(2.0, &mut rng);
        }

        for i in 0..4 {
            assert_eq!(solver.anchors()[i].initial_guess, before[i]);
        }
        let moved = solver.anchors()[4].initial_guess - before[4];
        assert_eq!(moved.z, 0.0);
        for axis in 0..2 {
            // every step is a whole multiple of the magnitude
            assert_eq!((moved[axis] / 2.0).fract(), 0.0);
        }
    }

    #[test]
    fn test_aggregated_and_bootstrap_modes() {
        let truth = square_grid_truth();
        let mut rng = StdRng::seed_from_u64(5);
        let noise = Normal::new(0.0, 0.02).unwrap();
        let series: Vec<Vec<Vec<Option<f64>>>> = (0..truth.len())
            .map(|i| {
                (0..12)
                    .map(|k| {
                        (0..truth.len())
                            .map(|j| {
                                if k == 0 {
                                    None
                                } else {
                                    Some((truth[i] - truth[j]).norm() + noise.sample(&mut rng))
                                }
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();
        let records = RangingRecords::from_series(series);

        let config = SolverConfig {
            range_filter: RangeFilterConfig::default(),
            ..Default::default()
        };
        let solver = AutocalibrationSolver::new(square_grid_anchors(Coordinates::new(1.4, 0.7, 0.3)), config);

        let aggregated = solver.solve_aggregated(&records).unwrap();
        assert_eq!(aggregated.sample_count(), 1);
        assert!((aggregated.centroids()[4] - truth[4]).norm() < 0.1);

        let per_reading = solver.solve_records(&records).unwrap();
        assert_eq!(per_reading.sample_count(), 11);

        let bootstrap = solver.solve_bootstrap(&records, 4, &mut rng).unwrap();
        assert_eq!(bootstrap.sample_count(), 4);
        assert!((bootstrap.centroids()[4] - truth[4]).norm() < 0.1);
    }

    #[test]
    fn test_records_without_any_ranges_keep_initial_guess() {
        let guess = Coordinates::new(1.4, 0.7, 0.3);
        let anchors = square_grid_anchors(guess);
        let mut records = RangingRecords::from_series(vec![Vec::new(); anchors.len()]);
        records.resize(20);

        let solver = AutocalibrationSolver::new(anchors, SolverConfig::default());
        let result = solver.solve_records(&records).unwrap();

        assert_eq!(result.sample_count(), 19);
        assert!(result.solutions().iter().all(|s| s.held.iter().all(|&h| h)));
        assert!((result.centroids()[4] - guess).norm() < 1e-12);
    }

    #[test]
    fn test_report_errors() {
        let truth = square_grid_truth();
        let solver = AutocalibrationSolver::new(
            square_grid_anchors(Coordinates::new(1.4, 0.7, 0.3)),
            SolverConfig::default(),
        );
        let result = solver.solve_samples(&[RangeMatrix::from_positions(&truth)]).unwrap();
        let report = result.report();

        assert_eq!(report.sample_count, 1);
        assert_eq!(report.anchors.len(), 5);
        let free = &report.anchors[4];
        assert!(free.error.as_ref().unwrap().euclidean < 1e-6);
        assert_eq!(report.statistics.count, 1);
        assert!(report.anchors[0].error.is_none());
    }
}
