//! Position estimation algorithms

pub mod trilateration;
pub mod local_refinement;
pub mod nelder_mead;
pub mod global_optimizer;
pub mod autocalibration;

pub use trilateration::TrilaterationSolver;
pub use local_refinement::{LocalRefinement, StageOneConfig, StageOneOutcome};
pub use nelder_mead::{NelderMead, NelderMeadConfig};
pub use global_optimizer::{GlobalOptimizer, StageTwoConfig, StageTwoOutcome};
pub use autocalibration::{AutocalibrationSolver, AutocalibrationState, EstimationResult, SampleSolution};
