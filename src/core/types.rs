//! Core data types for the autocalibration solver

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// 3D anchor coordinates in the deployment frame (meters)
pub type Coordinates = Vector3<f64>;

/// Ranging beacon with an initial position guess
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: String,
    /// Trusted position, never moved by the solver
    pub fixed: bool,
    pub initial_guess: Coordinates,
    pub ground_truth: Option<Coordinates>,
}

impl Anchor {
    pub fn new(id: impl Into<String>, initial_guess: Coordinates) -> Self {
        Self {
            id: id.into(),
            fixed: false,
            initial_guess,
            ground_truth: None,
        }
    }

    /// Mark the anchor as fixed
    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    pub fn with_ground_truth(mut self, ground_truth: Coordinates) -> Self {
        self.ground_truth = Some(ground_truth);
        self
    }
}

/// Terminal state of the Stage-1 refinement loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefinementStatus {
    Converged,
    MaxItersReached,
}
