//! Closed-form least-squares trilateration
//!
//! The sphere equations `‖x − P_i‖² = d_i²` are linearized by subtracting the
//! last reference's equation from every other one, giving `A·x = B` with
//!
//! ```text
//! A_i = 2·(P_last − P_i)
//! B_i = d_i² − d_last² − ‖P_i‖² + ‖P_last‖²
//! ```
//!
//! The system is solved with the Moore–Penrose pseudo-inverse, so more than
//! four references give a least-squares fit and rank-deficient geometry
//! degrades to the minimum-norm solution instead of failing.

use nalgebra::{DMatrix, DVector};

use crate::core::{Coordinates, MIN_TRILATERATION_REFERENCES, PSEUDO_INVERSE_EPSILON};
use crate::validation::error::{CalibrationError, CalibrationResult};

/// Pseudo-inverse trilateration solver
#[derive(Debug, Clone, Copy)]
pub struct TrilaterationSolver {
    /// Singular value cutoff for the pseudo-inverse
    pub epsilon: f64,
}

impl Default for TrilaterationSolver {
    fn default() -> Self {
        Self {
            epsilon: PSEUDO_INVERSE_EPSILON,
        }
    }
}

impl TrilaterationSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate the point whose distances to `references` are `distances`.
    ///
    /// Callers gate on `MIN_TRILATERATION_REFERENCES`; fewer references are
    /// rejected here as well.
    pub fn solve(
        &self,
        references: &[Coordinates],
        distances: &[f64],
    ) -> CalibrationResult<Coordinates> {
        let k = references.len();
        if distances.len() != k {
            return Err(CalibrationError::DimensionMismatch {
                what: "trilateration distances",
                expected: k,
                actual: distances.len(),
            });
        }
        if k < MIN_TRILATERATION_REFERENCES {
            return Err(CalibrationError::InsufficientReferences {
                available: k,
                required: MIN_TRILATERATION_REFERENCES,
            });
        }

        let (a_matrix, b_vector) = Self::linear_system(references, distances);

        let a_pinv = a_matrix
            .pseudo_inverse(self.epsilon)
            .map_err(|e| CalibrationError::DegenerateGeometry(e.to_string()))?;
        let solution = a_pinv * b_vector;

        Ok(Coordinates::new(solution[0], solution[1], solution[2]))
    }

    /// Build `A` ((k−1)×3) and `B` (k−1) from references and distances
    fn linear_system(references: &[Coordinates], distances: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
        let k = references.len();
        let p_last = references[k - 1];
        let d_last = distances[k - 1];

        let mut a_matrix = DMatrix::zeros(k - 1, 3);
        let mut b_vector = DVector::zeros(k - 1);

        for (row, (pi, di)) in references.iter().zip(distances).take(k - 1).enumerate() {
            let diff = (p_last - pi) * 2.0;
            a_matrix[(row, 0)] = diff.x;
            a_matrix[(row, 1)] = diff.y;
            a_matrix[(row, 2)] = diff.z;

            b_vector[row] =
                di.powi(2) - d_last.powi(2) - pi.norm_squared() + p_last.norm_squared();
        }

        (a_matrix, b_vector)
    }
}
