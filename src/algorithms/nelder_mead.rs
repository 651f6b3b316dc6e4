//! Derivative-free Nelder–Mead simplex minimizer

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Budget and tolerances of the simplex search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMeadConfig {
    /// Iteration cap; 0 means 200 × dimension
    pub max_iterations: usize,
    /// Cost evaluation cap; 0 means 200 × dimension
    pub max_evaluations: usize,
    /// Simplex size (max-norm around the best vertex) that counts as converged
    pub x_tolerance: f64,
    /// Cost spread across the simplex that counts as converged
    pub f_tolerance: f64,
    /// Relative offset used to build the initial simplex
    pub initial_step: f64,
    /// Absolute offset for coordinates that start at zero
    pub zero_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iterations: 0,
            max_evaluations: 0,
            x_tolerance: 1e-4,
            f_tolerance: 1e-4,
            initial_step: 0.05,
            zero_step: 0.00025,
        }
    }
}

/// Best point found by the search
#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: DVector<f64>,
    pub value: f64,
    pub iterations: usize,
    pub evaluations: usize,
    /// Whether the tolerances were met before the budget ran out
    pub converged: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NelderMead {
    pub config: NelderMeadConfig,
}

struct Counted<F> {
    cost: F,
    evaluations: usize,
}

impl<F: FnMut(&DVector<f64>) -> f64> Counted<F> {
    fn eval(&mut self, x: &DVector<f64>) -> f64 {
        self.evaluations += 1;
        let value = (self.cost)(x);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    }
}

impl NelderMead {
    pub fn new(config: NelderMeadConfig) -> Self {
        Self { config }
    }

    /// Minimize `cost` starting from `x0`.
    ///
    /// `x0` is a vertex of the initial simplex and the best vertex is never
    /// replaced by a worse one, so the returned value never exceeds
    /// `cost(x0)`.
    pub fn minimize<F>(&self, x0: DVector<f64>, cost: F) -> Minimum
    where
        F: FnMut(&DVector<f64>) -> f64,
    {
        let n = x0.len();
        let budget = |cap: usize| if cap == 0 { 200 * n.max(1) } else { cap };
        let max_iterations = budget(self.config.max_iterations);
        let max_evaluations = budget(self.config.max_evaluations);

        let mut cost = Counted { cost, evaluations: 0 };

        if n == 0 {
            let value = cost.eval(&x0);
            return Minimum {
                point: x0,
                value,
                iterations: 0,
                evaluations: cost.evaluations,
                converged: true,
            };
        }

        let mut simplex: Vec<(DVector<f64>, f64)> = Vec::with_capacity(n + 1);
        let f0 = cost.eval(&x0);
        simplex.push((x0.clone(), f0));
        for k in 0..n {
            let mut vertex = x0.clone();
            if vertex[k] != 0.0 {
                vertex[k] *= 1.0 + self.config.initial_step;
            } else {
                vertex[k] = self.config.zero_step;
            }
            let value = cost.eval(&vertex);
            simplex.push((vertex, value));
        }
        sort_simplex(&mut simplex);

        let mut iterations = 0;
        let mut converged = false;

        while iterations < max_iterations && cost.evaluations < max_evaluations {
            if self.has_converged(&simplex) {
                converged = true;
                break;
            }

            let centroid = simplex[..n]
                .iter()
                .fold(DVector::<f64>::zeros(n), |acc, (v, _)| acc + v)
                / n as f64;
            let (worst, f_worst) = simplex[n].clone();
            let f_best = simplex[0].1;
            let f_second_worst = simplex[n - 1].1;

            let reflected = &centroid * (1.0 + REFLECTION) - &worst * REFLECTION;
            let f_reflected = cost.eval(&reflected);

            let mut shrink = false;
            if f_reflected < f_best {
                let expanded =
                    &centroid * (1.0 + REFLECTION * EXPANSION) - &worst * (REFLECTION * EXPANSION);
                let f_expanded = cost.eval(&expanded);
                simplex[n] = if f_expanded < f_reflected {
                    (expanded, f_expanded)
                } else {
                    (reflected, f_reflected)
                };
            } else if f_reflected < f_second_worst {
                simplex[n] = (reflected, f_reflected);
            } else if f_reflected < f_worst {
                let outside = &centroid * (1.0 + CONTRACTION * REFLECTION)
                    - &worst * (CONTRACTION * REFLECTION);
                let f_outside = cost.eval(&outside);
                if f_outside <= f_reflected {
                    simplex[n] = (outside, f_outside);
                } else {
                    shrink = true;
                }
            } else {
                let inside = &centroid * (1.0 - CONTRACTION) + &worst * CONTRACTION;
                let f_inside = cost.eval(&inside);
                if f_inside < f_worst {
                    simplex[n] = (inside, f_inside);
                } else {
                    shrink = true;
                }
            }

            if shrink {
                let best = simplex[0].0.clone();
                for vertex in simplex.iter_mut().skip(1) {
                    let point = &best + (&vertex.0 - &best) * SHRINK;
                    let value = cost.eval(&point);
                    *vertex = (point, value);
                }
            }

            sort_simplex(&mut simplex);
            iterations += 1;
        }

        let (point, value) = simplex.swap_remove(0);
        Minimum {
            point,
            value,
            iterations,
            evaluations: cost.evaluations,
            converged,
        }
    }

    fn has_converged(&self, simplex: &[(DVector<f64>, f64)]) -> bool {
        let (best, f_best) = &simplex[0];
        let x_spread = simplex[1..]
            .iter()
            .map(|(v, _)| (v - best).amax())
            .fold(0.0, f64::max);
        let f_spread = simplex[1..]
            .iter()
            .map(|(_, f)| (f - f_best).abs())
            .fold(0.0, f64::max);
        x_spread <= self.config.x_tolerance && f_spread <= self.config.f_tolerance
    }
}

fn sort_simplex(simplex: &mut [(DVector<f64>, f64)]) {
    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_bowl() {
        let target = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let t = target.clone();
        let result = NelderMead::new(NelderMeadConfig {
            max_iterations: 2000,
            max_evaluations: 4000,
            x_tolerance: 1e-6,
            f_tolerance: 1e-10,
            ..Default::default()
        })
        .minimize(DVector::zeros(3), move |x| (x - &t).norm_squared());

        assert!(result.converged);
        assert!((result.point - target).norm() < 1e-3);
    }

    #[test]
    fn test_rosenbrock() {
        let rosenbrock = |x: &DVector<f64>| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let result = NelderMead::new(NelderMeadConfig {
            max_iterations: 5000,
            max_evaluations: 10000,
            x_tolerance: 1e-8,
            f_tolerance: 1e-12,
            ..Default::default()
        })
        .minimize(DVector::from_vec(vec![-1.2, 1.0]), rosenbrock);

        assert!((result.point[0] - 1.0).abs() < 1e-3, "point: {}", result.point);
        assert!((result.point[1] - 1.0).abs() < 1e-3, "point: {}", result.point);
    }

    #[test]
    fn test_never_worse_than_start() {
        let cost = |x: &DVector<f64>| x.iter().map(|v| v.sin() * 3.0 + v * v * 0.1).sum::<f64>();
        let x0 = DVector::from_vec(vec![4.0, -3.0, 0.0, 7.5]);
        let f0 = cost(&x0);
        let result = NelderMead::new(NelderMeadConfig {
            max_iterations: 15,
            ..Default::default()
        })
        .minimize(x0, cost);

        assert!(result.value <= f0);
        assert!(result.iterations <= 15);
    }

    #[test]
    fn test_nan_cost_is_rejected() {
        let cost = |x: &DVector<f64>| if x[0] < 0.0 { f64::NAN } else { (x[0] - 2.0).powi(2) };
        let result = NelderMead::default().minimize(DVector::from_vec(vec![0.5]), cost);
        assert!(result.value.is_finite());
        assert!((result.point[0] - 2.0).abs() < 5e-2);
    }
}
