//! Monotone barrier-parameter update (Fiacco–McCormick rule).
//!
//! The barrier parameter is reduced once the scaled optimality error of the
//! current barrier subproblem falls below a fraction of μ:
//!
//! ```text
//! μ ← max(tolerance / 10, min(k_mu · μ, μ^theta_mu))
//! ```

use tracing::debug;

use crate::error::SolverResult;
use crate::iterate::{DualResiduals, Iterate, Multipliers};
use crate::options::Options;
use crate::reformulation::OptimizationProblem;
use crate::util::Norm;

pub struct BarrierParameterUpdateStrategy {
    barrier_parameter: f64,
    tolerance: f64,
    update_fraction: f64,
    k_mu: f64,
    theta_mu: f64,
}

impl BarrierParameterUpdateStrategy {
    pub fn new(options: &Options) -> SolverResult<Self> {
        Ok(BarrierParameterUpdateStrategy {
            barrier_parameter: options.get_f64("barrier_initial_parameter")?,
            tolerance: options.get_f64("tolerance")?,
            update_fraction: options.get_f64("barrier_update_fraction")?,
            k_mu: options.get_f64("barrier_k_mu")?,
            theta_mu: options.get_f64("barrier_theta_mu")?,
        })
    }

    pub fn barrier_parameter(&self) -> f64 {
        self.barrier_parameter
    }

    pub fn set_barrier_parameter(&mut self, barrier_parameter: f64) {
        self.barrier_parameter = barrier_parameter;
    }

    /// Possibly reduce μ, repeatedly while the current iterate already solves
    /// the barrier subproblem to the μ-proportional accuracy. Returns true
    /// when μ changed.
    pub fn update_barrier_parameter(
        &mut self,
        problem: &dyn OptimizationProblem,
        iterate: &Iterate,
        multipliers: &Multipliers,
        residuals: &DualResiduals,
    ) -> bool {
        let mut updated = false;
        loop {
            // optimality error of the barrier subproblem: stationarity,
            // equality feasibility and μ-shifted complementarity
            let complementarity = problem.complementarity_error(
                &iterate.primals,
                &iterate.evaluations.constraints,
                multipliers,
                self.barrier_parameter,
                Norm::Inf,
            );
            let error = residuals
                .stationarity
                .max(iterate.primal_feasibility)
                .max(complementarity);
            if error > self.update_fraction * self.barrier_parameter {
                return updated;
            }
            let smaller = (self.k_mu * self.barrier_parameter)
                .min(self.barrier_parameter.powf(self.theta_mu));
            let new_parameter = (self.tolerance / 10.0).max(smaller);
            if new_parameter == self.barrier_parameter {
                return updated;
            }
            debug!(from = self.barrier_parameter, to = new_parameter, "barrier parameter reduced");
            self.barrier_parameter = new_parameter;
            updated = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse_vector::SparseVector;
    use crate::linalg::symmetric::SymmetricMatrix;
    use crate::model::Model;
    use crate::reformulation::OptimalityProblem;
    use crate::util::INF;

    struct LowerBounded;

    impl Model for LowerBounded {
        fn number_variables(&self) -> usize {
            1
        }
        fn number_constraints(&self) -> usize {
            0
        }
        fn variable_lower_bound(&self, _: usize) -> f64 {
            0.0
        }
        fn variable_upper_bound(&self, _: usize) -> f64 {
            INF
        }
        fn constraint_lower_bound(&self, _: usize) -> f64 {
            unreachable!()
        }
        fn constraint_upper_bound(&self, _: usize) -> f64 {
            unreachable!()
        }
        fn evaluate_objective(&self, x: &[f64]) -> f64 {
            x[0]
        }
        fn evaluate_objective_gradient(&self, _: &[f64], gradient: &mut SparseVector) {
            gradient.insert(0, 1.0);
        }
        fn evaluate_constraints(&self, _: &[f64], _: &mut [f64]) {}
        fn evaluate_constraint_jacobian(&self, _: &[f64], _: &mut [SparseVector]) {}
        fn evaluate_lagrangian_hessian(&self, _: &[f64], _: f64, _: &[f64], _: &mut SymmetricMatrix) {}
        fn number_jacobian_nonzeros(&self) -> usize {
            0
        }
        fn number_hessian_nonzeros(&self) -> usize {
            0
        }
        fn initial_primal_point(&self, x: &mut [f64]) {
            x[0] = 1.0;
        }
    }

    #[test]
    fn test_barrier_parameter_decreases_monotonically() {
        let model = LowerBounded;
        let problem = OptimalityProblem::new(&model);
        let options = Options::default();
        let mut strategy = BarrierParameterUpdateStrategy::new(&options).unwrap();
        let initial = strategy.barrier_parameter();

        let mut iterate = Iterate::new(1, 0);
        iterate.primals[0] = 1.0;
        iterate.primal_feasibility = 0.0;
        iterate.residuals.stationarity = 0.0;
        // complementarity matches mu exactly: the subproblem is solved
        iterate.multipliers.lower_bounds[0] = initial;

        let updated = strategy.update_barrier_parameter(
            &problem,
            &iterate,
            &iterate.multipliers.clone(),
            &iterate.residuals,
        );
        assert!(updated);
        assert!(strategy.barrier_parameter() < initial);
    }

    #[test]
    fn test_barrier_parameter_kept_while_error_is_large() {
        let model = LowerBounded;
        let problem = OptimalityProblem::new(&model);
        let options = Options::default();
        let mut strategy = BarrierParameterUpdateStrategy::new(&options).unwrap();
        let initial = strategy.barrier_parameter();

        let mut iterate = Iterate::new(1, 0);
        iterate.primals[0] = 1.0;
        iterate.primal_feasibility = 0.0;
        iterate.residuals.stationarity = 100.0;

        let updated = strategy.update_barrier_parameter(
            &problem,
            &iterate,
            &iterate.multipliers.clone(),
            &iterate.residuals,
        );
        assert!(!updated);
        assert_eq!(strategy.barrier_parameter(), initial);
    }
}
