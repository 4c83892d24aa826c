//! The working point of the outer iteration.
//!
//! An iterate owns the primal-dual variables, the cached model evaluations
//! with their dirty flags, the progress measures compared by globalization
//! strategies, and the primal-dual residuals of both the optimality and the
//! feasibility view. Each evaluation happens at most once per outer
//! iteration; assembling a trial point invalidates all caches.

use crate::error::{SolverError, SolverResult};
use crate::linalg::sparse_vector::SparseVector;
use crate::model::Model;
use crate::util::{norm_1, INF};

/// Constraint and bound multipliers. The sign convention is zL >= 0 and
/// zU <= 0 on their respective bounded sets.
#[derive(Debug, Clone)]
pub struct Multipliers {
    pub constraints: Vec<f64>,
    pub lower_bounds: Vec<f64>,
    pub upper_bounds: Vec<f64>,
}

impl Multipliers {
    pub fn new(number_variables: usize, number_constraints: usize) -> Self {
        Multipliers {
            constraints: vec![0.0; number_constraints],
            lower_bounds: vec![0.0; number_variables],
            upper_bounds: vec![0.0; number_variables],
        }
    }

    pub fn reset(&mut self) {
        self.constraints.fill(0.0);
        self.lower_bounds.fill(0.0);
        self.upper_bounds.fill(0.0);
    }

    /// Grow the bound multiplier vectors when variables are appended.
    pub fn resize_variables(&mut self, number_variables: usize) {
        self.lower_bounds.resize(number_variables, 0.0);
        self.upper_bounds.resize(number_variables, 0.0);
    }

    /// L1 norm over all multiplier blocks.
    pub fn norm_1(&self) -> f64 {
        norm_1(&self.constraints) + norm_1(&self.lower_bounds) + norm_1(&self.upper_bounds)
    }

    /// True when some multiplier among the first `number_variables` bound
    /// entries or any constraint entry exceeds the tolerance in magnitude.
    pub fn not_all_zero(&self, number_variables: usize, tolerance: f64) -> bool {
        self.constraints.iter().any(|value| value.abs() > tolerance)
            || self.lower_bounds[..number_variables]
                .iter()
                .chain(self.upper_bounds[..number_variables].iter())
                .any(|value| value.abs() > tolerance)
    }
}

/// Cached model evaluations at the current primal point.
#[derive(Debug, Clone)]
pub struct Evaluations {
    pub objective: f64,
    pub objective_gradient: SparseVector,
    pub constraints: Vec<f64>,
    pub constraint_jacobian: Vec<SparseVector>,
}

/// Objective progress measure: a scaled part (multiplied by the objective
/// multiplier σ) plus a σ-independent part.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectiveMeasure {
    pub scaled: f64,
    pub constant: f64,
}

impl ObjectiveMeasure {
    pub fn scaled(value: f64) -> Self {
        ObjectiveMeasure { scaled: value, constant: 0.0 }
    }

    pub fn constant(value: f64) -> Self {
        ObjectiveMeasure { scaled: 0.0, constant: value }
    }

    pub fn value(&self, objective_multiplier: f64) -> f64 {
        objective_multiplier * self.scaled + self.constant
    }
}

/// The (infeasibility, objective, auxiliary) triple compared across candidate
/// iterates by globalization strategies.
#[derive(Debug, Clone, Copy)]
pub struct ProgressMeasures {
    pub infeasibility: f64,
    pub objective: ObjectiveMeasure,
    pub auxiliary: f64,
}

impl Default for ProgressMeasures {
    fn default() -> Self {
        ProgressMeasures {
            infeasibility: INF,
            objective: ObjectiveMeasure::default(),
            auxiliary: 0.0,
        }
    }
}

/// Lagrangian gradient split into the objective contribution (scaled by σ
/// when a stationarity error is formed) and everything else.
#[derive(Debug, Clone)]
pub struct LagrangianGradient {
    pub objective_contribution: Vec<f64>,
    pub constraints_contribution: Vec<f64>,
}

impl LagrangianGradient {
    pub fn new(number_variables: usize) -> Self {
        LagrangianGradient {
            objective_contribution: vec![0.0; number_variables],
            constraints_contribution: vec![0.0; number_variables],
        }
    }

    pub fn resize(&mut self, number_variables: usize) {
        self.objective_contribution.resize(number_variables, 0.0);
        self.constraints_contribution.resize(number_variables, 0.0);
    }
}

/// Scalar dual residuals of one problem view, with their scaling factors.
#[derive(Debug, Clone)]
pub struct DualResiduals {
    pub lagrangian_gradient: LagrangianGradient,
    pub stationarity: f64,
    pub complementarity: f64,
    pub stationarity_scaling: f64,
    pub complementarity_scaling: f64,
}

impl DualResiduals {
    pub fn new(number_variables: usize) -> Self {
        DualResiduals {
            lagrangian_gradient: LagrangianGradient::new(number_variables),
            stationarity: INF,
            complementarity: INF,
            stationarity_scaling: 1.0,
            complementarity_scaling: 1.0,
        }
    }
}

/// The working point, mutated in place by the driver.
#[derive(Debug, Clone)]
pub struct Iterate {
    pub primals: Vec<f64>,
    pub multipliers: Multipliers,
    /// Multiplier set of the feasibility (restoration) problem.
    pub feasibility_multipliers: Multipliers,
    pub evaluations: Evaluations,
    pub is_objective_computed: bool,
    pub is_objective_gradient_computed: bool,
    pub are_constraints_computed: bool,
    pub is_constraint_jacobian_computed: bool,
    pub progress: ProgressMeasures,
    pub residuals: DualResiduals,
    pub feasibility_residuals: DualResiduals,
    /// Constraint violation of the original model under the residual norm.
    pub primal_feasibility: f64,
    /// 1 in the optimality phase, 0 in the feasibility phase.
    pub objective_multiplier: f64,
}

impl Iterate {
    pub fn new(number_variables: usize, number_constraints: usize) -> Self {
        Iterate {
            primals: vec![0.0; number_variables],
            multipliers: Multipliers::new(number_variables, number_constraints),
            feasibility_multipliers: Multipliers::new(number_variables, number_constraints),
            evaluations: Evaluations {
                objective: 0.0,
                objective_gradient: SparseVector::with_capacity(number_variables),
                constraints: vec![0.0; number_constraints],
                constraint_jacobian: (0..number_constraints).map(|_| SparseVector::new()).collect(),
            },
            is_objective_computed: false,
            is_objective_gradient_computed: false,
            are_constraints_computed: false,
            is_constraint_jacobian_computed: false,
            progress: ProgressMeasures::default(),
            residuals: DualResiduals::new(number_variables),
            feasibility_residuals: DualResiduals::new(number_variables),
            primal_feasibility: INF,
            objective_multiplier: 1.0,
        }
    }

    /// Grow the primal and bound-multiplier storage (slack insertion,
    /// elastic variables). Never shrinks; new entries start at zero.
    pub fn set_number_variables(&mut self, number_variables: usize) {
        if number_variables > self.primals.len() {
            self.primals.resize(number_variables, 0.0);
            self.multipliers.resize_variables(number_variables);
            self.feasibility_multipliers.resize_variables(number_variables);
            self.residuals.lagrangian_gradient.resize(number_variables);
            self.feasibility_residuals.lagrangian_gradient.resize(number_variables);
        }
    }

    /// Mark every cached evaluation stale.
    pub fn invalidate_evaluations(&mut self) {
        self.is_objective_computed = false;
        self.is_objective_gradient_computed = false;
        self.are_constraints_computed = false;
        self.is_constraint_jacobian_computed = false;
    }

    pub fn evaluate_objective(&mut self, model: &dyn Model) -> SolverResult<()> {
        if !self.is_objective_computed {
            let value = model.evaluate_objective(&self.primals);
            if value.is_nan() {
                return Err(SolverError::Evaluation("objective evaluated to NaN".to_string()));
            }
            self.evaluations.objective = value;
            self.is_objective_computed = true;
        }
        Ok(())
    }

    pub fn evaluate_objective_gradient(&mut self, model: &dyn Model) -> SolverResult<()> {
        if !self.is_objective_gradient_computed {
            self.evaluations.objective_gradient.clear();
            model.evaluate_objective_gradient(&self.primals, &mut self.evaluations.objective_gradient);
            if self.evaluations.objective_gradient.iter().any(|(_, v)| !v.is_finite()) {
                return Err(SolverError::Evaluation(
                    "objective gradient evaluated to NaN or infinity".to_string(),
                ));
            }
            self.is_objective_gradient_computed = true;
        }
        Ok(())
    }

    pub fn evaluate_constraints(&mut self, model: &dyn Model) -> SolverResult<()> {
        if !self.are_constraints_computed {
            model.evaluate_constraints(&self.primals, &mut self.evaluations.constraints);
            if self.evaluations.constraints.iter().any(|v| !v.is_finite()) {
                return Err(SolverError::Evaluation(
                    "constraints evaluated to NaN or infinity".to_string(),
                ));
            }
            self.are_constraints_computed = true;
        }
        Ok(())
    }

    pub fn evaluate_constraint_jacobian(&mut self, model: &dyn Model) -> SolverResult<()> {
        if !self.is_constraint_jacobian_computed {
            for row in &mut self.evaluations.constraint_jacobian {
                row.clear();
            }
            model.evaluate_constraint_jacobian(&self.primals, &mut self.evaluations.constraint_jacobian);
            self.is_constraint_jacobian_computed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::symmetric::SymmetricMatrix;
    use std::cell::Cell;

    /// A model that counts how often each callback runs.
    struct CountingModel {
        objective_calls: Cell<usize>,
        constraint_calls: Cell<usize>,
    }

    impl Model for CountingModel {
        fn number_variables(&self) -> usize {
            1
        }
        fn number_constraints(&self) -> usize {
            1
        }
        fn variable_lower_bound(&self, _: usize) -> f64 {
            -INF
        }
        fn variable_upper_bound(&self, _: usize) -> f64 {
            INF
        }
        fn constraint_lower_bound(&self, _: usize) -> f64 {
            0.0
        }
        fn constraint_upper_bound(&self, _: usize) -> f64 {
            0.0
        }
        fn evaluate_objective(&self, x: &[f64]) -> f64 {
            self.objective_calls.set(self.objective_calls.get() + 1);
            x[0] * x[0]
        }
        fn evaluate_objective_gradient(&self, x: &[f64], gradient: &mut SparseVector) {
            gradient.insert(0, 2.0 * x[0]);
        }
        fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) {
            self.constraint_calls.set(self.constraint_calls.get() + 1);
            constraints[0] = x[0];
        }
        fn evaluate_constraint_jacobian(&self, _: &[f64], jacobian: &mut [SparseVector]) {
            jacobian[0].insert(0, 1.0);
        }
        fn evaluate_lagrangian_hessian(&self, _: &[f64], _: f64, _: &[f64], _: &mut SymmetricMatrix) {}
        fn number_jacobian_nonzeros(&self) -> usize {
            1
        }
        fn number_hessian_nonzeros(&self) -> usize {
            0
        }
        fn initial_primal_point(&self, x: &mut [f64]) {
            x[0] = 1.0;
        }
    }

    #[test]
    fn test_evaluations_are_cached() {
        let model = CountingModel {
            objective_calls: Cell::new(0),
            constraint_calls: Cell::new(0),
        };
        let mut iterate = Iterate::new(1, 1);
        iterate.primals[0] = 2.0;

        for _ in 0..5 {
            iterate.evaluate_objective(&model).unwrap();
            iterate.evaluate_constraints(&model).unwrap();
        }
        assert_eq!(model.objective_calls.get(), 1);
        assert_eq!(model.constraint_calls.get(), 1);

        // a new outer iteration invalidates the caches
        iterate.invalidate_evaluations();
        iterate.evaluate_objective(&model).unwrap();
        assert_eq!(model.objective_calls.get(), 2);
    }

    #[test]
    fn test_nan_objective_is_an_evaluation_error() {
        struct NanModel;
        impl Model for NanModel {
            fn number_variables(&self) -> usize {
                1
            }
            fn number_constraints(&self) -> usize {
                0
            }
            fn variable_lower_bound(&self, _: usize) -> f64 {
                -INF
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
            fn evaluate_objective(&self, _: &[f64]) -> f64 {
                f64::NAN
            }
            fn evaluate_objective_gradient(&self, _: &[f64], _: &mut SparseVector) {}
            fn evaluate_constraints(&self, _: &[f64], _: &mut [f64]) {}
            fn evaluate_constraint_jacobian(&self, _: &[f64], _: &mut [SparseVector]) {}
            fn evaluate_lagrangian_hessian(&self, _: &[f64], _: f64, _: &[f64], _: &mut SymmetricMatrix) {}
            fn number_jacobian_nonzeros(&self) -> usize {
                0
            }
            fn number_hessian_nonzeros(&self) -> usize {
                0
            }
            fn initial_primal_point(&self, _: &mut [f64]) {}
        }

        let mut iterate = Iterate::new(1, 0);
        assert!(matches!(
            iterate.evaluate_objective(&NanModel),
            Err(SolverError::Evaluation(_))
        ));
    }
}
