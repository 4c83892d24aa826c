//! Problem views consumed by the inequality-handling methods.
//!
//! An [`OptimizationProblem`] presents a model under a fixed objective
//! multiplier: the optimality view keeps the original objective (σ = 1), the
//! ℓ1-relaxed view replaces it with the elastic-measured constraint violation
//! (σ = 0). Both expose the same evaluation and metadata surface, so methods
//! are oblivious to which phase the relaxation strategy is in.

pub mod l1_relaxed;
pub mod optimality;

pub use l1_relaxed::L1RelaxedProblem;
pub use optimality::OptimalityProblem;

use crate::error::SolverResult;
use crate::iterate::{Evaluations, Iterate, LagrangianGradient, Multipliers};
use crate::linalg::sparse_vector::SparseVector;
use crate::linalg::symmetric::SymmetricMatrix;
use crate::model::Model;
use crate::util::{norm_of, Norm};

/// A model viewed through a reformulation, under a fixed objective
/// multiplier.
pub trait OptimizationProblem {
    fn model(&self) -> &dyn Model;
    fn number_variables(&self) -> usize;
    fn number_constraints(&self) -> usize;
    /// σ: 1 for the optimality view, 0 for the feasibility view.
    fn objective_multiplier(&self) -> f64;

    fn variable_lower_bound(&self, variable_index: usize) -> f64;
    fn variable_upper_bound(&self, variable_index: usize) -> f64;
    fn constraint_lower_bound(&self, constraint_index: usize) -> f64;
    fn constraint_upper_bound(&self, constraint_index: usize) -> f64;

    fn lower_bounded_variables(&self) -> &[usize];
    fn upper_bounded_variables(&self) -> &[usize];
    fn single_lower_bounded_variables(&self) -> &[usize];
    fn single_upper_bounded_variables(&self) -> &[usize];
    fn inequality_constraints(&self) -> &[usize];

    /// Objective gradient of the view (σ-scaled model gradient plus any
    /// reformulation terms).
    fn evaluate_objective_gradient(
        &self,
        iterate: &mut Iterate,
        gradient: &mut SparseVector,
    ) -> SolverResult<()>;
    /// Constraint values of the view.
    fn evaluate_constraints(&self, iterate: &mut Iterate, constraints: &mut [f64]) -> SolverResult<()>;
    /// Constraint Jacobian of the view.
    fn evaluate_constraint_jacobian(
        &self,
        iterate: &mut Iterate,
        jacobian: &mut [SparseVector],
    ) -> SolverResult<()>;
    /// Lagrangian Hessian of the view at (x, σ, λ).
    fn evaluate_lagrangian_hessian(
        &self,
        x: &[f64],
        multipliers: &[f64],
        hessian: &mut SymmetricMatrix,
    );

    fn number_objective_gradient_nonzeros(&self) -> usize;
    fn number_jacobian_nonzeros(&self) -> usize;
    fn number_hessian_nonzeros(&self) -> usize;

    /// Lagrangian gradient split into the model-objective contribution and
    /// everything else (constraints, bounds, reformulation terms). The
    /// caller must have evaluated the objective gradient and the constraint
    /// Jacobian beforehand.
    fn evaluate_lagrangian_gradient(
        &self,
        gradient: &mut LagrangianGradient,
        evaluations: &Evaluations,
        multipliers: &Multipliers,
    );

    /// Complementary slackness error under this view's multiplier
    /// conventions, with an optional shift (the barrier parameter).
    fn complementarity_error(
        &self,
        primals: &[f64],
        constraints: &[f64],
        multipliers: &Multipliers,
        shift_value: f64,
        norm: Norm,
    ) -> f64;
}

/// Stationarity error ‖σ·(objective contribution) + (constraints
/// contribution)‖ over the first `number_variables` entries.
pub fn stationarity_error(
    gradient: &LagrangianGradient,
    objective_multiplier: f64,
    norm: Norm,
    number_variables: usize,
) -> f64 {
    norm_of(
        norm,
        (0..number_variables).map(|i| {
            objective_multiplier * gradient.objective_contribution[i]
                + gradient.constraints_contribution[i]
        }),
    )
}
