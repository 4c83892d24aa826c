//! Inequality-handling methods.
//!
//! Given the current iterate and the active problem view, a method computes a
//! primal-dual search direction. Two methods realize the contract: a
//! sequential QP method that hands the linearized inequalities to a QP
//! solver, and a primal-dual interior-point method that folds them into a
//! logarithmic barrier. All workspace is allocated in `initialize_memory`;
//! `solve` performs no allocation.

pub mod barrier_update;
pub mod interior_point;
pub mod qp_method;

pub use interior_point::PrimalDualInteriorPointMethod;
pub use qp_method::QpMethod;

use crate::direction::Direction;
use crate::error::SolverResult;
use crate::hessian::HessianModel;
use crate::iterate::{Iterate, Multipliers};
use crate::options::Options;
use crate::reformulation::{L1RelaxedProblem, OptimizationProblem};
use crate::regularization::RegularizationStrategy;

pub trait InequalityHandlingMethod {
    /// Allocate all workspace for the largest problem view this method will
    /// see. No allocation happens inside `solve` afterwards.
    fn initialize_memory(
        &mut self,
        problem: &dyn OptimizationProblem,
        hessian_model: &dyn HessianModel,
        regularization: &mut dyn RegularizationStrategy,
    ) -> SolverResult<()>;

    /// Adjust the user's initial point into a valid starting iterate.
    fn generate_initial_iterate(
        &mut self,
        problem: &dyn OptimizationProblem,
        iterate: &mut Iterate,
    ) -> SolverResult<()>;

    /// Compute a primal-dual direction. Local failures are reported through
    /// `direction.status`; only fatal conditions surface as errors. With no
    /// warmstart bit set, the call is a no-op returning the cached direction.
    #[allow(clippy::too_many_arguments)]
    fn solve(
        &mut self,
        problem: &dyn OptimizationProblem,
        current_iterate: &mut Iterate,
        current_multipliers: &Multipliers,
        direction: &mut Direction,
        hessian_model: &mut dyn HessianModel,
        regularization: &mut dyn RegularizationStrategy,
        trust_region_radius: f64,
        warmstart: &crate::direction::WarmstartInformation,
    ) -> SolverResult<()>;

    /// v'Hv for the Hessian of the most recent solve.
    fn hessian_quadratic_product(&self, vector: &[f64]) -> f64;

    /// Record the method's auxiliary progress measure on the iterate
    /// (barrier terms for the interior-point method, zero for SQP).
    fn set_auxiliary_measure(&self, problem: &dyn OptimizationProblem, iterate: &mut Iterate);

    /// Predicted reduction of the auxiliary measure along the direction.
    fn compute_predicted_auxiliary_reduction(
        &self,
        problem: &dyn OptimizationProblem,
        iterate: &Iterate,
        primal_direction: &[f64],
        step_length: f64,
    ) -> f64;

    /// Bound and reshape the multipliers before the strategy sees them.
    fn postprocess_iterate(
        &self,
        problem: &dyn OptimizationProblem,
        primals: &mut [f64],
        multipliers: &mut Multipliers,
    );

    /// Entering the feasibility (restoration) phase.
    fn initialize_feasibility_problem(
        &mut self,
        problem: &L1RelaxedProblem<'_>,
        current_iterate: &mut Iterate,
    );

    /// Leaving the feasibility phase.
    fn exit_feasibility_problem(
        &mut self,
        problem: &dyn OptimizationProblem,
        trial_iterate: &mut Iterate,
    ) -> SolverResult<()>;

    /// Seed the elastic variables (and their duals) of the current iterate.
    fn set_elastic_variable_values(
        &self,
        problem: &L1RelaxedProblem<'_>,
        current_iterate: &mut Iterate,
    );

    /// Warm-start hint consumed on the next solve.
    fn set_initial_point(&mut self, point: &[f64]);

    /// True after any self-driven parameter update (barrier reduction, phase
    /// entry); the globalization strategy resets on seeing it and clears it.
    fn subproblem_definition_changed(&self) -> bool;
    fn clear_subproblem_definition_changed(&mut self);

    /// True when the last computed direction was negligibly small relative to
    /// the current primals.
    fn small_step_detected(&self) -> bool {
        false
    }

    fn number_subproblems_solved(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Build an inequality-handling method from its option value.
pub fn create(options: &Options) -> SolverResult<Box<dyn InequalityHandlingMethod>> {
    match options.get_str("inequality_handling_method")? {
        "QP" => Ok(Box::new(QpMethod::new(options)?)),
        "primal_dual_IPM" => Ok(Box::new(PrimalDualInteriorPointMethod::new(options)?)),
        other => Err(crate::error::SolverError::Configuration(format!(
            "unknown inequality_handling_method '{other}'"
        ))),
    }
}
