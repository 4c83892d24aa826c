//! Globalization mechanisms: explore along the computed direction.
//!
//! A mechanism parameterizes the trial step (backtracked step length or
//! trust-region radius), assembles trial iterates and drives the
//! accept/reject loop. When its step parameter collapses below the minimum,
//! it escalates to the feasibility problem, and fails with
//! `StepLengthTooSmall` when that happens while already restoring.

pub mod line_search;
pub mod trust_region;

pub use line_search::BacktrackingLineSearch;
pub use trust_region::TrustRegion;

use crate::direction::{Direction, WarmstartInformation};
use crate::driver::UserCallbacks;
use crate::error::SolverResult;
use crate::globalization_strategy::GlobalizationStrategy;
use crate::hessian::HessianModel;
use crate::inequality_handling::InequalityHandlingMethod;
use crate::iterate::Iterate;
use crate::options::Options;
use crate::regularization::RegularizationStrategy;
use crate::relaxation::FeasibilityRestoration;

pub trait GlobalizationMechanism {
    /// Compute a direction through the relaxation layer, then produce an
    /// accepted trial iterate in `trial_iterate`.
    #[allow(clippy::too_many_arguments)]
    fn compute_next_iterate(
        &mut self,
        relaxation: &mut FeasibilityRestoration<'_>,
        method: &mut dyn InequalityHandlingMethod,
        hessian_model: &mut dyn HessianModel,
        regularization: &mut dyn RegularizationStrategy,
        strategy: &mut dyn GlobalizationStrategy,
        current_iterate: &mut Iterate,
        trial_iterate: &mut Iterate,
        direction: &mut Direction,
        warmstart: &mut WarmstartInformation,
        user_callbacks: &mut dyn UserCallbacks,
    ) -> SolverResult<()>;

    fn name(&self) -> &'static str;
}

/// trial = current + (α_primal, α_dual) · direction, with the multiplier
/// update applied to the multiplier set of the active phase. All evaluation
/// caches of the trial iterate are invalidated.
pub fn assemble_trial_iterate(
    current_iterate: &Iterate,
    trial_iterate: &mut Iterate,
    direction: &Direction,
    primal_step_length: f64,
    dual_step_length: f64,
    solving_feasibility_problem: bool,
) {
    trial_iterate.clone_from(current_iterate);
    for (trial, (current, delta)) in trial_iterate
        .primals
        .iter_mut()
        .zip(current_iterate.primals.iter().zip(direction.primals.iter()))
    {
        *trial = current + primal_step_length * delta;
    }
    let multipliers = if solving_feasibility_problem {
        &mut trial_iterate.feasibility_multipliers
    } else {
        &mut trial_iterate.multipliers
    };
    for (trial, delta) in multipliers
        .constraints
        .iter_mut()
        .zip(direction.multipliers.constraints.iter())
    {
        *trial += primal_step_length * delta;
    }
    for (trial, delta) in multipliers
        .lower_bounds
        .iter_mut()
        .zip(direction.multipliers.lower_bounds.iter())
    {
        *trial += dual_step_length * delta;
    }
    for (trial, delta) in multipliers
        .upper_bounds
        .iter_mut()
        .zip(direction.multipliers.upper_bounds.iter())
    {
        *trial += dual_step_length * delta;
    }
    trial_iterate.invalidate_evaluations();
}

/// Build a globalization mechanism from its option value.
pub fn create(options: &Options) -> SolverResult<Box<dyn GlobalizationMechanism>> {
    match options.get_str("globalization_mechanism")? {
        "LS" => Ok(Box::new(BacktrackingLineSearch::new(options)?)),
        "TR" => Ok(Box::new(TrustRegion::new(options)?)),
        other => Err(crate::error::SolverError::Configuration(format!(
            "unknown globalization_mechanism '{other}'"
        ))),
    }
}
