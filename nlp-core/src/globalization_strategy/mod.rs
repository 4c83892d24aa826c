//! Globalization strategies: accept or reject a trial iterate.
//!
//! A strategy compares the progress measures of the current and trial
//! iterates against the predicted reduction of the subproblem model. On a
//! rejected step, neither the current iterate nor any strategy state may
//! change; only an accepted h-type step extends the filter.

pub mod filter;
pub mod l1_merit;

pub use filter::FilterMethod;
pub use l1_merit::L1MeritFunction;

use crate::error::SolverResult;
use crate::iterate::{Iterate, ProgressMeasures};
use crate::options::Options;

pub trait GlobalizationStrategy {
    /// Size internal state from the initial iterate (filter upper bound).
    fn initialize(&mut self, initial_iterate: &Iterate);

    /// Clear accumulated state after a subproblem redefinition.
    fn reset(&mut self);

    /// Record the progress of the iterate the next trial will be compared
    /// against.
    fn register_current_progress(&mut self, current_progress: &ProgressMeasures);

    fn notify_switch_to_feasibility(&mut self, current_progress: &ProgressMeasures);
    fn notify_switch_to_optimality(&mut self, current_progress: &ProgressMeasures);

    /// Acceptance test. `objective_multiplier` is 0 when the relaxation layer
    /// is solving the feasibility problem.
    fn is_iterate_acceptable(
        &mut self,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
        predicted_reduction: &ProgressMeasures,
        objective_multiplier: f64,
    ) -> bool;

    /// Whether the trial infeasibility is low enough to leave restoration.
    fn is_infeasibility_sufficiently_reduced(
        &self,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
    ) -> bool;

    fn name(&self) -> &'static str;
}

/// Armijo sufficient decrease: the actual reduction must recover a fraction
/// of the (nonnegative part of the) predicted reduction.
pub fn armijo_sufficient_decrease(
    armijo_decrease_fraction: f64,
    predicted_reduction: f64,
    actual_reduction: f64,
) -> bool {
    actual_reduction >= armijo_decrease_fraction * predicted_reduction.max(0.0)
}

/// Build a globalization strategy from its option value.
pub fn create(options: &Options) -> SolverResult<Box<dyn GlobalizationStrategy>> {
    match options.get_str("globalization_strategy")? {
        "filter_method" => Ok(Box::new(FilterMethod::new(options)?)),
        "l1_merit_function" => Ok(Box::new(L1MeritFunction::new(options)?)),
        other => Err(crate::error::SolverError::Configuration(format!(
            "unknown globalization_strategy '{other}'"
        ))),
    }
}
