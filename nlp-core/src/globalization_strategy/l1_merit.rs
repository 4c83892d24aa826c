//! ℓ1 merit function globalization.
//!
//! The merit φ = σ·f + auxiliary + h is compared at the current and trial
//! points against the full predicted reduction (objective, auxiliary and
//! infeasibility contributions). The actual reduction is protected against
//! roundoff by a small multiple of machine epsilon.

use tracing::{debug, warn};

use crate::error::SolverResult;
use crate::globalization_strategy::{armijo_sufficient_decrease, GlobalizationStrategy};
use crate::iterate::{Iterate, ProgressMeasures};
use crate::options::Options;
use crate::util::INF;

pub struct L1MeritFunction {
    armijo_decrease_fraction: f64,
    smallest_known_infeasibility: f64,
}

impl L1MeritFunction {
    pub fn new(options: &Options) -> SolverResult<Self> {
        Ok(L1MeritFunction {
            armijo_decrease_fraction: options.get_f64("armijo_decrease_fraction")?,
            smallest_known_infeasibility: INF,
        })
    }

    fn merit(progress: &ProgressMeasures, objective_multiplier: f64) -> f64 {
        progress.objective.value(objective_multiplier) + progress.auxiliary + progress.infeasibility
    }

    fn actual_merit_reduction(current_merit: f64, trial_merit: f64) -> f64 {
        current_merit - trial_merit + 10.0 * f64::EPSILON * current_merit.abs()
    }
}

impl GlobalizationStrategy for L1MeritFunction {
    fn initialize(&mut self, initial_iterate: &Iterate) {
        self.smallest_known_infeasibility = initial_iterate.progress.infeasibility;
    }

    fn reset(&mut self) {}

    fn register_current_progress(&mut self, _current_progress: &ProgressMeasures) {}

    fn notify_switch_to_feasibility(&mut self, _current_progress: &ProgressMeasures) {}

    fn notify_switch_to_optimality(&mut self, _current_progress: &ProgressMeasures) {}

    fn is_iterate_acceptable(
        &mut self,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
        predicted_reduction: &ProgressMeasures,
        objective_multiplier: f64,
    ) -> bool {
        // predicted reduction with all contributions; positive for a descent
        // direction of the merit function
        let constrained_predicted_reduction = predicted_reduction.objective.value(objective_multiplier)
            + predicted_reduction.auxiliary
            + predicted_reduction.infeasibility;
        debug!(constrained_predicted_reduction, "l1 merit predicted reduction");
        if constrained_predicted_reduction <= 0.0 {
            warn!("the direction is not a descent direction for the merit function");
        }

        let current_merit = L1MeritFunction::merit(current_progress, objective_multiplier);
        let trial_merit = L1MeritFunction::merit(trial_progress, objective_multiplier);
        let actual_reduction = L1MeritFunction::actual_merit_reduction(current_merit, trial_merit);
        debug!(current_merit, trial_merit, actual_reduction, "l1 merit values");

        let accept = armijo_sufficient_decrease(
            self.armijo_decrease_fraction,
            constrained_predicted_reduction,
            actual_reduction,
        );
        if accept {
            debug!("trial iterate accepted by the Armijo condition");
            self.smallest_known_infeasibility =
                self.smallest_known_infeasibility.min(trial_progress.infeasibility);
        }
        accept
    }

    fn is_infeasibility_sufficiently_reduced(
        &self,
        _current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
    ) -> bool {
        // the trial infeasibility improves on the best known infeasibility
        trial_progress.infeasibility < self.smallest_known_infeasibility
    }

    fn name(&self) -> &'static str {
        "l1 merit function"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterate::ObjectiveMeasure;

    fn progress(infeasibility: f64, objective: f64, auxiliary: f64) -> ProgressMeasures {
        ProgressMeasures {
            infeasibility,
            objective: ObjectiveMeasure::scaled(objective),
            auxiliary,
        }
    }

    #[test]
    fn test_sufficient_decrease_is_accepted() {
        let options = Options::default();
        let mut strategy = L1MeritFunction::new(&options).unwrap();
        let current = progress(0.0, 9.0, 0.0);
        let trial = progress(0.0, 0.0, 0.0);
        let predicted = progress(0.0, 18.0, 0.0);
        assert!(strategy.is_iterate_acceptable(&current, &trial, &predicted, 1.0));
    }

    #[test]
    fn test_insufficient_decrease_is_rejected() {
        let options = Options::default();
        let mut strategy = L1MeritFunction::new(&options).unwrap();
        let current = progress(0.0, 9.0, 0.0);
        let trial = progress(0.0, 9.0 - 1e-10, 0.0);
        let predicted = progress(0.0, 18.0, 0.0);
        assert!(!strategy.is_iterate_acceptable(&current, &trial, &predicted, 1.0));
    }

    #[test]
    fn test_rejection_keeps_state_unchanged() {
        let options = Options::default();
        let mut strategy = L1MeritFunction::new(&options).unwrap();
        strategy.smallest_known_infeasibility = 0.5;
        let current = progress(0.5, 1.0, 0.0);
        let trial = progress(0.1, 2.0, 0.0);
        let predicted = progress(0.0, 5.0, 0.0);
        assert!(!strategy.is_iterate_acceptable(&current, &trial, &predicted, 1.0));
        // the rejected trial's better infeasibility was not recorded
        assert_eq!(strategy.smallest_known_infeasibility, 0.5);
    }
}
