//! Filter globalization (Fletcher & Leyffer).
//!
//! The filter is a pareto front of (infeasibility, merit) pairs. A trial
//! point must be acceptable to the filter and to the current iterate; when
//! the switching condition promises sufficient objective progress, an Armijo
//! test decides (f-type step), otherwise the step only needs filter
//! acceptability and the current point joins the filter (h-type step).

use tracing::debug;

use crate::error::SolverResult;
use crate::globalization_strategy::{armijo_sufficient_decrease, GlobalizationStrategy};
use crate::iterate::{Iterate, ProgressMeasures};
use crate::options::Options;
use crate::util::INF;

#[derive(Debug, Clone, Copy)]
struct FilterEntry {
    infeasibility: f64,
    merit: f64,
}

/// Pareto set of (infeasibility, merit) pairs with margin constants.
pub struct Filter {
    entries: Vec<FilterEntry>,
    capacity: usize,
    beta: f64,
    gamma: f64,
    upper_bound: f64,
}

impl Filter {
    fn new(capacity: usize, beta: f64, gamma: f64) -> Self {
        Filter {
            entries: Vec::with_capacity(capacity),
            capacity,
            beta,
            gamma,
            upper_bound: INF,
        }
    }

    fn reset(&mut self) {
        self.entries.clear();
    }

    fn set_upper_bound(&mut self, upper_bound: f64) {
        self.upper_bound = upper_bound;
    }

    /// Acceptable when below the infeasibility upper bound and not dominated
    /// by any entry (with the usual margins).
    fn is_acceptable(&self, infeasibility: f64, merit: f64) -> bool {
        if infeasibility >= self.upper_bound {
            return false;
        }
        self.entries.iter().all(|entry| {
            infeasibility <= self.beta * entry.infeasibility
                || merit <= entry.merit - self.gamma * infeasibility
        })
    }

    /// The same dominance test against the current iterate.
    fn is_acceptable_wrt_current_iterate(
        &self,
        current_infeasibility: f64,
        current_merit: f64,
        trial_infeasibility: f64,
        trial_merit: f64,
    ) -> bool {
        trial_infeasibility <= self.beta * current_infeasibility
            || trial_merit <= current_merit - self.gamma * trial_infeasibility
    }

    /// Insert an entry, dropping the entries it dominates.
    fn add(&mut self, infeasibility: f64, merit: f64) {
        self.entries
            .retain(|entry| entry.infeasibility < infeasibility || entry.merit < merit);
        let position = self
            .entries
            .partition_point(|entry| entry.infeasibility < infeasibility);
        self.entries.insert(position, FilterEntry { infeasibility, merit });
        if self.entries.len() > self.capacity {
            // drop the most infeasible entry
            self.entries.pop();
        }
    }

    fn smallest_infeasibility(&self) -> f64 {
        self.entries.first().map_or(INF, |entry| entry.infeasibility)
    }

    fn infeasibility_sufficient_reduction(&self, reference: f64, trial: f64) -> bool {
        trial <= self.beta * reference
    }
}

/// Fletcher filter method.
pub struct FilterMethod {
    filter: Filter,
    delta: f64,
    switching_infeasibility_exponent: f64,
    armijo_decrease_fraction: f64,
    upper_bound_factor: f64,
}

impl FilterMethod {
    pub fn new(options: &Options) -> SolverResult<Self> {
        Ok(FilterMethod {
            filter: Filter::new(
                options.get_usize("filter_capacity")?,
                options.get_f64("filter_beta")?,
                options.get_f64("filter_gamma")?,
            ),
            delta: options.get_f64("filter_delta")?,
            switching_infeasibility_exponent: options.get_f64("filter_switching_infeasibility_exponent")?,
            armijo_decrease_fraction: options.get_f64("armijo_decrease_fraction")?,
            upper_bound_factor: options.get_f64("filter_infeasibility_upper_bound_factor")?,
        })
    }

    /// Unconstrained merit: the objective measure at σ = 1 plus the
    /// auxiliary measure, infeasibility excluded.
    fn unconstrained_merit(progress: &ProgressMeasures) -> f64 {
        progress.objective.value(1.0) + progress.auxiliary
    }

    /// Promising objective progress: the predicted merit reduction dominates
    /// a power of the current infeasibility.
    fn switching_condition(&self, predicted_reduction: f64, current_infeasibility: f64) -> bool {
        predicted_reduction
            >= self.delta * current_infeasibility.powf(self.switching_infeasibility_exponent)
    }

    fn actual_merit_reduction(current_merit: f64, trial_merit: f64) -> f64 {
        // roundoff protection for tiny reductions
        current_merit - trial_merit + 10.0 * f64::EPSILON * current_merit.abs()
    }
}

impl GlobalizationStrategy for FilterMethod {
    fn initialize(&mut self, initial_iterate: &Iterate) {
        self.filter.reset();
        let initial_infeasibility = initial_iterate.progress.infeasibility;
        let upper_bound = self.upper_bound_factor * initial_infeasibility.max(1.0);
        self.filter.set_upper_bound(upper_bound);
    }

    fn reset(&mut self) {
        self.filter.reset();
    }

    fn register_current_progress(&mut self, _current_progress: &ProgressMeasures) {}

    fn notify_switch_to_feasibility(&mut self, current_progress: &ProgressMeasures) {
        // remember the point restoration starts from
        self.filter.add(
            current_progress.infeasibility,
            FilterMethod::unconstrained_merit(current_progress),
        );
    }

    fn notify_switch_to_optimality(&mut self, _current_progress: &ProgressMeasures) {
        self.filter.reset();
    }

    fn is_iterate_acceptable(
        &mut self,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
        predicted_reduction: &ProgressMeasures,
        objective_multiplier: f64,
    ) -> bool {
        let solving_feasibility_problem = objective_multiplier == 0.0;
        if solving_feasibility_problem {
            // restoration: Armijo test on the infeasibility reduction alone
            let accept = armijo_sufficient_decrease(
                self.armijo_decrease_fraction,
                predicted_reduction.infeasibility,
                current_progress.infeasibility - trial_progress.infeasibility,
            );
            debug!(accept, "h-type Armijo test on infeasibility");
            return accept;
        }

        let current_merit = FilterMethod::unconstrained_merit(current_progress);
        let trial_merit = FilterMethod::unconstrained_merit(trial_progress);
        let merit_predicted_reduction = FilterMethod::unconstrained_merit(predicted_reduction);
        debug!(
            current_infeasibility = current_progress.infeasibility,
            current_merit,
            trial_infeasibility = trial_progress.infeasibility,
            trial_merit,
            merit_predicted_reduction,
            "filter acceptance test"
        );

        if !self.filter.is_acceptable(trial_progress.infeasibility, trial_merit) {
            debug!("trial iterate rejected by the filter");
            return false;
        }
        if !self.filter.is_acceptable_wrt_current_iterate(
            current_progress.infeasibility,
            current_merit,
            trial_progress.infeasibility,
            trial_merit,
        ) {
            debug!("trial iterate rejected by the current iterate");
            return false;
        }
        if self.switching_condition(merit_predicted_reduction, current_progress.infeasibility) {
            // f-type step: Armijo test on the unconstrained merit
            let actual_reduction = FilterMethod::actual_merit_reduction(current_merit, trial_merit);
            let accept = armijo_sufficient_decrease(
                self.armijo_decrease_fraction,
                merit_predicted_reduction,
                actual_reduction,
            );
            debug!(accept, actual_reduction, "f-type Armijo test");
            accept
        } else {
            // h-type step: acceptable without sufficient objective progress;
            // the current iterate joins the filter
            self.filter.add(current_progress.infeasibility, current_merit);
            debug!("h-type step accepted, current iterate added to the filter");
            true
        }
    }

    fn is_infeasibility_sufficiently_reduced(
        &self,
        _current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
    ) -> bool {
        self.filter.infeasibility_sufficient_reduction(
            self.filter.smallest_infeasibility(),
            trial_progress.infeasibility,
        )
    }

    fn name(&self) -> &'static str {
        "filter method"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> Filter {
        Filter::new(50, 0.999, 0.001)
    }

    #[test]
    fn test_dominated_points_stay_rejected() {
        let mut filter = filter();
        filter.set_upper_bound(100.0);
        filter.add(1.0, 5.0);
        // dominated in both coordinates
        assert!(!filter.is_acceptable(2.0, 6.0));
        assert!(!filter.is_acceptable(1.0, 5.0));
        // better infeasibility is acceptable
        assert!(filter.is_acceptable(0.5, 6.0));
        // better merit is acceptable
        assert!(filter.is_acceptable(1.0, 4.0));
    }

    #[test]
    fn test_adding_entries_preserves_monotonicity() {
        // adding any entry never makes a jointly-worse point acceptable
        let mut filter = filter();
        filter.set_upper_bound(100.0);
        filter.add(1.0, 5.0);
        filter.add(0.5, 7.0);
        filter.add(2.0, 3.0);
        for &(h, merit) in &[(1.0, 5.0), (0.5, 7.0), (2.0, 3.0)] {
            assert!(!filter.is_acceptable(h * 1.01, merit + 0.01));
        }
    }

    #[test]
    fn test_dominated_entries_are_removed() {
        let mut filter = filter();
        filter.set_upper_bound(100.0);
        filter.add(1.0, 5.0);
        filter.add(2.0, 4.0);
        // dominates both
        filter.add(0.5, 3.0);
        assert_eq!(filter.entries.len(), 1);
        assert_eq!(filter.smallest_infeasibility(), 0.5);
    }

    #[test]
    fn test_upper_bound_rejects_large_infeasibility() {
        let mut filter = filter();
        filter.set_upper_bound(10.0);
        assert!(!filter.is_acceptable(10.0, -100.0));
        assert!(filter.is_acceptable(9.0, -100.0));
    }
}
