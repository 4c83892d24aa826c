//! Backtracking line search.
//!
//! The primal step length starts at the direction's fraction-to-boundary
//! length and is multiplied by the backtracking ratio on every rejection.
//! The bound-dual step length is not backtracked.

use tracing::debug;

use crate::direction::{Direction, SubproblemStatus, WarmstartInformation};
use crate::driver::UserCallbacks;
use crate::error::{SolverError, SolverResult};
use crate::globalization_mechanism::{assemble_trial_iterate, GlobalizationMechanism};
use crate::globalization_strategy::GlobalizationStrategy;
use crate::hessian::HessianModel;
use crate::inequality_handling::InequalityHandlingMethod;
use crate::iterate::Iterate;
use crate::options::Options;
use crate::regularization::RegularizationStrategy;
use crate::relaxation::FeasibilityRestoration;
use crate::util::INF;

pub struct BacktrackingLineSearch {
    /// ratio of step length update, in (0, 1)
    backtracking_ratio: f64,
    min_step_length: f64,
}

impl BacktrackingLineSearch {
    pub fn new(options: &Options) -> SolverResult<Self> {
        let backtracking_ratio = options.get_f64("LS_backtracking_ratio")?;
        if !(0.0 < backtracking_ratio && backtracking_ratio < 1.0) {
            return Err(SolverError::Configuration(
                "LS_backtracking_ratio must lie strictly between 0 and 1".to_string(),
            ));
        }
        Ok(BacktrackingLineSearch {
            backtracking_ratio,
            min_step_length: options.get_f64("LS_min_step_length")?,
        })
    }
}

impl GlobalizationMechanism for BacktrackingLineSearch {
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
    ) -> SolverResult<()> {
        relaxation.compute_feasible_direction(
            method,
            hessian_model,
            regularization,
            strategy,
            current_iterate,
            direction,
            INF,
            warmstart,
        )?;
        // an unbounded or failed subproblem: escalate to restoration once
        if matches!(direction.status, SubproblemStatus::Unbounded | SubproblemStatus::Error) {
            debug!(status = ?direction.status, "subproblem failed, escalating to restoration");
            if relaxation.solving_feasibility_problem() {
                return Err(SolverError::RepeatedSubproblemFailure { count: 1 });
            }
            relaxation.switch_to_feasibility_problem(method, strategy, current_iterate, warmstart)?;
            relaxation.compute_feasible_direction(
                method,
                hessian_model,
                regularization,
                strategy,
                current_iterate,
                direction,
                INF,
                warmstart,
            )?;
            if direction.status != SubproblemStatus::Optimal {
                return Err(SolverError::RepeatedSubproblemFailure { count: 2 });
            }
        }

        let mut direction_in_feasibility = relaxation.solving_feasibility_problem();
        let mut step_length: f64 = 1.0;
        loop {
            let primal_step_length = step_length * direction.primal_dual_step_length;
            assemble_trial_iterate(
                current_iterate,
                trial_iterate,
                direction,
                primal_step_length,
                direction.bound_dual_step_length,
                direction_in_feasibility,
            );
            debug!(step_length, primal_step_length, "line-search trial iterate");
            let accepted = relaxation.is_iterate_acceptable(
                method,
                strategy,
                current_iterate,
                trial_iterate,
                direction,
                primal_step_length,
                warmstart,
                user_callbacks,
            )?;
            if accepted {
                return Ok(());
            }

            // the acceptance test may have left restoration; the direction is
            // then stale and must be recomputed for the optimality problem
            if relaxation.solving_feasibility_problem() != direction_in_feasibility {
                relaxation.compute_feasible_direction(
                    method,
                    hessian_model,
                    regularization,
                    strategy,
                    current_iterate,
                    direction,
                    INF,
                    warmstart,
                )?;
                direction_in_feasibility = relaxation.solving_feasibility_problem();
                step_length = 1.0;
                continue;
            }

            step_length *= self.backtracking_ratio;
            if step_length < self.min_step_length {
                if relaxation.solving_feasibility_problem() {
                    return Err(SolverError::StepLengthTooSmall);
                }
                debug!("step length too small, switching to the feasibility problem");
                relaxation.switch_to_feasibility_problem(method, strategy, current_iterate, warmstart)?;
                relaxation.compute_feasible_direction(
                    method,
                    hessian_model,
                    regularization,
                    strategy,
                    current_iterate,
                    direction,
                    INF,
                    warmstart,
                )?;
                if direction.status != SubproblemStatus::Optimal {
                    return Err(SolverError::RepeatedSubproblemFailure { count: 1 });
                }
                direction_in_feasibility = true;
                step_length = 1.0;
            }
        }
    }

    fn name(&self) -> &'static str {
        "backtracking line search"
    }
}
