//! Trust-region mechanism.
//!
//! The radius enters the subproblem as bounds on the displacement. On
//! rejection the radius shrinks from the norm of the attempted step; on
//! acceptance with good agreement between predicted and actual merit
//! reduction it grows. The radius is carried across outer iterations.

use tracing::debug;

use crate::direction::{Direction, SubproblemStatus, WarmstartInformation};
use crate::driver::UserCallbacks;
use crate::error::{SolverError, SolverResult};
use crate::globalization_mechanism::{assemble_trial_iterate, GlobalizationMechanism};
use crate::globalization_strategy::GlobalizationStrategy;
use crate::hessian::HessianModel;
use crate::inequality_handling::InequalityHandlingMethod;
use crate::iterate::{Iterate, ProgressMeasures};
use crate::options::Options;
use crate::regularization::RegularizationStrategy;
use crate::relaxation::FeasibilityRestoration;

pub struct TrustRegion {
    radius: f64,
    initial_radius: f64,
    shrink_factor: f64,
    grow_factor: f64,
    min_radius: f64,
    agreement_tolerance: f64,
}

impl TrustRegion {
    pub fn new(options: &Options) -> SolverResult<Self> {
        let initial_radius = options.get_f64("TR_initial_radius")?;
        Ok(TrustRegion {
            radius: initial_radius,
            initial_radius,
            shrink_factor: options.get_f64("TR_shrink_factor")?,
            grow_factor: options.get_f64("TR_grow_factor")?,
            min_radius: options.get_f64("TR_min_radius")?,
            agreement_tolerance: options.get_f64("TR_agreement_tolerance")?,
        })
    }

    fn merit(progress: &ProgressMeasures, objective_multiplier: f64) -> f64 {
        progress.objective.value(objective_multiplier) + progress.auxiliary + progress.infeasibility
    }

    /// Shrink the radius after a failure; escalate to restoration below the
    /// minimum radius.
    fn shrink(
        &mut self,
        from: f64,
        relaxation: &mut FeasibilityRestoration<'_>,
        method: &mut dyn InequalityHandlingMethod,
        strategy: &mut dyn GlobalizationStrategy,
        current_iterate: &mut Iterate,
        warmstart: &mut WarmstartInformation,
    ) -> SolverResult<()> {
        self.radius = self.shrink_factor * from;
        warmstart.variable_bounds_changed = true;
        debug!(radius = self.radius, "trust-region radius decreased");
        if self.radius < self.min_radius {
            if relaxation.solving_feasibility_problem() {
                return Err(SolverError::StepLengthTooSmall);
            }
            debug!("trust-region radius too small, switching to the feasibility problem");
            relaxation.switch_to_feasibility_problem(method, strategy, current_iterate, warmstart)?;
            self.radius = self.initial_radius;
        }
        Ok(())
    }
}

impl GlobalizationMechanism for TrustRegion {
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
        loop {
            relaxation.compute_feasible_direction(
                method,
                hessian_model,
                regularization,
                strategy,
                current_iterate,
                direction,
                self.radius,
                warmstart,
            )?;
            // the solve consumed the pending changes; retries only move the
            // trust-region bounds
            warmstart.clear();
            if direction.status != SubproblemStatus::Optimal {
                // unbounded or failed subproblem: contract and retry
                debug!(status = ?direction.status, "subproblem not solved, contracting the radius");
                self.shrink(self.radius, relaxation, method, strategy, current_iterate, warmstart)?;
                continue;
            }

            assemble_trial_iterate(
                current_iterate,
                trial_iterate,
                direction,
                1.0,
                1.0,
                relaxation.solving_feasibility_problem(),
            );
            debug!(radius = self.radius, step_norm = direction.norm, "trust-region trial iterate");
            let accepted = relaxation.is_iterate_acceptable(
                method,
                strategy,
                current_iterate,
                trial_iterate,
                direction,
                1.0,
                warmstart,
                user_callbacks,
            )?;
            if accepted {
                // enlarge the region when the model agreed with the actual
                // reduction
                let objective_multiplier = trial_iterate.objective_multiplier;
                let predicted =
                    relaxation.compute_predicted_reductions(method, current_iterate, direction, 1.0);
                let predicted_merit = TrustRegion::merit(&predicted, objective_multiplier);
                let actual_merit = TrustRegion::merit(&current_iterate.progress, objective_multiplier)
                    - TrustRegion::merit(&trial_iterate.progress, objective_multiplier);
                if predicted_merit > 0.0
                    && (actual_merit - predicted_merit).abs() <= self.agreement_tolerance * predicted_merit
                {
                    self.radius = self.radius.max(self.grow_factor * direction.norm);
                    debug!(radius = self.radius, "trust-region radius increased");
                }
                return Ok(());
            }
            self.shrink(
                direction.norm.min(self.radius),
                relaxation,
                method,
                strategy,
                current_iterate,
                warmstart,
            )?;
        }
    }

    fn name(&self) -> &'static str {
        "trust region"
    }
}
