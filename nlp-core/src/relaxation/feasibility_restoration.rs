//! Feasibility restoration over two nested problem views.

use tracing::debug;

use crate::direction::{Direction, SubproblemStatus, WarmstartInformation};
use crate::driver::UserCallbacks;
use crate::error::{SolverError, SolverResult};
use crate::globalization_strategy::GlobalizationStrategy;
use crate::hessian::HessianModel;
use crate::inequality_handling::InequalityHandlingMethod;
use crate::iterate::{Iterate, Multipliers, ObjectiveMeasure, ProgressMeasures};
use crate::model::{constraint_violation, Model};
use crate::options::Options;
use crate::reformulation::{
    stationarity_error, L1RelaxedProblem, OptimalityProblem, OptimizationProblem,
};
use crate::regularization::RegularizationStrategy;
use crate::relaxation::IterateStatus;
use crate::util::{norm_1, Norm};

pub struct FeasibilityRestoration<'a> {
    model: &'a dyn Model,
    optimality_problem: OptimalityProblem<'a>,
    feasibility_problem: L1RelaxedProblem<'a>,
    solving_feasibility_problem: bool,
    times_restoration_entered: usize,

    progress_norm: Norm,
    residual_norm: Norm,
    residual_scaling_threshold: f64,
    tight_tolerance: f64,
    loose_tolerance: f64,
    loose_tolerance_consecutive_iteration_threshold: usize,
    loose_tolerance_consecutive_iterations: usize,
    unbounded_objective_threshold: f64,
    /// true when the predicted objective reduction is first-order only
    /// (line-search mechanisms)
    first_order_predicted_reduction: bool,

    // scratch, allocated once
    current_multipliers: Multipliers,
    linearized_constraints: Vec<f64>,
}

impl<'a> FeasibilityRestoration<'a> {
    pub fn new(model: &'a dyn Model, options: &Options) -> SolverResult<Self> {
        let number_variables = model.number_variables();
        let number_constraints = model.number_constraints();
        Ok(FeasibilityRestoration {
            model,
            optimality_problem: OptimalityProblem::new(model),
            feasibility_problem: L1RelaxedProblem::new(
                model,
                0.0,
                options.get_f64("l1_constraint_violation_coefficient")?,
            ),
            solving_feasibility_problem: false,
            times_restoration_entered: 0,
            progress_norm: options.get_norm("progress_norm")?,
            residual_norm: options.get_norm("residual_norm")?,
            residual_scaling_threshold: options.get_f64("residual_scaling_threshold")?,
            tight_tolerance: options.get_f64("tolerance")?,
            loose_tolerance: options.get_f64("loose_tolerance")?,
            loose_tolerance_consecutive_iteration_threshold: options
                .get_usize("loose_tolerance_consecutive_iteration_threshold")?,
            loose_tolerance_consecutive_iterations: 0,
            unbounded_objective_threshold: options.get_f64("unbounded_objective_threshold")?,
            first_order_predicted_reduction: options.get_str("globalization_mechanism")? == "LS",
            current_multipliers: Multipliers::new(number_variables, number_constraints),
            linearized_constraints: vec![0.0; number_constraints],
        })
    }

    pub fn model(&self) -> &dyn Model {
        self.model
    }

    pub fn solving_feasibility_problem(&self) -> bool {
        self.solving_feasibility_problem
    }

    pub fn times_restoration_entered(&self) -> usize {
        self.times_restoration_entered
    }

    /// The largest view the inequality-handling method will see; used for
    /// preallocation.
    pub fn largest_problem(&self) -> &dyn OptimizationProblem {
        &self.feasibility_problem
    }

    pub fn optimality_problem(&self) -> &dyn OptimizationProblem {
        &self.optimality_problem
    }

    fn current_problem(&self) -> &dyn OptimizationProblem {
        if self.solving_feasibility_problem {
            &self.feasibility_problem
        } else {
            &self.optimality_problem
        }
    }

    fn phase_multipliers<'b>(&self, iterate: &'b Iterate) -> &'b Multipliers {
        if self.solving_feasibility_problem {
            &iterate.feasibility_multipliers
        } else {
            &iterate.multipliers
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn solve_subproblem(
        &mut self,
        method: &mut dyn InequalityHandlingMethod,
        hessian_model: &mut dyn HessianModel,
        regularization: &mut dyn RegularizationStrategy,
        current_iterate: &mut Iterate,
        direction: &mut Direction,
        trust_region_radius: f64,
        warmstart: &WarmstartInformation,
    ) -> SolverResult<()> {
        let source = if self.solving_feasibility_problem {
            &current_iterate.feasibility_multipliers
        } else {
            &current_iterate.multipliers
        };
        self.current_multipliers.constraints.clone_from(&source.constraints);
        self.current_multipliers.lower_bounds.clone_from(&source.lower_bounds);
        self.current_multipliers.upper_bounds.clone_from(&source.upper_bounds);
        let problem: &dyn OptimizationProblem = if self.solving_feasibility_problem {
            &self.feasibility_problem
        } else {
            &self.optimality_problem
        };
        method.solve(
            problem,
            current_iterate,
            &self.current_multipliers,
            direction,
            hessian_model,
            regularization,
            trust_region_radius,
            warmstart,
        )
    }

    /// Ask the active view for a search direction; an infeasible optimality
    /// subproblem (or an unstable regularization) triggers the switch to the
    /// feasibility problem.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_feasible_direction(
        &mut self,
        method: &mut dyn InequalityHandlingMethod,
        hessian_model: &mut dyn HessianModel,
        regularization: &mut dyn RegularizationStrategy,
        strategy: &mut dyn GlobalizationStrategy,
        current_iterate: &mut Iterate,
        direction: &mut Direction,
        trust_region_radius: f64,
        warmstart: &mut WarmstartInformation,
    ) -> SolverResult<()> {
        if !self.solving_feasibility_problem {
            let result = self.solve_subproblem(
                method,
                hessian_model,
                regularization,
                current_iterate,
                direction,
                trust_region_radius,
                warmstart,
            );
            let switch = match result {
                Ok(()) => direction.status == SubproblemStatus::Infeasible,
                Err(SolverError::UnstableRegularization { .. }) => true,
                Err(error) => return Err(error),
            };
            if !switch {
                return Ok(());
            }
            debug!("optimality subproblem is infeasible, restoring feasibility");
            self.switch_to_feasibility_problem(method, strategy, current_iterate, warmstart)?;
        }
        self.solve_subproblem(
            method,
            hessian_model,
            regularization,
            current_iterate,
            direction,
            trust_region_radius,
            warmstart,
        )
    }

    /// Enter the feasibility phase: resize the iterate for the elastics, let
    /// the method seed them, notify the strategy and recompute the progress
    /// measures under the feasibility view.
    pub fn switch_to_feasibility_problem(
        &mut self,
        method: &mut dyn InequalityHandlingMethod,
        strategy: &mut dyn GlobalizationStrategy,
        current_iterate: &mut Iterate,
        warmstart: &mut WarmstartInformation,
    ) -> SolverResult<()> {
        if self.solving_feasibility_problem {
            return Err(SolverError::StepLengthTooSmall);
        }
        debug!("switching to the feasibility problem");
        self.solving_feasibility_problem = true;
        self.times_restoration_entered += 1;

        current_iterate.set_number_variables(self.feasibility_problem.number_variables());
        current_iterate.evaluate_constraints(self.model)?;
        method.initialize_feasibility_problem(&self.feasibility_problem, current_iterate);
        method.set_elastic_variable_values(&self.feasibility_problem, current_iterate);
        strategy.notify_switch_to_feasibility(&current_iterate.progress);
        // setting the elastics moved the primals of the relaxed problem
        self.evaluate_progress_measures(method, current_iterate)?;
        strategy.register_current_progress(&current_iterate.progress);
        *warmstart = WarmstartInformation::whole_problem();
        Ok(())
    }

    fn switch_back_to_optimality(
        &mut self,
        method: &mut dyn InequalityHandlingMethod,
        strategy: &mut dyn GlobalizationStrategy,
        trial_iterate: &mut Iterate,
        warmstart: &mut WarmstartInformation,
    ) -> SolverResult<()> {
        debug!("switching back to the optimality problem");
        self.solving_feasibility_problem = false;
        method.exit_feasibility_problem(&self.optimality_problem, trial_iterate)?;
        strategy.notify_switch_to_optimality(&trial_iterate.progress);
        *warmstart = WarmstartInformation::whole_problem();
        Ok(())
    }

    /// Progress measures of an iterate under the active view: model
    /// infeasibility, σ-scaled objective and the method's auxiliary measure.
    pub fn evaluate_progress_measures(
        &mut self,
        method: &dyn InequalityHandlingMethod,
        iterate: &mut Iterate,
    ) -> SolverResult<()> {
        iterate.evaluate_constraints(self.model)?;
        iterate.progress.infeasibility =
            constraint_violation(self.model, &iterate.evaluations.constraints, self.progress_norm);
        iterate.evaluate_objective(self.model)?;
        iterate.progress.objective = ObjectiveMeasure::scaled(iterate.evaluations.objective);
        method.set_auxiliary_measure(self.current_problem(), iterate);
        Ok(())
    }

    /// Predicted reductions of the progress measures along the direction.
    pub fn compute_predicted_reductions(
        &mut self,
        method: &dyn InequalityHandlingMethod,
        current_iterate: &Iterate,
        direction: &Direction,
        step_length: f64,
    ) -> ProgressMeasures {
        // infeasibility: "‖c(x)‖ - ‖c(x) + α ∇c(x)'d‖"
        let current_violation = constraint_violation(
            self.model,
            &current_iterate.evaluations.constraints,
            self.progress_norm,
        );
        for (j, row) in current_iterate.evaluations.constraint_jacobian.iter().enumerate() {
            self.linearized_constraints[j] = current_iterate.evaluations.constraints[j]
                + step_length * row.dot(&direction.primals);
        }
        let linearized_violation =
            constraint_violation(self.model, &self.linearized_constraints, self.progress_norm);
        let predicted_infeasibility_reduction = current_violation - linearized_violation;

        // objective: "α (-σ ∇f(x)'d) - α²/2 d'Hd"
        let directional_derivative = current_iterate.evaluations.objective_gradient.dot(&direction.primals);
        let quadratic_term = if self.first_order_predicted_reduction {
            0.0
        } else {
            method.hessian_quadratic_product(&direction.primals)
        };
        let predicted_objective_reduction = ObjectiveMeasure {
            scaled: step_length * (-directional_derivative),
            constant: -step_length * step_length / 2.0 * quadratic_term,
        };

        ProgressMeasures {
            infeasibility: predicted_infeasibility_reduction,
            objective: predicted_objective_reduction,
            auxiliary: method.compute_predicted_auxiliary_reduction(
                self.current_problem(),
                current_iterate,
                &direction.primals,
                step_length,
            ),
        }
    }

    /// Trial-iterate acceptance. Leaves restoration first when the trial
    /// infeasibility is sufficiently reduced; accepted iterates are reported
    /// to the user callbacks.
    #[allow(clippy::too_many_arguments)]
    pub fn is_iterate_acceptable(
        &mut self,
        method: &mut dyn InequalityHandlingMethod,
        strategy: &mut dyn GlobalizationStrategy,
        current_iterate: &mut Iterate,
        trial_iterate: &mut Iterate,
        direction: &Direction,
        step_length: f64,
        warmstart: &mut WarmstartInformation,
        user_callbacks: &mut dyn UserCallbacks,
    ) -> SolverResult<bool> {
        if self.solving_feasibility_problem {
            // can the trial point be handed back to the optimality phase?
            trial_iterate.evaluate_constraints(self.model)?;
            let trial_infeasibility = constraint_violation(
                self.model,
                &trial_iterate.evaluations.constraints,
                self.progress_norm,
            );
            let mut candidate = trial_iterate.progress;
            candidate.infeasibility = trial_infeasibility;
            if strategy.is_infeasibility_sufficiently_reduced(&current_iterate.progress, &candidate) {
                self.switch_back_to_optimality(method, strategy, trial_iterate, warmstart)?;
            }
        }

        let objective_multiplier = self.current_problem().objective_multiplier();
        trial_iterate.objective_multiplier = objective_multiplier;
        {
            let multipliers = if self.solving_feasibility_problem {
                &mut trial_iterate.feasibility_multipliers
            } else {
                &mut trial_iterate.multipliers
            };
            method.postprocess_iterate(self.current_problem(), &mut trial_iterate.primals, multipliers);
        }

        if method.subproblem_definition_changed() {
            debug!("subproblem definition changed: resetting the globalization strategy");
            strategy.reset();
            self.evaluate_progress_measures(method, current_iterate)?;
            method.clear_subproblem_definition_changed();
        }
        self.evaluate_progress_measures(method, trial_iterate)?;

        let accept = if direction.norm == 0.0 {
            debug!("zero primal step is accepted");
            true
        } else {
            let predicted_reduction =
                self.compute_predicted_reductions(method, current_iterate, direction, step_length);
            strategy.is_iterate_acceptable(
                &current_iterate.progress,
                &trial_iterate.progress,
                &predicted_reduction,
                objective_multiplier,
            )
        };
        if accept {
            let multipliers = self.phase_multipliers(trial_iterate);
            user_callbacks.notify_acceptable_iterate(
                &trial_iterate.primals,
                multipliers,
                objective_multiplier,
            );
        }
        Ok(accept)
    }

    /// Stationarity, primal feasibility and complementarity of both views,
    /// with the standard scalings.
    pub fn compute_primal_dual_residuals(&mut self, iterate: &mut Iterate) -> SolverResult<()> {
        iterate.evaluate_objective_gradient(self.model)?;
        iterate.evaluate_constraints(self.model)?;
        iterate.evaluate_constraint_jacobian(self.model)?;

        let number_variables = self.model.number_variables();

        // stationarity of the optimality view with the standard multipliers
        self.optimality_problem.evaluate_lagrangian_gradient(
            &mut iterate.residuals.lagrangian_gradient,
            &iterate.evaluations,
            &iterate.multipliers,
        );
        iterate.residuals.stationarity = stationarity_error(
            &iterate.residuals.lagrangian_gradient,
            iterate.objective_multiplier,
            self.residual_norm,
            number_variables,
        );
        // stationarity of the feasibility view with the feasibility multipliers
        self.feasibility_problem.evaluate_lagrangian_gradient(
            &mut iterate.feasibility_residuals.lagrangian_gradient,
            &iterate.evaluations,
            &iterate.feasibility_multipliers,
        );
        iterate.feasibility_residuals.stationarity = stationarity_error(
            &iterate.feasibility_residuals.lagrangian_gradient,
            0.0,
            self.residual_norm,
            self.feasibility_problem.number_variables(),
        );

        // constraint violation of the original model
        iterate.primal_feasibility =
            constraint_violation(self.model, &iterate.evaluations.constraints, self.residual_norm);

        // complementarity errors (no shift at termination)
        iterate.residuals.complementarity = self.optimality_problem.complementarity_error(
            &iterate.primals,
            &iterate.evaluations.constraints,
            &iterate.multipliers,
            0.0,
            self.residual_norm,
        );
        iterate.feasibility_residuals.complementarity = self.feasibility_problem.complementarity_error(
            &iterate.primals,
            &iterate.evaluations.constraints,
            &iterate.feasibility_multipliers,
            0.0,
            self.residual_norm,
        );

        // scaling factors
        iterate.residuals.stationarity_scaling = self.stationarity_scaling(&iterate.multipliers);
        iterate.residuals.complementarity_scaling = self.complementarity_scaling(&iterate.multipliers);
        iterate.feasibility_residuals.stationarity_scaling =
            self.stationarity_scaling(&iterate.feasibility_multipliers);
        iterate.feasibility_residuals.complementarity_scaling =
            self.complementarity_scaling(&iterate.feasibility_multipliers);
        Ok(())
    }

    fn stationarity_scaling(&self, multipliers: &Multipliers) -> f64 {
        let number_variables = self.model.number_variables();
        let sets = &self.optimality_problem;
        let total_size = sets.lower_bounded_variables().len()
            + sets.upper_bounded_variables().len()
            + self.model.number_constraints();
        if total_size == 0 {
            return 1.0;
        }
        let scaling_factor = self.residual_scaling_threshold * total_size as f64;
        let multiplier_norm = norm_1(&multipliers.constraints)
            + norm_1(&multipliers.lower_bounds[..number_variables])
            + norm_1(&multipliers.upper_bounds[..number_variables]);
        (multiplier_norm / scaling_factor).max(1.0)
    }

    fn complementarity_scaling(&self, multipliers: &Multipliers) -> f64 {
        let number_variables = self.model.number_variables();
        let sets = &self.optimality_problem;
        let total_size = sets.lower_bounded_variables().len() + sets.upper_bounded_variables().len();
        if total_size == 0 {
            return 1.0;
        }
        let scaling_factor = self.residual_scaling_threshold * total_size as f64;
        let bound_multiplier_norm = norm_1(&multipliers.lower_bounds[..number_variables])
            + norm_1(&multipliers.upper_bounds[..number_variables]);
        (bound_multiplier_norm / scaling_factor).max(1.0)
    }

    /// Termination test with a tight and a loose tolerance; the loose one
    /// must hold for several consecutive iterations to count.
    pub fn check_termination(&mut self, iterate: &mut Iterate) -> SolverResult<IterateStatus> {
        if iterate.is_objective_computed
            && iterate.evaluations.objective < self.unbounded_objective_threshold
        {
            return Ok(IterateStatus::Unbounded);
        }
        self.compute_primal_dual_residuals(iterate)?;

        let status_tight = self.check_first_order_convergence(iterate, self.tight_tolerance);
        if status_tight != IterateStatus::NotOptimal || self.loose_tolerance <= self.tight_tolerance {
            return Ok(status_tight);
        }

        let status_loose = self.check_first_order_convergence(iterate, self.loose_tolerance);
        if status_loose != IterateStatus::NotOptimal {
            self.loose_tolerance_consecutive_iterations += 1;
            if self.loose_tolerance_consecutive_iteration_threshold
                <= self.loose_tolerance_consecutive_iterations
            {
                return Ok(status_loose);
            }
        } else {
            self.loose_tolerance_consecutive_iterations = 0;
        }
        Ok(IterateStatus::NotOptimal)
    }

    fn check_first_order_convergence(&self, iterate: &Iterate, tolerance: f64) -> IterateStatus {
        let stationarity =
            iterate.residuals.stationarity / iterate.residuals.stationarity_scaling <= tolerance;
        let primal_feasibility = iterate.primal_feasibility <= tolerance;
        let complementarity =
            iterate.residuals.complementarity / iterate.residuals.complementarity_scaling <= tolerance;

        let feasibility_stationarity = iterate.feasibility_residuals.stationarity <= tolerance;
        let feasibility_complementarity = iterate.feasibility_residuals.complementarity <= tolerance;
        let no_trivial_duals = iterate
            .feasibility_multipliers
            .not_all_zero(self.model.number_variables(), tolerance);

        debug!(
            stationarity,
            primal_feasibility,
            complementarity,
            feasibility_stationarity,
            feasibility_complementarity,
            no_trivial_duals,
            tolerance,
            "termination criteria"
        );

        if stationarity && primal_feasibility && iterate.objective_multiplier > 0.0 && complementarity {
            IterateStatus::FeasibleKktPoint
        } else if self.model.number_constraints() > 0
            && feasibility_stationarity
            && !primal_feasibility
            && feasibility_complementarity
            && no_trivial_duals
        {
            IterateStatus::InfeasibleStationaryPoint
        } else {
            IterateStatus::NotOptimal
        }
    }

    pub fn tight_tolerance(&self) -> f64 {
        self.tight_tolerance
    }
}
