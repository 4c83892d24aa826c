//! The outer iteration: compute a direction, globalize, accept, check
//! termination, repeat.
//!
//! Local failures (infeasible or unbounded subproblems, rejected steps)
//! never escape an outer iteration; they mutate mechanism or relaxation
//! state and the loop continues. Fatal failures unwind cleanly into a
//! termination status or an error for the caller.

use std::time::Instant;

use tracing::debug;

use crate::direction::{Direction, WarmstartInformation};
use crate::error::{SolverError, SolverResult};
use crate::globalization_mechanism::{self, GlobalizationMechanism};
use crate::globalization_strategy::{self, GlobalizationStrategy};
use crate::hessian;
use crate::inequality_handling::{self, InequalityHandlingMethod};
use crate::iterate::{Iterate, Multipliers};
use crate::model::{count_elastic_variables, validate, EqualityConstrainedModel, Model};
use crate::options::Options;
use crate::regularization::{self, RegularizationStrategy};
use crate::relaxation::{FeasibilityRestoration, IterateStatus};

/// Reason the solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStatus {
    /// First-order KKT point within tolerance.
    FeasibleKktPoint,
    /// Stationary point of the constraint violation, not primal feasible.
    InfeasibleStationaryPoint,
    /// Feasible point where the step collapsed below machine resolution.
    FeasibleSmallStep,
    /// The objective fell below the unboundedness threshold.
    UnboundedProblem,
    IterationLimit,
    TimeLimit,
    /// Repeated numerical failure.
    AlgorithmicError,
}

impl std::fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TerminationStatus::FeasibleKktPoint => "feasible KKT point",
            TerminationStatus::InfeasibleStationaryPoint => "infeasible stationary point",
            TerminationStatus::FeasibleSmallStep => "feasible small step",
            TerminationStatus::UnboundedProblem => "unbounded problem",
            TerminationStatus::IterationLimit => "iteration limit",
            TerminationStatus::TimeLimit => "time limit",
            TerminationStatus::AlgorithmicError => "algorithmic error",
        };
        write!(f, "{name}")
    }
}

/// Synchronous observer of accepted iterates. May not mutate solver state.
pub trait UserCallbacks {
    fn notify_acceptable_iterate(
        &mut self,
        _primals: &[f64],
        _multipliers: &Multipliers,
        _objective_multiplier: f64,
    ) {
    }
}

/// Callbacks that do nothing.
pub struct NoUserCallbacks;

impl UserCallbacks for NoUserCallbacks {}

/// Outcome of a solve.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub status: TerminationStatus,
    /// Primals of the user model (reformulation variables stripped).
    pub primals: Vec<f64>,
    pub constraint_multipliers: Vec<f64>,
    pub lower_bound_multipliers: Vec<f64>,
    pub upper_bound_multipliers: Vec<f64>,
    pub objective: f64,
    pub iterations: usize,
    pub solve_time_ms: u64,
    pub number_subproblems_solved: usize,
    pub number_hessian_evaluations: usize,
    /// Times the solver entered the feasibility-restoration phase.
    pub number_restoration_phases: usize,
    pub stationarity: f64,
    pub primal_feasibility: f64,
    pub complementarity: f64,
}

/// Solve the model with the default (no-op) callbacks.
pub fn solve(model: &dyn Model, options: &Options) -> SolverResult<SolveResult> {
    minimize(model, options, &mut NoUserCallbacks)
}

/// Compose the four ingredients selected by the options and run the outer
/// loop until a termination status is reached.
pub fn minimize(
    user_model: &dyn Model,
    options: &Options,
    user_callbacks: &mut dyn UserCallbacks,
) -> SolverResult<SolveResult> {
    validate(user_model)?;
    check_ingredient_combination(options)?;
    if options.get_str("constraint_relaxation")? != "feasibility_restoration" {
        return Err(SolverError::Configuration(format!(
            "unknown constraint_relaxation '{}'",
            options.get_str("constraint_relaxation")?
        )));
    }

    // the interior-point method works on the equality-constrained
    // reformulation; the QP method takes the model as-is
    let uses_interior_point = options.get_str("inequality_handling_method")? == "primal_dual_IPM";
    let equality_model;
    let model: &dyn Model = if uses_interior_point {
        equality_model = EqualityConstrainedModel::new(user_model);
        &equality_model
    } else {
        user_model
    };

    let max_iterations = options.get_usize("max_iterations")?;
    let time_limit_ms = options.get_usize("time_limit_ms")? as u64;
    let start = Instant::now();

    // build the ingredients
    let mut hessian_model = hessian::create(options.get_str("hessian_model")?)?;
    let mut regularization: Box<dyn RegularizationStrategy> = regularization::create(options)?;
    let mut method: Box<dyn InequalityHandlingMethod> = inequality_handling::create(options)?;
    let mut strategy: Box<dyn GlobalizationStrategy> = globalization_strategy::create(options)?;
    let mut mechanism: Box<dyn GlobalizationMechanism> = globalization_mechanism::create(options)?;
    let mut relaxation = FeasibilityRestoration::new(model, options)?;

    // size every buffer for the largest view the method will ever see
    let max_number_variables = model.number_variables() + count_elastic_variables(model);
    let number_constraints = model.number_constraints();
    method.initialize_memory(
        relaxation.largest_problem(),
        hessian_model.as_ref(),
        regularization.as_mut(),
    )?;

    // the initial iterate
    let mut current_iterate = Iterate::new(model.number_variables(), number_constraints);
    model.initial_primal_point(&mut current_iterate.primals);
    model.initial_dual_point(&mut current_iterate.multipliers.constraints);
    method.generate_initial_iterate(relaxation.optimality_problem(), &mut current_iterate)?;
    current_iterate.set_number_variables(max_number_variables);
    relaxation.evaluate_progress_measures(method.as_ref(), &mut current_iterate)?;
    relaxation.compute_primal_dual_residuals(&mut current_iterate)?;
    strategy.initialize(&current_iterate);

    let mut trial_iterate = current_iterate.clone();
    let mut direction = Direction::new(max_number_variables, number_constraints);
    let mut warmstart = WarmstartInformation::whole_problem();

    debug!(
        method = method.name(),
        strategy = strategy.name(),
        mechanism = mechanism.name(),
        "starting the outer iteration"
    );

    let mut iterations = 0;
    let mut consecutive_unstable_regularizations = 0;
    let mut small_step_accepted = false;
    let status = loop {
        // cooperative budget checks between outer iterations
        match relaxation.check_termination(&mut current_iterate)? {
            IterateStatus::FeasibleKktPoint => break TerminationStatus::FeasibleKktPoint,
            IterateStatus::InfeasibleStationaryPoint => {
                break TerminationStatus::InfeasibleStationaryPoint
            }
            IterateStatus::Unbounded => break TerminationStatus::UnboundedProblem,
            IterateStatus::NotOptimal => {}
        }
        if small_step_accepted && current_iterate.primal_feasibility <= relaxation.tight_tolerance() {
            break TerminationStatus::FeasibleSmallStep;
        }
        if iterations >= max_iterations {
            break TerminationStatus::IterationLimit;
        }
        if time_limit_ms > 0 && start.elapsed().as_millis() as u64 >= time_limit_ms {
            break TerminationStatus::TimeLimit;
        }
        iterations += 1;
        debug!(iteration = iterations, "outer iteration");

        let outcome = mechanism.compute_next_iterate(
            &mut relaxation,
            method.as_mut(),
            hessian_model.as_mut(),
            regularization.as_mut(),
            strategy.as_mut(),
            &mut current_iterate,
            &mut trial_iterate,
            &mut direction,
            &mut warmstart,
            user_callbacks,
        );
        match outcome {
            Ok(()) => {
                consecutive_unstable_regularizations = 0;
                std::mem::swap(&mut current_iterate, &mut trial_iterate);
                warmstart = WarmstartInformation::new_iterate();
                small_step_accepted = method.small_step_detected();
            }
            Err(SolverError::StepLengthTooSmall) => {
                // the step collapsed while restoring feasibility
                break if current_iterate.primal_feasibility <= relaxation.tight_tolerance() {
                    TerminationStatus::FeasibleSmallStep
                } else {
                    TerminationStatus::InfeasibleStationaryPoint
                };
            }
            Err(SolverError::UnstableRegularization { .. }) => {
                consecutive_unstable_regularizations += 1;
                if consecutive_unstable_regularizations >= 2 {
                    break TerminationStatus::AlgorithmicError;
                }
            }
            Err(SolverError::RepeatedSubproblemFailure { .. }) => {
                break TerminationStatus::AlgorithmicError;
            }
            Err(fatal) => return Err(fatal),
        }
    };

    let number_variables = user_model.number_variables();
    Ok(SolveResult {
        status,
        primals: current_iterate.primals[..number_variables].to_vec(),
        constraint_multipliers: current_iterate.multipliers.constraints.clone(),
        lower_bound_multipliers: current_iterate.multipliers.lower_bounds[..number_variables].to_vec(),
        upper_bound_multipliers: current_iterate.multipliers.upper_bounds[..number_variables].to_vec(),
        objective: {
            current_iterate.evaluate_objective(model)?;
            current_iterate.evaluations.objective
        },
        iterations,
        solve_time_ms: start.elapsed().as_millis() as u64,
        number_subproblems_solved: method.number_subproblems_solved(),
        number_hessian_evaluations: hessian_model.evaluation_count(),
        number_restoration_phases: relaxation.times_restoration_entered(),
        stationarity: current_iterate.residuals.stationarity,
        primal_feasibility: current_iterate.primal_feasibility,
        complementarity: current_iterate.residuals.complementarity,
    })
}

/// Reject unsupported ingredient combinations before any work happens.
fn check_ingredient_combination(options: &Options) -> SolverResult<()> {
    let mechanism = options.get_str("globalization_mechanism")?;
    let method = options.get_str("inequality_handling_method")?;
    if mechanism == "TR" && method == "primal_dual_IPM" {
        return Err(SolverError::Configuration(
            "the trust-region interior-point combination is not supported".to_string(),
        ));
    }
    Ok(())
}
