//! Primal-dual interior-point method.
//!
//! The problem view handed to this method must be equality-constrained (the
//! driver wraps the model in the slack reformulation): inequalities live in
//! the variable bounds, handled by a logarithmic barrier with parameter μ. A
//! solve assembles the augmented system
//!
//! ```text
//! [ H + Σ   J' ]
//! [ J      -δd ]
//! ```
//!
//! regularized to inertia (n, m, 0), solves for (Δx, −Δλ), recovers the bound
//! multiplier steps analytically and applies the fraction-to-boundary rule to
//! both step lengths.

use tracing::{debug, warn};

use crate::direction::{Direction, SubproblemStatus, WarmstartInformation};
use crate::error::{SolverError, SolverResult};
use crate::hessian::HessianModel;
use crate::inequality_handling::barrier_update::BarrierParameterUpdateStrategy;
use crate::inequality_handling::InequalityHandlingMethod;
use crate::iterate::{Iterate, Multipliers};
use crate::linalg::ldl::{LdlSolver, SymmetricIndefiniteSolver};
use crate::linalg::sparse_vector::SparseVector;
use crate::linalg::symmetric::{Inertia, SymmetricMatrix};
use crate::options::Options;
use crate::reformulation::{L1RelaxedProblem, OptimizationProblem};
use crate::regularization::RegularizationStrategy;
use crate::util::{is_finite, norm_inf};

/// Fixed barrier constants read from the options map.
#[derive(Debug, Clone, Copy)]
struct BarrierParameters {
    tau_min: f64,
    k_sigma: f64,
    regularization_exponent: f64,
    small_direction_factor: f64,
    push_variable_to_interior_k1: f64,
    push_variable_to_interior_k2: f64,
    damping_factor: f64,
}

pub struct PrimalDualInteriorPointMethod {
    linear_solver: LdlSolver,
    least_squares_solver: LdlSolver,
    barrier_parameter_update_strategy: BarrierParameterUpdateStrategy,
    previous_barrier_parameter: f64,
    default_multiplier: f64,
    parameters: BarrierParameters,
    least_square_multiplier_max_norm: f64,
    l1_constraint_violation_coefficient: f64,

    // workspace, allocated in initialize_memory
    hessian: SymmetricMatrix,
    augmented_matrix: SymmetricMatrix,
    rhs: Vec<f64>,
    solution: Vec<f64>,
    objective_gradient: SparseVector,
    constraints: Vec<f64>,
    constraint_jacobian: Vec<SparseVector>,
    lower_delta_z: Vec<f64>,
    upper_delta_z: Vec<f64>,
    primal_indices: Vec<usize>,
    dual_indices: Vec<usize>,

    solving_feasibility_problem: bool,
    first_feasibility_iteration: bool,
    subproblem_definition_changed: bool,
    is_small_step: bool,
    number_subproblems_solved: usize,
}

impl PrimalDualInteriorPointMethod {
    pub fn new(options: &Options) -> SolverResult<Self> {
        let linear_solver_name = options.get_str("linear_solver")?;
        if linear_solver_name != "LDL" {
            return Err(SolverError::Configuration(format!(
                "unknown linear_solver '{linear_solver_name}'"
            )));
        }
        Ok(PrimalDualInteriorPointMethod {
            linear_solver: LdlSolver::new(),
            least_squares_solver: LdlSolver::new(),
            barrier_parameter_update_strategy: BarrierParameterUpdateStrategy::new(options)?,
            previous_barrier_parameter: options.get_f64("barrier_initial_parameter")?,
            default_multiplier: options.get_f64("barrier_default_multiplier")?,
            parameters: BarrierParameters {
                tau_min: options.get_f64("barrier_tau_min")?,
                k_sigma: options.get_f64("barrier_k_sigma")?,
                regularization_exponent: options.get_f64("barrier_regularization_exponent")?,
                small_direction_factor: options.get_f64("barrier_small_direction_factor")?,
                push_variable_to_interior_k1: options.get_f64("barrier_push_variable_to_interior_k1")?,
                push_variable_to_interior_k2: options.get_f64("barrier_push_variable_to_interior_k2")?,
                damping_factor: options.get_f64("barrier_damping_factor")?,
            },
            least_square_multiplier_max_norm: options.get_f64("least_square_multiplier_max_norm")?,
            l1_constraint_violation_coefficient: options.get_f64("l1_constraint_violation_coefficient")?,
            hessian: SymmetricMatrix::new(0, 0, false),
            augmented_matrix: SymmetricMatrix::new(0, 0, true),
            rhs: Vec::new(),
            solution: Vec::new(),
            objective_gradient: SparseVector::new(),
            constraints: Vec::new(),
            constraint_jacobian: Vec::new(),
            lower_delta_z: Vec::new(),
            upper_delta_z: Vec::new(),
            primal_indices: Vec::new(),
            dual_indices: Vec::new(),
            solving_feasibility_problem: false,
            first_feasibility_iteration: false,
            subproblem_definition_changed: false,
            is_small_step: false,
            number_subproblems_solved: 0,
        })
    }

    fn barrier_parameter(&self) -> f64 {
        self.barrier_parameter_update_strategy.barrier_parameter()
    }

    /// Project a value into the strict interior of its bounds.
    fn push_variable_to_interior(&self, value: f64, lower_bound: f64, upper_bound: f64) -> f64 {
        let range = upper_bound - lower_bound;
        let mut value = value;
        if is_finite(lower_bound) {
            let perturbation = (self.parameters.push_variable_to_interior_k1 * lower_bound.abs().max(1.0))
                .min(self.parameters.push_variable_to_interior_k2 * range);
            value = value.max(lower_bound + perturbation);
        }
        if is_finite(upper_bound) {
            let perturbation = (self.parameters.push_variable_to_interior_k1 * upper_bound.abs().max(1.0))
                .min(self.parameters.push_variable_to_interior_k2 * range);
            value = value.min(upper_bound - perturbation);
        }
        value
    }

    /// Evaluate the barrier Lagrangian Hessian (with the primal-dual Σ
    /// diagonal), the barrier objective gradient and the constraint data,
    /// honoring the warmstart bits.
    fn evaluate_functions(
        &mut self,
        problem: &dyn OptimizationProblem,
        current_iterate: &mut Iterate,
        current_multipliers: &Multipliers,
        hessian_model: &mut dyn HessianModel,
        objective_changed: bool,
        constraints_changed: bool,
    ) -> SolverResult<()> {
        let mu = self.barrier_parameter();

        if objective_changed || constraints_changed {
            hessian_model.evaluate(
                problem,
                &current_iterate.primals,
                &current_multipliers.constraints,
                &mut self.hessian,
            );
            // diagonal primal-dual barrier terms, grouped by variable
            for variable_index in 0..problem.number_variables() {
                let mut diagonal_barrier_term = 0.0;
                let lower_bound = problem.variable_lower_bound(variable_index);
                let upper_bound = problem.variable_upper_bound(variable_index);
                if is_finite(lower_bound) {
                    diagonal_barrier_term += current_multipliers.lower_bounds[variable_index]
                        / (current_iterate.primals[variable_index] - lower_bound);
                }
                if is_finite(upper_bound) {
                    diagonal_barrier_term += current_multipliers.upper_bounds[variable_index]
                        / (current_iterate.primals[variable_index] - upper_bound);
                }
                // insert for every bounded variable, value or not: the
                // augmented sparsity pattern must stay constant
                if is_finite(lower_bound) || is_finite(upper_bound) {
                    self.hessian.insert(diagonal_barrier_term, variable_index, variable_index);
                }
            }
            self.hessian.check_capacity()?;
        }

        if objective_changed {
            problem.evaluate_objective_gradient(current_iterate, &mut self.objective_gradient)?;
            // barrier terms, with linear damping on singly-bounded variables
            for variable_index in 0..problem.number_variables() {
                let mut barrier_term = 0.0;
                let lower_bound = problem.variable_lower_bound(variable_index);
                let upper_bound = problem.variable_upper_bound(variable_index);
                if is_finite(lower_bound) {
                    barrier_term += -mu / (current_iterate.primals[variable_index] - lower_bound);
                    if !is_finite(upper_bound) {
                        barrier_term += self.parameters.damping_factor * mu;
                    }
                }
                if is_finite(upper_bound) {
                    barrier_term += -mu / (current_iterate.primals[variable_index] - upper_bound);
                    if !is_finite(lower_bound) {
                        barrier_term -= self.parameters.damping_factor * mu;
                    }
                }
                if barrier_term != 0.0 {
                    self.objective_gradient.insert(variable_index, barrier_term);
                }
            }
        }

        if constraints_changed {
            problem.evaluate_constraints(current_iterate, &mut self.constraints)?;
            problem.evaluate_constraint_jacobian(current_iterate, &mut self.constraint_jacobian)?;
        }
        Ok(())
    }

    fn assemble_augmented_matrix(&mut self, problem: &dyn OptimizationProblem) {
        let n = problem.number_variables();
        let m = problem.number_constraints();
        self.augmented_matrix.reset();
        self.augmented_matrix.set_dimension(n + m);
        // Hessian block
        for (row, col, value) in self.hessian.iter() {
            self.augmented_matrix.insert(value, row, col);
        }
        // Jacobian block: row j of J lands in column n + j
        for (j, row) in self.constraint_jacobian.iter().enumerate().take(m) {
            for (variable_index, value) in row.iter() {
                self.augmented_matrix.insert(value, variable_index, n + j);
            }
        }
        self.primal_indices.clear();
        self.primal_indices.extend(0..n);
        self.dual_indices.clear();
        self.dual_indices.extend(n..n + m);
    }

    fn generate_augmented_rhs(&mut self, problem: &dyn OptimizationProblem, current_multipliers: &Multipliers) {
        let n = problem.number_variables();
        let m = problem.number_constraints();
        self.rhs[..n + m].fill(0.0);
        // objective gradient of the barrier problem
        for (variable_index, derivative) in self.objective_gradient.iter() {
            self.rhs[variable_index] -= derivative;
        }
        // constraints: Lagrangian term and right-hand side
        for j in 0..m {
            let multiplier = current_multipliers.constraints[j];
            if multiplier != 0.0 {
                for (variable_index, derivative) in self.constraint_jacobian[j].iter() {
                    self.rhs[variable_index] += multiplier * derivative;
                }
            }
            self.rhs[n + j] = -self.constraints[j];
        }
    }

    fn compute_bound_dual_direction(
        &mut self,
        problem: &dyn OptimizationProblem,
        current_iterate: &Iterate,
        current_multipliers: &Multipliers,
    ) {
        let mu = self.barrier_parameter();
        self.lower_delta_z[..problem.number_variables()].fill(0.0);
        self.upper_delta_z[..problem.number_variables()].fill(0.0);
        for &variable_index in problem.lower_bounded_variables() {
            let distance_to_bound =
                current_iterate.primals[variable_index] - problem.variable_lower_bound(variable_index);
            let multiplier = current_multipliers.lower_bounds[variable_index];
            self.lower_delta_z[variable_index] =
                (mu - self.solution[variable_index] * multiplier) / distance_to_bound - multiplier;
            debug_assert!(is_finite(self.lower_delta_z[variable_index]));
        }
        for &variable_index in problem.upper_bounded_variables() {
            let distance_to_bound =
                current_iterate.primals[variable_index] - problem.variable_upper_bound(variable_index);
            let multiplier = current_multipliers.upper_bounds[variable_index];
            self.upper_delta_z[variable_index] =
                (mu - self.solution[variable_index] * multiplier) / distance_to_bound - multiplier;
            debug_assert!(is_finite(self.upper_delta_z[variable_index]));
        }
    }

    fn primal_fraction_to_boundary(
        &self,
        problem: &dyn OptimizationProblem,
        current_iterate: &Iterate,
        tau: f64,
    ) -> f64 {
        let mut primal_length = 1.0f64;
        for &variable_index in problem.lower_bounded_variables() {
            if self.solution[variable_index] < 0.0 {
                let distance =
                    current_iterate.primals[variable_index] - problem.variable_lower_bound(variable_index);
                let trial_alpha = -tau * distance / self.solution[variable_index];
                if trial_alpha > 0.0 {
                    primal_length = primal_length.min(trial_alpha);
                }
            }
        }
        for &variable_index in problem.upper_bounded_variables() {
            if self.solution[variable_index] > 0.0 {
                let distance =
                    current_iterate.primals[variable_index] - problem.variable_upper_bound(variable_index);
                let trial_alpha = -tau * distance / self.solution[variable_index];
                if trial_alpha > 0.0 {
                    primal_length = primal_length.min(trial_alpha);
                }
            }
        }
        debug_assert!(0.0 < primal_length && primal_length <= 1.0);
        primal_length
    }

    fn dual_fraction_to_boundary(
        &self,
        problem: &dyn OptimizationProblem,
        current_multipliers: &Multipliers,
        tau: f64,
    ) -> f64 {
        let mut dual_length = 1.0f64;
        for &variable_index in problem.lower_bounded_variables() {
            if self.lower_delta_z[variable_index] < 0.0 {
                let trial_alpha =
                    -tau * current_multipliers.lower_bounds[variable_index] / self.lower_delta_z[variable_index];
                if trial_alpha > 0.0 {
                    dual_length = dual_length.min(trial_alpha);
                }
            }
        }
        for &variable_index in problem.upper_bounded_variables() {
            if self.upper_delta_z[variable_index] > 0.0 {
                let trial_alpha =
                    -tau * current_multipliers.upper_bounds[variable_index] / self.upper_delta_z[variable_index];
                if trial_alpha > 0.0 {
                    dual_length = dual_length.min(trial_alpha);
                }
            }
        }
        debug_assert!(0.0 < dual_length && dual_length <= 1.0);
        dual_length
    }

    fn assemble_primal_dual_direction(
        &mut self,
        problem: &dyn OptimizationProblem,
        current_iterate: &Iterate,
        current_multipliers: &Multipliers,
        direction: &mut Direction,
    ) {
        let n = problem.number_variables();
        let m = problem.number_constraints();

        direction.primals.fill(0.0);
        direction.primals[..n].copy_from_slice(&self.solution[..n]);
        // retrieve the constraint duals with the correct sign (Nocedal p. 590)
        direction.multipliers.reset();
        for j in 0..m {
            direction.multipliers.constraints[j] = -self.solution[n + j];
        }

        let tau = self.parameters.tau_min.max(1.0 - self.barrier_parameter());
        let primal_dual_step_length = self.primal_fraction_to_boundary(problem, current_iterate, tau);
        self.compute_bound_dual_direction(problem, current_iterate, current_multipliers);
        let bound_dual_step_length = self.dual_fraction_to_boundary(problem, current_multipliers, tau);
        direction.multipliers.lower_bounds[..n].copy_from_slice(&self.lower_delta_z[..n]);
        direction.multipliers.upper_bounds[..n].copy_from_slice(&self.upper_delta_z[..n]);
        debug!(primal_dual_step_length, bound_dual_step_length, "fraction to boundary");

        direction.primal_dual_step_length = primal_dual_step_length;
        direction.bound_dual_step_length = bound_dual_step_length;
        direction.norm = norm_inf(&direction.primals[..n]);
        let linear_term = self.objective_gradient.dot(&direction.primals);
        let quadratic_term =
            self.hessian.quadratic_product(&direction.primals, &direction.primals) / 2.0;
        direction.subproblem_objective = linear_term + quadratic_term;
        direction.status = SubproblemStatus::Optimal;
    }

    /// Section 3.9 of the Ipopt paper: a relative step size at machine
    /// precision signals that no further progress is possible.
    fn detect_small_step(&mut self, problem: &dyn OptimizationProblem, current_iterate: &Iterate, direction: &Direction) {
        let relative_size = (0..problem.number_variables())
            .map(|i| direction.primals[i].abs() / (1.0 + current_iterate.primals[i].abs()))
            .fold(0.0, f64::max);
        self.is_small_step =
            relative_size <= self.parameters.small_direction_factor * f64::EPSILON;
        if self.is_small_step {
            debug!("the direction is a small step");
        }
    }

    fn compute_least_square_multipliers(
        &mut self,
        problem: &dyn OptimizationProblem,
        iterate: &mut Iterate,
    ) -> SolverResult<()> {
        let n = problem.number_variables();
        let m = problem.number_constraints();
        iterate.evaluate_objective_gradient(problem.model())?;
        iterate.evaluate_constraint_jacobian(problem.model())?;

        // [ I  J' ; J  0 ] with the Jacobian evaluated at the initial point
        self.augmented_matrix.reset();
        self.augmented_matrix.set_dimension(n + m);
        for variable_index in 0..n {
            self.augmented_matrix.insert(1.0, variable_index, variable_index);
        }
        for (j, row) in iterate.evaluations.constraint_jacobian.iter().enumerate().take(m) {
            for (variable_index, value) in row.iter() {
                self.augmented_matrix.insert(value, variable_index, n + j);
            }
        }

        self.rhs[..n + m].fill(0.0);
        for (variable_index, derivative) in iterate.evaluations.objective_gradient.iter() {
            self.rhs[variable_index] += derivative;
        }
        for variable_index in 0..n {
            self.rhs[variable_index] -= iterate.multipliers.lower_bounds[variable_index]
                + iterate.multipliers.upper_bounds[variable_index];
        }

        self.least_squares_solver.reset();
        self.least_squares_solver.do_symbolic_analysis(&self.augmented_matrix)?;
        self.least_squares_solver.do_numerical_factorization(&self.augmented_matrix)?;
        if self.least_squares_solver.matrix_is_singular() {
            debug!("least-squares multiplier system is singular, keeping zero multipliers");
            return Ok(());
        }
        self.least_squares_solver.solve_indefinite_system(
            &self.augmented_matrix,
            &self.rhs[..n + m],
            &mut self.solution[..n + m],
        );
        // if the least-square multipliers are too large, discard them
        if norm_inf(&self.solution[n..n + m]) <= self.least_square_multiplier_max_norm {
            iterate.multipliers.constraints[..m].copy_from_slice(&self.solution[n..n + m]);
        } else {
            debug!("ignoring the least-square multipliers");
        }
        Ok(())
    }
}

impl InequalityHandlingMethod for PrimalDualInteriorPointMethod {
    fn initialize_memory(
        &mut self,
        problem: &dyn OptimizationProblem,
        hessian_model: &dyn HessianModel,
        regularization: &mut dyn RegularizationStrategy,
    ) -> SolverResult<()> {
        if !problem.inequality_constraints().is_empty() {
            return Err(SolverError::Configuration(
                "the interior-point method requires an equality-constrained reformulation".to_string(),
            ));
        }
        let n = problem.number_variables();
        let m = problem.number_constraints();
        let hessian_nonzeros = hessian_model.number_nonzeros(problem);
        // the Hessian additionally holds the diagonal barrier terms
        self.hessian = SymmetricMatrix::new(n, hessian_nonzeros + n, false);
        let augmented_nonzeros = hessian_nonzeros + n + problem.number_jacobian_nonzeros();
        self.augmented_matrix = SymmetricMatrix::new(n + m, augmented_nonzeros.max(n + m), true);
        self.rhs = vec![0.0; n + m];
        self.solution = vec![0.0; n + m];
        self.objective_gradient = SparseVector::with_capacity(problem.number_objective_gradient_nonzeros() + n);
        self.constraints = vec![0.0; m];
        self.constraint_jacobian = (0..m).map(|_| SparseVector::new()).collect();
        self.lower_delta_z = vec![0.0; n];
        self.upper_delta_z = vec![0.0; n];
        self.primal_indices = Vec::with_capacity(n);
        self.dual_indices = Vec::with_capacity(m);
        self.linear_solver.initialize_memory(n + m, augmented_nonzeros + n + m);
        self.least_squares_solver.initialize_memory(n + m, augmented_nonzeros + n + m);
        regularization.initialize_memory(n, hessian_nonzeros);
        Ok(())
    }

    fn generate_initial_iterate(
        &mut self,
        problem: &dyn OptimizationProblem,
        initial_iterate: &mut Iterate,
    ) -> SolverResult<()> {
        let model = problem.model();
        initial_iterate.set_number_variables(problem.number_variables());
        // make the initial point strictly feasible with respect to the bounds
        for variable_index in 0..problem.number_variables() {
            initial_iterate.primals[variable_index] = self.push_variable_to_interior(
                initial_iterate.primals[variable_index],
                problem.variable_lower_bound(variable_index),
                problem.variable_upper_bound(variable_index),
            );
        }

        // set the slack variables from the constraint values
        if !model.slacks().is_empty() {
            initial_iterate.evaluate_constraints(model)?;
            for &(constraint_index, slack_index) in model.slacks() {
                // the reformulated residual is c(x) - s; undo the slack part
                let constraint_value = initial_iterate.evaluations.constraints[constraint_index]
                    + initial_iterate.primals[slack_index];
                initial_iterate.primals[slack_index] = self.push_variable_to_interior(
                    constraint_value,
                    problem.variable_lower_bound(slack_index),
                    problem.variable_upper_bound(slack_index),
                );
            }
            // the slacks moved: the cached evaluations are stale
            initial_iterate.invalidate_evaluations();
        }

        // set the bound multipliers
        for &variable_index in problem.lower_bounded_variables() {
            initial_iterate.multipliers.lower_bounds[variable_index] = self.default_multiplier;
        }
        for &variable_index in problem.upper_bounded_variables() {
            initial_iterate.multipliers.upper_bounds[variable_index] = -self.default_multiplier;
        }

        // compute least-square constraint multipliers
        if problem.number_constraints() > 0 {
            self.compute_least_square_multipliers(problem, initial_iterate)?;
        }
        Ok(())
    }

    fn solve(
        &mut self,
        problem: &dyn OptimizationProblem,
        current_iterate: &mut Iterate,
        current_multipliers: &Multipliers,
        direction: &mut Direction,
        hessian_model: &mut dyn HessianModel,
        regularization: &mut dyn RegularizationStrategy,
        trust_region_radius: f64,
        warmstart: &WarmstartInformation,
    ) -> SolverResult<()> {
        debug_assert!(
            !is_finite(trust_region_radius),
            "the interior-point subproblem has no trust-region variant"
        );
        if warmstart.no_changes() {
            return Ok(());
        }
        if warmstart.sparsity_changed() {
            regularization.reset();
            self.linear_solver.reset();
        }

        // possibly update the barrier parameter
        let mut objective_changed = warmstart.objective_changed;
        if self.first_feasibility_iteration {
            self.first_feasibility_iteration = false;
        } else {
            let residuals = if self.solving_feasibility_problem {
                &current_iterate.feasibility_residuals
            } else {
                &current_iterate.residuals
            };
            let updated = self.barrier_parameter_update_strategy.update_barrier_parameter(
                problem,
                current_iterate,
                current_multipliers,
                residuals,
            );
            if updated {
                // the barrier terms changed along with mu
                objective_changed = true;
                self.subproblem_definition_changed = true;
            }
        }

        self.evaluate_functions(
            problem,
            current_iterate,
            current_multipliers,
            hessian_model,
            objective_changed,
            warmstart.constraints_changed,
        )?;

        // assemble, factorize and regularize the augmented matrix
        self.assemble_augmented_matrix(problem);
        self.augmented_matrix.check_capacity()?;
        let n = problem.number_variables();
        let m = problem.number_constraints();
        let dual_regularization_parameter = self
            .barrier_parameter()
            .powf(self.parameters.regularization_exponent);
        let expected_inertia = Inertia { positive: n, negative: m, zero: 0 };
        regularization.regularize_augmented_matrix(
            &mut self.augmented_matrix,
            &self.primal_indices,
            &self.dual_indices,
            dual_regularization_parameter,
            expected_inertia,
            &mut self.linear_solver,
        )?;

        // a singular augmented matrix means the subproblem is infeasible
        if self.linear_solver.matrix_is_singular() {
            direction.status = SubproblemStatus::Infeasible;
            return Ok(());
        }

        self.generate_augmented_rhs(problem, current_multipliers);
        self.linear_solver.solve_indefinite_system(
            &self.augmented_matrix,
            &self.rhs[..n + m],
            &mut self.solution[..n + m],
        );
        self.number_subproblems_solved += 1;

        self.assemble_primal_dual_direction(problem, current_iterate, current_multipliers, direction);
        self.detect_small_step(problem, current_iterate, direction);
        Ok(())
    }

    fn hessian_quadratic_product(&self, vector: &[f64]) -> f64 {
        self.hessian.quadratic_product(vector, vector)
    }

    fn set_auxiliary_measure(&self, problem: &dyn OptimizationProblem, iterate: &mut Iterate) {
        // auxiliary measure: barrier terms with damping
        let mut barrier_terms = 0.0;
        for &variable_index in problem.lower_bounded_variables() {
            barrier_terms -=
                (iterate.primals[variable_index] - problem.variable_lower_bound(variable_index)).ln();
        }
        for &variable_index in problem.upper_bounded_variables() {
            barrier_terms -=
                (problem.variable_upper_bound(variable_index) - iterate.primals[variable_index]).ln();
        }
        for &variable_index in problem.single_lower_bounded_variables() {
            barrier_terms += self.parameters.damping_factor
                * (iterate.primals[variable_index] - problem.variable_lower_bound(variable_index));
        }
        for &variable_index in problem.single_upper_bounded_variables() {
            barrier_terms += self.parameters.damping_factor
                * (problem.variable_upper_bound(variable_index) - iterate.primals[variable_index]);
        }
        barrier_terms *= self.barrier_parameter();
        debug_assert!(!barrier_terms.is_nan(), "the barrier auxiliary measure is NaN");
        iterate.progress.auxiliary = barrier_terms;
    }

    fn compute_predicted_auxiliary_reduction(
        &self,
        problem: &dyn OptimizationProblem,
        iterate: &Iterate,
        primal_direction: &[f64],
        step_length: f64,
    ) -> f64 {
        let mu = self.barrier_parameter();
        let mut directional_derivative = 0.0;
        for &variable_index in problem.lower_bounded_variables() {
            directional_derivative += -mu
                / (iterate.primals[variable_index] - problem.variable_lower_bound(variable_index))
                * primal_direction[variable_index];
        }
        for &variable_index in problem.upper_bounded_variables() {
            directional_derivative += -mu
                / (iterate.primals[variable_index] - problem.variable_upper_bound(variable_index))
                * primal_direction[variable_index];
        }
        for &variable_index in problem.single_lower_bounded_variables() {
            directional_derivative += self.parameters.damping_factor * mu * primal_direction[variable_index];
        }
        for &variable_index in problem.single_upper_bounded_variables() {
            directional_derivative -= self.parameters.damping_factor * mu * primal_direction[variable_index];
        }
        step_length * (-directional_derivative)
    }

    fn postprocess_iterate(
        &self,
        problem: &dyn OptimizationProblem,
        primals: &mut [f64],
        multipliers: &mut Multipliers,
    ) {
        // rescale the bound multipliers (Eq. 16 of the Ipopt paper)
        let mu = self.barrier_parameter();
        let k_sigma = self.parameters.k_sigma;
        for &variable_index in problem.lower_bounded_variables() {
            let coefficient = mu / (primals[variable_index] - problem.variable_lower_bound(variable_index));
            let lb = coefficient / k_sigma;
            let ub = coefficient * k_sigma;
            if lb <= ub {
                let current_value = multipliers.lower_bounds[variable_index];
                let new_value = current_value.clamp(lb, ub);
                if new_value != current_value {
                    debug!(variable_index, from = current_value, to = new_value, "lower bound multiplier rescaled");
                    multipliers.lower_bounds[variable_index] = new_value;
                }
            } else {
                warn!("the bounds are in the wrong order in the lower bound multiplier reset");
            }
        }
        for &variable_index in problem.upper_bounded_variables() {
            let coefficient = mu / (primals[variable_index] - problem.variable_upper_bound(variable_index));
            let lb = coefficient * k_sigma;
            let ub = coefficient / k_sigma;
            if lb <= ub {
                let current_value = multipliers.upper_bounds[variable_index];
                let new_value = current_value.clamp(lb, ub);
                if new_value != current_value {
                    debug!(variable_index, from = current_value, to = new_value, "upper bound multiplier rescaled");
                    multipliers.upper_bounds[variable_index] = new_value;
                }
            } else {
                warn!("the bounds are in the wrong order in the upper bound multiplier reset");
            }
        }
    }

    fn initialize_feasibility_problem(
        &mut self,
        _problem: &L1RelaxedProblem<'_>,
        current_iterate: &mut Iterate,
    ) {
        self.solving_feasibility_problem = true;
        self.first_feasibility_iteration = true;
        self.subproblem_definition_changed = true;

        // temporarily raise the barrier parameter to the infeasibility level
        self.previous_barrier_parameter = self.barrier_parameter();
        let new_barrier_parameter = self.barrier_parameter().max(current_iterate.primal_feasibility);
        self.barrier_parameter_update_strategy.set_barrier_parameter(new_barrier_parameter);
        debug!(mu = new_barrier_parameter, "barrier parameter temporarily raised for restoration");
    }

    fn exit_feasibility_problem(
        &mut self,
        _problem: &dyn OptimizationProblem,
        _trial_iterate: &mut Iterate,
    ) -> SolverResult<()> {
        debug_assert!(self.solving_feasibility_problem);
        self.barrier_parameter_update_strategy
            .set_barrier_parameter(self.previous_barrier_parameter);
        self.solving_feasibility_problem = false;
        self.subproblem_definition_changed = true;
        Ok(())
    }

    fn set_elastic_variable_values(
        &self,
        problem: &L1RelaxedProblem<'_>,
        current_iterate: &mut Iterate,
    ) {
        debug!("setting the elastic variables and their duals");
        for &variable_index in problem.lower_bounded_variables() {
            current_iterate.feasibility_multipliers.lower_bounds[variable_index] = self.default_multiplier;
        }
        for &variable_index in problem.upper_bounded_variables() {
            current_iterate.feasibility_multipliers.upper_bounds[variable_index] = -self.default_multiplier;
        }

        // c(x) - p + n = 0; the elastics start at the analytic minimizer of
        // the barrier-augmented l1 measure:
        //   (mu/rho - coefficient*c_j + sqrt(c_j^2 + (mu/rho)^2)) / 2
        // with coefficient -1 for p and +1 for n
        let mu = self.barrier_parameter();
        let rho = self.l1_constraint_violation_coefficient;
        let mu_over_rho = mu / rho;
        problem.set_elastic_variable_values(
            current_iterate,
            |iterate: &mut Iterate, constraint_index: usize, elastic_index: usize, jacobian_coefficient: f64| {
                let constraint_j = iterate.evaluations.constraints[constraint_index];
                let radical = constraint_j.powi(2) + mu_over_rho.powi(2);
                iterate.primals[elastic_index] =
                    (mu_over_rho - jacobian_coefficient * constraint_j + radical.sqrt()) / 2.0;
                iterate.feasibility_multipliers.lower_bounds[elastic_index] =
                    mu / iterate.primals[elastic_index];
                iterate.feasibility_multipliers.upper_bounds[elastic_index] = 0.0;
                debug_assert!(iterate.primals[elastic_index] > 0.0);
                debug_assert!(iterate.feasibility_multipliers.lower_bounds[elastic_index] > 0.0);
            },
        );
    }

    fn set_initial_point(&mut self, _point: &[f64]) {
        // the barrier method generates its own starting point
    }

    fn subproblem_definition_changed(&self) -> bool {
        self.subproblem_definition_changed
    }

    fn clear_subproblem_definition_changed(&mut self) {
        self.subproblem_definition_changed = false;
    }

    fn small_step_detected(&self) -> bool {
        self.is_small_step
    }

    fn number_subproblems_solved(&self) -> usize {
        self.number_subproblems_solved
    }

    fn name(&self) -> &'static str {
        "primal-dual interior-point method"
    }
}

