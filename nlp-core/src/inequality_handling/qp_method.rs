//! Sequential QP method.
//!
//! Each solve hands the QP solver the quadratic model
//!
//! ```text
//! min  g'd + (1/2) d'Hd   s.t.   cL - c(x) <= Jd <= cU - c(x),
//!                                max(xL - x, -Δ) <= d <= min(xU - x, Δ)
//! ```
//!
//! with Δ the trust-region radius when one is active. When the outer
//! mechanism is a line search (or convexification is requested), H is first
//! regularized to be positive definite, since the QP has no other way to
//! guarantee a bounded descent direction.

use tracing::debug;

use crate::direction::{Direction, SubproblemStatus, WarmstartInformation};
use crate::error::SolverResult;
use crate::hessian::HessianModel;
use crate::inequality_handling::InequalityHandlingMethod;
use crate::iterate::{Iterate, Multipliers};
use crate::linalg::qp::{DenseQpSolver, QpSolver};
use crate::linalg::sparse_vector::SparseVector;
use crate::linalg::symmetric::{Inertia, SymmetricMatrix};
use crate::options::Options;
use crate::reformulation::{L1RelaxedProblem, OptimizationProblem};
use crate::regularization::RegularizationStrategy;
use crate::util::{is_finite, norm_inf};

pub struct QpMethod {
    qp_solver: DenseQpSolver,
    /// convexify the Hessian before each QP (always required by a line
    /// search, optional under a trust region)
    use_regularization: bool,
    enforce_linear_constraints_at_initial_iterate: bool,

    // workspace, allocated in initialize_memory
    hessian: SymmetricMatrix,
    objective_gradient: SparseVector,
    constraints: Vec<f64>,
    constraint_jacobian: Vec<SparseVector>,
    direction_lower_bounds: Vec<f64>,
    direction_upper_bounds: Vec<f64>,
    linearized_constraints_lower_bounds: Vec<f64>,
    linearized_constraints_upper_bounds: Vec<f64>,
    initial_point: Vec<f64>,
    variable_indices: Vec<usize>,

    last_regularization_factor: f64,
    solving_feasibility_problem: bool,
    subproblem_definition_changed: bool,
    number_subproblems_solved: usize,
}

impl QpMethod {
    pub fn new(options: &Options) -> SolverResult<Self> {
        let qp_solver_name = options.get_str("qp_solver")?;
        if qp_solver_name != "dense" {
            return Err(crate::error::SolverError::Configuration(format!(
                "unknown qp_solver '{qp_solver_name}'"
            )));
        }
        // without a trust region the QP must be convexified to stay bounded
        let use_regularization = options.get_str("globalization_mechanism")? != "TR"
            || options.get_bool("convexify_QP")?;
        Ok(QpMethod {
            qp_solver: DenseQpSolver::new(),
            use_regularization,
            enforce_linear_constraints_at_initial_iterate: options.get_bool("enforce_linear_constraints")?,
            hessian: SymmetricMatrix::new(0, 0, true),
            objective_gradient: SparseVector::new(),
            constraints: Vec::new(),
            constraint_jacobian: Vec::new(),
            direction_lower_bounds: Vec::new(),
            direction_upper_bounds: Vec::new(),
            linearized_constraints_lower_bounds: Vec::new(),
            linearized_constraints_upper_bounds: Vec::new(),
            initial_point: Vec::new(),
            variable_indices: Vec::new(),
            last_regularization_factor: 0.0,
            solving_feasibility_problem: false,
            subproblem_definition_changed: false,
            number_subproblems_solved: 0,
        })
    }

    /// Regularization factor committed by the last Hessian convexification.
    pub fn last_regularization_factor(&self) -> f64 {
        self.last_regularization_factor
    }

    fn evaluate_functions(
        &mut self,
        problem: &dyn OptimizationProblem,
        current_iterate: &mut Iterate,
        current_multipliers: &Multipliers,
        hessian_model: &mut dyn HessianModel,
        regularization: &mut dyn RegularizationStrategy,
        warmstart: &WarmstartInformation,
    ) -> SolverResult<()> {
        // Lagrangian Hessian, convexified when required
        if warmstart.objective_changed || warmstart.constraints_changed {
            self.hessian.set_dimension(problem.number_variables());
            hessian_model.evaluate(
                problem,
                &current_iterate.primals,
                &current_multipliers.constraints,
                &mut self.hessian,
            );
            self.hessian.check_capacity()?;
            if self.use_regularization && !hessian_model.is_positive_definite() {
                let n = problem.number_variables();
                self.variable_indices.clear();
                self.variable_indices.extend(0..n);
                let expected_inertia = Inertia { positive: n, negative: 0, zero: 0 };
                self.last_regularization_factor = regularization.regularize_hessian(
                    &mut self.hessian,
                    &self.variable_indices,
                    expected_inertia,
                )?;
                if self.last_regularization_factor > 0.0 {
                    debug!(factor = self.last_regularization_factor, "Hessian convexified");
                }
            }
        }
        // objective gradient, constraints and constraint Jacobian
        if warmstart.objective_changed {
            problem.evaluate_objective_gradient(current_iterate, &mut self.objective_gradient)?;
        }
        if warmstart.constraints_changed {
            problem.evaluate_constraints(current_iterate, &mut self.constraints)?;
            problem.evaluate_constraint_jacobian(current_iterate, &mut self.constraint_jacobian)?;
        }
        Ok(())
    }

    /// Bounds of the variable displacements, intersected with the trust
    /// region in the infinity norm.
    fn set_direction_bounds(
        &mut self,
        problem: &dyn OptimizationProblem,
        current_iterate: &Iterate,
        trust_region_radius: f64,
    ) {
        for variable_index in 0..problem.number_variables() {
            let mut lower =
                problem.variable_lower_bound(variable_index) - current_iterate.primals[variable_index];
            let mut upper =
                problem.variable_upper_bound(variable_index) - current_iterate.primals[variable_index];
            if is_finite(trust_region_radius) {
                lower = lower.max(-trust_region_radius);
                upper = upper.min(trust_region_radius);
            }
            self.direction_lower_bounds[variable_index] = lower;
            self.direction_upper_bounds[variable_index] = upper;
        }
    }

    fn set_linearized_constraint_bounds(&mut self, problem: &dyn OptimizationProblem) {
        for constraint_index in 0..problem.number_constraints() {
            self.linearized_constraints_lower_bounds[constraint_index] =
                problem.constraint_lower_bound(constraint_index) - self.constraints[constraint_index];
            self.linearized_constraints_upper_bounds[constraint_index] =
                problem.constraint_upper_bound(constraint_index) - self.constraints[constraint_index];
        }
    }

    /// Project the initial point onto the linear constraints by solving a
    /// least-displacement QP, when any of them is violated.
    fn enforce_linear_constraints(
        &mut self,
        problem: &dyn OptimizationProblem,
        initial_iterate: &mut Iterate,
    ) -> SolverResult<()> {
        let model = problem.model();
        let n = problem.number_variables();
        let m = problem.number_constraints();
        let linear: Vec<usize> = (0..m).filter(|&j| model.constraint_is_linear(j)).collect();
        if linear.is_empty() {
            return Ok(());
        }
        initial_iterate.evaluate_constraints(model)?;
        let violated = linear.iter().any(|&j| {
            let value = initial_iterate.evaluations.constraints[j];
            value < problem.constraint_lower_bound(j) || problem.constraint_upper_bound(j) < value
        });
        if !violated {
            return Ok(());
        }
        debug!(count = linear.len(), "projecting the initial point onto the linear constraints");
        initial_iterate.evaluate_constraint_jacobian(model)?;

        // min ||d||^2 subject to the linearized (exact, since linear)
        // constraints and the variable bounds
        let mut identity = SymmetricMatrix::new(n, n, false);
        for i in 0..n {
            identity.insert(1.0, i, i);
        }
        let gradient = SparseVector::new();
        let mut jacobian: Vec<SparseVector> = Vec::with_capacity(linear.len());
        let mut lower = Vec::with_capacity(linear.len());
        let mut upper = Vec::with_capacity(linear.len());
        for &j in &linear {
            jacobian.push(initial_iterate.evaluations.constraint_jacobian[j].clone());
            let value = initial_iterate.evaluations.constraints[j];
            lower.push(problem.constraint_lower_bound(j) - value);
            upper.push(problem.constraint_upper_bound(j) - value);
        }
        self.set_direction_bounds(problem, initial_iterate, crate::util::INF);

        let mut direction = Direction::new(n, linear.len());
        let initial_point = vec![0.0; n];
        self.qp_solver.solve_qp(
            &identity,
            &gradient,
            &jacobian,
            &self.direction_lower_bounds[..n],
            &self.direction_upper_bounds[..n],
            &lower,
            &upper,
            &initial_point,
            &WarmstartInformation::whole_problem(),
            &mut direction,
        );
        if direction.status != SubproblemStatus::Optimal {
            // leave the point unchanged; the relaxation layer will restore
            debug!("linear constraints cannot be satisfied at the initial point");
            return Ok(());
        }
        for i in 0..n {
            initial_iterate.primals[i] += direction.primals[i];
        }
        initial_iterate.invalidate_evaluations();
        Ok(())
    }

    /// The QP solver returns absolute multipliers; the direction carries the
    /// displacements with respect to the current multipliers.
    fn compute_dual_displacements(current_multipliers: &Multipliers, direction: &mut Direction) {
        for (delta, current) in direction
            .multipliers
            .constraints
            .iter_mut()
            .zip(current_multipliers.constraints.iter())
        {
            *delta -= current;
        }
        for (delta, current) in direction
            .multipliers
            .lower_bounds
            .iter_mut()
            .zip(current_multipliers.lower_bounds.iter())
        {
            *delta -= current;
        }
        for (delta, current) in direction
            .multipliers
            .upper_bounds
            .iter_mut()
            .zip(current_multipliers.upper_bounds.iter())
        {
            *delta -= current;
        }
    }
}

impl InequalityHandlingMethod for QpMethod {
    fn initialize_memory(
        &mut self,
        problem: &dyn OptimizationProblem,
        hessian_model: &dyn HessianModel,
        regularization: &mut dyn RegularizationStrategy,
    ) -> SolverResult<()> {
        let n = problem.number_variables();
        let m = problem.number_constraints();
        let hessian_nonzeros = hessian_model.number_nonzeros(problem);
        self.hessian = SymmetricMatrix::new(n, hessian_nonzeros, true);
        self.objective_gradient = SparseVector::with_capacity(problem.number_objective_gradient_nonzeros());
        self.constraints = vec![0.0; m];
        self.constraint_jacobian = (0..m).map(|_| SparseVector::new()).collect();
        self.direction_lower_bounds = vec![0.0; n];
        self.direction_upper_bounds = vec![0.0; n];
        self.linearized_constraints_lower_bounds = vec![0.0; m];
        self.linearized_constraints_upper_bounds = vec![0.0; m];
        self.initial_point = vec![0.0; n];
        self.variable_indices = Vec::with_capacity(n);
        self.qp_solver.initialize_memory(n, m);
        regularization.initialize_memory(n, hessian_nonzeros);
        Ok(())
    }

    fn generate_initial_iterate(
        &mut self,
        problem: &dyn OptimizationProblem,
        initial_iterate: &mut Iterate,
    ) -> SolverResult<()> {
        // the user point is used unchanged, except for the optional
        // projection onto the linear constraints
        if self.enforce_linear_constraints_at_initial_iterate {
            self.enforce_linear_constraints(problem, initial_iterate)?;
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
        if warmstart.no_changes() {
            return Ok(());
        }
        if warmstart.sparsity_changed() {
            regularization.reset();
        }
        self.evaluate_functions(
            problem,
            current_iterate,
            current_multipliers,
            hessian_model,
            regularization,
            warmstart,
        )?;

        if warmstart.variable_bounds_changed {
            self.set_direction_bounds(problem, current_iterate, trust_region_radius);
        }
        if warmstart.constraint_bounds_changed || warmstart.constraints_changed {
            self.set_linearized_constraint_bounds(problem);
        }

        let n = problem.number_variables();
        let m = problem.number_constraints();
        self.qp_solver.solve_qp(
            &self.hessian,
            &self.objective_gradient,
            &self.constraint_jacobian[..m],
            &self.direction_lower_bounds[..n],
            &self.direction_upper_bounds[..n],
            &self.linearized_constraints_lower_bounds[..m],
            &self.linearized_constraints_upper_bounds[..m],
            &self.initial_point[..n],
            warmstart,
            direction,
        );
        self.number_subproblems_solved += 1;
        if direction.status == SubproblemStatus::Optimal {
            QpMethod::compute_dual_displacements(current_multipliers, direction);
            direction.norm = norm_inf(&direction.primals[..n]);
        }
        // reset the warm-start point
        self.initial_point.fill(0.0);
        Ok(())
    }

    fn hessian_quadratic_product(&self, vector: &[f64]) -> f64 {
        self.hessian.quadratic_product(vector, vector)
    }

    fn set_auxiliary_measure(&self, _problem: &dyn OptimizationProblem, iterate: &mut Iterate) {
        // the QP method has no auxiliary terms
        iterate.progress.auxiliary = 0.0;
    }

    fn compute_predicted_auxiliary_reduction(
        &self,
        _problem: &dyn OptimizationProblem,
        _iterate: &Iterate,
        _primal_direction: &[f64],
        _step_length: f64,
    ) -> f64 {
        0.0
    }

    fn postprocess_iterate(
        &self,
        _problem: &dyn OptimizationProblem,
        _primals: &mut [f64],
        _multipliers: &mut Multipliers,
    ) {
        // nothing to reshape
    }

    fn initialize_feasibility_problem(
        &mut self,
        _problem: &L1RelaxedProblem<'_>,
        _current_iterate: &mut Iterate,
    ) {
        self.solving_feasibility_problem = true;
        self.subproblem_definition_changed = true;
    }

    fn exit_feasibility_problem(
        &mut self,
        _problem: &dyn OptimizationProblem,
        _trial_iterate: &mut Iterate,
    ) -> SolverResult<()> {
        self.solving_feasibility_problem = false;
        self.subproblem_definition_changed = true;
        Ok(())
    }

    fn set_elastic_variable_values(
        &self,
        problem: &L1RelaxedProblem<'_>,
        current_iterate: &mut Iterate,
    ) {
        // plain violation split: p = max(0, c - cU), n = max(0, cL - c)
        problem.set_elastic_variable_values(
            current_iterate,
            |iterate: &mut Iterate, constraint_index: usize, elastic_index: usize, jacobian_coefficient: f64| {
                let constraint_j = iterate.evaluations.constraints[constraint_index];
                let violation = if jacobian_coefficient < 0.0 {
                    (constraint_j - problem.constraint_upper_bound(constraint_index)).max(0.0)
                } else {
                    (problem.constraint_lower_bound(constraint_index) - constraint_j).max(0.0)
                };
                iterate.primals[elastic_index] = violation;
                iterate.feasibility_multipliers.lower_bounds[elastic_index] = 0.0;
                iterate.feasibility_multipliers.upper_bounds[elastic_index] = 0.0;
            },
        );
    }

    fn set_initial_point(&mut self, point: &[f64]) {
        let length = self.initial_point.len().min(point.len());
        self.initial_point[..length].copy_from_slice(&point[..length]);
    }

    fn subproblem_definition_changed(&self) -> bool {
        self.subproblem_definition_changed
    }

    fn clear_subproblem_definition_changed(&mut self) {
        self.subproblem_definition_changed = false;
    }

    fn number_subproblems_solved(&self) -> usize {
        self.number_subproblems_solved
    }

    fn name(&self) -> &'static str {
        "sequential QP method"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hessian;
    use crate::regularization;
    use crate::util::INF;

    struct ShiftedQuadratic;

    impl crate::model::Model for ShiftedQuadratic {
        fn number_variables(&self) -> usize {
            1
        }
        fn number_constraints(&self) -> usize {
            0
        }
        fn variable_lower_bound(&self, _: usize) -> f64 {
            -INF
        }
        fn variable_upper_bound(&self, _: usize) -> f64 {
            INF
        }
        fn constraint_lower_bound(&self, _: usize) -> f64 {
            unreachable!()
        }
        fn constraint_upper_bound(&self, _: usize) -> f64 {
            unreachable!()
        }
        fn evaluate_objective(&self, x: &[f64]) -> f64 {
            (x[0] - 3.0) * (x[0] - 3.0)
        }
        fn evaluate_objective_gradient(&self, x: &[f64], gradient: &mut SparseVector) {
            gradient.insert(0, 2.0 * (x[0] - 3.0));
        }
        fn evaluate_constraints(&self, _: &[f64], _: &mut [f64]) {}
        fn evaluate_constraint_jacobian(&self, _: &[f64], _: &mut [SparseVector]) {}
        fn evaluate_lagrangian_hessian(
            &self,
            _: &[f64],
            objective_multiplier: f64,
            _: &[f64],
            hessian: &mut SymmetricMatrix,
        ) {
            hessian.insert(2.0 * objective_multiplier, 0, 0);
        }
        fn number_jacobian_nonzeros(&self) -> usize {
            0
        }
        fn number_hessian_nonzeros(&self) -> usize {
            1
        }
        fn initial_primal_point(&self, x: &mut [f64]) {
            x[0] = 0.0;
        }
    }

    #[test]
    fn test_empty_warmstart_returns_cached_direction() {
        let model = ShiftedQuadratic;
        let problem = crate::reformulation::OptimalityProblem::new(&model);
        let options = Options::default().with("globalization_mechanism", "LS");
        let mut method = QpMethod::new(&options).unwrap();
        let mut hessian_model = hessian::create("exact").unwrap();
        let mut regularization = regularization::create(&options).unwrap();
        method
            .initialize_memory(&problem, hessian_model.as_ref(), regularization.as_mut())
            .unwrap();

        let mut iterate = Iterate::new(1, 0);
        let multipliers = Multipliers::new(1, 0);
        let mut direction = Direction::new(1, 0);
        method
            .solve(
                &problem,
                &mut iterate,
                &multipliers,
                &mut direction,
                hessian_model.as_mut(),
                regularization.as_mut(),
                INF,
                &WarmstartInformation::whole_problem(),
            )
            .unwrap();
        assert_eq!(direction.status, SubproblemStatus::Optimal);
        assert!((direction.primals[0] - 3.0).abs() < 1e-6);
        let cached = direction.primals.clone();
        let number_solves = method.number_subproblems_solved();

        // no warmstart bit set: the solve is a no-op on the cached direction
        method
            .solve(
                &problem,
                &mut iterate,
                &multipliers,
                &mut direction,
                hessian_model.as_mut(),
                regularization.as_mut(),
                INF,
                &WarmstartInformation::default(),
            )
            .unwrap();
        assert_eq!(direction.primals, cached);
        assert_eq!(method.number_subproblems_solved(), number_solves);
    }
}
