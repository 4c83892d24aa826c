//! End-to-end tests for the solver core.
//!
//! Each test states a small nonlinear program, picks one combination of the
//! four ingredients and validates the termination status and the primal-dual
//! solution.

use nlp_core::linalg::{SparseVector, SymmetricMatrix};
use nlp_core::util::INF;
use nlp_core::{solve, Model, Options, TerminationStatus};

/// Small dense test problem described by closures over the primal point.
struct TestProblem {
    n: usize,
    m: usize,
    variable_bounds: Vec<(f64, f64)>,
    constraint_bounds: Vec<(f64, f64)>,
    initial_point: Vec<f64>,
    objective: fn(&[f64]) -> f64,
    gradient: fn(&[f64]) -> Vec<f64>,
    constraints: fn(&[f64]) -> Vec<f64>,
    jacobian: fn(&[f64]) -> Vec<Vec<f64>>,
    /// upper-triangle triplets of σ∇²f − Σ λ_j ∇²c_j
    hessian: fn(&[f64], f64, &[f64]) -> Vec<(usize, usize, f64)>,
}

impl Model for TestProblem {
    fn number_variables(&self) -> usize {
        self.n
    }
    fn number_constraints(&self) -> usize {
        self.m
    }
    fn variable_lower_bound(&self, i: usize) -> f64 {
        self.variable_bounds[i].0
    }
    fn variable_upper_bound(&self, i: usize) -> f64 {
        self.variable_bounds[i].1
    }
    fn constraint_lower_bound(&self, j: usize) -> f64 {
        self.constraint_bounds[j].0
    }
    fn constraint_upper_bound(&self, j: usize) -> f64 {
        self.constraint_bounds[j].1
    }
    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        (self.objective)(&x[..self.n])
    }
    fn evaluate_objective_gradient(&self, x: &[f64], gradient: &mut SparseVector) {
        // dense rows: the sparsity pattern stays constant across evaluations
        for (i, value) in (self.gradient)(&x[..self.n]).into_iter().enumerate() {
            gradient.insert(i, value);
        }
    }
    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) {
        constraints[..self.m].copy_from_slice(&(self.constraints)(&x[..self.n]));
    }
    fn evaluate_constraint_jacobian(&self, x: &[f64], jacobian: &mut [SparseVector]) {
        for (j, row) in (self.jacobian)(&x[..self.n]).into_iter().enumerate() {
            for (i, value) in row.into_iter().enumerate() {
                jacobian[j].insert(i, value);
            }
        }
    }
    fn evaluate_lagrangian_hessian(
        &self,
        x: &[f64],
        objective_multiplier: f64,
        multipliers: &[f64],
        hessian: &mut SymmetricMatrix,
    ) {
        for (row, col, value) in (self.hessian)(&x[..self.n], objective_multiplier, multipliers) {
            hessian.insert(value, row, col);
        }
    }
    fn number_jacobian_nonzeros(&self) -> usize {
        self.n * self.m
    }
    fn number_hessian_nonzeros(&self) -> usize {
        self.n * (self.n + 1) / 2
    }
    fn initial_primal_point(&self, x: &mut [f64]) {
        x[..self.n].copy_from_slice(&self.initial_point);
    }
}

fn unconstrained_1d() -> TestProblem {
    // min (x - 3)^2
    TestProblem {
        n: 1,
        m: 0,
        variable_bounds: vec![(-INF, INF)],
        constraint_bounds: vec![],
        initial_point: vec![0.0],
        objective: |x| (x[0] - 3.0) * (x[0] - 3.0),
        gradient: |x| vec![2.0 * (x[0] - 3.0)],
        constraints: |_| vec![],
        jacobian: |_| vec![],
        hessian: |_, sigma, _| vec![(0, 0, 2.0 * sigma)],
    }
}

#[test]
fn test_unconstrained_convex_interior_point() {
    // IPM + line search + l1 merit: a handful of Newton steps to x = 3
    let problem = unconstrained_1d();
    let options = Options::default()
        .with("inequality_handling_method", "primal_dual_IPM")
        .with("globalization_mechanism", "LS")
        .with("globalization_strategy", "l1_merit_function");
    let result = solve(&problem, &options).expect("solve failed");

    assert_eq!(result.status, TerminationStatus::FeasibleKktPoint);
    assert!((result.primals[0] - 3.0).abs() < 1e-6, "x = {}", result.primals[0]);
    assert!(result.stationarity <= 1e-8);
    assert!(result.iterations <= 10, "took {} iterations", result.iterations);
}

#[test]
fn test_bound_constrained_interior_point() {
    // min x^2 with 1 <= x <= 10, x0 = 5: active lower bound, zL -> 2
    let problem = TestProblem {
        n: 1,
        m: 0,
        variable_bounds: vec![(1.0, 10.0)],
        constraint_bounds: vec![],
        initial_point: vec![5.0],
        objective: |x| x[0] * x[0],
        gradient: |x| vec![2.0 * x[0]],
        constraints: |_| vec![],
        jacobian: |_| vec![],
        hessian: |_, sigma, _| vec![(0, 0, 2.0 * sigma)],
    };
    let options = Options::default().with("inequality_handling_method", "primal_dual_IPM");
    let result = solve(&problem, &options).expect("solve failed");

    assert_eq!(result.status, TerminationStatus::FeasibleKktPoint);
    assert!((result.primals[0] - 1.0).abs() < 1e-6, "x = {}", result.primals[0]);
    assert!(
        (result.lower_bound_multipliers[0] - 2.0).abs() < 1e-3,
        "zL = {}",
        result.lower_bound_multipliers[0]
    );
    assert!(result.iterations < 50, "took {} iterations", result.iterations);
}

#[test]
fn test_equality_constrained_interior_point() {
    // min x1^2 + x2^2 s.t. x1 + x2 = 1: solution (0.5, 0.5), lambda = 1
    let problem = TestProblem {
        n: 2,
        m: 1,
        variable_bounds: vec![(-INF, INF), (-INF, INF)],
        constraint_bounds: vec![(1.0, 1.0)],
        initial_point: vec![0.0, 0.0],
        objective: |x| x[0] * x[0] + x[1] * x[1],
        gradient: |x| vec![2.0 * x[0], 2.0 * x[1]],
        constraints: |x| vec![x[0] + x[1]],
        jacobian: |_| vec![vec![1.0, 1.0]],
        hessian: |_, sigma, _| vec![(0, 0, 2.0 * sigma), (1, 1, 2.0 * sigma)],
    };
    let options = Options::default()
        .with("inequality_handling_method", "primal_dual_IPM")
        .with("globalization_strategy", "filter_method");
    let result = solve(&problem, &options).expect("solve failed");

    assert_eq!(result.status, TerminationStatus::FeasibleKktPoint);
    assert!((result.primals[0] - 0.5).abs() < 1e-6);
    assert!((result.primals[1] - 0.5).abs() < 1e-6);
    assert!(
        (result.constraint_multipliers[0] - 1.0).abs() < 1e-5,
        "lambda = {}",
        result.constraint_multipliers[0]
    );
}

#[test]
fn test_infeasible_problem_reaches_stationary_point() {
    // min x^2 s.t. x >= 1 and x <= 0: no feasible point; the solver must
    // settle at a stationary point of the l1 violation
    let problem = TestProblem {
        n: 1,
        m: 2,
        variable_bounds: vec![(-INF, INF)],
        constraint_bounds: vec![(1.0, INF), (-INF, 0.0)],
        initial_point: vec![0.5],
        objective: |x| x[0] * x[0],
        gradient: |x| vec![2.0 * x[0]],
        constraints: |x| vec![x[0], x[0]],
        jacobian: |_| vec![vec![1.0], vec![1.0]],
        hessian: |_, sigma, _| vec![(0, 0, 2.0 * sigma)],
    };
    let options = Options::default()
        .with("inequality_handling_method", "QP")
        .with("globalization_mechanism", "LS")
        .with("globalization_strategy", "l1_merit_function");
    let result = solve(&problem, &options).expect("solve failed");

    assert_eq!(result.status, TerminationStatus::InfeasibleStationaryPoint);
    // no optimality-phase step was ever accepted: the first linearization is
    // already inconsistent
    assert!(result.number_restoration_phases >= 1);
    // the gap between x >= 1 and x <= 0 keeps the violation at 1/2 at least
    assert!(result.primal_feasibility >= 0.5 - 1e-6);
}

#[test]
fn test_nonconvex_saddle_with_trust_region() {
    // min x1*x2 s.t. x1 + x2 = 1, -5 <= x <= 5, from (2, -1): the exact
    // Hessian is indefinite, so the convexification must kick in; the
    // minimizer sits on the box at (5, -4)
    let problem = TestProblem {
        n: 2,
        m: 1,
        variable_bounds: vec![(-5.0, 5.0), (-5.0, 5.0)],
        constraint_bounds: vec![(1.0, 1.0)],
        initial_point: vec![2.0, -1.0],
        objective: |x| x[0] * x[1],
        gradient: |x| vec![x[1], x[0]],
        constraints: |x| vec![x[0] + x[1]],
        jacobian: |_| vec![vec![1.0, 1.0]],
        hessian: |_, sigma, _| vec![(0, 1, sigma)],
    };
    let options = Options::default()
        .with("inequality_handling_method", "QP")
        .with("globalization_mechanism", "TR")
        .with("globalization_strategy", "filter_method")
        .with("hessian_model", "exact");
    let result = solve(&problem, &options).expect("solve failed");

    assert_eq!(result.status, TerminationStatus::FeasibleKktPoint);
    // first-order point on the box boundary (either symmetric solution)
    let (x1, x2) = (result.primals[0], result.primals[1]);
    assert!((x1 + x2 - 1.0).abs() < 1e-6, "constraint violated: {x1} + {x2}");
    assert!(
        ((x1 - 5.0).abs() < 1e-5 && (x2 + 4.0).abs() < 1e-5)
            || ((x1 + 4.0).abs() < 1e-5 && (x2 - 5.0).abs() < 1e-5),
        "unexpected solution ({x1}, {x2})"
    );
    assert!(result.number_hessian_evaluations >= 1);
}

#[test]
fn test_restoration_round_trip() {
    // min x^2 s.t. (x - 1)^2 <= 0.1, x0 = 5: the constraint is violated at
    // the initial point and the small trust region makes the first
    // linearization infeasible, forcing a restoration phase before the
    // solver converges to x = 1 - sqrt(0.1)
    let problem = TestProblem {
        n: 1,
        m: 1,
        variable_bounds: vec![(-INF, INF)],
        constraint_bounds: vec![(-INF, 0.1)],
        initial_point: vec![5.0],
        objective: |x| x[0] * x[0],
        gradient: |x| vec![2.0 * x[0]],
        constraints: |x| vec![(x[0] - 1.0) * (x[0] - 1.0)],
        jacobian: |x| vec![vec![2.0 * (x[0] - 1.0)]],
        hessian: |_, sigma, multipliers| vec![(0, 0, 2.0 * sigma - 2.0 * multipliers[0])],
    };
    let options = Options::default()
        .with("inequality_handling_method", "QP")
        .with("globalization_mechanism", "TR")
        .with("globalization_strategy", "filter_method")
        .with("TR_initial_radius", "1.0");
    let result = solve(&problem, &options).expect("solve failed");

    assert_eq!(result.status, TerminationStatus::FeasibleKktPoint);
    assert!(result.number_restoration_phases >= 1, "restoration never entered");
    let expected = 1.0 - 0.1f64.sqrt();
    assert!(
        (result.primals[0] - expected).abs() < 1e-4,
        "x = {}, expected {expected}",
        result.primals[0]
    );
    assert!(result.primal_feasibility <= 1e-6);
}

#[test]
fn test_trust_region_interior_point_is_rejected() {
    // preserved non-goal: the trust-region interior-point combination is
    // refused before the loop begins
    let problem = unconstrained_1d();
    let options = Options::default()
        .with("inequality_handling_method", "primal_dual_IPM")
        .with("globalization_mechanism", "TR");
    assert!(solve(&problem, &options).is_err());
}

#[test]
fn test_unknown_option_value_is_rejected() {
    let problem = unconstrained_1d();
    let options = Options::default().with("globalization_strategy", "secant");
    assert!(solve(&problem, &options).is_err());
}

#[test]
fn test_qp_method_on_bound_constrained_problem() {
    // the sequential QP method on the bound-constrained quadratic: one QP
    // lands on the solution
    let problem = TestProblem {
        n: 1,
        m: 0,
        variable_bounds: vec![(1.0, 10.0)],
        constraint_bounds: vec![],
        initial_point: vec![5.0],
        objective: |x| x[0] * x[0],
        gradient: |x| vec![2.0 * x[0]],
        constraints: |_| vec![],
        jacobian: |_| vec![],
        hessian: |_, sigma, _| vec![(0, 0, 2.0 * sigma)],
    };
    let options = Options::default()
        .with("inequality_handling_method", "QP")
        .with("globalization_mechanism", "LS")
        .with("globalization_strategy", "l1_merit_function");
    let result = solve(&problem, &options).expect("solve failed");

    assert_eq!(result.status, TerminationStatus::FeasibleKktPoint);
    assert!((result.primals[0] - 1.0).abs() < 1e-6);
    assert!((result.lower_bound_multipliers[0] - 2.0).abs() < 1e-4);
}
