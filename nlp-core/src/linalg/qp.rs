//! Quadratic programming capability.
//!
//! The sequential QP method consumes a [`QpSolver`]: given a convex quadratic
//! objective, linearized constraint bounds and variable bounds, produce a
//! primal-dual solution. The bundled backend is a dense primal-dual
//! interior-point method with an infeasible start: slacks are independent
//! variables, so the initial point never needs to satisfy the linearized
//! constraints, and inconsistent linearizations surface as a primal residual
//! that refuses to converge.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::direction::{Direction, SubproblemStatus, WarmstartInformation};
use crate::linalg::sparse_vector::SparseVector;
use crate::linalg::symmetric::SymmetricMatrix;
use crate::util::{is_finite, norm_inf};

/// Solver for the quadratic subproblem
///
/// ```text
/// min  g'd + (1/2) d'Hd   s.t.   cL <= Jd <= cU,   lb <= d <= ub.
/// ```
///
/// The returned multipliers are absolute values (not displacements), with the
/// outer sign convention: constraint multipliers positive at lower bounds,
/// bound multipliers zL >= 0 and zU <= 0.
pub trait QpSolver {
    fn initialize_memory(&mut self, max_variables: usize, max_constraints: usize);

    #[allow(clippy::too_many_arguments)]
    fn solve_qp(
        &mut self,
        hessian: &SymmetricMatrix,
        gradient: &SparseVector,
        jacobian: &[SparseVector],
        variable_lower_bounds: &[f64],
        variable_upper_bounds: &[f64],
        constraint_lower_bounds: &[f64],
        constraint_upper_bounds: &[f64],
        initial_point: &[f64],
        warmstart: &WarmstartInformation,
        direction: &mut Direction,
    );
}

/// A row of the combined constraint system: a linearized constraint or a
/// variable bound.
#[derive(Debug, Clone, Copy)]
enum Row {
    Constraint(usize),
    Variable(usize),
}

/// One-sided slack/multiplier pair attached to a row.
#[derive(Debug, Clone, Copy)]
struct SideState {
    bound: f64,
    slack: f64,
    dual: f64,
}

#[derive(Debug, Clone)]
struct InequalityRow {
    row: Row,
    lower: Option<SideState>,
    upper: Option<SideState>,
}

const MAX_ITERATIONS: usize = 200;
const TOLERANCE: f64 = 1e-10;
const INFEASIBILITY_TOLERANCE: f64 = 1e-7;
const FRACTION_TO_BOUNDARY: f64 = 0.995;
const CENTERING: f64 = 0.1;
const DIVERGENCE_THRESHOLD: f64 = 1e10;

/// Dense primal-dual interior-point QP backend.
#[derive(Default)]
pub struct DenseQpSolver {
    max_variables: usize,
    max_constraints: usize,
}

impl DenseQpSolver {
    pub fn new() -> Self {
        DenseQpSolver::default()
    }
}

fn row_value(row: Row, jacobian: &[SparseVector], d: &[f64]) -> f64 {
    match row {
        Row::Constraint(j) => jacobian[j].dot(d),
        Row::Variable(i) => d[i],
    }
}

fn row_add(row: Row, jacobian: &[SparseVector], factor: f64, out: &mut [f64]) {
    match row {
        Row::Constraint(j) => jacobian[j].add_into(out, factor),
        Row::Variable(i) => out[i] += factor,
    }
}

impl QpSolver for DenseQpSolver {
    fn initialize_memory(&mut self, max_variables: usize, max_constraints: usize) {
        self.max_variables = max_variables;
        self.max_constraints = max_constraints;
    }

    fn solve_qp(
        &mut self,
        hessian: &SymmetricMatrix,
        gradient: &SparseVector,
        jacobian: &[SparseVector],
        variable_lower_bounds: &[f64],
        variable_upper_bounds: &[f64],
        constraint_lower_bounds: &[f64],
        constraint_upper_bounds: &[f64],
        initial_point: &[f64],
        _warmstart: &WarmstartInformation,
        direction: &mut Direction,
    ) {
        let n = variable_lower_bounds.len();
        let m = constraint_lower_bounds.len();
        debug_assert!(n <= self.max_variables && m <= self.max_constraints);

        // dense symmetrized Hessian and gradient
        let mut h = DMatrix::<f64>::zeros(n, n);
        for (row, col, value) in hessian.iter() {
            h[(row, col)] += value;
            if row != col {
                h[(col, row)] += value;
            }
        }
        let mut g = vec![0.0; n];
        gradient.add_into(&mut g, 1.0);

        // classify rows into equalities and one/two-sided inequalities
        let mut equalities: Vec<(Row, f64)> = Vec::new();
        let mut inequalities: Vec<InequalityRow> = Vec::new();
        let mut classify = |row: Row, lower: f64, upper: f64| {
            if !is_finite(lower) && !is_finite(upper) {
                return true;
            }
            if lower > upper + 1e-9 {
                return false; // empty interval: infeasible
            }
            if is_finite(lower) && upper - lower <= 1e-12 {
                equalities.push((row, lower));
            } else {
                inequalities.push(InequalityRow {
                    row,
                    lower: is_finite(lower).then(|| SideState { bound: lower, slack: 1.0, dual: 1.0 }),
                    upper: is_finite(upper).then(|| SideState { bound: upper, slack: 1.0, dual: 1.0 }),
                });
            }
            true
        };
        let mut consistent = true;
        for j in 0..m {
            consistent &= classify(Row::Constraint(j), constraint_lower_bounds[j], constraint_upper_bounds[j]);
        }
        for i in 0..n {
            consistent &= classify(Row::Variable(i), variable_lower_bounds[i], variable_upper_bounds[i]);
        }
        if !consistent {
            direction.status = SubproblemStatus::Infeasible;
            return;
        }
        let p = equalities.len();

        // primal start: the caller's point clamped into the box
        let mut d = vec![0.0; n];
        d[..n].copy_from_slice(&initial_point[..n]);
        for i in 0..n {
            if is_finite(variable_lower_bounds[i]) {
                d[i] = d[i].max(variable_lower_bounds[i]);
            }
            if is_finite(variable_upper_bounds[i]) {
                d[i] = d[i].min(variable_upper_bounds[i]);
            }
        }
        for (row, target) in &equalities {
            if let Row::Variable(i) = row {
                d[*i] = *target;
            }
        }
        let mut y = vec![0.0; p];
        for ineq in &mut inequalities {
            let value = row_value(ineq.row, jacobian, &d);
            if let Some(side) = &mut ineq.lower {
                side.slack = (value - side.bound).max(1.0);
            }
            if let Some(side) = &mut ineq.upper {
                side.slack = (side.bound - value).max(1.0);
            }
        }

        let gradient_scale = 1.0 + norm_inf(&g);
        let mut status = SubproblemStatus::Error;
        let mut primal_error = f64::INFINITY;

        for iteration in 0..MAX_ITERATIONS {
            // residuals
            let mut r_dual = vec![0.0; n];
            for i in 0..n {
                r_dual[i] = g[i];
                for k in 0..n {
                    r_dual[i] += h[(i, k)] * d[k];
                }
            }
            for (index, (row, _)) in equalities.iter().enumerate() {
                row_add(*row, jacobian, y[index], &mut r_dual);
            }
            for ineq in &inequalities {
                let mut coefficient = 0.0;
                if let Some(side) = &ineq.lower {
                    coefficient -= side.dual;
                }
                if let Some(side) = &ineq.upper {
                    coefficient += side.dual;
                }
                row_add(ineq.row, jacobian, coefficient, &mut r_dual);
            }

            let mut r_eq = vec![0.0; p];
            for (index, (row, target)) in equalities.iter().enumerate() {
                r_eq[index] = row_value(*row, jacobian, &d) - target;
            }

            let mut complementarity_sum = 0.0;
            let mut number_sides = 0usize;
            primal_error = norm_inf(&r_eq);
            for ineq in &inequalities {
                let value = row_value(ineq.row, jacobian, &d);
                if let Some(side) = &ineq.lower {
                    primal_error = primal_error.max((value - side.slack - side.bound).abs());
                    complementarity_sum += side.slack * side.dual;
                    number_sides += 1;
                }
                if let Some(side) = &ineq.upper {
                    primal_error = primal_error.max((value + side.slack - side.bound).abs());
                    complementarity_sum += side.slack * side.dual;
                    number_sides += 1;
                }
            }
            let mu = if number_sides == 0 { 0.0 } else { complementarity_sum / number_sides as f64 };
            let dual_error = norm_inf(&r_dual);

            if primal_error <= TOLERANCE * gradient_scale
                && dual_error <= TOLERANCE * gradient_scale
                && mu <= TOLERANCE * gradient_scale
            {
                status = SubproblemStatus::Optimal;
                break;
            }
            if norm_inf(&d) > DIVERGENCE_THRESHOLD {
                status = SubproblemStatus::Unbounded;
                break;
            }

            // condensed Newton system on (Δd, Δy)
            let sigma_mu = CENTERING * mu;
            let mut kkt = DMatrix::<f64>::zeros(n + p, n + p);
            kkt.view_mut((0, 0), (n, n)).copy_from(&h);
            let mut rhs = DVector::<f64>::zeros(n + p);
            for i in 0..n {
                rhs[i] = -r_dual[i];
            }
            for ineq in &inequalities {
                let value = row_value(ineq.row, jacobian, &d);
                let mut weight = 0.0;
                let mut shift = 0.0;
                if let Some(side) = &ineq.lower {
                    let residual = value - side.slack - side.bound;
                    weight += side.dual / side.slack;
                    shift -= sigma_mu / side.slack - side.dual - (side.dual / side.slack) * residual;
                }
                if let Some(side) = &ineq.upper {
                    let residual = value + side.slack - side.bound;
                    weight += side.dual / side.slack;
                    shift += sigma_mu / side.slack - side.dual + (side.dual / side.slack) * residual;
                }
                match ineq.row {
                    Row::Variable(i) => {
                        kkt[(i, i)] += weight;
                        rhs[i] -= shift;
                    }
                    Row::Constraint(j) => {
                        for (i1, v1) in jacobian[j].iter() {
                            for (i2, v2) in jacobian[j].iter() {
                                kkt[(i1, i2)] += weight * v1 * v2;
                            }
                            rhs[i1] -= shift * v1;
                        }
                    }
                }
            }
            for (index, (row, _)) in equalities.iter().enumerate() {
                match row {
                    Row::Variable(i) => {
                        kkt[(*i, n + index)] = 1.0;
                        kkt[(n + index, *i)] = 1.0;
                    }
                    Row::Constraint(j) => {
                        for (i, v) in jacobian[*j].iter() {
                            kkt[(i, n + index)] += v;
                            kkt[(n + index, i)] += v;
                        }
                    }
                }
                rhs[n + index] = -r_eq[index];
            }

            let Some(step) = kkt.lu().solve(&rhs) else {
                debug!(iteration, "QP Newton system is singular");
                status = SubproblemStatus::Infeasible;
                break;
            };
            let delta_d = &step.as_slice()[..n];

            // recover slack and dual steps, fraction to boundary
            let mut alpha: f64 = 1.0;
            let mut updates: Vec<(usize, bool, f64, f64)> = Vec::with_capacity(2 * inequalities.len());
            for (index, ineq) in inequalities.iter().enumerate() {
                let delta_value = row_value(ineq.row, jacobian, delta_d);
                let value = row_value(ineq.row, jacobian, &d);
                if let Some(side) = &ineq.lower {
                    let residual = value - side.slack - side.bound;
                    let delta_slack = delta_value + residual;
                    let delta_dual = sigma_mu / side.slack - side.dual - (side.dual / side.slack) * delta_slack;
                    if delta_slack < 0.0 {
                        alpha = alpha.min(-FRACTION_TO_BOUNDARY * side.slack / delta_slack);
                    }
                    if delta_dual < 0.0 {
                        alpha = alpha.min(-FRACTION_TO_BOUNDARY * side.dual / delta_dual);
                    }
                    updates.push((index, true, delta_slack, delta_dual));
                }
                if let Some(side) = &ineq.upper {
                    let residual = value + side.slack - side.bound;
                    let delta_slack = -residual - delta_value;
                    let delta_dual = sigma_mu / side.slack - side.dual - (side.dual / side.slack) * delta_slack;
                    if delta_slack < 0.0 {
                        alpha = alpha.min(-FRACTION_TO_BOUNDARY * side.slack / delta_slack);
                    }
                    if delta_dual < 0.0 {
                        alpha = alpha.min(-FRACTION_TO_BOUNDARY * side.dual / delta_dual);
                    }
                    updates.push((index, false, delta_slack, delta_dual));
                }
            }

            for i in 0..n {
                d[i] += alpha * delta_d[i];
            }
            for index in 0..p {
                y[index] += alpha * step[n + index];
            }
            for (index, is_lower, delta_slack, delta_dual) in updates {
                let ineq = &mut inequalities[index];
                let side = if is_lower { &mut ineq.lower } else { &mut ineq.upper };
                let side = side.as_mut().expect("update recorded for an existing side");
                side.slack += alpha * delta_slack;
                side.dual += alpha * delta_dual;
            }
        }

        if status == SubproblemStatus::Error && primal_error > INFEASIBILITY_TOLERANCE * gradient_scale {
            // the primal residual refused to vanish: inconsistent linearization
            status = SubproblemStatus::Infeasible;
        }
        direction.status = status;
        if status != SubproblemStatus::Optimal {
            return;
        }

        // export the solution with the outer sign conventions
        direction.primals[..n].copy_from_slice(&d);
        direction.primals[n..].iter_mut().for_each(|v| *v = 0.0);
        direction.multipliers.reset();
        for (index, (row, _)) in equalities.iter().enumerate() {
            match row {
                Row::Constraint(j) => direction.multipliers.constraints[*j] = -y[index],
                Row::Variable(i) => direction.multipliers.lower_bounds[*i] = -y[index],
            }
        }
        for ineq in &inequalities {
            let lower_dual = ineq.lower.map_or(0.0, |side| side.dual);
            let upper_dual = ineq.upper.map_or(0.0, |side| side.dual);
            match ineq.row {
                Row::Constraint(j) => {
                    direction.multipliers.constraints[j] = lower_dual - upper_dual;
                }
                Row::Variable(i) => {
                    direction.multipliers.lower_bounds[i] = lower_dual;
                    direction.multipliers.upper_bounds[i] = -upper_dual;
                }
            }
        }
        direction.norm = norm_inf(&direction.primals[..n]);
        direction.primal_dual_step_length = 1.0;
        direction.bound_dual_step_length = 1.0;
        let mut h_d = vec![0.0; n];
        for i in 0..n {
            for k in 0..n {
                h_d[i] += h[(i, k)] * d[k];
            }
        }
        direction.subproblem_objective =
            crate::util::dot(&g, &d) + 0.5 * crate::util::dot(&h_d, &d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::INF;

    fn solve(
        hessian: &SymmetricMatrix,
        gradient: &SparseVector,
        jacobian: &[SparseVector],
        bounds: (&[f64], &[f64], &[f64], &[f64]),
        n: usize,
        m: usize,
    ) -> Direction {
        let mut solver = DenseQpSolver::new();
        solver.initialize_memory(n, m);
        let mut direction = Direction::new(n, m);
        let initial = vec![0.0; n];
        solver.solve_qp(
            hessian,
            gradient,
            jacobian,
            bounds.0,
            bounds.1,
            bounds.2,
            bounds.3,
            &initial,
            &WarmstartInformation::whole_problem(),
            &mut direction,
        );
        direction
    }

    #[test]
    fn test_unconstrained_quadratic() {
        // min (d - 3)^2: H = 2, g = -6
        let mut h = SymmetricMatrix::new(1, 1, false);
        h.insert(2.0, 0, 0);
        let mut g = SparseVector::new();
        g.insert(0, -6.0);
        let direction = solve(&h, &g, &[], (&[-INF], &[INF], &[], &[]), 1, 0);
        assert_eq!(direction.status, SubproblemStatus::Optimal);
        assert!((direction.primals[0] - 3.0).abs() < 1e-7);
        assert!((direction.subproblem_objective + 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_equality_constrained() {
        // min d1^2 + d2^2  s.t.  d1 + d2 = 1: solution (0.5, 0.5), lambda = 1
        let mut h = SymmetricMatrix::new(2, 2, false);
        h.insert(2.0, 0, 0);
        h.insert(2.0, 1, 1);
        let g = SparseVector::new();
        let mut row = SparseVector::new();
        row.insert(0, 1.0);
        row.insert(1, 1.0);
        let direction = solve(
            &h,
            &g,
            &[row],
            (&[-INF, -INF], &[INF, INF], &[1.0], &[1.0]),
            2,
            1,
        );
        assert_eq!(direction.status, SubproblemStatus::Optimal);
        assert!((direction.primals[0] - 0.5).abs() < 1e-7);
        assert!((direction.primals[1] - 0.5).abs() < 1e-7);
        assert!((direction.multipliers.constraints[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bound_active() {
        // min d^2 with d >= 1: d = 1, zL = 2
        let mut h = SymmetricMatrix::new(1, 1, false);
        h.insert(2.0, 0, 0);
        let g = SparseVector::new();
        let direction = solve(&h, &g, &[], (&[1.0], &[INF], &[], &[]), 1, 0);
        assert_eq!(direction.status, SubproblemStatus::Optimal);
        assert!((direction.primals[0] - 1.0).abs() < 1e-6);
        assert!((direction.multipliers.lower_bounds[0] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_inconsistent_rows_are_infeasible() {
        // d >= 0.5 and d <= -0.5 cannot hold together
        let mut h = SymmetricMatrix::new(1, 1, false);
        h.insert(2.0, 0, 0);
        let g = SparseVector::new();
        let mut row1 = SparseVector::new();
        row1.insert(0, 1.0);
        let mut row2 = SparseVector::new();
        row2.insert(0, 1.0);
        let direction = solve(
            &h,
            &g,
            &[row1, row2],
            (&[-INF], &[INF], &[0.5, -INF], &[INF, -0.5]),
            1,
            2,
        );
        assert_eq!(direction.status, SubproblemStatus::Infeasible);
    }
}
