//! The model interface consumed by the solver, and the slack reformulation
//! that presents any model as an equality-constrained one.
//!
//! A model evaluates f, ∇f, c, ∇c and ∇²L on demand and reports constant
//! metadata (dimensions, bounds, nonzero counts) used for preallocation.
//! Evaluation callbacks may receive a primal slice longer than
//! `number_variables()`; they must only read their own entries.

use crate::linalg::sparse_vector::SparseVector;
use crate::linalg::symmetric::SymmetricMatrix;
use crate::util::{is_finite, norm_of, Norm};

/// User-provided optimization model:
///
/// ```text
/// minimize  f(x)   subject to   cL <= c(x) <= cU,   xL <= x <= xU.
/// ```
///
/// The Lagrangian convention is L(x, σ, λ) = σ f(x) − λᵀc(x) − zLᵀ(x − xL)
/// − zUᵀ(xU − x); `evaluate_lagrangian_hessian` must follow it.
pub trait Model {
    fn number_variables(&self) -> usize;
    fn number_constraints(&self) -> usize;

    /// Lower bound of a variable, `-INF` when absent.
    fn variable_lower_bound(&self, variable_index: usize) -> f64;
    /// Upper bound of a variable, `INF` when absent.
    fn variable_upper_bound(&self, variable_index: usize) -> f64;
    /// Lower bound of a constraint, `-INF` when absent.
    fn constraint_lower_bound(&self, constraint_index: usize) -> f64;
    /// Upper bound of a constraint, `INF` when absent.
    fn constraint_upper_bound(&self, constraint_index: usize) -> f64;

    fn evaluate_objective(&self, x: &[f64]) -> f64;
    /// Write the objective gradient as a sparse index→value mapping.
    fn evaluate_objective_gradient(&self, x: &[f64], gradient: &mut SparseVector);
    /// Write the constraint values into a dense vector.
    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]);
    /// Write the constraint Jacobian, one sparse row per constraint.
    fn evaluate_constraint_jacobian(&self, x: &[f64], jacobian: &mut [SparseVector]);
    /// Write the Lagrangian Hessian ∇²L(x, σ, λ), upper triangle only.
    fn evaluate_lagrangian_hessian(
        &self,
        x: &[f64],
        objective_multiplier: f64,
        multipliers: &[f64],
        hessian: &mut SymmetricMatrix,
    );

    /// Constant across calls; used for preallocation.
    fn number_objective_gradient_nonzeros(&self) -> usize {
        self.number_variables()
    }
    /// Constant across calls; used for preallocation.
    fn number_jacobian_nonzeros(&self) -> usize;
    /// Constant across calls; used for preallocation.
    fn number_hessian_nonzeros(&self) -> usize;

    /// Whether a constraint is linear in x. Used only by optional
    /// preprocessing; defaults to treating everything as nonlinear.
    fn constraint_is_linear(&self, _constraint_index: usize) -> bool {
        false
    }

    /// Initial primal point supplied by the modeler.
    fn initial_primal_point(&self, x: &mut [f64]);
    /// Initial constraint multipliers; zero by default.
    fn initial_dual_point(&self, multipliers: &mut [f64]) {
        multipliers.fill(0.0);
    }

    /// Pairs (constraint index, slack variable index) introduced by a slack
    /// reformulation. Empty for plain models.
    fn slacks(&self) -> &[(usize, usize)] {
        &[]
    }
}

/// Constraint violation of `constraints` against the model's bounds.
pub fn constraint_violation(model: &dyn Model, constraints: &[f64], norm: Norm) -> f64 {
    norm_of(
        norm,
        (0..model.number_constraints()).map(|j| {
            let value = constraints[j];
            let below = (model.constraint_lower_bound(j) - value).max(0.0);
            let above = (value - model.constraint_upper_bound(j)).max(0.0);
            below.max(above)
        }),
    )
}

/// Index sets derived from a model's metadata, computed once per solve.
#[derive(Debug, Clone, Default)]
pub struct BoundedSets {
    pub lower_bounded_variables: Vec<usize>,
    pub upper_bounded_variables: Vec<usize>,
    pub single_lower_bounded_variables: Vec<usize>,
    pub single_upper_bounded_variables: Vec<usize>,
    pub equality_constraints: Vec<usize>,
    pub inequality_constraints: Vec<usize>,
}

impl BoundedSets {
    pub fn from_model(model: &dyn Model) -> Self {
        let mut sets = BoundedSets::default();
        for i in 0..model.number_variables() {
            let lower = is_finite(model.variable_lower_bound(i));
            let upper = is_finite(model.variable_upper_bound(i));
            if lower {
                sets.lower_bounded_variables.push(i);
                if !upper {
                    sets.single_lower_bounded_variables.push(i);
                }
            }
            if upper {
                sets.upper_bounded_variables.push(i);
                if !lower {
                    sets.single_upper_bounded_variables.push(i);
                }
            }
        }
        for j in 0..model.number_constraints() {
            let lower = model.constraint_lower_bound(j);
            let upper = model.constraint_upper_bound(j);
            if is_finite(lower) && lower == upper {
                sets.equality_constraints.push(j);
            } else {
                sets.inequality_constraints.push(j);
            }
        }
        sets
    }
}

/// Slack reformulation: wraps a model so that every inequality constraint
/// c_j(x) becomes the equality c_j(x) − s_j = 0 with the constraint bounds
/// moved onto the slack variable s_j. All constraints of the reformulated
/// model are equalities with bounds [0, 0].
pub struct EqualityConstrainedModel<'a> {
    inner: &'a dyn Model,
    /// (constraint index, slack variable index), one per inequality constraint
    slack_pairs: Vec<(usize, usize)>,
    /// slack index of constraint j, if any
    slack_of_constraint: Vec<Option<usize>>,
}

impl<'a> EqualityConstrainedModel<'a> {
    pub fn new(inner: &'a dyn Model) -> Self {
        let n = inner.number_variables();
        let mut slack_pairs = Vec::new();
        let mut slack_of_constraint = vec![None; inner.number_constraints()];
        for j in 0..inner.number_constraints() {
            let lower = inner.constraint_lower_bound(j);
            let upper = inner.constraint_upper_bound(j);
            let is_equality = is_finite(lower) && lower == upper;
            if !is_equality {
                let slack_index = n + slack_pairs.len();
                slack_of_constraint[j] = Some(slack_index);
                slack_pairs.push((j, slack_index));
            }
        }
        EqualityConstrainedModel {
            inner,
            slack_pairs,
            slack_of_constraint,
        }
    }

    fn shift_of_constraint(&self, j: usize) -> f64 {
        // equality constraints are shifted to zero; slacked ones subtract s_j
        if self.slack_of_constraint[j].is_none() {
            self.inner.constraint_lower_bound(j)
        } else {
            0.0
        }
    }
}

impl Model for EqualityConstrainedModel<'_> {
    fn number_variables(&self) -> usize {
        self.inner.number_variables() + self.slack_pairs.len()
    }

    fn number_constraints(&self) -> usize {
        self.inner.number_constraints()
    }

    fn variable_lower_bound(&self, variable_index: usize) -> f64 {
        if variable_index < self.inner.number_variables() {
            self.inner.variable_lower_bound(variable_index)
        } else {
            let (j, _) = self.slack_pairs[variable_index - self.inner.number_variables()];
            self.inner.constraint_lower_bound(j)
        }
    }

    fn variable_upper_bound(&self, variable_index: usize) -> f64 {
        if variable_index < self.inner.number_variables() {
            self.inner.variable_upper_bound(variable_index)
        } else {
            let (j, _) = self.slack_pairs[variable_index - self.inner.number_variables()];
            self.inner.constraint_upper_bound(j)
        }
    }

    fn constraint_lower_bound(&self, _constraint_index: usize) -> f64 {
        0.0
    }

    fn constraint_upper_bound(&self, _constraint_index: usize) -> f64 {
        0.0
    }

    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        self.inner.evaluate_objective(x)
    }

    fn evaluate_objective_gradient(&self, x: &[f64], gradient: &mut SparseVector) {
        self.inner.evaluate_objective_gradient(x, gradient);
    }

    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) {
        self.inner.evaluate_constraints(x, constraints);
        for j in 0..self.inner.number_constraints() {
            match self.slack_of_constraint[j] {
                Some(slack_index) => constraints[j] -= x[slack_index],
                None => constraints[j] -= self.shift_of_constraint(j),
            }
        }
    }

    fn evaluate_constraint_jacobian(&self, x: &[f64], jacobian: &mut [SparseVector]) {
        self.inner.evaluate_constraint_jacobian(x, jacobian);
        for &(j, slack_index) in &self.slack_pairs {
            jacobian[j].insert(slack_index, -1.0);
        }
    }

    fn evaluate_lagrangian_hessian(
        &self,
        x: &[f64],
        objective_multiplier: f64,
        multipliers: &[f64],
        hessian: &mut SymmetricMatrix,
    ) {
        // slacks are linear: they contribute nothing to the Hessian
        self.inner
            .evaluate_lagrangian_hessian(x, objective_multiplier, multipliers, hessian);
    }

    fn number_objective_gradient_nonzeros(&self) -> usize {
        self.inner.number_objective_gradient_nonzeros()
    }

    fn number_jacobian_nonzeros(&self) -> usize {
        self.inner.number_jacobian_nonzeros() + self.slack_pairs.len()
    }

    fn number_hessian_nonzeros(&self) -> usize {
        self.inner.number_hessian_nonzeros()
    }

    fn constraint_is_linear(&self, constraint_index: usize) -> bool {
        self.inner.constraint_is_linear(constraint_index)
    }

    fn initial_primal_point(&self, x: &mut [f64]) {
        self.inner.initial_primal_point(&mut x[..self.inner.number_variables()]);
        for &(_, slack_index) in &self.slack_pairs {
            x[slack_index] = 0.0;
        }
    }

    fn initial_dual_point(&self, multipliers: &mut [f64]) {
        self.inner.initial_dual_point(multipliers);
    }

    fn slacks(&self) -> &[(usize, usize)] {
        &self.slack_pairs
    }
}

/// Number of elastic variables an ℓ1 relaxation of this model introduces:
/// one per finite constraint bound side.
pub fn count_elastic_variables(model: &dyn Model) -> usize {
    let mut count = 0;
    for j in 0..model.number_constraints() {
        if is_finite(model.constraint_upper_bound(j)) {
            count += 1;
        }
        if is_finite(model.constraint_lower_bound(j)) {
            count += 1;
        }
    }
    count
}

/// Sanity-check a model's metadata before the solve begins.
pub fn validate(model: &dyn Model) -> Result<(), crate::error::SolverError> {
    for i in 0..model.number_variables() {
        if model.variable_upper_bound(i) < model.variable_lower_bound(i) {
            return Err(crate::error::SolverError::Configuration(format!(
                "variable {i} has upper bound below its lower bound"
            )));
        }
    }
    for j in 0..model.number_constraints() {
        if model.constraint_upper_bound(j) < model.constraint_lower_bound(j) {
            return Err(crate::error::SolverError::Configuration(format!(
                "constraint {j} has upper bound below its lower bound"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::INF;

    struct ToyModel;

    impl Model for ToyModel {
        fn number_variables(&self) -> usize {
            1
        }
        fn number_constraints(&self) -> usize {
            2
        }
        fn variable_lower_bound(&self, _: usize) -> f64 {
            -INF
        }
        fn variable_upper_bound(&self, _: usize) -> f64 {
            INF
        }
        fn constraint_lower_bound(&self, j: usize) -> f64 {
            [1.0, -INF][j]
        }
        fn constraint_upper_bound(&self, j: usize) -> f64 {
            [1.0, 2.0][j]
        }
        fn evaluate_objective(&self, x: &[f64]) -> f64 {
            x[0]
        }
        fn evaluate_objective_gradient(&self, _: &[f64], gradient: &mut SparseVector) {
            gradient.clear();
            gradient.insert(0, 1.0);
        }
        fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) {
            constraints[0] = x[0];
            constraints[1] = 2.0 * x[0];
        }
        fn evaluate_constraint_jacobian(&self, _: &[f64], jacobian: &mut [SparseVector]) {
            jacobian[0].clear();
            jacobian[0].insert(0, 1.0);
            jacobian[1].clear();
            jacobian[1].insert(0, 2.0);
        }
        fn evaluate_lagrangian_hessian(
            &self,
            _: &[f64],
            _: f64,
            _: &[f64],
            _: &mut SymmetricMatrix,
        ) {
        }
        fn number_jacobian_nonzeros(&self) -> usize {
            2
        }
        fn number_hessian_nonzeros(&self) -> usize {
            0
        }
        fn initial_primal_point(&self, x: &mut [f64]) {
            x[0] = 0.0;
        }
    }

    #[test]
    fn test_slack_reformulation() {
        let model = ToyModel;
        let reformulated = EqualityConstrainedModel::new(&model);
        // constraint 0 is an equality, constraint 1 gets a slack
        assert_eq!(reformulated.number_variables(), 2);
        assert_eq!(reformulated.slacks(), &[(1, 1)]);
        assert_eq!(reformulated.variable_lower_bound(1), -INF);
        assert_eq!(reformulated.variable_upper_bound(1), 2.0);
        assert_eq!(reformulated.constraint_lower_bound(0), 0.0);
        assert_eq!(reformulated.constraint_upper_bound(1), 0.0);

        // constraint values: c0 shifted by its bound, c1 minus slack
        let x = [3.0, 5.0];
        let mut constraints = [0.0; 2];
        reformulated.evaluate_constraints(&x, &mut constraints);
        assert_eq!(constraints[0], 3.0 - 1.0);
        assert_eq!(constraints[1], 6.0 - 5.0);

        let mut jacobian = [SparseVector::new(), SparseVector::new()];
        reformulated.evaluate_constraint_jacobian(&x, &mut jacobian);
        let row1: Vec<_> = jacobian[1].iter().collect();
        assert_eq!(row1, vec![(0, 2.0), (1, -1.0)]);
    }

    #[test]
    fn test_elastic_count() {
        let model = ToyModel;
        // constraint 0: two finite sides; constraint 1: one finite side
        assert_eq!(count_elastic_variables(&model), 3);
    }
}
