//! The ℓ1-relaxed view used by the feasibility-restoration phase.
//!
//! Every finite constraint bound side receives a nonnegative elastic
//! variable: a "positive" elastic p capturing violation above the upper
//! bound (Jacobian coefficient −1) and a "negative" elastic n capturing
//! violation below the lower bound (coefficient +1). With σ = 0 the view's
//! objective is ρ·Σ(p + n), the ℓ1 constraint violation.

use crate::error::SolverResult;
use crate::iterate::{Evaluations, Iterate, LagrangianGradient, Multipliers};
use crate::linalg::sparse_vector::SparseVector;
use crate::linalg::symmetric::SymmetricMatrix;
use crate::model::{BoundedSets, Model};
use crate::reformulation::OptimizationProblem;
use crate::util::{is_finite, norm_of, Norm, INF};

/// Elastic variable bookkeeping: (constraint index, elastic variable index).
#[derive(Debug, Clone, Default)]
pub struct ElasticVariables {
    pub positive: Vec<(usize, usize)>,
    pub negative: Vec<(usize, usize)>,
}

impl ElasticVariables {
    pub fn len(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}

pub struct L1RelaxedProblem<'a> {
    model: &'a dyn Model,
    objective_multiplier: f64,
    constraint_violation_coefficient: f64,
    elastic_variables: ElasticVariables,
    // model sets extended with the elastics (all lower-bounded by zero, no
    // upper bound)
    lower_bounded_variables: Vec<usize>,
    single_lower_bounded_variables: Vec<usize>,
    sets: BoundedSets,
}

impl<'a> L1RelaxedProblem<'a> {
    pub fn new(
        model: &'a dyn Model,
        objective_multiplier: f64,
        constraint_violation_coefficient: f64,
    ) -> Self {
        let sets = BoundedSets::from_model(model);
        let mut elastic_variables = ElasticVariables::default();
        let mut elastic_index = model.number_variables();
        for j in 0..model.number_constraints() {
            if is_finite(model.constraint_upper_bound(j)) {
                elastic_variables.positive.push((j, elastic_index));
                elastic_index += 1;
            }
            if is_finite(model.constraint_lower_bound(j)) {
                elastic_variables.negative.push((j, elastic_index));
                elastic_index += 1;
            }
        }
        let elastic_range =
            model.number_variables()..model.number_variables() + elastic_variables.len();
        let mut lower_bounded_variables = sets.lower_bounded_variables.clone();
        lower_bounded_variables.extend(elastic_range.clone());
        let mut single_lower_bounded_variables = sets.single_lower_bounded_variables.clone();
        single_lower_bounded_variables.extend(elastic_range);

        L1RelaxedProblem {
            model,
            objective_multiplier,
            constraint_violation_coefficient,
            elastic_variables,
            lower_bounded_variables,
            single_lower_bounded_variables,
            sets,
        }
    }

    pub fn elastic_variables(&self) -> &ElasticVariables {
        &self.elastic_variables
    }

    pub fn constraint_violation_coefficient(&self) -> f64 {
        self.constraint_violation_coefficient
    }

    pub fn set_objective_multiplier(&mut self, objective_multiplier: f64) {
        debug_assert!(0.0 <= objective_multiplier);
        self.objective_multiplier = objective_multiplier;
    }

    /// Resize the iterate and let the method set each elastic variable (and
    /// its duals). The closure receives (iterate, constraint index, elastic
    /// index, Jacobian coefficient) with coefficient −1 for positive and +1
    /// for negative elastics.
    pub fn set_elastic_variable_values(
        &self,
        iterate: &mut Iterate,
        mut elastic_setting_function: impl FnMut(&mut Iterate, usize, usize, f64),
    ) {
        iterate.set_number_variables(self.number_variables());
        for &(constraint_index, elastic_index) in &self.elastic_variables.positive {
            elastic_setting_function(iterate, constraint_index, elastic_index, -1.0);
        }
        for &(constraint_index, elastic_index) in &self.elastic_variables.negative {
            elastic_setting_function(iterate, constraint_index, elastic_index, 1.0);
        }
    }
}

impl OptimizationProblem for L1RelaxedProblem<'_> {
    fn model(&self) -> &dyn Model {
        self.model
    }

    fn number_variables(&self) -> usize {
        self.model.number_variables() + self.elastic_variables.len()
    }

    fn number_constraints(&self) -> usize {
        self.model.number_constraints()
    }

    fn objective_multiplier(&self) -> f64 {
        self.objective_multiplier
    }

    fn variable_lower_bound(&self, variable_index: usize) -> f64 {
        if variable_index < self.model.number_variables() {
            self.model.variable_lower_bound(variable_index)
        } else {
            0.0 // elastic variable in [0, +inf)
        }
    }

    fn variable_upper_bound(&self, variable_index: usize) -> f64 {
        if variable_index < self.model.number_variables() {
            self.model.variable_upper_bound(variable_index)
        } else {
            INF
        }
    }

    fn constraint_lower_bound(&self, constraint_index: usize) -> f64 {
        self.model.constraint_lower_bound(constraint_index)
    }

    fn constraint_upper_bound(&self, constraint_index: usize) -> f64 {
        self.model.constraint_upper_bound(constraint_index)
    }

    fn lower_bounded_variables(&self) -> &[usize] {
        &self.lower_bounded_variables
    }

    fn upper_bounded_variables(&self) -> &[usize] {
        // same set as the model
        &self.sets.upper_bounded_variables
    }

    fn single_lower_bounded_variables(&self) -> &[usize] {
        &self.single_lower_bounded_variables
    }

    fn single_upper_bounded_variables(&self) -> &[usize] {
        &self.sets.single_upper_bounded_variables
    }

    fn inequality_constraints(&self) -> &[usize] {
        &self.sets.inequality_constraints
    }

    fn evaluate_objective_gradient(
        &self,
        iterate: &mut Iterate,
        gradient: &mut SparseVector,
    ) -> SolverResult<()> {
        gradient.clear();
        // scale the model gradient by sigma
        if self.objective_multiplier != 0.0 {
            iterate.evaluate_objective_gradient(self.model)?;
            for (index, value) in iterate.evaluations.objective_gradient.iter() {
                gradient.insert(index, self.objective_multiplier * value);
            }
        }
        // elastic contribution
        for &(_, elastic_index) in self
            .elastic_variables
            .positive
            .iter()
            .chain(self.elastic_variables.negative.iter())
        {
            gradient.insert(elastic_index, self.constraint_violation_coefficient);
        }
        Ok(())
    }

    fn evaluate_constraints(&self, iterate: &mut Iterate, constraints: &mut [f64]) -> SolverResult<()> {
        iterate.evaluate_constraints(self.model)?;
        let m = self.number_constraints();
        constraints[..m].copy_from_slice(&iterate.evaluations.constraints[..m]);
        // contribution of the elastics
        for &(constraint_index, elastic_index) in &self.elastic_variables.positive {
            constraints[constraint_index] -= iterate.primals[elastic_index];
        }
        for &(constraint_index, elastic_index) in &self.elastic_variables.negative {
            constraints[constraint_index] += iterate.primals[elastic_index];
        }
        Ok(())
    }

    fn evaluate_constraint_jacobian(
        &self,
        iterate: &mut Iterate,
        jacobian: &mut [SparseVector],
    ) -> SolverResult<()> {
        iterate.evaluate_constraint_jacobian(self.model)?;
        for (out, row) in jacobian.iter_mut().zip(&iterate.evaluations.constraint_jacobian) {
            out.copy_from(row);
        }
        for &(constraint_index, elastic_index) in &self.elastic_variables.positive {
            jacobian[constraint_index].insert(elastic_index, -1.0);
        }
        for &(constraint_index, elastic_index) in &self.elastic_variables.negative {
            jacobian[constraint_index].insert(elastic_index, 1.0);
        }
        Ok(())
    }

    fn evaluate_lagrangian_hessian(&self, x: &[f64], multipliers: &[f64], hessian: &mut SymmetricMatrix) {
        // the elastics are linear: they do not enter the Hessian
        self.model
            .evaluate_lagrangian_hessian(x, self.objective_multiplier, multipliers, hessian);
    }

    fn number_objective_gradient_nonzeros(&self) -> usize {
        let mut number_nonzeros = self.elastic_variables.len();
        if self.objective_multiplier != 0.0 {
            number_nonzeros += self.model.number_objective_gradient_nonzeros();
        }
        number_nonzeros
    }

    fn number_jacobian_nonzeros(&self) -> usize {
        self.model.number_jacobian_nonzeros() + self.elastic_variables.len()
    }

    fn number_hessian_nonzeros(&self) -> usize {
        self.model.number_hessian_nonzeros()
    }

    fn evaluate_lagrangian_gradient(
        &self,
        gradient: &mut LagrangianGradient,
        evaluations: &Evaluations,
        multipliers: &Multipliers,
    ) {
        let total = self.number_variables();
        gradient.resize(total);
        gradient.objective_contribution[..total].fill(0.0);
        gradient.constraints_contribution[..total].fill(0.0);
        evaluations
            .objective_gradient
            .add_into(&mut gradient.objective_contribution, 1.0);
        for (j, row) in evaluations.constraint_jacobian.iter().enumerate() {
            let multiplier = multipliers.constraints[j];
            if multiplier != 0.0 {
                row.add_into(&mut gradient.constraints_contribution, -multiplier);
            }
        }
        // elastic columns: objective coefficient rho (kept out of the
        // sigma-scaled block) minus the constraint contribution
        for &(constraint_index, elastic_index) in &self.elastic_variables.positive {
            gradient.constraints_contribution[elastic_index] +=
                self.constraint_violation_coefficient + multipliers.constraints[constraint_index];
        }
        for &(constraint_index, elastic_index) in &self.elastic_variables.negative {
            gradient.constraints_contribution[elastic_index] +=
                self.constraint_violation_coefficient - multipliers.constraints[constraint_index];
        }
        for i in 0..total {
            gradient.constraints_contribution[i] -=
                multipliers.lower_bounds[i] + multipliers.upper_bounds[i];
        }
    }

    fn complementarity_error(
        &self,
        primals: &[f64],
        constraints: &[f64],
        multipliers: &Multipliers,
        shift_value: f64,
        norm: Norm,
    ) -> f64 {
        let rho = self.constraint_violation_coefficient;
        // complementarity for the model's variable bounds
        let variable_terms = (0..self.model.number_variables()).map(|i| {
            if multipliers.lower_bounds[i] > 0.0 {
                multipliers.lower_bounds[i] * (primals[i] - self.variable_lower_bound(i)) - shift_value
            } else if multipliers.upper_bounds[i] < 0.0 {
                multipliers.upper_bounds[i] * (primals[i] - self.variable_upper_bound(i)) - shift_value
            } else {
                0.0
            }
        });
        // for violated constraints the relaxed problem pins the multiplier at
        // ±rho; the error measures the distance from that value
        let constraint_terms = (0..self.number_constraints()).map(|j| {
            let value = constraints[j];
            let lower = self.constraint_lower_bound(j);
            let upper = self.constraint_upper_bound(j);
            let multiplier = multipliers.constraints[j];
            if value < lower {
                (rho - multiplier) * (value - lower)
            } else if upper < value {
                (rho + multiplier) * (value - upper)
            } else if multiplier > 0.0 {
                multiplier * (value - lower)
            } else if multiplier < 0.0 {
                multiplier * (value - upper)
            } else {
                0.0
            }
        });
        norm_of(norm, variable_terms.chain(constraint_terms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterate::Iterate;
    use crate::linalg::symmetric::SymmetricMatrix;

    struct OneConstraintModel;

    impl Model for OneConstraintModel {
        fn number_variables(&self) -> usize {
            1
        }
        fn number_constraints(&self) -> usize {
            1
        }
        fn variable_lower_bound(&self, _: usize) -> f64 {
            -INF
        }
        fn variable_upper_bound(&self, _: usize) -> f64 {
            INF
        }
        fn constraint_lower_bound(&self, _: usize) -> f64 {
            1.0
        }
        fn constraint_upper_bound(&self, _: usize) -> f64 {
            2.0
        }
        fn evaluate_objective(&self, x: &[f64]) -> f64 {
            x[0]
        }
        fn evaluate_objective_gradient(&self, _: &[f64], gradient: &mut SparseVector) {
            gradient.insert(0, 1.0);
        }
        fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) {
            constraints[0] = x[0];
        }
        fn evaluate_constraint_jacobian(&self, _: &[f64], jacobian: &mut [SparseVector]) {
            jacobian[0].insert(0, 1.0);
        }
        fn evaluate_lagrangian_hessian(&self, _: &[f64], _: f64, _: &[f64], _: &mut SymmetricMatrix) {}
        fn number_jacobian_nonzeros(&self) -> usize {
            1
        }
        fn number_hessian_nonzeros(&self) -> usize {
            0
        }
        fn initial_primal_point(&self, x: &mut [f64]) {
            x[0] = 0.0;
        }
    }

    #[test]
    fn test_elastics_relax_both_sides() {
        let model = OneConstraintModel;
        let problem = L1RelaxedProblem::new(&model, 0.0, 1.0);
        // one positive (upper side) and one negative (lower side) elastic
        assert_eq!(problem.number_variables(), 3);
        assert_eq!(problem.elastic_variables().positive, vec![(0, 1)]);
        assert_eq!(problem.elastic_variables().negative, vec![(0, 2)]);
        assert_eq!(problem.variable_lower_bound(1), 0.0);
        assert_eq!(problem.variable_upper_bound(2), INF);

        let mut iterate = Iterate::new(1, 1);
        iterate.set_number_variables(3);
        iterate.primals.copy_from_slice(&[0.0, 0.25, 0.5]);
        let mut constraints = vec![0.0; 1];
        problem.evaluate_constraints(&mut iterate, &mut constraints).unwrap();
        // c - p + n = 0 - 0.25 + 0.5
        assert_eq!(constraints[0], 0.25);

        let mut gradient = SparseVector::new();
        problem.evaluate_objective_gradient(&mut iterate, &mut gradient).unwrap();
        // sigma = 0: only the elastic coefficients remain
        let entries: Vec<_> = gradient.iter().collect();
        assert_eq!(entries, vec![(1, 1.0), (2, 1.0)]);
    }
}
