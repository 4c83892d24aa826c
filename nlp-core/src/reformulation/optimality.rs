//! The optimality view: the model itself, with σ = 1.

use crate::error::SolverResult;
use crate::iterate::{Evaluations, Iterate, LagrangianGradient, Multipliers};
use crate::linalg::sparse_vector::SparseVector;
use crate::linalg::symmetric::SymmetricMatrix;
use crate::model::{BoundedSets, Model};
use crate::reformulation::OptimizationProblem;
use crate::util::{norm_of, Norm};

pub struct OptimalityProblem<'a> {
    model: &'a dyn Model,
    sets: BoundedSets,
}

impl<'a> OptimalityProblem<'a> {
    pub fn new(model: &'a dyn Model) -> Self {
        OptimalityProblem {
            model,
            sets: BoundedSets::from_model(model),
        }
    }
}

impl OptimizationProblem for OptimalityProblem<'_> {
    fn model(&self) -> &dyn Model {
        self.model
    }

    fn number_variables(&self) -> usize {
        self.model.number_variables()
    }

    fn number_constraints(&self) -> usize {
        self.model.number_constraints()
    }

    fn objective_multiplier(&self) -> f64 {
        1.0
    }

    fn variable_lower_bound(&self, variable_index: usize) -> f64 {
        self.model.variable_lower_bound(variable_index)
    }

    fn variable_upper_bound(&self, variable_index: usize) -> f64 {
        self.model.variable_upper_bound(variable_index)
    }

    fn constraint_lower_bound(&self, constraint_index: usize) -> f64 {
        self.model.constraint_lower_bound(constraint_index)
    }

    fn constraint_upper_bound(&self, constraint_index: usize) -> f64 {
        self.model.constraint_upper_bound(constraint_index)
    }

    fn lower_bounded_variables(&self) -> &[usize] {
        &self.sets.lower_bounded_variables
    }

    fn upper_bounded_variables(&self) -> &[usize] {
        &self.sets.upper_bounded_variables
    }

    fn single_lower_bounded_variables(&self) -> &[usize] {
        &self.sets.single_lower_bounded_variables
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
        iterate.evaluate_objective_gradient(self.model)?;
        gradient.copy_from(&iterate.evaluations.objective_gradient);
        Ok(())
    }

    fn evaluate_constraints(&self, iterate: &mut Iterate, constraints: &mut [f64]) -> SolverResult<()> {
        iterate.evaluate_constraints(self.model)?;
        let m = self.number_constraints();
        constraints[..m].copy_from_slice(&iterate.evaluations.constraints[..m]);
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
        Ok(())
    }

    fn evaluate_lagrangian_hessian(&self, x: &[f64], multipliers: &[f64], hessian: &mut SymmetricMatrix) {
        self.model
            .evaluate_lagrangian_hessian(x, self.objective_multiplier(), multipliers, hessian);
    }

    fn number_objective_gradient_nonzeros(&self) -> usize {
        self.model.number_objective_gradient_nonzeros()
    }

    fn number_jacobian_nonzeros(&self) -> usize {
        self.model.number_jacobian_nonzeros()
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
        let n = self.number_variables();
        gradient.objective_contribution[..n].fill(0.0);
        gradient.constraints_contribution[..n].fill(0.0);
        evaluations
            .objective_gradient
            .add_into(&mut gradient.objective_contribution, 1.0);
        for (j, row) in evaluations.constraint_jacobian.iter().enumerate() {
            let multiplier = multipliers.constraints[j];
            if multiplier != 0.0 {
                row.add_into(&mut gradient.constraints_contribution, -multiplier);
            }
        }
        for i in 0..n {
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
        let variable_terms = (0..self.number_variables()).map(|i| {
            if multipliers.lower_bounds[i] > 0.0 {
                multipliers.lower_bounds[i] * (primals[i] - self.variable_lower_bound(i)) - shift_value
            } else if multipliers.upper_bounds[i] < 0.0 {
                multipliers.upper_bounds[i] * (primals[i] - self.variable_upper_bound(i)) - shift_value
            } else {
                0.0
            }
        });
        let constraint_terms = (0..self.number_constraints()).map(|j| {
            let multiplier = multipliers.constraints[j];
            if multiplier > 0.0 {
                multiplier * (constraints[j] - self.constraint_lower_bound(j))
            } else if multiplier < 0.0 {
                multiplier * (constraints[j] - self.constraint_upper_bound(j))
            } else {
                0.0
            }
        });
        norm_of(norm, variable_terms.chain(constraint_terms))
    }
}
