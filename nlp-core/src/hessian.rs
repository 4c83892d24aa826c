//! Hessian models.
//!
//! A Hessian model produces the Lagrangian Hessian consumed by the
//! inequality-handling methods, and reports whether the result is guaranteed
//! positive definite (in which case no convexification is needed).

use crate::error::{SolverError, SolverResult};
use crate::linalg::symmetric::SymmetricMatrix;
use crate::reformulation::OptimizationProblem;

pub trait HessianModel {
    /// Evaluate ∇²L(x, σ, λ) of the given problem view into `hessian`.
    fn evaluate(
        &mut self,
        problem: &dyn OptimizationProblem,
        x: &[f64],
        constraint_multipliers: &[f64],
        hessian: &mut SymmetricMatrix,
    );

    /// True when every produced matrix is positive definite by construction.
    fn is_positive_definite(&self) -> bool;

    /// Number of nonzeros the evaluation produces; constant across calls.
    fn number_nonzeros(&self, problem: &dyn OptimizationProblem) -> usize;

    /// Number of evaluations performed so far.
    fn evaluation_count(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Exact Lagrangian Hessian, deferred to the model.
#[derive(Default)]
pub struct ExactHessian {
    evaluation_count: usize,
}

impl HessianModel for ExactHessian {
    fn evaluate(
        &mut self,
        problem: &dyn OptimizationProblem,
        x: &[f64],
        constraint_multipliers: &[f64],
        hessian: &mut SymmetricMatrix,
    ) {
        hessian.reset();
        problem.evaluate_lagrangian_hessian(x, constraint_multipliers, hessian);
        self.evaluation_count += 1;
    }

    fn is_positive_definite(&self) -> bool {
        false
    }

    fn number_nonzeros(&self, problem: &dyn OptimizationProblem) -> usize {
        problem.number_hessian_nonzeros()
    }

    fn evaluation_count(&self) -> usize {
        self.evaluation_count
    }

    fn name(&self) -> &'static str {
        "exact"
    }
}

/// Zero Hessian: turns every quadratic subproblem into an LP.
#[derive(Default)]
pub struct ZeroHessian;

impl HessianModel for ZeroHessian {
    fn evaluate(
        &mut self,
        _problem: &dyn OptimizationProblem,
        _x: &[f64],
        _constraint_multipliers: &[f64],
        hessian: &mut SymmetricMatrix,
    ) {
        hessian.reset();
    }

    fn is_positive_definite(&self) -> bool {
        true
    }

    fn number_nonzeros(&self, _problem: &dyn OptimizationProblem) -> usize {
        0
    }

    fn evaluation_count(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "zero"
    }
}

/// Build a Hessian model from its option value.
pub fn create(name: &str) -> SolverResult<Box<dyn HessianModel>> {
    match name {
        "exact" => Ok(Box::<ExactHessian>::default()),
        "zero" => Ok(Box::<ZeroHessian>::default()),
        other => Err(SolverError::Configuration(format!(
            "unknown hessian_model '{other}'"
        ))),
    }
}
