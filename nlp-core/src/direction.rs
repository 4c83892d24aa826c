//! Search directions and warmstart bookkeeping.

use crate::iterate::Multipliers;

/// Outcome of a subproblem solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubproblemStatus {
    /// The subproblem was solved to optimality.
    Optimal,
    /// The linearized constraints are provably inconsistent.
    Infeasible,
    /// The linearized objective is unbounded below on the feasible set.
    Unbounded,
    /// The subproblem solver returned an unexpected status.
    Error,
}

/// Primal-dual search direction produced by an inequality-handling method.
///
/// Multiplier entries are displacements (new minus current), never absolute
/// values.
#[derive(Debug, Clone)]
pub struct Direction {
    pub primals: Vec<f64>,
    pub multipliers: Multipliers,
    /// Fraction-to-boundary step length for primals and constraint
    /// multipliers; 1 for methods without an interior to protect.
    pub primal_dual_step_length: f64,
    /// Fraction-to-boundary step length for bound multipliers.
    pub bound_dual_step_length: f64,
    /// Model value of the subproblem objective at the direction.
    pub subproblem_objective: f64,
    /// Infinity norm of the primal step.
    pub norm: f64,
    pub status: SubproblemStatus,
}

impl Direction {
    pub fn new(number_variables: usize, number_constraints: usize) -> Self {
        Direction {
            primals: vec![0.0; number_variables],
            multipliers: Multipliers::new(number_variables, number_constraints),
            primal_dual_step_length: 1.0,
            bound_dual_step_length: 1.0,
            subproblem_objective: 0.0,
            norm: 0.0,
            status: SubproblemStatus::Optimal,
        }
    }

    /// Zero the direction and restore the default step lengths.
    pub fn reset(&mut self) {
        self.primals.fill(0.0);
        self.multipliers.reset();
        self.primal_dual_step_length = 1.0;
        self.bound_dual_step_length = 1.0;
        self.subproblem_objective = 0.0;
        self.norm = 0.0;
        self.status = SubproblemStatus::Optimal;
    }
}

/// What changed since the previous subproblem solve. Every method treats the
/// bits as authoritative; callers set exactly the bits describing their
/// change. With no bit set, a solve is a no-op returning the cached
/// direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmstartInformation {
    pub objective_changed: bool,
    pub constraints_changed: bool,
    pub variable_bounds_changed: bool,
    pub constraint_bounds_changed: bool,
    pub jacobian_sparsity_changed: bool,
    pub hessian_sparsity_changed: bool,
}

impl WarmstartInformation {
    /// Everything changed, sparsity included: forces a cold start.
    pub fn whole_problem() -> Self {
        WarmstartInformation {
            objective_changed: true,
            constraints_changed: true,
            variable_bounds_changed: true,
            constraint_bounds_changed: true,
            jacobian_sparsity_changed: true,
            hessian_sparsity_changed: true,
        }
    }

    /// A new iterate was accepted: all values changed, the sparsity did not.
    pub fn new_iterate() -> Self {
        WarmstartInformation {
            objective_changed: true,
            constraints_changed: true,
            variable_bounds_changed: true,
            constraint_bounds_changed: true,
            jacobian_sparsity_changed: false,
            hessian_sparsity_changed: false,
        }
    }

    /// Only the variable bounds moved (trust-region radius update).
    pub fn only_variable_bounds_changed() -> Self {
        WarmstartInformation {
            variable_bounds_changed: true,
            ..WarmstartInformation::default()
        }
    }

    pub fn no_changes(&self) -> bool {
        !(self.objective_changed
            || self.constraints_changed
            || self.variable_bounds_changed
            || self.constraint_bounds_changed
            || self.jacobian_sparsity_changed
            || self.hessian_sparsity_changed)
    }

    pub fn sparsity_changed(&self) -> bool {
        self.jacobian_sparsity_changed || self.hessian_sparsity_changed
    }

    pub fn clear(&mut self) {
        *self = WarmstartInformation::default();
    }
}
