//! Constraint relaxation: translate the nonlinear problem into a sequence of
//! well-posed subproblems.
//!
//! The canonical strategy is feasibility restoration: solve the optimality
//! view until a subproblem turns out infeasible (or the mechanism runs out of
//! step length), then minimize the ℓ1 constraint violation through the
//! elastic-relaxed view until the infeasibility is sufficiently reduced, and
//! switch back.

pub mod feasibility_restoration;

pub use feasibility_restoration::FeasibilityRestoration;

/// First-order status of an iterate, checked after every acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterateStatus {
    FeasibleKktPoint,
    InfeasibleStationaryPoint,
    Unbounded,
    NotOptimal,
}
