//! Error types for the solver core.
//!
//! Only fatal conditions are expressed as Rust errors; recoverable subproblem
//! outcomes (infeasible or unbounded linearizations, solver hiccups) travel as
//! a status on the computed direction and are handled inside the outer loop.

use thiserror::Error;

/// Fatal errors that unwind the solve and are reported to the caller.
#[derive(Error, Debug)]
pub enum SolverError {
    /// Unknown option, unparsable value or unsupported ingredient combination.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A preallocation estimate reported by the model was insufficient.
    #[error("allocation error: {0}")]
    Allocation(String),

    /// The inertia correction grew past its failure threshold.
    #[error("unstable regularization: factor exceeded {threshold:e}")]
    UnstableRegularization {
        /// Configured failure threshold for the regularization factor.
        threshold: f64,
    },

    /// The user model produced a NaN or infinite value.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// The subproblem solver failed several times in a row.
    #[error("subproblem solver failed {count} consecutive times")]
    RepeatedSubproblemFailure {
        /// Number of consecutive failures observed.
        count: usize,
    },

    /// The step length or trust-region radius fell below its minimum while
    /// already restoring feasibility.
    #[error("step length below minimum in restoration phase")]
    StepLengthTooSmall,
}

/// Result alias used throughout the crate.
pub type SolverResult<T> = Result<T, SolverError>;
