//! A composable solver core for smooth nonlinear optimization
//!
//! ```text
//! minimize  f(x)   subject to   cL <= c(x) <= cU,   xL <= x <= xU,
//! ```
//!
//! with f and c twice differentiable but not necessarily convex. Four
//! independent ingredients compose into one outer iteration:
//!
//! - an **inequality-handling method** computes primal-dual search
//!   directions (sequential QP or primal-dual interior point),
//! - a **constraint-relaxation strategy** keeps every subproblem well-posed
//!   (feasibility restoration over an ℓ1-relaxed view),
//! - a **globalization strategy** accepts or rejects trial iterates
//!   (Fletcher filter or ℓ1 merit function),
//! - a **globalization mechanism** parameterizes the trial step
//!   (backtracking line search or trust region).
//!
//! The driver advances the unique working iterate toward a first-order KKT
//! point, or a stationary point of the constraint violation when the problem
//! is locally infeasible.
//!
//! # Example
//!
//! ```ignore
//! use nlp_core::{solve, Options};
//!
//! let options = Options::default()
//!     .with("inequality_handling_method", "primal_dual_IPM")
//!     .with("globalization_strategy", "l1_merit_function");
//! let result = solve(&my_model, &options)?;
//! println!("{}: x = {:?}", result.status, result.primals);
//! ```

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // primal-dual plumbing needs many parameters

pub mod direction;
pub mod driver;
pub mod error;
pub mod globalization_mechanism;
pub mod globalization_strategy;
pub mod hessian;
pub mod inequality_handling;
pub mod iterate;
pub mod linalg;
pub mod model;
pub mod options;
pub mod reformulation;
pub mod regularization;
pub mod relaxation;
pub mod util;

pub use direction::{Direction, SubproblemStatus, WarmstartInformation};
pub use driver::{minimize, solve, NoUserCallbacks, SolveResult, TerminationStatus, UserCallbacks};
pub use error::{SolverError, SolverResult};
pub use iterate::{Iterate, Multipliers, ProgressMeasures};
pub use model::{EqualityConstrainedModel, Model};
pub use options::Options;
