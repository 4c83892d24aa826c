//! Linear-algebra types and capabilities.
//!
//! Sparse vectors and COO symmetric matrices are the interchange types of the
//! solver; the LDL^T factorization and the dense QP backend realize the two
//! external capabilities the methods consume.

pub mod ldl;
pub mod qp;
pub mod sparse_vector;
pub mod symmetric;

pub use ldl::{LdlSolver, SymmetricIndefiniteSolver};
pub use qp::{DenseQpSolver, QpSolver};
pub use sparse_vector::SparseVector;
pub use symmetric::{Inertia, SymmetricMatrix};
