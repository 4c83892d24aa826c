//! Symmetric indefinite LDL^T factorization.
//!
//! This is the direct linear-algebra capability consumed by the interior-point
//! method, the inertia-correction loop and the least-squares multiplier
//! estimation. The factorization is an elimination-tree based sparse LDL^T
//! without pivoting: exact for quasi-definite matrices, and on indefinite
//! input it either succeeds or reports a zero pivot, which the regularization
//! loop answers by growing its perturbation.
//!
//! The symbolic analysis (CSC pattern, scatter map, elimination tree, column
//! counts) is performed once per sparsity pattern; numeric factorizations
//! reuse all workspace.

use sprs::TriMat;

use crate::error::{SolverError, SolverResult};
use crate::linalg::symmetric::{Inertia, SymmetricMatrix};

/// Pivots smaller than this (relatively) are treated as zero eigenvalues.
const ZERO_PIVOT_TOLERANCE: f64 = 1e-13;

/// Direct solver for sparse symmetric indefinite systems.
pub trait SymmetricIndefiniteSolver {
    /// Allocate workspace for systems of the given maximum size.
    fn initialize_memory(&mut self, max_dimension: usize, max_number_nonzeros: usize);

    /// Analyze the sparsity pattern. Called once per pattern; numeric
    /// factorizations afterwards assume the same pattern.
    fn do_symbolic_analysis(&mut self, matrix: &SymmetricMatrix) -> SolverResult<()>;

    /// Factorize the matrix numerically, reusing the symbolic analysis.
    fn do_numerical_factorization(&mut self, matrix: &SymmetricMatrix) -> SolverResult<()>;

    /// Solve A x = rhs using the current factorization.
    fn solve_indefinite_system(&self, matrix: &SymmetricMatrix, rhs: &[f64], solution: &mut [f64]);

    /// Inertia of the last factorized matrix.
    fn get_inertia(&self) -> Inertia;

    /// True when the last factorization hit a zero pivot.
    fn matrix_is_singular(&self) -> bool;

    /// Numerical rank of the last factorized matrix.
    fn rank(&self) -> usize;
}

/// Elimination-tree based sparse LDL^T solver.
pub struct LdlSolver {
    dimension: usize,
    // CSC pattern of the deduplicated upper triangle
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    csc_values: Vec<f64>,
    // maps each COO entry (in iteration order) to its CSC slot
    scatter: Vec<usize>,
    // symbolic analysis
    parent: Vec<Option<usize>>,
    column_counts: Vec<usize>,
    // factor storage
    l_col_ptr: Vec<usize>,
    l_row_idx: Vec<usize>,
    l_values: Vec<f64>,
    d: Vec<f64>,
    d_inv: Vec<f64>,
    // workspace
    work_y: Vec<f64>,
    work_flag: Vec<usize>,
    work_pattern: Vec<usize>,
    work_next: Vec<usize>,
    // factorization state
    analyzed: bool,
    factorized_columns: usize,
    number_positive: usize,
    number_negative: usize,
    singular: bool,
}

impl Default for LdlSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LdlSolver {
    pub fn new() -> Self {
        LdlSolver {
            dimension: 0,
            col_ptr: Vec::new(),
            row_idx: Vec::new(),
            csc_values: Vec::new(),
            scatter: Vec::new(),
            parent: Vec::new(),
            column_counts: Vec::new(),
            l_col_ptr: Vec::new(),
            l_row_idx: Vec::new(),
            l_values: Vec::new(),
            d: Vec::new(),
            d_inv: Vec::new(),
            work_y: Vec::new(),
            work_flag: Vec::new(),
            work_pattern: Vec::new(),
            work_next: Vec::new(),
            analyzed: false,
            factorized_columns: 0,
            number_positive: 0,
            number_negative: 0,
            singular: false,
        }
    }

    /// Drop the symbolic analysis; the next factorization must re-analyze.
    pub fn reset(&mut self) {
        self.analyzed = false;
        self.singular = false;
        self.factorized_columns = 0;
        self.number_positive = 0;
        self.number_negative = 0;
    }

    fn scatter_values(&mut self, matrix: &SymmetricMatrix) {
        self.csc_values.fill(0.0);
        for (slot, (_, _, value)) in self.scatter.iter().zip(matrix.iter()) {
            self.csc_values[*slot] += value;
        }
    }
}

impl SymmetricIndefiniteSolver for LdlSolver {
    fn initialize_memory(&mut self, max_dimension: usize, max_number_nonzeros: usize) {
        let n = max_dimension;
        self.parent = vec![None; n];
        self.column_counts = vec![0; n];
        self.d = vec![0.0; n];
        self.d_inv = vec![0.0; n];
        self.work_y = vec![0.0; n];
        self.work_flag = vec![usize::MAX; n];
        self.work_pattern = vec![0; n];
        self.work_next = vec![0; n];
        self.scatter.reserve(max_number_nonzeros + n);
        self.csc_values.reserve(max_number_nonzeros + n);
    }

    fn do_symbolic_analysis(&mut self, matrix: &SymmetricMatrix) -> SolverResult<()> {
        let n = matrix.dimension();
        self.dimension = n;

        // deduplicated, column-sorted CSC pattern of the upper triangle
        let mut triplets = TriMat::new((n, n));
        for (row, col, _) in matrix.iter() {
            if row > col {
                return Err(SolverError::Allocation(
                    "symmetric matrix contains an entry below the diagonal".to_string(),
                ));
            }
            triplets.add_triplet(row, col, 1.0f64);
        }
        let pattern: sprs::CsMat<f64> = triplets.to_csc();
        let (col_ptr, row_idx, _) = pattern.into_raw_storage();
        self.col_ptr = col_ptr;
        self.row_idx = row_idx;
        self.csc_values = vec![0.0; self.row_idx.len()];

        // scatter map from COO iteration order to CSC slots
        self.scatter.clear();
        for (row, col, _) in matrix.iter() {
            let start = self.col_ptr[col];
            let end = self.col_ptr[col + 1];
            let offset = self.row_idx[start..end]
                .binary_search(&row)
                .expect("pattern entry vanished");
            self.scatter.push(start + offset);
        }

        // elimination tree and column counts of L
        if self.parent.len() < n {
            self.initialize_memory(n, self.row_idx.len());
        }
        for k in 0..n {
            self.parent[k] = None;
            self.column_counts[k] = 0;
            self.work_flag[k] = k;
            for p in self.col_ptr[k]..self.col_ptr[k + 1] {
                let mut i = self.row_idx[p];
                while i < k && self.work_flag[i] != k {
                    if self.parent[i].is_none() {
                        self.parent[i] = Some(k);
                    }
                    self.column_counts[i] += 1;
                    self.work_flag[i] = k;
                    i = match self.parent[i] {
                        Some(parent) => parent,
                        None => break,
                    };
                }
            }
        }

        // allocate the factor
        self.l_col_ptr = vec![0; n + 1];
        for k in 0..n {
            self.l_col_ptr[k + 1] = self.l_col_ptr[k] + self.column_counts[k];
        }
        let l_nnz = self.l_col_ptr[n];
        self.l_row_idx = vec![0; l_nnz];
        self.l_values = vec![0.0; l_nnz];

        self.analyzed = true;
        Ok(())
    }

    fn do_numerical_factorization(&mut self, matrix: &SymmetricMatrix) -> SolverResult<()> {
        assert!(self.analyzed, "numerical factorization before symbolic analysis");
        let n = self.dimension;
        self.scatter_values(matrix);

        // largest diagonal magnitude, for the relative zero-pivot test
        let mut diagonal_scale = 1.0f64;
        for k in 0..n {
            for p in self.col_ptr[k]..self.col_ptr[k + 1] {
                if self.row_idx[p] == k {
                    diagonal_scale = diagonal_scale.max(self.csc_values[p].abs());
                }
            }
        }
        let pivot_tolerance = ZERO_PIVOT_TOLERANCE * diagonal_scale;

        self.number_positive = 0;
        self.number_negative = 0;
        self.singular = false;
        self.factorized_columns = 0;
        for k in 0..n {
            self.work_flag[k] = usize::MAX;
            self.work_next[k] = self.l_col_ptr[k];
            self.work_y[k] = 0.0;
        }

        for k in 0..n {
            // sparse triangular solve: pattern of row k of L via the etree
            self.work_flag[k] = k;
            self.d[k] = 0.0;
            let mut top = n;
            for p in self.col_ptr[k]..self.col_ptr[k + 1] {
                let i = self.row_idx[p];
                if i == k {
                    self.d[k] = self.csc_values[p];
                    continue;
                }
                self.work_y[i] = self.csc_values[p];
                let mut len = 0;
                let mut node = i;
                while self.work_flag[node] != k {
                    self.work_pattern[len] = node;
                    len += 1;
                    self.work_flag[node] = k;
                    node = match self.parent[node] {
                        Some(parent) => parent,
                        None => break,
                    };
                }
                // reverse the path so the final pattern is topological
                while len > 0 {
                    len -= 1;
                    top -= 1;
                    self.work_pattern[top] = self.work_pattern[len];
                }
            }

            for idx in top..n {
                let i = self.work_pattern[idx];
                let y_i = self.work_y[i];
                self.work_y[i] = 0.0;
                for p in self.l_col_ptr[i]..self.work_next[i] {
                    self.work_y[self.l_row_idx[p]] -= self.l_values[p] * y_i;
                }
                let l_ki = y_i * self.d_inv[i];
                self.d[k] -= l_ki * y_i;
                self.l_row_idx[self.work_next[i]] = k;
                self.l_values[self.work_next[i]] = l_ki;
                self.work_next[i] += 1;
            }

            if self.d[k].abs() <= pivot_tolerance {
                // zero pivot: the matrix is singular on the computed leading
                // block; stop and report
                self.singular = true;
                self.factorized_columns = k;
                return Ok(());
            }
            if self.d[k] > 0.0 {
                self.number_positive += 1;
            } else {
                self.number_negative += 1;
            }
            self.d_inv[k] = 1.0 / self.d[k];
            self.factorized_columns = k + 1;
        }
        Ok(())
    }

    fn solve_indefinite_system(&self, _matrix: &SymmetricMatrix, rhs: &[f64], solution: &mut [f64]) {
        assert!(!self.singular, "solve with a singular factorization");
        let n = self.dimension;
        solution[..n].copy_from_slice(&rhs[..n]);
        // forward substitution with unit lower-triangular L (stored by columns)
        for j in 0..n {
            let x_j = solution[j];
            for p in self.l_col_ptr[j]..self.l_col_ptr[j + 1] {
                solution[self.l_row_idx[p]] -= self.l_values[p] * x_j;
            }
        }
        // diagonal scaling
        for j in 0..n {
            solution[j] *= self.d_inv[j];
        }
        // backward substitution with L^T
        for j in (0..n).rev() {
            let mut x_j = solution[j];
            for p in self.l_col_ptr[j]..self.l_col_ptr[j + 1] {
                x_j -= self.l_values[p] * solution[self.l_row_idx[p]];
            }
            solution[j] = x_j;
        }
    }

    fn get_inertia(&self) -> Inertia {
        Inertia {
            positive: self.number_positive,
            negative: self.number_negative,
            zero: self.dimension - self.number_positive - self.number_negative,
        }
    }

    fn matrix_is_singular(&self) -> bool {
        self.singular
    }

    fn rank(&self) -> usize {
        self.number_positive + self.number_negative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factorize(matrix: &SymmetricMatrix) -> LdlSolver {
        let mut solver = LdlSolver::new();
        solver.initialize_memory(matrix.dimension(), matrix.number_nonzeros() + matrix.dimension());
        solver.do_symbolic_analysis(matrix).unwrap();
        solver.do_numerical_factorization(matrix).unwrap();
        solver
    }

    #[test]
    fn test_positive_definite_solve() {
        // A = [4 1; 1 3], b = [1, 2], x = [1/11, 7/11]
        let mut matrix = SymmetricMatrix::new(2, 3, false);
        matrix.insert(4.0, 0, 0);
        matrix.insert(1.0, 0, 1);
        matrix.insert(3.0, 1, 1);
        let solver = factorize(&matrix);
        assert_eq!(
            solver.get_inertia(),
            Inertia { positive: 2, negative: 0, zero: 0 }
        );
        assert!(!solver.matrix_is_singular());

        let rhs = [1.0, 2.0];
        let mut solution = [0.0; 2];
        solver.solve_indefinite_system(&matrix, &rhs, &mut solution);
        assert!((solution[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((solution[1] - 7.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_quasi_definite_inertia() {
        // saddle-point system [2 0 1; 0 2 1; 1 1 -1e-8]: inertia (2, 1, 0)
        let mut matrix = SymmetricMatrix::new(3, 5, true);
        matrix.insert(2.0, 0, 0);
        matrix.insert(2.0, 1, 1);
        matrix.insert(1.0, 0, 2);
        matrix.insert(1.0, 1, 2);
        matrix.set_regularization(&[2], -1e-8);
        let solver = factorize(&matrix);
        assert_eq!(
            solver.get_inertia(),
            Inertia { positive: 2, negative: 1, zero: 0 }
        );
    }

    #[test]
    fn test_singular_matrix_is_reported() {
        // [0 1; 1 0] breaks down at the first pivot
        let mut matrix = SymmetricMatrix::new(2, 2, true);
        matrix.insert(1.0, 0, 1);
        let mut solver = LdlSolver::new();
        solver.initialize_memory(2, 4);
        solver.do_symbolic_analysis(&matrix).unwrap();
        solver.do_numerical_factorization(&matrix).unwrap();
        assert!(solver.matrix_is_singular());
        assert!(solver.get_inertia().zero > 0);
    }

    #[test]
    fn test_values_change_without_reanalysis() {
        let mut matrix = SymmetricMatrix::new(2, 3, true);
        matrix.insert(2.0, 0, 0);
        matrix.insert(2.0, 1, 1);
        let mut solver = LdlSolver::new();
        solver.initialize_memory(2, 5);
        solver.do_symbolic_analysis(&matrix).unwrap();
        solver.do_numerical_factorization(&matrix).unwrap();
        assert_eq!(solver.get_inertia().positive, 2);

        // flip the sign through the regularization segment only
        matrix.set_regularization(&[0, 1], -4.0);
        solver.do_numerical_factorization(&matrix).unwrap();
        assert_eq!(solver.get_inertia().negative, 2);
    }
}
