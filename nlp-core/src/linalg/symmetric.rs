//! Symmetric matrices in coordinate (COO) format, upper triangle only.
//!
//! The matrix carries an optional diagonal regularization segment, separate
//! from the natural nonzeros, so that inertia-correction loops can toggle the
//! perturbation without reassembling the matrix. The segment always exposes
//! every diagonal position, which also guarantees that downstream symbolic
//! factorizations see a full diagonal in their sparsity pattern.

/// Eigenvalue signature of a symmetric matrix: (positive, negative, zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inertia {
    pub positive: usize,
    pub negative: usize,
    pub zero: usize,
}

impl std::fmt::Display for Inertia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.positive, self.negative, self.zero)
    }
}

/// Symmetric matrix stored as upper-triangular COO entries plus an optional
/// diagonal regularization segment.
#[derive(Debug, Clone)]
pub struct SymmetricMatrix {
    dimension: usize,
    max_dimension: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
    capacity: usize,
    /// Diagonal perturbation values, one slot per row, when enabled.
    regularization: Option<Vec<f64>>,
}

impl SymmetricMatrix {
    /// `capacity` counts the natural nonzeros only; the regularization segment
    /// is allocated on top of it when `use_regularization` is set.
    pub fn new(max_dimension: usize, capacity: usize, use_regularization: bool) -> Self {
        SymmetricMatrix {
            dimension: max_dimension,
            max_dimension,
            rows: Vec::with_capacity(capacity),
            cols: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            capacity,
            regularization: use_regularization.then(|| vec![0.0; max_dimension]),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Shrink or restore the active dimension (the allocation covers
    /// `max_dimension`). Entries outside the new dimension must not exist.
    pub fn set_dimension(&mut self, dimension: usize) {
        assert!(dimension <= self.max_dimension);
        self.dimension = dimension;
    }

    /// Number of natural (non-regularization) nonzeros.
    pub fn number_nonzeros(&self) -> usize {
        self.values.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all natural entries and zero the regularization segment.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.cols.clear();
        self.values.clear();
        if let Some(regularization) = &mut self.regularization {
            regularization.fill(0.0);
        }
    }

    /// Insert an upper-triangular entry (row <= col).
    pub fn insert(&mut self, value: f64, row: usize, col: usize) {
        debug_assert!(row <= col, "symmetric matrix stores the upper triangle only");
        debug_assert!(col < self.dimension);
        self.rows.push(row);
        self.cols.push(col);
        self.values.push(value);
    }

    /// Install the perturbation `value` on the diagonal at the given indices.
    /// Only meaningful when the matrix was created with regularization.
    pub fn set_regularization(&mut self, indices: &[usize], value: f64) {
        let regularization = self
            .regularization
            .as_mut()
            .expect("matrix has no regularization segment");
        for &index in indices {
            regularization[index] = value;
        }
    }

    /// Zero the whole regularization segment.
    pub fn clear_regularization(&mut self) {
        if let Some(regularization) = &mut self.regularization {
            regularization.fill(0.0);
        }
    }

    /// Iterate over all entries: natural nonzeros first, then (when enabled)
    /// one diagonal slot per active row for the regularization segment.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let natural = self
            .rows
            .iter()
            .zip(self.cols.iter())
            .zip(self.values.iter())
            .map(|((&row, &col), &value)| (row, col, value));
        let regularization = self
            .regularization
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .take(self.dimension)
            .enumerate()
            .map(|(index, &value)| (index, index, value));
        natural.chain(regularization)
    }

    /// Quadratic form x'Ay with off-diagonal entries counted twice.
    pub fn quadratic_product(&self, x: &[f64], y: &[f64]) -> f64 {
        debug_assert_eq!(x.len(), y.len());
        let mut result = 0.0;
        for (row, col, value) in self.iter() {
            if row == col {
                result += value * x[row] * y[col];
            } else {
                result += value * (x[row] * y[col] + x[col] * y[row]);
            }
        }
        result
    }

    /// Smallest diagonal entry over an index set, ignoring the regularization
    /// segment. Missing diagonal entries count as zero.
    pub fn smallest_diagonal_entry(&self, indices: &[usize]) -> f64 {
        let mut smallest = f64::INFINITY;
        for &index in indices {
            let mut diagonal = 0.0;
            for ((&row, &col), &value) in self.rows.iter().zip(self.cols.iter()).zip(self.values.iter()) {
                if row == index && col == index {
                    diagonal += value;
                }
            }
            smallest = smallest.min(diagonal);
        }
        if smallest == f64::INFINITY {
            0.0
        } else {
            smallest
        }
    }

    /// Check that the natural entries fit the preallocated capacity.
    pub fn check_capacity(&self) -> Result<(), crate::error::SolverError> {
        if self.values.len() > self.capacity {
            return Err(crate::error::SolverError::Allocation(format!(
                "symmetric matrix holds {} nonzeros but was allocated for {}",
                self.values.len(),
                self.capacity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_product_counts_offdiagonal_twice() {
        // A = [1 2; 2 3]
        let mut matrix = SymmetricMatrix::new(2, 3, false);
        matrix.insert(1.0, 0, 0);
        matrix.insert(2.0, 0, 1);
        matrix.insert(3.0, 1, 1);
        let x = [1.0, 1.0];
        // x'Ax = 1 + 2*2 + 3 = 8
        assert_eq!(matrix.quadratic_product(&x, &x), 8.0);
    }

    #[test]
    fn test_regularization_segment_toggles_without_reassembly() {
        let mut matrix = SymmetricMatrix::new(2, 2, true);
        matrix.insert(1.0, 0, 0);
        matrix.insert(-1.0, 1, 1);
        matrix.set_regularization(&[0, 1], 0.5);
        let x = [1.0, 1.0];
        assert_eq!(matrix.quadratic_product(&x, &x), 1.0 - 1.0 + 0.5 + 0.5);
        matrix.clear_regularization();
        assert_eq!(matrix.quadratic_product(&x, &x), 0.0);
        assert_eq!(matrix.number_nonzeros(), 2);
    }

    #[test]
    fn test_smallest_diagonal_entry() {
        let mut matrix = SymmetricMatrix::new(3, 4, false);
        matrix.insert(2.0, 0, 0);
        matrix.insert(-1.5, 1, 1);
        matrix.insert(4.0, 0, 2);
        // row 2 has no diagonal entry: counts as zero
        assert_eq!(matrix.smallest_diagonal_entry(&[0, 1, 2]), -1.5);
        assert_eq!(matrix.smallest_diagonal_entry(&[0, 2]), 0.0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut matrix = SymmetricMatrix::new(2, 2, true);
        matrix.insert(1.0, 0, 1);
        matrix.set_regularization(&[0], 3.0);
        matrix.reset();
        let after_first: Vec<_> = matrix.iter().collect();
        matrix.reset();
        let after_second: Vec<_> = matrix.iter().collect();
        assert_eq!(after_first, after_second);
        assert_eq!(matrix.number_nonzeros(), 0);
    }
}
