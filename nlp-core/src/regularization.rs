//! Inertia correction of symmetric indefinite matrices.
//!
//! Given a matrix, a set of primal rows and the inertia the factorization is
//! expected to have, the primal strategy perturbs the primal diagonal by a
//! growing factor δ (and the dual diagonal by −δ_d) until the factorization
//! matches. The factorization that is kept is the one whose δ is returned.

use tracing::debug;

use crate::error::{SolverError, SolverResult};
use crate::linalg::ldl::{LdlSolver, SymmetricIndefiniteSolver};
use crate::linalg::symmetric::{Inertia, SymmetricMatrix};
use crate::options::Options;

/// Floor for the seed kept between calls.
const SEED_FLOOR: f64 = 1e-20;
/// Growth factor applied to the very first correction of a solve.
const FIRST_GROWTH_FACTOR: f64 = 100.0;

pub trait RegularizationStrategy {
    /// Record problem sizes; called once before the loop.
    fn initialize_memory(&mut self, dimension: usize, number_nonzeros: usize);

    /// Forget the symbolic analysis; the next call re-analyzes the pattern.
    fn reset(&mut self);

    /// Perturb `matrix` (primal diagonal +δ, dual diagonal −δ_d when δ > 0)
    /// until `linear_solver` factorizes it with the expected inertia.
    /// Returns the committed δ; the factorization held by `linear_solver` is
    /// the one that matched.
    fn regularize_augmented_matrix(
        &mut self,
        matrix: &mut SymmetricMatrix,
        primal_indices: &[usize],
        dual_indices: &[usize],
        dual_regularization_parameter: f64,
        expected_inertia: Inertia,
        linear_solver: &mut dyn SymmetricIndefiniteSolver,
    ) -> SolverResult<f64>;

    /// Convexify a Hessian in place with the strategy's own linear solver.
    fn regularize_hessian(
        &mut self,
        hessian: &mut SymmetricMatrix,
        indices: &[usize],
        expected_inertia: Inertia,
    ) -> SolverResult<f64>;

    fn performs_primal_regularization(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Nocedal & Wright §19.3 style primal regularization with geometric growth
/// and a seed carried between calls.
pub struct PrimalRegularization {
    initial_value: f64,
    increase_factor: f64,
    failure_threshold: f64,
    /// last successful factor; seeds the next call at previous/3
    previous_factor: f64,
    symbolic_analysis_performed: bool,
    dimension: usize,
    number_nonzeros: usize,
    /// solver used by the Hessian convexification path
    own_solver: Option<LdlSolver>,
}

impl PrimalRegularization {
    pub fn new(options: &Options) -> SolverResult<Self> {
        Ok(PrimalRegularization {
            initial_value: options.get_f64("regularization_initial_value")?,
            increase_factor: options.get_f64("regularization_increase_factor")?,
            failure_threshold: options.get_f64("regularization_failure_threshold")?,
            previous_factor: 0.0,
            symbolic_analysis_performed: false,
            dimension: 0,
            number_nonzeros: 0,
            own_solver: None,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn regularization_loop(
        &mut self,
        matrix: &mut SymmetricMatrix,
        primal_indices: &[usize],
        dual_indices: &[usize],
        dual_regularization_parameter: f64,
        expected_inertia: Inertia,
        linear_solver: &mut dyn SymmetricIndefiniteSolver,
    ) -> SolverResult<f64> {
        let smallest_diagonal_entry = matrix.smallest_diagonal_entry(primal_indices);
        debug!(smallest_diagonal_entry, "regularizing the augmented matrix");

        let mut factor = if smallest_diagonal_entry > 0.0 {
            0.0
        } else {
            // seed from the previous successful factor, divided by 3
            let seed = if self.previous_factor > 0.0 {
                (self.previous_factor / 3.0).max(SEED_FLOOR)
            } else {
                0.0
            };
            (self.initial_value - smallest_diagonal_entry).max(seed)
        };
        let mut first_growth = true;
        loop {
            if factor > 0.0 {
                matrix.set_regularization(primal_indices, factor);
                matrix.set_regularization(dual_indices, -dual_regularization_parameter);
            }
            if !self.symbolic_analysis_performed {
                linear_solver.do_symbolic_analysis(matrix)?;
                self.symbolic_analysis_performed = true;
            }
            linear_solver.do_numerical_factorization(matrix)?;
            let estimated_inertia = linear_solver.get_inertia();
            debug!(%estimated_inertia, %expected_inertia, factor, "tested factorization");
            if estimated_inertia == expected_inertia {
                if factor > 0.0 {
                    self.previous_factor = factor;
                }
                return Ok(factor);
            }
            factor = if factor == 0.0 {
                (self.previous_factor / 3.0).max(SEED_FLOOR).max(self.initial_value)
            } else {
                let growth = if first_growth && self.previous_factor == 0.0 {
                    FIRST_GROWTH_FACTOR
                } else {
                    self.increase_factor
                };
                first_growth = false;
                growth * factor
            };
            if factor > self.failure_threshold {
                return Err(SolverError::UnstableRegularization {
                    threshold: self.failure_threshold,
                });
            }
        }
    }
}

impl RegularizationStrategy for PrimalRegularization {
    fn initialize_memory(&mut self, dimension: usize, number_nonzeros: usize) {
        self.dimension = dimension;
        self.number_nonzeros = number_nonzeros;
    }

    fn reset(&mut self) {
        self.symbolic_analysis_performed = false;
        if let Some(solver) = &mut self.own_solver {
            solver.reset();
        }
    }

    fn regularize_augmented_matrix(
        &mut self,
        matrix: &mut SymmetricMatrix,
        primal_indices: &[usize],
        dual_indices: &[usize],
        dual_regularization_parameter: f64,
        expected_inertia: Inertia,
        linear_solver: &mut dyn SymmetricIndefiniteSolver,
    ) -> SolverResult<f64> {
        self.regularization_loop(
            matrix,
            primal_indices,
            dual_indices,
            dual_regularization_parameter,
            expected_inertia,
            linear_solver,
        )
    }

    fn regularize_hessian(
        &mut self,
        hessian: &mut SymmetricMatrix,
        indices: &[usize],
        expected_inertia: Inertia,
    ) -> SolverResult<f64> {
        // pick the member linear solver
        if self.own_solver.is_none() {
            let mut solver = LdlSolver::new();
            solver.initialize_memory(self.dimension, self.number_nonzeros + self.dimension);
            self.own_solver = Some(solver);
        }
        let mut solver = self.own_solver.take().expect("own solver just installed");
        let result =
            self.regularization_loop(hessian, indices, &[], 0.0, expected_inertia, &mut solver);
        self.own_solver = Some(solver);
        result
    }

    fn performs_primal_regularization(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "primal"
    }
}

/// No regularization: factorize once and demand the expected inertia.
pub struct NoRegularization {
    symbolic_analysis_performed: bool,
    dimension: usize,
    number_nonzeros: usize,
    own_solver: Option<LdlSolver>,
}

impl NoRegularization {
    pub fn new() -> Self {
        NoRegularization {
            symbolic_analysis_performed: false,
            dimension: 0,
            number_nonzeros: 0,
            own_solver: None,
        }
    }
}

impl Default for NoRegularization {
    fn default() -> Self {
        Self::new()
    }
}

impl RegularizationStrategy for NoRegularization {
    fn initialize_memory(&mut self, dimension: usize, number_nonzeros: usize) {
        self.dimension = dimension;
        self.number_nonzeros = number_nonzeros;
    }

    fn reset(&mut self) {
        self.symbolic_analysis_performed = false;
        if let Some(solver) = &mut self.own_solver {
            solver.reset();
        }
    }

    fn regularize_augmented_matrix(
        &mut self,
        matrix: &mut SymmetricMatrix,
        _primal_indices: &[usize],
        dual_indices: &[usize],
        dual_regularization_parameter: f64,
        expected_inertia: Inertia,
        linear_solver: &mut dyn SymmetricIndefiniteSolver,
    ) -> SolverResult<f64> {
        matrix.set_regularization(dual_indices, -dual_regularization_parameter);
        if !self.symbolic_analysis_performed {
            linear_solver.do_symbolic_analysis(matrix)?;
            self.symbolic_analysis_performed = true;
        }
        linear_solver.do_numerical_factorization(matrix)?;
        if linear_solver.get_inertia() != expected_inertia {
            return Err(SolverError::UnstableRegularization { threshold: 0.0 });
        }
        Ok(0.0)
    }

    fn regularize_hessian(
        &mut self,
        hessian: &mut SymmetricMatrix,
        _indices: &[usize],
        expected_inertia: Inertia,
    ) -> SolverResult<f64> {
        if self.own_solver.is_none() {
            let mut solver = LdlSolver::new();
            solver.initialize_memory(self.dimension, self.number_nonzeros + self.dimension);
            self.own_solver = Some(solver);
        }
        let solver = self.own_solver.as_mut().expect("own solver just installed");
        if !self.symbolic_analysis_performed {
            solver.do_symbolic_analysis(hessian)?;
            self.symbolic_analysis_performed = true;
        }
        solver.do_numerical_factorization(hessian)?;
        if solver.get_inertia() != expected_inertia {
            return Err(SolverError::UnstableRegularization { threshold: 0.0 });
        }
        Ok(0.0)
    }

    fn performs_primal_regularization(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Build a regularization strategy from its option value.
pub fn create(options: &Options) -> SolverResult<Box<dyn RegularizationStrategy>> {
    match options.get_str("regularization")? {
        "primal" => Ok(Box::new(PrimalRegularization::new(options)?)),
        "none" => Ok(Box::new(NoRegularization::new())),
        other => Err(SolverError::Configuration(format!(
            "unknown regularization strategy '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::ldl::LdlSolver;

    fn expected(positive: usize, negative: usize) -> Inertia {
        Inertia { positive, negative, zero: 0 }
    }

    #[test]
    fn test_positive_definite_needs_no_correction() {
        let options = Options::default();
        let mut strategy = PrimalRegularization::new(&options).unwrap();
        strategy.initialize_memory(2, 2);
        let mut matrix = SymmetricMatrix::new(2, 2, true);
        matrix.insert(2.0, 0, 0);
        matrix.insert(3.0, 1, 1);
        let factor = strategy
            .regularize_hessian(&mut matrix, &[0, 1], expected(2, 0))
            .unwrap();
        assert_eq!(factor, 0.0);
    }

    #[test]
    fn test_indefinite_hessian_is_corrected() {
        // [0 1; 1 0] needs delta > 1 to become positive definite
        let options = Options::default();
        let mut strategy = PrimalRegularization::new(&options).unwrap();
        strategy.initialize_memory(2, 1);
        let mut matrix = SymmetricMatrix::new(2, 1, true);
        matrix.insert(1.0, 0, 1);
        let factor = strategy
            .regularize_hessian(&mut matrix, &[0, 1], expected(2, 0))
            .unwrap();
        assert!(factor > 1.0);
    }

    #[test]
    fn test_tried_factors_are_strictly_increasing() {
        // instrumented run: every delta installed on the matrix must grow
        struct RecordingSolver {
            inner: LdlSolver,
            tried: Vec<f64>,
        }
        impl SymmetricIndefiniteSolver for RecordingSolver {
            fn initialize_memory(&mut self, n: usize, nnz: usize) {
                self.inner.initialize_memory(n, nnz);
            }
            fn do_symbolic_analysis(&mut self, matrix: &SymmetricMatrix) -> SolverResult<()> {
                self.inner.do_symbolic_analysis(matrix)
            }
            fn do_numerical_factorization(&mut self, matrix: &SymmetricMatrix) -> SolverResult<()> {
                // read the installed perturbation off the diagonal slot of row 0,
                // which has no natural entry on the diagonal
                let delta: f64 = matrix
                    .iter()
                    .filter(|&(r, c, _)| r == 0 && c == 0)
                    .map(|(_, _, v)| v)
                    .sum();
                self.tried.push(delta);
                self.inner.do_numerical_factorization(matrix)
            }
            fn solve_indefinite_system(&self, matrix: &SymmetricMatrix, rhs: &[f64], out: &mut [f64]) {
                self.inner.solve_indefinite_system(matrix, rhs, out);
            }
            fn get_inertia(&self) -> Inertia {
                self.inner.get_inertia()
            }
            fn matrix_is_singular(&self) -> bool {
                self.inner.matrix_is_singular()
            }
            fn rank(&self) -> usize {
                self.inner.rank()
            }
        }

        let options = Options::default();
        let mut strategy = PrimalRegularization::new(&options).unwrap();
        strategy.initialize_memory(2, 1);
        let mut matrix = SymmetricMatrix::new(2, 1, true);
        matrix.insert(1.0, 0, 1);
        let mut solver = RecordingSolver { inner: LdlSolver::new(), tried: Vec::new() };
        solver.initialize_memory(2, 3);
        strategy
            .regularize_augmented_matrix(&mut matrix, &[0, 1], &[], 0.0, expected(2, 0), &mut solver)
            .unwrap();
        assert!(solver.tried.len() > 1);
        for pair in solver.tried.windows(2) {
            assert!(pair[0] < pair[1], "deltas not strictly increasing: {:?}", solver.tried);
        }
    }

    #[test]
    fn test_unstable_regularization_is_reported() {
        let options = Options::default()
            .with("regularization_failure_threshold", "1e-3");
        let mut strategy = PrimalRegularization::new(&options).unwrap();
        strategy.initialize_memory(2, 1);
        let mut matrix = SymmetricMatrix::new(2, 1, true);
        matrix.insert(1.0, 0, 1);
        let result = strategy.regularize_hessian(&mut matrix, &[0, 1], expected(2, 0));
        assert!(matches!(result, Err(SolverError::UnstableRegularization { .. })));
    }
}
