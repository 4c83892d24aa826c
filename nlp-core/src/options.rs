//! Flat string-keyed solver options.
//!
//! The driver and every ingredient read their parameters from a single
//! [`Options`] map. All recognized keys are seeded with defaults; setting an
//! unknown key or reading a malformed value is a configuration error, raised
//! before the outer loop begins.

use std::collections::BTreeMap;

use crate::error::{SolverError, SolverResult};

/// String-keyed options map with typed getters.
#[derive(Debug, Clone)]
pub struct Options {
    values: BTreeMap<String, String>,
}

const DEFAULTS: &[(&str, &str)] = &[
    // ingredient selection
    ("globalization_mechanism", "LS"),
    ("globalization_strategy", "filter_method"),
    ("inequality_handling_method", "primal_dual_IPM"),
    ("constraint_relaxation", "feasibility_restoration"),
    ("hessian_model", "exact"),
    ("regularization", "primal"),
    ("linear_solver", "LDL"),
    ("qp_solver", "dense"),
    // termination
    ("tolerance", "1e-8"),
    ("loose_tolerance", "1e-6"),
    ("loose_tolerance_consecutive_iteration_threshold", "15"),
    ("unbounded_objective_threshold", "-1e20"),
    ("max_iterations", "500"),
    ("time_limit_ms", "0"),
    // norms and residual scaling
    ("residual_norm", "INF"),
    ("progress_norm", "L1"),
    ("residual_scaling_threshold", "100."),
    // barrier method
    ("barrier_initial_parameter", "0.1"),
    ("barrier_tau_min", "0.99"),
    ("barrier_k_sigma", "1e10"),
    ("barrier_regularization_exponent", "0.25"),
    ("barrier_small_direction_factor", "10."),
    ("barrier_push_variable_to_interior_k1", "1e-2"),
    ("barrier_push_variable_to_interior_k2", "1e-2"),
    ("barrier_damping_factor", "1e-5"),
    ("barrier_default_multiplier", "1."),
    ("barrier_update_fraction", "10."),
    ("barrier_k_mu", "0.2"),
    ("barrier_theta_mu", "1.5"),
    ("least_square_multiplier_max_norm", "1e3"),
    // inertia correction
    ("regularization_initial_value", "1e-4"),
    ("regularization_increase_factor", "8."),
    ("regularization_failure_threshold", "1e40"),
    // sequential QP
    ("convexify_QP", "true"),
    ("enforce_linear_constraints", "false"),
    // l1 relaxation
    ("l1_constraint_violation_coefficient", "1."),
    // globalization strategies
    ("armijo_decrease_fraction", "1e-4"),
    ("filter_beta", "0.999"),
    ("filter_gamma", "0.001"),
    ("filter_delta", "0.999"),
    ("filter_switching_infeasibility_exponent", "2."),
    ("filter_capacity", "50"),
    ("filter_infeasibility_upper_bound_factor", "100."),
    // line search
    ("LS_backtracking_ratio", "0.5"),
    ("LS_min_step_length", "1e-10"),
    // trust region
    ("TR_initial_radius", "10."),
    ("TR_shrink_factor", "0.5"),
    ("TR_grow_factor", "2."),
    ("TR_min_radius", "1e-8"),
    ("TR_agreement_tolerance", "0.25"),
];

impl Default for Options {
    fn default() -> Self {
        let values = DEFAULTS
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Options { values }
    }
}

impl Options {
    /// Override an option. The key must be one of the recognized options.
    pub fn set(&mut self, key: &str, value: &str) -> SolverResult<()> {
        if !self.values.contains_key(key) {
            return Err(SolverError::Configuration(format!("unknown option '{key}'")));
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Convenience builder: set an option, panicking on unknown keys.
    /// Intended for test and example code.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value).expect("unknown option");
        self
    }

    pub fn get_str(&self, key: &str) -> SolverResult<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| SolverError::Configuration(format!("unknown option '{key}'")))
    }

    pub fn get_f64(&self, key: &str) -> SolverResult<f64> {
        let raw = self.get_str(key)?;
        raw.parse::<f64>().map_err(|_| {
            SolverError::Configuration(format!("option '{key}' has non-numeric value '{raw}'"))
        })
    }

    pub fn get_usize(&self, key: &str) -> SolverResult<usize> {
        let raw = self.get_str(key)?;
        raw.parse::<usize>().map_err(|_| {
            SolverError::Configuration(format!("option '{key}' has non-integer value '{raw}'"))
        })
    }

    pub fn get_bool(&self, key: &str) -> SolverResult<bool> {
        let raw = self.get_str(key)?;
        raw.parse::<bool>().map_err(|_| {
            SolverError::Configuration(format!("option '{key}' has non-boolean value '{raw}'"))
        })
    }

    /// Parse a norm-valued option (`L1`, `L2` or `INF`).
    pub fn get_norm(&self, key: &str) -> SolverResult<crate::util::Norm> {
        let raw = self.get_str(key)?;
        crate::util::Norm::from_name(raw)
            .ok_or_else(|| SolverError::Configuration(format!("option '{key}' has unknown norm '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse() {
        let options = Options::default();
        assert_eq!(options.get_str("globalization_mechanism").unwrap(), "LS");
        assert_eq!(options.get_f64("barrier_initial_parameter").unwrap(), 0.1);
        assert_eq!(options.get_usize("filter_capacity").unwrap(), 50);
        assert!(options.get_bool("convexify_QP").unwrap());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut options = Options::default();
        assert!(options.set("no_such_option", "1").is_err());
        assert!(options.get_f64("no_such_option").is_err());
    }

    #[test]
    fn test_malformed_value_is_rejected() {
        let options = Options::default().with("tolerance", "not-a-number");
        assert!(options.get_f64("tolerance").is_err());
    }
}
