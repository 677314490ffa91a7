//! Solver configuration

use serde::{Deserialize, Serialize};

pub const DEFAULT_VIRTUAL_FLOWS_EPSILON: f64 = 0.1;
pub const DEFAULT_MAX_ITERATIONS: usize = 100_000;

/// Knobs of one `FlowSolver` run
///
/// # Example
/// ```
/// use stockflow_engine::solver::SolverConfig;
///
/// let config = SolverConfig::default()
///     .with_prioritized_locations(vec!["Landfill".to_string()]);
/// assert!(config.use_virtual_flows);
/// assert_eq!(config.virtual_flows_epsilon, 0.1);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Synthesize virtual processes and flows for unbalanced processes
    pub use_virtual_flows: bool,

    /// Mass-balance tolerance
    pub virtual_flows_epsilon: f64,

    /// Worklist pops per year before the graph is declared unsolvable
    pub max_iterations: usize,

    /// Reset relative flows' evaluated values when a year is prepared.
    /// False when continuing from a forked, already solved state.
    pub reset_evaluated_values: bool,

    /// Flows into processes at these locations are served before stocks
    pub prioritized_locations: Vec<String>,

    /// Flows into processes at these transformation stages are served
    /// before stocks
    pub prioritized_transformation_stages: Vec<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            use_virtual_flows: true,
            virtual_flows_epsilon: DEFAULT_VIRTUAL_FLOWS_EPSILON,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            reset_evaluated_values: true,
            prioritized_locations: Vec::new(),
            prioritized_transformation_stages: Vec::new(),
        }
    }
}

impl SolverConfig {
    pub fn with_virtual_flows(mut self, enabled: bool) -> Self {
        self.use_virtual_flows = enabled;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.virtual_flows_epsilon = epsilon;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_reset_evaluated_values(mut self, reset: bool) -> Self {
        self.reset_evaluated_values = reset;
        self
    }

    pub fn with_prioritized_locations(mut self, locations: Vec<String>) -> Self {
        self.prioritized_locations = locations;
        self
    }

    pub fn with_prioritized_transformation_stages(mut self, stages: Vec<String>) -> Self {
        self.prioritized_transformation_stages = stages;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.virtual_flows_epsilon.is_finite() || self.virtual_flows_epsilon < 0.0 {
            return Err(format!(
                "virtual_flows_epsilon must be a non-negative number, got {}",
                self.virtual_flows_epsilon
            ));
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be positive".to_string());
        }
        Ok(())
    }

    /// Whether flows into a process at `location`/`stage` are prioritized
    pub fn is_prioritized(&self, location: &str, stage: &str) -> bool {
        self.prioritized_locations.iter().any(|l| l == location)
            || self
                .prioritized_transformation_stages
                .iter()
                .any(|s| s == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SolverConfig::default().with_epsilon(-1.0).validate().is_err());
        assert!(SolverConfig::default()
            .with_epsilon(f64::NAN)
            .validate()
            .is_err());
        assert!(SolverConfig::default()
            .with_max_iterations(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_is_prioritized() {
        let config = SolverConfig::default()
            .with_prioritized_locations(vec!["Export".to_string()])
            .with_prioritized_transformation_stages(vec!["Energy".to_string()]);

        assert!(config.is_prioritized("Export", "Sawing"));
        assert!(config.is_prioritized("Domestic", "Energy"));
        assert!(!config.is_prioritized("Domestic", "Sawing"));
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: SolverConfig = serde_json::from_str(r#"{"max_iterations": 10}"#).unwrap();
        assert_eq!(config.max_iterations, 10);
        assert!(config.use_virtual_flows);
        assert!(config.reset_evaluated_values);
    }
}
