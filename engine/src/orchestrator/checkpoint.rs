//! Checkpoint - save and restore solved scenario data
//!
//! A snapshot stores the solved data of one scenario together with a hash
//! of the solver config it was produced with. Dependent scenarios can be
//! forked from a restored snapshot instead of re-solving the baseline.
//!
//! # Critical Invariants
//!
//! - **Config Matching**: a snapshot can only be restored with a config
//!   that hashes to the stored `config_hash`
//! - **Referential Integrity**: every flow's endpoints exist in its year
//! - **Horizon Integrity**: the snapshot covers exactly its recorded years
//!
//! # Example
//!
//! ```rust
//! use stockflow_engine::models::{Flow, Process, ScenarioData};
//! use stockflow_engine::orchestrator::ScenarioSnapshot;
//! use stockflow_engine::solver::SolverConfig;
//!
//! let mut data = ScenarioData::from_year_range(2020, 2020).unwrap();
//! data.insert_process_all_years(Process::new("S", "Source")).unwrap();
//! data.insert_process_all_years(Process::new("P", "Process")).unwrap();
//! data.insert_flow(Flow::absolute("S", "P", 2020, 5.0)).unwrap();
//!
//! let config = SolverConfig::default();
//! let snapshot = ScenarioSnapshot::capture("Baseline", &config, &data).unwrap();
//! let json = snapshot.to_json().unwrap();
//!
//! let restored = ScenarioSnapshot::from_json(&json).unwrap().restore(&config).unwrap();
//! assert_eq!(restored, data);
//! ```

use crate::models::ScenarioData;
use crate::solver::SolverConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CheckpointError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config mismatch: snapshot was taken with config {expected}, got {actual}")]
    ConfigMismatch { expected: String, actual: String },

    #[error("Snapshot validation failed: {0}")]
    Validation(String),
}

// ============================================================================
// Snapshot Structure
// ============================================================================

/// Solved data of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSnapshot {
    pub scenario_name: String,

    /// Year horizon the data covers
    pub years: Vec<i32>,

    /// SHA256 hash of the solver config (for validation)
    pub config_hash: String,

    pub data: ScenarioData,
}

impl ScenarioSnapshot {
    pub fn capture(
        scenario_name: impl Into<String>,
        config: &SolverConfig,
        data: &ScenarioData,
    ) -> Result<Self, CheckpointError> {
        Ok(Self {
            scenario_name: scenario_name.into(),
            years: data.years().to_vec(),
            config_hash: compute_config_hash(config)?,
            data: data.clone(),
        })
    }

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string(self).map_err(|e| {
            CheckpointError::Serialization(format!("Snapshot serialization failed: {}", e))
        })
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        serde_json::from_str(json).map_err(|e| {
            CheckpointError::Serialization(format!("Snapshot deserialization failed: {}", e))
        })
    }

    /// Return the data after checking the config hash and snapshot integrity
    pub fn restore(self, config: &SolverConfig) -> Result<ScenarioData, CheckpointError> {
        let actual = compute_config_hash(config)?;
        if actual != self.config_hash {
            return Err(CheckpointError::ConfigMismatch {
                expected: self.config_hash,
                actual,
            });
        }
        validate_snapshot(&self)?;
        Ok(self.data)
    }
}

// ============================================================================
// Config Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of a config
///
/// Object keys are sorted before hashing so the hash does not depend on
/// field or map order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, CheckpointError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config).map_err(|e| {
        CheckpointError::Serialization(format!("Config serialization failed: {}", e))
    })?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        CheckpointError::Serialization(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation
// ============================================================================

/// Validate snapshot integrity
///
/// Checks:
/// - recorded years match the data horizon
/// - every year has a graph
/// - flow endpoints exist in the flow's year
/// - evaluated values are finite
///
/// The data horizon itself (non-empty, contiguous, graph per year) is
/// checked when `ScenarioData` is deserialized.
pub fn validate_snapshot(snapshot: &ScenarioSnapshot) -> Result<(), CheckpointError> {
    let data = &snapshot.data;

    // 1. Horizon
    if snapshot.years != data.years() {
        return Err(CheckpointError::Validation(format!(
            "Snapshot years {:?} do not match data years {:?}",
            snapshot.years,
            data.years()
        )));
    }

    for &year in data.years() {
        let Some(graph) = data.graph(year) else {
            return Err(CheckpointError::Validation(format!(
                "Missing graph for year {}",
                year
            )));
        };

        // 2. Referential integrity
        for flow in graph.flows() {
            for endpoint in [flow.source_process_id(), flow.target_process_id()] {
                if graph.process(endpoint).is_none() {
                    return Err(CheckpointError::Validation(format!(
                        "Flow '{}' references missing process '{}' in year {}",
                        flow.id(),
                        endpoint,
                        year
                    )));
                }
            }

            // 3. Numeric sanity
            if !flow.evaluated_value().is_finite() || !flow.evaluated_share().is_finite() {
                return Err(CheckpointError::Validation(format!(
                    "Flow '{}' has a non-finite evaluated value in year {}",
                    flow.id(),
                    year
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Flow, Process};

    fn create_data() -> ScenarioData {
        let mut data = ScenarioData::from_year_range(2020, 2021).unwrap();
        data.insert_process_all_years(Process::new("S", "Source")).unwrap();
        data.insert_process_all_years(Process::new("P", "Process")).unwrap();
        for year in [2020, 2021] {
            data.insert_flow(Flow::absolute("S", "P", year, 4.0)).unwrap();
        }
        data
    }

    #[test]
    fn test_compute_config_hash_deterministic() {
        let hash1 = compute_config_hash(&SolverConfig::default()).unwrap();
        let hash2 = compute_config_hash(&SolverConfig::default()).unwrap();

        assert_eq!(hash1, hash2, "Same config should produce same hash");
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_compute_config_hash_different_for_different_configs() {
        let hash1 = compute_config_hash(&SolverConfig::default()).unwrap();
        let hash2 = compute_config_hash(&SolverConfig::default().with_epsilon(0.5)).unwrap();

        assert_ne!(hash1, hash2, "Different configs should produce different hashes");
    }

    #[test]
    fn test_restore_rejects_other_config() {
        let data = create_data();
        let snapshot =
            ScenarioSnapshot::capture("Baseline", &SolverConfig::default(), &data).unwrap();

        let result = snapshot.restore(&SolverConfig::default().with_virtual_flows(false));
        assert!(matches!(result, Err(CheckpointError::ConfigMismatch { .. })));
    }

    #[test]
    fn test_validate_rejects_year_mismatch() {
        let data = create_data();
        let mut snapshot =
            ScenarioSnapshot::capture("Baseline", &SolverConfig::default(), &data).unwrap();
        snapshot.years.push(2022);

        assert!(matches!(
            validate_snapshot(&snapshot),
            Err(CheckpointError::Validation(_))
        ));
    }

    #[test]
    fn test_json_round_trip_keeps_adjacency() {
        let data = create_data();
        let snapshot =
            ScenarioSnapshot::capture("Baseline", &SolverConfig::default(), &data).unwrap();

        let restored = ScenarioSnapshot::from_json(&snapshot.to_json().unwrap())
            .unwrap()
            .restore(&SolverConfig::default())
            .unwrap();

        let graph = restored.graph(2021).unwrap();
        assert_eq!(graph.inflows("P").unwrap().len(), 1);
        assert_eq!(graph.outflows("S").unwrap().len(), 1);
    }
}
