//! Orchestrator - scenario runs and checkpoints
//!
//! See `runner.rs` for the baseline/alternative pipeline and
//! `checkpoint.rs` for snapshots of solved data.

pub mod checkpoint;
pub mod runner;

use crate::models::ScenarioDataError;
use crate::modifiers::ModifierError;
use crate::solver::SolverError;
use thiserror::Error;

pub use checkpoint::{compute_config_hash, validate_snapshot, CheckpointError, ScenarioSnapshot};
pub use runner::{ScenarioRunner, SolvedScenario};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScenarioError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scenario '{scenario}': {source}")]
    Solver {
        scenario: String,
        source: SolverError,
    },

    #[error("Scenario '{scenario}': {source}")]
    Modifier {
        scenario: String,
        source: ModifierError,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Data(#[from] ScenarioDataError),
}
