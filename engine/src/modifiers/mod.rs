//! Flow modifiers - scenario redistribution of solved flows
//!
//! - **trajectory**: per-year target values of a modified flow
//! - **entries**: feasibility errors and planned flow changes
//! - **solver**: FlowModifierSolver (feasibility checks, application,
//!   consistency checks)

pub mod entries;
pub mod solver;
pub mod trajectory;

use crate::models::FlowModifierError;
use crate::solver::SolverError;
use serde::Serialize;
use thiserror::Error;

pub use entries::{FlowChangeEntry, FlowErrorData, FlowErrorEntry, FlowErrorType};
pub use solver::FlowModifierSolver;
pub use trajectory::{calculate_new_flow_values, ramp, FlowBaseline, Trajectory};

/// Outcome of applying a batch of flow modifiers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModifierReport {
    /// Feasibility errors tolerated in Unconstrained mode
    pub errors: Vec<FlowErrorEntry>,
    /// Human-readable description of every error and failed check
    pub diagnostics: Vec<String>,
    pub changes_applied: usize,
    pub flows_clamped: usize,
}

impl ModifierReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.diagnostics.is_empty()
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModifierError {
    #[error("Invalid flow modifier at index {index}: {source}")]
    InvalidModifier {
        index: usize,
        source: FlowModifierError,
    },

    #[error("Flow modifier targets flow '{flow_id}' which does not exist in year {year}")]
    TargetFlowMissing { flow_id: String, year: i32 },

    #[error("Flow modifier for flow '{flow_id}' covers year {year} outside the scenario years")]
    YearOutOfRange { flow_id: String, year: i32 },

    #[error("Flow modifiers are infeasible: {}", .diagnostics.join("; "))]
    Infeasible {
        diagnostics: Vec<String>,
        errors: Vec<FlowErrorEntry>,
    },

    #[error("Flow modifier results are inconsistent: {}", .diagnostics.join("; "))]
    InconsistentResults { diagnostics: Vec<String> },

    #[error(transparent)]
    Solver(#[from] SolverError),
}
