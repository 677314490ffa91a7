//! Stockflow Engine - dynamic material-flow analysis core
//!
//! Solves a year-by-year network of processes and flows, carries stocks
//! through cohort-based lifetime models and applies scenario flow
//! modifiers on top of a solved baseline.
//!
//! # Architecture
//!
//! - **models**: Domain types (Process, Flow, FlowModifier, ScenarioData)
//! - **stock**: Lifetime distributions and the dynamic stock model
//! - **solver**: FlowSolver (per-year propagation, virtual flows, reports)
//! - **modifiers**: FlowModifierSolver (scenario redistribution)
//! - **orchestrator**: Baseline/alternative runs and checkpoints
//! - **config**: Layered model configuration
//! - **telemetry**: Tracing subscriber setup
//!
//! # Critical Invariants
//!
//! 1. Years are solved strictly in order; stock state of year N feeds N+1
//! 2. Every balanced process conserves mass within `virtual_flows_epsilon`
//! 3. Relative outflow shares of a process never exceed 100% (+0.01)

// Module declarations
pub mod config;
pub mod models;
pub mod modifiers;
pub mod orchestrator;
pub mod solver;
pub mod stock;
pub mod telemetry;

// Re-exports for convenience
pub use config::{ConfigError, ModelConfig};
pub use models::{
    EventLog, Flow, FlowModifier, Indicator, Process, Scenario, ScenarioData, ScenarioDefinition,
    ScenarioType, SolverEvent,
};
pub use modifiers::{FlowModifierSolver, ModifierError, ModifierReport};
pub use orchestrator::{ScenarioError, ScenarioRunner, ScenarioSnapshot, SolvedScenario};
pub use solver::{FlowSolver, SolverConfig, SolverError};
pub use stock::{DynamicStockModel, StockError, StockParameters};
