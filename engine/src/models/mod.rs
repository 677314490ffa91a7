//! Domain models for material-flow scenarios

pub mod event;
pub mod flow;
pub mod flow_modifier;
pub mod indicator;
pub mod process;
pub mod scenario;
pub mod scenario_data;
pub mod stock;
pub mod year_graph;

// Re-exports
pub use event::{EventLog, SolverEvent};
pub use flow::{Flow, RELATIVE_UNIT};
pub use flow_modifier::{ChangeType, FlowModifier, FlowModifierError, FunctionType};
pub use indicator::Indicator;
pub use process::{Process, VIRTUAL_PROCESS_PREFIX, VIRTUAL_TRANSFORMATION_STAGE};
pub use scenario::{Scenario, ScenarioDefinition, ScenarioType};
pub use scenario_data::{ScenarioData, ScenarioDataError};
pub use stock::Stock;
pub use year_graph::{GraphError, YearGraph};
