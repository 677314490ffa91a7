//! Scenario definitions

use super::flow_modifier::FlowModifier;
use super::scenario_data::ScenarioData;
use serde::{Deserialize, Serialize};

/// Policy applied when flow modifiers cannot be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScenarioType {
    /// Any infeasible modifier aborts the scenario
    Constrained,
    /// Infeasibility is reported, negative flows are clamped to zero
    #[default]
    Unconstrained,
}

/// Name, policy and flow modifiers of one scenario
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    name: String,
    /// `None` defers to the runner's default policy
    #[serde(default)]
    scenario_type: Option<ScenarioType>,
    #[serde(default)]
    flow_modifiers: Vec<FlowModifier>,
}

impl ScenarioDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scenario_type: None,
            flow_modifiers: Vec::new(),
        }
    }

    pub fn with_scenario_type(mut self, scenario_type: ScenarioType) -> Self {
        self.scenario_type = Some(scenario_type);
        self
    }

    pub fn with_flow_modifiers(mut self, flow_modifiers: Vec<FlowModifier>) -> Self {
        self.flow_modifiers = flow_modifiers;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scenario_type(&self) -> Option<ScenarioType> {
        self.scenario_type
    }

    pub fn flow_modifiers(&self) -> &[FlowModifier] {
        &self.flow_modifiers
    }

    pub fn has_flow_modifiers(&self) -> bool {
        !self.flow_modifiers.is_empty()
    }
}

/// Scenario definition together with the data it is solved on
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    definition: ScenarioDefinition,
    data: ScenarioData,
}

impl Scenario {
    pub fn new(definition: ScenarioDefinition, data: ScenarioData) -> Self {
        Self { definition, data }
    }

    pub fn definition(&self) -> &ScenarioDefinition {
        &self.definition
    }

    pub fn data(&self) -> &ScenarioData {
        &self.data
    }

    pub fn into_parts(self) -> (ScenarioDefinition, ScenarioData) {
        (self.definition, self.data)
    }
}
