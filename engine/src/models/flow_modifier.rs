//! Flow modifier model
//!
//! A flow modifier is a scenario rule that moves one flow along a
//! trajectory over a year range and pushes the compensating change onto
//! designated opposite flows or onto the target's siblings.
//!
//! # Example
//!
//! ```rust
//! use stockflow_engine::models::{FlowModifier, FunctionType};
//!
//! let modifier = FlowModifier::with_change_in_value("P", "A", 2020, 2025, 20.0)
//!     .with_function_type(FunctionType::Linear)
//!     .with_opposite_targets(vec!["B".to_string()]);
//!
//! assert_eq!(modifier.target_flow_id(), "P A");
//! assert_eq!(modifier.opposite_flow_ids(), vec!["P B".to_string()]);
//! assert!(modifier.validate().is_ok());
//! ```

use super::flow::Flow;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

/// How `change_in_value` is interpreted for absolute flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChangeType {
    /// Additive change in flow units
    #[default]
    Value,
    /// Change in percent of the first-year value
    Proportional,
}

/// Shape of the ramp between the first and last year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FunctionType {
    Constant,
    #[default]
    Linear,
    Exponential,
    Sigmoid,
}

/// Errors raised when a flow modifier is malformed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlowModifierError {
    #[error(
        "Flow modifier for flow '{flow_id}' must define exactly one of \
         change_in_value and target_value"
    )]
    AmbiguousChange { flow_id: String },

    #[error(
        "Flow modifier for flow '{flow_id}' has start year {start_year} after \
         end year {end_year}"
    )]
    InvalidYearRange {
        flow_id: String,
        start_year: i32,
        end_year: i32,
    },

    #[error("Flow modifier for flow '{flow_id}' uses proportional change with a target value")]
    ProportionalTarget { flow_id: String },

    #[error("Flow modifier for flow '{flow_id}' has non-finite value {value}")]
    NonFiniteValue { flow_id: String, value: f64 },
}

/// Scenario rule altering one flow over a year range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowModifier {
    source_process_id: String,
    target_process_id: String,
    #[serde(default)]
    change_in_value: Option<f64>,
    #[serde(default)]
    target_value: Option<f64>,
    #[serde(default)]
    change_type: ChangeType,
    start_year: i32,
    end_year: i32,
    #[serde(default)]
    function_type: FunctionType,
    #[serde(default)]
    opposite_target_process_ids: Vec<String>,
    #[serde(default = "default_apply_to_targets")]
    apply_to_targets: bool,
    #[serde(default)]
    row_number: Option<usize>,
}

fn default_apply_to_targets() -> bool {
    true
}

impl FlowModifier {
    fn base(
        source_process_id: impl Into<String>,
        target_process_id: impl Into<String>,
        start_year: i32,
        end_year: i32,
    ) -> Self {
        Self {
            source_process_id: source_process_id.into(),
            target_process_id: target_process_id.into(),
            change_in_value: None,
            target_value: None,
            change_type: ChangeType::Value,
            start_year,
            end_year,
            function_type: FunctionType::Linear,
            opposite_target_process_ids: Vec::new(),
            apply_to_targets: true,
            row_number: None,
        }
    }

    /// Modifier that changes the flow by `change` at the end of the range
    pub fn with_change_in_value(
        source_process_id: impl Into<String>,
        target_process_id: impl Into<String>,
        start_year: i32,
        end_year: i32,
        change: f64,
    ) -> Self {
        let mut modifier = Self::base(source_process_id, target_process_id, start_year, end_year);
        modifier.change_in_value = Some(change);
        modifier
    }

    /// Modifier that moves the flow to `target` by the end of the range
    pub fn with_target_value(
        source_process_id: impl Into<String>,
        target_process_id: impl Into<String>,
        start_year: i32,
        end_year: i32,
        target: f64,
    ) -> Self {
        let mut modifier = Self::base(source_process_id, target_process_id, start_year, end_year);
        modifier.target_value = Some(target);
        modifier
    }

    pub fn with_change_type(mut self, change_type: ChangeType) -> Self {
        self.change_type = change_type;
        self
    }

    pub fn with_function_type(mut self, function_type: FunctionType) -> Self {
        self.function_type = function_type;
        self
    }

    pub fn with_opposite_targets(mut self, process_ids: Vec<String>) -> Self {
        self.opposite_target_process_ids = process_ids;
        self
    }

    pub fn with_apply_to_targets(mut self, apply_to_targets: bool) -> Self {
        self.apply_to_targets = apply_to_targets;
        self
    }

    pub fn with_row_number(mut self, row_number: usize) -> Self {
        self.row_number = Some(row_number);
        self
    }

    pub fn validate(&self) -> Result<(), FlowModifierError> {
        let flow_id = self.target_flow_id();

        let value = match (self.change_in_value, self.target_value) {
            (Some(v), None) | (None, Some(v)) => v,
            _ => return Err(FlowModifierError::AmbiguousChange { flow_id }),
        };
        if !value.is_finite() {
            return Err(FlowModifierError::NonFiniteValue { flow_id, value });
        }

        if self.start_year > self.end_year {
            return Err(FlowModifierError::InvalidYearRange {
                flow_id,
                start_year: self.start_year,
                end_year: self.end_year,
            });
        }

        if self.target_value.is_some() && self.change_type == ChangeType::Proportional {
            return Err(FlowModifierError::ProportionalTarget { flow_id });
        }

        Ok(())
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub fn source_process_id(&self) -> &str {
        &self.source_process_id
    }

    pub fn target_process_id(&self) -> &str {
        &self.target_process_id
    }

    pub fn target_flow_id(&self) -> String {
        Flow::make_id(&self.source_process_id, &self.target_process_id)
    }

    pub fn change_in_value(&self) -> Option<f64> {
        self.change_in_value
    }

    pub fn target_value(&self) -> Option<f64> {
        self.target_value
    }

    pub fn is_change_in_value(&self) -> bool {
        self.change_in_value.is_some()
    }

    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub fn function_type(&self) -> FunctionType {
        self.function_type
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn end_year(&self) -> i32 {
        self.end_year
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.start_year..=self.end_year
    }

    pub fn opposite_target_process_ids(&self) -> &[String] {
        &self.opposite_target_process_ids
    }

    pub fn has_opposite_targets(&self) -> bool {
        !self.opposite_target_process_ids.is_empty()
    }

    pub fn opposite_flow_ids(&self) -> Vec<String> {
        self.opposite_target_process_ids
            .iter()
            .map(|target| Flow::make_id(&self.source_process_id, target))
            .collect()
    }

    pub fn apply_to_targets(&self) -> bool {
        self.apply_to_targets
    }

    pub fn row_number(&self) -> Option<usize> {
        self.row_number
    }
}
