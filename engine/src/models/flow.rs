//! Flow model
//!
//! A flow connects a source process to a target process for one year.
//! Its raw `value` is either an absolute quantity or, when the unit is
//! `"%"`, a share (0-100) of the source process's distributable output.
//!
//! # Critical Invariants
//!
//! - **Composite id**: `"{source} {target}"`, unique within one year only.
//! - **Absolute passthrough**: once prepared for a timestep an absolute
//!   flow has `evaluated_value == value` and `evaluated_share == 1.0`.
//! - **Relative shares**: `evaluated_share` is the `[0, 1]` normalisation of
//!   `value`; `evaluated_value` is always an absolute quantity.
//!
//! # Example
//!
//! ```rust
//! use stockflow_engine::models::Flow;
//!
//! let flow = Flow::relative("P", "A", 2020, 60.0);
//! assert_eq!(flow.id(), "P A");
//! assert!(!flow.is_unit_absolute_value());
//! ```

use super::indicator::Indicator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unit marking a flow as relative
pub const RELATIVE_UNIT: &str = "%";

/// Directed flow between two processes in one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    id: String,
    source_process_id: String,
    target_process_id: String,
    year: i32,
    value: f64,
    #[serde(default)]
    unit: String,

    /// Indicator name -> conversion factor
    #[serde(default)]
    conversion_factors: BTreeMap<String, f64>,

    /// Indicator name -> evaluated indicator value
    #[serde(default)]
    indicator_values: BTreeMap<String, f64>,

    #[serde(default)]
    evaluated_share: f64,
    #[serde(default)]
    evaluated_value: f64,
    #[serde(default)]
    is_evaluated: bool,
    #[serde(default)]
    is_virtual: bool,
    #[serde(default)]
    is_prioritized: bool,
    #[serde(default)]
    row_number: Option<usize>,
}

impl Flow {
    pub fn new(
        source_process_id: impl Into<String>,
        target_process_id: impl Into<String>,
        year: i32,
        value: f64,
        unit: impl Into<String>,
    ) -> Self {
        let source_process_id = source_process_id.into();
        let target_process_id = target_process_id.into();
        let unit = unit.into();
        let evaluated_share = if unit == RELATIVE_UNIT {
            value / 100.0
        } else {
            1.0
        };

        Self {
            id: Self::make_id(&source_process_id, &target_process_id),
            source_process_id,
            target_process_id,
            year,
            value,
            unit,
            conversion_factors: BTreeMap::new(),
            indicator_values: BTreeMap::new(),
            evaluated_share,
            evaluated_value: 0.0,
            is_evaluated: false,
            is_virtual: false,
            is_prioritized: false,
            row_number: None,
        }
    }

    /// Absolute flow with an empty unit
    pub fn absolute(
        source_process_id: impl Into<String>,
        target_process_id: impl Into<String>,
        year: i32,
        value: f64,
    ) -> Self {
        Self::new(source_process_id, target_process_id, year, value, "")
    }

    /// Relative flow, `share` in percent
    pub fn relative(
        source_process_id: impl Into<String>,
        target_process_id: impl Into<String>,
        year: i32,
        share: f64,
    ) -> Self {
        Self::new(source_process_id, target_process_id, year, share, RELATIVE_UNIT)
    }

    /// Evaluated absolute flow created to balance a process
    pub fn new_virtual(
        source_process_id: impl Into<String>,
        target_process_id: impl Into<String>,
        year: i32,
        value: f64,
    ) -> Self {
        let mut flow = Self::absolute(source_process_id, target_process_id, year, value);
        flow.is_virtual = true;
        flow.is_evaluated = true;
        flow.evaluated_value = value;
        flow
    }

    pub fn make_id(source_process_id: &str, target_process_id: &str) -> String {
        format!("{} {}", source_process_id, target_process_id)
    }

    pub fn with_conversion_factor(mut self, indicator: impl Into<String>, factor: f64) -> Self {
        self.conversion_factors.insert(indicator.into(), factor);
        self
    }

    pub fn with_row_number(mut self, row_number: usize) -> Self {
        self.row_number = Some(row_number);
        self
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_process_id(&self) -> &str {
        &self.source_process_id
    }

    pub fn target_process_id(&self) -> &str {
        &self.target_process_id
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Any unit other than `"%"` (including empty) is absolute
    pub fn is_unit_absolute_value(&self) -> bool {
        self.unit != RELATIVE_UNIT
    }

    pub fn conversion_factors(&self) -> &BTreeMap<String, f64> {
        &self.conversion_factors
    }

    pub fn indicator_values(&self) -> &BTreeMap<String, f64> {
        &self.indicator_values
    }

    pub fn indicator_value(&self, indicator: &str) -> Option<f64> {
        self.indicator_values.get(indicator).copied()
    }

    pub fn evaluated_share(&self) -> f64 {
        self.evaluated_share
    }

    pub fn evaluated_value(&self) -> f64 {
        self.evaluated_value
    }

    pub fn is_evaluated(&self) -> bool {
        self.is_evaluated
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn is_prioritized(&self) -> bool {
        self.is_prioritized
    }

    pub fn row_number(&self) -> Option<usize> {
        self.row_number
    }

    // ========================================================================
    // Mutation (solver side)
    // ========================================================================

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub fn set_evaluated_value(&mut self, value: f64) {
        self.evaluated_value = value;
    }

    pub fn set_evaluated_share(&mut self, share: f64) {
        self.evaluated_share = share;
    }

    pub fn set_evaluated(&mut self, is_evaluated: bool) {
        self.is_evaluated = is_evaluated;
    }

    pub fn set_prioritized(&mut self, is_prioritized: bool) {
        self.is_prioritized = is_prioritized;
    }

    /// Shift both raw and evaluated value of an absolute flow
    pub fn add_to_value(&mut self, amount: f64) {
        self.value += amount;
        self.evaluated_value += amount;
    }

    /// Derive indicator values from the evaluated value
    pub fn evaluate_indicators(&mut self, indicators: &[Indicator]) {
        for indicator in indicators {
            let factor = self
                .conversion_factors
                .get(indicator.name())
                .copied()
                .unwrap_or_else(|| indicator.default_conversion_factor());
            self.indicator_values
                .insert(indicator.name().to_string(), self.evaluated_value * factor);
        }
    }
}
