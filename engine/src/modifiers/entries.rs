//! Feasibility errors and planned flow changes

use serde::{Deserialize, Serialize};

/// Kind of feasibility failure of a flow modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlowErrorType {
    #[default]
    Undefined,
    /// Source process cannot supply the outflow the modifiers require
    NotEnoughTotalOutflows,
    /// Named opposite flows hold too little share to give up
    NotEnoughOppositeFlowShares,
    /// Sibling flows hold too little share to give up
    NotEnoughSiblingFlowShares,
}

/// Share figures of a share shortfall, all as fractions in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowErrorData {
    /// Target flow share in the modifier's first year
    pub start_share: f64,
    /// Share the receiving flows can give up
    pub available_share: f64,
    /// Share the target flow needs beyond its first-year share
    pub required_share: f64,
}

impl FlowErrorData {
    /// Largest change in percent the receiving flows could absorb
    pub fn max_change_in_value(&self) -> Option<f64> {
        if self.start_share <= 0.0 {
            return None;
        }
        Some(((self.start_share + self.available_share) / self.start_share - 1.0) * 100.0 - 0.001)
    }
}

/// Worst-year feasibility failure of one modifier (or modifier group)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowErrorEntry {
    pub year: i32,
    pub outflows_total: f64,
    pub outflows_required: f64,
    /// Position of the offending modifier in the solved batch
    pub flow_modifier_index: usize,
    pub error_type: FlowErrorType,
    pub data: Option<FlowErrorData>,
}

impl FlowErrorEntry {
    /// Negative when the requirement exceeds what is available
    pub fn outflows_missing(&self) -> f64 {
        self.outflows_total - self.outflows_required
    }
}

/// Planned change of one flow in one year
///
/// Target entries overwrite the flow with the trajectory value; offset
/// entries shift a receiving flow by the inverse of the target's movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowChangeEntry {
    pub flow_modifier_index: usize,
    pub year: i32,
    pub flow_id: String,
    pub value: f64,
    pub evaluated_share: f64,
    pub evaluated_value: f64,
    pub evaluated_offset: f64,
    /// Offset of the raw percentage, relative flows only
    pub evaluated_share_offset: f64,
    pub is_target: bool,
}

impl FlowChangeEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn target(
        flow_modifier_index: usize,
        year: i32,
        flow_id: impl Into<String>,
        value: f64,
        evaluated_share: f64,
        evaluated_value: f64,
        evaluated_offset: f64,
        evaluated_share_offset: f64,
    ) -> Self {
        Self {
            flow_modifier_index,
            year,
            flow_id: flow_id.into(),
            value,
            evaluated_share,
            evaluated_value,
            evaluated_offset,
            evaluated_share_offset,
            is_target: true,
        }
    }

    pub fn offset(
        flow_modifier_index: usize,
        year: i32,
        flow_id: impl Into<String>,
        evaluated_offset: f64,
        evaluated_share_offset: f64,
    ) -> Self {
        Self {
            flow_modifier_index,
            year,
            flow_id: flow_id.into(),
            value: 0.0,
            evaluated_share: 0.0,
            evaluated_value: 0.0,
            evaluated_offset,
            evaluated_share_offset,
            is_target: false,
        }
    }
}
