//! Process model
//!
//! A process is a node of the material-flow graph: a place where material
//! is transformed, stored or handed on. Processes that carry stock
//! parameters with a positive lifetime own a stock.

use crate::stock::StockParameters;
use serde::{Deserialize, Serialize};

/// Id prefix of processes synthesized to absorb mass-balance discrepancies
pub const VIRTUAL_PROCESS_PREFIX: &str = "VP_";

/// Transformation stage assigned to virtual processes
pub const VIRTUAL_TRANSFORMATION_STAGE: &str = "Virtual";

/// Node of the process graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    id: String,
    name: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    transformation_stage: String,
    #[serde(default)]
    stock: Option<StockParameters>,
    #[serde(default)]
    is_virtual: bool,
    #[serde(default)]
    row_number: Option<usize>,
}

impl Process {
    /// Create a process without location, stage or stock
    ///
    /// # Example
    /// ```
    /// use stockflow_engine::models::Process;
    ///
    /// let process = Process::new("SAW", "Sawmill").with_location("FI");
    /// assert_eq!(process.location(), "FI");
    /// assert!(!process.has_stock());
    /// ```
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: String::new(),
            transformation_stage: String::new(),
            stock: None,
            is_virtual: false,
            row_number: None,
        }
    }

    /// Virtual counterpart of `process`, named `VP_<id>`
    pub fn new_virtual(process: &Process) -> Self {
        Self {
            id: Self::virtual_id(&process.id),
            name: format!("{}{}", VIRTUAL_PROCESS_PREFIX, process.name),
            location: process.location.clone(),
            transformation_stage: VIRTUAL_TRANSFORMATION_STAGE.to_string(),
            stock: None,
            is_virtual: true,
            row_number: None,
        }
    }

    pub fn virtual_id(process_id: &str) -> String {
        format!("{}{}", VIRTUAL_PROCESS_PREFIX, process_id)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_transformation_stage(mut self, stage: impl Into<String>) -> Self {
        self.transformation_stage = stage.into();
        self
    }

    pub fn with_stock(mut self, stock: StockParameters) -> Self {
        self.stock = Some(stock);
        self
    }

    pub fn with_row_number(mut self, row_number: usize) -> Self {
        self.row_number = Some(row_number);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn transformation_stage(&self) -> &str {
        &self.transformation_stage
    }

    pub fn stock_parameters(&self) -> Option<&StockParameters> {
        self.stock.as_ref()
    }

    /// Stock lifetime, 0 when the process has no stock parameters
    pub fn stock_lifetime(&self) -> u32 {
        self.stock.as_ref().map_or(0, |s| s.lifetime())
    }

    /// Lifetime > 0 means the process owns a stock
    pub fn has_stock(&self) -> bool {
        self.stock_lifetime() > 0
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn row_number(&self) -> Option<usize> {
        self.row_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_process_naming() {
        let process = Process::new("P1", "Pulp mill").with_location("SE");
        let virtual_process = Process::new_virtual(&process);

        assert_eq!(virtual_process.id(), "VP_P1");
        assert_eq!(virtual_process.name(), "VP_Pulp mill");
        assert_eq!(virtual_process.transformation_stage(), "Virtual");
        assert_eq!(virtual_process.location(), "SE");
        assert!(virtual_process.is_virtual());
        assert!(!virtual_process.has_stock());
    }

    #[test]
    fn test_zero_lifetime_is_not_a_stock() {
        let process = Process::new("P", "P").with_stock(StockParameters::fixed(0));
        assert!(process.stock_parameters().is_some());
        assert!(!process.has_stock());

        let stocked = Process::new("S", "S").with_stock(StockParameters::fixed(12));
        assert!(stocked.has_stock());
        assert_eq!(stocked.stock_lifetime(), 12);
    }
}
