//! Stock model
//!
//! Thin wrapper over a process with a positive lifetime. All lifetime data
//! is read from the wrapped process.

use super::process::Process;
use crate::stock::{DistributionParams, DistributionType, StockParameters};

#[derive(Debug, Clone, PartialEq)]
pub struct Stock {
    process: Process,
}

impl Stock {
    /// Wrap `process` when it owns a stock
    pub fn from_process(process: &Process) -> Option<Self> {
        process.has_stock().then(|| Self {
            process: process.clone(),
        })
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    pub fn process_id(&self) -> &str {
        self.process.id()
    }

    pub fn lifetime(&self) -> u32 {
        self.process.stock_lifetime()
    }

    pub fn parameters(&self) -> Option<&StockParameters> {
        self.process.stock_parameters()
    }

    pub fn distribution_type(&self) -> Option<DistributionType> {
        self.parameters().map(|p| p.distribution_type())
    }

    pub fn distribution_params(&self) -> Option<&DistributionParams> {
        self.parameters().map(|p| p.params())
    }
}
