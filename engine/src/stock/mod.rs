//! Stock accumulation with residence-time distributions
//!
//! - **distribution**: lifetime parameters and survival functions
//! - **model**: inflow-driven cohort accounting

pub mod distribution;
pub mod model;

use thiserror::Error;

pub use distribution::{
    DistributionParams, DistributionType, LandfillCondition, LifetimeDistribution,
    StockParameters,
};
pub use model::DynamicStockModel;

/// Errors raised while building or feeding a stock model
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StockError {
    #[error("Unknown stock distribution type '{0}'")]
    UnknownDistributionType(String),

    #[error("Stock distribution type '{distribution}' needs parameter '{parameter}'")]
    MissingParameter {
        distribution: DistributionType,
        parameter: &'static str,
    },

    #[error("Stock distribution parameter '{parameter}' must be positive, got {value}")]
    InvalidParameter { parameter: &'static str, value: f64 },

    #[error("Stock distribution type '{0}' needs named parameters, not a single number")]
    ScalarNotAllowed(DistributionType),

    #[error("Unknown landfill condition '{0}' (expected 'Dry' or 'Wet')")]
    UnknownCondition(String),

    #[error("Invalid lifetime distribution: {0}")]
    InvalidDistribution(String),

    #[error("Year index {index} out of range for stock with {len} years")]
    YearIndexOutOfRange { index: usize, len: usize },
}
