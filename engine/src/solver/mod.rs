//! Flow solver - per-year propagation of flow values
//!
//! - **config**: solver knobs (virtual flows, epsilon, priorities)
//! - **timestep**: worklist propagation of one year
//! - **flow_solver**: year loop, stock models and query API
//! - **report**: tabular records of solved processes and flows

pub mod config;
pub mod flow_solver;
pub mod report;
mod timestep;

use crate::models::GraphError;
use crate::stock::StockError;
use thiserror::Error;

pub use config::SolverConfig;
pub use flow_solver::{FlowSolver, ProcessFlows};
pub use report::{FlowRecord, ProcessRecord};
pub use timestep::TimestepSummary;

/// Fatal errors of a flow solve
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SolverError {
    #[error("Invalid solver config: {0}")]
    InvalidConfig(String),

    #[error(
        "Unsolvable loop in year {year} after {iterations} iterations, \
         check processes {suspect_process_ids:?}"
    )]
    UnsolvableLoop {
        year: i32,
        iterations: usize,
        suspect_process_ids: Vec<String>,
    },

    #[error(
        "Prioritized outflows ({prioritized}) of process '{process_id}' exceed \
         its inflows ({inflows}) in year {year}"
    )]
    PrioritizedOutflowExceedsInflow {
        process_id: String,
        year: i32,
        prioritized: f64,
        inflows: f64,
    },

    #[error(
        "Stock outflow ({stock_outflow}) of process '{process_id}' is less than \
         the sum of its absolute outflows ({absolute_outflows}) in year {year}"
    )]
    StockOutflowBelowAbsoluteOutflows {
        process_id: String,
        year: i32,
        stock_outflow: f64,
        absolute_outflows: f64,
    },

    #[error("Year {0} is not part of the scenario")]
    YearNotFound(i32),

    #[error("Process '{process_id}' not found in year {year}")]
    ProcessNotFound { process_id: String, year: i32 },

    #[error("Flow '{flow_id}' not found in year {year}")]
    FlowNotFound { flow_id: String, year: i32 },

    #[error("Stock of process '{process_id}': {source}")]
    Stock {
        process_id: String,
        source: StockError,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),
}
