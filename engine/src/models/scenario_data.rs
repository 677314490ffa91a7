//! Scenario data container
//!
//! Holds the contiguous year horizon, one arena graph per year, the unique
//! process definitions and the indicator declarations of one scenario.
//!
//! # Critical Invariants
//!
//! - **Contiguous years**: `years` is ascending with a step of one.
//! - **Known endpoints**: every flow's source and target exist in the year
//!   graph it was inserted into (enforced by `YearGraph`).
//! - **Explicit forking**: alternative scenarios start from
//!   [`ScenarioData::fork`], which copies the graphs without virtual
//!   entities.
//!
//! # Example
//!
//! ```rust
//! use stockflow_engine::models::{Flow, Process, ScenarioData};
//!
//! let mut data = ScenarioData::from_year_range(2020, 2021).unwrap();
//! data.insert_process_all_years(Process::new("S", "Source")).unwrap();
//! data.insert_process_all_years(Process::new("P", "Process")).unwrap();
//! data.insert_flow(Flow::absolute("S", "P", 2021, 10.0)).unwrap();
//!
//! assert_eq!(data.years(), &[2020, 2021]);
//! assert!(data.graph(2021).unwrap().flow("S P").is_some());
//! assert!(data.graph(2020).unwrap().flow("S P").is_none());
//! ```

use super::flow::Flow;
use super::indicator::Indicator;
use super::process::Process;
use super::stock::Stock;
use super::year_graph::{GraphError, YearGraph};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while assembling scenario data
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScenarioDataError {
    #[error("Scenario must contain at least one year")]
    NoYears,

    #[error("Years must be contiguous and ascending, found {previous} followed by {next}")]
    NonContiguousYears { previous: i32, next: i32 },

    #[error("Year {0} is not part of the scenario")]
    UnknownYear(i32),

    #[error("Graphs cover years {found:?}, scenario years are {expected:?}")]
    GraphYearsMismatch { expected: Vec<i32>, found: Vec<i32> },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Serialized form: the horizon is re-validated on load
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScenarioDataRecord {
    years: Vec<i32>,
    graphs: BTreeMap<i32, YearGraph>,
    unique_processes: BTreeMap<String, Process>,
    #[serde(default)]
    indicators: Vec<Indicator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScenarioDataRecord", into = "ScenarioDataRecord")]
pub struct ScenarioData {
    years: Vec<i32>,
    graphs: BTreeMap<i32, YearGraph>,
    unique_processes: BTreeMap<String, Process>,
    indicators: Vec<Indicator>,
}

impl ScenarioData {
    pub fn new(years: Vec<i32>) -> Result<Self, ScenarioDataError> {
        if years.is_empty() {
            return Err(ScenarioDataError::NoYears);
        }
        for pair in years.windows(2) {
            if pair[1] != pair[0] + 1 {
                return Err(ScenarioDataError::NonContiguousYears {
                    previous: pair[0],
                    next: pair[1],
                });
            }
        }

        let graphs = years.iter().map(|&y| (y, YearGraph::new(y))).collect();
        Ok(Self {
            years,
            graphs,
            unique_processes: BTreeMap::new(),
            indicators: Vec::new(),
        })
    }

    /// Inclusive year range
    pub fn from_year_range(start_year: i32, end_year: i32) -> Result<Self, ScenarioDataError> {
        Self::new((start_year..=end_year).collect())
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn first_year(&self) -> i32 {
        self.years[0]
    }

    pub fn last_year(&self) -> i32 {
        self.years[self.years.len() - 1]
    }

    pub fn year_index(&self, year: i32) -> Option<usize> {
        year.checked_sub(self.first_year())
            .and_then(|offset| usize::try_from(offset).ok())
            .filter(|&index| index < self.years.len())
    }

    // ========================================================================
    // Assembly
    // ========================================================================

    /// Add a process to one year's graph
    ///
    /// The first definition seen for an id becomes its unique definition.
    pub fn insert_process(&mut self, year: i32, process: Process) -> Result<(), ScenarioDataError> {
        let graph = self
            .graphs
            .get_mut(&year)
            .ok_or(ScenarioDataError::UnknownYear(year))?;
        if !process.is_virtual() {
            self.unique_processes
                .entry(process.id().to_string())
                .or_insert_with(|| process.clone());
        }
        graph.insert_process(process)?;
        Ok(())
    }

    pub fn insert_process_all_years(&mut self, process: Process) -> Result<(), ScenarioDataError> {
        for year in self.years.clone() {
            self.insert_process(year, process.clone())?;
        }
        Ok(())
    }

    /// Add a flow to the graph of its own year
    pub fn insert_flow(&mut self, flow: Flow) -> Result<(), ScenarioDataError> {
        let year = flow.year();
        let graph = self
            .graphs
            .get_mut(&year)
            .ok_or(ScenarioDataError::UnknownYear(year))?;
        graph.insert_flow(flow)?;
        Ok(())
    }

    pub fn add_indicator(&mut self, indicator: Indicator) {
        self.indicators.push(indicator);
    }

    // ========================================================================
    // Access
    // ========================================================================

    pub fn graph(&self, year: i32) -> Option<&YearGraph> {
        self.graphs.get(&year)
    }

    pub fn graph_mut(&mut self, year: i32) -> Option<&mut YearGraph> {
        self.graphs.get_mut(&year)
    }

    /// Mutable graph plus the indicator declarations, borrowed together
    pub fn graph_and_indicators_mut(
        &mut self,
        year: i32,
    ) -> Option<(&mut YearGraph, &[Indicator])> {
        let graph = self.graphs.get_mut(&year)?;
        Some((graph, &self.indicators))
    }

    pub fn graphs(&self) -> impl Iterator<Item = &YearGraph> {
        self.graphs.values()
    }

    pub fn indicators(&self) -> &[Indicator] {
        &self.indicators
    }

    pub fn unique_processes(&self) -> &BTreeMap<String, Process> {
        &self.unique_processes
    }

    /// First occurrence of every flow id across the horizon
    pub fn unique_flows(&self) -> BTreeMap<String, Flow> {
        let mut flows = BTreeMap::new();
        for graph in self.graphs.values() {
            for flow in graph.flows() {
                flows
                    .entry(flow.id().to_string())
                    .or_insert_with(|| flow.clone());
            }
        }
        flows
    }

    /// Stocks of all processes with a positive lifetime
    pub fn stocks(&self) -> Vec<Stock> {
        self.unique_processes
            .values()
            .filter_map(Stock::from_process)
            .collect()
    }

    /// Copy used as the starting point of a dependent scenario
    ///
    /// Virtual processes and flows are dropped because the dependent solve
    /// creates its own. Evaluated values are kept.
    pub fn fork(&self) -> ScenarioData {
        Self {
            years: self.years.clone(),
            graphs: self
                .graphs
                .iter()
                .map(|(&year, graph)| (year, graph.without_virtual()))
                .collect(),
            unique_processes: self.unique_processes.clone(),
            indicators: self.indicators.clone(),
        }
    }
}

impl TryFrom<ScenarioDataRecord> for ScenarioData {
    type Error = ScenarioDataError;

    fn try_from(record: ScenarioDataRecord) -> Result<Self, Self::Error> {
        let mut data = ScenarioData::new(record.years)?;
        let keys_match = record.graphs.keys().eq(data.years.iter());
        if !keys_match || record.graphs.iter().any(|(&year, graph)| graph.year() != year) {
            return Err(ScenarioDataError::GraphYearsMismatch {
                expected: data.years,
                found: record.graphs.values().map(YearGraph::year).collect(),
            });
        }
        data.graphs = record.graphs;
        data.unique_processes = record.unique_processes;
        data.indicators = record.indicators;
        Ok(data)
    }
}

impl From<ScenarioData> for ScenarioDataRecord {
    fn from(data: ScenarioData) -> Self {
        Self {
            years: data.years,
            graphs: data.graphs,
            unique_processes: data.unique_processes,
            indicators: data.indicators,
        }
    }
}
