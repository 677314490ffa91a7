//! FlowSolver - year-by-year evaluation of a scenario's flow graph
//!
//! Owns the scenario data and one stock model per stock-owning process,
//! solves the years in order and exposes query and mutation access to
//! processes and flows by year.
//!
//! # Critical Invariants
//!
//! - **Sequential years**: year N is fully solved (including stock state)
//!   before year N+1 starts.
//! - **Mass balance**: after a solve every evaluated, non-virtual process
//!   that has inflows and outflows balances within `virtual_flows_epsilon`
//!   (stock processes balance stock outflow against outflows).
//! - **Current year**: queries with `year = None` address the year being
//!   solved, or the last solved year once the solve finished.
//!
//! # Example
//!
//! ```rust
//! use stockflow_engine::models::{Flow, Process, ScenarioData};
//! use stockflow_engine::solver::{FlowSolver, SolverConfig};
//!
//! let mut data = ScenarioData::from_year_range(2020, 2020).unwrap();
//! for id in ["S", "P", "A", "B"] {
//!     data.insert_process_all_years(Process::new(id, id)).unwrap();
//! }
//! data.insert_flow(Flow::absolute("S", "P", 2020, 100.0)).unwrap();
//! data.insert_flow(Flow::relative("P", "A", 2020, 60.0)).unwrap();
//! data.insert_flow(Flow::relative("P", "B", 2020, 40.0)).unwrap();
//!
//! let mut solver = FlowSolver::new(data, SolverConfig::default()).unwrap();
//! solver.solve_timesteps().unwrap();
//!
//! assert_eq!(solver.get_flow("P A", Some(2020)).unwrap().evaluated_value(), 60.0);
//! assert_eq!(solver.get_flow("P B", None).unwrap().evaluated_value(), 40.0);
//! ```

use super::config::SolverConfig;
use super::timestep::{Timestep, TimestepSummary};
use super::SolverError;
use crate::models::{EventLog, Flow, Process, ScenarioData, SolverEvent, Stock, YearGraph};
use crate::stock::DynamicStockModel;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A process with its inflows and outflows in one year
#[derive(Debug, Clone)]
pub struct ProcessFlows<'a> {
    pub process: &'a Process,
    pub inflows: Vec<&'a Flow>,
    pub outflows: Vec<&'a Flow>,
}

pub struct FlowSolver {
    config: SolverConfig,
    data: ScenarioData,
    current_year_index: usize,
    stock_models: BTreeMap<String, DynamicStockModel>,
    event_log: EventLog,
    summaries: Vec<TimestepSummary>,
}

impl FlowSolver {
    /// Create a solver over `data`
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or a stock's lifetime
    /// parameters cannot produce a distribution.
    pub fn new(data: ScenarioData, config: SolverConfig) -> Result<Self, SolverError> {
        config.validate().map_err(SolverError::InvalidConfig)?;

        let mut stock_models = BTreeMap::new();
        for stock in data.stocks() {
            let Some(parameters) = stock.parameters() else {
                continue;
            };
            let model = DynamicStockModel::new(data.years().to_vec(), parameters).map_err(
                |source| SolverError::Stock {
                    process_id: stock.process_id().to_string(),
                    source,
                },
            )?;
            stock_models.insert(stock.process_id().to_string(), model);
        }

        info!(
            years = data.years().len(),
            processes = data.unique_processes().len(),
            stocks = stock_models.len(),
            "Flow solver created"
        );

        Ok(Self {
            config,
            data,
            current_year_index: 0,
            stock_models,
            event_log: EventLog::new(),
            summaries: Vec::new(),
        })
    }

    // ========================================================================
    // Solving
    // ========================================================================

    /// Solve every year of the horizon in order
    pub fn solve_timesteps(&mut self) -> Result<(), SolverError> {
        self.summaries.clear();
        for index in 0..self.data.years().len() {
            self.current_year_index = index;
            self.solve_timestep()?;
        }
        Ok(())
    }

    fn solve_timestep(&mut self) -> Result<(), SolverError> {
        let year = self.data.years()[self.current_year_index];
        let (graph, indicators) = self
            .data
            .graph_and_indicators_mut(year)
            .ok_or(SolverError::YearNotFound(year))?;

        let summary = Timestep::new(
            year,
            self.current_year_index,
            graph,
            indicators,
            &self.config,
            &mut self.stock_models,
            &mut self.event_log,
        )
        .run()?;

        info!(
            year,
            iterations = summary.iterations,
            evaluated_processes = summary.evaluated_processes,
            "Timestep solved"
        );
        self.summaries.push(summary);
        Ok(())
    }

    /// Set negative evaluated values (and raw values) to zero
    ///
    /// Returns the number of clamped flows.
    pub fn clamp_flow_values_below_zero(&mut self) -> usize {
        let mut clamped = Vec::new();
        for year in self.data.years().to_vec() {
            let Some(graph) = self.data.graph_mut(year) else {
                continue;
            };
            for flow in graph.flows_mut() {
                if flow.evaluated_value() >= 0.0 {
                    continue;
                }
                clamped.push(SolverEvent::FlowClamped {
                    year,
                    flow_id: flow.id().to_string(),
                    previous_value: flow.evaluated_value(),
                });
                flow.set_evaluated_value(0.0);
                if flow.value() < 0.0 {
                    flow.set_value(0.0);
                }
            }
        }

        let count = clamped.len();
        for event in clamped {
            if let SolverEvent::FlowClamped {
                year,
                flow_id,
                previous_value,
            } = &event
            {
                warn!(year, flow_id = %flow_id, previous_value, "Clamped negative flow to zero");
            }
            self.event_log.log(event);
        }
        count
    }

    // ========================================================================
    // Year Resolution
    // ========================================================================

    /// Years of the horizon, ascending
    pub fn years(&self) -> &[i32] {
        self.data.years()
    }

    /// Year being solved: the first year before solving, the last one after
    pub fn current_year(&self) -> i32 {
        self.data.years()[self.current_year_index]
    }

    fn resolve_year(&self, year: Option<i32>) -> i32 {
        year.unwrap_or_else(|| self.current_year())
    }

    fn graph(&self, year: Option<i32>) -> Result<&YearGraph, SolverError> {
        let year = self.resolve_year(year);
        self.data.graph(year).ok_or(SolverError::YearNotFound(year))
    }

    fn graph_mut(&mut self, year: Option<i32>) -> Result<&mut YearGraph, SolverError> {
        let year = self.resolve_year(year);
        self.data
            .graph_mut(year)
            .ok_or(SolverError::YearNotFound(year))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Process `process_id` in `year` (`None` is the current year)
    pub fn get_process(
        &self,
        process_id: &str,
        year: Option<i32>,
    ) -> Result<&Process, SolverError> {
        let graph = self.graph(year)?;
        graph
            .process(process_id)
            .ok_or_else(|| SolverError::ProcessNotFound {
                process_id: process_id.to_string(),
                year: graph.year(),
            })
    }

    /// Flow `flow_id` in `year` (`None` is the current year)
    pub fn get_flow(&self, flow_id: &str, year: Option<i32>) -> Result<&Flow, SolverError> {
        let graph = self.graph(year)?;
        graph.flow(flow_id).ok_or_else(|| SolverError::FlowNotFound {
            flow_id: flow_id.to_string(),
            year: graph.year(),
        })
    }

    /// Mutable flow `flow_id` in `year`
    pub fn get_flow_mut(
        &mut self,
        flow_id: &str,
        year: Option<i32>,
    ) -> Result<&mut Flow, SolverError> {
        let graph = self.graph_mut(year)?;
        let year = graph.year();
        graph.flow_mut(flow_id).ok_or_else(|| SolverError::FlowNotFound {
            flow_id: flow_id.to_string(),
            year,
        })
    }

    /// Whether `process_id` exists in `year`
    pub fn has_process(&self, process_id: &str, year: Option<i32>) -> bool {
        self.graph(year)
            .map_or(false, |g| g.process(process_id).is_some())
    }

    /// Whether `flow_id` exists in `year`
    pub fn has_flow(&self, flow_id: &str, year: Option<i32>) -> bool {
        self.graph(year).map_or(false, |g| g.flow(flow_id).is_some())
    }

    /// Inflows of `process_id` in `year`, in insertion order
    pub fn get_process_inflows(
        &self,
        process_id: &str,
        year: Option<i32>,
    ) -> Result<Vec<&Flow>, SolverError> {
        let graph = self.graph(year)?;
        graph
            .inflows(process_id)
            .ok_or_else(|| SolverError::ProcessNotFound {
                process_id: process_id.to_string(),
                year: graph.year(),
            })
    }

    /// Outflows of `process_id` in `year`, in insertion order
    pub fn get_process_outflows(
        &self,
        process_id: &str,
        year: Option<i32>,
    ) -> Result<Vec<&Flow>, SolverError> {
        let graph = self.graph(year)?;
        graph
            .outflows(process_id)
            .ok_or_else(|| SolverError::ProcessNotFound {
                process_id: process_id.to_string(),
                year: graph.year(),
            })
    }

    /// Sum of evaluated values of all inflows
    pub fn get_process_inflows_total(
        &self,
        process_id: &str,
        year: Option<i32>,
    ) -> Result<f64, SolverError> {
        Ok(self
            .get_process_inflows(process_id, year)?
            .iter()
            .map(|f| f.evaluated_value())
            .sum())
    }

    /// Sum of evaluated values of all outflows
    pub fn get_process_outflows_total(
        &self,
        process_id: &str,
        year: Option<i32>,
    ) -> Result<f64, SolverError> {
        Ok(self
            .get_process_outflows(process_id, year)?
            .iter()
            .map(|f| f.evaluated_value())
            .sum())
    }

    /// Sum of evaluated values of absolute outflows
    pub fn get_process_outflows_total_abs(
        &self,
        process_id: &str,
        year: Option<i32>,
    ) -> Result<f64, SolverError> {
        Ok(self
            .get_process_outflows(process_id, year)?
            .iter()
            .filter(|f| f.is_unit_absolute_value())
            .map(|f| f.evaluated_value())
            .sum())
    }

    /// Sum of evaluated values of relative outflows
    pub fn get_process_outflows_total_rel(
        &self,
        process_id: &str,
        year: Option<i32>,
    ) -> Result<f64, SolverError> {
        Ok(self
            .get_process_outflows(process_id, year)?
            .iter()
            .filter(|f| !f.is_unit_absolute_value())
            .map(|f| f.evaluated_value())
            .sum())
    }

    /// Amount the process distributes among its relative outflows
    ///
    /// Stock processes distribute the stock outflow left after
    /// non-prioritized absolute outflows; other processes distribute the
    /// inflow left after non-virtual absolute outflows.
    pub fn get_process_relative_pool(
        &self,
        process_id: &str,
        year: Option<i32>,
    ) -> Result<f64, SolverError> {
        let year = self.resolve_year(year);
        let outflows = self.get_process_outflows(process_id, Some(year))?;

        let pool = match self.stock_models.get(process_id) {
            Some(model) => {
                let stock_outflow = self
                    .data
                    .year_index(year)
                    .and_then(|index| model.outflow_total().get(index).copied())
                    .unwrap_or(0.0);
                let absolute: f64 = outflows
                    .iter()
                    .filter(|f| f.is_unit_absolute_value() && !f.is_prioritized())
                    .map(|f| f.evaluated_value())
                    .sum();
                stock_outflow - absolute
            }
            None => {
                let absolute: f64 = outflows
                    .iter()
                    .filter(|f| f.is_unit_absolute_value() && !f.is_virtual())
                    .map(|f| f.evaluated_value())
                    .sum();
                self.get_process_inflows_total(process_id, Some(year))? - absolute
            }
        };
        Ok(pool.max(0.0))
    }

    /// Whether `process_id` accumulates a stock
    pub fn has_stock(&self, process_id: &str) -> bool {
        self.stock_models.contains_key(process_id)
    }

    /// Stock definition of `process_id`
    pub fn get_stock(&self, process_id: &str) -> Option<Stock> {
        self.data
            .unique_processes()
            .get(process_id)
            .and_then(Stock::from_process)
    }

    /// Cohort model of the stock at `process_id`
    pub fn get_stock_model(&self, process_id: &str) -> Option<&DynamicStockModel> {
        self.stock_models.get(process_id)
    }

    /// Year -> processes with their inflows and outflows
    pub fn get_year_to_process_to_flows(&self) -> BTreeMap<i32, Vec<ProcessFlows<'_>>> {
        self.data
            .graphs()
            .map(|graph| {
                let entries = (0..graph.process_count())
                    .map(|index| ProcessFlows {
                        process: graph.process_at(index),
                        inflows: graph
                            .inflow_indices(index)
                            .iter()
                            .map(|&f| graph.flow_at(f))
                            .collect(),
                        outflows: graph
                            .outflow_indices(index)
                            .iter()
                            .map(|&f| graph.flow_at(f))
                            .collect(),
                    })
                    .collect();
                (graph.year(), entries)
            })
            .collect()
    }

    // ========================================================================
    // State Access
    // ========================================================================

    /// Copy of the solved data, the starting point of dependent scenarios
    pub fn get_solved_scenario_data(&self) -> ScenarioData {
        self.data.clone()
    }

    /// Consume the solver, returning the solved data as is
    pub fn into_scenario_data(self) -> ScenarioData {
        self.data
    }

    /// Data being solved, including virtual entities
    pub fn scenario_data(&self) -> &ScenarioData {
        &self.data
    }

    /// Configuration the solver was created with
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Events logged while solving and modifying flows
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub(crate) fn log_event(&mut self, event: SolverEvent) {
        self.event_log.log(event);
    }

    /// Drop events logged after the first `len`
    pub(crate) fn truncate_events(&mut self, len: usize) {
        self.event_log.truncate(len);
    }

    /// One summary per solved year
    pub fn timestep_summaries(&self) -> &[TimestepSummary] {
        &self.summaries
    }
}
