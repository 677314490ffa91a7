//! Tabular records of solved processes and flows
//!
//! One record per process-year and per flow-year, ready to be serialized
//! for export or plotting layers.

use super::flow_solver::FlowSolver;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRecord {
    pub year: i32,
    pub process_id: String,
    pub process_name: String,
    pub location: String,
    pub transformation_stage: String,
    pub is_virtual: bool,
    pub inflows_total: f64,
    pub outflows_total: f64,
    /// Stock at the end of the year, for stock-owning processes
    pub stock_total: Option<f64>,
    /// Indicator name -> sum over inflows
    pub inflow_indicators: BTreeMap<String, f64>,
    /// Indicator name -> sum over outflows
    pub outflow_indicators: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRecord {
    pub year: i32,
    pub flow_id: String,
    pub source_process_id: String,
    pub target_process_id: String,
    pub value: f64,
    pub unit: String,
    pub evaluated_share: f64,
    pub evaluated_value: f64,
    pub is_virtual: bool,
    pub indicators: BTreeMap<String, f64>,
}

impl FlowSolver {
    /// One record per process and year
    pub fn processes_report(&self) -> Vec<ProcessRecord> {
        let mut records = Vec::new();
        for (year, entries) in self.get_year_to_process_to_flows() {
            let year_index = self.scenario_data().year_index(year);
            for entry in entries {
                let process = entry.process;
                let stock_total = self.get_stock_model(process.id()).and_then(|model| {
                    year_index.and_then(|index| model.stock_total().get(index).copied())
                });

                let mut inflow_indicators = BTreeMap::new();
                for flow in &entry.inflows {
                    for (name, value) in flow.indicator_values() {
                        *inflow_indicators.entry(name.clone()).or_insert(0.0) += value;
                    }
                }
                let mut outflow_indicators = BTreeMap::new();
                for flow in &entry.outflows {
                    for (name, value) in flow.indicator_values() {
                        *outflow_indicators.entry(name.clone()).or_insert(0.0) += value;
                    }
                }

                records.push(ProcessRecord {
                    year,
                    process_id: process.id().to_string(),
                    process_name: process.name().to_string(),
                    location: process.location().to_string(),
                    transformation_stage: process.transformation_stage().to_string(),
                    is_virtual: process.is_virtual(),
                    inflows_total: entry.inflows.iter().map(|f| f.evaluated_value()).sum(),
                    outflows_total: entry.outflows.iter().map(|f| f.evaluated_value()).sum(),
                    stock_total,
                    inflow_indicators,
                    outflow_indicators,
                });
            }
        }
        records
    }

    /// One record per flow and year
    pub fn flows_report(&self) -> Vec<FlowRecord> {
        self.scenario_data()
            .graphs()
            .flat_map(|graph| graph.flows())
            .map(|flow| FlowRecord {
                year: flow.year(),
                flow_id: flow.id().to_string(),
                source_process_id: flow.source_process_id().to_string(),
                target_process_id: flow.target_process_id().to_string(),
                value: flow.value(),
                unit: flow.unit().to_string(),
                evaluated_share: flow.evaluated_share(),
                evaluated_value: flow.evaluated_value(),
                is_virtual: flow.is_virtual(),
                indicators: flow.indicator_values().clone(),
            })
            .collect()
    }

    /// Flow id -> year -> evaluated value
    pub fn evaluated_flow_values(&self) -> BTreeMap<String, BTreeMap<i32, f64>> {
        let mut table: BTreeMap<String, BTreeMap<i32, f64>> = BTreeMap::new();
        for graph in self.scenario_data().graphs() {
            for flow in graph.flows() {
                table
                    .entry(flow.id().to_string())
                    .or_default()
                    .insert(graph.year(), flow.evaluated_value());
            }
        }
        table
    }
}
