//! Per-year process graph stored as an arena
//!
//! Processes and flows live in insertion-ordered vectors and are addressed
//! by index; id lookups go through hash indices. Inserting a process or a
//! flow never moves existing entries, so indices taken before an insertion
//! stay valid after it.
//!
//! # Critical Invariants
//!
//! - **Referential integrity**: every flow's source and target process is
//!   present in the same graph.
//! - **Unique ids**: process ids and flow ids are unique within the graph.
//! - **Deterministic order**: iteration follows insertion order.

use super::flow::Flow;
use super::process::Process;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised when inserting into a year graph
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    #[error("Process '{process_id}' already exists in year {year}")]
    DuplicateProcess { process_id: String, year: i32 },

    #[error("Flow '{flow_id}' already exists in year {year}")]
    DuplicateFlow { flow_id: String, year: i32 },

    #[error("Flow '{flow_id}' references unknown process '{process_id}' in year {year}")]
    UnknownProcess {
        flow_id: String,
        process_id: String,
        year: i32,
    },

    #[error("Flow '{flow_id}' belongs to year {flow_year}, not {year}")]
    YearMismatch {
        flow_id: String,
        flow_year: i32,
        year: i32,
    },
}

/// Flow indices attached to one process
#[derive(Debug, Clone, Default, PartialEq)]
struct Adjacency {
    inflows: Vec<usize>,
    outflows: Vec<usize>,
}

/// Serialized form: adjacency and indices are rebuilt on load
#[derive(Debug, Clone, Serialize, Deserialize)]
struct YearGraphRecord {
    year: i32,
    processes: Vec<Process>,
    flows: Vec<Flow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "YearGraphRecord", into = "YearGraphRecord")]
pub struct YearGraph {
    year: i32,
    processes: Vec<Process>,
    flows: Vec<Flow>,
    adjacency: Vec<Adjacency>,
    process_index: HashMap<String, usize>,
    flow_index: HashMap<String, usize>,
}

impl YearGraph {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            processes: Vec::new(),
            flows: Vec::new(),
            adjacency: Vec::new(),
            process_index: HashMap::new(),
            flow_index: HashMap::new(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    pub fn insert_process(&mut self, process: Process) -> Result<usize, GraphError> {
        if self.process_index.contains_key(process.id()) {
            return Err(GraphError::DuplicateProcess {
                process_id: process.id().to_string(),
                year: self.year,
            });
        }

        let index = self.processes.len();
        self.process_index.insert(process.id().to_string(), index);
        self.processes.push(process);
        self.adjacency.push(Adjacency::default());
        Ok(index)
    }

    pub fn insert_flow(&mut self, flow: Flow) -> Result<usize, GraphError> {
        if flow.year() != self.year {
            return Err(GraphError::YearMismatch {
                flow_id: flow.id().to_string(),
                flow_year: flow.year(),
                year: self.year,
            });
        }
        if self.flow_index.contains_key(flow.id()) {
            return Err(GraphError::DuplicateFlow {
                flow_id: flow.id().to_string(),
                year: self.year,
            });
        }

        let endpoint = |process_id: &str| {
            self.process_index
                .get(process_id)
                .copied()
                .ok_or_else(|| GraphError::UnknownProcess {
                    flow_id: flow.id().to_string(),
                    process_id: process_id.to_string(),
                    year: self.year,
                })
        };
        let source = endpoint(flow.source_process_id())?;
        let target = endpoint(flow.target_process_id())?;

        let index = self.flows.len();
        self.flow_index.insert(flow.id().to_string(), index);
        self.flows.push(flow);
        self.adjacency[source].outflows.push(index);
        self.adjacency[target].inflows.push(index);
        Ok(index)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn process_idx(&self, process_id: &str) -> Option<usize> {
        self.process_index.get(process_id).copied()
    }

    pub fn flow_idx(&self, flow_id: &str) -> Option<usize> {
        self.flow_index.get(flow_id).copied()
    }

    pub fn process(&self, process_id: &str) -> Option<&Process> {
        self.process_idx(process_id).map(|i| &self.processes[i])
    }

    pub fn flow(&self, flow_id: &str) -> Option<&Flow> {
        self.flow_idx(flow_id).map(|i| &self.flows[i])
    }

    pub fn flow_mut(&mut self, flow_id: &str) -> Option<&mut Flow> {
        self.flow_idx(flow_id).map(move |i| &mut self.flows[i])
    }

    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn process_at(&self, index: usize) -> &Process {
        &self.processes[index]
    }

    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn flow_at(&self, index: usize) -> &Flow {
        &self.flows[index]
    }

    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn flow_at_mut(&mut self, index: usize) -> &mut Flow {
        &mut self.flows[index]
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    pub fn flows_mut(&mut self) -> impl Iterator<Item = &mut Flow> {
        self.flows.iter_mut()
    }

    pub fn inflow_indices(&self, process_index: usize) -> &[usize] {
        &self.adjacency[process_index].inflows
    }

    pub fn outflow_indices(&self, process_index: usize) -> &[usize] {
        &self.adjacency[process_index].outflows
    }

    pub fn inflows(&self, process_id: &str) -> Option<Vec<&Flow>> {
        let index = self.process_idx(process_id)?;
        Some(
            self.inflow_indices(index)
                .iter()
                .map(|&f| &self.flows[f])
                .collect(),
        )
    }

    pub fn outflows(&self, process_id: &str) -> Option<Vec<&Flow>> {
        let index = self.process_idx(process_id)?;
        Some(
            self.outflow_indices(index)
                .iter()
                .map(|&f| &self.flows[f])
                .collect(),
        )
    }

    /// Indices of the processes a process feeds, in outflow order
    pub fn target_indices(&self, process_index: usize) -> Vec<usize> {
        self.outflow_indices(process_index)
            .iter()
            .filter_map(|&f| self.process_idx(self.flows[f].target_process_id()))
            .collect()
    }

    /// Copy of this graph without virtual processes and flows
    pub fn without_virtual(&self) -> YearGraph {
        let mut graph = YearGraph::new(self.year);
        for process in self.processes.iter().filter(|p| !p.is_virtual()) {
            // Ids are unique in `self`, so insertion cannot fail.
            let _ = graph.insert_process(process.clone());
        }
        for flow in self.flows.iter().filter(|f| !f.is_virtual()) {
            let _ = graph.insert_flow(flow.clone());
        }
        graph
    }
}

impl TryFrom<YearGraphRecord> for YearGraph {
    type Error = GraphError;

    fn try_from(record: YearGraphRecord) -> Result<Self, Self::Error> {
        let mut graph = YearGraph::new(record.year);
        for process in record.processes {
            graph.insert_process(process)?;
        }
        for flow in record.flows {
            graph.insert_flow(flow)?;
        }
        Ok(graph)
    }
}

impl From<YearGraph> for YearGraphRecord {
    fn from(graph: YearGraph) -> Self {
        Self {
            year: graph.year,
            processes: graph.processes,
            flows: graph.flows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_graph() -> YearGraph {
        let mut graph = YearGraph::new(2020);
        graph.insert_process(Process::new("S", "Source")).unwrap();
        graph.insert_process(Process::new("P", "Process")).unwrap();
        graph.insert_process(Process::new("A", "Sink")).unwrap();
        graph.insert_flow(Flow::absolute("S", "P", 2020, 100.0)).unwrap();
        graph.insert_flow(Flow::relative("P", "A", 2020, 100.0)).unwrap();
        graph
    }

    #[test]
    fn test_adjacency() {
        let graph = create_graph();
        let p = graph.process_idx("P").unwrap();

        assert_eq!(graph.inflow_indices(p), &[0]);
        assert_eq!(graph.outflow_indices(p), &[1]);
        assert_eq!(graph.target_indices(p), vec![2]);
        assert_eq!(graph.inflows("S").unwrap().len(), 0);
    }

    #[test]
    fn test_insert_flow_with_unknown_endpoint() {
        let mut graph = create_graph();
        let result = graph.insert_flow(Flow::absolute("P", "X", 2020, 1.0));
        assert_eq!(
            result,
            Err(GraphError::UnknownProcess {
                flow_id: "P X".to_string(),
                process_id: "X".to_string(),
                year: 2020,
            })
        );
    }

    #[test]
    fn test_insert_duplicates_rejected() {
        let mut graph = create_graph();
        assert!(matches!(
            graph.insert_process(Process::new("P", "Again")),
            Err(GraphError::DuplicateProcess { .. })
        ));
        assert!(matches!(
            graph.insert_flow(Flow::absolute("S", "P", 2020, 1.0)),
            Err(GraphError::DuplicateFlow { .. })
        ));
        assert!(matches!(
            graph.insert_flow(Flow::absolute("S", "A", 2021, 1.0)),
            Err(GraphError::YearMismatch { .. })
        ));
    }

    #[test]
    fn test_without_virtual_drops_virtual_entities() {
        let mut graph = create_graph();
        let p = graph.process("P").unwrap().clone();
        graph.insert_process(Process::new_virtual(&p)).unwrap();
        graph.insert_flow(Flow::new_virtual("P", "VP_P", 2020, 4.0)).unwrap();

        let stripped = graph.without_virtual();
        assert_eq!(stripped.process_count(), 3);
        assert_eq!(stripped.flow_count(), 2);
        assert!(stripped.process("VP_P").is_none());
        let p = stripped.process_idx("P").unwrap();
        assert_eq!(stripped.outflow_indices(p).len(), 1);
    }

    #[test]
    fn test_serde_rebuilds_indices() {
        let graph = create_graph();
        let json = serde_json::to_string(&graph).unwrap();
        let restored: YearGraph = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, graph);
        assert_eq!(restored.flow("S P").unwrap().value(), 100.0);
    }
}
