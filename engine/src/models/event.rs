//! Event logging for solver auditing
//!
//! The solver records every structural change it makes to the flow graph
//! (virtual entities, modified and clamped flows) together with a summary
//! per solved year. Events enable:
//! - Debugging (which process needed balancing, in which year)
//! - Auditing (verify that modifiers moved exactly what they claimed)
//! - Reporting (count virtual entities per year)
//!
//! # Example
//!
//! ```rust
//! use stockflow_engine::models::{EventLog, SolverEvent};
//!
//! let mut log = EventLog::new();
//! log.log(SolverEvent::VirtualProcessCreated {
//!     year: 2020,
//!     process_id: "VP_P".to_string(),
//!     for_process_id: "P".to_string(),
//! });
//!
//! assert_eq!(log.events_in_year(2020).len(), 1);
//! ```

use serde::{Deserialize, Serialize};

/// Solver event capturing a change to the flow graph
///
/// All events carry the year they apply to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolverEvent {
    /// One year finished propagating
    TimestepSolved {
        year: i32,
        iterations: usize,
        evaluated_processes: usize,
        virtual_processes_created: usize,
        virtual_flows_created: usize,
    },

    /// Virtual process added next to an imbalanced process
    VirtualProcessCreated {
        year: i32,
        process_id: String,
        for_process_id: String,
    },

    /// Virtual flow added (or grown) to balance a process
    VirtualFlowCreated {
        year: i32,
        flow_id: String,
        value: f64,
    },

    /// Flow modifier changed a flow's evaluated value
    FlowModified {
        year: i32,
        flow_id: String,
        previous_value: f64,
        new_value: f64,
    },

    /// Negative flow set to zero after unconstrained redistribution
    FlowClamped {
        year: i32,
        flow_id: String,
        previous_value: f64,
    },
}

impl SolverEvent {
    pub fn year(&self) -> i32 {
        match self {
            SolverEvent::TimestepSolved { year, .. }
            | SolverEvent::VirtualProcessCreated { year, .. }
            | SolverEvent::VirtualFlowCreated { year, .. }
            | SolverEvent::FlowModified { year, .. }
            | SolverEvent::FlowClamped { year, .. } => *year,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            SolverEvent::TimestepSolved { .. } => "TimestepSolved",
            SolverEvent::VirtualProcessCreated { .. } => "VirtualProcessCreated",
            SolverEvent::VirtualFlowCreated { .. } => "VirtualFlowCreated",
            SolverEvent::FlowModified { .. } => "FlowModified",
            SolverEvent::FlowClamped { .. } => "FlowClamped",
        }
    }

    pub fn flow_id(&self) -> Option<&str> {
        match self {
            SolverEvent::VirtualFlowCreated { flow_id, .. }
            | SolverEvent::FlowModified { flow_id, .. }
            | SolverEvent::FlowClamped { flow_id, .. } => Some(flow_id),
            _ => None,
        }
    }
}

/// Ordered event log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<SolverEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: SolverEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[SolverEvent] {
        &self.events
    }

    pub fn events_in_year(&self, year: i32) -> Vec<&SolverEvent> {
        self.events.iter().filter(|e| e.year() == year).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&SolverEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_flow(&self, flow_id: &str) -> Vec<&SolverEvent> {
        self.events
            .iter()
            .filter(|e| e.flow_id() == Some(flow_id))
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Drop every event logged after the first `len`
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_queries() {
        let mut log = EventLog::new();
        assert!(log.is_empty());

        log.log(SolverEvent::VirtualFlowCreated {
            year: 2020,
            flow_id: "VP_P P".to_string(),
            value: 5.0,
        });
        log.log(SolverEvent::FlowClamped {
            year: 2021,
            flow_id: "P B".to_string(),
            previous_value: -1.0,
        });
        log.log(SolverEvent::TimestepSolved {
            year: 2021,
            iterations: 4,
            evaluated_processes: 3,
            virtual_processes_created: 0,
            virtual_flows_created: 0,
        });

        assert_eq!(log.len(), 3);
        assert_eq!(log.events_in_year(2021).len(), 2);
        assert_eq!(log.events_of_type("FlowClamped").len(), 1);
        assert_eq!(log.events_for_flow("VP_P P").len(), 1);

        log.clear();
        assert!(log.is_empty());
    }
}
