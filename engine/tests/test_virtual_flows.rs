//! Integration tests for virtual process and flow creation

use approx::assert_relative_eq;
use stockflow_engine::models::{
    Flow, Indicator, Process, ScenarioData, SolverEvent, VIRTUAL_TRANSFORMATION_STAGE,
};
use stockflow_engine::solver::{FlowSolver, SolverConfig};

// ============================================================================
// Test Helpers
// ============================================================================

/// `S -> P -> A`, where P receives 10 and sends `outflow` as an absolute flow
fn imbalanced_data(outflow: f64) -> ScenarioData {
    let mut data = ScenarioData::from_year_range(2020, 2020).unwrap();
    for id in ["S", "P", "A"] {
        data.insert_process_all_years(Process::new(id, id)).unwrap();
    }
    data.insert_flow(Flow::absolute("S", "P", 2020, 10.0)).unwrap();
    data.insert_flow(Flow::absolute("P", "A", 2020, outflow)).unwrap();
    data
}

fn solve(data: ScenarioData, config: SolverConfig) -> FlowSolver {
    let mut solver = FlowSolver::new(data, config).unwrap();
    solver.solve_timesteps().unwrap();
    solver
}

// ============================================================================
// Deficit and Surplus
// ============================================================================

#[test]
fn test_deficit_creates_virtual_inflow() {
    let solver = solve(imbalanced_data(15.0), SolverConfig::default());

    let process = solver.get_process("VP_P", Some(2020)).unwrap();
    assert!(process.is_virtual());
    assert_eq!(process.transformation_stage(), VIRTUAL_TRANSFORMATION_STAGE);

    let flow = solver.get_flow("VP_P P", Some(2020)).unwrap();
    assert!(flow.is_virtual());
    assert_relative_eq!(flow.evaluated_value(), 5.0);
    assert!(!solver.has_flow("P VP_P", Some(2020)));

    // P is balanced once the virtual inflow is counted
    assert_relative_eq!(solver.get_process_inflows_total("P", Some(2020)).unwrap(), 15.0);
    assert_relative_eq!(solver.get_process_outflows_total("P", Some(2020)).unwrap(), 15.0);
}

#[test]
fn test_surplus_creates_virtual_outflow() {
    let solver = solve(imbalanced_data(4.0), SolverConfig::default());

    let flow = solver.get_flow("P VP_P", Some(2020)).unwrap();
    assert!(flow.is_virtual());
    assert_relative_eq!(flow.evaluated_value(), 6.0);
    assert!(!solver.has_flow("VP_P P", Some(2020)));
}

#[test]
fn test_imbalance_within_epsilon_is_ignored() {
    let solver = solve(imbalanced_data(9.95), SolverConfig::default());

    assert!(!solver.has_process("VP_P", Some(2020)));
    assert!(solver.event_log().events_of_type("VirtualFlowCreated").is_empty());
    assert_eq!(solver.event_log().events_of_type("TimestepSolved").len(), 1);
}

#[test]
fn test_disabled_virtual_flows_leave_graph_untouched() {
    let config = SolverConfig::default().with_virtual_flows(false);
    let solver = solve(imbalanced_data(4.0), config);

    assert!(!solver.has_process("VP_P", Some(2020)));
    assert!(!solver.has_flow("P VP_P", Some(2020)));
    assert_eq!(solver.timestep_summaries()[0].virtual_flows_created, 0);
}

#[test]
fn test_larger_epsilon_tolerates_imbalance() {
    let config = SolverConfig::default().with_epsilon(10.0);
    let solver = solve(imbalanced_data(4.0), config);

    assert!(!solver.has_process("VP_P", Some(2020)));
}

// ============================================================================
// Events, Indicators and Forking
// ============================================================================

#[test]
fn test_virtual_entities_are_logged() {
    let solver = solve(imbalanced_data(15.0), SolverConfig::default());
    let log = solver.event_log();

    assert!(log.events().contains(&SolverEvent::VirtualProcessCreated {
        year: 2020,
        process_id: "VP_P".to_string(),
        for_process_id: "P".to_string(),
    }));
    let flow_events = log.events_for_flow("VP_P P");
    assert_eq!(flow_events.len(), 1);
    assert!(matches!(
        flow_events[0],
        SolverEvent::VirtualFlowCreated { value, .. } if (value - 5.0).abs() < 1e-9
    ));

    let summary = &solver.timestep_summaries()[0];
    assert_eq!(summary.virtual_processes_created, 1);
    assert_eq!(summary.virtual_flows_created, 1);
}

#[test]
fn test_virtual_flow_carries_indicator_values() {
    let mut data = imbalanced_data(15.0);
    data.add_indicator(Indicator::new("Carbon", "tC").with_default_conversion_factor(0.5));

    let solver = solve(data, SolverConfig::default());

    let flow = solver.get_flow("VP_P P", Some(2020)).unwrap();
    assert_relative_eq!(flow.indicator_value("Carbon").unwrap(), 2.5);
}

#[test]
fn test_fork_drops_virtual_entities() {
    let solver = solve(imbalanced_data(15.0), SolverConfig::default());
    let solved = solver.get_solved_scenario_data();
    assert!(solved.graph(2020).unwrap().process("VP_P").is_some());

    let forked = solved.fork();
    let graph = forked.graph(2020).unwrap();
    assert!(graph.process("VP_P").is_none());
    assert!(graph.flow("VP_P P").is_none());
    // Evaluated values of real flows survive the fork
    assert_relative_eq!(graph.flow("P A").unwrap().evaluated_value(), 15.0);

    // Solving the fork again recreates the same virtual inflow
    let config = SolverConfig::default().with_reset_evaluated_values(false);
    let resolved = solve(forked, config);
    assert_relative_eq!(resolved.get_flow("VP_P P", Some(2020)).unwrap().evaluated_value(), 5.0);
}

#[test]
fn test_virtual_process_keeps_location() {
    let mut data = ScenarioData::from_year_range(2020, 2020).unwrap();
    data.insert_process_all_years(Process::new("S", "Source")).unwrap();
    data.insert_process_all_years(Process::new("P", "Mill").with_location("Finland")).unwrap();
    data.insert_process_all_years(Process::new("A", "Market")).unwrap();
    data.insert_flow(Flow::absolute("S", "P", 2020, 10.0)).unwrap();
    data.insert_flow(Flow::absolute("P", "A", 2020, 12.0)).unwrap();

    let solver = solve(data, SolverConfig::default());

    let process = solver.get_process("VP_P", Some(2020)).unwrap();
    assert_eq!(process.location(), "Finland");
    assert_eq!(process.name(), "VP_Mill");
}
