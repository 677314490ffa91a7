//! Integration tests for FlowSolver propagation
//!
//! Covers relative splits, absolute passthrough, stock-owning processes,
//! prioritized outflows and the unsolvable-loop guard.

use approx::assert_relative_eq;
use stockflow_engine::models::{Flow, Process, ScenarioData};
use stockflow_engine::solver::{FlowSolver, SolverConfig, SolverError};
use stockflow_engine::stock::StockParameters;

// ============================================================================
// Test Helpers
// ============================================================================

fn create_data(start_year: i32, end_year: i32, process_ids: &[&str]) -> ScenarioData {
    let mut data = ScenarioData::from_year_range(start_year, end_year).unwrap();
    for id in process_ids {
        data.insert_process_all_years(Process::new(*id, *id)).unwrap();
    }
    data
}

fn buildings(lifetime: u32) -> Process {
    Process::new("B", "Buildings").with_stock(StockParameters::fixed(lifetime))
}

fn solve(data: ScenarioData, config: SolverConfig) -> Result<FlowSolver, SolverError> {
    let mut solver = FlowSolver::new(data, config)?;
    solver.solve_timesteps()?;
    Ok(solver)
}

fn ev(solver: &FlowSolver, flow_id: &str, year: i32) -> f64 {
    solver.get_flow(flow_id, Some(year)).unwrap().evaluated_value()
}

// ============================================================================
// Relative and Absolute Flows
// ============================================================================

#[test]
fn test_relative_outflows_split_inflow() {
    let mut data = create_data(2020, 2020, &["S", "P", "A", "B"]);
    data.insert_flow(Flow::absolute("S", "P", 2020, 100.0)).unwrap();
    data.insert_flow(Flow::relative("P", "A", 2020, 60.0)).unwrap();
    data.insert_flow(Flow::relative("P", "B", 2020, 40.0)).unwrap();

    let solver = solve(data, SolverConfig::default()).unwrap();

    assert_relative_eq!(ev(&solver, "P A", 2020), 60.0);
    assert_relative_eq!(ev(&solver, "P B", 2020), 40.0);
    assert!(solver.get_flow("P A", Some(2020)).unwrap().is_evaluated());
}

#[test]
fn test_relative_outflow_takes_remaining_pool() {
    let mut data = create_data(2020, 2020, &["S", "P", "A", "B"]);
    data.insert_flow(Flow::absolute("S", "P", 2020, 100.0)).unwrap();
    data.insert_flow(Flow::absolute("P", "A", 2020, 30.0)).unwrap();
    data.insert_flow(Flow::relative("P", "B", 2020, 100.0)).unwrap();

    let solver = solve(data, SolverConfig::default()).unwrap();

    assert_relative_eq!(ev(&solver, "P A", 2020), 30.0);
    assert_relative_eq!(ev(&solver, "P B", 2020), 70.0);
    assert_relative_eq!(solver.get_process_relative_pool("P", Some(2020)).unwrap(), 70.0);
}

#[test]
fn test_absolute_flows_pass_value_through() {
    let mut data = create_data(2020, 2021, &["S", "P", "A"]);
    for (year, value) in [(2020, 12.5), (2021, 7.25)] {
        data.insert_flow(Flow::new("S", "P", year, value, "t")).unwrap();
        data.insert_flow(Flow::new("P", "A", year, value, "t")).unwrap();
    }

    let solver = solve(data, SolverConfig::default()).unwrap();

    for year in [2020, 2021] {
        let flow = solver.get_flow("S P", Some(year)).unwrap();
        assert_eq!(flow.evaluated_value(), flow.value());
        assert_eq!(flow.evaluated_share(), 1.0);
    }
}

#[test]
fn test_multi_level_chain() {
    let mut data = create_data(2020, 2020, &["S", "P", "Q", "A", "B"]);
    data.insert_flow(Flow::absolute("S", "P", 2020, 200.0)).unwrap();
    data.insert_flow(Flow::relative("P", "Q", 2020, 50.0)).unwrap();
    data.insert_flow(Flow::relative("P", "A", 2020, 50.0)).unwrap();
    data.insert_flow(Flow::relative("Q", "B", 2020, 100.0)).unwrap();

    let solver = solve(data, SolverConfig::default()).unwrap();

    assert_relative_eq!(ev(&solver, "Q B", 2020), 100.0);
    assert_relative_eq!(solver.get_process_inflows_total("B", Some(2020)).unwrap(), 100.0);
    assert_eq!(solver.timestep_summaries()[0].evaluated_processes, 5);
}

#[test]
fn test_evaluation_waits_for_all_inflows() {
    // P has two sources; the second is only known after Q is evaluated
    let mut data = create_data(2020, 2020, &["S", "Q", "P", "A"]);
    data.insert_flow(Flow::absolute("S", "P", 2020, 10.0)).unwrap();
    data.insert_flow(Flow::absolute("S", "Q", 2020, 30.0)).unwrap();
    data.insert_flow(Flow::relative("Q", "P", 2020, 100.0)).unwrap();
    data.insert_flow(Flow::relative("P", "A", 2020, 100.0)).unwrap();

    let solver = solve(data, SolverConfig::default()).unwrap();

    assert_relative_eq!(ev(&solver, "P A", 2020), 40.0);
}

// ============================================================================
// Stocks
// ============================================================================

#[test]
fn test_stock_delays_outflow() {
    let mut data = create_data(2020, 2024, &["S", "W"]);
    data.insert_process_all_years(buildings(2)).unwrap();
    for year in 2020..=2024 {
        data.insert_flow(Flow::absolute("S", "B", year, 10.0)).unwrap();
        data.insert_flow(Flow::relative("B", "W", year, 100.0)).unwrap();
    }

    let solver = solve(data, SolverConfig::default()).unwrap();

    assert_relative_eq!(ev(&solver, "B W", 2020), 0.0);
    assert_relative_eq!(ev(&solver, "B W", 2021), 0.0);
    assert_relative_eq!(ev(&solver, "B W", 2022), 10.0);
    let model = solver.get_stock_model("B").unwrap();
    assert_relative_eq!(model.stock_total()[4], 20.0);
    assert!(solver.has_stock("B"));
    assert!(solver.get_stock("B").is_some());
    assert!(solver.get_stock("S").is_none());
}

#[test]
fn test_stock_outflow_below_absolute_outflows() {
    let mut data = create_data(2020, 2021, &["S", "W"]);
    data.insert_process_all_years(buildings(3)).unwrap();
    data.insert_flow(Flow::absolute("S", "B", 2020, 10.0)).unwrap();
    data.insert_flow(Flow::absolute("B", "W", 2020, 5.0)).unwrap();

    let result = solve(data, SolverConfig::default());

    assert!(matches!(
        result,
        Err(SolverError::StockOutflowBelowAbsoluteOutflows { ref process_id, year: 2020, .. })
            if process_id == "B"
    ));
}

#[test]
fn test_prioritized_outflows_served_before_stock() {
    let mut data = create_data(2020, 2020, &["S", "W"]);
    data.insert_process_all_years(Process::new("L", "Landfill").with_location("Landfill")).unwrap();
    data.insert_process_all_years(buildings(5)).unwrap();
    data.insert_flow(Flow::absolute("S", "B", 2020, 100.0)).unwrap();
    data.insert_flow(Flow::relative("B", "L", 2020, 25.0)).unwrap();
    data.insert_flow(Flow::relative("B", "W", 2020, 75.0)).unwrap();

    let config = SolverConfig::default().with_prioritized_locations(vec!["Landfill".to_string()]);
    let solver = solve(data, config).unwrap();

    assert_relative_eq!(ev(&solver, "B L", 2020), 25.0);
    assert!(solver.get_flow("B L", Some(2020)).unwrap().is_prioritized());
    // The stock only received what was left after the prioritized flow
    let model = solver.get_stock_model("B").unwrap();
    assert_relative_eq!(model.inflow()[0], 75.0);
}

#[test]
fn test_prioritized_outflow_exceeding_inflow_is_fatal() {
    let mut data = create_data(2020, 2020, &["S"]);
    data.insert_process_all_years(Process::new("L", "Landfill").with_location("Landfill")).unwrap();
    data.insert_process_all_years(buildings(5)).unwrap();
    data.insert_flow(Flow::absolute("S", "B", 2020, 10.0)).unwrap();
    data.insert_flow(Flow::absolute("B", "L", 2020, 20.0)).unwrap();

    let config = SolverConfig::default().with_prioritized_locations(vec!["Landfill".to_string()]);
    let result = solve(data, config);

    match result {
        Err(SolverError::PrioritizedOutflowExceedsInflow {
            process_id,
            year,
            prioritized,
            inflows,
        }) => {
            assert_eq!(process_id, "B");
            assert_eq!(year, 2020);
            assert_relative_eq!(prioritized, 20.0);
            assert_relative_eq!(inflows, 10.0);
        }
        other => panic!("expected prioritized outflow error, got {:?}", other.err()),
    }
}

// ============================================================================
// Loop Guard
// ============================================================================

#[test]
fn test_relative_cycle_hits_iteration_cap() {
    let mut data = create_data(2020, 2020, &["S", "A", "B", "C"]);
    data.insert_flow(Flow::absolute("S", "A", 2020, 10.0)).unwrap();
    data.insert_flow(Flow::relative("A", "B", 2020, 100.0)).unwrap();
    data.insert_flow(Flow::relative("B", "A", 2020, 50.0)).unwrap();
    data.insert_flow(Flow::relative("B", "C", 2020, 50.0)).unwrap();

    let result = solve(data, SolverConfig::default().with_max_iterations(50));

    let Err(SolverError::UnsolvableLoop {
        year,
        iterations,
        suspect_process_ids,
    }) = result
    else {
        panic!("expected an unsolvable loop");
    };
    assert_eq!(year, 2020);
    assert_eq!(iterations, 51);
    assert!(suspect_process_ids.contains(&"A".to_string()));
    assert!(suspect_process_ids.contains(&"B".to_string()));
}

#[test]
fn test_root_with_only_relative_outflows_is_suspect() {
    let mut data = create_data(2020, 2020, &["R", "X"]);
    data.insert_flow(Flow::relative("R", "X", 2020, 100.0)).unwrap();

    let result = solve(data, SolverConfig::default().with_max_iterations(20));

    assert!(matches!(
        result,
        Err(SolverError::UnsolvableLoop { ref suspect_process_ids, .. })
            if suspect_process_ids == &vec!["R".to_string()]
    ));
}

// ============================================================================
// Reset Behavior
// ============================================================================

#[test]
fn test_resolve_from_solved_data_is_stable() {
    let mut data = create_data(2020, 2021, &["S", "P", "A", "B"]);
    for year in [2020, 2021] {
        data.insert_flow(Flow::absolute("S", "P", year, 50.0)).unwrap();
        data.insert_flow(Flow::relative("P", "A", year, 20.0)).unwrap();
        data.insert_flow(Flow::relative("P", "B", year, 80.0)).unwrap();
    }
    let baseline = solve(data, SolverConfig::default()).unwrap();

    let config = SolverConfig::default().with_reset_evaluated_values(false);
    let resolved = solve(baseline.get_solved_scenario_data().fork(), config).unwrap();

    assert_relative_eq!(ev(&resolved, "P B", 2021), ev(&baseline, "P B", 2021));
    assert_relative_eq!(ev(&resolved, "P A", 2020), 10.0);
}
