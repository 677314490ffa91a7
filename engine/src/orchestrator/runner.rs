//! Scenario runner - baseline plus alternative scenarios
//!
//! The baseline is solved from its own data. Every alternative starts from
//! a fork of the solved baseline, applies its flow modifiers on top of the
//! solved state and is then solved again so stocks and downstream
//! processes see the modified flows.
//!
//! # Example
//!
//! ```rust
//! use stockflow_engine::models::{
//!     Flow, FlowModifier, Process, Scenario, ScenarioData, ScenarioDefinition,
//! };
//! use stockflow_engine::orchestrator::ScenarioRunner;
//! use stockflow_engine::solver::SolverConfig;
//!
//! let mut data = ScenarioData::from_year_range(2020, 2021).unwrap();
//! for id in ["S", "P", "A", "B"] {
//!     data.insert_process_all_years(Process::new(id, id)).unwrap();
//! }
//! for year in [2020, 2021] {
//!     data.insert_flow(Flow::absolute("S", "P", year, 10.0)).unwrap();
//!     data.insert_flow(Flow::absolute("P", "A", year, 6.0)).unwrap();
//!     data.insert_flow(Flow::absolute("P", "B", year, 4.0)).unwrap();
//! }
//!
//! let baseline = Scenario::new(ScenarioDefinition::new("Baseline"), data);
//! let alternative = ScenarioDefinition::new("More A").with_flow_modifiers(vec![
//!     FlowModifier::with_change_in_value("P", "A", 2020, 2021, 2.0),
//! ]);
//!
//! let solved = ScenarioRunner::new(SolverConfig::default())
//!     .run(baseline, &[alternative])
//!     .unwrap();
//!
//! let flow = solved[1].data.graph(2021).unwrap().flow("P B").unwrap();
//! assert_eq!(flow.evaluated_value(), 2.0);
//! ```

use super::checkpoint::{CheckpointError, ScenarioSnapshot};
use super::ScenarioError;
use crate::config::ModelConfig;
use crate::modifiers::{FlowModifierSolver, ModifierReport};
use crate::models::{EventLog, Scenario, ScenarioData, ScenarioDefinition, ScenarioType};
use crate::solver::{FlowSolver, SolverConfig, TimestepSummary};
use tracing::info;

/// Result of one solved scenario
#[derive(Debug, Clone)]
pub struct SolvedScenario {
    pub definition: ScenarioDefinition,
    pub data: ScenarioData,
    /// Present when the scenario has flow modifiers
    pub report: Option<ModifierReport>,
    pub events: EventLog,
    pub summaries: Vec<TimestepSummary>,
}

impl SolvedScenario {
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn snapshot(&self, config: &SolverConfig) -> Result<ScenarioSnapshot, CheckpointError> {
        ScenarioSnapshot::capture(self.definition.name(), config, &self.data)
    }
}

pub struct ScenarioRunner {
    config: SolverConfig,
    scenario_type_default: ScenarioType,
}

impl ScenarioRunner {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            scenario_type_default: ScenarioType::default(),
        }
    }

    /// Solver config and default scenario policy from a loaded model config
    pub fn from_model_config(model_config: &ModelConfig) -> Self {
        Self::new(model_config.solver.clone())
            .with_scenario_type_default(model_config.scenario_type_default)
    }

    /// Policy for definitions that do not set their own
    pub fn with_scenario_type_default(mut self, scenario_type: ScenarioType) -> Self {
        self.scenario_type_default = scenario_type;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn scenario_type_default(&self) -> ScenarioType {
        self.scenario_type_default
    }

    /// Policy `definition` is solved with
    pub fn scenario_type_for(&self, definition: &ScenarioDefinition) -> ScenarioType {
        definition
            .scenario_type()
            .unwrap_or(self.scenario_type_default)
    }

    /// Solve the baseline, then every alternative on top of it
    ///
    /// The baseline comes first in the returned list.
    pub fn run(
        &self,
        baseline: Scenario,
        alternatives: &[ScenarioDefinition],
    ) -> Result<Vec<SolvedScenario>, ScenarioError> {
        self.config
            .validate()
            .map_err(ScenarioError::InvalidConfig)?;

        let solved_baseline = self.solve_baseline(baseline)?;
        let mut solved = Vec::with_capacity(alternatives.len() + 1);
        for definition in alternatives {
            solved.push(self.solve_alternative(&solved_baseline.data, definition)?);
        }
        solved.insert(0, solved_baseline);
        Ok(solved)
    }

    pub fn solve_baseline(&self, baseline: Scenario) -> Result<SolvedScenario, ScenarioError> {
        let (definition, data) = baseline.into_parts();
        self.solve(definition, data, self.config.clone())
    }

    /// Solve `definition` starting from already solved baseline data
    pub fn solve_alternative(
        &self,
        baseline_data: &ScenarioData,
        definition: &ScenarioDefinition,
    ) -> Result<SolvedScenario, ScenarioError> {
        let config = self.config.clone().with_reset_evaluated_values(false);
        self.solve(definition.clone(), baseline_data.fork(), config)
    }

    fn solve(
        &self,
        definition: ScenarioDefinition,
        data: ScenarioData,
        config: SolverConfig,
    ) -> Result<SolvedScenario, ScenarioError> {
        let scenario = definition.name().to_string();
        info!(
            scenario = %scenario,
            modifiers = definition.flow_modifiers().len(),
            scenario_type = ?self.scenario_type_for(&definition),
            "Solving scenario"
        );

        let solver_error = |source| ScenarioError::Solver {
            scenario: scenario.clone(),
            source,
        };

        let mut solver = FlowSolver::new(data, config.clone()).map_err(solver_error)?;
        solver.solve_timesteps().map_err(solver_error)?;

        if !definition.has_flow_modifiers() {
            info!(scenario = %scenario, "Scenario solved");
            return Ok(SolvedScenario {
                events: solver.event_log().clone(),
                summaries: solver.timestep_summaries().to_vec(),
                data: solver.into_scenario_data(),
                report: None,
                definition,
            });
        }

        let scenario_type = self.scenario_type_for(&definition);
        let report = FlowModifierSolver::new(&mut solver, scenario_type)
            .solve(definition.flow_modifiers())
            .map_err(|source| ScenarioError::Modifier {
                scenario: scenario.clone(),
                source,
            })?;

        // Virtual entities of the first pass are rebuilt by the second one
        let mut events = solver.event_log().clone();
        let modified = solver.into_scenario_data().fork();
        let mut solver = FlowSolver::new(modified, config).map_err(solver_error)?;
        solver.solve_timesteps().map_err(solver_error)?;
        for event in solver.event_log().events() {
            events.log(event.clone());
        }

        info!(
            scenario = %scenario,
            changes_applied = report.changes_applied,
            errors = report.errors.len(),
            "Scenario solved"
        );
        Ok(SolvedScenario {
            summaries: solver.timestep_summaries().to_vec(),
            data: solver.into_scenario_data(),
            report: Some(report),
            events,
            definition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Flow, FlowModifier, Process};
    use figment::Jail;

    fn create_baseline() -> Scenario {
        let mut data = ScenarioData::from_year_range(2020, 2022).unwrap();
        for id in ["S", "P", "A", "B", "C"] {
            data.insert_process_all_years(Process::new(id, id)).unwrap();
        }
        for year in 2020..=2022 {
            data.insert_flow(Flow::absolute("S", "P", year, 100.0)).unwrap();
            data.insert_flow(Flow::absolute("P", "A", year, 50.0)).unwrap();
            data.insert_flow(Flow::absolute("P", "B", year, 10.0)).unwrap();
            data.insert_flow(Flow::relative("P", "C", year, 100.0)).unwrap();
        }
        Scenario::new(ScenarioDefinition::new("Baseline"), data)
    }

    fn modifier() -> FlowModifier {
        FlowModifier::with_change_in_value("P", "A", 2020, 2022, 20.0)
    }

    #[test]
    fn test_baseline_has_no_report() {
        let solved = ScenarioRunner::new(SolverConfig::default())
            .run(create_baseline(), &[])
            .unwrap();

        assert_eq!(solved.len(), 1);
        assert_eq!(solved[0].name(), "Baseline");
        assert!(solved[0].report.is_none());
        assert_eq!(solved[0].summaries.len(), 3);
    }

    #[test]
    fn test_constrained_alternative_fails() {
        let alternative = ScenarioDefinition::new("Strict")
            .with_scenario_type(ScenarioType::Constrained)
            .with_flow_modifiers(vec![modifier()]);

        let result =
            ScenarioRunner::new(SolverConfig::default()).run(create_baseline(), &[alternative]);

        assert!(matches!(
            result,
            Err(ScenarioError::Modifier { ref scenario, .. }) if scenario == "Strict"
        ));
    }

    #[test]
    fn test_unconstrained_alternative_is_resolved() {
        let alternative = ScenarioDefinition::new("Loose").with_flow_modifiers(vec![modifier()]);

        let solved = ScenarioRunner::new(SolverConfig::default())
            .run(create_baseline(), &[alternative])
            .unwrap();

        let data = &solved[1].data;
        let graph = data.graph(2022).unwrap();
        assert_eq!(graph.flow("P A").unwrap().evaluated_value(), 70.0);
        assert_eq!(graph.flow("P B").unwrap().evaluated_value(), 0.0);
        assert_eq!(graph.flow("P C").unwrap().evaluated_value(), 30.0);
        assert_eq!(solved[1].report.as_ref().unwrap().errors.len(), 1);

        // Baseline is untouched
        let baseline_graph = solved[0].data.graph(2022).unwrap();
        assert_eq!(baseline_graph.flow("P B").unwrap().evaluated_value(), 10.0);
    }

    #[test]
    fn test_definition_policy_overrides_default() {
        let runner = ScenarioRunner::new(SolverConfig::default())
            .with_scenario_type_default(ScenarioType::Constrained);
        let loose = ScenarioDefinition::new("Loose")
            .with_scenario_type(ScenarioType::Unconstrained)
            .with_flow_modifiers(vec![modifier()]);

        assert_eq!(runner.scenario_type_for(&loose), ScenarioType::Unconstrained);
        assert_eq!(
            runner.scenario_type_for(&ScenarioDefinition::new("Unset")),
            ScenarioType::Constrained
        );
        assert!(runner.run(create_baseline(), &[loose]).is_ok());
    }

    #[test]
    fn test_default_policy_from_model_config() {
        Jail::expect_with(|jail| {
            jail.create_file("stockflow.toml", r#"scenario_type_default = "Constrained""#)?;
            let model_config = ModelConfig::load("stockflow.toml").unwrap();
            let runner = ScenarioRunner::from_model_config(&model_config);
            let unset = ScenarioDefinition::new("Unset").with_flow_modifiers(vec![modifier()]);

            assert_eq!(unset.scenario_type(), None);
            assert_eq!(runner.scenario_type_for(&unset), ScenarioType::Constrained);
            let result = runner.run(create_baseline(), &[unset]);
            assert!(matches!(
                result,
                Err(ScenarioError::Modifier { ref scenario, .. }) if scenario == "Unset"
            ));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ScenarioRunner::new(SolverConfig::default().with_max_iterations(0))
            .run(create_baseline(), &[]);
        assert!(matches!(result, Err(ScenarioError::InvalidConfig(_))));
    }
}
