//! Propagation of flow values through one year's graph
//!
//! # Algorithm
//!
//! 1. Prepare flows: absolute flows pass their value through, relative
//!    flows get their share from the raw percentage.
//! 2. Push each stock's outflow for the year into its relative outflows.
//! 3. Worklist: starting from roots, evaluate every process whose inflows
//!    are all evaluated; requeue the rest.
//! 4. Balance: create virtual inflows or outflows for processes whose mass
//!    balance is off by more than the epsilon.
//!
//! # Critical Invariants
//!
//! - **Gated evaluation**: a non-root process is evaluated only once all of
//!   its inflows are evaluated.
//! - **Queued insertion**: virtual processes and flows are inserted between
//!   worklist pops, never while a process is being evaluated.
//! - **Bounded**: the worklist stops with an error after
//!   `max_iterations` pops.

use super::config::SolverConfig;
use super::SolverError;
use crate::models::{EventLog, Flow, Indicator, Process, SolverEvent, YearGraph};
use crate::stock::DynamicStockModel;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, error, info, warn};

/// Slack for comparisons that must hold exactly in exact arithmetic
const NUMERIC_TOLERANCE: f64 = 1e-9;

/// Outcome of one solved year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimestepSummary {
    pub year: i32,
    pub iterations: usize,
    pub evaluated_processes: usize,
    pub virtual_processes_created: usize,
    pub virtual_flows_created: usize,
}

/// Virtual flow waiting to be inserted into the graph
#[derive(Debug, Clone, Copy)]
enum VirtualInsertion {
    /// Supply a deficit of the process
    Inflow { process_index: usize, amount: f64 },
    /// Drain a surplus of the process
    Outflow { process_index: usize, amount: f64 },
}

pub(crate) struct Timestep<'a> {
    year: i32,
    year_index: usize,
    graph: &'a mut YearGraph,
    indicators: &'a [Indicator],
    config: &'a SolverConfig,
    stock_models: &'a mut BTreeMap<String, DynamicStockModel>,
    events: &'a mut EventLog,
    pending: Vec<VirtualInsertion>,
    summary: TimestepSummary,
}

impl<'a> Timestep<'a> {
    pub(crate) fn new(
        year: i32,
        year_index: usize,
        graph: &'a mut YearGraph,
        indicators: &'a [Indicator],
        config: &'a SolverConfig,
        stock_models: &'a mut BTreeMap<String, DynamicStockModel>,
        events: &'a mut EventLog,
    ) -> Self {
        Self {
            year,
            year_index,
            graph,
            indicators,
            config,
            stock_models,
            events,
            pending: Vec::new(),
            summary: TimestepSummary {
                year,
                ..TimestepSummary::default()
            },
        }
    }

    pub(crate) fn run(mut self) -> Result<TimestepSummary, SolverError> {
        self.prepare_flows();
        self.evaluate_dynamic_stock_outflows();
        let evaluated = self.propagate()?;
        if self.config.use_virtual_flows {
            self.create_virtual_flows(&evaluated)?;
        }

        self.events.log(SolverEvent::TimestepSolved {
            year: self.year,
            iterations: self.summary.iterations,
            evaluated_processes: self.summary.evaluated_processes,
            virtual_processes_created: self.summary.virtual_processes_created,
            virtual_flows_created: self.summary.virtual_flows_created,
        });
        Ok(self.summary)
    }

    // ========================================================================
    // Phase 1-2: Preparation
    // ========================================================================

    fn prepare_flows(&mut self) {
        let prioritized: Vec<bool> = self
            .graph
            .flows()
            .iter()
            .map(|flow| {
                self.graph
                    .process(flow.target_process_id())
                    .map_or(false, |p| {
                        self.config
                            .is_prioritized(p.location(), p.transformation_stage())
                    })
            })
            .collect();

        let reset = self.config.reset_evaluated_values;
        let indicators = self.indicators;
        for (flow, is_prioritized) in self.graph.flows_mut().zip(prioritized) {
            flow.set_prioritized(is_prioritized);
            if flow.is_unit_absolute_value() {
                flow.set_evaluated(true);
                flow.set_evaluated_share(1.0);
                flow.set_evaluated_value(flow.value());
                flow.evaluate_indicators(indicators);
            } else {
                flow.set_evaluated(false);
                flow.set_evaluated_share(flow.value() / 100.0);
                if reset {
                    flow.set_evaluated_value(0.0);
                }
            }
        }
    }

    /// Stock outflow can feed relative-only flows that no inflow reaches
    fn evaluate_dynamic_stock_outflows(&mut self) {
        for (process_id, model) in self.stock_models.iter() {
            let Some(process_index) = self.graph.process_idx(process_id) else {
                continue;
            };
            let stock_outflow = model
                .outflow_total()
                .get(self.year_index)
                .copied()
                .unwrap_or(0.0);
            let outflows = self.graph.outflow_indices(process_index).to_vec();
            let absolute = sum_evaluated(self.graph, &outflows, |f| {
                f.is_unit_absolute_value() && !f.is_prioritized()
            });
            let pool = (stock_outflow - absolute).max(0.0);
            distribute_relative(self.graph, &outflows, pool, self.indicators, |f| {
                !f.is_prioritized()
            });
        }
    }

    // ========================================================================
    // Phase 3: Worklist propagation
    // ========================================================================

    /// Returns the evaluated flag of every process in the graph
    fn propagate(&mut self) -> Result<Vec<bool>, SolverError> {
        let count = self.graph.process_count();
        let mut evaluated = vec![false; count];
        let mut queued = vec![false; count];
        let mut queue = VecDeque::new();

        for index in 0..count {
            if self.graph.process_at(index).is_virtual() {
                evaluated[index] = true;
            } else if self.graph.inflow_indices(index).is_empty() {
                queue.push_back(index);
                queued[index] = true;
            }
        }

        let mut iterations = 0;
        while let Some(index) = queue.pop_front() {
            queued[index] = false;
            if evaluated[index] {
                continue;
            }

            iterations += 1;
            if iterations > self.config.max_iterations {
                return Err(self.unsolvable_loop(iterations, &evaluated));
            }

            let is_evaluated = self.evaluate_process(index)?;
            self.apply_pending_insertions()?;

            // Entries added by insertions are virtual and need no evaluation
            evaluated.resize(self.graph.process_count(), true);
            queued.resize(self.graph.process_count(), false);

            if is_evaluated {
                evaluated[index] = true;
            }
            for target in self.graph.target_indices(index) {
                if !evaluated[target] && !queued[target] {
                    queue.push_back(target);
                    queued[target] = true;
                }
            }
            if !is_evaluated && !queued[index] {
                queue.push_back(index);
                queued[index] = true;
            }
        }

        let unevaluated: Vec<&str> = evaluated
            .iter()
            .enumerate()
            .filter(|(_, &done)| !done)
            .map(|(index, _)| self.graph.process_at(index).id())
            .collect();
        if !unevaluated.is_empty() {
            warn!(
                year = self.year,
                processes = ?unevaluated,
                "Processes left unevaluated after propagation"
            );
        }

        self.summary.iterations = iterations;
        self.summary.evaluated_processes = evaluated
            .iter()
            .enumerate()
            .filter(|(index, &done)| done && !self.graph.process_at(*index).is_virtual())
            .count();
        Ok(evaluated)
    }

    fn unsolvable_loop(&self, iterations: usize, evaluated: &[bool]) -> SolverError {
        let graph = &*self.graph;
        let mut suspects: Vec<String> = (0..graph.process_count())
            .filter(|&index| {
                let process = graph.process_at(index);
                let outflows = graph.outflow_indices(index);
                !process.is_virtual()
                    && !self.stock_models.contains_key(process.id())
                    && graph.inflow_indices(index).is_empty()
                    && !outflows.is_empty()
                    && outflows
                        .iter()
                        .all(|&f| !graph.flow_at(f).is_unit_absolute_value())
            })
            .map(|index| graph.process_at(index).id().to_string())
            .collect();

        if suspects.is_empty() {
            suspects = evaluated
                .iter()
                .enumerate()
                .filter(|(_, &done)| !done)
                .map(|(index, _)| graph.process_at(index).id().to_string())
                .collect();
        }

        error!(
            year = self.year,
            iterations,
            suspects = ?suspects,
            "Unsolvable propagation loop, processes with no inflows and only relative outflows \
             cannot be evaluated"
        );
        SolverError::UnsolvableLoop {
            year: self.year,
            iterations,
            suspect_process_ids: suspects,
        }
    }

    /// Returns true once the process is evaluated for this year
    fn evaluate_process(&mut self, process_index: usize) -> Result<bool, SolverError> {
        let inflows = self.graph.inflow_indices(process_index).to_vec();
        let outflows = self.graph.outflow_indices(process_index).to_vec();

        if inflows.is_empty() {
            return Ok(true);
        }

        if !inflows.iter().all(|&f| self.graph.flow_at(f).is_evaluated()) {
            for &f in &outflows {
                let flow = self.graph.flow_at_mut(f);
                if flow.is_unit_absolute_value() {
                    flow.set_evaluated(true);
                }
            }
            return Ok(false);
        }

        let total_inflows = sum_evaluated(self.graph, &inflows, |_| true);
        let process_id = self.graph.process_at(process_index).id().to_string();

        if self.stock_models.contains_key(&process_id) {
            self.evaluate_stock_process(&process_id, total_inflows, &outflows)?;
        } else {
            self.evaluate_flow_process(process_index, total_inflows, &outflows);
        }

        debug!(
            year = self.year,
            process_id = %process_id,
            total_inflows,
            "Process evaluated"
        );
        Ok(true)
    }

    fn evaluate_flow_process(&mut self, process_index: usize, inflows: f64, outflows: &[usize]) {
        let epsilon = self.config.virtual_flows_epsilon;
        let absolute = sum_evaluated(self.graph, outflows, |f| f.is_unit_absolute_value());

        let mut total_inflows = inflows;
        let deficit = absolute - total_inflows;
        if self.config.use_virtual_flows
            && !self.graph.process_at(process_index).is_virtual()
            && !outflows.is_empty()
            && deficit > epsilon
        {
            self.pending.push(VirtualInsertion::Inflow {
                process_index,
                amount: deficit,
            });
            total_inflows += deficit;
        }

        let pool = total_inflows - absolute;
        if pool < -epsilon {
            warn!(
                year = self.year,
                process_id = %self.graph.process_at(process_index).id(),
                inflows = total_inflows,
                absolute_outflows = absolute,
                "Absolute outflows exceed inflows, relative outflows set to zero"
            );
        }
        distribute_relative(self.graph, outflows, pool.max(0.0), self.indicators, |_| true);
    }

    fn evaluate_stock_process(
        &mut self,
        process_id: &str,
        total_inflows: f64,
        outflows: &[usize],
    ) -> Result<(), SolverError> {
        // Prioritized outflows are served from inflow before the stock
        let mut prioritized = 0.0;
        for &f in outflows {
            let flow = self.graph.flow_at_mut(f);
            if !flow.is_prioritized() {
                continue;
            }
            if !flow.is_unit_absolute_value() {
                flow.set_evaluated_value(flow.evaluated_share() * total_inflows);
                flow.set_evaluated(true);
                flow.evaluate_indicators(self.indicators);
            }
            prioritized += flow.evaluated_value();
        }

        if prioritized > total_inflows + NUMERIC_TOLERANCE {
            error!(
                year = self.year,
                process_id,
                prioritized,
                inflows = total_inflows,
                "Prioritized outflows exceed inflows"
            );
            return Err(SolverError::PrioritizedOutflowExceedsInflow {
                process_id: process_id.to_string(),
                year: self.year,
                prioritized,
                inflows: total_inflows,
            });
        }

        let Some(model) = self.stock_models.get_mut(process_id) else {
            return Ok(());
        };
        model
            .accumulate_inflow(self.year_index, total_inflows - prioritized)
            .map_err(|source| SolverError::Stock {
                process_id: process_id.to_string(),
                source,
            })?;
        let stock_outflow = model
            .outflow_total()
            .get(self.year_index)
            .copied()
            .unwrap_or(0.0);

        let absolute = sum_evaluated(self.graph, outflows, |f| {
            f.is_unit_absolute_value() && !f.is_prioritized()
        });
        let pool = stock_outflow - absolute;
        if pool < -NUMERIC_TOLERANCE {
            error!(
                year = self.year,
                process_id,
                stock_outflow,
                absolute_outflows = absolute,
                "Stock outflow is less than the sum of absolute outflows"
            );
            return Err(SolverError::StockOutflowBelowAbsoluteOutflows {
                process_id: process_id.to_string(),
                year: self.year,
                stock_outflow,
                absolute_outflows: absolute,
            });
        }

        distribute_relative(self.graph, outflows, pool.max(0.0), self.indicators, |f| {
            !f.is_prioritized()
        });
        Ok(())
    }

    // ========================================================================
    // Phase 4: Virtual flows
    // ========================================================================

    fn create_virtual_flows(&mut self, evaluated: &[bool]) -> Result<(), SolverError> {
        let epsilon = self.config.virtual_flows_epsilon;
        let processes_before = self.summary.virtual_processes_created;
        let flows_before = self.summary.virtual_flows_created;

        for index in 0..self.graph.process_count() {
            let process = self.graph.process_at(index);
            if process.is_virtual() || !evaluated.get(index).copied().unwrap_or(false) {
                continue;
            }

            let inflows = self.graph.inflow_indices(index);
            let outflows = self.graph.outflow_indices(index);
            if inflows.is_empty() || outflows.is_empty() {
                continue;
            }

            let balance = match self.stock_models.get(process.id()) {
                Some(model) => {
                    let stock_outflow = model
                        .outflow_total()
                        .get(self.year_index)
                        .copied()
                        .unwrap_or(0.0);
                    stock_outflow - sum_evaluated(self.graph, outflows, |f| !f.is_prioritized())
                }
                None => {
                    sum_evaluated(self.graph, inflows, |_| true)
                        - sum_evaluated(self.graph, outflows, |_| true)
                }
            };

            if balance.abs() <= epsilon {
                continue;
            }
            let amount = balance.abs();
            self.pending.push(if balance < 0.0 {
                VirtualInsertion::Inflow {
                    process_index: index,
                    amount,
                }
            } else {
                VirtualInsertion::Outflow {
                    process_index: index,
                    amount,
                }
            });
        }

        self.apply_pending_insertions()?;

        info!(
            year = self.year,
            virtual_processes = self.summary.virtual_processes_created - processes_before,
            virtual_flows = self.summary.virtual_flows_created - flows_before,
            "Created {} virtual processes and {} virtual flows for year {}",
            self.summary.virtual_processes_created - processes_before,
            self.summary.virtual_flows_created - flows_before,
            self.year
        );
        Ok(())
    }

    fn apply_pending_insertions(&mut self) -> Result<(), SolverError> {
        for insertion in std::mem::take(&mut self.pending) {
            let (process_index, amount, is_inflow) = match insertion {
                VirtualInsertion::Inflow {
                    process_index,
                    amount,
                } => (process_index, amount, true),
                VirtualInsertion::Outflow {
                    process_index,
                    amount,
                } => (process_index, amount, false),
            };

            let process = self.graph.process_at(process_index).clone();
            let virtual_id = Process::virtual_id(process.id());
            if self.graph.process_idx(&virtual_id).is_none() {
                self.graph.insert_process(Process::new_virtual(&process))?;
                self.summary.virtual_processes_created += 1;
                self.events.log(SolverEvent::VirtualProcessCreated {
                    year: self.year,
                    process_id: virtual_id.clone(),
                    for_process_id: process.id().to_string(),
                });
            }

            let (source, target) = if is_inflow {
                (virtual_id, process.id().to_string())
            } else {
                (process.id().to_string(), virtual_id)
            };
            let flow_id = Flow::make_id(&source, &target);

            if let Some(flow) = self.graph.flow_mut(&flow_id) {
                flow.add_to_value(amount);
                flow.evaluate_indicators(self.indicators);
            } else {
                let mut flow = Flow::new_virtual(source, target, self.year, amount);
                flow.evaluate_indicators(self.indicators);
                self.graph.insert_flow(flow)?;
                self.summary.virtual_flows_created += 1;
            }

            debug!(year = self.year, flow_id = %flow_id, amount, "Virtual flow created");
            self.events.log(SolverEvent::VirtualFlowCreated {
                year: self.year,
                flow_id,
                value: amount,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn sum_evaluated(graph: &YearGraph, flows: &[usize], filter: impl Fn(&Flow) -> bool) -> f64 {
    flows
        .iter()
        .map(|&f| graph.flow_at(f))
        .filter(|flow| filter(flow))
        .map(Flow::evaluated_value)
        .sum()
}

/// Split `pool` among the selected relative flows by evaluated share
fn distribute_relative(
    graph: &mut YearGraph,
    flows: &[usize],
    pool: f64,
    indicators: &[Indicator],
    filter: impl Fn(&Flow) -> bool,
) {
    for &f in flows {
        let flow = graph.flow_at_mut(f);
        if flow.is_unit_absolute_value() || !filter(flow) {
            continue;
        }
        flow.set_evaluated_value(flow.evaluated_share() * pool);
        flow.set_evaluated(true);
        flow.evaluate_indicators(indicators);
    }
}
