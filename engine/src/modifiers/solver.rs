//! FlowModifierSolver - applies scenario flow modifiers to a solved scenario
//!
//! Modifiers are grouped by source process because modifiers on the same
//! source compete for the same outflow capacity. Absolute target flows are
//! handled before relative ones: the relative pool of a process depends on
//! its absolute outflows.
//!
//! # Algorithm
//!
//! 1. Compute the trajectory of every modifier from its target's
//!    first-year state.
//! 2. Per flow kind (absolute, then relative): plan target and offset
//!    changes, checking total outflow capacity and, for relative flows,
//!    the share the receiving flows can give up.
//! 3. Constrained: any feasibility error aborts with nothing applied.
//!    Unconstrained: errors are reported and the changes applied anyway.
//! 4. Re-derive relative shares of the modified source processes from
//!    their evaluated values.
//! 5. Check for negative flows and relative outflows above 100%.
//!    Unconstrained runs clamp negative flows to zero afterwards.
//!
//! # Critical Invariants
//!
//! - **Conservation**: with enough receiving capacity, the total outflow of
//!   a modified source process is unchanged in every year.
//! - **All or nothing**: a Constrained solve that fails leaves every flow
//!   as it found it.

use super::entries::{FlowChangeEntry, FlowErrorData, FlowErrorEntry, FlowErrorType};
use super::trajectory::{calculate_new_flow_values, FlowBaseline};
use super::{ModifierError, ModifierReport};
use crate::models::{Flow, FlowModifier, ScenarioType, SolverEvent};
use crate::solver::FlowSolver;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};

/// Slack for comparisons that must hold exactly in exact arithmetic
const NUMERIC_TOLERANCE: f64 = 1e-9;

/// Allowed excess of a process's relative outflow shares, in percent
const SHARE_TOLERANCE_PERCENT: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowKind {
    Absolute,
    Relative,
}

impl FlowKind {
    fn of(flow: &Flow) -> Self {
        if flow.is_unit_absolute_value() {
            FlowKind::Absolute
        } else {
            FlowKind::Relative
        }
    }

    fn matches(self, flow: &Flow) -> bool {
        Self::of(flow) == self
    }

    fn label(self) -> &'static str {
        match self {
            FlowKind::Absolute => "absolute",
            FlowKind::Relative => "relative",
        }
    }
}

/// Flow state before the solver first touched it
#[derive(Debug, Clone, Copy)]
struct FlowState {
    value: f64,
    evaluated_share: f64,
    evaluated_value: f64,
}

/// Flow that receives the inverse of a target's movement
struct Recipient {
    flow_id: String,
    evaluated_value: f64,
    evaluated_share: f64,
}

#[derive(Default)]
struct Changeset {
    entries: Vec<FlowChangeEntry>,
    errors: Vec<FlowErrorEntry>,
}

pub struct FlowModifierSolver<'a> {
    flow_solver: &'a mut FlowSolver,
    scenario_type: ScenarioType,
    undo: BTreeMap<(i32, String), FlowState>,
    /// Event log length when the current batch started
    events_before: usize,
}

impl<'a> FlowModifierSolver<'a> {
    /// `flow_solver` must already be solved
    pub fn new(flow_solver: &'a mut FlowSolver, scenario_type: ScenarioType) -> Self {
        Self {
            flow_solver,
            scenario_type,
            undo: BTreeMap::new(),
            events_before: 0,
        }
    }

    pub fn scenario_type(&self) -> ScenarioType {
        self.scenario_type
    }

    /// Apply `modifiers` to the solved flows
    ///
    /// # Errors
    ///
    /// - malformed modifiers or modifiers referring to missing flows/years
    /// - Constrained only: `Infeasible` when the scenario cannot supply the
    ///   requested change, `InconsistentResults` when the applied changes
    ///   produce negative flows or shares above 100%
    pub fn solve(&mut self, modifiers: &[FlowModifier]) -> Result<ModifierReport, ModifierError> {
        self.undo.clear();
        self.events_before = self.flow_solver.event_log().len();
        if modifiers.is_empty() {
            return Ok(ModifierReport::default());
        }

        info!(
            modifiers = modifiers.len(),
            scenario_type = ?self.scenario_type,
            "Applying flow modifiers"
        );

        self.validate(modifiers)?;
        let baselines = self.baselines(modifiers)?;

        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut excluded: BTreeSet<String> = BTreeSet::new();
        for (index, modifier) in modifiers.iter().enumerate() {
            groups
                .entry(modifier.source_process_id().to_string())
                .or_default()
                .push(index);
            excluded.insert(modifier.target_flow_id());
            excluded.extend(modifier.opposite_flow_ids());
        }

        let mut report = ModifierReport::default();
        let mut applied = Vec::new();

        for kind in [FlowKind::Absolute, FlowKind::Relative] {
            let changeset = self.plan_changes(modifiers, &baselines, &groups, &excluded, kind)?;

            for entry in &changeset.errors {
                let diagnostic = describe_error(entry, modifiers, kind);
                report.diagnostics.push(diagnostic);
            }
            report.errors.extend(changeset.errors);

            if self.scenario_type == ScenarioType::Constrained && !report.errors.is_empty() {
                for diagnostic in &report.diagnostics {
                    error!(diagnostic = %diagnostic, "Flow modifier infeasible");
                }
                self.rollback()?;
                return Err(ModifierError::Infeasible {
                    diagnostics: report.diagnostics,
                    errors: report.errors,
                });
            }

            report.changes_applied += self.apply(&changeset.entries)?;
            if kind == FlowKind::Absolute {
                self.refresh_relative_outflows(&changeset.entries)?;
            }
            applied.extend(changeset.entries);
        }

        self.recalculate_relative_shares(modifiers)?;

        let inconsistencies = self.check_results(modifiers, &applied)?;
        if self.scenario_type == ScenarioType::Constrained && !inconsistencies.is_empty() {
            for diagnostic in &inconsistencies {
                error!(diagnostic = %diagnostic, "Flow modifier results inconsistent");
            }
            self.rollback()?;
            return Err(ModifierError::InconsistentResults {
                diagnostics: inconsistencies,
            });
        }
        report.diagnostics.extend(inconsistencies);

        if self.scenario_type == ScenarioType::Unconstrained {
            for diagnostic in &report.diagnostics {
                warn!(diagnostic = %diagnostic, "Flow modifier issue tolerated");
            }
            report.flows_clamped = self.flow_solver.clamp_flow_values_below_zero();
        }

        info!(
            changes_applied = report.changes_applied,
            errors = report.errors.len(),
            flows_clamped = report.flows_clamped,
            "Flow modifiers applied"
        );
        Ok(report)
    }

    // ========================================================================
    // Preparation
    // ========================================================================

    fn validate(&self, modifiers: &[FlowModifier]) -> Result<(), ModifierError> {
        for (index, modifier) in modifiers.iter().enumerate() {
            modifier
                .validate()
                .map_err(|source| ModifierError::InvalidModifier { index, source })?;

            let flow_id = modifier.target_flow_id();
            for year in modifier.years() {
                if !self.flow_solver.years().contains(&year) {
                    return Err(ModifierError::YearOutOfRange { flow_id, year });
                }
                if !self.flow_solver.has_flow(&flow_id, Some(year)) {
                    return Err(ModifierError::TargetFlowMissing { flow_id, year });
                }
            }
        }
        Ok(())
    }

    fn baselines(&self, modifiers: &[FlowModifier]) -> Result<Vec<FlowBaseline>, ModifierError> {
        modifiers
            .iter()
            .map(|modifier| {
                let year = Some(modifier.start_year());
                let flow = self.flow_solver.get_flow(&modifier.target_flow_id(), year)?;
                Ok(FlowBaseline {
                    evaluated_value: flow.evaluated_value(),
                    evaluated_share: flow.evaluated_share(),
                    is_absolute: flow.is_unit_absolute_value(),
                })
            })
            .collect()
    }

    // ========================================================================
    // Planning
    // ========================================================================

    fn plan_changes(
        &self,
        modifiers: &[FlowModifier],
        baselines: &[FlowBaseline],
        groups: &BTreeMap<String, Vec<usize>>,
        excluded: &BTreeSet<String>,
        kind: FlowKind,
    ) -> Result<Changeset, ModifierError> {
        let mut changeset = Changeset::default();

        for (source_id, indices) in groups {
            let members: Vec<usize> = indices
                .iter()
                .copied()
                .filter(|&i| baselines[i].is_absolute == (kind == FlowKind::Absolute))
                .collect();
            if members.is_empty() {
                continue;
            }

            // Year -> (required outflow, first modifier active that year)
            let mut required: BTreeMap<i32, (f64, usize)> = BTreeMap::new();

            for &index in &members {
                let modifier = &modifiers[index];
                let baseline = &baselines[index];
                let target_id = modifier.target_flow_id();
                let trajectory = calculate_new_flow_values(modifier, baseline);
                debug!(
                    flow_id = %target_id,
                    values = ?trajectory.values,
                    "Flow modifier trajectory"
                );

                let mut worst_share: Option<(i32, FlowErrorData)> = None;

                for (&year, &raw) in trajectory.years.iter().zip(&trajectory.values) {
                    let flow = self.flow_solver.get_flow(&target_id, Some(year))?;
                    let current_value = flow.evaluated_value();
                    let current_percent = flow.evaluated_share() * 100.0;

                    let (new_share, new_value, share_offset) = match kind {
                        FlowKind::Absolute => (1.0, raw, 0.0),
                        FlowKind::Relative => {
                            let pool = self
                                .flow_solver
                                .get_process_relative_pool(source_id, Some(year))?;
                            let share = raw / 100.0;
                            (share, share * pool, raw - current_percent)
                        }
                    };
                    let offset = new_value - current_value;

                    required.entry(year).or_insert((0.0, index)).0 += new_value;
                    changeset.entries.push(FlowChangeEntry::target(
                        index,
                        year,
                        &target_id,
                        raw,
                        new_share,
                        new_value,
                        offset,
                        share_offset,
                    ));

                    if !modifier.apply_to_targets() {
                        continue;
                    }

                    let recipients = self.recipients(modifier, year, kind, excluded)?;

                    if kind == FlowKind::Relative {
                        let available: f64 = recipients.iter().map(|r| r.evaluated_share).sum();
                        let required_share = new_share - baseline.evaluated_share;
                        let shortfall = required_share - available;
                        let is_worse = worst_share.map_or(true, |(_, data)| {
                            shortfall > data.required_share - data.available_share
                        });
                        if shortfall > NUMERIC_TOLERANCE && is_worse {
                            worst_share = Some((
                                year,
                                FlowErrorData {
                                    start_share: baseline.evaluated_share,
                                    available_share: available,
                                    required_share,
                                },
                            ));
                        }
                    }

                    let weights =
                        redistribution_weights(&recipients, modifier.has_opposite_targets());
                    if weights.is_empty() && offset.abs() > NUMERIC_TOLERANCE {
                        warn!(
                            year,
                            flow_id = %target_id,
                            offset,
                            "No flows can absorb the change of the modified flow"
                        );
                    }
                    for (recipient, weight) in recipients.iter().zip(weights) {
                        changeset.entries.push(FlowChangeEntry::offset(
                            index,
                            year,
                            &recipient.flow_id,
                            -offset * weight,
                            -share_offset * weight,
                        ));
                    }
                }

                if let Some((year, data)) = worst_share {
                    changeset.errors.push(FlowErrorEntry {
                        year,
                        outflows_total: data.available_share * 100.0,
                        outflows_required: data.required_share * 100.0,
                        flow_modifier_index: index,
                        error_type: if modifier.has_opposite_targets() {
                            FlowErrorType::NotEnoughOppositeFlowShares
                        } else {
                            FlowErrorType::NotEnoughSiblingFlowShares
                        },
                        data: Some(data),
                    });
                }
            }

            let mut worst_total: Option<FlowErrorEntry> = None;
            for (&year, &(outflows_required, index)) in &required {
                let outflows_total = self.available_outflows(source_id, year, kind)?;
                if outflows_required <= outflows_total + NUMERIC_TOLERANCE {
                    continue;
                }
                let candidate = FlowErrorEntry {
                    year,
                    outflows_total,
                    outflows_required,
                    flow_modifier_index: index,
                    error_type: FlowErrorType::NotEnoughTotalOutflows,
                    data: None,
                };
                let is_worse = worst_total
                    .as_ref()
                    .map_or(true, |worst| candidate.outflows_missing() < worst.outflows_missing());
                if is_worse {
                    worst_total = Some(candidate);
                }
            }
            changeset.errors.extend(worst_total);
        }

        Ok(changeset)
    }

    /// Outflow capacity of `source_id` for flows of `kind`
    fn available_outflows(
        &self,
        source_id: &str,
        year: i32,
        kind: FlowKind,
    ) -> Result<f64, ModifierError> {
        Ok(match kind {
            FlowKind::Absolute => self
                .flow_solver
                .get_process_outflows(source_id, Some(year))?
                .iter()
                .filter(|f| f.is_unit_absolute_value() && !f.is_virtual())
                .map(|f| f.evaluated_value())
                .sum(),
            FlowKind::Relative => self
                .flow_solver
                .get_process_relative_pool(source_id, Some(year))?,
        })
    }

    /// Opposite flows when named, otherwise unclaimed same-kind siblings
    fn recipients(
        &self,
        modifier: &FlowModifier,
        year: i32,
        kind: FlowKind,
        excluded: &BTreeSet<String>,
    ) -> Result<Vec<Recipient>, ModifierError> {
        let target_id = modifier.target_flow_id();
        let to_recipient = |flow: &Flow| Recipient {
            flow_id: flow.id().to_string(),
            evaluated_value: flow.evaluated_value(),
            evaluated_share: flow.evaluated_share(),
        };

        if modifier.has_opposite_targets() {
            let mut recipients = Vec::new();
            for flow_id in modifier.opposite_flow_ids() {
                if flow_id == target_id {
                    continue;
                }
                match self.flow_solver.get_flow(&flow_id, Some(year)) {
                    Ok(flow) if kind.matches(flow) => recipients.push(to_recipient(flow)),
                    Ok(_) => {
                        warn!(
                            year,
                            flow_id = %flow_id,
                            "Opposite flow has a different unit type, skipped"
                        );
                    }
                    Err(_) => {
                        warn!(year, flow_id = %flow_id, "Opposite flow does not exist, skipped");
                    }
                }
            }
            return Ok(recipients);
        }

        Ok(self
            .flow_solver
            .get_process_outflows(modifier.source_process_id(), Some(year))?
            .into_iter()
            .filter(|f| kind.matches(f) && !f.is_virtual() && !excluded.contains(f.id()))
            .map(to_recipient)
            .collect())
    }

    // ========================================================================
    // Application
    // ========================================================================

    /// Remember a flow's state before its first change
    fn record_undo(&mut self, year: i32, flow_id: &str) -> Result<(), ModifierError> {
        let key = (year, flow_id.to_string());
        if self.undo.contains_key(&key) {
            return Ok(());
        }
        let flow = self.flow_solver.get_flow(flow_id, Some(year))?;
        let state = FlowState {
            value: flow.value(),
            evaluated_share: flow.evaluated_share(),
            evaluated_value: flow.evaluated_value(),
        };
        self.undo.insert(key, state);
        Ok(())
    }

    /// Restore every touched flow and drop the events of this batch
    fn rollback(&mut self) -> Result<(), ModifierError> {
        let indicators = self.flow_solver.scenario_data().indicators().to_vec();
        for ((year, flow_id), state) in std::mem::take(&mut self.undo) {
            let flow = self.flow_solver.get_flow_mut(&flow_id, Some(year))?;
            flow.set_value(state.value);
            flow.set_evaluated_share(state.evaluated_share);
            flow.set_evaluated_value(state.evaluated_value);
            flow.evaluate_indicators(&indicators);
        }
        self.flow_solver.truncate_events(self.events_before);
        Ok(())
    }

    /// Target entries first, then offsets; returns the number of changes
    fn apply(&mut self, entries: &[FlowChangeEntry]) -> Result<usize, ModifierError> {
        let indicators = self.flow_solver.scenario_data().indicators().to_vec();
        let ordered = entries
            .iter()
            .filter(|e| e.is_target)
            .chain(entries.iter().filter(|e| !e.is_target));

        let mut count = 0;
        for entry in ordered {
            self.record_undo(entry.year, &entry.flow_id)?;
            let flow = self.flow_solver.get_flow_mut(&entry.flow_id, Some(entry.year))?;
            let previous_value = flow.evaluated_value();

            if entry.is_target {
                flow.set_value(entry.value);
                flow.set_evaluated_share(entry.evaluated_share);
                flow.set_evaluated_value(entry.evaluated_value);
            } else if flow.is_unit_absolute_value() {
                flow.add_to_value(entry.evaluated_offset);
            } else {
                flow.set_evaluated_value(flow.evaluated_value() + entry.evaluated_offset);
                let share_offset = entry.evaluated_share_offset / 100.0;
                flow.set_evaluated_share(flow.evaluated_share() + share_offset);
                flow.set_value(flow.value() + entry.evaluated_share_offset);
            }
            flow.evaluate_indicators(&indicators);
            let new_value = flow.evaluated_value();

            self.flow_solver.log_event(SolverEvent::FlowModified {
                year: entry.year,
                flow_id: entry.flow_id.clone(),
                previous_value,
                new_value,
            });
            count += 1;
        }
        Ok(count)
    }

    /// Re-split the relative pool of sources whose absolute outflows changed
    fn refresh_relative_outflows(
        &mut self,
        entries: &[FlowChangeEntry],
    ) -> Result<(), ModifierError> {
        let indicators = self.flow_solver.scenario_data().indicators().to_vec();
        let mut touched = BTreeSet::new();
        for entry in entries {
            let flow = self.flow_solver.get_flow(&entry.flow_id, Some(entry.year))?;
            touched.insert((entry.year, flow.source_process_id().to_string()));
        }

        for (year, source_id) in touched {
            let pool = self.flow_solver.get_process_relative_pool(&source_id, Some(year))?;
            let relative_ids: Vec<String> = self
                .flow_solver
                .get_process_outflows(&source_id, Some(year))?
                .into_iter()
                .filter(|f| !f.is_unit_absolute_value() && !f.is_prioritized() && !f.is_virtual())
                .map(|f| f.id().to_string())
                .collect();

            for flow_id in relative_ids {
                self.record_undo(year, &flow_id)?;
                let flow = self.flow_solver.get_flow_mut(&flow_id, Some(year))?;
                flow.set_evaluated_value(flow.evaluated_share() * pool);
                flow.evaluate_indicators(&indicators);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Post-processing
    // ========================================================================

    /// Source process id -> years touched by its modifiers
    fn source_years(modifiers: &[FlowModifier]) -> BTreeMap<String, BTreeSet<i32>> {
        let mut sources: BTreeMap<String, BTreeSet<i32>> = BTreeMap::new();
        for modifier in modifiers {
            sources
                .entry(modifier.source_process_id().to_string())
                .or_default()
                .extend(modifier.years());
        }
        sources
    }

    /// Derive shares of relative outflows from evaluated values
    ///
    /// Only non-virtual, non-stock source processes of the modifiers are
    /// touched. The raw percentage follows the share.
    fn recalculate_relative_shares(
        &mut self,
        modifiers: &[FlowModifier],
    ) -> Result<(), ModifierError> {
        for (source_id, years) in Self::source_years(modifiers) {
            if self.flow_solver.has_stock(&source_id) {
                continue;
            }
            for year in years {
                if self.flow_solver.get_process(&source_id, Some(year))?.is_virtual() {
                    continue;
                }
                let pool = self.flow_solver.get_process_relative_pool(&source_id, Some(year))?;
                if pool <= NUMERIC_TOLERANCE {
                    continue;
                }

                let relative_ids: Vec<String> = self
                    .flow_solver
                    .get_process_outflows(&source_id, Some(year))?
                    .into_iter()
                    .filter(|f| !f.is_unit_absolute_value() && !f.is_virtual())
                    .map(|f| f.id().to_string())
                    .collect();

                for flow_id in relative_ids {
                    self.record_undo(year, &flow_id)?;
                    let flow = self.flow_solver.get_flow_mut(&flow_id, Some(year))?;
                    let share = flow.evaluated_value() / pool;
                    flow.set_evaluated_share(share);
                    flow.set_value(share * 100.0);
                }
            }
        }
        Ok(())
    }

    /// Diagnostics for negative flows and relative shares above 100%
    fn check_results(
        &self,
        modifiers: &[FlowModifier],
        applied: &[FlowChangeEntry],
    ) -> Result<Vec<String>, ModifierError> {
        let mut diagnostics = Vec::new();

        for (index, modifier) in modifiers.iter().enumerate() {
            let mut worst: Option<(f64, &str, i32)> = None;
            for entry in applied.iter().filter(|e| e.flow_modifier_index == index) {
                let value = self
                    .flow_solver
                    .get_flow(&entry.flow_id, Some(entry.year))?
                    .evaluated_value();
                if value < -NUMERIC_TOLERANCE && worst.map_or(true, |(w, _, _)| value < w) {
                    worst = Some((value, &entry.flow_id, entry.year));
                }
            }

            if let Some((value, flow_id, year)) = worst {
                let receivers = if modifier.has_opposite_targets() {
                    "opposite"
                } else {
                    "sibling"
                };
                diagnostics.push(format!(
                    "Flow modifier in row {} targets {} flows that do not have enough flows. \
                     This caused negative flow (evaluated value={}) for flow '{}' in year {}",
                    row_number(modifier, index),
                    receivers,
                    value,
                    flow_id,
                    year
                ));
            }
        }

        for (source_id, years) in Self::source_years(modifiers) {
            for year in years {
                let total_percent: f64 = self
                    .flow_solver
                    .get_process_outflows(&source_id, Some(year))?
                    .iter()
                    .filter(|f| !f.is_unit_absolute_value() && !f.is_virtual())
                    .map(|f| f.evaluated_share() * 100.0)
                    .sum();
                if total_percent <= 100.0 + SHARE_TOLERANCE_PERCENT {
                    continue;
                }

                let (index, modifier) = modifiers
                    .iter()
                    .enumerate()
                    .find(|(_, m)| m.source_process_id() == source_id && m.years().contains(&year))
                    .unwrap_or((0, &modifiers[0]));
                diagnostics.push(format!(
                    "Flow modifier in row {} causes the total relative outflows of source process \
                     '{}' to become over 100% in year {} (evaluated share = {:.3}%)",
                    row_number(modifier, index),
                    source_id,
                    year,
                    total_percent
                ));
            }
        }

        Ok(diagnostics)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn row_number(modifier: &FlowModifier, index: usize) -> usize {
    modifier.row_number().unwrap_or(index + 1)
}

/// Split weights proportional to evaluated value
///
/// Opposite flows with no value share the change equally; siblings with
/// no value receive nothing.
fn redistribution_weights(recipients: &[Recipient], equal_when_empty: bool) -> Vec<f64> {
    let total: f64 = recipients.iter().map(|r| r.evaluated_value).sum();
    if total.abs() > NUMERIC_TOLERANCE {
        return recipients.iter().map(|r| r.evaluated_value / total).collect();
    }
    if equal_when_empty && !recipients.is_empty() {
        let weight = 1.0 / recipients.len() as f64;
        return vec![weight; recipients.len()];
    }
    Vec::new()
}

fn describe_error(entry: &FlowErrorEntry, modifiers: &[FlowModifier], kind: FlowKind) -> String {
    let index = entry.flow_modifier_index;
    let modifier = &modifiers[index];
    let row = row_number(modifier, index);

    match entry.error_type {
        FlowErrorType::NotEnoughOppositeFlowShares | FlowErrorType::NotEnoughSiblingFlowShares => {
            let receivers = if entry.error_type == FlowErrorType::NotEnoughOppositeFlowShares {
                "opposite"
            } else {
                "sibling"
            };
            let mut message = format!(
                "Flow modifier in row {} targets {} flows that do not have enough flow shares \
                 in year {} (available={:.3}%, required={:.3}%)",
                row, receivers, entry.year, entry.outflows_total, entry.outflows_required
            );
            if let Some(max_change) = entry.data.and_then(|d| d.max_change_in_value()) {
                message.push_str(&format!(
                    ". Maximum available change in value is {:.3}%",
                    max_change
                ));
            }
            message
        }
        FlowErrorType::NotEnoughTotalOutflows | FlowErrorType::Undefined => format!(
            "Process '{}' does not have enough outflows for {} flows in year {} \
             (total={:.3}, required={:.3}, missing={:.3}) (row number {})",
            modifier.source_process_id(),
            kind.label(),
            entry.year,
            entry.outflows_total,
            entry.outflows_required,
            entry.outflows_missing(),
            row
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Process, ScenarioData};
    use crate::solver::SolverConfig;

    // ========================================================================
    // Test Helpers
    // ========================================================================

    /// S -> P (100), P -> A (abs), P -> B (abs), P -> C (100% of the rest)
    fn create_solver(a: f64, b: f64) -> FlowSolver {
        let mut data = ScenarioData::from_year_range(2020, 2022).unwrap();
        for id in ["S", "P", "A", "B", "C"] {
            data.insert_process_all_years(Process::new(id, id)).unwrap();
        }
        for year in 2020..=2022 {
            data.insert_flow(Flow::absolute("S", "P", year, 100.0)).unwrap();
            data.insert_flow(Flow::absolute("P", "A", year, a)).unwrap();
            data.insert_flow(Flow::absolute("P", "B", year, b)).unwrap();
            data.insert_flow(Flow::relative("P", "C", year, 100.0)).unwrap();
        }
        let mut solver = FlowSolver::new(data, SolverConfig::default()).unwrap();
        solver.solve_timesteps().unwrap();
        solver
    }

    fn ev(solver: &FlowSolver, flow_id: &str, year: i32) -> f64 {
        solver.get_flow(flow_id, Some(year)).unwrap().evaluated_value()
    }

    #[test]
    fn test_redistribution_weights() {
        let recipients = vec![
            Recipient {
                flow_id: "P A".to_string(),
                evaluated_value: 30.0,
                evaluated_share: 1.0,
            },
            Recipient {
                flow_id: "P B".to_string(),
                evaluated_value: 10.0,
                evaluated_share: 1.0,
            },
        ];
        assert_eq!(redistribution_weights(&recipients, false), vec![0.75, 0.25]);

        let empty = vec![
            Recipient {
                flow_id: "P A".to_string(),
                evaluated_value: 0.0,
                evaluated_share: 0.0,
            },
            Recipient {
                flow_id: "P B".to_string(),
                evaluated_value: 0.0,
                evaluated_share: 0.0,
            },
        ];
        assert_eq!(redistribution_weights(&empty, true), vec![0.5, 0.5]);
        assert!(redistribution_weights(&empty, false).is_empty());
    }

    #[test]
    fn test_absolute_change_moves_sibling() {
        let mut solver = create_solver(50.0, 30.0);
        let modifier = FlowModifier::with_change_in_value("P", "A", 2020, 2022, 20.0);

        let report = FlowModifierSolver::new(&mut solver, ScenarioType::Constrained)
            .solve(&[modifier])
            .unwrap();

        assert!(report.is_clean());
        assert_eq!(ev(&solver, "P A", 2022), 70.0);
        assert_eq!(ev(&solver, "P B", 2022), 10.0);
        assert_eq!(ev(&solver, "P C", 2022), 20.0);
        assert_eq!(solver.get_flow("P B", Some(2021)).unwrap().value(), 20.0);
    }

    #[test]
    fn test_constrained_failure_applies_nothing() {
        let mut solver = create_solver(50.0, 10.0);
        let modifier = FlowModifier::with_change_in_value("P", "A", 2020, 2022, 20.0);

        let result =
            FlowModifierSolver::new(&mut solver, ScenarioType::Constrained).solve(&[modifier]);

        let Err(ModifierError::Infeasible { errors, diagnostics }) = result else {
            panic!("expected infeasible modifiers");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].year, 2022);
        assert_eq!(errors[0].outflows_missing(), -10.0);
        assert!(diagnostics[0].contains("does not have enough outflows for absolute flows"));
        assert_eq!(ev(&solver, "P A", 2022), 50.0);
        assert_eq!(ev(&solver, "P B", 2022), 10.0);
    }

    #[test]
    fn test_unconstrained_failure_clamps_negative_flows() {
        let mut solver = create_solver(50.0, 10.0);
        let modifier =
            FlowModifier::with_change_in_value("P", "A", 2020, 2022, 20.0).with_row_number(7);

        let report = FlowModifierSolver::new(&mut solver, ScenarioType::Unconstrained)
            .solve(&[modifier])
            .unwrap();

        assert_eq!(report.errors.len(), 1);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.contains("row 7") && d.contains("negative flow")));
        assert_eq!(report.flows_clamped, 1);
        assert_eq!(ev(&solver, "P A", 2022), 70.0);
        assert_eq!(ev(&solver, "P B", 2022), 0.0);
    }

    #[test]
    fn test_missing_target_flow() {
        let mut solver = create_solver(50.0, 30.0);
        let modifier = FlowModifier::with_target_value("P", "X", 2020, 2021, 1.0);

        let result =
            FlowModifierSolver::new(&mut solver, ScenarioType::Unconstrained).solve(&[modifier]);

        assert_eq!(
            result.unwrap_err(),
            ModifierError::TargetFlowMissing {
                flow_id: "P X".to_string(),
                year: 2020
            }
        );
    }

    #[test]
    fn test_modified_flows_are_logged() {
        let mut solver = create_solver(50.0, 30.0);
        let modifier = FlowModifier::with_target_value("P", "A", 2021, 2022, 40.0);

        FlowModifierSolver::new(&mut solver, ScenarioType::Unconstrained)
            .solve(&[modifier])
            .unwrap();

        let modified = solver.event_log().events_for_flow("P B");
        assert_eq!(modified.len(), 2);
        assert_eq!(ev(&solver, "P A", 2022), 40.0);
        assert_eq!(ev(&solver, "P B", 2022), 40.0);
    }
}
