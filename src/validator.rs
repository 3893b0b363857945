//! Feasibility validator - deterministic rewrites over tentative commands.
//!
//! The last line of defense between the coordinator (which may be driven by
//! an LLM) and the drives. It never fails: whatever command set comes in, a
//! feasible one comes out, with every rewrite recorded for the decision
//! trail. Safety here is structural, not probabilistic.

use std::sync::Arc;

use tracing::debug;

use crate::constraints::{
    project_next_level, F2_MAX_M3H, FREQ_MAX_HZ, FREQ_MIN_HZ, L1_GUARD_M, MIN_RUNTIME_SECONDS,
};
use crate::hydraulics::PumpModel;
use crate::types::{PumpCommand, RuntimeTracker, SystemState};

/// Frequency step for the flow-cap reduction walk (Hz).
const F2_REDUCTION_STEP_HZ: f64 = 0.5;

pub struct Validator {
    model: Arc<PumpModel>,
}

impl Validator {
    pub fn new(model: Arc<PumpModel>) -> Self {
        Self { model }
    }

    /// Rewrite `tentative` into a feasible command set.
    ///
    /// Rewrites are applied in a fixed order: frequency clamp, min-one-pump,
    /// flow cap, minimum-runtime locks, sufficient-flow guard. Returns the
    /// feasible set plus one trail entry per rewrite.
    pub fn validate(
        &self,
        tentative: Vec<PumpCommand>,
        state: &SystemState,
        tracker: &RuntimeTracker,
        forecast_next_f1_m3_per_15min: f64,
        prev_commands: &[PumpCommand],
        safety_vetoed: bool,
    ) -> (Vec<PumpCommand>, Vec<String>) {
        let mut conflicts = Vec::new();

        // Working set: (pump_id, frequency) of started pumps.
        // 1. Frequency clamp. NaN or negative means the drive was asked for
        //    nonsense — treat as stopped.
        let mut started: Vec<(String, f64)> = Vec::new();
        for command in &tentative {
            if !command.start {
                continue;
            }
            let f = command.frequency_hz;
            if !f.is_finite() || f <= 0.0 {
                conflicts.push(format!(
                    "FREQ_OUT_OF_BAND: treated {} ({f}) as stopped",
                    command.pump_id
                ));
                continue;
            }
            if f < FREQ_MIN_HZ || f > FREQ_MAX_HZ {
                let clamped = f.clamp(FREQ_MIN_HZ, FREQ_MAX_HZ);
                conflicts.push(format!(
                    "FREQ_OUT_OF_BAND: clamped {} from {f:.1} to {clamped:.1} Hz",
                    command.pump_id
                ));
                started.push((command.pump_id.clone(), clamped));
            } else {
                started.push((command.pump_id.clone(), f));
            }
        }

        // 2. Min-one-pump.
        if started.is_empty() {
            if let Some(best) = self.model.best_efficiency_pump(FREQ_MIN_HZ, state.l1_m) {
                conflicts.push("min_one_pump_forced".to_string());
                started.push((best, FREQ_MIN_HZ));
            }
        }

        // 3. F2 cap: walk the least-efficient running pump down in 0.5 Hz
        //    steps, then stop it, until under the cap. Pumps inside their
        //    minimum runtime are slowed but never stopped here.
        self.enforce_flow_cap(&mut started, state.l1_m, tracker, &mut conflicts);

        // 4. Minimum runtime: a pump started less than 2 h ago may not be
        //    stopped by this decision. Restore its previous frequency,
        //    clipped into the band.
        for pump_id in tracker.running_pumps() {
            let commanded = started.iter().any(|(id, _)| *id == pump_id);
            if !commanded && tracker.is_stop_locked(&pump_id, MIN_RUNTIME_SECONDS) {
                let prev_freq = prev_commands
                    .iter()
                    .find(|c| c.pump_id == pump_id && c.start)
                    .map(|c| c.frequency_hz.clamp(FREQ_MIN_HZ, FREQ_MAX_HZ))
                    .unwrap_or(FREQ_MIN_HZ);
                conflicts.push(format!(
                    "MIN_RUNTIME: kept {pump_id} running at {prev_freq:.1} Hz"
                ));
                started.push((pump_id, prev_freq));
            }
        }
        // A restored pump can push the total back over the cap; the walk
        // converges because committed decisions respect the cap, so locked
        // pumps alone always fit at minimum frequency.
        self.enforce_flow_cap(&mut started, state.l1_m, tracker, &mut conflicts);

        // 5. Sufficient-flow guard: if the next-tick level projection
        //    crosses the guard line and Safety has not already dictated the
        //    set, add the next-best pump at full speed until the projection
        //    holds or the station is maxed out.
        if !safety_vetoed {
            loop {
                let flow = self.total_flow(&started, state.l1_m);
                let projected =
                    project_next_level(state.l1_m, forecast_next_f1_m3_per_15min, flow);
                if projected <= L1_GUARD_M || started.len() >= self.model.pump_ids().len() {
                    break;
                }
                // The flow cap still binds: only add a pump that fits
                // under it.
                let Some(next_best) = self
                    .model
                    .rank_by_efficiency(FREQ_MAX_HZ, state.l1_m)
                    .into_iter()
                    .find(|(id, perf)| {
                        !started.iter().any(|(s, _)| s == id)
                            && flow + perf.flow_m3h <= F2_MAX_M3H
                    })
                    .map(|(id, _)| id)
                else {
                    break;
                };
                conflicts.push(format!(
                    "INSUFFICIENT_FLOW: added {next_best} at {FREQ_MAX_HZ:.1} Hz"
                ));
                started.push((next_best, FREQ_MAX_HZ));
            }
        }

        // Recompute performance for the final set.
        (self.model.commands_for(state.l1_m, &started), conflicts)
    }

    /// The F2-cap reduction walk (rewrite 3).
    fn enforce_flow_cap(
        &self,
        started: &mut Vec<(String, f64)>,
        l1_m: f64,
        tracker: &RuntimeTracker,
        conflicts: &mut Vec<String>,
    ) {
        let mut capped = false;
        loop {
            let flow: f64 = self.total_flow(started, l1_m);
            if flow <= F2_MAX_M3H {
                break;
            }
            capped = true;
            let Some(target_idx) = self.least_efficient(started, l1_m, tracker) else {
                break;
            };
            let (id, freq) = started[target_idx].clone();
            if freq > FREQ_MIN_HZ + 1e-9 {
                started[target_idx].1 = (freq - F2_REDUCTION_STEP_HZ).max(FREQ_MIN_HZ);
                conflicts.push(format!(
                    "F2_EXCEEDED: reduced {id} to {:.1} Hz",
                    started[target_idx].1
                ));
            } else {
                started.remove(target_idx);
                conflicts.push(format!("F2_EXCEEDED: stopped {id}"));
            }
        }
        if capped {
            debug!(flow = self.total_flow(started, l1_m), "Flow cap rewrite applied");
        }
    }

    fn total_flow(&self, started: &[(String, f64)], l1_m: f64) -> f64 {
        started
            .iter()
            .filter_map(|(id, freq)| {
                self.model
                    .performance(id, *freq, l1_m)
                    .ok()
                    .map(|p| p.flow_m3h)
            })
            .sum()
    }

    /// Index of the least-efficient started pump that may still be slowed
    /// or stopped. Runtime-locked pumps already at minimum frequency are
    /// exempt — rule 4 would only force them back on.
    fn least_efficient(
        &self,
        started: &[(String, f64)],
        l1_m: f64,
        tracker: &RuntimeTracker,
    ) -> Option<usize> {
        started
            .iter()
            .enumerate()
            .filter(|(_, (id, freq))| {
                *freq > FREQ_MIN_HZ + 1e-9 || !tracker.is_stop_locked(id, MIN_RUNTIME_SECONDS)
            })
            .min_by(|a, b| {
                let eff = |pair: &(String, f64)| {
                    self.model
                        .performance(&pair.0, pair.1, l1_m)
                        .map(|p| p.efficiency)
                        .unwrap_or(0.0)
                };
                eff(a.1)
                    .partial_cmp(&eff(b.1))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.1 .0.cmp(&b.1 .0))
            })
            .map(|(i, _)| i)
    }
}

// ============================================================================
// Tests
// ============================================================================
