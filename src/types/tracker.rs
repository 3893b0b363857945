//! Runtime tracking: PumpRuntime, RuntimeTracker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::PumpCommand;

/// Tick length in seconds; runtime accrues in whole-tick increments.
pub const TICK_SECONDS: u64 = 900;

// ============================================================================
// Per-Pump Runtime
// ============================================================================

/// Running-state bookkeeping for one pump.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PumpRuntime {
    /// Wall-clock instant the pump last transitioned stopped → running.
    /// `None` while stopped.
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds accrued since `started_at`; reset to 0 on stop.
    pub cumulative_runtime_seconds: u64,
}

impl PumpRuntime {
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }
}

// ============================================================================
// RuntimeTracker
// ============================================================================

/// Process-scoped mutable state for the runtime and emptying rules.
///
/// The driver owns the single live instance. Agents, the coordinator and the
/// validator all receive a frozen clone; `commit` is the one mutation per
/// tick and runs only after the full decision pipeline has succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeTracker {
    pumps: HashMap<String, PumpRuntime>,
    /// Last wall-clock instant the tunnel level was observed below 0.5 m.
    pub last_empty_below_05m_at: Option<DateTime<Utc>>,
}

impl RuntimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime record for a pump; default (stopped, zero runtime) if the
    /// pump has never been commanded.
    pub fn runtime(&self, pump_id: &str) -> PumpRuntime {
        self.pumps.get(pump_id).cloned().unwrap_or_default()
    }

    pub fn is_running(&self, pump_id: &str) -> bool {
        self.pumps.get(pump_id).is_some_and(PumpRuntime::is_running)
    }

    /// A running pump below the minimum-runtime threshold may not be stopped
    /// by the current decision.
    pub fn is_stop_locked(&self, pump_id: &str, min_runtime_seconds: u64) -> bool {
        self.pumps
            .get(pump_id)
            .is_some_and(|r| r.is_running() && r.cumulative_runtime_seconds < min_runtime_seconds)
    }

    /// Pump ids currently running, sorted for deterministic iteration.
    pub fn running_pumps(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .pumps
            .iter()
            .filter(|(_, r)| r.is_running())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Seconds since the tunnel was last drawn below 0.5 m, if ever.
    pub fn seconds_since_last_empty(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_empty_below_05m_at
            .map(|t| (now - t).num_seconds())
    }

    /// Apply one committed decision. Called exactly once per tick by the
    /// driver, strictly after validation and metrics succeed.
    ///
    /// Transitions: stopped → running sets `started_at = now`; running →
    /// running accrues one tick; running → stopped resets.
    pub fn commit(&mut self, commands: &[PumpCommand], now: DateTime<Utc>, l1_m: f64) {
        for command in commands {
            let entry = self.pumps.entry(command.pump_id.clone()).or_default();
            match (entry.is_running(), command.start) {
                (false, true) => {
                    entry.started_at = Some(now);
                    entry.cumulative_runtime_seconds = 0;
                }
                (true, true) => {
                    entry.cumulative_runtime_seconds += TICK_SECONDS;
                }
                (true, false) => {
                    entry.started_at = None;
                    entry.cumulative_runtime_seconds = 0;
                }
                (false, false) => {}
            }
        }
        if l1_m < crate::constraints::L1_EMPTY_TARGET_M {
            self.last_empty_below_05m_at = Some(now);
        }
    }
}
