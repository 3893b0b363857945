//! Static hydraulic and operational constraints for the lift station.
//!
//! Everything in this module is process-wide and immutable. The specialist
//! agents, the coordinator, the validator and the metrics stage all check
//! against the same constants and helper functions; the validator is the only
//! stage allowed to rewrite commands to satisfy them.

use crate::types::{ConstraintViolation, PumpCommand, RuntimeTracker, SystemState, ViolationType};
use chrono::{DateTime, Utc};

// ============================================================================
// Level Bounds (m above tunnel invert)
// ============================================================================

/// Physical floor of the level gauge.
pub const L1_MIN_M: f64 = 0.0;

/// Alarm level; the safety specialist goes CRITICAL at or above this.
pub const L1_ALARM_M: f64 = 7.2;

/// Tunnel crown; overflow to the emergency outfall above this.
pub const L1_MAX_M: f64 = 8.0;

/// Level that counts as "emptied" for the daily-emptying rule.
pub const L1_EMPTY_TARGET_M: f64 = 0.5;

/// Level the validator's sufficient-flow guard keeps the next-tick
/// projection under.
pub const L1_GUARD_M: f64 = 7.0;

// ============================================================================
// Flow and Frequency
// ============================================================================

/// Hard cap on total station outflow (m³/h), set by the pressure main.
pub const F2_MAX_M3H: f64 = 16_000.0;

/// Lowest committed drive frequency (Hz). The drives ramp through lower
/// frequencies during start transitions only; a committed command never
/// carries one.
pub const FREQ_MIN_HZ: f64 = 47.8;

/// Drive ceiling (Hz).
pub const FREQ_MAX_HZ: f64 = 50.0;

// ============================================================================
// Operational Rules
// ============================================================================

/// A pump started this tick must stay running for at least 2 h of wall clock.
pub const MIN_RUNTIME_SECONDS: u64 = 7_200;

/// Inflow below this counts as dry weather (m³ per 15 min).
pub const DRY_WEATHER_INFLOW_M3_PER_15MIN: f64 = 1_000.0;

/// Rolling window for the dry-weather emptying rule (seconds).
pub const EMPTYING_WINDOW_SECONDS: i64 = 86_400;

/// Free-surface area of the tunnel (m² ≈ m³ per m of level). Used for
/// level projections from volume balance.
pub const TUNNEL_AREA_M2: f64 = 3_000.0;

/// Fixed WWTP intake elevation (m); static head is `L2 - L1`.
pub const L2_INTAKE_M: f64 = 30.0;

// ============================================================================
// Rule Checks
// ============================================================================

/// Check the observed state against the level bounds.
pub fn check_state(state: &SystemState) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();
    if !(L1_MIN_M..=L1_MAX_M).contains(&state.l1_m) {
        violations.push(ConstraintViolation::described(
            ViolationType::L1OutOfRange,
            state.l1_m,
            "0.0-8.0 m",
        ));
    }
    violations
}

/// Check a command set against the frequency band, flow cap, min-one-pump
/// rule and the minimum-runtime locks in `tracker`.
pub fn check_commands(
    commands: &[PumpCommand],
    tracker: &RuntimeTracker,
) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();

    for command in commands {
        let freq_consistent = command.start == (command.frequency_hz > 0.0);
        let freq_in_band = !command.start
            || (FREQ_MIN_HZ..=FREQ_MAX_HZ).contains(&command.frequency_hz);
        if !freq_consistent || !freq_in_band || command.frequency_hz.is_nan() {
            violations.push(ConstraintViolation::described(
                ViolationType::FreqOutOfBand,
                command.frequency_hz,
                "47.8-50.0 Hz",
            ));
        }
        if !command.start && tracker.is_stop_locked(&command.pump_id, MIN_RUNTIME_SECONDS) {
            violations.push(ConstraintViolation::numeric(
                ViolationType::MinRuntime,
                tracker.runtime(&command.pump_id).cumulative_runtime_seconds as f64,
                MIN_RUNTIME_SECONDS as f64,
            ));
        }
    }

    let total_flow = crate::types::total_flow_m3h(commands);
    if total_flow > F2_MAX_M3H {
        violations.push(ConstraintViolation::numeric(
            ViolationType::F2Exceeded,
            total_flow,
            F2_MAX_M3H,
        ));
    }

    if !commands.iter().any(|c| c.start) {
        violations.push(ConstraintViolation::numeric(
            ViolationType::NoPumpRunning,
            0.0,
            1.0,
        ));
    }

    violations
}

/// Whether the dry-weather emptying rule is overdue at `now`.
///
/// The window is rolling 24 h from the last observed `L1 < 0.5 m` instant.
/// A station that has never emptied since process start is treated as not
/// overdue — the tracker has no baseline to measure against.
pub fn emptying_overdue(tracker: &RuntimeTracker, now: DateTime<Utc>) -> bool {
    tracker
        .seconds_since_last_empty(now)
        .is_some_and(|secs| secs > EMPTYING_WINDOW_SECONDS)
}

/// Project the next-tick level from a volume balance (m).
///
/// `inflow_m3_per_15min` in, `outflow_m3h` out over one 15-minute tick,
/// spread over the tunnel free-surface area.
pub fn project_next_level(l1_m: f64, inflow_m3_per_15min: f64, outflow_m3h: f64) -> f64 {
    let delta_v = inflow_m3_per_15min - outflow_m3h * 0.25;
    (l1_m + delta_v / TUNNEL_AREA_M2).max(L1_MIN_M)
}
