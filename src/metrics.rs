//! Decision-level metrics: cost, energy, flow, and the final rule re-check.
//!
//! Pure calculators over the validated command set. The violation re-check
//! is the testable guarantee that the validator did its job — it must come
//! back empty on every tick the validator touched.

use crate::types::{
    total_flow_m3h, total_power_kw, ConstraintViolation, CostCalculation, PumpCommand,
    RuntimeTracker, SystemState,
};

/// Tick length as a fraction of an hour.
const TICK_HOURS: f64 = 0.25;

/// Cost/energy metrics for one command set at one spot price.
///
/// The sign of `cost_eur` follows the price: negative prices make pumping
/// income and are not clamped.
pub fn calculate(commands: &[PumpCommand], price_eur_kwh: f64) -> CostCalculation {
    let total_power_kw = total_power_kw(commands);
    let energy_consumed_kwh = total_power_kw * TICK_HOURS;
    let flow_pumped_m3 = total_flow_m3h(commands) * TICK_HOURS;
    let specific_energy_kwh_per_m3 = if flow_pumped_m3 > 0.0 {
        energy_consumed_kwh / flow_pumped_m3
    } else {
        0.0
    };
    CostCalculation {
        total_power_kw,
        energy_consumed_kwh,
        cost_eur: energy_consumed_kwh * price_eur_kwh,
        flow_pumped_m3,
        specific_energy_kwh_per_m3,
    }
}

/// Final re-check of the operational rules against the validated commands.
///
/// Covers the level bounds, frequency band, flow cap, min-one-pump and
/// minimum-runtime rules. The dry-weather emptying rule is a scheduling
/// obligation over hours, not a property of one command set — the
/// compliance specialist owns it.
pub fn check_final(
    commands: &[PumpCommand],
    state: &SystemState,
    tracker: &RuntimeTracker,
) -> Vec<ConstraintViolation> {
    let mut violations = crate::constraints::check_state(state);
    violations.extend(crate::constraints::check_commands(commands, tracker));
    violations
}
