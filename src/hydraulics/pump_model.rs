//! Pump performance model: affinity laws against measured efficiency curves.
//!
//! Maps `(pump_id, frequency, tunnel level)` to `(flow, power, efficiency)`.
//! Flow scales with speed, power comes from the hydraulic relation
//! `P = ρ·g·Q·H / η` with η read off the per-pump curve; the cubic affinity
//! estimate is kept as a cross-check. Pure and read-only after construction.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use super::curves::{station_curves, station_pumps, EfficiencyCurve};
use crate::constraints::{FREQ_MAX_HZ, FREQ_MIN_HZ, L1_MAX_M, L1_MIN_M, L2_INTAKE_M};
use crate::types::PumpSpec;

/// Density of wastewater (kg/m³). Treated as clean-water density; grit
/// loading is below the model's error bar.
const RHO_KG_M3: f64 = 1_000.0;
/// Standard gravity (m/s²)
const G_M_S2: f64 = 9.81;

/// Fixed efficiency for pumps whose curve data is unavailable.
const FALLBACK_EFFICIENCY: f64 = 0.80;

/// Relative disagreement between hydraulic and affinity power that gets
/// logged for diagnostics.
const POWER_CROSSCHECK_TOLERANCE: f64 = 0.25;

// ============================================================================
// Errors and Output
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PumpModelError {
    #[error("unknown pump id: {0}")]
    UnknownPump(String),
    #[error("frequency {frequency_hz} Hz outside 0 or [47.8, 50.0]")]
    FrequencyOutOfBand { frequency_hz: String },
}

impl PumpModelError {
    fn frequency(f: f64) -> Self {
        PumpModelError::FrequencyOutOfBand {
            frequency_hz: format!("{f:.2}"),
        }
    }
}

/// Operating point of one pump at one commanded frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpPerformance {
    pub flow_m3h: f64,
    pub power_kw: f64,
    /// 0..1
    pub efficiency: f64,
    /// The requested level was outside `[0, 8]` m and the boundary value
    /// was used instead. Read by forecaster/agent diagnostics.
    pub clamped: bool,
    /// Efficiency came from the affinity-only fallback, not curve data.
    pub approximate: bool,
}

impl PumpPerformance {
    const STOPPED: Self = Self {
        flow_m3h: 0.0,
        power_kw: 0.0,
        efficiency: 0.0,
        clamped: false,
        approximate: false,
    };
}

// ============================================================================
// Pump Model
// ============================================================================

/// Read-only pump performance model for the whole station.
#[derive(Debug)]
pub struct PumpModel {
    specs: HashMap<String, PumpSpec>,
    curves: HashMap<String, EfficiencyCurve>,
    /// Canonical id order for deterministic iteration
    order: Vec<String>,
}

impl PumpModel {
    /// Model over the commissioned station pumps and their acceptance-test
    /// curves.
    pub fn new() -> Self {
        Self::with_data(station_pumps(), station_curves())
    }

    /// Model over explicit data. Pumps without a curve entry use the
    /// affinity-only fallback.
    pub fn with_data(specs: Vec<PumpSpec>, curves: HashMap<String, EfficiencyCurve>) -> Self {
        let order: Vec<String> = specs.iter().map(|p| p.pump_id.clone()).collect();
        let specs = specs.into_iter().map(|p| (p.pump_id.clone(), p)).collect();
        Self {
            specs,
            curves,
            order,
        }
    }

    /// Pump ids in canonical order.
    pub fn pump_ids(&self) -> &[String] {
        &self.order
    }

    pub fn spec(&self, pump_id: &str) -> Option<&PumpSpec> {
        self.specs.get(pump_id)
    }

    pub fn specs(&self) -> Vec<PumpSpec> {
        self.order
            .iter()
            .filter_map(|id| self.specs.get(id).cloned())
            .collect()
    }

    /// Operating point for one pump at a commanded frequency and tunnel level.
    ///
    /// Frequency must be 0 (stopped) or inside the drive band; the level is
    /// clamped to the model's validity box `[0, 8]` m with the `clamped`
    /// flag set rather than extrapolating.
    pub fn performance(
        &self,
        pump_id: &str,
        frequency_hz: f64,
        l1_m: f64,
    ) -> Result<PumpPerformance, PumpModelError> {
        let spec = self
            .specs
            .get(pump_id)
            .ok_or_else(|| PumpModelError::UnknownPump(pump_id.to_string()))?;

        if frequency_hz == 0.0 {
            return Ok(PumpPerformance::STOPPED);
        }
        if frequency_hz.is_nan()
            || frequency_hz < FREQ_MIN_HZ - 1e-9
            || frequency_hz > FREQ_MAX_HZ + 1e-9
        {
            return Err(PumpModelError::frequency(frequency_hz));
        }
        let frequency_hz = frequency_hz.clamp(FREQ_MIN_HZ, FREQ_MAX_HZ);

        let clamped = !(L1_MIN_M..=L1_MAX_M).contains(&l1_m);
        let l1 = l1_m.clamp(L1_MIN_M, L1_MAX_M);

        let speed = frequency_hz / FREQ_MAX_HZ;
        let flow_m3h = spec.rated_flow_m3h * speed;
        let head_m = L2_INTAKE_M - l1;
        let affinity_power_kw = spec.rated_power_kw * speed.powi(3);

        let (power_kw, efficiency, approximate) = match self.curves.get(pump_id) {
            Some(curve) => {
                let eta = curve.efficiency(flow_m3h, head_m, spec.rated_head_m);
                let hydraulic_kw = RHO_KG_M3 * G_M_S2 * (flow_m3h / 3_600.0) * head_m / 1_000.0;
                let shaft_kw = hydraulic_kw / eta;
                let deviation = (shaft_kw - affinity_power_kw).abs() / affinity_power_kw.max(1e-9);
                if deviation > POWER_CROSSCHECK_TOLERANCE {
                    debug!(
                        pump = pump_id,
                        shaft_kw,
                        affinity_kw = affinity_power_kw,
                        "Curve power disagrees with affinity estimate"
                    );
                }
                (shaft_kw, eta, false)
            }
            None => (affinity_power_kw, FALLBACK_EFFICIENCY, true),
        };

        Ok(PumpPerformance {
            flow_m3h,
            power_kw,
            efficiency,
            clamped,
            approximate,
        })
    }

    /// Pumps ranked by efficiency at `(l1_m, frequency_hz)`, best first.
    /// Ties break on id for determinism.
    pub fn rank_by_efficiency(
        &self,
        frequency_hz: f64,
        l1_m: f64,
    ) -> Vec<(String, PumpPerformance)> {
        let mut ranked: Vec<(String, PumpPerformance)> = self
            .order
            .iter()
            .filter_map(|id| {
                self.performance(id, frequency_hz, l1_m)
                    .ok()
                    .map(|perf| (id.clone(), perf))
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.efficiency
                .partial_cmp(&a.1.efficiency)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }

    /// The single pump with the best efficiency at `(l1_m, frequency_hz)`.
    pub fn best_efficiency_pump(&self, frequency_hz: f64, l1_m: f64) -> Option<String> {
        self.rank_by_efficiency(frequency_hz, l1_m)
            .into_iter()
            .next()
            .map(|(id, _)| id)
    }

    /// Materialize a full command set — one entry per commissioned pump in
    /// canonical order — from the started subset, with derived fields
    /// computed at `l1_m`. Unknown ids and rejected frequencies degrade to a
    /// stopped entry rather than dropping the pump from the set.
    pub fn commands_for(
        &self,
        l1_m: f64,
        started: &[(String, f64)],
    ) -> Vec<crate::types::PumpCommand> {
        self.order
            .iter()
            .map(|pump_id| {
                let requested = started
                    .iter()
                    .find(|(id, _)| id == pump_id)
                    .map(|(_, freq)| *freq);
                match requested {
                    Some(freq) if freq > 0.0 => match self.performance(pump_id, freq, l1_m) {
                        Ok(perf) => crate::types::PumpCommand {
                            pump_id: pump_id.clone(),
                            start: true,
                            frequency_hz: freq,
                            flow_m3h: perf.flow_m3h,
                            power_kw: perf.power_kw,
                            efficiency: perf.efficiency,
                            approximate: perf.approximate,
                        },
                        Err(_) => crate::types::PumpCommand::stopped(pump_id.clone()),
                    },
                    _ => crate::types::PumpCommand::stopped(pump_id.clone()),
                }
            })
            .collect()
    }
}

impl Default for PumpModel {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rated_point_within_two_percent() {
        let model = PumpModel::new();
        for pump in model.specs() {
            let perf = model
                .performance(&pump.pump_id, 50.0, 0.0)
                .expect("rated point must be valid");
            let flow_err = (perf.flow_m3h - pump.rated_flow_m3h).abs() / pump.rated_flow_m3h;
            let power_err = (perf.power_kw - pump.rated_power_kw).abs() / pump.rated_power_kw;
            assert!(flow_err < 0.02, "{} flow off by {flow_err:.3}", pump.pump_id);
            assert!(power_err < 0.02, "{} power off by {power_err:.3}", pump.pump_id);
        }
    }

    #[test]
    fn test_zero_frequency_is_stopped() {
        let model = PumpModel::new();
        let perf = model.performance("P1.1", 0.0, 3.0).unwrap();
        assert_eq!(perf.flow_m3h, 0.0);
        assert_eq!(perf.power_kw, 0.0);
        assert_eq!(perf.efficiency, 0.0);
    }

    #[test]
    fn test_unknown_pump_rejected() {
        let model = PumpModel::new();
        let err = model.performance("P9.9", 48.0, 3.0).unwrap_err();
        assert_eq!(err, PumpModelError::UnknownPump("P9.9".to_string()));
    }

    #[test]
    fn test_out_of_band_frequency_rejected() {
        let model = PumpModel::new();
        assert!(model.performance("P1.1", 30.0, 3.0).is_err());
        assert!(model.performance("P1.1", 51.0, 3.0).is_err());
        assert!(model.performance("P1.1", f64::NAN, 3.0).is_err());
        assert!(model.performance("P1.1", 47.8, 3.0).is_ok());
        assert!(model.performance("P1.1", 50.0, 3.0).is_ok());
    }

    #[test]
    fn test_level_outside_box_clamps() {
        let model = PumpModel::new();
        let perf = model.performance("P1.1", 48.0, 9.5).unwrap();
        assert!(perf.clamped);
        let at_boundary = model.performance("P1.1", 48.0, 8.0).unwrap();
        assert!((perf.power_kw - at_boundary.power_kw).abs() < 1e-9);
    }

    #[test]
    fn test_power_scales_down_with_frequency() {
        let model = PumpModel::new();
        let hi = model.performance("P1.1", 50.0, 3.0).unwrap();
        let lo = model.performance("P1.1", 47.8, 3.0).unwrap();
        assert!(lo.flow_m3h < hi.flow_m3h);
        assert!(lo.power_kw < hi.power_kw);
        // Flow scales linearly with speed
        assert!((lo.flow_m3h / hi.flow_m3h - 47.8 / 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_curve_falls_back_to_affinity() {
        let specs = station_pumps();
        let model = PumpModel::with_data(specs.clone(), HashMap::new());
        let perf = model.performance("P1.1", 50.0, 0.0).unwrap();
        assert!(perf.approximate);
        assert_eq!(perf.efficiency, FALLBACK_EFFICIENCY);
        assert!((perf.power_kw - specs[0].rated_power_kw).abs() < 1e-9);
    }

    #[test]
    fn test_large_pumps_rank_first_at_station_head() {
        let model = PumpModel::new();
        let ranked = model.rank_by_efficiency(47.8, 1.82);
        assert_eq!(ranked[0].0, "P1.1");
        assert!(ranked[0].1.efficiency > ranked[7].1.efficiency);
    }
}
