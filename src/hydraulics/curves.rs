//! Commissioning data: pump specifications and efficiency curves.
//!
//! The station runs eight dry-pit centrifugal pumps against a 30 m static
//! lift: four large line pumps and four small trim pumps. Curve coefficients
//! come from the manufacturer acceptance tests, refit to the quadratic
//! falloff form used by `pump_model`.

use crate::types::{PumpClass, PumpSpec};
use std::collections::HashMap;

use crate::constraints::L2_INTAKE_M;

/// Quadratic efficiency falloff around the best-efficiency point.
///
/// `η(q, h) = η_peak − q_falloff·(q/q_bep − 1)² − h_falloff·(h/h_rated − 1)²`,
/// clamped to `[0.40, η_peak]`.
#[derive(Debug, Clone)]
pub struct EfficiencyCurve {
    pub eta_peak: f64,
    /// Best-efficiency flow at 50 Hz, rated head (m³/h)
    pub bep_flow_m3h: f64,
    pub q_falloff: f64,
    pub h_falloff: f64,
}

impl EfficiencyCurve {
    /// Efficiency at an operating point, clamped to the curve's valid range.
    pub fn efficiency(&self, flow_m3h: f64, head_m: f64, rated_head_m: f64) -> f64 {
        let q_ratio = flow_m3h / self.bep_flow_m3h;
        let h_ratio = head_m / rated_head_m;
        let eta = self.eta_peak
            - self.q_falloff * (q_ratio - 1.0).powi(2)
            - self.h_falloff * (h_ratio - 1.0).powi(2);
        eta.clamp(0.40, self.eta_peak)
    }
}

/// Rated values for the large line pumps (per unit, 50 Hz, 30 m head).
const LARGE_RATED_FLOW_M3H: f64 = 4_000.0;
const LARGE_RATED_POWER_KW: f64 = 390.0;
const LARGE_ETA_PEAK: f64 = 0.84;

/// Rated values for the small trim pumps (per unit, 50 Hz, 30 m head).
const SMALL_RATED_FLOW_M3H: f64 = 1_500.0;
const SMALL_RATED_POWER_KW: f64 = 151.0;
const SMALL_ETA_PEAK: f64 = 0.81;

/// The eight commissioned pumps, canonical id order.
pub fn station_pumps() -> Vec<PumpSpec> {
    let mut pumps = Vec::with_capacity(8);
    for unit in 1..=4 {
        pumps.push(PumpSpec {
            pump_id: format!("P1.{unit}"),
            class: PumpClass::Large,
            rated_power_kw: LARGE_RATED_POWER_KW,
            rated_flow_m3h: LARGE_RATED_FLOW_M3H,
            optimal_frequency_hz: 48.0,
            rated_head_m: L2_INTAKE_M,
        });
    }
    for unit in 1..=4 {
        pumps.push(PumpSpec {
            pump_id: format!("P2.{unit}"),
            class: PumpClass::Small,
            rated_power_kw: SMALL_RATED_POWER_KW,
            rated_flow_m3h: SMALL_RATED_FLOW_M3H,
            optimal_frequency_hz: 48.5,
            rated_head_m: L2_INTAKE_M,
        });
    }
    pumps
}

/// Acceptance-test curves keyed by canonical pump id.
pub fn station_curves() -> HashMap<String, EfficiencyCurve> {
    let mut curves = HashMap::with_capacity(8);
    for unit in 1..=4 {
        curves.insert(
            format!("P1.{unit}"),
            EfficiencyCurve {
                eta_peak: LARGE_ETA_PEAK,
                bep_flow_m3h: LARGE_RATED_FLOW_M3H,
                q_falloff: 3.0,
                h_falloff: 0.45,
            },
        );
    }
    for unit in 1..=4 {
        curves.insert(
            format!("P2.{unit}"),
            EfficiencyCurve {
                eta_peak: SMALL_ETA_PEAK,
                bep_flow_m3h: SMALL_RATED_FLOW_M3H,
                q_falloff: 2.5,
                h_falloff: 0.40,
            },
        );
    }
    curves
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eight_pumps_commissioned() {
        let pumps = station_pumps();
        assert_eq!(pumps.len(), 8);
        assert_eq!(pumps.iter().filter(|p| p.class == PumpClass::Large).count(), 4);
        assert_eq!(pumps.iter().filter(|p| p.class == PumpClass::Small).count(), 4);
    }

    #[test]
    fn test_every_pump_has_a_curve() {
        let curves = station_curves();
        for pump in station_pumps() {
            assert!(curves.contains_key(&pump.pump_id), "missing curve for {}", pump.pump_id);
        }
    }

    #[test]
    fn test_efficiency_peaks_at_bep() {
        let curves = station_curves();
        let curve = &curves["P1.1"];
        let at_bep = curve.efficiency(4_000.0, 30.0, 30.0);
        assert!((at_bep - curve.eta_peak).abs() < 1e-12);
        assert!(curve.efficiency(3_000.0, 30.0, 30.0) < at_bep);
        assert!(curve.efficiency(4_000.0, 24.0, 30.0) < at_bep);
    }
}
