//! Specialist trait and the six per-tick assessment agents.
//!
//! Each specialist reads the same frozen `AgentContext` and emits exactly one
//! `Recommendation`. The six are independent — the driver runs them
//! concurrently and none may observe another's output.
//!
//! ## Specialists
//!
//! 1. **Inflow** — forecast interpretation, storm escalation
//! 2. **Cost** — price-window arbitrage (PUMP_NOW / DEFER / PUMP_NORMALLY)
//! 3. **Efficiency** — candidate pump-set enumeration and scoring
//! 4. **Safety** — level trajectory projection, vetoing at RISK and above
//! 5. **Smoothness** — outflow step limiting with staged plans
//! 6. **Compliance** — full rule sweep against the hypothetical proposal,
//!    vetoing on imminent violations

pub mod inflow;
pub mod cost;
pub mod efficiency;
pub mod safety;
pub mod smoothness;
pub mod compliance;

pub use inflow::InflowAgent;
pub use cost::CostAgent;
pub use efficiency::EfficiencyAgent;
pub use safety::SafetyAgent;
pub use smoothness::SmoothnessAgent;
pub use compliance::ComplianceAgent;

use std::sync::Arc;

use async_trait::async_trait;

use crate::constraints::FREQ_MIN_HZ;
use crate::hydraulics::PumpModel;
use crate::llm::LlmBackend;
use crate::types::{ForecastSnapshot, PumpSpec, Recommendation, RuntimeTracker, SystemState};

/// Frozen per-tick context shared read-only by all six specialists.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub state: SystemState,
    pub forecast: ForecastSnapshot,
    pub specs: Vec<PumpSpec>,
    /// Snapshot taken by the driver before the fan-out
    pub tracker: RuntimeTracker,
    /// Spot prices for the next 24 h at 15-min cadence; index 0 is the
    /// current tick
    pub price_window: Vec<f64>,
    /// Total outflow committed by the previous decision (m³/h); 0 on the
    /// first tick
    pub prev_flow_m3h: f64,
    pub pump_model: Arc<PumpModel>,
    pub llm: LlmBackend,
}

impl AgentContext {
    /// Outflow the station should roughly match this tick (m³/h): projected
    /// inflow for the next 15 minutes, floored at the smallest single-pump
    /// flow so the min-one-pump rule is always coverable.
    ///
    /// Smoothness and Compliance derive the hypothetical proposal from this
    /// same figure instead of reading the efficiency agent's output — the
    /// fan-out forbids cross-agent visibility.
    pub fn required_flow_m3h(&self) -> f64 {
        let projected_inflow_m3h = self
            .forecast
            .next_step()
            .max(self.state.f1_m3_per_15min)
            * 4.0;
        projected_inflow_m3h.max(self.min_single_pump_flow_m3h())
    }

    /// Flow of the smallest pump at minimum frequency (m³/h).
    pub fn min_single_pump_flow_m3h(&self) -> f64 {
        self.specs
            .iter()
            .map(|s| s.rated_flow_m3h * (FREQ_MIN_HZ / 50.0))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Capability every specialist implements.
///
/// `assess` is async because provider-mode narrative generation awaits one
/// LLM call; the deterministic path never suspends.
#[async_trait]
pub trait Specialist: Send + Sync {
    /// Registry name, also used as `Recommendation.agent_name`.
    fn name(&self) -> &'static str;

    /// Evaluate the tick and produce this specialist's recommendation.
    async fn assess(&self, ctx: &AgentContext) -> Recommendation;
}

/// Create the default registry of six specialists, in canonical order.
pub fn default_specialists() -> Vec<Arc<dyn Specialist>> {
    vec![
        Arc::new(InflowAgent),
        Arc::new(CostAgent),
        Arc::new(EfficiencyAgent),
        Arc::new(SafetyAgent),
        Arc::new(SmoothnessAgent),
        Arc::new(ComplianceAgent),
    ]
}

/// Greedily pick pumps (best efficiency first at `frequency_hz`) until their
/// combined flow reaches `needed_m3h` or the station runs out of pumps.
/// Returns `(pump_ids, total_flow)`.
pub fn select_pumps_for_flow(
    model: &PumpModel,
    l1_m: f64,
    frequency_hz: f64,
    needed_m3h: f64,
) -> (Vec<String>, f64) {
    let mut selected = Vec::new();
    let mut flow = 0.0;
    for (pump_id, perf) in model.rank_by_efficiency(frequency_hz, l1_m) {
        if flow >= needed_m3h {
            break;
        }
        flow += perf.flow_m3h;
        selected.push(pump_id);
    }
    (selected, flow)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::types::PriceScenario;
    use chrono::TimeZone;

    /// Context with calm defaults the individual agent tests perturb.
    pub fn context() -> AgentContext {
        let model = Arc::new(PumpModel::new());
        let specs = model.specs();
        AgentContext {
            state: SystemState {
                timestamp: chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
                l1_m: 1.82,
                v_m3: 5_405.0,
                f1_m3_per_15min: 900.0,
                f2_m3h: 3_800.0,
                electricity_price_eur_kwh: 0.14,
                price_scenario: PriceScenario::Normal,
                history_index: 500,
            },
            forecast: ForecastSnapshot::degraded(900.0),
            specs,
            tracker: RuntimeTracker::new(),
            price_window: vec![0.14; 96],
            prev_flow_m3h: 3_824.0,
            pump_model: model,
            llm: LlmBackend::Disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_six_unique_agents() {
        let agents = default_specialists();
        assert_eq!(agents.len(), 6);
        let mut names: Vec<&str> = agents.iter().map(|a| a.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_required_flow_floors_at_min_pump() {
        let mut ctx = test_support::context();
        ctx.state.f1_m3_per_15min = 10.0;
        ctx.forecast = crate::types::ForecastSnapshot::degraded(10.0);
        let min_flow = ctx.min_single_pump_flow_m3h();
        assert!((ctx.required_flow_m3h() - min_flow).abs() < 1e-9);
    }

    #[test]
    fn test_select_pumps_reaches_flow() {
        let model = PumpModel::new();
        let (pumps, flow) = select_pumps_for_flow(&model, 2.0, 50.0, 10_000.0);
        assert!(flow >= 10_000.0);
        assert_eq!(pumps.len(), 3);
    }
}
