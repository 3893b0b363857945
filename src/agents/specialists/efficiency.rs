//! Pump Efficiency Specialist - candidate pump-set enumeration and scoring

use async_trait::async_trait;
use serde_json::json;

use super::{AgentContext, Specialist};
use crate::llm::SPECIALIST_SYSTEM_PROMPT;
use crate::types::{Priority, PumpClass, Recommendation};

/// Frequencies the drives are certified to hold continuously.
pub const CANDIDATE_FREQS: [f64; 6] = [47.8, 48.0, 48.5, 49.0, 49.5, 50.0];

/// Enumerates pump subsets (by class count, pumps within a class being
/// hydraulically interchangeable) at the candidate frequencies and scores
/// each by weighted flow-match and efficiency. Emits the best combination as
/// the coordinator's baseline.
pub struct EfficiencyAgent;

/// One scored candidate combination.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub large_count: usize,
    pub small_count: usize,
    pub frequency_hz: f64,
    pub flow_m3h: f64,
    pub power_kw: f64,
    pub avg_efficiency: f64,
    pub score: f64,
}

/// Score every feasible class-count × frequency combination against a flow
/// target and return the winner. Shared with the coordinator's deterministic
/// fallback.
pub fn best_candidate(ctx: &AgentContext, required_m3h: f64) -> Option<Candidate> {
    let cfg = crate::config::get_or_default();
    let w_flow = cfg.synthesis.flow_match_weight;
    let w_eff = cfg.synthesis.efficiency_weight;
    let l1 = ctx.state.l1_m;

    let mut best: Option<Candidate> = None;
    for &freq in &CANDIDATE_FREQS {
        let Ok(large) = ctx.pump_model.performance("P1.1", freq, l1) else {
            continue;
        };
        let Ok(small) = ctx.pump_model.performance("P2.1", freq, l1) else {
            continue;
        };
        for large_count in 0..=4usize {
            for small_count in 0..=4usize {
                let pumps = large_count + small_count;
                if pumps == 0 {
                    continue;
                }
                let flow =
                    large_count as f64 * large.flow_m3h + small_count as f64 * small.flow_m3h;
                if flow > crate::constraints::F2_MAX_M3H {
                    continue;
                }
                let power =
                    large_count as f64 * large.power_kw + small_count as f64 * small.power_kw;
                let avg_efficiency = (large_count as f64 * large.efficiency
                    + small_count as f64 * small.efficiency)
                    / pumps as f64;
                let flow_match = (1.0 - (flow - required_m3h).abs() / required_m3h).max(0.0);
                let score = w_flow * flow_match + w_eff * avg_efficiency;

                let candidate = Candidate {
                    large_count,
                    small_count,
                    frequency_hz: freq,
                    flow_m3h: flow,
                    power_kw: power,
                    avg_efficiency,
                    score,
                };
                let better = match &best {
                    None => true,
                    Some(current) => {
                        score > current.score + 1e-9
                            || ((score - current.score).abs() <= 1e-9
                                && (avg_efficiency > current.avg_efficiency + 1e-9
                                    || ((avg_efficiency - current.avg_efficiency).abs() <= 1e-9
                                        && pumps < current.large_count + current.small_count)))
                    }
                };
                if better {
                    best = Some(candidate);
                }
            }
        }
    }
    best
}

/// Fill a class-count request with concrete pump ids, preferring pumps that
/// are already running so the minimum-runtime rule stays quiet.
pub fn assign_pump_ids(ctx: &AgentContext, candidate: &Candidate) -> Vec<String> {
    let mut ids = Vec::with_capacity(candidate.large_count + candidate.small_count);
    for (class, count) in [
        (PumpClass::Large, candidate.large_count),
        (PumpClass::Small, candidate.small_count),
    ] {
        let class_ids: Vec<&str> = ctx
            .specs
            .iter()
            .filter(|s| s.class == class)
            .map(|s| s.pump_id.as_str())
            .collect();
        let (running, idle): (Vec<&str>, Vec<&str>) = class_ids
            .into_iter()
            .partition(|id| ctx.tracker.is_running(id));
        ids.extend(
            running
                .into_iter()
                .chain(idle)
                .take(count)
                .map(String::from),
        );
    }
    ids
}

#[async_trait]
impl Specialist for EfficiencyAgent {
    fn name(&self) -> &'static str {
        "pump_efficiency"
    }

    async fn assess(&self, ctx: &AgentContext) -> Recommendation {
        let required = ctx.required_flow_m3h();

        let Some(candidate) = best_candidate(ctx, required) else {
            // Pump model rejected every combination; the validator's
            // min-one-pump pass will still produce a feasible set.
            return Recommendation {
                agent_name: self.name().to_string(),
                priority: Priority::Low,
                confidence: 0.0,
                recommendation_type: "efficiency_optimization".to_string(),
                reasoning: "No feasible pump combination could be scored".to_string(),
                data: json!({}),
                can_veto: false,
            };
        };

        let pumps = assign_pump_ids(ctx, &candidate);
        let frequencies: Vec<f64> = vec![candidate.frequency_hz; pumps.len()];
        let specific_energy = if candidate.flow_m3h > 0.0 {
            candidate.power_kw / candidate.flow_m3h
        } else {
            0.0
        };

        let template = format!(
            "Target outflow {required:.0} m³/h is best met by {} large + {} small pump(s) at \
             {:.1} Hz: {:.0} m³/h at {:.3} kWh/m³, average efficiency {:.0}%.",
            candidate.large_count,
            candidate.small_count,
            candidate.frequency_hz,
            candidate.flow_m3h,
            specific_energy,
            candidate.avg_efficiency * 100.0
        );
        let reasoning = match ctx.llm.narrative(SPECIALIST_SYSTEM_PROMPT, &template).await {
            Some(text) => text,
            None => template,
        };

        Recommendation {
            agent_name: self.name().to_string(),
            priority: Priority::Medium,
            confidence: 0.75,
            recommendation_type: "efficiency_optimization".to_string(),
            reasoning,
            data: json!({
                "recommended_pumps": pumps,
                "frequencies": frequencies,
                "required_flow_m3h": required,
                "expected_flow_m3h": candidate.flow_m3h,
                "specific_energy": specific_energy,
                "efficiency": candidate.avg_efficiency,
            }),
            can_veto: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::specialists::test_support;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_moderate_inflow_prefers_small_set() {
        let mut ctx = test_support::context();
        ctx.state.f1_m3_per_15min = 900.0; // 3600 m³/h
        ctx.forecast = crate::types::ForecastSnapshot::degraded(900.0);
        let rec = EfficiencyAgent.assess(&ctx).await;
        let pumps = rec.data["recommended_pumps"].as_array().unwrap();
        assert!(!pumps.is_empty() && pumps.len() <= 2, "got {pumps:?}");
        assert_eq!(rec.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn test_high_inflow_scales_up() {
        let mut ctx = test_support::context();
        ctx.state.f1_m3_per_15min = 3_000.0; // 12 000 m³/h
        ctx.forecast = crate::types::ForecastSnapshot::degraded(3_000.0);
        let rec = EfficiencyAgent.assess(&ctx).await;
        let expected = rec.data["expected_flow_m3h"].as_f64().unwrap();
        assert!(expected > 9_000.0, "expected flow {expected}");
        assert!(expected <= crate::constraints::F2_MAX_M3H);
    }

    #[test]
    fn test_candidates_never_exceed_flow_cap() {
        let mut ctx = test_support::context();
        ctx.state.f1_m3_per_15min = 10_000.0; // way past the cap
        ctx.forecast = crate::types::ForecastSnapshot::degraded(10_000.0);
        let candidate = best_candidate(&ctx, ctx.required_flow_m3h()).unwrap();
        assert!(candidate.flow_m3h <= crate::constraints::F2_MAX_M3H);
    }

    #[test]
    fn test_assign_prefers_running_pumps() {
        let mut ctx = test_support::context();
        ctx.tracker.commit(
            &[{
                let mut c = crate::types::PumpCommand::stopped("P1.3");
                c.start = true;
                c.frequency_hz = 48.0;
                c
            }],
            chrono::Utc.with_ymd_and_hms(2024, 3, 1, 11, 45, 0).unwrap(),
            2.0,
        );
        let candidate = Candidate {
            large_count: 1,
            small_count: 0,
            frequency_hz: 47.8,
            flow_m3h: 3_824.0,
            power_kw: 350.0,
            avg_efficiency: 0.83,
            score: 1.0,
        };
        let ids = assign_pump_ids(&ctx, &candidate);
        assert_eq!(ids, vec!["P1.3".to_string()]);
    }
}
