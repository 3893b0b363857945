//! Constraint Compliance Specialist - rule sweep and corrective veto

use async_trait::async_trait;
use serde_json::json;

use super::{select_pumps_for_flow, AgentContext, Specialist};
use crate::constraints::{
    emptying_overdue, F2_MAX_M3H, FREQ_MIN_HZ, L1_MAX_M, L1_MIN_M, MIN_RUNTIME_SECONDS,
};
use crate::llm::SPECIALIST_SYSTEM_PROMPT;
use crate::types::{Priority, Recommendation};

/// Extra outflow over inflow for an emptying push (m³/h).
const EMPTYING_MARGIN_M3H: f64 = 3_000.0;

/// Sweeps every operational rule against the current state and the
/// hypothetical proposal implied by current conditions. Any rule that is
/// violated, or about to be, produces a CRITICAL veto with a concrete
/// corrective command set.
pub struct ComplianceAgent;

#[async_trait]
impl Specialist for ComplianceAgent {
    fn name(&self) -> &'static str {
        "constraint_compliance"
    }

    async fn assess(&self, ctx: &AgentContext) -> Recommendation {
        let mut issues: Vec<String> = Vec::new();

        // Level gauge out of the physical band is a sensor or overflow event
        // either way.
        if !(L1_MIN_M..=L1_MAX_M).contains(&ctx.state.l1_m) {
            issues.push(format!(
                "tunnel level {:.2} m outside [{L1_MIN_M}, {L1_MAX_M}] m",
                ctx.state.l1_m
            ));
        }

        // Station outflow reading over the pressure-main cap.
        if ctx.state.f2_m3h > F2_MAX_M3H {
            issues.push(format!(
                "station outflow reading {:.0} m³/h exceeds the {F2_MAX_M3H:.0} m³/h cap",
                ctx.state.f2_m3h
            ));
        }

        // The proposal implied by current conditions, from the shared
        // heuristic — sibling outputs are not visible inside a tick.
        let required = ctx.required_flow_m3h();
        let (proposal, _) =
            select_pumps_for_flow(&ctx.pump_model, ctx.state.l1_m, FREQ_MIN_HZ, required);

        // Pumps inside their 2 h minimum runtime that the proposal would stop.
        let locked: Vec<String> = ctx
            .tracker
            .running_pumps()
            .into_iter()
            .filter(|id| {
                ctx.tracker.is_stop_locked(id, MIN_RUNTIME_SECONDS) && !proposal.contains(id)
            })
            .collect();
        if !locked.is_empty() {
            issues.push(format!(
                "proposal would stop {} inside the 2 h minimum runtime",
                locked.join(", ")
            ));
        }

        // Dry-weather emptying: one instant below 0.5 m per rolling 24 h.
        let emptying_due =
            ctx.state.is_dry_weather() && emptying_overdue(&ctx.tracker, ctx.state.timestamp);
        if emptying_due {
            issues.push(
                "dry-weather emptying overdue: no L1 < 0.5 m instant in the last 24 h".to_string(),
            );
        }

        if issues.is_empty() {
            let template = format!(
                "All operational rules clear: level {:.2} m, outflow {:.0} m³/h, {} pump(s) \
                 running, emptying within its 24 h window.",
                ctx.state.l1_m,
                ctx.state.f2_m3h,
                ctx.tracker.running_pumps().len()
            );
            let reasoning = match ctx.llm.narrative(SPECIALIST_SYSTEM_PROMPT, &template).await {
                Some(text) => text,
                None => template,
            };
            return Recommendation {
                agent_name: self.name().to_string(),
                priority: Priority::Low,
                confidence: 0.9,
                recommendation_type: "all_clear".to_string(),
                reasoning,
                data: json!({ "issues": [], "commands": [] }),
                can_veto: false,
            };
        }

        // Corrective set: the proposal, plus locked pumps kept running, at a
        // frequency sized to the strictest triggered rule.
        let needed = if emptying_due {
            (ctx.state.inflow_m3h() + EMPTYING_MARGIN_M3H).min(F2_MAX_M3H)
        } else {
            required.min(F2_MAX_M3H)
        };
        let frequency = if emptying_due { 50.0 } else { FREQ_MIN_HZ };
        let (mut pumps, _) =
            select_pumps_for_flow(&ctx.pump_model, ctx.state.l1_m, frequency, needed);
        for id in &locked {
            if !pumps.contains(id) {
                pumps.push(id.clone());
            }
        }
        let commands: Vec<serde_json::Value> = pumps
            .iter()
            .map(|pump_id| json!({"pump_id": pump_id, "frequency_hz": frequency}))
            .collect();

        let template = format!(
            "Rule violation imminent: {}. Corrective set: {} pump(s) at {frequency:.1} Hz.",
            issues.join("; "),
            commands.len()
        );
        let reasoning = match ctx.llm.narrative(SPECIALIST_SYSTEM_PROMPT, &template).await {
            Some(text) => text,
            None => template,
        };

        Recommendation {
            agent_name: self.name().to_string(),
            priority: Priority::Critical,
            confidence: 0.95,
            recommendation_type: "constraint_violation".to_string(),
            reasoning,
            data: json!({ "issues": issues, "commands": commands }),
            can_veto: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::specialists::test_support;
    use crate::types::PumpCommand;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_clean_state_is_all_clear() {
        let ctx = test_support::context();
        let rec = ComplianceAgent.assess(&ctx).await;
        assert_eq!(rec.priority, Priority::Low);
        assert_eq!(rec.recommendation_type, "all_clear");
        assert!(!rec.can_veto);
    }

    #[tokio::test]
    async fn test_emptying_overdue_vetoes_with_push() {
        let mut ctx = test_support::context();
        ctx.state.f1_m3_per_15min = 600.0; // dry weather
        ctx.tracker.last_empty_below_05m_at =
            Some(ctx.state.timestamp - chrono::Duration::hours(30));
        let rec = ComplianceAgent.assess(&ctx).await;
        assert!(rec.is_forcing_veto());
        let commands = rec.data["commands"].as_array().unwrap();
        assert!(!commands.is_empty());
        assert_eq!(commands[0]["frequency_hz"], 50.0);
    }

    #[tokio::test]
    async fn test_wet_weather_suspends_emptying_rule() {
        let mut ctx = test_support::context();
        ctx.state.f1_m3_per_15min = 2_500.0; // storm inflow
        ctx.forecast = crate::types::ForecastSnapshot::degraded(2_500.0);
        ctx.tracker.last_empty_below_05m_at =
            Some(ctx.state.timestamp - chrono::Duration::hours(30));
        let rec = ComplianceAgent.assess(&ctx).await;
        assert!(!rec.is_forcing_veto());
    }

    #[tokio::test]
    async fn test_runtime_lock_protected() {
        let mut ctx = test_support::context();
        // Start a small pump 15 minutes ago — proposal at low inflow will
        // not include it, which would violate the minimum-runtime rule.
        let mut c = PumpCommand::stopped("P2.3");
        c.start = true;
        c.frequency_hz = 48.0;
        ctx.tracker.commit(
            &[c],
            chrono::Utc.with_ymd_and_hms(2024, 3, 1, 11, 45, 0).unwrap(),
            2.0,
        );
        ctx.state.f1_m3_per_15min = 900.0;
        let rec = ComplianceAgent.assess(&ctx).await;
        assert!(rec.is_forcing_veto());
        let commands = rec.data["commands"].as_array().unwrap();
        assert!(
            commands.iter().any(|c| c["pump_id"] == "P2.3"),
            "locked pump must stay in the corrective set: {commands:?}"
        );
    }
}
