//! Flow Smoothness Specialist - outflow step limiting

use async_trait::async_trait;
use serde_json::json;

use super::{select_pumps_for_flow, AgentContext, Specialist};
use crate::llm::SPECIALIST_SYSTEM_PROMPT;
use crate::types::{Priority, Recommendation};

/// Largest outflow change the WWTP inlet works accept per tick (m³/h).
pub const MAX_STEP_M3H: f64 = 2_000.0;
/// Step above which the recommendation escalates to MEDIUM (m³/h).
const ESCALATION_STEP_M3H: f64 = 4_000.0;

/// Compares the outflow implied by current conditions against the previous
/// tick's committed outflow and, when the jump is too large, emits a staged
/// plan spreading the change over two ticks.
pub struct SmoothnessAgent;

#[async_trait]
impl Specialist for SmoothnessAgent {
    fn name(&self) -> &'static str {
        "flow_smoothness"
    }

    async fn assess(&self, ctx: &AgentContext) -> Recommendation {
        // Derived from the same required-flow figure the efficiency agent
        // targets; agents cannot see each other's output inside a tick.
        let proposed = ctx.required_flow_m3h();
        let previous = ctx.prev_flow_m3h;
        let delta = proposed - previous;

        let staged = if delta.abs() > MAX_STEP_M3H {
            let intermediate = previous + delta / 2.0;
            [intermediate, proposed]
                .iter()
                .enumerate()
                .map(|(tick, &flow)| {
                    let (pumps, achieved) =
                        select_pumps_for_flow(&ctx.pump_model, ctx.state.l1_m, 49.0, flow);
                    json!({
                        "delay_ticks": tick,
                        "pumps": pumps,
                        "flow": achieved,
                    })
                })
                .collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        let priority = if delta.abs() > ESCALATION_STEP_M3H {
            Priority::Medium
        } else {
            Priority::Low
        };

        let template = if staged.is_empty() {
            format!(
                "Outflow step {delta:+.0} m³/h from the previous tick is within the \
                 {MAX_STEP_M3H:.0} m³/h limit."
            )
        } else {
            format!(
                "Outflow step {delta:+.0} m³/h exceeds the {MAX_STEP_M3H:.0} m³/h limit; \
                 staging the change over two ticks via {:.0} m³/h.",
                previous + delta / 2.0
            )
        };
        let reasoning = match ctx.llm.narrative(SPECIALIST_SYSTEM_PROMPT, &template).await {
            Some(text) => text,
            None => template,
        };

        Recommendation {
            agent_name: self.name().to_string(),
            priority,
            confidence: 0.8,
            recommendation_type: "flow_smoothing".to_string(),
            reasoning,
            data: json!({
                "flow_variability": delta.abs(),
                "proposed_flow_m3h": proposed,
                "previous_flow_m3h": previous,
                "max_step_m3h": MAX_STEP_M3H,
                "staged": staged,
            }),
            can_veto: false,
        }
    }
}
