//! Inflow Forecasting Specialist - forecast interpretation and storm escalation

use async_trait::async_trait;
use serde_json::json;

use super::{AgentContext, Specialist};
use crate::llm::SPECIALIST_SYSTEM_PROMPT;
use crate::types::{Priority, Recommendation};

/// Interprets the shared `ForecastSnapshot` for the coordinator: expected
/// inflow, trend, and whether a storm peak warrants pre-emptive drawdown.
pub struct InflowAgent;

#[async_trait]
impl Specialist for InflowAgent {
    fn name(&self) -> &'static str {
        "inflow_forecasting"
    }

    async fn assess(&self, ctx: &AgentContext) -> Recommendation {
        let forecast = &ctx.forecast;
        let current = ctx.state.f1_m3_per_15min;
        let peak_ratio = if current > 0.0 {
            forecast.peak_value / current
        } else {
            1.0
        };

        let priority = if forecast.storm_detected || peak_ratio > 2.0 {
            Priority::High
        } else {
            Priority::Medium
        };

        let template = if forecast.storm_detected {
            format!(
                "Storm inflow expected: forecast peaks at {:.0} m³/15min in {} min ({}x current). \
                 Recommend building drawdown headroom ahead of the peak.",
                forecast.peak_value,
                forecast.peak_time_offset * 15,
                peak_ratio.round()
            )
        } else {
            format!(
                "Inflow {} at {:.0} m³/15min; 24 h peak {:.0} m³/15min in {} min. No storm signature.",
                forecast.trend,
                current,
                forecast.peak_value,
                forecast.peak_time_offset * 15
            )
        };
        let reasoning = match ctx.llm.narrative(SPECIALIST_SYSTEM_PROMPT, &template).await {
            Some(text) => text,
            None => template,
        };

        Recommendation {
            agent_name: self.name().to_string(),
            priority,
            confidence: forecast.confidence,
            recommendation_type: "inflow_forecast".to_string(),
            reasoning,
            data: json!({
                "predicted_inflow": forecast.next_step(),
                "forecast_horizon_steps": forecast.next_24h.len(),
                "trend": forecast.trend,
                "storm_detected": forecast.storm_detected,
                "peak_value": forecast.peak_value,
                "peak_time_offset_steps": forecast.peak_time_offset,
                "degraded": forecast.degraded,
            }),
            can_veto: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::specialists::test_support;
    use crate::types::{ForecastSnapshot, Trend};

    #[tokio::test]
    async fn test_calm_forecast_is_medium() {
        let ctx = test_support::context();
        let rec = InflowAgent.assess(&ctx).await;
        assert_eq!(rec.priority, Priority::Medium);
        assert_eq!(rec.recommendation_type, "inflow_forecast");
        assert!(!rec.can_veto);
        assert_eq!(rec.data["forecast_horizon_steps"], 96);
    }

    #[tokio::test]
    async fn test_storm_escalates_to_high() {
        let mut ctx = test_support::context();
        ctx.forecast = ForecastSnapshot {
            next_6h: vec![4_500.0; 24],
            next_24h: vec![4_500.0; 96],
            peak_value: 5_200.0,
            peak_time_offset: 12,
            trend: Trend::Rising,
            storm_detected: true,
            confidence: 0.85,
            degraded: false,
        };
        let rec = InflowAgent.assess(&ctx).await;
        assert_eq!(rec.priority, Priority::High);
        assert_eq!(rec.data["storm_detected"], true);
    }

    #[tokio::test]
    async fn test_large_peak_without_storm_flag_escalates() {
        let mut ctx = test_support::context();
        ctx.state.f1_m3_per_15min = 900.0;
        ctx.forecast.peak_value = 2_500.0; // > 2x current
        let rec = InflowAgent.assess(&ctx).await;
        assert_eq!(rec.priority, Priority::High);
    }
}
