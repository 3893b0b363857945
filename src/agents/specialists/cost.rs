//! Energy Cost Specialist - price-window arbitrage analysis

use async_trait::async_trait;
use serde_json::json;
use statrs::statistics::{Data, Median};

use super::{AgentContext, Specialist};
use crate::constraints::FREQ_MIN_HZ;
use crate::llm::SPECIALIST_SYSTEM_PROMPT;
use crate::types::{Priority, Recommendation};

/// Pump-now / defer / normal call over the rolling 24 h price window.
///
/// Thresholds are placed a quarter of the way in from the window extremes so
/// the classification keeps working when spot prices go negative.
pub struct CostAgent;

/// A contiguous span of cheap or expensive prices inside the window.
#[derive(Debug, Clone, Copy)]
struct PriceSpan {
    start_offset_steps: usize,
    duration_steps: usize,
    avg_price: f64,
}

impl PriceSpan {
    fn to_json(self) -> serde_json::Value {
        json!({
            "start_offset_steps": self.start_offset_steps,
            "duration_steps": self.duration_steps,
            "avg_price_eur_kwh": self.avg_price,
        })
    }
}

/// First run of at least two consecutive steps (from offset 1 on) matching
/// `pred`.
fn find_span(window: &[f64], pred: impl Fn(f64) -> bool) -> Option<PriceSpan> {
    let mut start = None;
    for (i, &price) in window.iter().enumerate().skip(1) {
        if pred(price) {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            if i - s >= 2 {
                let avg = window[s..i].iter().sum::<f64>() / (i - s) as f64;
                return Some(PriceSpan {
                    start_offset_steps: s,
                    duration_steps: i - s,
                    avg_price: avg,
                });
            }
        }
    }
    if let Some(s) = start {
        if window.len() - s >= 2 {
            let avg = window[s..].iter().sum::<f64>() / (window.len() - s) as f64;
            return Some(PriceSpan {
                start_offset_steps: s,
                duration_steps: window.len() - s,
                avg_price: avg,
            });
        }
    }
    None
}

#[async_trait]
impl Specialist for CostAgent {
    fn name(&self) -> &'static str {
        "energy_cost"
    }

    async fn assess(&self, ctx: &AgentContext) -> Recommendation {
        let current = ctx.state.electricity_price_eur_kwh;
        let window = if ctx.price_window.is_empty() {
            vec![current]
        } else {
            ctx.price_window.clone()
        };

        let min = window.iter().copied().fold(f64::INFINITY, f64::min);
        let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let median = Data::new(window.clone()).median();
        let spread = max - min;
        let cheap_threshold = min + 0.25 * spread;
        let expensive_threshold = max - 0.25 * spread;

        let spread_ratio = if min > 0.0 { max / min } else { f64::INFINITY };

        let next_cheap = find_span(&window, |p| p <= cheap_threshold);
        let next_expensive = find_span(&window, |p| p >= expensive_threshold);

        // Energy one tick of minimal pumping consumes, for pricing the
        // defer-vs-pump-now swing.
        let tick_energy_kwh = ctx
            .pump_model
            .rank_by_efficiency(FREQ_MIN_HZ, ctx.state.l1_m)
            .first()
            .map(|(_, perf)| perf.power_kw * 0.25)
            .unwrap_or(0.0);
        let cheapest_future = window[1..]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
            .min(current);
        let arbitrage_value_eur = ((current - cheapest_future) * tick_energy_kwh).max(0.0);

        let call = if spread > 0.0 && current >= expensive_threshold && next_cheap.is_some() {
            "DEFER"
        } else if spread > 0.0 && current <= cheap_threshold && next_expensive.is_some() {
            "PUMP_NOW"
        } else {
            "PUMP_NORMALLY"
        };

        let cfg = crate::config::get_or_default();
        let priority = if spread_ratio > cfg.synthesis.price_spread_ratio_high {
            Priority::High
        } else {
            Priority::Medium
        };

        let template = format!(
            "Spot price {current:.3} EUR/kWh against a 24 h window of {min:.3}-{max:.3} \
             (median {median:.3}). Call: {call}. Shifting one minimal pumping tick to the \
             cheapest upcoming price is worth {arbitrage_value_eur:.2} EUR.",
        );
        let reasoning = match ctx.llm.narrative(SPECIALIST_SYSTEM_PROMPT, &template).await {
            Some(text) => text,
            None => template,
        };

        Recommendation {
            agent_name: self.name().to_string(),
            priority,
            confidence: if window.len() >= 96 { 0.85 } else { 0.6 },
            recommendation_type: "cost_optimization".to_string(),
            reasoning,
            data: json!({
                "current_price": current,
                "window_median": median,
                "window_spread_ratio": if spread_ratio.is_finite() { json!(spread_ratio) } else { json!("inf") },
                "next_cheap_window": next_cheap.map(PriceSpan::to_json),
                "next_expensive_window": next_expensive.map(PriceSpan::to_json),
                "arbitrage_value_eur": arbitrage_value_eur,
                "recommendation": call,
            }),
            can_veto: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::specialists::test_support;

    #[tokio::test]
    async fn test_flat_window_is_normal() {
        let ctx = test_support::context();
        let rec = CostAgent.assess(&ctx).await;
        assert_eq!(rec.data["recommendation"], "PUMP_NORMALLY");
        assert_eq!(rec.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn test_price_spike_defers() {
        let mut ctx = test_support::context();
        ctx.state.electricity_price_eur_kwh = 80.0;
        let mut window = vec![0.20; 96];
        window[0] = 80.0;
        ctx.price_window = window;
        let rec = CostAgent.assess(&ctx).await;
        assert_eq!(rec.data["recommendation"], "DEFER");
        assert_eq!(rec.priority, Priority::High);
        let arbitrage = rec.data["arbitrage_value_eur"].as_f64().unwrap();
        assert!(arbitrage > 0.0, "arbitrage should be positive, got {arbitrage}");
    }

    #[tokio::test]
    async fn test_cheap_now_pumps_now() {
        let mut ctx = test_support::context();
        ctx.state.electricity_price_eur_kwh = 0.02;
        let mut window = vec![0.40; 96];
        window[0] = 0.02;
        window[1] = 0.03;
        window[2] = 0.03;
        ctx.price_window = window;
        let rec = CostAgent.assess(&ctx).await;
        assert_eq!(rec.data["recommendation"], "PUMP_NOW");
    }

    #[tokio::test]
    async fn test_negative_prices_handled() {
        let mut ctx = test_support::context();
        ctx.state.electricity_price_eur_kwh = -0.05;
        let mut window = vec![0.30; 96];
        window[0] = -0.05;
        window[1] = -0.04;
        window[2] = -0.04;
        ctx.price_window = window;
        let rec = CostAgent.assess(&ctx).await;
        // Negative now with expensive prices ahead: pump now
        assert_eq!(rec.data["recommendation"], "PUMP_NOW");
    }

    #[test]
    fn test_find_span_requires_two_steps() {
        let window = vec![1.0, 0.1, 1.0, 0.1, 0.1, 1.0];
        let span = find_span(&window, |p| p < 0.5).unwrap();
        assert_eq!(span.start_offset_steps, 3);
        assert_eq!(span.duration_steps, 2);
    }
}
