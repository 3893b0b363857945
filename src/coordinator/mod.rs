//! Coordinator - multi-objective synthesis of the six specialist views
//!
//! Collapses six `Recommendation`s into one tentative pump command set under
//! the strict priority hierarchy:
//!
//! ```text
//! Safety > Compliance > Cost > Efficiency = Smoothness > Forecast
//! ```
//!
//! A vetoing agent (Safety or Compliance) at CRITICAL short-circuits
//! everything: its corrective command set is adopted verbatim. Otherwise the
//! deterministic synthesis starts from the efficiency baseline and lets
//! cost, smoothness and the min-one-pump rule adjust it. An optional LLM
//! synthesizer can replace the deterministic middle — its output is parsed
//! strictly and any mismatch falls back, so the LLM can shape but never
//! break a decision.

pub mod parsing;

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::agents::specialists::efficiency;
use crate::agents::AgentContext;
use crate::constraints::{FREQ_MAX_HZ, FREQ_MIN_HZ};
use crate::types::{Priority, PumpCommand, Recommendation};

/// The coordinator's output, pre-validator.
#[derive(Debug, Clone)]
pub struct TentativeDecision {
    /// One entry per commissioned pump
    pub commands: Vec<PumpCommand>,
    pub reasoning: String,
    pub priority_applied: Priority,
    pub conflicts_resolved: Vec<String>,
    pub confidence: f64,
}

/// System prompt for the optional LLM synthesis pass.
const SYNTHESIS_SYSTEM_PROMPT: &str = "You are the coordinating controller of a wastewater lift \
station. Six specialist assessments are provided. Choose which pumps to run and at what \
frequency (47.8-50.0 Hz). Respect the specialists' priorities: safety and compliance outrank \
cost, cost outranks efficiency and smoothness. Answer in EXACTLY three lines:\n\
PUMPS: <comma-separated pump ids, or 'none'>\n\
FREQUENCIES: <comma-separated Hz values, one per pump>\n\
REASONING: <one sentence>";

pub struct Coordinator {
    decisions_synthesized: AtomicU64,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            decisions_synthesized: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> u64 {
        self.decisions_synthesized.load(Ordering::Relaxed)
    }

    /// Synthesize the six recommendations into a tentative command set.
    pub async fn synthesize(
        &self,
        ctx: &AgentContext,
        recommendations: &[Recommendation],
    ) -> TentativeDecision {
        self.decisions_synthesized.fetch_add(1, Ordering::Relaxed);

        // Veto scan, hierarchy order: Safety outranks Compliance.
        for (agent_name, label) in [
            ("water_level_safety", "safety_override_adopted"),
            ("constraint_compliance", "compliance_override_adopted"),
        ] {
            if let Some(rec) = find(recommendations, agent_name) {
                if rec.is_forcing_veto() {
                    info!(agent = agent_name, "CRITICAL veto — adopting corrective command set verbatim");
                    let started = parse_command_array(&rec.data["commands"]);
                    return TentativeDecision {
                        commands: ctx.pump_model.commands_for(ctx.state.l1_m, &started),
                        reasoning: rec.reasoning.clone(),
                        priority_applied: Priority::Critical,
                        conflicts_resolved: vec![label.to_string()],
                        confidence: rec.confidence,
                    };
                }
            }
        }

        // Optional LLM synthesis; strict parse, deterministic fallback.
        let cfg = crate::config::get_or_default();
        if ctx.llm.is_enabled() && cfg.llm.coordinator_synthesis {
            match self.llm_synthesis(ctx, recommendations).await {
                Ok(decision) => return decision,
                Err(reason) => {
                    warn!(reason = %reason, "LLM synthesis failed — using deterministic algorithm");
                    let mut decision = self.deterministic_synthesis(ctx, recommendations);
                    decision
                        .conflicts_resolved
                        .push("llm_synthesis_fallback".to_string());
                    return decision;
                }
            }
        }

        self.deterministic_synthesis(ctx, recommendations)
    }

    /// The canonical multi-objective strategy: efficiency baseline, cost
    /// deferral, smoothness staging, then the structural guarantees.
    fn deterministic_synthesis(
        &self,
        ctx: &AgentContext,
        recommendations: &[Recommendation],
    ) -> TentativeDecision {
        let mut conflicts = Vec::new();
        let mut applied: Vec<(Priority, f64)> = Vec::new();
        let mut notes: Vec<String> = Vec::new();

        // 1. Efficiency baseline.
        let efficiency_rec = find(recommendations, "pump_efficiency");
        let mut started: Vec<(String, f64)> = efficiency_rec
            .map(|rec| parse_baseline(&rec.data))
            .unwrap_or_default();
        if started.is_empty() {
            // Stubbed or empty efficiency agent: rebuild the baseline from
            // the same scoring it would have used.
            let required = ctx.required_flow_m3h();
            if let Some(candidate) = efficiency::best_candidate(ctx, required) {
                let ids = efficiency::assign_pump_ids(ctx, &candidate);
                started = ids
                    .into_iter()
                    .map(|id| (id, candidate.frequency_hz))
                    .collect();
            }
            conflicts.push("efficiency_baseline_recomputed".to_string());
        }
        if let Some(rec) = efficiency_rec {
            applied.push((rec.priority, rec.confidence));
        }
        notes.push(format!("baseline {} pump(s)", started.len()));

        let safety_state = find(recommendations, "water_level_safety")
            .and_then(|rec| rec.data["level_state"].as_str().map(String::from))
            .unwrap_or_else(|| "UNKNOWN".to_string());

        // 2. Cost shift, only when the level is provably benign.
        if let Some(cost_rec) = find(recommendations, "energy_cost") {
            match cost_rec.data["recommendation"].as_str() {
                Some("DEFER") if safety_state == "SAFE" => {
                    if let Some(best) = ctx.pump_model.best_efficiency_pump(FREQ_MIN_HZ, ctx.state.l1_m)
                    {
                        started = vec![(best, FREQ_MIN_HZ)];
                        conflicts.push("cost_deferral_applied".to_string());
                        applied.push((cost_rec.priority, cost_rec.confidence));
                        notes.push("deferred to cheaper window".to_string());
                    }
                }
                Some("PUMP_NOW") if safety_state == "SAFE" || safety_state == "WATCH" => {
                    for (_, freq) in &mut started {
                        *freq = FREQ_MAX_HZ;
                    }
                    conflicts.push("cheap_window_pump_now".to_string());
                    applied.push((cost_rec.priority, cost_rec.confidence));
                    notes.push("pumping hard in cheap window".to_string());
                }
                _ => {}
            }
        }

        // 3. Smoothness staging when the baseline itself jumps too far.
        let deferral_applied = conflicts.iter().any(|c| c == "cost_deferral_applied");
        if !deferral_applied {
            if let Some(smooth_rec) = find(recommendations, "flow_smoothness") {
                let baseline_flow = baseline_flow_m3h(ctx, &started);
                let step = (baseline_flow - ctx.prev_flow_m3h).abs();
                let staged = smooth_rec.data["staged"].as_array();
                if step > crate::agents::specialists::smoothness::MAX_STEP_M3H {
                    if let Some(stage0) = staged.and_then(|s| s.first()) {
                        let pumps: Vec<(String, f64)> = stage0["pumps"]
                            .as_array()
                            .map(|ids| {
                                ids.iter()
                                    .filter_map(|v| v.as_str())
                                    .map(|id| (id.to_string(), 49.0))
                                    .collect()
                            })
                            .unwrap_or_default();
                        if !pumps.is_empty() {
                            started = pumps;
                            conflicts.push("flow_step_staged".to_string());
                            applied.push((smooth_rec.priority, smooth_rec.confidence));
                            notes.push("outflow change staged over two ticks".to_string());
                        }
                    }
                }
            }
        }

        // 4 + 5. Structural guarantees: frequency clip, then min-one-pump.
        let commands = clip_and_materialize(ctx, started, &mut conflicts);

        let mut decision = TentativeDecision {
            commands,
            reasoning: format!(
                "Deterministic synthesis (level {safety_state}): {}.",
                notes.join("; ")
            ),
            priority_applied: applied
                .iter()
                .map(|(p, _)| *p)
                .max()
                .unwrap_or(Priority::Medium),
            conflicts_resolved: conflicts,
            confidence: if applied.is_empty() {
                0.5
            } else {
                applied.iter().map(|(_, c)| c).sum::<f64>() / applied.len() as f64
            },
        };
        ensure_min_one_pump(ctx, &mut decision);
        decision
    }

    async fn llm_synthesis(
        &self,
        ctx: &AgentContext,
        recommendations: &[Recommendation],
    ) -> Result<TentativeDecision, String> {
        let prompt = build_synthesis_prompt(ctx, recommendations);
        let completion = ctx
            .llm
            .completion(SYNTHESIS_SYSTEM_PROMPT, &prompt, 200)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "backend disabled".to_string())?;
        let parsed = parsing::parse_synthesis(&completion).map_err(|e| e.to_string())?;
        debug!(pumps = parsed.started.len(), "LLM synthesis parsed");

        let priority_applied = recommendations
            .iter()
            .map(|r| r.priority)
            .max()
            .unwrap_or(Priority::Medium);
        let mut conflicts = Vec::new();
        let commands = clip_and_materialize(ctx, parsed.started, &mut conflicts);
        let mut decision = TentativeDecision {
            commands,
            reasoning: if parsed.reasoning.is_empty() {
                "LLM synthesis".to_string()
            } else {
                parsed.reasoning
            },
            priority_applied,
            conflicts_resolved: conflicts,
            confidence: 0.7,
        };
        ensure_min_one_pump(ctx, &mut decision);
        Ok(decision)
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Step 5 of the canonical strategy: clip every frequency into the drive
/// band (dropping NaN/zero requests) before deriving performance.
fn clip_and_materialize(
    ctx: &AgentContext,
    started: Vec<(String, f64)>,
    conflicts: &mut Vec<String>,
) -> Vec<PumpCommand> {
    let mut clipped = false;
    let started: Vec<(String, f64)> = started
        .into_iter()
        .filter_map(|(id, freq)| {
            if !freq.is_finite() || freq <= 0.0 {
                clipped = true;
                return None;
            }
            let clamped = freq.clamp(FREQ_MIN_HZ, FREQ_MAX_HZ);
            if (clamped - freq).abs() > f64::EPSILON {
                clipped = true;
            }
            Some((id, clamped))
        })
        .collect();
    if clipped {
        conflicts.push("frequency_clipped".to_string());
    }
    ctx.pump_model.commands_for(ctx.state.l1_m, &started)
}

/// Step 4 of the canonical strategy: if every proposal would stop all
/// pumps, run the single most efficient pump at minimum frequency.
fn ensure_min_one_pump(ctx: &AgentContext, decision: &mut TentativeDecision) {
    if !decision.commands.iter().any(|c| c.start) {
        if let Some(best) = ctx.pump_model.best_efficiency_pump(FREQ_MIN_HZ, ctx.state.l1_m) {
            decision.commands = ctx
                .pump_model
                .commands_for(ctx.state.l1_m, &[(best, FREQ_MIN_HZ)]);
            decision
                .conflicts_resolved
                .push("min_one_pump_applied".to_string());
        }
    }
}

fn find<'a>(recommendations: &'a [Recommendation], agent_name: &str) -> Option<&'a Recommendation> {
    recommendations.iter().find(|r| r.agent_name == agent_name)
}

/// Read a `[{pump_id, frequency_hz}]` array from agent data, skipping
/// malformed entries.
fn parse_command_array(value: &serde_json::Value) -> Vec<(String, f64)> {
    value
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let id = entry["pump_id"].as_str()?;
                    let freq = entry["frequency_hz"].as_f64()?;
                    Some((id.to_string(), freq))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Read the efficiency agent's parallel `recommended_pumps` /
/// `frequencies` arrays.
fn parse_baseline(data: &serde_json::Value) -> Vec<(String, f64)> {
    let Some(pumps) = data["recommended_pumps"].as_array() else {
        return Vec::new();
    };
    let Some(freqs) = data["frequencies"].as_array() else {
        return Vec::new();
    };
    pumps
        .iter()
        .zip(freqs.iter())
        .filter_map(|(p, f)| Some((p.as_str()?.to_string(), f.as_f64()?)))
        .collect()
}

fn baseline_flow_m3h(ctx: &AgentContext, started: &[(String, f64)]) -> f64 {
    started
        .iter()
        .filter_map(|(id, freq)| {
            ctx.pump_model
                .performance(id, *freq, ctx.state.l1_m)
                .ok()
                .map(|p| p.flow_m3h)
        })
        .sum()
}

fn build_synthesis_prompt(ctx: &AgentContext, recommendations: &[Recommendation]) -> String {
    let mut prompt = format!(
        "STATE: level {:.2} m | inflow {:.0} m³/15min | price {:.3} EUR/kWh | prev outflow {:.0} m³/h\n\nSPECIALISTS:\n",
        ctx.state.l1_m,
        ctx.state.f1_m3_per_15min,
        ctx.state.electricity_price_eur_kwh,
        ctx.prev_flow_m3h,
    );
    for rec in recommendations {
        prompt.push_str(&format!(
            "- {} [{}] {}: {}\n",
            rec.agent_name, rec.priority, rec.recommendation_type, rec.data
        ));
    }
    prompt.push_str(&format!(
        "\nPUMPS AVAILABLE: {}\n",
        ctx.pump_model.pump_ids().join(", ")
    ));
    prompt
}

// ============================================================================
// Tests
// ============================================================================
