//! Decision Driver - one 15-minute control tick, end to end
//!
//! ```text
//! 1. Validate the incoming SystemState (the only failable stage)
//! 2. Snapshot the RuntimeTracker
//! 3. Forecast inflow (C3)
//! 4. Fan out the six specialists with a per-agent deadline (C4)
//! 5. Coordinator synthesis (C5)
//! 6. Validator rewrite to a feasible set (C6)
//! 7. Decision metrics + final rule re-check (C7)
//! 8. Commit the tracker mutation and cache the decision
//! ```
//!
//! Steps 1-7 are pure given the tracker snapshot. Step 8 is the only
//! mutation and runs strictly after everything else succeeded, so a driver
//! killed mid-tick leaves the tracker exactly as it was.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::agents::{default_specialists, AgentContext, Specialist};
use crate::coordinator::Coordinator;
use crate::dataset::{DatasetError, HistoricalDataset};
use crate::forecast::InflowForecaster;
use crate::hydraulics::PumpModel;
use crate::llm::LlmBackend;
use crate::types::{
    Decision, PumpCommand, Recommendation, RuntimeTracker, StateSummary, SystemState,
};
use crate::validator::Validator;

/// Price sanity band (EUR/kWh). Spot prices outside this are sensor or
/// market-data corruption, not a market condition.
const PRICE_MIN_EUR_KWH: f64 = -10.0;
const PRICE_MAX_EUR_KWH: f64 = 10_000.0;

/// Steps in the forward price window handed to the cost agent (24 h).
const PRICE_WINDOW_STEPS: usize = 96;

/// Errors that can escape `decide`. Everything else degrades internally.
#[derive(Debug, Error)]
pub enum DecideError {
    /// The input state failed validation; no decision was emitted.
    #[error("invalid system state: {0}")]
    InvalidState(String),
    /// A tick is already in flight; the caller must retry after it commits.
    #[error("a decision tick is already in flight")]
    TickInProgress,
}

/// Counters exposed for the out-of-scope HTTP layer.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DriverStats {
    pub ticks_processed: u64,
    pub agent_timeouts: u64,
    pub vetoes_applied: u64,
    pub validator_rewrites: u64,
    pub llm_fallbacks: u64,
}

#[derive(Default)]
struct StatsCells {
    ticks_processed: AtomicU64,
    agent_timeouts: AtomicU64,
    vetoes_applied: AtomicU64,
    validator_rewrites: AtomicU64,
    llm_fallbacks: AtomicU64,
}

/// Owns the per-tick pipeline and the only mutable process state.
pub struct DecisionDriver {
    pump_model: Arc<PumpModel>,
    forecaster: Arc<InflowForecaster>,
    dataset: Arc<HistoricalDataset>,
    agents: Vec<Arc<dyn Specialist>>,
    coordinator: Coordinator,
    validator: Validator,
    llm: LlmBackend,
    tracker: Mutex<RuntimeTracker>,
    last_decision: Mutex<Option<Decision>>,
    /// At most one tick in flight across the process.
    tick_gate: tokio::sync::Mutex<()>,
    stats: StatsCells,
}

impl DecisionDriver {
    /// Assemble the kernel from its startup artifacts. Reads deadlines and
    /// LLM settings from the global config.
    pub fn new(dataset: Arc<HistoricalDataset>, forecaster: InflowForecaster) -> Self {
        let cfg = crate::config::get_or_default();
        let pump_model = Arc::new(PumpModel::new());
        let llm = LlmBackend::from_config(&cfg.llm, cfg.deadlines.coordinator_ms);
        Self {
            validator: Validator::new(pump_model.clone()),
            pump_model,
            forecaster: Arc::new(forecaster),
            dataset,
            agents: default_specialists(),
            coordinator: Coordinator::new(),
            llm,
            tracker: Mutex::new(RuntimeTracker::new()),
            last_decision: Mutex::new(None),
            tick_gate: tokio::sync::Mutex::new(()),
            stats: StatsCells::default(),
        }
    }

    /// The `state_at(index)` kernel operation.
    pub fn state_at(&self, index: usize) -> Result<SystemState, DatasetError> {
        self.dataset.state_at(index)
    }

    /// The last committed decision, if any.
    pub fn last_decision(&self) -> Option<Decision> {
        lock_clean(&self.last_decision).clone()
    }

    /// Frozen copy of the runtime tracker.
    pub fn tracker_snapshot(&self) -> RuntimeTracker {
        lock_clean(&self.tracker).clone()
    }

    pub fn stats(&self) -> DriverStats {
        DriverStats {
            ticks_processed: self.stats.ticks_processed.load(Ordering::Relaxed),
            agent_timeouts: self.stats.agent_timeouts.load(Ordering::Relaxed),
            vetoes_applied: self.stats.vetoes_applied.load(Ordering::Relaxed),
            validator_rewrites: self.stats.validator_rewrites.load(Ordering::Relaxed),
            llm_fallbacks: self.stats.llm_fallbacks.load(Ordering::Relaxed),
        }
    }

    /// The `decide(state)` kernel operation: one full tick.
    pub async fn decide(&self, state: SystemState) -> Result<Decision, DecideError> {
        validate_state(&state)?;

        // Reject rather than queue a concurrent tick — the workflow
        // orchestrator invokes us serially and overlap means it is broken.
        let Ok(_gate) = self.tick_gate.try_lock() else {
            return Err(DecideError::TickInProgress);
        };

        let tracker_snapshot = lock_clean(&self.tracker).clone();
        let (prev_flow_m3h, prev_commands) = {
            let last = lock_clean(&self.last_decision);
            match last.as_ref() {
                Some(decision) => (decision.total_flow_m3h(), decision.pump_commands.clone()),
                None => (0.0, Vec::new()),
            }
        };

        // Single-threaded model inference, bounded at tens of milliseconds;
        // every agent consumes the snapshot, never the model.
        let forecast = self.forecaster.forecast(state.history_index);

        let ctx = Arc::new(AgentContext {
            state: state.clone(),
            forecast: forecast.clone(),
            specs: self.pump_model.specs(),
            tracker: tracker_snapshot.clone(),
            price_window: self
                .dataset
                .price_window(state.history_index, PRICE_WINDOW_STEPS),
            prev_flow_m3h,
            pump_model: self.pump_model.clone(),
            llm: self.llm.clone(),
        });

        let recommendations = self.fan_out(&ctx).await;

        let tentative = self.coordinator.synthesize(&ctx, &recommendations).await;
        let safety_vetoed = recommendations
            .iter()
            .any(|r| r.agent_name == "water_level_safety" && r.is_forcing_veto());
        if tentative
            .conflicts_resolved
            .iter()
            .any(|c| c.contains("override_adopted"))
        {
            self.stats.vetoes_applied.fetch_add(1, Ordering::Relaxed);
        }
        if tentative
            .conflicts_resolved
            .iter()
            .any(|c| c == "llm_synthesis_fallback")
        {
            self.stats.llm_fallbacks.fetch_add(1, Ordering::Relaxed);
        }

        let (commands, validator_conflicts) = self.validator.validate(
            tentative.commands,
            &state,
            &tracker_snapshot,
            forecast.next_step(),
            &prev_commands,
            safety_vetoed,
        );
        self.stats
            .validator_rewrites
            .fetch_add(validator_conflicts.len() as u64, Ordering::Relaxed);

        let cost_calculation =
            crate::metrics::calculate(&commands, state.electricity_price_eur_kwh);
        let constraint_violations =
            crate::metrics::check_final(&commands, &state, &tracker_snapshot);
        if !constraint_violations.is_empty() {
            warn!(
                violations = constraint_violations.len(),
                "Final rule re-check found violations the validator did not clear"
            );
        }

        let mut conflicts_resolved = tentative.conflicts_resolved;
        conflicts_resolved.extend(validator_conflicts);

        let decision = Decision {
            timestamp: state.timestamp,
            state: StateSummary::from(&state),
            pump_commands: commands,
            coordinator_reasoning: tentative.reasoning,
            priority_applied: tentative.priority_applied,
            conflicts_resolved,
            confidence: tentative.confidence,
            cost_calculation,
            constraint_violations,
            agent_messages: recommendations,
        };

        // The single mutation of the tick, after every stage succeeded.
        self.commit(&decision.pump_commands, &state);
        *lock_clean(&self.last_decision) = Some(decision.clone());
        self.stats.ticks_processed.fetch_add(1, Ordering::Relaxed);

        info!(
            running = decision.running_pumps(),
            flow_m3h = decision.total_flow_m3h(),
            cost_eur = decision.cost_calculation.cost_eur,
            priority = %decision.priority_applied,
            "Tick committed"
        );
        Ok(decision)
    }

    /// Run all six specialists concurrently against the shared context,
    /// replacing any that miss the deadline (or die) with the neutral stub.
    /// Results come back in registry order — arrival order carries no
    /// meaning and the coordinator must not see one.
    async fn fan_out(&self, ctx: &Arc<AgentContext>) -> Vec<Recommendation> {
        let deadline = Duration::from_millis(crate::config::get_or_default().deadlines.agent_ms);

        let handles: Vec<_> = self
            .agents
            .iter()
            .map(|agent| {
                let agent = agent.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move { timeout(deadline, agent.assess(&ctx)).await })
            })
            .collect();

        let results = join_all(handles).await;
        self.agents
            .iter()
            .zip(results)
            .map(|(agent, result)| match result {
                Ok(Ok(recommendation)) => recommendation,
                Ok(Err(_elapsed)) => {
                    warn!(agent = agent.name(), deadline_ms = deadline.as_millis() as u64, "Specialist missed its deadline — stubbed");
                    self.stats.agent_timeouts.fetch_add(1, Ordering::Relaxed);
                    Recommendation::timeout_stub(agent.name())
                }
                Err(join_error) => {
                    warn!(agent = agent.name(), error = %join_error, "Specialist task died — stubbed");
                    self.stats.agent_timeouts.fetch_add(1, Ordering::Relaxed);
                    Recommendation::timeout_stub(agent.name())
                }
            })
            .collect()
    }

    fn commit(&self, commands: &[PumpCommand], state: &SystemState) {
        lock_clean(&self.tracker).commit(commands, state.timestamp, state.l1_m);
    }
}

/// Lock a mutex, recovering the data from a poisoned lock. The tracker is
/// only ever written under the tick gate, so the data is consistent even if
/// a panicking test poisoned it.
fn lock_clean<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Input validation: the only errors that propagate out of `decide`.
fn validate_state(state: &SystemState) -> Result<(), DecideError> {
    let numbers = [
        ("l1_m", state.l1_m),
        ("v_m3", state.v_m3),
        ("f1_m3_per_15min", state.f1_m3_per_15min),
        ("f2_m3h", state.f2_m3h),
        ("electricity_price_eur_kwh", state.electricity_price_eur_kwh),
    ];
    for (name, value) in numbers {
        if !value.is_finite() {
            return Err(DecideError::InvalidState(format!("{name} is not finite")));
        }
    }
    if state.l1_m < 0.0 {
        return Err(DecideError::InvalidState(format!(
            "l1_m {} below gauge zero",
            state.l1_m
        )));
    }
    if state.v_m3 < 0.0 || state.f1_m3_per_15min < 0.0 {
        return Err(DecideError::InvalidState(
            "negative volume or inflow".to_string(),
        ));
    }
    if !(PRICE_MIN_EUR_KWH..=PRICE_MAX_EUR_KWH).contains(&state.electricity_price_eur_kwh) {
        return Err(DecideError::InvalidState(format!(
            "price {} outside [{PRICE_MIN_EUR_KWH}, {PRICE_MAX_EUR_KWH}]",
            state.electricity_price_eur_kwh
        )));
    }
    Ok(())
}
