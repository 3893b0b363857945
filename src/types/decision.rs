//! Tick output: Decision, CostCalculation, ConstraintViolation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PumpCommand, Priority, Recommendation, StateSummary};

// ============================================================================
// Cost Metrics
// ============================================================================

/// Decision-level cost/energy metrics for one tick.
///
/// `cost_eur` preserves sign — negative spot prices make pumping income.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CostCalculation {
    pub total_power_kw: f64,
    /// `total_power_kw × 0.25 h`
    pub energy_consumed_kwh: f64,
    /// `energy_consumed_kwh × price`, sign preserved
    pub cost_eur: f64,
    /// `Σ flow_m3h × 0.25`
    pub flow_pumped_m3: f64,
    /// `energy / flow`, 0 when flow is 0
    pub specific_energy_kwh_per_m3: f64,
}

// ============================================================================
// Constraint Violations
// ============================================================================

/// Closed set of rule identifiers on the JSON surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ViolationType {
    #[serde(rename = "L1_OUT_OF_RANGE")]
    L1OutOfRange,
    #[serde(rename = "F2_EXCEEDED")]
    F2Exceeded,
    #[serde(rename = "FREQ_OUT_OF_BAND")]
    FreqOutOfBand,
    #[serde(rename = "NO_PUMP_RUNNING")]
    NoPumpRunning,
    #[serde(rename = "MIN_RUNTIME")]
    MinRuntime,
    #[serde(rename = "EMPTYING_OVERDUE")]
    EmptyingOverdue,
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ViolationType::L1OutOfRange => "L1_OUT_OF_RANGE",
            ViolationType::F2Exceeded => "F2_EXCEEDED",
            ViolationType::FreqOutOfBand => "FREQ_OUT_OF_BAND",
            ViolationType::NoPumpRunning => "NO_PUMP_RUNNING",
            ViolationType::MinRuntime => "MIN_RUNTIME",
            ViolationType::EmptyingOverdue => "EMPTYING_OVERDUE",
        };
        write!(f, "{s}")
    }
}

/// One violated rule: which rule, the observed value, the limit it broke.
///
/// `limit` is a JSON value because some limits are numeric (16 000) and some
/// are descriptive ("47.8–50.0 Hz").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintViolation {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub value: f64,
    pub limit: serde_json::Value,
}

impl ConstraintViolation {
    pub fn numeric(violation_type: ViolationType, value: f64, limit: f64) -> Self {
        Self {
            violation_type,
            value,
            limit: serde_json::json!(limit),
        }
    }

    pub fn described(violation_type: ViolationType, value: f64, limit: &str) -> Self {
        Self {
            violation_type,
            value,
            limit: serde_json::json!(limit),
        }
    }
}

// ============================================================================
// Decision
// ============================================================================

/// The committed output of one control tick.
///
/// The JSON shape of this struct is bit-significant for downstream consumers
/// (workflow orchestrator, dashboard, decision log) and is covered by a
/// serialization regression test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    /// Echo of the input state this decision was computed from
    pub state: StateSummary,
    /// Post-validator commands, always feasible
    pub pump_commands: Vec<PumpCommand>,
    pub coordinator_reasoning: String,
    /// Highest priority that actually drove the decision
    pub priority_applied: Priority,
    /// One short string per conflict the coordinator or validator resolved
    pub conflicts_resolved: Vec<String>,
    pub confidence: f64,
    pub cost_calculation: CostCalculation,
    /// Empty when the validator did its job; re-checked by the metrics stage
    pub constraint_violations: Vec<ConstraintViolation>,
    pub agent_messages: Vec<Recommendation>,
}

impl Decision {
    /// Number of started pumps in the committed command set.
    pub fn running_pumps(&self) -> usize {
        self.pump_commands.iter().filter(|c| c.start).count()
    }

    /// Sum of commanded frequencies over started pumps (Hz).
    pub fn aggregate_frequency_hz(&self) -> f64 {
        self.pump_commands
            .iter()
            .filter(|c| c.start)
            .map(|c| c.frequency_hz)
            .sum()
    }

    /// Total commanded outflow (m³/h).
    pub fn total_flow_m3h(&self) -> f64 {
        super::total_flow_m3h(&self.pump_commands)
    }
}
