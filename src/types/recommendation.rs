//! Specialist agent output: Priority, Recommendation

use serde::{Deserialize, Serialize};

// ============================================================================
// Priority Ladder
// ============================================================================

/// Priority a specialist attaches to its recommendation.
///
/// Ordinal values are used for ensemble comparison; `Critical` from a vetoing
/// agent forces the coordinator to adopt that agent's command set verbatim.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    #[default]
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "LOW"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::High => write!(f, "HIGH"),
            Priority::Critical => write!(f, "CRITICAL"),
        }
    }
}

// ============================================================================
// Recommendation
// ============================================================================

/// One specialist's assessment of the current tick.
///
/// `reasoning` is narrative only — produced by the LLM backend when enabled,
/// by deterministic templates otherwise — and is never parsed downstream.
/// Every machine-consumed value lives in `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub agent_name: String,
    pub priority: Priority,
    /// Agent's own confidence in this assessment, 0..1
    pub confidence: f64,
    /// Tag from the agent's known set (e.g. `inflow_forecast`,
    /// `cost_optimization`)
    pub recommendation_type: String,
    pub reasoning: String,
    /// Structured payload, agent-specific keys
    #[serde(rename = "key_data")]
    pub data: serde_json::Value,
    /// Only Safety and Compliance ever set this. At `Critical` it forces
    /// verbatim adoption of the agent's corrective command set.
    #[serde(default, skip_serializing)]
    pub can_veto: bool,
}

impl Recommendation {
    /// Neutral stub substituted when an agent misses its deadline or dies.
    pub fn timeout_stub(agent_name: &str) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            priority: Priority::Low,
            confidence: 0.0,
            recommendation_type: "timeout".to_string(),
            reasoning: "timeout".to_string(),
            data: serde_json::json!({}),
            can_veto: false,
        }
    }

    /// Whether this recommendation forces verbatim adoption.
    pub fn is_forcing_veto(&self) -> bool {
        self.can_veto && self.priority == Priority::Critical
    }
}
