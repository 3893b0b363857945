//! Core state types: SystemState, PriceScenario

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Tick Input: SystemState
// ============================================================================

/// Day-ahead price regime the station is operating under.
///
/// - **Normal**: typical spot market, prices in the 0.05–0.50 EUR/kWh band
/// - **High**: stressed market, prices can spike by orders of magnitude and
///   arbitrage between ticks dominates the cost objective
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriceScenario {
    #[default]
    Normal,
    High,
}

impl PriceScenario {
    /// Parse from string (for API/config)
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normal" | "norm" => Some(PriceScenario::Normal),
            "high" | "stressed" | "spike" => Some(PriceScenario::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for PriceScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceScenario::Normal => write!(f, "normal"),
            PriceScenario::High => write!(f, "high"),
        }
    }
}

/// Immutable per-tick snapshot of the lift station.
///
/// One `SystemState` is produced per 15-minute control tick, either read from
/// the historical dataset (`state_at`) or assembled by the external SCADA
/// bridge. The decision driver validates it before any stage runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemState {
    /// Wall-clock timestamp, minute resolution
    pub timestamp: DateTime<Utc>,
    /// Tunnel water level (m), gauge zero at tunnel invert
    pub l1_m: f64,
    /// Stored tunnel volume (m³)
    pub v_m3: f64,
    /// Current inflow over the tick (m³ per 15 min)
    pub f1_m3_per_15min: f64,
    /// Current total outflow reading (m³/h) — sanity only, not a control input
    pub f2_m3h: f64,
    /// Spot price (EUR/kWh). Signed; negative prices are real and mean
    /// the station is paid to consume.
    pub electricity_price_eur_kwh: f64,
    /// Price regime
    pub price_scenario: PriceScenario,
    /// Row offset into the historical arrays the forecaster slices
    pub history_index: usize,
}

impl SystemState {
    /// Current inflow expressed in m³/h.
    pub fn inflow_m3h(&self) -> f64 {
        self.f1_m3_per_15min * 4.0
    }

    /// Whether the current inflow qualifies as dry weather for the
    /// daily-emptying rule.
    pub fn is_dry_weather(&self) -> bool {
        self.f1_m3_per_15min < crate::constraints::DRY_WEATHER_INFLOW_M3_PER_15MIN
    }
}

/// Compact state echo embedded in every emitted `Decision`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSummary {
    pub l1_m: f64,
    pub v_m3: f64,
    pub f1_m3_per_15min: f64,
    pub electricity_price_eur_kwh: f64,
    pub price_scenario: PriceScenario,
}

impl From<&SystemState> for StateSummary {
    fn from(s: &SystemState) -> Self {
        Self {
            l1_m: s.l1_m,
            v_m3: s.v_m3,
            f1_m3_per_15min: s.f1_m3_per_15min,
            electricity_price_eur_kwh: s.electricity_price_eur_kwh,
            price_scenario: s.price_scenario,
        }
    }
}
