//! Forecast types: Trend, ForecastSnapshot

use serde::{Deserialize, Serialize};

/// Direction of the forecast inflow trajectory over the next two hours.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    #[default]
    Stable,
    Falling,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Rising => write!(f, "rising"),
            Trend::Stable => write!(f, "stable"),
            Trend::Falling => write!(f, "falling"),
        }
    }
}

/// One forecaster inference, shared read-only by all six specialists.
///
/// Values are inflow in m³ per 15 min at 15-minute cadence. `next_6h` is the
/// first 24 steps of `next_24h`; both are materialized so agents never
/// re-run the model inside a tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    /// 24 steps, 15-min cadence
    pub next_6h: Vec<f64>,
    /// 96 steps, 15-min cadence
    pub next_24h: Vec<f64>,
    /// Largest forecast value over the 24 h horizon
    pub peak_value: f64,
    /// Offset of the peak in 15-min steps from now
    pub peak_time_offset: usize,
    pub trend: Trend,
    pub storm_detected: bool,
    /// 0..1; degraded paths are fixed at 0.2
    pub confidence: f64,
    /// True when the model could not run (cold start, missing checkpoint)
    /// and the snapshot is a persistence copy of the last observation
    pub degraded: bool,
}

impl ForecastSnapshot {
    /// Persistence fallback: the last observed inflow copied across the
    /// horizon. Used on cold start and when the checkpoint is unavailable.
    pub fn degraded(last_inflow: f64) -> Self {
        let value = if last_inflow.is_finite() && last_inflow >= 0.0 {
            last_inflow
        } else {
            0.0
        };
        Self {
            next_6h: vec![value; 24],
            next_24h: vec![value; 96],
            peak_value: value,
            peak_time_offset: 0,
            trend: Trend::Stable,
            storm_detected: false,
            confidence: 0.2,
            degraded: true,
        }
    }

    /// Forecast inflow for the next tick (m³ per 15 min).
    pub fn next_step(&self) -> f64 {
        self.next_24h.first().copied().unwrap_or(0.0)
    }
}
