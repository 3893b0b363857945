//! Inflow forecaster: historical window in, ForecastSnapshot out.
//!
//! Wraps the frozen GRU with the historical inflow series bound at startup.
//! Every failure path degrades to a persistence forecast — the forecaster
//! never fails hard, because a tick must always complete.

use std::path::Path;

use tracing::{debug, warn};

use super::checkpoint::ForecastCheckpoint;
use super::model::GruModel;
use crate::types::{ForecastSnapshot, Trend};

/// Horizon the snapshot contract requires (96 × 15 min = 24 h).
const SNAPSHOT_HORIZON: usize = 96;
/// Steps averaged for the trend call (8 × 15 min = 2 h).
const TREND_STEPS: usize = 8;

/// Inference-only inflow forecaster.
///
/// The model is read-only; inference itself is single-threaded and may block
/// for tens of milliseconds, which is fine because at most one tick is in
/// flight and every specialist consumes the snapshot, never the model.
#[derive(Debug)]
pub struct InflowForecaster {
    /// Historical inflow series (m³ per 15 min), one entry per dataset row.
    series: Vec<f64>,
    model: Option<GruModel>,
}

impl InflowForecaster {
    /// Bind the historical series and load the model checkpoint.
    ///
    /// A missing or corrupt checkpoint is not fatal: the forecaster runs in
    /// persistence mode and every snapshot is marked degraded.
    pub fn new(series: Vec<f64>, model_path: &Path) -> Self {
        let model = match ForecastCheckpoint::load(model_path) {
            Ok(cp) => {
                debug!(
                    path = %model_path.display(),
                    hidden = cp.hidden_size,
                    window = cp.window_size,
                    "Loaded forecaster checkpoint"
                );
                Some(GruModel::new(cp))
            }
            Err(e) => {
                warn!(
                    path = %model_path.display(),
                    error = %e,
                    "Forecaster checkpoint unavailable — running in persistence mode"
                );
                None
            }
        };
        Self { series, model }
    }

    /// Forecaster over an explicit model, for tests and tooling.
    pub fn with_model(series: Vec<f64>, model: Option<GruModel>) -> Self {
        Self { series, model }
    }

    /// Whether the sequence model is loaded (false = persistence mode).
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Produce a forecast from the historical window ending at
    /// `history_index`. Re-runs the model on every call.
    pub fn forecast(&self, history_index: usize) -> ForecastSnapshot {
        let last_observed = self
            .series
            .get(history_index.min(self.series.len().saturating_sub(1)))
            .copied()
            .unwrap_or(0.0);

        let Some(model) = &self.model else {
            return ForecastSnapshot::degraded(last_observed);
        };

        let window_size = model.window_size();
        if history_index + 1 < window_size || history_index >= self.series.len() {
            debug!(
                history_index,
                window_size, "Cold start — emitting degraded persistence forecast"
            );
            return ForecastSnapshot::degraded(last_observed);
        }

        let window = &self.series[history_index + 1 - window_size..=history_index];
        let mut values: Vec<f64> = model.rollout(window).take(SNAPSHOT_HORIZON).collect();
        while values.len() < SNAPSHOT_HORIZON {
            values.push(values.last().copied().unwrap_or(last_observed));
        }

        let (peak_time_offset, peak_value) = values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, v)| (i, *v))
            .unwrap_or((0, last_observed));

        let cfg = crate::config::get_or_default();
        let trend = classify_trend(last_observed, &values, cfg.forecast.trend_threshold);
        let storm_detected = peak_value > cfg.forecast.storm_inflow_m3_per_15min
            || peak_value > cfg.forecast.storm_peak_ratio * median(window);

        let confidence = (1.0 - model.val_mae_ratio()).clamp(0.2, 0.95);

        ForecastSnapshot {
            next_6h: values[..24].to_vec(),
            next_24h: values,
            peak_value,
            peak_time_offset,
            trend,
            storm_detected,
            confidence,
            degraded: false,
        }
    }
}

fn classify_trend(last_observed: f64, forecast: &[f64], threshold: f64) -> Trend {
    let steps = forecast.len().min(TREND_STEPS);
    if steps == 0 || last_observed <= 0.0 {
        return Trend::Stable;
    }
    let near_mean: f64 = forecast[..steps].iter().sum::<f64>() / steps as f64;
    let ratio = near_mean / last_observed;
    if ratio > 1.0 + threshold {
        Trend::Rising
    } else if ratio < 1.0 - threshold {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::checkpoint::{ForecastCheckpoint, GruWeights, CHECKPOINT_VERSION};

    fn tiny_model(window_size: usize) -> GruModel {
        let hidden = 3;
        GruModel::new(ForecastCheckpoint {
            version: CHECKPOINT_VERSION,
            hidden_size: hidden,
            window_size,
            horizon: 96,
            inflow_mean: 1_200.0,
            inflow_std: 500.0,
            val_mae_ratio: 0.15,
            weights: GruWeights {
                w_update: vec![0.2; hidden],
                w_reset: vec![0.1; hidden],
                w_cand: vec![0.4; hidden],
                u_update: vec![0.05; hidden * hidden],
                u_reset: vec![0.05; hidden * hidden],
                u_cand: vec![0.1; hidden * hidden],
                b_update: vec![0.0; hidden],
                b_reset: vec![0.0; hidden],
                b_cand: vec![0.0; hidden],
                w_out: vec![0.5; hidden],
                b_out: 0.1,
            },
        })
    }

    #[test]
    fn test_cold_start_degrades() {
        let series = vec![1_000.0; 100];
        let forecaster = InflowForecaster::with_model(series, Some(tiny_model(96)));
        let snap = forecaster.forecast(0);
        assert!(snap.degraded);
        assert!((snap.confidence - 0.2).abs() < f64::EPSILON);
        assert!(!snap.storm_detected);
        assert_eq!(snap.next_24h, vec![1_000.0; 96]);
    }

    #[test]
    fn test_missing_model_degrades() {
        let forecaster = InflowForecaster::with_model(vec![800.0; 200], None);
        let snap = forecaster.forecast(150);
        assert!(snap.degraded);
        assert_eq!(snap.next_step(), 800.0);
    }

    #[test]
    fn test_warm_forecast_has_shape() {
        let series: Vec<f64> = (0..200).map(|i| 1_000.0 + (i % 7) as f64 * 50.0).collect();
        let forecaster = InflowForecaster::with_model(series, Some(tiny_model(8)));
        let snap = forecaster.forecast(150);
        assert!(!snap.degraded);
        assert_eq!(snap.next_6h.len(), 24);
        assert_eq!(snap.next_24h.len(), 96);
        assert_eq!(snap.next_6h[..], snap.next_24h[..24]);
        assert!(snap.peak_time_offset < 96);
        assert!(snap.confidence > 0.2);
    }

    #[test]
    fn test_forecast_repeats_identically() {
        let series: Vec<f64> = (0..200).map(|i| 900.0 + (i % 5) as f64 * 80.0).collect();
        let forecaster = InflowForecaster::with_model(series, Some(tiny_model(8)));
        let a = forecaster.forecast(120);
        let b = forecaster.forecast(120);
        assert_eq!(a.next_24h, b.next_24h);
    }

    #[test]
    fn test_trend_classification() {
        assert_eq!(classify_trend(1_000.0, &[1_300.0; 8], 0.1), Trend::Rising);
        assert_eq!(classify_trend(1_000.0, &[700.0; 8], 0.1), Trend::Falling);
        assert_eq!(classify_trend(1_000.0, &[1_020.0; 8], 0.1), Trend::Stable);
    }
}
