//! Station Configuration - operator-tunable values as a TOML tree
//!
//! Every process-scoped tunable is a field here with a `Default` impl
//! matching the commissioning values, so behaviour is unchanged when no
//! config file is present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::types::PriceScenario;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a station deployment.
///
/// Load with `StationConfig::load()` which searches:
/// 1. `$LIFTOS_CONFIG` env var
/// 2. `./station_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StationConfig {
    /// Station identification
    #[serde(default)]
    pub station: StationInfo,

    /// Active price regime
    #[serde(default)]
    pub price_scenario: PriceScenario,

    /// Per-stage deadlines
    #[serde(default)]
    pub deadlines: DeadlineConfig,

    /// LLM provider for narrative generation
    #[serde(default)]
    pub llm: LlmConfig,

    /// Startup artifact paths
    #[serde(default)]
    pub paths: PathConfig,

    /// Forecaster tuning
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Deterministic synthesis tuning
    #[serde(default)]
    pub synthesis: SynthesisConfig,
}

/// Station identity, used in logs and the decision trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationInfo {
    pub name: String,
    pub operator: String,
}

impl Default for StationInfo {
    fn default() -> Self {
        Self {
            name: "unnamed-station".to_string(),
            operator: "unknown".to_string(),
        }
    }
}

/// Deadlines for the suspension points of a tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineConfig {
    /// Per-specialist deadline; a miss yields the LOW/0.0 stub (ms)
    pub agent_ms: u64,
    /// Coordinator LLM synthesis deadline before deterministic fallback (ms)
    pub coordinator_ms: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            agent_ms: 8_000,
            coordinator_ms: 20_000,
        }
    }
}

/// LLM provider settings. Narrative generation only; no control value is
/// ever parsed out of model output except in the coordinator's synthesis
/// path, which falls back to the deterministic algorithm on any mismatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Master switch. Disabled builds use template narratives.
    pub enabled: bool,
    /// OpenAI-compatible chat completions base URL
    pub base_url: String,
    /// Model identifier passed through to the provider
    pub model: String,
    /// Environment variable holding the API key. The key itself never
    /// appears in the config file.
    pub api_key_env: String,
    /// Whether the coordinator may attempt LLM synthesis (agents always may
    /// when `enabled`)
    pub coordinator_synthesis: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "LIFTOS_LLM_API_KEY".to_string(),
            coordinator_synthesis: false,
        }
    }
}

/// Read-only artifacts bound at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Forecaster checkpoint (JSON)
    pub forecaster_model: PathBuf,
    /// Historical dataset (CSV)
    pub dataset: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            forecaster_model: PathBuf::from("models/inflow_gru.json"),
            dataset: PathBuf::from("data/station_history.csv"),
        }
    }
}

/// Forecaster post-processing thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Inflow above this is a storm regardless of ratios (m³ per 15 min)
    pub storm_inflow_m3_per_15min: f64,
    /// Peak-to-median ratio that flags a storm
    pub storm_peak_ratio: f64,
    /// Relative trend change over the next 2 h that counts as rising/falling
    pub trend_threshold: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            storm_inflow_m3_per_15min: 4_000.0,
            storm_peak_ratio: 2.5,
            trend_threshold: 0.10,
        }
    }
}

/// Weights for the deterministic candidate scoring in the efficiency
/// specialist and the coordinator fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    pub flow_match_weight: f64,
    pub efficiency_weight: f64,
    /// Price max/min ratio over the 24 h window that raises the cost agent
    /// to HIGH
    pub price_spread_ratio_high: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            flow_match_weight: 0.55,
            efficiency_weight: 0.45,
            price_spread_ratio_high: 10.0,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Errors while reading or parsing a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl StationConfig {
    /// Load configuration using the standard search order:
    /// 1. `$LIFTOS_CONFIG` environment variable
    /// 2. `./station_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("LIFTOS_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), station = %config.station.name, "Loaded station config from LIFTOS_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from LIFTOS_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "LIFTOS_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("station_config.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(station = %config.station.name, "Loaded station config from ./station_config.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./station_config.toml, using defaults");
                }
            }
        }

        info!("No station_config.toml found — using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
