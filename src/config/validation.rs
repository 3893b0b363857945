//! Startup sanity checks over the loaded configuration.
//!
//! Misconfiguration is reported, not fatal: the kernel can always run on the
//! validated parts, and a dead process helps nobody at 03:00. Each finding is
//! returned so the binary can decide how loudly to complain.

use super::StationConfig;
use tracing::warn;

/// One configuration finding, human-readable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFinding(pub String);

impl std::fmt::Display for ConfigFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a loaded config, logging each finding at warn level.
pub fn validate(config: &StationConfig) -> Vec<ConfigFinding> {
    let mut findings = Vec::new();

    if config.deadlines.agent_ms == 0 {
        findings.push(ConfigFinding(
            "deadlines.agent_ms is 0 — every specialist will be stubbed".to_string(),
        ));
    }
    if config.deadlines.coordinator_ms < config.deadlines.agent_ms {
        findings.push(ConfigFinding(format!(
            "deadlines.coordinator_ms ({}) is below deadlines.agent_ms ({})",
            config.deadlines.coordinator_ms, config.deadlines.agent_ms
        )));
    }

    if config.llm.enabled && std::env::var(&config.llm.api_key_env).is_err() {
        findings.push(ConfigFinding(format!(
            "llm.enabled is set but ${} is not in the environment — narratives will fall back to templates",
            config.llm.api_key_env
        )));
    }

    let s = &config.synthesis;
    let weight_sum = s.flow_match_weight + s.efficiency_weight;
    if !(0.99..=1.01).contains(&weight_sum) {
        findings.push(ConfigFinding(format!(
            "synthesis weights sum to {weight_sum:.3}, expected 1.0"
        )));
    }
    if s.price_spread_ratio_high <= 1.0 {
        findings.push(ConfigFinding(format!(
            "synthesis.price_spread_ratio_high ({}) must exceed 1.0",
            s.price_spread_ratio_high
        )));
    }

    if config.forecast.storm_peak_ratio <= 1.0 {
        findings.push(ConfigFinding(format!(
            "forecast.storm_peak_ratio ({}) must exceed 1.0",
            config.forecast.storm_peak_ratio
        )));
    }

    for finding in &findings {
        warn!(finding = %finding, "Config validation finding");
    }
    findings
}
