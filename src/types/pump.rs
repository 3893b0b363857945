//! Pump types: PumpClass, PumpSpec, PumpCommand

use serde::{Deserialize, Serialize};

// ============================================================================
// Static Pump Data
// ============================================================================

/// Size class of a pump. The station runs four of each.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PumpClass {
    /// Main line pumps, ~4000 m³/h at 50 Hz
    Large,
    /// Trim pumps, ~1500 m³/h at 50 Hz
    Small,
}

impl std::fmt::Display for PumpClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PumpClass::Large => write!(f, "large"),
            PumpClass::Small => write!(f, "small"),
        }
    }
}

/// Static specification for one pump, fixed at commissioning.
///
/// Rated values are at 50 Hz against the rated head. The per-pump efficiency
/// curve lives in `hydraulics::curves`, keyed by `pump_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpSpec {
    /// Canonical id (`P1.1`–`P1.4` large, `P2.1`–`P2.4` small)
    pub pump_id: String,
    pub class: PumpClass,
    /// Shaft power at 50 Hz, rated head (kW)
    pub rated_power_kw: f64,
    /// Flow at 50 Hz, rated head (m³/h)
    pub rated_flow_m3h: f64,
    /// Frequency of best specific energy (Hz)
    pub optimal_frequency_hz: f64,
    /// Design lift (m)
    pub rated_head_m: f64,
}

/// Normalize historical pump identifiers to the canonical `P<class>.<n>` form.
///
/// Historical exports name the same pump `P1L`, `P1.1` or `1.1` depending on
/// the system that wrote them. One mapping, applied at every boundary.
pub fn normalize_pump_id(raw: &str) -> Option<String> {
    let s = raw.trim().to_uppercase();
    if s.is_empty() {
        return None;
    }
    // Already canonical: P1.1 .. P2.4
    if let Some(rest) = s.strip_prefix('P') {
        if let Some((class, unit)) = rest.split_once('.') {
            if matches!(class, "1" | "2") && matches!(unit, "1" | "2" | "3" | "4") {
                return Some(format!("P{class}.{unit}"));
            }
        }
        // Legacy letter form: P1L..P4L large, P1S..P4S small
        if rest.len() == 2 {
            let unit = &rest[0..1];
            let class = match &rest[1..2] {
                "L" => "1",
                "S" => "2",
                _ => return None,
            };
            if matches!(unit, "1" | "2" | "3" | "4") {
                return Some(format!("P{class}.{unit}"));
            }
        }
        return None;
    }
    // Bare numeric form: 1.1 .. 2.4
    if let Some((class, unit)) = s.split_once('.') {
        if matches!(class, "1" | "2") && matches!(unit, "1" | "2" | "3" | "4") {
            return Some(format!("P{class}.{unit}"));
        }
    }
    None
}

// ============================================================================
// Per-Tick Pump Command
// ============================================================================

/// One control command for one pump, emitted per tick.
///
/// Invariants (post-validator): `frequency_hz == 0.0 ⇔ !start`; when started,
/// `47.8 ≤ frequency_hz ≤ 50.0`. Derived fields come from the pump model at
/// emission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpCommand {
    pub pump_id: String,
    pub start: bool,
    #[serde(rename = "frequency")]
    pub frequency_hz: f64,
    pub flow_m3h: f64,
    pub power_kw: f64,
    /// Overall efficiency at the operating point, 0..1
    pub efficiency: f64,
    /// Set when efficiency came from the affinity-only fallback rather
    /// than curve data
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub approximate: bool,
}

impl PumpCommand {
    /// A stopped pump with zeroed derived fields.
    pub fn stopped(pump_id: impl Into<String>) -> Self {
        Self {
            pump_id: pump_id.into(),
            start: false,
            frequency_hz: 0.0,
            flow_m3h: 0.0,
            power_kw: 0.0,
            efficiency: 0.0,
            approximate: false,
        }
    }
}

/// Sum of flow over started pumps (m³/h).
pub fn total_flow_m3h(commands: &[PumpCommand]) -> f64 {
    commands
        .iter()
        .filter(|c| c.start)
        .map(|c| c.flow_m3h)
        .sum()
}

/// Sum of power over started pumps (kW).
pub fn total_power_kw(commands: &[PumpCommand]) -> f64 {
    commands
        .iter()
        .filter(|c| c.start)
        .map(|c| c.power_kw)
        .sum()
}
