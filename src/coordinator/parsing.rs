//! Coordinator LLM output parsing.
//!
//! The synthesis prompt asks for a strict three-line format:
//!
//! ```text
//! PUMPS: P1.1, P1.2
//! FREQUENCIES: 48.5, 48.5
//! REASONING: <one sentence>
//! ```
//!
//! Parsing is tolerant of markdown fences, stray whitespace and case, but
//! any structural mismatch is an error — the caller falls back to the
//! deterministic synthesis, never to a guessed command set.

use anyhow::{anyhow, bail, Result};
use regex::Regex;
use std::sync::OnceLock;

use crate::types::normalize_pump_id;

/// Parsed synthesis output: started pumps with frequencies, plus narrative.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSynthesis {
    pub started: Vec<(String, f64)>,
    pub reasoning: String,
}

fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^\s*(PUMPS|FREQUENCIES|REASONING)\s*:\s*(.*)$")
            .expect("static synthesis line pattern is valid")
    })
}

/// Parse a completion into a synthesis result.
pub fn parse_synthesis(text: &str) -> Result<ParsedSynthesis> {
    let mut pumps_line = None;
    let mut freqs_line = None;
    let mut reasoning = None;

    for captures in line_regex().captures_iter(text) {
        let value = captures[2].trim().to_string();
        match captures[1].to_uppercase().as_str() {
            "PUMPS" => pumps_line = Some(value),
            "FREQUENCIES" => freqs_line = Some(value),
            "REASONING" => reasoning = Some(value),
            _ => {}
        }
    }

    let pumps_line = pumps_line.ok_or_else(|| anyhow!("missing PUMPS line"))?;
    let freqs_line = freqs_line.ok_or_else(|| anyhow!("missing FREQUENCIES line"))?;

    // "PUMPS: none" is a valid answer — the validator's min-one-pump pass
    // handles it.
    if pumps_line.eq_ignore_ascii_case("none") {
        return Ok(ParsedSynthesis {
            started: Vec::new(),
            reasoning: reasoning.unwrap_or_default(),
        });
    }

    let pump_ids: Vec<String> = pumps_line
        .split(',')
        .map(|raw| {
            normalize_pump_id(raw).ok_or_else(|| anyhow!("unrecognized pump id '{}'", raw.trim()))
        })
        .collect::<Result<_>>()?;

    let frequencies: Vec<f64> = freqs_line
        .split(',')
        .map(|raw| {
            raw.trim()
                .trim_end_matches("Hz")
                .trim()
                .parse::<f64>()
                .map_err(|_| anyhow!("unparseable frequency '{}'", raw.trim()))
        })
        .collect::<Result<_>>()?;

    if pump_ids.len() != frequencies.len() {
        bail!(
            "{} pumps but {} frequencies",
            pump_ids.len(),
            frequencies.len()
        );
    }
    for &f in &frequencies {
        if !f.is_finite() || f <= 0.0 {
            bail!("frequency {f} is not a positive number");
        }
    }

    Ok(ParsedSynthesis {
        started: pump_ids.into_iter().zip(frequencies).collect(),
        reasoning: reasoning.unwrap_or_default(),
    })
}
