//! LLM Backend Module
//!
//! ## Architecture
//!
//! - **Template mode** (default): deterministic template narratives, zero
//!   network dependency. The kernel is fully functional in this mode and the
//!   regression suite runs against it.
//!
//! - **Provider mode** (`llm.enabled = true` + API key in the environment):
//!   specialist reasoning strings and, optionally, coordinator synthesis go
//!   through an OpenAI-compatible provider via `reqwest`.
//!
//! Model output is narrative only. The single place a completion is parsed
//! for control values is the coordinator's synthesis path, and any parse
//! failure there falls back to the deterministic algorithm.

mod client;

pub use client::{LlmClient, LlmError};

use tracing::warn;

use crate::config::LlmConfig;

/// System prompt shared by every specialist narrative call.
pub const SPECIALIST_SYSTEM_PROMPT: &str = "You are an operations engineer at a wastewater lift \
station that stores inflow in a deep tunnel and pumps it uphill to the treatment plant. Write a \
short plain-language justification (2-3 sentences) for the assessment data you are given. Do not \
invent numbers; use only the values provided. No markdown, no preamble.";

/// Narrative backend handed to the agents and the coordinator.
#[derive(Debug, Clone)]
pub enum LlmBackend {
    /// Template mode — callers use their deterministic narrative.
    Disabled,
    Http(LlmClient),
}

impl LlmBackend {
    /// Build from config. Missing key or disabled flag yields template mode.
    pub fn from_config(cfg: &LlmConfig, timeout_ms: u64) -> Self {
        if !cfg.enabled {
            return Self::Disabled;
        }
        let Ok(api_key) = std::env::var(&cfg.api_key_env) else {
            warn!(
                var = %cfg.api_key_env,
                "LLM enabled but API key variable unset — falling back to template narratives"
            );
            return Self::Disabled;
        };
        match LlmClient::new(&cfg.base_url, &api_key, &cfg.model, timeout_ms) {
            Ok(client) => Self::Http(client),
            Err(e) => {
                warn!(error = %e, "Failed to build LLM client — falling back to template narratives");
                Self::Disabled
            }
        }
    }

    /// Generate a narrative, or `None` when the caller should use its
    /// template. Transport errors are logged and swallowed here — reasoning
    /// text is never worth failing a tick over.
    pub async fn narrative(&self, system: &str, user: &str) -> Option<String> {
        match self {
            Self::Disabled => None,
            Self::Http(client) => match client.generate(system, user, 220, 0.3).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(error = %e, "LLM narrative call failed — using template");
                    None
                }
            },
        }
    }

    /// Raw completion for the coordinator's synthesis path. Unlike
    /// `narrative`, the error propagates so the coordinator can record the
    /// fallback in `conflicts_resolved`.
    pub async fn completion(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<Option<String>, LlmError> {
        match self {
            Self::Disabled => Ok(None),
            Self::Http(client) => client.generate(system, user, max_tokens, 0.1).await.map(Some),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}
