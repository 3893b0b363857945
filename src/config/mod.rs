//! Station Configuration Module
//!
//! Process-scoped configuration loaded once at startup from TOML, replacing
//! hardcoded tunables with operator-set values.
//!
//! ## Loading Order
//!
//! 1. `LIFTOS_CONFIG` environment variable (path to TOML file)
//! 2. `station_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(StationConfig::load());
//!
//! // Anywhere in the codebase:
//! let deadline = config::get().deadlines.agent_ms;
//! ```

mod station_config;
pub mod validation;

pub use station_config::*;

use std::sync::OnceLock;

/// Global station configuration, initialized once at startup.
static STATION_CONFIG: OnceLock<StationConfig> = OnceLock::new();

/// Initialize the global station configuration.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(config: StationConfig) {
    if STATION_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global station configuration.
///
/// Panics if `init()` has not been called. A missing config is a fatal
/// startup error, not a recoverable condition.
pub fn get() -> &'static StationConfig {
    STATION_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the config has been initialized.
///
/// Useful for tests and optional config paths.
pub fn is_initialized() -> bool {
    STATION_CONFIG.get().is_some()
}

/// Snapshot of the active config, or defaults when not initialized.
///
/// Components that may run before `init()` (unit tests, tooling) read
/// through this instead of `get()`.
pub fn get_or_default() -> StationConfig {
    STATION_CONFIG.get().cloned().unwrap_or_default()
}
