//! Tick Pipeline Module
//!
//! The decision driver orchestrates one control tick: forecast, specialist
//! fan-out, coordinator synthesis, validation, metrics, tracker commit.

pub mod driver;

pub use driver::{DecideError, DecisionDriver, DriverStats};
