//! Hydraulics Module
//!
//! Deterministic pump physics for the decision kernel. All math here is pure
//! — no ML, no I/O — and the model is read-only after initialization, so it
//! is shared freely across the per-tick agent fan-out.
//!
//! - `pump_model`: affinity laws + efficiency curves → operating points
//! - `curves`: commissioning data for the eight station pumps

pub mod curves;
pub mod pump_model;

pub use curves::{station_curves, station_pumps, EfficiencyCurve};
pub use pump_model::{PumpModel, PumpModelError, PumpPerformance};
