//! Multi-agent system for lift-station operational intelligence
//!
//! ## Per-Tick Fan-Out
//!
//! The decision driver runs all six specialists concurrently against one
//! frozen `AgentContext`; a specialist that misses its deadline is replaced
//! by a neutral stub and never delays the tick.
//!
//! ## Specialists
//!
//! 1. Inflow Forecasting — consumes the shared forecast snapshot
//! 2. Energy Cost — price-window arbitrage
//! 3. Pump Efficiency — candidate subset scoring (coordinator baseline)
//! 4. Water Level Safety — trajectory projection, vetoing
//! 5. Flow Smoothness — outflow step limiting
//! 6. Constraint Compliance — full rule sweep, vetoing

pub mod specialists;

pub use specialists::{
    default_specialists, AgentContext, ComplianceAgent, CostAgent, EfficiencyAgent, InflowAgent,
    SafetyAgent, SmoothnessAgent, Specialist,
};
