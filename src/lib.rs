//! LIFT-OS: Lift Station Operational Intelligence
//!
//! Multi-agent decision kernel for a wastewater lift station that stores
//! inflow in a deep tunnel and pumps it uphill to the treatment plant,
//! minimizing spot-market electricity cost under hard hydraulic and
//! operational constraints.
//!
//! ## Architecture
//!
//! - **Specialist Agents**: six concurrent per-tick assessments (inflow,
//!   cost, efficiency, safety, smoothness, compliance)
//! - **Coordinator**: multi-objective synthesis under a strict priority
//!   hierarchy, with verbatim adoption of safety/compliance vetoes
//! - **Validator**: deterministic rewrites that make every decision feasible
//! - **Hydraulics**: pump affinity laws + measured efficiency curves
//! - **Forecast**: GRU inflow model, inference only

pub mod config;
pub mod types;
pub mod constraints;
pub mod hydraulics;
pub mod forecast;
pub mod llm;
pub mod agents;
pub mod coordinator;
pub mod validator;
pub mod metrics;
pub mod pipeline;
pub mod dataset;

// Re-export station configuration
pub use config::StationConfig;

// Re-export commonly used types
pub use types::{
    ConstraintViolation, CostCalculation, Decision, ForecastSnapshot, Priority, PriceScenario,
    PumpCommand, PumpSpec, Recommendation, RuntimeTracker, SystemState, Trend, ViolationType,
};

// Re-export the kernel surface
pub use dataset::{DatasetConfig, HistoricalDataset};
pub use forecast::InflowForecaster;
pub use hydraulics::{PumpModel, PumpModelError};
pub use pipeline::{DecideError, DecisionDriver, DriverStats};
