//! Shared data structures for the lift-station decision kernel
//!
//! One module per stage of the tick pipeline:
//! - `state`: SystemState snapshot the driver receives
//! - `pump`: static PumpSpec and per-tick PumpCommand
//! - `forecast`: ForecastSnapshot shared by all specialists
//! - `recommendation`: specialist agent output
//! - `decision`: the committed tick output and its cost metrics
//! - `tracker`: RuntimeTracker, the only mutable process state

mod state;
mod pump;
mod forecast;
mod recommendation;
mod decision;
mod tracker;

pub use state::*;
pub use pump::*;
pub use forecast::*;
pub use recommendation::*;
pub use decision::*;
pub use tracker::*;
