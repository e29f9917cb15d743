//! Simulation runner.
//!
//! ## Submodules
//!
//! - `builder` - SimulationBuilder for configuring a run
//! - `engine` - The driver loop over the future-event list
//! - `report` - SimulationReport and StepTrace types

pub mod builder;
pub(crate) mod engine;
pub mod report;

pub use builder::SimulationBuilder;
pub use report::{SimulationReport, StepTrace};
