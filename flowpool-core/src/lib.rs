//! # flowpool-core
//!
//! Data model shared between the flowpool simulation engine and its
//! collaborators.
//!
//! - **Configuration**: [`FlowConfig`], [`Step`], [`StepKind`] and per-kind
//!   configs, [`ResourcesConfig`], [`Schema`], bundled as a [`Scenario`]
//! - **Values and time**: [`Value`], [`Comparison`], [`SimTime`]
//! - **Identifiers**: [`EntityId`], [`EventId`], [`ResourceId`]
//! - **Errors**: [`ConfigError`], [`ResolutionError`], [`SinkError`]
//!
//! Every configuration type is plain serde data. Validation and indexing
//! happen in `flowpool-sim` before a run starts.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod distribution;
mod error;
mod flow;
mod resource;
mod scenario;
mod schema;
mod time;
mod types;
mod value;

pub use distribution::DistributionSpec;
pub use error::{ConfigError, ResolutionError, SinkError};
pub use flow::{
    AssignConfig, AssignValue, Assignment, AttributeSpec, Condition, CreateConfig, DecideConfig,
    DecisionKind, EventConfig, FlowConfig, Operand, Outcome, Step, StepKind, TriggerConfig,
};
pub use resource::{
    QueueConfig, QueueDiscipline, ResourcePoolConfig, ResourceRequirement, ResourcesConfig,
    ShiftGroup, ShiftWindow,
};
pub use scenario::{Scenario, SimulationConfig};
pub use schema::{ForeignKey, Schema, TableSchema};
pub use time::SimTime;
pub use types::{EntityId, EventId, ResourceId};
pub use value::{Comparison, Value};
