//! # Flowpool Simulation Engine
//!
//! Deterministic discrete-event simulation of entities moving through
//! process flows and competing for shared, shift-constrained resources.
//!
//! Key properties:
//! - **Reproducible**: same scenario and seed produce the same run
//! - **Single-threaded**: one step handler executes at any simulated instant
//! - **Fast**: logical time jumps straight to the next scheduled event
//!
//! ## Core Components
//!
//! - [`SimWorld`]: the clock and the future-event list
//! - [`Distribution`]: random-variate formulas (`UNIF`, `NORM`, `EXPO`,
//!   `TRIA`, `POIS`, `CONS`, `DISC`)
//! - [`EntityStore`]: entities and their scalar attributes
//! - [`ResourceManager`]: pools, shifts, named queues and group retention
//! - [`FlowGraph`]: validated flows compiled to an indexed step arena
//! - [`SimulationBuilder`]: configure collaborators and run
//!
//! ## Quick Start
//!
//! ```ignore
//! use flowpool_sim::{MemorySink, Scenario, SimulationBuilder};
//!
//! let sink = MemorySink::new();
//! let report = SimulationBuilder::new()
//!     .scenario(Scenario::from_json_str(json)?)
//!     .seed(7)
//!     .sink(sink.clone())
//!     .run()?;
//! assert_eq!(report.processed_event_count as usize, sink.events().len());
//! ```
//!
//! ## Step lifecycle
//!
//! ```text
//!   Arrival ──spawn──> Resume ──instant steps──> Advance ──> ... ──> end
//!                        │                          ^
//!                        ├──Sleep(duration)─────────┤
//!                        └──Wait(resources)──grant──┘
//! ```
//!
//! Per-entity failures (an unresolvable foreign key, a failing expression)
//! are logged with the entity, flow and step ids and end only that path.
//! Configuration errors are reported by [`SimulationBuilder::run`] before any
//! simulated time passes.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// Re-export core types for convenience
pub use flowpool_core::{
    AttributeSpec, ConfigError, DistributionSpec, EntityId, EventId, FlowConfig, ResolutionError,
    ResourceId, ResourcesConfig, Scenario, Schema, SimTime, SimulationConfig, SinkError, Step,
    StepKind, Value,
};

// =============================================================================
// Core Modules
// =============================================================================

/// Clock, future-event list and seeded random source.
pub mod sim;

/// Random-variate formulas.
pub mod distribution;

/// Entity store.
pub mod entity;

/// Resource pools, queues, shifts and groups.
pub mod resource;

/// Flow validation and compiled flow graphs.
pub mod flow;

/// Collaborator traits and in-process implementations.
pub mod providers;

/// Run configuration, driver loop and reporting.
pub mod runner;

mod error;
mod step;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{SimulationError, SimulationResult};

// Sim module re-exports
pub use sim::{Event, SimRng, SimWorld};

pub use distribution::Distribution;
pub use entity::{Entity, EntityStore};
pub use flow::{compile_flows, FlowGraph, StepIndex, StepNode};
pub use resource::{PoolReport, ResourceManager, StalledRequest};

// Provider re-exports
pub use providers::{
    termination_fn, AllocationRecord, AttributeEvaluator, EntityRecord, EventRecord,
    ExpressionEvaluator, FormulaValueGenerator, MemorySink, NullSink, RecordSink, RunStatus,
    TerminationCondition, ValueGenerator,
};

// Runner re-exports
pub use runner::{SimulationBuilder, SimulationReport, StepTrace};
