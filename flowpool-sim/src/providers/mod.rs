//! Collaborator interfaces and their in-process implementations.
//!
//! The engine talks to the outside world only through these traits: output
//! records go to a [`RecordSink`], new attribute values come from a
//! [`ValueGenerator`], computed scalars from an [`ExpressionEvaluator`], and
//! sources stop early when a [`TerminationCondition`] says so.

mod expression;
mod sink;
mod termination;
mod values;

pub use expression::{AttributeEvaluator, ExpressionEvaluator};
pub use sink::{AllocationRecord, EntityRecord, EventRecord, MemorySink, NullSink, RecordSink};
pub use termination::{termination_fn, RunStatus, TerminationCondition};
pub use values::{FormulaValueGenerator, ValueGenerator};

pub(crate) use sink::Recorder;
