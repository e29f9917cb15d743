//! Step state machine: one handler per step kind.
//!
//! A handler runs one step of one path and reports what the engine should do
//! next through a [`StepOutcome`]. Handlers never touch the event queue;
//! suspension is expressed as [`StepOutcome::Sleep`] (timed) or
//! [`StepOutcome::Wait`] (resource wait), with the path's [`Phase`] recording
//! where to pick up again.
//!
//! ```text
//!            Event step phases
//!
//!   Ready ──acquire──> Granted ──duration──> Holding ──> Advance
//!     │                   ^
//!     └──queued──> Acquiring ──grant──┘
//! ```

mod assign;
mod create;
mod decide;
mod event;
mod release;
mod trigger;

use flowpool_core::{EntityId, EventId, ResolutionError, Schema, SimTime};
use thiserror::Error;

use crate::entity::EntityStore;
use crate::flow::{CompiledStep, FlowGraph, StepIndex};
use crate::providers::{ExpressionEvaluator, Recorder, ValueGenerator};
use crate::resource::ResourceManager;
use crate::sim::SimRng;

pub(crate) use create::spawn_batch;

/// A per-entity runtime failure. It ends only the affected path.
#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum StepError {
    /// A table, key, expression or value could not be resolved.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// The path refers to an entity the store does not know.
    #[error("unknown entity {0}")]
    MissingEntity(EntityId),
    /// The path is in a phase the step cannot continue from.
    #[error("invalid step state: {0}")]
    InvalidState(String),
}

/// Where a path is inside its current step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Phase {
    /// About to start the step.
    Ready,
    /// Waiting in a resource queue.
    Acquiring { event: EventId },
    /// Resources granted, processing not started yet.
    Granted { event: EventId },
    /// Processing; resumes when the duration has elapsed.
    Holding { event: EventId },
}

/// What a handler asks the engine to do.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StepOutcome {
    /// The step is done; continue with `next`, or end the path on `None`.
    Advance(Option<StepIndex>),
    /// Children were spawned; the current path ends here and each child
    /// starts on every successor of the step.
    Spawned(Vec<EntityId>),
    /// Resume the path at `until` in `phase`.
    Sleep { until: SimTime, phase: Phase },
    /// Park the path in `phase` until a grant wakes it.
    Wait(Phase),
}

/// The part of a path a handler sees.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PathView {
    pub id: u64,
    pub entity: EntityId,
    pub step: StepIndex,
    pub phase: Phase,
}

/// Split borrows of the engine's run state, lent to one handler call.
pub(crate) struct StepContext<'a> {
    pub now: SimTime,
    pub flow: &'a FlowGraph,
    pub schema: &'a Schema,
    pub rng: &'a mut SimRng,
    pub entities: &'a mut EntityStore,
    pub resources: &'a mut ResourceManager,
    pub recorder: &'a mut Recorder,
    pub values: &'a mut dyn ValueGenerator,
    pub evaluator: &'a dyn ExpressionEvaluator,
    pub next_event: &'a mut u64,
}

impl StepContext<'_> {
    pub fn new_event_id(&mut self) -> EventId {
        *self.next_event += 1;
        EventId(*self.next_event)
    }
}

/// Runs the current step of `path`.
pub(crate) fn execute(
    ctx: &mut StepContext<'_>,
    path: &PathView,
) -> Result<StepOutcome, StepError> {
    let flow = ctx.flow;
    let node = flow
        .step(path.step)
        .ok_or_else(|| StepError::InvalidState(format!("no step {}", path.step.index())))?;
    if ctx.entities.get(path.entity).is_none() {
        return Err(StepError::MissingEntity(path.entity));
    }

    match &node.kind {
        CompiledStep::Create(plan) => create::execute(ctx, node, plan, path),
        CompiledStep::Event(plan) => event::execute(ctx, node, plan, path),
        CompiledStep::Decide(plan) => decide::execute(ctx, node, plan, path),
        CompiledStep::Assign(plan) => assign::execute(ctx, node, plan, path),
        CompiledStep::Release => release::execute(ctx, node, path),
        CompiledStep::Trigger(plan) => trigger::execute(ctx, node, plan, path),
    }
}
