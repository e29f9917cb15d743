use std::collections::BTreeMap;

use flowpool_core::{EventId, Value};
use tracing::debug;

use super::{PathView, Phase, StepContext, StepError, StepOutcome};
use crate::flow::{EventPlan, StepNode};
use crate::resource::{Acquisition, Need, Request};

pub(super) fn execute(
    ctx: &mut StepContext<'_>,
    node: &StepNode,
    plan: &EventPlan,
    path: &PathView,
) -> Result<StepOutcome, StepError> {
    match path.phase {
        Phase::Ready => acquire(ctx, node, plan, path),
        Phase::Granted { event } => start(ctx, plan, event),
        Phase::Holding { event } => finish(ctx, node, event, path),
        Phase::Acquiring { event } => Err(StepError::InvalidState(format!(
            "event {event} resumed before its resources were granted"
        ))),
    }
}

fn acquire(
    ctx: &mut StepContext<'_>,
    node: &StepNode,
    plan: &EventPlan,
    path: &PathView,
) -> Result<StepOutcome, StepError> {
    let needs = plan
        .requirements
        .iter()
        .map(|r| {
            Ok(Need {
                pool: r.pool,
                count: r.count.sample_count(ctx.rng)?,
            })
        })
        .collect::<Result<Vec<_>, StepError>>()?;

    let priority = plan
        .queue
        .and_then(|q| ctx.resources.queue(q))
        .and_then(|q| q.priority_attribute())
        .and_then(|attribute| ctx.entities.get_attribute(path.entity, attribute))
        .cloned();

    let event = ctx.new_event_id();
    let request = Request {
        event,
        entity: path.entity,
        path: path.id,
        group: node.group_id.clone(),
        needs,
        queue: plan.queue,
        priority,
        flow: ctx.flow.id().to_string(),
        step: node.id.clone(),
    };
    match ctx.resources.acquire(request, ctx.now) {
        Acquisition::Granted => match start(ctx, plan, event) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                ctx.resources.complete(event, false, ctx.now);
                Err(err)
            }
        },
        Acquisition::Queued => Ok(StepOutcome::Wait(Phase::Acquiring { event })),
    }
}

fn start(
    ctx: &mut StepContext<'_>,
    plan: &EventPlan,
    event: EventId,
) -> Result<StepOutcome, StepError> {
    let duration = plan.duration.sample_duration(ctx.rng)?;
    Ok(StepOutcome::Sleep {
        until: ctx.now + duration,
        phase: Phase::Holding { event },
    })
}

/// Ends the hold. Resources are retained when the next step shares this
/// step's group, otherwise released together with the group.
fn finish(
    ctx: &mut StepContext<'_>,
    node: &StepNode,
    event: EventId,
    path: &PathView,
) -> Result<StepOutcome, StepError> {
    let next = node.successor();
    let retain = node.group_id.is_some()
        && next
            .and_then(|n| ctx.flow.step(n))
            .is_some_and(|n| n.group_id == node.group_id);

    let allocation = ctx
        .resources
        .complete(event, retain, ctx.now)
        .ok_or_else(|| StepError::InvalidState(format!("no allocation for event {event}")))?;

    let graph = ctx.flow;
    ctx.recorder.event_processed(
        graph.id(),
        event,
        path.entity,
        allocation.acquired_at,
        ctx.now,
    );

    let wait = allocation.acquired_at - allocation.requested_at;
    for resource in allocation.resources() {
        let Some((table, resource_type)) = ctx.resources.describe(resource) else {
            continue;
        };
        let mut extra = BTreeMap::new();
        extra.insert("resource_type".to_string(), Value::from(resource_type));
        extra.insert("step".to_string(), Value::from(node.id.as_str()));
        extra.insert("wait_minutes".to_string(), Value::Float(wait));
        if let Some(group) = &allocation.group {
            extra.insert("group".to_string(), Value::from(group.as_str()));
        }
        ctx.recorder.resource_allocated(
            event,
            table,
            resource,
            (allocation.acquired_at, ctx.now),
            &extra,
        );
    }

    debug!(
        entity = %path.entity,
        event = %event,
        step = %node.id,
        retained = retain,
        "event finished"
    );
    Ok(StepOutcome::Advance(next))
}
