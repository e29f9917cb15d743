use flowpool_core::{Condition, DecisionKind, Operand, ResolutionError};
use tracing::warn;

use super::{PathView, StepContext, StepError, StepOutcome};
use crate::entity::Entity;
use crate::flow::{DecidePlan, StepNode};
use crate::providers::ExpressionEvaluator;

pub(super) fn execute(
    ctx: &mut StepContext<'_>,
    node: &StepNode,
    plan: &DecidePlan,
    path: &PathView,
) -> Result<StepOutcome, StepError> {
    let entity = ctx
        .entities
        .get(path.entity)
        .ok_or(StepError::MissingEntity(path.entity))?;
    let evaluator = ctx.evaluator;

    let mut failure = None;
    let chosen = plan.choose(ctx.rng, |conditions| {
        if failure.is_some() {
            return false;
        }
        holds(conditions, entity, evaluator).unwrap_or_else(|err| {
            failure = Some(err);
            false
        })
    });
    if let Some(err) = failure {
        return Err(err.into());
    }

    if chosen.is_none() && plan.kind == DecisionKind::NWayCondition {
        warn!(
            entity = %path.entity,
            flow = %ctx.flow.id(),
            step = %node.id,
            "no outcome matched; path ends"
        );
    }
    Ok(StepOutcome::Advance(chosen))
}

/// Whether every condition holds for `entity`. A missing attribute makes its
/// condition false; expression failures propagate.
fn holds(
    conditions: &[Condition],
    entity: &Entity,
    evaluator: &dyn ExpressionEvaluator,
) -> Result<bool, ResolutionError> {
    for condition in conditions {
        let subject = match &condition.subject {
            Operand::Attribute(name) => match entity.attribute(name) {
                Some(value) => value.clone(),
                None => return Ok(false),
            },
            Operand::Expression(expr) => evaluator.evaluate(expr, entity)?,
        };
        if !condition.operator.apply(&subject, &condition.value) {
            return Ok(false);
        }
    }
    Ok(true)
}
