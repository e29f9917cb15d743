//! Pre-run validation and compilation of flow configuration.

use std::collections::{HashMap, HashSet};

use flowpool_core::{
    ConfigError, DecideConfig, DistributionSpec, EventConfig, FlowConfig, Step, StepKind,
};
use tracing::warn;

use super::{
    AssignPlan, CompiledStep, CreatePlan, DecidePlan, EventPlan, FlowGraph, PlannedOutcome,
    PlannedRequirement, StepIndex, StepNode, TriggerPlan,
};
use crate::distribution::Distribution;
use crate::resource::ResourceManager;

/// Validates and compiles every flow. Any error aborts the run before it
/// starts.
pub fn compile_flows(
    flows: &[FlowConfig],
    resources: &ResourceManager,
) -> Result<Vec<FlowGraph>, ConfigError> {
    let mut seen = HashSet::new();
    flows
        .iter()
        .map(|flow| {
            if !seen.insert(flow.id.as_str()) {
                return Err(ConfigError::DuplicateFlow(flow.id.clone()));
            }
            compile(flow, resources)
        })
        .collect()
}

struct Ctx<'a> {
    flow: &'a FlowConfig,
    step: &'a Step,
}

impl Ctx<'_> {
    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidStep {
            flow: self.flow.id.clone(),
            step: self.step.id.clone(),
            reason: reason.into(),
        }
    }

    fn distribution(&self, field: &str, spec: &DistributionSpec) -> Result<Distribution, ConfigError> {
        let distribution = Distribution::parse(spec)?;
        if !distribution.is_numeric() {
            return Err(self.invalid(format!("`{field}` must produce numbers, got `{spec}`")));
        }
        Ok(distribution)
    }

    fn max_next(&self, max: usize) -> Result<(), ConfigError> {
        if self.step.next_steps.len() > max {
            return Err(self.invalid(format!(
                "{} step takes at most {max} next step(s), got {}",
                self.step.kind.name(),
                self.step.next_steps.len()
            )));
        }
        Ok(())
    }
}

fn compile(flow: &FlowConfig, resources: &ResourceManager) -> Result<FlowGraph, ConfigError> {
    let mut index = HashMap::with_capacity(flow.steps.len());
    for (i, step) in flow.steps.iter().enumerate() {
        if index.insert(step.id.clone(), StepIndex(i)).is_some() {
            return Err(ConfigError::DuplicateStep {
                flow: flow.id.clone(),
                step: step.id.clone(),
            });
        }
    }

    let resolve = |step: &Step, target: &str| {
        index
            .get(target)
            .copied()
            .ok_or_else(|| ConfigError::UnknownStep {
                flow: flow.id.clone(),
                step: step.id.clone(),
                target: target.to_string(),
            })
    };

    let mut incoming = vec![false; flow.steps.len()];
    let mut steps = Vec::with_capacity(flow.steps.len());
    for step in &flow.steps {
        for target in step.references() {
            incoming[resolve(step, target)?.0] = true;
        }
        let next = step
            .next_steps
            .iter()
            .map(|t| resolve(step, t))
            .collect::<Result<Vec<_>, _>>()?;

        let ctx = Ctx { flow, step };
        let kind = match &step.kind {
            StepKind::Create(create) => {
                if step.next_steps.is_empty() {
                    return Err(ctx.invalid("create step needs at least one next step"));
                }
                let table = create
                    .entity_table
                    .clone()
                    .or_else(|| flow.entity_table.clone())
                    .ok_or_else(|| ctx.invalid("no entity table on the step or the flow"))?;
                CompiledStep::Create(CreatePlan {
                    table,
                    interarrival: create
                        .interarrival_time
                        .as_ref()
                        .map(|d| ctx.distribution("interarrival_time", d))
                        .transpose()?,
                    batch: create
                        .entities_per_arrival
                        .as_ref()
                        .map(|d| ctx.distribution("entities_per_arrival", d))
                        .transpose()?,
                    max_entities: create.max_entities,
                    attributes: create.attributes.clone(),
                    foreign_key: create.foreign_key.clone(),
                })
            }
            StepKind::Event(event) => {
                ctx.max_next(1)?;
                CompiledStep::Event(event_plan(&ctx, event, resources)?)
            }
            StepKind::Decide(decide) => {
                if !step.next_steps.is_empty() {
                    return Err(ctx.invalid("decide step routes through outcomes, not next_steps"));
                }
                let outcomes = decide
                    .outcomes
                    .iter()
                    .map(|o| resolve(step, &o.next_step_id))
                    .collect::<Result<Vec<_>, _>>()?;
                CompiledStep::Decide(decide_plan(&ctx, decide, outcomes)?)
            }
            StepKind::Assign(assign) => {
                ctx.max_next(1)?;
                if assign.assignments.is_empty() {
                    return Err(ctx.invalid("assign step needs at least one assignment"));
                }
                CompiledStep::Assign(AssignPlan {
                    assignments: assign.assignments.clone(),
                })
            }
            StepKind::Release => {
                ctx.max_next(0)?;
                CompiledStep::Release
            }
            StepKind::Trigger(trigger) => {
                ctx.max_next(1)?;
                CompiledStep::Trigger(TriggerPlan {
                    target_table: trigger.target_table.clone(),
                    count: ctx.distribution("count", &trigger.count)?,
                    foreign_key: trigger.foreign_key.clone(),
                    attributes: trigger.attributes.clone(),
                    sim_time_column: trigger.sim_time_column.clone(),
                    wall_time_column: trigger.wall_time_column.clone(),
                })
            }
        };

        steps.push(StepNode {
            id: step.id.clone(),
            group_id: step.group_id.clone(),
            next,
            kind,
        });
    }

    let mut entry_points = Vec::new();
    for (i, node) in steps.iter().enumerate() {
        let CompiledStep::Create(plan) = &node.kind else {
            continue;
        };
        if incoming[i] {
            continue;
        }
        if plan.interarrival.is_none() {
            return Err(ConfigError::InvalidStep {
                flow: flow.id.clone(),
                step: node.id.clone(),
                reason: "arrival source needs an interarrival_time".to_string(),
            });
        }
        entry_points.push(StepIndex(i));
    }
    if entry_points.is_empty() {
        warn!(flow = %flow.id, "flow has no entry points and will create no entities");
    }

    Ok(FlowGraph {
        id: flow.id.clone(),
        steps,
        index,
        entry_points,
    })
}

fn event_plan(
    ctx: &Ctx<'_>,
    event: &EventConfig,
    resources: &ResourceManager,
) -> Result<EventPlan, ConfigError> {
    let duration = ctx.distribution("duration", &event.duration)?;

    let mut queue_name: Option<&str> = None;
    let mut requirements = Vec::with_capacity(event.resources.len());
    for requirement in &event.resources {
        let pool = resources
            .pool_id(&requirement.table, &requirement.resource_type)
            .ok_or_else(|| ConfigError::UnknownPool {
                flow: ctx.flow.id.clone(),
                step: ctx.step.id.clone(),
                table: requirement.table.clone(),
                resource_type: requirement.resource_type.clone(),
            })?;
        if let Some(name) = requirement.queue.as_deref() {
            match queue_name {
                Some(existing) if existing != name => {
                    return Err(ctx.invalid(format!(
                        "requirements name different queues `{existing}` and `{name}`"
                    )));
                }
                _ => queue_name = Some(name),
            }
        }
        requirements.push(PlannedRequirement {
            pool,
            count: ctx.distribution("count", &requirement.count)?,
        });
    }

    let queue = queue_name
        .map(|name| {
            resources
                .queue_id(name)
                .ok_or_else(|| ConfigError::UnknownQueue {
                    flow: ctx.flow.id.clone(),
                    step: ctx.step.id.clone(),
                    queue: name.to_string(),
                })
        })
        .transpose()?;

    Ok(EventPlan {
        duration,
        requirements,
        queue,
    })
}

fn decide_plan(
    ctx: &Ctx<'_>,
    decide: &DecideConfig,
    targets: Vec<StepIndex>,
) -> Result<DecidePlan, ConfigError> {
    let kind = decide.decision_type;
    let n = decide.outcomes.len();
    if kind.is_two_way() && n != 2 {
        return Err(ctx.invalid(format!("{kind} needs exactly 2 outcomes, got {n}")));
    }
    if !kind.is_two_way() && n < 2 {
        return Err(ctx.invalid(format!("{kind} needs at least 2 outcomes, got {n}")));
    }

    let mut weights = vec![0.0; n];
    if kind.is_chance() {
        for (i, outcome) in decide.outcomes.iter().enumerate() {
            match outcome.probability {
                Some(p) if p.is_finite() && p >= 0.0 => weights[i] = p,
                Some(p) => {
                    return Err(ctx.invalid(format!("outcome {} has invalid probability {p}", i + 1)))
                }
                None => return Err(ctx.invalid(format!("outcome {} has no probability", i + 1))),
            }
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(ctx.invalid("outcome probabilities sum to zero"));
        }
        weights.iter_mut().for_each(|w| *w /= total);
    } else if kind.is_two_way() && decide.outcomes[0].conditions.is_empty() {
        return Err(ctx.invalid("2way-condition needs conditions on the first outcome"));
    }

    let outcomes = decide
        .outcomes
        .iter()
        .zip(targets)
        .zip(weights)
        .map(|((outcome, target), weight)| PlannedOutcome {
            target,
            weight,
            conditions: outcome.conditions.clone(),
        })
        .collect();
    Ok(DecidePlan { kind, outcomes })
}
