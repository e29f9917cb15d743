//! Validated, indexed flow graphs.
//!
//! A [`FlowGraph`] is an arena of [`StepNode`]s addressed by [`StepIndex`].
//! Every string reference of the configuration (next steps, decide targets,
//! pools, queues, formulas) is resolved once by [`FlowGraph::compile`], so the
//! running engine never looks anything up by name.

mod validate;

use std::collections::HashMap;

use flowpool_core::{Assignment, AttributeSpec, Condition, DecisionKind};

use crate::distribution::Distribution;
use crate::resource::{PoolId, QueueId};
use crate::sim::SimRng;

pub use validate::compile_flows;

/// Position of a step inside its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepIndex(pub(crate) usize);

impl StepIndex {
    /// Declaration order of the step.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A compiled flow.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    pub(crate) id: String,
    pub(crate) steps: Vec<StepNode>,
    pub(crate) index: HashMap<String, StepIndex>,
    pub(crate) entry_points: Vec<StepIndex>,
}

impl FlowGraph {
    /// Flow id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// A step by index.
    pub fn step(&self, index: StepIndex) -> Option<&StepNode> {
        self.steps.get(index.0)
    }

    /// A step index by id.
    pub fn lookup(&self, id: &str) -> Option<StepIndex> {
        self.index.get(id).copied()
    }

    /// Create steps nothing routes to; each runs as an arrival source.
    pub fn entry_points(&self) -> &[StepIndex] {
        &self.entry_points
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the flow has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// One compiled step.
#[derive(Debug, Clone)]
pub struct StepNode {
    /// Step id.
    pub id: String,
    /// Retention group.
    pub group_id: Option<String>,
    /// Resolved `next_steps`.
    pub next: Vec<StepIndex>,
    /// Kind-specific plan.
    pub kind: CompiledStep,
}

impl StepNode {
    /// The single successor of a linear step.
    pub fn successor(&self) -> Option<StepIndex> {
        self.next.first().copied()
    }
}

/// Kind-specific, pre-resolved step configuration.
#[derive(Debug, Clone)]
pub enum CompiledStep {
    /// See [`CreatePlan`].
    Create(CreatePlan),
    /// See [`EventPlan`].
    Event(EventPlan),
    /// See [`DecidePlan`].
    Decide(DecidePlan),
    /// See [`AssignPlan`].
    Assign(AssignPlan),
    /// Frees the entity's groups and ends the path.
    Release,
    /// See [`TriggerPlan`].
    Trigger(TriggerPlan),
}

impl CompiledStep {
    /// Lowercase kind name.
    pub fn name(&self) -> &'static str {
        match self {
            CompiledStep::Create(_) => "create",
            CompiledStep::Event(_) => "event",
            CompiledStep::Decide(_) => "decide",
            CompiledStep::Assign(_) => "assign",
            CompiledStep::Release => "release",
            CompiledStep::Trigger(_) => "trigger",
        }
    }
}

/// Entity spawning.
#[derive(Debug, Clone)]
pub struct CreatePlan {
    /// Table of spawned entities.
    pub table: String,
    /// Time between batches when running as a source.
    pub interarrival: Option<Distribution>,
    /// Batch size; one when absent.
    pub batch: Option<Distribution>,
    /// Source budget.
    pub max_entities: Option<u64>,
    /// Attribute generation rules.
    pub attributes: Vec<AttributeSpec>,
    /// Link column to the triggering entity.
    pub foreign_key: Option<String>,
}

/// One resolved resource requirement.
#[derive(Debug, Clone)]
pub struct PlannedRequirement {
    /// Pool to draw from.
    pub pool: PoolId,
    /// Instances needed, sampled per execution.
    pub count: Distribution,
}

/// Resource-holding activity.
#[derive(Debug, Clone)]
pub struct EventPlan {
    /// Processing time.
    pub duration: Distribution,
    /// Requirements, acquired together.
    pub requirements: Vec<PlannedRequirement>,
    /// Queue shared by all requirements.
    pub queue: Option<QueueId>,
}

/// One resolved decide branch.
#[derive(Debug, Clone)]
pub struct PlannedOutcome {
    /// Step to route to.
    pub target: StepIndex,
    /// Normalized probability; zero for condition kinds.
    pub weight: f64,
    /// Conjunction evaluated for condition kinds.
    pub conditions: Vec<Condition>,
}

/// Branch selection.
#[derive(Debug, Clone)]
pub struct DecidePlan {
    /// Policy.
    pub kind: DecisionKind,
    /// Branches in declared order.
    pub outcomes: Vec<PlannedOutcome>,
}

impl DecidePlan {
    /// Picks the next step.
    ///
    /// `holds` evaluates one outcome's conditions. Returns `None` only for
    /// `nway-condition` when no outcome matches.
    pub fn choose<F>(&self, rng: &mut SimRng, mut holds: F) -> Option<StepIndex>
    where
        F: FnMut(&[Condition]) -> bool,
    {
        let [first, rest @ ..] = self.outcomes.as_slice() else {
            return None;
        };
        match self.kind {
            DecisionKind::TwoWayChance => {
                let second = rest.first()?;
                Some(if rng.random_bool(first.weight) {
                    first.target
                } else {
                    second.target
                })
            }
            DecisionKind::TwoWayCondition => {
                let second = rest.first()?;
                Some(if holds(&first.conditions) {
                    first.target
                } else {
                    second.target
                })
            }
            DecisionKind::NWayChance => {
                let u = rng.random_f64();
                let mut cumulative = 0.0;
                for outcome in &self.outcomes {
                    cumulative += outcome.weight;
                    if u < cumulative {
                        return Some(outcome.target);
                    }
                }
                self.outcomes.last().map(|o| o.target)
            }
            DecisionKind::NWayCondition => self
                .outcomes
                .iter()
                .find(|o| holds(&o.conditions))
                .map(|o| o.target),
        }
    }
}

/// Attribute mutations.
#[derive(Debug, Clone)]
pub struct AssignPlan {
    /// Applied in order.
    pub assignments: Vec<Assignment>,
}

/// Related-row generation.
#[derive(Debug, Clone)]
pub struct TriggerPlan {
    /// Table receiving rows.
    pub target_table: String,
    /// Rows per execution.
    pub count: Distribution,
    /// Link column; detected from the schema when absent.
    pub foreign_key: Option<String>,
    /// Attribute generation rules.
    pub attributes: Vec<AttributeSpec>,
    /// Column stamped with the simulated datetime.
    pub sim_time_column: Option<String>,
    /// Column stamped with the wall-clock datetime.
    pub wall_time_column: Option<String>,
}
