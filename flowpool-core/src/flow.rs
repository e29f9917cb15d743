//! Declarative flow configuration.
//!
//! A flow is a graph of steps. Steps reference each other by id through
//! `next_steps` (and, for Decide, through outcome targets), so cycles are
//! expressed naturally. The engine validates and indexes these records before
//! a run starts.
//!
//! A step is written as one JSON object whose `type` selects the kind:
//!
//! ```text
//! { "id": "treat", "type": "event", "group_id": "bed",
//!   "duration": "TRIA(10, 20, 45)",
//!   "resources": [ { "table": "staff", "type": "nurse", "count": 1 } ],
//!   "next_steps": ["discharge"] }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Comparison, DistributionSpec, ResourceRequirement, Value};

/// A named process graph that entities move through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Unique flow id.
    pub id: String,
    /// Default entity table for Create steps that do not name one.
    #[serde(default)]
    pub entity_table: Option<String>,
    /// All nodes of the flow, in declaration order.
    pub steps: Vec<Step>,
}

/// One node of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step id, unique within its flow.
    pub id: String,
    /// Ordered successors. Empty for terminal steps.
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// Resource retention group shared with neighbouring steps.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Kind-specific configuration.
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    /// Every step id this step can route to, including Decide outcomes.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        let outcomes: &[Outcome] = match &self.kind {
            StepKind::Decide(decide) => decide.outcomes.as_slice(),
            _ => &[],
        };
        self.next_steps
            .iter()
            .map(String::as_str)
            .chain(outcomes.iter().map(|o| o.next_step_id.as_str()))
    }
}

/// Closed set of step kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepKind {
    /// Spawns entities, either as an arrival source or from a triggering entity.
    Create(CreateConfig),
    /// Holds resources for a sampled duration.
    Event(EventConfig),
    /// Chooses the next step.
    Decide(DecideConfig),
    /// Mutates entity attributes.
    Assign(AssignConfig),
    /// Frees retained group resources and ends the path.
    Release,
    /// Generates related-table rows for the entity.
    Trigger(TriggerConfig),
}

impl StepKind {
    /// Lowercase kind name, as written in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Create(_) => "create",
            StepKind::Event(_) => "event",
            StepKind::Decide(_) => "decide",
            StepKind::Assign(_) => "assign",
            StepKind::Release => "release",
            StepKind::Trigger(_) => "trigger",
        }
    }
}

fn one() -> DistributionSpec {
    DistributionSpec::Number(1.0)
}

/// A value-generation rule for one attribute.
///
/// `generator` is opaque to the engine and interpreted by the value
/// generation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Attribute (column) name.
    pub name: String,
    /// Generation rule text.
    pub generator: String,
}

/// Create step configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateConfig {
    /// Table of the spawned entities. Falls back to the flow's table.
    #[serde(default)]
    pub entity_table: Option<String>,
    /// Time between arrival batches. Required for arrival sources.
    #[serde(default)]
    pub interarrival_time: Option<DistributionSpec>,
    /// Batch size per arrival (or per trigger). Defaults to one.
    #[serde(default)]
    pub entities_per_arrival: Option<DistributionSpec>,
    /// Stop the source after this many entities.
    #[serde(default)]
    pub max_entities: Option<u64>,
    /// Attribute generation rules for spawned entities.
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,
    /// Column linking children to the triggering entity. Auto-detected when absent.
    #[serde(default)]
    pub foreign_key: Option<String>,
}

/// Event step configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Processing time once resources are held.
    pub duration: DistributionSpec,
    /// Resources needed, acquired atomically.
    #[serde(default)]
    pub resources: Vec<ResourceRequirement>,
}

/// Decision policy of a Decide step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionKind {
    /// Bernoulli draw on the first outcome's probability.
    #[serde(rename = "2way-chance")]
    TwoWayChance,
    /// First outcome when its conditions hold, else the second.
    #[serde(rename = "2way-condition")]
    TwoWayCondition,
    /// Cumulative draw over normalized outcome probabilities.
    #[serde(rename = "nway-chance")]
    NWayChance,
    /// First outcome, in order, whose conditions hold.
    #[serde(rename = "nway-condition")]
    NWayCondition,
}

impl DecisionKind {
    /// Whether outcomes are chosen by probability.
    pub fn is_chance(self) -> bool {
        matches!(self, DecisionKind::TwoWayChance | DecisionKind::NWayChance)
    }

    /// Whether the kind takes exactly two outcomes.
    pub fn is_two_way(self) -> bool {
        matches!(
            self,
            DecisionKind::TwoWayChance | DecisionKind::TwoWayCondition
        )
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecisionKind::TwoWayChance => "2way-chance",
            DecisionKind::TwoWayCondition => "2way-condition",
            DecisionKind::NWayChance => "nway-chance",
            DecisionKind::NWayCondition => "nway-condition",
        })
    }
}

/// Decide step configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecideConfig {
    /// Decision policy.
    pub decision_type: DecisionKind,
    /// Candidate branches, in declared order.
    pub outcomes: Vec<Outcome>,
}

/// One branch of a Decide step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Step to route to when chosen.
    pub next_step_id: String,
    /// Branch probability for chance kinds.
    #[serde(default)]
    pub probability: Option<f64>,
    /// Conjunction of predicates for condition kinds.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Left-hand side of a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    /// A named entity attribute.
    Attribute(String),
    /// A scalar computed by the expression collaborator.
    Expression(String),
}

/// `operand OP value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// What to read.
    pub subject: Operand,
    /// How to compare.
    pub operator: Comparison,
    /// Literal to compare against.
    pub value: Value,
}

/// Right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignValue {
    /// A fixed value.
    Literal(Value),
    /// A scalar computed by the expression collaborator.
    Expression(String),
}

/// One attribute mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Attribute to write.
    pub attribute: String,
    /// Value to write.
    pub value: AssignValue,
}

/// Assign step configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignConfig {
    /// Mutations, applied in order.
    pub assignments: Vec<Assignment>,
}

/// Trigger step configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Table receiving the generated rows.
    pub target_table: String,
    /// Number of rows per trigger.
    #[serde(default = "one")]
    pub count: DistributionSpec,
    /// Column referencing the triggering entity. Auto-detected when absent.
    #[serde(default)]
    pub foreign_key: Option<String>,
    /// Attribute generation rules for the rows.
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,
    /// Column stamped with the simulated datetime.
    #[serde(default)]
    pub sim_time_column: Option<String>,
    /// Column stamped with the wall-clock datetime.
    #[serde(default)]
    pub wall_time_column: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_kinds_deserialize_from_flat_objects() {
        let flow: FlowConfig = serde_json::from_str(
            r#"{
                "id": "clinic",
                "entity_table": "patients",
                "steps": [
                    { "id": "arrive", "type": "create", "interarrival_time": "EXPO(5)",
                      "next_steps": ["triage"] },
                    { "id": "triage", "type": "decide", "decision_type": "2way-chance",
                      "outcomes": [
                        { "next_step_id": "treat", "probability": 0.7 },
                        { "next_step_id": "leave", "probability": 0.3 }
                      ] },
                    { "id": "treat", "type": "event", "group_id": "bed",
                      "duration": 30,
                      "resources": [ { "table": "staff", "type": "nurse" } ],
                      "next_steps": ["leave"] },
                    { "id": "leave", "type": "release" }
                ]
            }"#,
        )
        .expect("valid flow");

        assert_eq!(flow.steps.len(), 4);
        assert_eq!(flow.steps[0].kind.name(), "create");
        let decide = &flow.steps[1];
        assert_eq!(decide.references().collect::<Vec<_>>(), vec!["treat", "leave"]);
        match &flow.steps[2].kind {
            StepKind::Event(event) => {
                assert_eq!(event.duration, DistributionSpec::Number(30.0));
                assert_eq!(event.resources[0].count, DistributionSpec::Number(1.0));
            }
            other => panic!("expected event, got {other:?}"),
        }
        assert_eq!(flow.steps[2].group_id.as_deref(), Some("bed"));
        assert_eq!(flow.steps[3].kind, StepKind::Release);
    }

    #[test]
    fn conditions_and_assignments() {
        let step: Step = serde_json::from_str(
            r#"{ "id": "route", "type": "decide", "decision_type": "nway-condition",
                 "outcomes": [
                   { "next_step_id": "a",
                     "conditions": [ { "subject": { "attribute": "status" },
                                       "operator": "==", "value": "a" } ] }
                 ] }"#,
        )
        .expect("valid decide");
        match step.kind {
            StepKind::Decide(decide) => {
                assert_eq!(decide.decision_type, DecisionKind::NWayCondition);
                assert_eq!(
                    decide.outcomes[0].conditions[0].subject,
                    Operand::Attribute("status".into())
                );
            }
            other => panic!("expected decide, got {other:?}"),
        }

        let assign: AssignConfig = serde_json::from_str(
            r#"{ "assignments": [ { "attribute": "score", "value": { "literal": 3 } },
                                  { "attribute": "age", "value": { "expression": "age" } } ] }"#,
        )
        .expect("valid assign");
        assert_eq!(assign.assignments[0].value, AssignValue::Literal(Value::Int(3)));
    }
}
