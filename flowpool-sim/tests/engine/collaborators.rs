//! Pluggable collaborators: sinks, evaluators, generators, termination.

use flowpool_sim::{
    termination_fn, AttributeSpec, Entity, ExpressionEvaluator, MemorySink, ResolutionError,
    SimRng, SimulationBuilder, Value, ValueGenerator,
};

use super::common::{init_tracing, run, run_with, scenario};

const COUNTER: &str = r#"{
    "simulation": { "horizon": 100 },
    "flows": [ { "id": "ticks", "entity_table": "ticks", "steps": [
        { "id": "tick", "type": "create", "interarrival_time": 1, "next_steps": ["count"] },
        { "id": "count", "type": "event", "duration": 0.5, "next_steps": ["done"] },
        { "id": "done", "type": "release" }
    ] } ]
}"#;

#[test]
fn failing_sink_does_not_disturb_the_run() {
    init_tracing();
    let sink = MemorySink::new();
    sink.set_failing(true);
    let report = SimulationBuilder::new()
        .scenario(scenario(COUNTER))
        .sink(sink.clone())
        .run()
        .expect("simulation runs");

    // The tick at t=100 is still being counted when the horizon is reached.
    assert_eq!(report.entity_count, 100);
    assert_eq!(report.processed_event_count, 99);
    assert_eq!(report.in_flight, 1);
    assert_eq!(report.sink_failures, 199);
    assert!(sink.entities().is_empty());
    assert!(sink.events().is_empty());
}

#[test]
fn termination_condition_stops_sources() {
    let (report, _) = run_with(
        SimulationBuilder::new()
            .scenario(scenario(COUNTER))
            .termination(termination_fn("ten_ticks", |s| s.entities_created >= 10)),
    );
    assert_eq!(report.entity_count, 10);
    assert_eq!(report.processed_event_count, 10);
    assert_eq!(report.in_flight, 0);
}

#[test]
fn resolution_errors_only_end_the_affected_path() {
    let (report, sink) = run(
        r#"{
            "flows": [ { "id": "audit", "entity_table": "orders", "steps": [
                { "id": "order", "type": "create", "interarrival_time": 2,
                  "max_entities": 3, "next_steps": ["work"] },
                { "id": "work", "type": "event", "duration": 1, "next_steps": ["log"] },
                { "id": "log", "type": "trigger", "target_table": "audit_rows",
                  "next_steps": ["done"] },
                { "id": "done", "type": "release" }
            ] } ]
        }"#,
    );

    assert_eq!(report.processed_event_count, 3);
    assert_eq!(report.in_flight, 0);
    assert_eq!(report.step_trace("log").count(), 0);
    assert_eq!(report.step_trace("done").count(), 0);
    assert!(sink.rows("audit_rows").is_empty());
}

#[test]
fn trigger_stamps_simulated_time() {
    let (_, sink) = run(
        r#"{
            "schema": { "tables": [
                { "name": "orders" },
                { "name": "notes", "foreign_keys": [ { "column": "order_id", "references": "orders" } ] }
            ] },
            "flows": [ { "id": "notes", "entity_table": "orders", "steps": [
                { "id": "order", "type": "create", "interarrival_time": 90,
                  "max_entities": 1, "next_steps": ["note"] },
                { "id": "note", "type": "trigger", "target_table": "notes", "count": 2,
                  "sim_time_column": "written_at", "wall_time_column": "logged_at",
                  "next_steps": ["done"] },
                { "id": "done", "type": "release" }
            ] } ]
        }"#,
    );

    let notes = sink.rows("notes");
    assert_eq!(notes.len(), 2);
    for (row, columns) in &notes {
        assert_eq!(columns.get("id"), Some(&Value::Int(*row as i64)));
        assert_eq!(columns.get("order_id"), Some(&Value::Int(1)));
        assert_eq!(
            columns.get("written_at"),
            Some(&Value::from("2024-01-01 01:30:00"))
        );
        assert!(matches!(columns.get("logged_at"), Some(Value::Str(_))));
    }
}

/// Doubles the attribute named inside `double(...)`.
struct Doubler;

impl ExpressionEvaluator for Doubler {
    fn evaluate(&self, expression: &str, entity: &Entity) -> Result<Value, ResolutionError> {
        let name = expression
            .strip_prefix("double(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| ResolutionError::Expression {
                expression: expression.to_string(),
                reason: "unsupported".to_string(),
            })?;
        let value = entity
            .attribute(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| ResolutionError::NonNumeric(name.to_string()))?;
        Ok(Value::Float(value * 2.0))
    }
}

/// Numbers rows sequentially per attribute.
#[derive(Default)]
struct Sequence {
    next: i64,
}

impl ValueGenerator for Sequence {
    fn generate(
        &mut self,
        _table: &str,
        _attribute: &AttributeSpec,
        _rng: &mut SimRng,
    ) -> Result<Value, ResolutionError> {
        self.next += 1;
        Ok(Value::Int(self.next))
    }
}

#[test]
fn custom_evaluator_and_generator() {
    const JSON: &str = r#"{
        "schema": { "tables": [ { "name": "parcels", "columns": ["weight", "cost"] } ] },
        "flows": [ { "id": "post", "entity_table": "parcels", "steps": [
            { "id": "drop", "type": "create", "interarrival_time": 1, "max_entities": 3,
              "attributes": [ { "name": "weight", "generator": "sequence" } ],
              "next_steps": ["price"] },
            { "id": "price", "type": "assign", "next_steps": ["heavy"],
              "assignments": [ { "attribute": "cost", "value": { "expression": "double(weight)" } } ] },
            { "id": "heavy", "type": "decide", "decision_type": "2way-condition",
              "outcomes": [
                { "next_step_id": "manual",
                  "conditions": [ { "subject": { "expression": "double(weight)" }, "operator": ">=", "value": 4 } ] },
                { "next_step_id": "auto" }
              ] },
            { "id": "manual", "type": "release" },
            { "id": "auto", "type": "release" }
        ] } ]
    }"#;

    let (report, sink) = run_with(
        SimulationBuilder::new()
            .scenario(scenario(JSON))
            .evaluator(Doubler)
            .value_generator(Sequence::default()),
    );

    let costs: Vec<Value> = sink
        .rows("parcels")
        .into_iter()
        .filter_map(|(_, columns)| columns.get("cost").cloned())
        .collect();
    assert_eq!(
        costs,
        vec![Value::Float(2.0), Value::Float(4.0), Value::Float(6.0)]
    );
    assert_eq!(report.step_trace("auto").count(), 1);
    assert_eq!(report.step_trace("manual").count(), 2);
}
