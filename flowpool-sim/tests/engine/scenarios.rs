//! Flow-level behavior: arrivals, routing, decisions and spawning.

use flowpool_sim::{ConfigError, SimTime, SimulationBuilder, SimulationError, Value};

use super::common::{init_tracing, run, scenario};

const SINGLE_WORKER: &str = r#"{
    "simulation": { "horizon": 1000 },
    "resources": { "pools": [ { "table": "staff", "type": "Worker", "capacity": 1 } ] },
    "flows": [ { "id": "line", "entity_table": "jobs", "steps": [
        { "id": "arrive", "type": "create", "interarrival_time": "CONS(10)",
          "max_entities": 5, "next_steps": ["work"] },
        { "id": "work", "type": "event", "duration": "CONS(30)",
          "resources": [ { "table": "staff", "type": "Worker" } ],
          "next_steps": ["done"] },
        { "id": "done", "type": "release" }
    ] } ]
}"#;

#[test]
fn single_worker_serializes_events() {
    let (report, sink) = run(SINGLE_WORKER);

    let arrivals: Vec<f64> = sink.entities().iter().map(|e| e.at.as_minutes()).collect();
    assert_eq!(arrivals, vec![10.0, 20.0, 30.0, 40.0, 50.0]);

    let mut events = sink.events();
    events.sort_by_key(|e| e.entity);
    let spans: Vec<(f64, f64)> = events
        .iter()
        .map(|e| (e.start.as_minutes(), e.end.as_minutes()))
        .collect();
    assert_eq!(
        spans,
        vec![
            (10.0, 40.0),
            (40.0, 70.0),
            (70.0, 100.0),
            (100.0, 130.0),
            (130.0, 160.0)
        ]
    );

    assert_eq!(report.entity_count, 5);
    assert_eq!(report.processed_event_count, 5);
    assert_eq!(report.in_flight, 0);
    assert_eq!(report.duration, SimTime::from_minutes(160.0));
    assert!(report.stalled.is_empty());

    let pool = report.pool("staff", "Worker").expect("pool report");
    assert_eq!(pool.allocations, 5);
    assert_eq!(pool.peak_in_use, 1);
    assert!((pool.busy_minutes - 150.0).abs() < 1e-9);
}

#[test]
fn trace_records_waits_and_service() {
    let (report, _) = run(SINGLE_WORKER);
    let work: Vec<(f64, f64)> = report
        .step_trace("work")
        .map(|t| (t.start.as_minutes(), t.end.as_minutes()))
        .collect();
    assert_eq!(work.len(), 5);
    assert_eq!(work[1], (40.0, 70.0));
    assert_eq!(report.step_trace("done").count(), 5);
}

#[test]
fn unmatched_condition_ends_path_quietly() {
    let (report, _) = run(
        r#"{
            "flows": [ { "id": "route", "entity_table": "tickets", "steps": [
                { "id": "open", "type": "create", "interarrival_time": 5,
                  "max_entities": 3, "next_steps": ["tag"] },
                { "id": "tag", "type": "assign", "next_steps": ["sort"],
                  "assignments": [ { "attribute": "status", "value": { "literal": "c" } } ] },
                { "id": "sort", "type": "decide", "decision_type": "nway-condition",
                  "outcomes": [
                    { "next_step_id": "a",
                      "conditions": [ { "subject": { "attribute": "status" }, "operator": "==", "value": "a" } ] },
                    { "next_step_id": "b",
                      "conditions": [ { "subject": { "attribute": "status" }, "operator": "==", "value": "b" } ] }
                  ] },
                { "id": "a", "type": "release" },
                { "id": "b", "type": "release" }
            ] } ]
        }"#,
    );

    assert_eq!(report.entity_count, 3);
    assert_eq!(report.in_flight, 0);
    assert_eq!(report.step_trace("sort").count(), 3);
    assert_eq!(report.step_trace("a").count(), 0);
    assert_eq!(report.step_trace("b").count(), 0);
}

#[test]
fn triggered_create_consumes_parent() {
    let (report, sink) = run(
        r#"{
            "schema": { "tables": [
                { "name": "orders" },
                { "name": "items", "columns": ["sku"],
                  "foreign_keys": [ { "column": "order_id", "references": "orders" } ] }
            ] },
            "flows": [ { "id": "fulfil", "entity_table": "orders", "steps": [
                { "id": "order", "type": "create", "interarrival_time": 5,
                  "max_entities": 2, "next_steps": ["split"] },
                { "id": "split", "type": "create", "entity_table": "items",
                  "entities_per_arrival": 3,
                  "attributes": [ { "name": "sku", "generator": "DISC(0.5,'A',0.5,'B')" } ],
                  "next_steps": ["pack"] },
                { "id": "pack", "type": "event", "duration": 1, "next_steps": ["ship"] },
                { "id": "ship", "type": "release" }
            ] } ]
        }"#,
    );

    assert_eq!(report.entity_count, 8);
    assert_eq!(report.processed_event_count, 6);
    assert_eq!(report.in_flight, 0);

    let parents: Vec<_> = report.step_trace("split").map(|t| t.entity).collect();
    assert_eq!(parents.len(), 2);
    for trace in report.step_trace("pack") {
        assert!(!parents.contains(&trace.entity));
    }

    let items = sink.rows("items");
    assert_eq!(items.len(), 6);
    for (_, columns) in &items {
        let parent = columns.get("order_id").expect("linked to order");
        assert!(parents
            .iter()
            .any(|p| *parent == Value::Int(p.get() as i64)));
    }
}

#[test]
fn flows_without_entry_points_create_nothing() {
    let (report, sink) = run(
        r#"{
            "simulation": { "horizon": 10000 },
            "flows": [ { "id": "idle", "entity_table": "jobs", "steps": [
                { "id": "work", "type": "event", "duration": 5, "next_steps": ["done"] },
                { "id": "done", "type": "release" }
            ] } ]
        }"#,
    );
    assert_eq!(report.entity_count, 0);
    assert_eq!(report.processed_event_count, 0);
    assert_eq!(report.duration, SimTime::ZERO);
    assert!(sink.entities().is_empty());
}

#[test]
fn same_seed_same_run() {
    const JSON: &str = r#"{
        "simulation": { "seed": 11, "horizon": 600 },
        "resources": { "pools": [ { "table": "staff", "type": "clerk", "capacity": 2 } ] },
        "flows": [ { "id": "desk", "entity_table": "customers", "steps": [
            { "id": "walk_in", "type": "create", "interarrival_time": "EXPO(4)",
              "attributes": [ { "name": "kind", "generator": "DISC(0.7,'quick',0.3,'slow')" } ],
              "next_steps": ["route"] },
            { "id": "route", "type": "decide", "decision_type": "2way-chance",
              "outcomes": [
                { "next_step_id": "serve", "probability": 0.8 },
                { "next_step_id": "leave", "probability": 0.2 }
              ] },
            { "id": "serve", "type": "event", "duration": "TRIA(2, 5, 12)",
              "resources": [ { "table": "staff", "type": "clerk" } ],
              "next_steps": ["leave"] },
            { "id": "leave", "type": "release" }
        ] } ]
    }"#;

    let (first, first_sink) = run(JSON);
    let (second, second_sink) = run(JSON);
    assert!(first.entity_count > 50);
    assert_eq!(first.entity_count, second.entity_count);
    assert_eq!(first.processed_event_count, second.processed_event_count);
    assert_eq!(first.trace, second.trace);
    assert_eq!(first_sink.events(), second_sink.events());
    assert_eq!(first_sink.rows("customers"), second_sink.rows("customers"));

    let (reseeded, _) = super::common::run_with(
        SimulationBuilder::new().scenario(scenario(JSON)).seed(12),
    );
    assert_eq!(reseeded.seed, 12);
    assert_ne!(first.trace, reseeded.trace);
}

#[test]
fn invalid_scenarios_fail_before_running() {
    init_tracing();
    let unknown_step = SimulationBuilder::new()
        .scenario(scenario(
            r#"{ "flows": [ { "id": "f", "entity_table": "t", "steps": [
                { "id": "in", "type": "create", "interarrival_time": 1, "next_steps": ["nowhere"] }
            ] } ] }"#,
        ))
        .run();
    assert!(matches!(
        unknown_step,
        Err(SimulationError::Config(ConfigError::UnknownStep { .. }))
    ));

    let bad_horizon = SimulationBuilder::new()
        .scenario(scenario(SINGLE_WORKER))
        .horizon(0.0)
        .run();
    assert!(matches!(
        bad_horizon,
        Err(SimulationError::Config(ConfigError::InvalidSimulation(_)))
    ));

    assert!(matches!(
        SimulationBuilder::new().run(),
        Err(SimulationError::InvalidState(_))
    ));
}
