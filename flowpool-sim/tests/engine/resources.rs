//! Resource contention: capacity, groups, shifts, queues and stalls.

use std::collections::HashMap;

use flowpool_sim::{SimTime, Value};

use super::common::run;

#[test]
fn pools_never_exceed_capacity() {
    let (report, sink) = run(
        r#"{
            "simulation": { "seed": 3, "horizon": 480 },
            "resources": { "pools": [ { "table": "staff", "type": "teller", "capacity": 2 } ] },
            "flows": [ { "id": "bank", "entity_table": "customers", "steps": [
                { "id": "enter", "type": "create", "interarrival_time": "EXPO(2)",
                  "next_steps": ["serve"] },
                { "id": "serve", "type": "event", "duration": "EXPO(5)",
                  "resources": [ { "table": "staff", "type": "teller" } ],
                  "next_steps": ["exit"] },
                { "id": "exit", "type": "release" }
            ] } ]
        }"#,
    );

    let allocations = sink.allocations();
    assert!(allocations.len() > 20);

    // Sweep hold intervals; a release at t frees before an acquire at t.
    let mut edges: Vec<(f64, i32)> = allocations
        .iter()
        .flat_map(|a| [(a.start.as_minutes(), 1), (a.end.as_minutes(), -1)])
        .collect();
    edges.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let mut held = 0;
    for (_, delta) in edges {
        held += delta;
        assert!((0..=2).contains(&held), "held {held} instances");
    }

    // No instance is held twice at once.
    let mut by_instance: HashMap<_, Vec<(f64, f64)>> = HashMap::new();
    for a in &allocations {
        by_instance
            .entry(a.resource)
            .or_default()
            .push((a.start.as_minutes(), a.end.as_minutes()));
    }
    for spans in by_instance.values_mut() {
        spans.sort_by(|a, b| a.0.total_cmp(&b.0));
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0);
        }
    }

    let pool = report.pool("staff", "teller").expect("pool report");
    assert!(pool.peak_in_use <= 2);
    assert!(pool.utilization > 0.0 && pool.utilization <= 1.0);
}

#[test]
fn group_keeps_resources_between_steps() {
    let (report, sink) = run(
        r#"{
            "resources": { "pools": [ { "table": "garage", "type": "bay", "capacity": 1 } ] },
            "flows": [ { "id": "service", "entity_table": "cars", "steps": [
                { "id": "arrive", "type": "create", "interarrival_time": 1,
                  "max_entities": 2, "next_steps": ["lift"] },
                { "id": "lift", "type": "event", "group_id": "bay", "duration": 5,
                  "resources": [ { "table": "garage", "type": "bay" } ],
                  "next_steps": ["repair"] },
                { "id": "repair", "type": "event", "group_id": "bay", "duration": 5,
                  "resources": [ { "table": "garage", "type": "bay" } ],
                  "next_steps": ["leave"] },
                { "id": "leave", "type": "release" }
            ] } ]
        }"#,
    );

    let spans = |step: &str| -> Vec<(f64, f64)> {
        report
            .step_trace(step)
            .map(|t| (t.start.as_minutes(), t.end.as_minutes()))
            .collect()
    };
    // The second car cannot take the bay between the first car's steps.
    assert_eq!(spans("lift"), vec![(1.0, 6.0), (11.0, 16.0)]);
    assert_eq!(spans("repair"), vec![(6.0, 11.0), (16.0, 21.0)]);

    let holds = sink.allocations();
    assert_eq!(holds.len(), 4);
    assert!(holds.iter().all(|a| a.resource == holds[0].resource));
    assert_eq!(
        holds[0].extra.get("group"),
        Some(&Value::from("bay"))
    );

    let pool = report.pool("garage", "bay").expect("pool report");
    assert_eq!(pool.allocations, 2);
    assert_eq!(pool.in_use_at_end, 0);
}

/// Car `service` forks into a grouped lift/inspect branch and a side branch
/// ending in `tail`. A rival wants the bay while the group retains it.
fn forked_service(tail: &str) -> String {
    format!(
        r#"{{
            "simulation": {{ "horizon": 1000 }},
            "resources": {{ "pools": [
                {{ "table": "garage", "type": "bay", "capacity": 1 }},
                {{ "table": "office", "type": "desk", "capacity": 1 }}
            ] }},
            "flows": [
                {{ "id": "service", "entity_table": "cars", "steps": [
                    {{ "id": "arrive", "type": "create", "interarrival_time": 1,
                      "max_entities": 1, "next_steps": ["lift", "wash"] }},
                    {{ "id": "lift", "type": "event", "group_id": "g", "duration": 5,
                      "resources": [ {{ "table": "garage", "type": "bay" }} ],
                      "next_steps": ["inspect"] }},
                    {{ "id": "inspect", "type": "event", "group_id": "g", "duration": 5,
                      "resources": [ {{ "table": "garage", "type": "bay" }},
                                     {{ "table": "office", "type": "desk" }} ],
                      "next_steps": ["leave"] }},
                    {{ "id": "leave", "type": "release" }},
                    {{ "id": "wash", "type": "event", "duration": 7, "next_steps": ["tail"] }},
                    {tail}
                ] }},
                {{ "id": "paperwork", "entity_table": "audits", "steps": [
                    {{ "id": "open", "type": "create", "interarrival_time": 1,
                      "max_entities": 1, "next_steps": ["audit"] }},
                    {{ "id": "audit", "type": "event", "duration": 19,
                      "resources": [ {{ "table": "office", "type": "desk" }} ],
                      "next_steps": ["close"] }},
                    {{ "id": "close", "type": "release" }}
                ] }},
                {{ "id": "rival", "entity_table": "vans", "steps": [
                    {{ "id": "show_up", "type": "create", "interarrival_time": 4,
                      "max_entities": 1, "next_steps": ["hog"] }},
                    {{ "id": "hog", "type": "event", "duration": 100,
                      "resources": [ {{ "table": "garage", "type": "bay" }} ],
                      "next_steps": ["gone"] }},
                    {{ "id": "gone", "type": "release" }}
                ] }}
            ]
        }}"#
    )
}

fn assert_group_survives_sibling(tail: &str) {
    let (report, _) = run(&forked_service(tail));
    let span = |step: &str| -> Vec<(f64, f64)> {
        report
            .step_trace(step)
            .map(|t| (t.start.as_minutes(), t.end.as_minutes()))
            .collect()
    };
    // The sibling ends at t=8; the bay stays with group `g` until the desk
    // frees at t=20.
    assert_eq!(span("lift"), vec![(1.0, 6.0)]);
    assert_eq!(span("inspect"), vec![(20.0, 25.0)]);
    assert_eq!(span("hog"), vec![(25.0, 125.0)]);
    assert_eq!(report.in_flight, 0);
    let bay = report.pool("garage", "bay").expect("pool report");
    assert_eq!(bay.in_use_at_end, 0);
}

#[test]
fn sibling_release_keeps_other_groups() {
    assert_group_survives_sibling(r#"{ "id": "tail", "type": "release" }"#);
}

#[test]
fn sibling_failure_keeps_other_groups() {
    // No schema: the trigger cannot resolve its link and the branch aborts.
    assert_group_survives_sibling(
        r#"{ "id": "tail", "type": "trigger", "target_table": "notes", "next_steps": ["done"] },
           { "id": "done", "type": "release" }"#,
    );
}

#[test]
fn holds_run_past_shift_end_without_preemption() {
    let (report, sink) = run(
        r#"{
            "simulation": { "horizon": 3000 },
            "resources": { "pools": [ { "table": "staff", "type": "nurse", "capacity": 1,
                "shifts": [ { "instances": 1, "schedule": [
                    { "start": "08:00:00", "end": "16:00:00" } ] } ] } ] },
            "flows": [ { "id": "clinic", "entity_table": "patients", "steps": [
                { "id": "arrive", "type": "create", "interarrival_time": 900,
                  "max_entities": 2, "entities_per_arrival": 2, "next_steps": ["treat"] },
                { "id": "treat", "type": "event", "duration": 120,
                  "resources": [ { "table": "staff", "type": "nurse" } ],
                  "next_steps": ["home"] },
                { "id": "home", "type": "release" }
            ] } ]
        }"#,
    );

    // 15:00 to 17:00 overruns the 16:00 shift end and is not cut short. The
    // freed nurse is off shift, so the second patient waits for 08:00 the
    // next day.
    let mut spans: Vec<(f64, f64)> = sink
        .events()
        .iter()
        .map(|e| (e.start.as_minutes(), e.end.as_minutes()))
        .collect();
    spans.sort_by(|a, b| a.0.total_cmp(&b.0));
    assert_eq!(spans, vec![(900.0, 1020.0), (1920.0, 2040.0)]);

    let pool = report.pool("staff", "nurse").expect("pool report");
    assert_eq!(pool.peak_in_use, 1);
    assert_eq!(pool.allocations, 2);
}

#[test]
fn off_shift_requests_wait_for_next_shift() {
    let (report, sink) = run(
        r#"{
            "resources": { "pools": [ { "table": "staff", "type": "nurse", "capacity": 1,
                "shifts": [ { "instances": 1, "schedule": [
                    { "start": "08:00:00", "end": "16:00:00" } ] } ] } ] },
            "flows": [ { "id": "clinic", "entity_table": "patients", "steps": [
                { "id": "arrive", "type": "create", "interarrival_time": 60,
                  "max_entities": 1, "next_steps": ["treat"] },
                { "id": "treat", "type": "event", "duration": 30,
                  "resources": [ { "table": "staff", "type": "nurse" } ],
                  "next_steps": ["home"] },
                { "id": "home", "type": "release" }
            ] } ]
        }"#,
    );

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].start, SimTime::from_minutes(480.0));
    assert_eq!(events[0].end, SimTime::from_minutes(510.0));

    let wait = sink.allocations()[0]
        .extra
        .get("wait_minutes")
        .and_then(Value::as_f64)
        .expect("wait recorded");
    assert!((wait - 420.0).abs() < 1e-9);
    assert!(report.stalled.is_empty());
}

#[test]
fn priority_queue_serves_highest_first() {
    let (report, sink) = run(
        r#"{
            "resources": {
                "pools": [ { "table": "staff", "type": "doctor", "capacity": 1 } ],
                "queues": [ { "name": "triage",
                              "discipline": { "kind": "priority", "attribute": "acuity" } } ]
            },
            "flows": [
                { "id": "rounds", "entity_table": "rounds", "steps": [
                    { "id": "start", "type": "create", "interarrival_time": 1,
                      "max_entities": 1, "next_steps": ["round"] },
                    { "id": "round", "type": "event", "duration": 10,
                      "resources": [ { "table": "staff", "type": "doctor" } ],
                      "next_steps": ["end"] },
                    { "id": "end", "type": "release" }
                ] },
                { "id": "er", "entity_table": "patients", "steps": [
                    { "id": "arrive", "type": "create", "interarrival_time": 2,
                      "max_entities": 4, "entities_per_arrival": 4,
                      "attributes": [ { "name": "acuity", "generator": "UNIF(1, 10)" } ],
                      "next_steps": ["see"] },
                    { "id": "see", "type": "event", "duration": 5,
                      "resources": [ { "table": "staff", "type": "doctor", "queue": "triage" } ],
                      "next_steps": ["out"] },
                    { "id": "out", "type": "release" }
                ] }
            ]
        }"#,
    );

    let mut seen: Vec<_> = report.step_trace("see").collect();
    assert_eq!(seen.len(), 4);
    seen.sort_by(|a, b| a.start.cmp(&b.start));
    assert_eq!(seen[0].start, SimTime::from_minutes(11.0));

    let acuity: Vec<f64> = seen
        .iter()
        .map(|t| {
            sink.row("patients", t.entity.get())
                .and_then(|row| row.get("acuity").and_then(Value::as_f64))
                .expect("acuity persisted")
        })
        .collect();
    assert!(acuity.windows(2).all(|w| w[0] >= w[1]), "{acuity:?}");
}

#[test]
fn unsatisfiable_requests_are_reported_as_stalled() {
    let (report, _) = run(
        r#"{
            "simulation": { "horizon": 100 },
            "resources": { "pools": [ { "table": "rooms", "type": "mri", "capacity": 1 } ] },
            "flows": [ { "id": "imaging", "entity_table": "scans", "steps": [
                { "id": "book", "type": "create", "interarrival_time": 5,
                  "max_entities": 1, "next_steps": ["scan"] },
                { "id": "scan", "type": "event", "duration": 20,
                  "resources": [ { "table": "rooms", "type": "mri", "count": 2 } ],
                  "next_steps": ["done"] },
                { "id": "done", "type": "release" }
            ] } ]
        }"#,
    );

    assert_eq!(report.processed_event_count, 0);
    assert_eq!(report.in_flight, 1);
    assert_eq!(report.stalled.len(), 1);
    let stall = &report.stalled[0];
    assert_eq!(stall.step, "scan");
    assert_eq!(stall.waiting_since, SimTime::from_minutes(5.0));
    assert_eq!(
        stall.needs,
        vec![("rooms".to_string(), "mri".to_string(), 2)]
    );
    assert!(report.to_string().contains("=== Stalled Requests ==="));
}
