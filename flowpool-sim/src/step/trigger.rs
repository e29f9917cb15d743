use std::collections::BTreeMap;

use flowpool_core::Value;
use tracing::debug;

use super::{PathView, StepContext, StepError, StepOutcome};
use crate::flow::{StepNode, TriggerPlan};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Writes related rows linked to the triggering entity. The entity itself
/// continues to the next step.
pub(super) fn execute(
    ctx: &mut StepContext<'_>,
    node: &StepNode,
    plan: &TriggerPlan,
    path: &PathView,
) -> Result<StepOutcome, StepError> {
    let source_table = &ctx
        .entities
        .get(path.entity)
        .ok_or(StepError::MissingEntity(path.entity))?
        .table;
    let link = match &plan.foreign_key {
        Some(column) => column.clone(),
        None => ctx
            .schema
            .foreign_key(&plan.target_table, source_table)?
            .to_string(),
    };
    let count = plan.count.sample_count(ctx.rng)?;

    let mut rows = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut columns = BTreeMap::new();
        for attribute in &plan.attributes {
            let value = ctx.values.generate(&plan.target_table, attribute, ctx.rng)?;
            columns.insert(attribute.name.clone(), value);
        }
        columns.insert(link.clone(), Value::Int(path.entity.get() as i64));
        if let Some(column) = &plan.sim_time_column {
            if let Some(at) = ctx.resources.calendar().datetime_at(ctx.now) {
                columns.insert(column.clone(), Value::Str(at.format(DATETIME_FORMAT).to_string()));
            }
        }
        if let Some(column) = &plan.wall_time_column {
            columns.insert(column.clone(), Value::Str(chrono::Utc::now().to_rfc3339()));
        }
        rows.push(columns);
    }

    let primary_key = ctx
        .schema
        .table(&plan.target_table)
        .map(|t| t.primary_key.clone());
    for mut columns in rows {
        let row = ctx.entities.allocate_row_id();
        if let Some(pk) = &primary_key {
            columns.insert(pk.clone(), Value::Int(row as i64));
        }
        ctx.recorder.columns(&plan.target_table, row, &columns);
    }
    debug!(
        entity = %path.entity,
        step = %node.id,
        table = %plan.target_table,
        rows = count,
        "related rows generated"
    );
    Ok(StepOutcome::Advance(node.successor()))
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use flowpool_core::SimTime;

    const SCENARIO: &str = r#"{
        "schema": { "tables": [
            { "name": "patients" },
            { "name": "vitals", "primary_key": "vital_id", "columns": ["pulse", "taken_at"],
              "foreign_keys": [ { "column": "patient_id", "references": "patients" } ] }
        ] },
        "flows": [ { "id": "ward", "entity_table": "patients", "steps": [
            { "id": "measure", "type": "trigger", "target_table": "vitals", "count": 2,
              "attributes": [ { "name": "pulse", "generator": "UNIF(60, 100)" } ],
              "sim_time_column": "taken_at",
              "next_steps": ["out"] },
            { "id": "out", "type": "release" }
        ] } ]
    }"#;

    #[test]
    fn writes_linked_rows_and_continues() {
        let mut h = Harness::new(SCENARIO);
        let patient = h.entity("patients");
        h.now = SimTime::from_minutes(90.0);
        let path = h.path(patient, "measure");

        assert_eq!(h.run(&path), Ok(StepOutcome::Advance(h.flow.lookup("out"))));

        let rows = h.sink.rows("vitals");
        assert_eq!(rows.len(), 2);
        for (row, columns) in &rows {
            assert_eq!(columns.get("vital_id"), Some(&Value::Int(*row as i64)));
            assert_eq!(
                columns.get("patient_id"),
                Some(&Value::Int(patient.get() as i64))
            );
            assert_eq!(
                columns.get("taken_at"),
                Some(&Value::from("2024-01-01 01:30:00"))
            );
            let pulse = columns.get("pulse").and_then(Value::as_f64).expect("pulse");
            assert!((60.0..=100.0).contains(&pulse));
        }
        // Related rows are not entities.
        assert_eq!(h.entities.count(), 1);
    }

    #[test]
    fn unresolved_link_fails_the_step() {
        let mut h = Harness::new(SCENARIO);
        let visitor = h.entity("visitors");
        let path = h.path(visitor, "measure");
        assert!(matches!(h.run(&path), Err(StepError::Resolution(_))));
        assert!(h.sink.rows("vitals").is_empty());
    }
}
