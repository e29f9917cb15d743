use std::collections::BTreeMap;

use flowpool_core::AssignValue;

use super::{PathView, StepContext, StepError, StepOutcome};
use crate::flow::{AssignPlan, StepNode};

/// Applies the assignments in order, so later expressions see earlier
/// values. Nothing is written unless every value resolves. Columns present
/// on the entity's table are persisted.
pub(super) fn execute(
    ctx: &mut StepContext<'_>,
    node: &StepNode,
    plan: &AssignPlan,
    path: &PathView,
) -> Result<StepOutcome, StepError> {
    let mut scratch = ctx
        .entities
        .get(path.entity)
        .ok_or(StepError::MissingEntity(path.entity))?
        .clone();
    let mut changed = BTreeMap::new();
    for assignment in &plan.assignments {
        let value = match &assignment.value {
            AssignValue::Literal(value) => value.clone(),
            AssignValue::Expression(expr) => ctx.evaluator.evaluate(expr, &scratch)?,
        };
        scratch.set_attribute(&assignment.attribute, value.clone());
        changed.insert(assignment.attribute.clone(), value);
    }
    for (attribute, value) in &changed {
        ctx.entities
            .set_attribute(path.entity, attribute, value.clone());
    }

    if let Some(schema) = ctx.schema.table(&scratch.table) {
        changed.retain(|column, _| schema.has_column(column));
        ctx.recorder.columns(&scratch.table, path.entity.get(), &changed);
    }
    Ok(StepOutcome::Advance(node.successor()))
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use flowpool_core::Value;

    const SCENARIO: &str = r#"{
        "schema": { "tables": [ { "name": "patients", "columns": ["status"] } ] },
        "flows": [ { "id": "ward", "entity_table": "patients", "steps": [
            { "id": "mark", "type": "assign", "next_steps": ["done"],
              "assignments": [
                { "attribute": "status", "value": { "literal": "admitted" } },
                { "attribute": "score", "value": { "literal": 4 } },
                { "attribute": "copy", "value": { "expression": "score" } }
              ] },
            { "id": "done", "type": "release" }
        ] } ]
    }"#;

    #[test]
    fn applies_in_order_and_persists_known_columns() {
        let mut h = Harness::new(SCENARIO);
        let patient = h.entity("patients");
        let path = h.path(patient, "mark");

        assert_eq!(h.run(&path), Ok(StepOutcome::Advance(h.flow.lookup("done"))));
        assert_eq!(
            h.entities.get_attribute(patient, "copy"),
            Some(&Value::Int(4))
        );

        let row = h.sink.row("patients", patient.get()).expect("persisted");
        assert_eq!(row.get("status"), Some(&Value::from("admitted")));
        assert!(!row.contains_key("score"));
    }

    #[test]
    fn tables_outside_the_schema_stay_in_memory() {
        let mut h = Harness::new(SCENARIO);
        let visitor = h.entity("visitors");
        let path = h.path(visitor, "mark");
        assert!(h.run(&path).is_ok());
        assert_eq!(
            h.entities.get_attribute(visitor, "status"),
            Some(&Value::from("admitted"))
        );
        assert!(h.sink.rows("visitors").is_empty());
    }

    #[test]
    fn failed_expression_leaves_entity_untouched() {
        let mut h = Harness::new(
            r#"{
                "schema": { "tables": [ { "name": "patients", "columns": ["status"] } ] },
                "flows": [ { "id": "ward", "entity_table": "patients", "steps": [
                    { "id": "mark", "type": "assign", "next_steps": ["done"],
                      "assignments": [
                        { "attribute": "status", "value": { "literal": "admitted" } },
                        { "attribute": "copy", "value": { "expression": "missing" } }
                      ] },
                    { "id": "done", "type": "release" }
                ] } ]
            }"#,
        );
        let patient = h.entity("patients");
        let path = h.path(patient, "mark");

        assert!(matches!(h.run(&path), Err(StepError::Resolution(_))));
        assert_eq!(h.entities.get_attribute(patient, "status"), None);
        assert_eq!(h.entities.get_attribute(patient, "copy"), None);
        assert!(h.sink.rows("patients").is_empty());
    }
}
