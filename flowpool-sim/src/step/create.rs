use std::collections::BTreeMap;

use flowpool_core::{EntityId, Value};
use tracing::debug;

use super::{PathView, StepContext, StepError, StepOutcome};
use crate::flow::{CreatePlan, StepNode};

/// Spawns `count` entities of `plan.table`.
///
/// With a `parent`, each child gets the parent's id in the foreign-key
/// column (configured, or the single schema key from the child table to
/// the parent's table). Attribute values for the whole batch are generated
/// before any entity is created, so a failure leaves nothing behind.
pub(crate) fn spawn_batch(
    ctx: &mut StepContext<'_>,
    plan: &CreatePlan,
    count: u32,
    parent: Option<EntityId>,
) -> Result<Vec<EntityId>, StepError> {
    let link = match parent {
        Some(parent) => {
            let parent_table = &ctx
                .entities
                .get(parent)
                .ok_or(StepError::MissingEntity(parent))?
                .table;
            let column = match &plan.foreign_key {
                Some(column) => column.clone(),
                None => ctx.schema.foreign_key(&plan.table, parent_table)?.to_string(),
            };
            Some((column, Value::Int(parent.get() as i64)))
        }
        None => None,
    };

    let mut rows = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut columns = BTreeMap::new();
        for attribute in &plan.attributes {
            let value = ctx.values.generate(&plan.table, attribute, ctx.rng)?;
            columns.insert(attribute.name.clone(), value);
        }
        if let Some((column, value)) = &link {
            columns.insert(column.clone(), value.clone());
        }
        rows.push(columns);
    }

    let mut spawned = Vec::with_capacity(rows.len());
    for columns in rows {
        let id = ctx.entities.create(&plan.table, ctx.now);
        for (name, value) in &columns {
            ctx.entities.set_attribute(id, name, value.clone());
        }
        ctx.recorder.entity_created(&plan.table, id, ctx.now);
        ctx.recorder.columns(&plan.table, id.get(), &columns);
        spawned.push(id);
    }
    debug!(
        table = %plan.table,
        count = spawned.len(),
        parent = ?parent,
        now = %ctx.now,
        "entities created"
    );
    Ok(spawned)
}

/// Triggered mode: the incoming entity spawns children and its path ends.
pub(super) fn execute(
    ctx: &mut StepContext<'_>,
    _node: &StepNode,
    plan: &CreatePlan,
    path: &PathView,
) -> Result<StepOutcome, StepError> {
    let count = match &plan.batch {
        Some(batch) => batch.sample_count(ctx.rng)?,
        None => 1,
    };
    let children = spawn_batch(ctx, plan, count, Some(path.entity))?;
    Ok(StepOutcome::Spawned(children))
}
