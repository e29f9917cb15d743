use tracing::trace;

use super::{PathView, StepContext, StepError, StepOutcome};
use crate::flow::StepNode;

/// Frees what the entity retains under this step's group. Terminal.
///
/// Groups of the previous step were already released when the path moved
/// here, and groups held by sibling paths stay untouched.
pub(super) fn execute(
    ctx: &mut StepContext<'_>,
    node: &StepNode,
    path: &PathView,
) -> Result<StepOutcome, StepError> {
    if let Some(group) = &node.group_id {
        ctx.resources.release_group(path.entity, group, ctx.now);
    }
    trace!(entity = %path.entity, group = ?node.group_id, now = %ctx.now, "released");
    Ok(StepOutcome::Advance(None))
}
