//! Externally computed scalars for Decide and Assign steps.

use flowpool_core::{ResolutionError, Value};

use crate::entity::Entity;

/// Evaluates an expression against one entity.
pub trait ExpressionEvaluator {
    /// Computes the scalar value of `expression` for `entity`.
    fn evaluate(&self, expression: &str, entity: &Entity) -> Result<Value, ResolutionError>;
}

/// Resolves an expression as an attribute name, a numeric literal, or the
/// built-in `id` and `table`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttributeEvaluator;

impl ExpressionEvaluator for AttributeEvaluator {
    fn evaluate(&self, expression: &str, entity: &Entity) -> Result<Value, ResolutionError> {
        let name = expression.trim();
        if let Some(value) = entity.attribute(name) {
            return Ok(value.clone());
        }
        match name {
            "id" => return Ok(Value::Int(entity.id.get() as i64)),
            "table" => return Ok(Value::from(entity.table.as_str())),
            _ => {}
        }
        if let Ok(v) = name.parse::<i64>() {
            return Ok(Value::Int(v));
        }
        if let Ok(v) = name.parse::<f64>() {
            return Ok(Value::Float(v));
        }
        Err(ResolutionError::Expression {
            expression: expression.to_string(),
            reason: format!("entity {} has no attribute `{name}`", entity.id),
        })
    }
}
