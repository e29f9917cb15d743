//! Attribute value generation.

use std::collections::HashMap;

use flowpool_core::{AttributeSpec, ResolutionError, Value};

use crate::distribution::Distribution;
use crate::sim::SimRng;

/// Produces a concrete value for one attribute of a new row.
///
/// The engine treats `attribute.generator` as opaque text; only the
/// implementation gives it meaning. All randomness must come from `rng` so
/// runs stay reproducible.
pub trait ValueGenerator {
    /// Generates the value of `attribute` for a row of `table`.
    fn generate(
        &mut self,
        table: &str,
        attribute: &AttributeSpec,
        rng: &mut SimRng,
    ) -> Result<Value, ResolutionError>;
}

/// Reads each generator as a distribution formula and samples it.
///
/// `"DISC(0.7,'walk-in',0.3,'referral')"` yields a category, `"UNIF(18,90)"`
/// a number. Parsed formulas are cached by text.
#[derive(Debug, Default)]
pub struct FormulaValueGenerator {
    cache: HashMap<String, Distribution>,
}

impl FormulaValueGenerator {
    /// Creates a generator with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueGenerator for FormulaValueGenerator {
    fn generate(
        &mut self,
        table: &str,
        attribute: &AttributeSpec,
        rng: &mut SimRng,
    ) -> Result<Value, ResolutionError> {
        if let Some(distribution) = self.cache.get(&attribute.generator) {
            return Ok(distribution.sample(rng));
        }
        let distribution =
            Distribution::parse_formula(&attribute.generator).map_err(|err| {
                ResolutionError::Generation {
                    table: table.to_string(),
                    attribute: attribute.name.clone(),
                    reason: err.to_string(),
                }
            })?;
        let value = distribution.sample(rng);
        self.cache.insert(attribute.generator.clone(), distribution);
        Ok(value)
    }
}
