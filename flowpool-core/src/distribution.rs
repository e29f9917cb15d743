//! Declarative random-variate specifications.
//!
//! The engine parses these into samplers before a run starts; this module only
//! describes the accepted shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Value;

/// A distribution as written in configuration.
///
/// Three shapes are accepted:
///
/// ```text
/// 10                                      -> CONS(10)
/// "EXPO(4.5)"                             -> named-function formula
/// { "type": "TRIA", "params": [1, 2, 3] } -> structured form
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DistributionSpec {
    /// A bare number, shorthand for a constant.
    Number(f64),
    /// A `NAME(args...)` formula, case-insensitive.
    Formula(String),
    /// Kind name plus positional parameters.
    Structured {
        /// Distribution kind (`UNIF`, `NORM`, ...).
        #[serde(rename = "type")]
        kind: String,
        /// Positional parameters, same order as the formula form.
        #[serde(default)]
        params: Vec<Value>,
    },
}

impl DistributionSpec {
    /// Shorthand for a formula string.
    pub fn formula(text: impl Into<String>) -> Self {
        DistributionSpec::Formula(text.into())
    }

    /// Shorthand for a constant.
    pub fn constant(value: f64) -> Self {
        DistributionSpec::Number(value)
    }
}

impl fmt::Display for DistributionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionSpec::Number(v) => write!(f, "{v}"),
            DistributionSpec::Formula(text) => f.write_str(text),
            DistributionSpec::Structured { kind, params } => {
                write!(f, "{kind}(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match p {
                        Value::Str(s) => write!(f, "\"{s}\"")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str(")")
            }
        }
    }
}
