//! Random-variate formulas.
//!
//! A [`Distribution`] is parsed once, before the run, from a
//! [`DistributionSpec`]; sampling afterwards cannot fail for a formula that
//! passed validation, except when a categorical value is used where a number
//! is required.
//!
//! | Formula | Meaning | Result |
//! |---------|---------|--------|
//! | `UNIF(min,max)` | continuous uniform | float |
//! | `NORM(mean,std)` | Gaussian | float |
//! | `EXPO(mean)` | exponential with the given mean | float |
//! | `TRIA(min,mode,max)` | triangular | float |
//! | `POIS(mean)` | Poisson | integer |
//! | `CONS(value)` | constant | the value |
//! | `DISC(p1,v1,p2,v2,...)` | categorical, weights sum to 1 | the chosen `v` |

mod parser;

use flowpool_core::{ConfigError, DistributionSpec, ResolutionError, Value};
use rand_distr::{Exp, Normal, Poisson, Triangular};

use crate::sim::SimRng;

/// Allowed deviation of DISC weights from 1.
pub const DISC_TOLERANCE: f64 = 1e-6;

/// A parsed, validated random-variate specification.
#[derive(Debug, Clone)]
pub enum Distribution {
    /// `UNIF(min,max)`
    Uniform {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// `NORM(mean,std)`
    Normal(Normal<f64>),
    /// `EXPO(mean)`
    Exponential(Exp<f64>),
    /// `TRIA(min,mode,max)`
    Triangular(Triangular<f64>),
    /// `POIS(mean)`
    Poisson(Poisson<f64>),
    /// `CONS(value)`
    Constant(Value),
    /// `DISC(p1,v1,...)` stored as cumulative weights.
    Discrete(Vec<(f64, Value)>),
}

impl Distribution {
    /// Parses any configured shape.
    pub fn parse(spec: &DistributionSpec) -> Result<Self, ConfigError> {
        match spec {
            DistributionSpec::Number(v) => build(&spec.to_string(), "CONS", &[Value::Float(*v)]),
            DistributionSpec::Formula(text) => Self::parse_formula(text),
            DistributionSpec::Structured { kind, params } => {
                build(&spec.to_string(), &kind.to_ascii_uppercase(), params)
            }
        }
    }

    /// Parses a `NAME(args...)` formula.
    pub fn parse_formula(text: &str) -> Result<Self, ConfigError> {
        let parsed = parser::parse_formula(text).map_err(|reason| invalid(text, reason))?;
        build(text, &parsed.name, &parsed.args)
    }

    /// Whether every possible sample is a number.
    pub fn is_numeric(&self) -> bool {
        match self {
            Distribution::Constant(v) => v.is_numeric(),
            Distribution::Discrete(choices) => choices.iter().all(|(_, v)| v.is_numeric()),
            _ => true,
        }
    }

    /// Draws one value.
    pub fn sample(&self, rng: &mut SimRng) -> Value {
        match self {
            Distribution::Uniform { min, max } => Value::Float(rng.random_between(*min, *max)),
            Distribution::Normal(d) => Value::Float(rng.sample(d)),
            Distribution::Exponential(d) => Value::Float(rng.sample(d)),
            Distribution::Triangular(d) => Value::Float(rng.sample(d)),
            Distribution::Poisson(d) => Value::Int(rng.sample(d).round() as i64),
            Distribution::Constant(v) => v.clone(),
            Distribution::Discrete(choices) => {
                let u = rng.random_f64();
                choices
                    .iter()
                    .find(|(cumulative, _)| u < *cumulative)
                    .or_else(|| choices.last())
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Int(0))
            }
        }
    }

    /// Draws one value that must be numeric.
    pub fn sample_number(&self, rng: &mut SimRng) -> Result<f64, ResolutionError> {
        let value = self.sample(rng);
        match value {
            Value::Int(v) => Ok(v as f64),
            Value::Float(v) => Ok(v),
            Value::Str(_) => value
                .as_f64()
                .ok_or_else(|| ResolutionError::NonNumeric(value.to_string())),
        }
    }

    /// Draws a non-negative duration in minutes.
    pub fn sample_duration(&self, rng: &mut SimRng) -> Result<f64, ResolutionError> {
        let minutes = self.sample_number(rng)?;
        Ok(if minutes.is_finite() { minutes.max(0.0) } else { 0.0 })
    }

    /// Draws a non-negative count, rounded to the nearest integer.
    pub fn sample_count(&self, rng: &mut SimRng) -> Result<u32, ResolutionError> {
        let n = self.sample_number(rng)?;
        if !n.is_finite() || n <= 0.0 {
            return Ok(0);
        }
        Ok(n.round().min(u32::MAX as f64) as u32)
    }
}

fn invalid(formula: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidDistribution {
        formula: formula.to_string(),
        reason: reason.into(),
    }
}

fn numbers(formula: &str, name: &str, args: &[Value], arity: usize) -> Result<Vec<f64>, ConfigError> {
    if args.len() != arity {
        return Err(invalid(
            formula,
            format!("{name} takes {arity} argument(s), got {}", args.len()),
        ));
    }
    args.iter()
        .map(|a| match a {
            Value::Int(v) => Ok(*v as f64),
            Value::Float(v) if v.is_finite() => Ok(*v),
            other => Err(invalid(formula, format!("`{other}` is not a finite number"))),
        })
        .collect()
}

fn build(formula: &str, name: &str, args: &[Value]) -> Result<Distribution, ConfigError> {
    match name {
        "UNIF" => {
            let p = numbers(formula, name, args, 2)?;
            if p[0] > p[1] {
                return Err(invalid(formula, "min must not exceed max"));
            }
            Ok(Distribution::Uniform {
                min: p[0],
                max: p[1],
            })
        }
        "NORM" => {
            let p = numbers(formula, name, args, 2)?;
            if p[1] < 0.0 {
                return Err(invalid(formula, "std must not be negative"));
            }
            Normal::new(p[0], p[1])
                .map(Distribution::Normal)
                .map_err(|e| invalid(formula, e.to_string()))
        }
        "EXPO" => {
            let p = numbers(formula, name, args, 1)?;
            if p[0] <= 0.0 {
                return Err(invalid(formula, "mean must be positive"));
            }
            Exp::new(1.0 / p[0])
                .map(Distribution::Exponential)
                .map_err(|e| invalid(formula, e.to_string()))
        }
        "TRIA" => {
            let p = numbers(formula, name, args, 3)?;
            let (min, mode, max) = (p[0], p[1], p[2]);
            if !(min <= mode && mode <= max) {
                return Err(invalid(formula, "expected min <= mode <= max"));
            }
            if min == max {
                return Ok(Distribution::Constant(Value::Float(min)));
            }
            Triangular::new(min, max, mode)
                .map(Distribution::Triangular)
                .map_err(|e| invalid(formula, e.to_string()))
        }
        "POIS" => {
            let p = numbers(formula, name, args, 1)?;
            if p[0] <= 0.0 {
                return Err(invalid(formula, "mean must be positive"));
            }
            Poisson::new(p[0])
                .map(Distribution::Poisson)
                .map_err(|e| invalid(formula, e.to_string()))
        }
        "CONS" => match args {
            [Value::Float(v)] if !v.is_finite() => Err(invalid(formula, "constant must be finite")),
            [value] => Ok(Distribution::Constant(value.clone())),
            _ => Err(invalid(formula, "CONS takes 1 argument")),
        },
        "DISC" => {
            if args.is_empty() || args.len() % 2 != 0 {
                return Err(invalid(formula, "DISC takes probability/value pairs"));
            }
            let mut cumulative = 0.0;
            let mut choices = Vec::with_capacity(args.len() / 2);
            for pair in args.chunks(2) {
                let p = pair[0]
                    .as_f64()
                    .filter(|p| pair[0].is_numeric() && (0.0..=1.0).contains(p))
                    .ok_or_else(|| {
                        invalid(formula, format!("`{}` is not a probability", pair[0]))
                    })?;
                cumulative += p;
                choices.push((cumulative, pair[1].clone()));
            }
            if (cumulative - 1.0).abs() > DISC_TOLERANCE {
                return Err(invalid(
                    formula,
                    format!("probabilities sum to {cumulative}, expected 1"),
                ));
            }
            if let Some(last) = choices.last_mut() {
                last.0 = 1.0;
            }
            Ok(Distribution::Discrete(choices))
        }
        other => Err(invalid(formula, format!("unknown distribution `{other}`"))),
    }
}
