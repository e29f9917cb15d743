//! Fluent configuration of a simulation run.

use flowpool_core::Scenario;

use super::engine::{Collaborators, Engine};
use super::report::SimulationReport;
use crate::providers::{
    AttributeEvaluator, ExpressionEvaluator, FormulaValueGenerator, NullSink, RecordSink,
    TerminationCondition, ValueGenerator,
};
use crate::{SimulationError, SimulationResult};

/// Builder pattern for configuring and running a simulation.
///
/// ```ignore
/// let report = SimulationBuilder::new()
///     .scenario(Scenario::from_json_str(json)?)
///     .seed(42)
///     .sink(MemorySink::new())
///     .run()?;
/// println!("{report}");
/// ```
pub struct SimulationBuilder {
    scenario: Option<Scenario>,
    seed: Option<u64>,
    horizon: Option<f64>,
    sink: Box<dyn RecordSink>,
    values: Box<dyn ValueGenerator>,
    evaluator: Box<dyn ExpressionEvaluator>,
    termination: Option<Box<dyn TerminationCondition>>,
}

impl Default for SimulationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationBuilder {
    /// Create a new builder with in-process collaborators and no scenario.
    pub fn new() -> Self {
        Self {
            scenario: None,
            seed: None,
            horizon: None,
            sink: Box::new(NullSink),
            values: Box::new(FormulaValueGenerator::new()),
            evaluator: Box::new(AttributeEvaluator),
            termination: None,
        }
    }

    /// The flows, resources and schema to simulate.
    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenario = Some(scenario);
        self
    }

    /// Override the scenario's seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Override the scenario's horizon, in simulated minutes.
    pub fn horizon(mut self, minutes: f64) -> Self {
        self.horizon = Some(minutes);
        self
    }

    /// Where output records go. Defaults to [`NullSink`].
    pub fn sink(mut self, sink: impl RecordSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Attribute value fabrication for Create and Trigger steps.
    pub fn value_generator(mut self, values: impl ValueGenerator + 'static) -> Self {
        self.values = Box::new(values);
        self
    }

    /// Expression evaluation for Decide and Assign steps.
    pub fn evaluator(mut self, evaluator: impl ExpressionEvaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    /// Stop every arrival source once `condition` holds.
    pub fn termination(mut self, condition: Box<dyn TerminationCondition>) -> Self {
        self.termination = Some(condition);
        self
    }

    /// Validate the scenario and run it to the horizon.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Config`] if the scenario is invalid, before
    /// any simulated time elapses.
    pub fn run(self) -> SimulationResult<SimulationReport> {
        let mut scenario = self
            .scenario
            .ok_or_else(|| SimulationError::InvalidState("no scenario configured".to_string()))?;
        if let Some(seed) = self.seed {
            scenario.simulation.seed = seed;
        }
        if let Some(horizon) = self.horizon {
            scenario.simulation.horizon = horizon;
        }

        let engine = Engine::new(
            scenario,
            Collaborators {
                sink: self.sink,
                values: self.values,
                evaluator: self.evaluator,
                termination: self.termination,
            },
        )?;
        Ok(engine.run())
    }
}
