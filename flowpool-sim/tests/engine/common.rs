//! Shared helpers for engine tests.

use flowpool_sim::{MemorySink, Scenario, SimulationBuilder, SimulationReport};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn scenario(json: &str) -> Scenario {
    Scenario::from_json_str(json).expect("valid scenario")
}

/// Runs a scenario with a fresh in-memory sink.
pub fn run(json: &str) -> (SimulationReport, MemorySink) {
    run_with(SimulationBuilder::new().scenario(scenario(json)))
}

pub fn run_with(builder: SimulationBuilder) -> (SimulationReport, MemorySink) {
    init_tracing();
    let sink = MemorySink::new();
    let report = builder.sink(sink.clone()).run().expect("simulation runs");
    (report, sink)
}
