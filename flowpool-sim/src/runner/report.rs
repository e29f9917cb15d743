//! Simulation results.

use std::fmt;
use std::time::Duration;

use flowpool_core::{EntityId, SimTime};
use serde::Serialize;

use crate::resource::{PoolReport, StalledRequest};

/// One completed step of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepTrace {
    /// The entity.
    pub entity: EntityId,
    /// Flow id.
    pub flow: String,
    /// Step id.
    pub step: String,
    /// When the step started; for Event steps, when processing started.
    pub start: SimTime,
    /// When the step completed.
    pub end: SimTime,
}

/// Outcome of a single run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Seed of the run's random source.
    pub seed: u64,
    /// Simulated time covered: the horizon if events remained past it,
    /// otherwise the time of the last processed event.
    pub duration: SimTime,
    /// Entities created, by sources and by triggered Create steps.
    pub entity_count: usize,
    /// Completed Event steps.
    pub processed_event_count: u64,
    /// Scheduler events popped.
    pub events_processed: u64,
    /// Entities still on a path when the run stopped.
    pub in_flight: usize,
    /// Per-pool statistics.
    pub pools: Vec<PoolReport>,
    /// Requests still queued at the end.
    pub stalled: Vec<StalledRequest>,
    /// Records rejected by the sink.
    pub sink_failures: u64,
    /// Completed steps, in completion order. Empty unless tracing is on.
    pub trace: Vec<StepTrace>,
    /// Wall-clock time taken by the run.
    pub wall_time: Duration,
}

impl SimulationReport {
    /// Statistics of one pool.
    pub fn pool(&self, table: &str, resource_type: &str) -> Option<&PoolReport> {
        self.pools
            .iter()
            .find(|p| p.table == table && p.resource_type == resource_type)
    }

    /// Trace entries of one step, in completion order.
    pub fn step_trace<'a>(&'a self, step: &'a str) -> impl Iterator<Item = &'a StepTrace> + 'a {
        self.trace.iter().filter(move |t| t.step == step)
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Simulation Report ===")?;
        writeln!(f, "Seed: {}", self.seed)?;
        writeln!(f, "Duration: {}", self.duration)?;
        writeln!(f, "Entities Created: {}", self.entity_count)?;
        writeln!(f, "Events Completed: {}", self.processed_event_count)?;
        writeln!(f, "Scheduler Events: {}", self.events_processed)?;
        writeln!(f, "In Flight: {}", self.in_flight)?;
        writeln!(f, "Wall Time: {:?}", self.wall_time)?;
        if self.sink_failures > 0 {
            writeln!(f, "Sink Failures: {}", self.sink_failures)?;
        }

        if !self.pools.is_empty() {
            writeln!(f)?;
            writeln!(f, "=== Resources ===")?;
            for pool in &self.pools {
                writeln!(
                    f,
                    "  {}/{}: capacity {}, allocations {}, peak {}, utilization {:.2}%",
                    pool.table,
                    pool.resource_type,
                    pool.capacity,
                    pool.allocations,
                    pool.peak_in_use,
                    pool.utilization * 100.0
                )?;
            }
        }

        if !self.stalled.is_empty() {
            writeln!(f)?;
            writeln!(f, "=== Stalled Requests ===")?;
            for stall in &self.stalled {
                write!(
                    f,
                    "  {} at {}/{} since {}",
                    stall.entity, stall.flow, stall.step, stall.waiting_since
                )?;
                if let Some(queue) = &stall.queue {
                    write!(f, " in queue {queue}")?;
                }
                writeln!(f)?;
            }
        }

        Ok(())
    }
}
