//! The driver loop.
//!
//! The engine pops one event at a time from [`SimWorld`] and turns it into
//! step-handler calls. A path (one entity travelling through one branch of a
//! flow) runs its instantaneous steps back to back inside a single `Resume`
//! event and only goes back to the event list when a handler suspends it.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use flowpool_core::{ConfigError, EntityId, Scenario, Schema, SimTime, SimulationConfig};
use tracing::{debug, error, info, instrument, warn};

use super::report::{SimulationReport, StepTrace};
use crate::entity::EntityStore;
use crate::flow::{compile_flows, CompiledStep, FlowGraph, StepIndex};
use crate::providers::{
    ExpressionEvaluator, Recorder, RecordSink, RunStatus, TerminationCondition, ValueGenerator,
};
use crate::resource::{PoolId, ResourceManager};
use crate::sim::{Event, SimRng, SimWorld};
use crate::step::{self, spawn_batch, PathView, Phase, StepContext, StepError, StepOutcome};

/// Instantaneous steps one path may run at a single instant before it is
/// treated as a zero-time cycle and aborted.
const MAX_INSTANT_STEPS: usize = 10_000;

/// A Create step running as an arrival source.
#[derive(Debug)]
struct Source {
    flow: usize,
    step: StepIndex,
    created: u64,
    stopped: bool,
}

#[derive(Debug, Clone, Copy)]
struct Path {
    entity: EntityId,
    flow: usize,
    step: StepIndex,
    phase: Phase,
    started: SimTime,
}

/// Collaborators plugged into one run.
pub(crate) struct Collaborators {
    pub sink: Box<dyn RecordSink>,
    pub values: Box<dyn ValueGenerator>,
    pub evaluator: Box<dyn ExpressionEvaluator>,
    pub termination: Option<Box<dyn TerminationCondition>>,
}

pub(crate) struct Engine {
    config: SimulationConfig,
    schema: Schema,
    flows: Rc<Vec<FlowGraph>>,
    world: SimWorld,
    rng: SimRng,
    entities: EntityStore,
    resources: ResourceManager,
    recorder: Recorder,
    values: Box<dyn ValueGenerator>,
    evaluator: Box<dyn ExpressionEvaluator>,
    termination: Option<Box<dyn TerminationCondition>>,
    sources: Vec<Source>,
    paths: HashMap<u64, Path>,
    next_path: u64,
    next_event: u64,
    events_completed: u64,
    sources_stopped: bool,
    trace: Vec<StepTrace>,
}

impl Engine {
    /// Validates the scenario and prepares a run. Nothing is scheduled yet.
    pub fn new(scenario: Scenario, collaborators: Collaborators) -> Result<Self, ConfigError> {
        let Scenario {
            simulation,
            flows,
            resources,
            schema,
        } = scenario;

        if !simulation.horizon.is_finite() || simulation.horizon <= 0.0 {
            return Err(ConfigError::InvalidSimulation(format!(
                "horizon must be a positive number of minutes, got {}",
                simulation.horizon
            )));
        }

        let resources = ResourceManager::new(&resources, simulation.start_datetime)?;
        let flows = compile_flows(&flows, &resources)?;

        let sources = flows
            .iter()
            .enumerate()
            .flat_map(|(flow, graph)| {
                graph.entry_points().iter().map(move |&step| Source {
                    flow,
                    step,
                    created: 0,
                    stopped: false,
                })
            })
            .collect();

        Ok(Self {
            rng: SimRng::new(simulation.seed),
            config: simulation,
            schema,
            flows: Rc::new(flows),
            world: SimWorld::new(),
            entities: EntityStore::new(),
            resources,
            recorder: Recorder::new(collaborators.sink),
            values: collaborators.values,
            evaluator: collaborators.evaluator,
            termination: collaborators.termination,
            sources,
            paths: HashMap::new(),
            next_path: 0,
            next_event: 0,
            events_completed: 0,
            sources_stopped: false,
            trace: Vec::new(),
        })
    }

    /// Runs until the horizon or until no events remain.
    #[instrument(skip_all, fields(seed = self.config.seed))]
    pub fn run(mut self) -> SimulationReport {
        let wall_start = Instant::now();
        let horizon = SimTime::from_minutes(self.config.horizon);
        info!(
            flows = self.flows.len(),
            sources = self.sources.len(),
            pools = self.resources.pool_count(),
            horizon = %horizon,
            "simulation starting"
        );

        for index in 0..self.sources.len() {
            self.schedule_arrival(index);
        }

        let mut last = SimTime::ZERO;
        while let Some(event) = self.world.next_event(horizon) {
            last = self.world.now();
            match event {
                Event::Arrival { source } => self.on_arrival(source),
                Event::Resume { path } => self.resume(path),
                Event::ShiftChange { pool } => {
                    self.resources.on_shift_change(PoolId(pool), last);
                    self.drain();
                }
            }
        }

        let duration = if self.world.has_pending_events() {
            horizon
        } else {
            last
        };
        self.finish(duration, wall_start)
    }

    fn finish(mut self, duration: SimTime, wall_start: Instant) -> SimulationReport {
        let stalled = self.resources.stalled();
        for stall in &stalled {
            warn!(
                entity = %stall.entity,
                flow = %stall.flow,
                step = %stall.step,
                queue = ?stall.queue,
                since = %stall.waiting_since,
                "request still waiting at end of run"
            );
        }

        let report = SimulationReport {
            seed: self.config.seed,
            duration,
            entity_count: self.entities.count(),
            processed_event_count: self.events_completed,
            events_processed: self.world.events_processed(),
            in_flight: self.entities.in_flight(),
            pools: self.resources.pool_reports(duration),
            stalled,
            sink_failures: self.recorder.failures(),
            trace: std::mem::take(&mut self.trace),
            wall_time: wall_start.elapsed(),
        };
        info!(
            duration = %report.duration,
            entities = report.entity_count,
            events_completed = report.processed_event_count,
            in_flight = report.in_flight,
            stalled = report.stalled.len(),
            "simulation finished"
        );
        report
    }

    fn context<'a>(&'a mut self, flow: &'a FlowGraph) -> StepContext<'a> {
        StepContext {
            now: self.world.now(),
            flow,
            schema: &self.schema,
            rng: &mut self.rng,
            entities: &mut self.entities,
            resources: &mut self.resources,
            recorder: &mut self.recorder,
            values: &mut *self.values,
            evaluator: &*self.evaluator,
            next_event: &mut self.next_event,
        }
    }

    // -------------------------------------------------------------------------
    // Arrival sources
    // -------------------------------------------------------------------------

    /// Samples the next inter-arrival gap of a source and schedules it.
    fn schedule_arrival(&mut self, index: usize) {
        let flows = Rc::clone(&self.flows);
        let Some(source) = self.sources.get(index) else {
            return;
        };
        let flow = &flows[source.flow];
        let Some(node) = flow.step(source.step) else {
            return;
        };
        let CompiledStep::Create(plan) = &node.kind else {
            return;
        };
        let Some(interarrival) = &plan.interarrival else {
            return;
        };

        match interarrival.sample_duration(&mut self.rng) {
            Ok(gap) => self
                .world
                .schedule_event(Event::Arrival { source: index }, gap),
            Err(err) => {
                error!(flow = %flow.id(), step = %node.id, error = %err, "arrival source stopped");
                if let Some(source) = self.sources.get_mut(index) {
                    source.stopped = true;
                }
            }
        }
    }

    fn on_arrival(&mut self, index: usize) {
        self.poll_termination();
        let flows = Rc::clone(&self.flows);
        let Some(&Source {
            flow: flow_index,
            step,
            created,
            stopped,
        }) = self.sources.get(index)
        else {
            return;
        };
        if stopped {
            return;
        }
        let flow = &flows[flow_index];
        let Some(node) = flow.step(step) else {
            return;
        };
        let CompiledStep::Create(plan) = &node.kind else {
            return;
        };

        let sampled = match &plan.batch {
            Some(batch) => batch.sample_count(&mut self.rng),
            None => Ok(1),
        };
        let spawned = sampled.map_err(StepError::from).and_then(|count| {
            let budget = plan
                .max_entities
                .map_or(u64::from(count), |max| max.saturating_sub(created));
            let count = u64::from(count).min(budget) as u32;
            let mut ctx = self.context(flow);
            spawn_batch(&mut ctx, plan, count, None)
        });

        let children = match spawned {
            Ok(children) => children,
            Err(err) => {
                error!(flow = %flow.id(), step = %node.id, error = %err, "arrival batch failed");
                Vec::new()
            }
        };
        debug!(
            flow = %flow.id(),
            step = %node.id,
            batch = children.len(),
            now = %self.world.now(),
            "arrival"
        );
        for &child in &children {
            for &next in &node.next {
                self.start_path(child, flow_index, next);
            }
        }

        let Some(source) = self.sources.get_mut(index) else {
            return;
        };
        source.created += children.len() as u64;
        if plan.max_entities.is_some_and(|max| source.created >= max) {
            source.stopped = true;
            debug!(flow = %flow.id(), step = %node.id, created = source.created, "source exhausted");
        }
        if !source.stopped {
            self.schedule_arrival(index);
        }
    }

    // -------------------------------------------------------------------------
    // Paths
    // -------------------------------------------------------------------------

    fn start_path(&mut self, entity: EntityId, flow: usize, step: StepIndex) {
        self.next_path += 1;
        let id = self.next_path;
        self.entities.add_path(entity);
        self.paths.insert(
            id,
            Path {
                entity,
                flow,
                step,
                phase: Phase::Ready,
                started: self.world.now(),
            },
        );
        self.world.schedule_event(Event::Resume { path: id }, 0.0);
    }

    /// Runs a path until it suspends or ends.
    fn resume(&mut self, id: u64) {
        let flows = Rc::clone(&self.flows);
        for _ in 0..MAX_INSTANT_STEPS {
            self.poll_termination();
            let Some(path) = self.paths.get(&id).copied() else {
                return;
            };
            let flow = &flows[path.flow];
            let view = PathView {
                id,
                entity: path.entity,
                step: path.step,
                phase: path.phase,
            };

            let result = {
                let mut ctx = self.context(flow);
                step::execute(&mut ctx, &view)
            };
            self.drain();

            match result {
                Ok(StepOutcome::Advance(next)) => {
                    self.complete_step(&path, flow);
                    match next {
                        Some(next) => self.route(id, &path, flow, next),
                        None => {
                            self.end_path(id);
                            return;
                        }
                    }
                }
                Ok(StepOutcome::Spawned(children)) => {
                    self.complete_step(&path, flow);
                    if let Some(node) = flow.step(path.step) {
                        for child in children {
                            for &next in &node.next {
                                self.start_path(child, path.flow, next);
                            }
                        }
                    }
                    self.end_path(id);
                    return;
                }
                Ok(StepOutcome::Sleep { until, phase }) => {
                    let now = self.world.now();
                    if let Some(p) = self.paths.get_mut(&id) {
                        p.phase = phase;
                        if matches!(phase, Phase::Holding { .. }) {
                            p.started = now;
                        }
                    }
                    self.world.schedule_event_at(Event::Resume { path: id }, until);
                    return;
                }
                Ok(StepOutcome::Wait(phase)) => {
                    if let Some(p) = self.paths.get_mut(&id) {
                        p.phase = phase;
                    }
                    return;
                }
                Err(err) => {
                    self.abort(id, &path, flow, &err);
                    return;
                }
            }
        }

        if let Some(path) = self.paths.get(&id).copied() {
            let err = StepError::InvalidState(format!(
                "more than {MAX_INSTANT_STEPS} steps without time passing"
            ));
            self.abort(id, &path, &flows[path.flow], &err);
        }
    }

    /// Moves a path to `next`, releasing the current group when `next` does
    /// not share it.
    fn route(&mut self, id: u64, path: &Path, flow: &FlowGraph, next: StepIndex) {
        let now = self.world.now();
        let current = flow.step(path.step).and_then(|n| n.group_id.as_deref());
        let upcoming = flow.step(next).and_then(|n| n.group_id.as_deref());
        if let Some(group) = current {
            if upcoming != Some(group) {
                self.resources.release_group(path.entity, group, now);
                self.drain();
            }
        }
        if let Some(p) = self.paths.get_mut(&id) {
            p.step = next;
            p.phase = Phase::Ready;
            p.started = now;
        }
    }

    fn complete_step(&mut self, path: &Path, flow: &FlowGraph) {
        let Some(node) = flow.step(path.step) else {
            return;
        };
        if matches!(node.kind, CompiledStep::Event(_)) {
            self.events_completed += 1;
        }
        if self.config.record_trace {
            self.trace.push(StepTrace {
                entity: path.entity,
                flow: flow.id().to_string(),
                step: node.id.clone(),
                start: path.started,
                end: self.world.now(),
            });
        }
    }

    fn end_path(&mut self, id: u64) {
        let Some(path) = self.paths.remove(&id) else {
            return;
        };
        if self.entities.end_path(path.entity) {
            self.resources.release_entity(path.entity, self.world.now());
            self.drain();
        }
    }

    /// Ends a failed path without leaking what it holds.
    fn abort(&mut self, id: u64, path: &Path, flow: &FlowGraph, err: &StepError) {
        let now = self.world.now();
        let step = flow.step(path.step).map_or("?", |n| n.id.as_str());
        error!(
            entity = %path.entity,
            flow = %flow.id(),
            step = %step,
            error = %err,
            "step failed; path aborted"
        );
        match path.phase {
            Phase::Ready => {}
            Phase::Acquiring { .. } => {
                self.resources.cancel(id, now);
            }
            Phase::Granted { event } | Phase::Holding { event } => {
                self.resources.complete(event, false, now);
            }
        }
        if let Some(group) = flow.step(path.step).and_then(|n| n.group_id.as_deref()) {
            self.resources.release_group(path.entity, group, now);
        }
        self.end_path(id);
        self.drain();
    }

    /// Turns resource-manager notifications into scheduled events.
    fn drain(&mut self) {
        for grant in self.resources.take_grants() {
            if let Some(path) = self.paths.get_mut(&grant.path) {
                path.phase = Phase::Granted { event: grant.event };
                self.world
                    .schedule_event(Event::Resume { path: grant.path }, 0.0);
            }
        }
        for (pool, at) in self.resources.take_wakeups() {
            self.world
                .schedule_event_at(Event::ShiftChange { pool: pool.index() }, at);
        }
    }

    fn poll_termination(&mut self) {
        if self.sources_stopped {
            return;
        }
        let Some(condition) = &self.termination else {
            return;
        };
        let status = RunStatus {
            now: self.world.now(),
            entities_created: self.entities.count(),
            events_completed: self.events_completed,
            in_flight: self.entities.in_flight(),
        };
        if condition.should_stop(&status) {
            info!(
                condition = condition.name(),
                now = %status.now,
                "termination condition met; stopping sources"
            );
            for source in &mut self.sources {
                source.stopped = true;
            }
            self.sources_stopped = true;
        }
    }
}
