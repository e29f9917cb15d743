//! Typed pools of resource instances and their utilization bookkeeping.

use chrono::NaiveDateTime;
use flowpool_core::{EventId, ResourceId, SimTime};
use serde::Serialize;

use super::shift::ShiftSchedule;

/// Index of a pool inside the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(pub(crate) usize);

impl PoolId {
    /// Position of the pool in configuration order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One resource instance.
#[derive(Debug, Clone)]
pub(crate) struct Instance {
    pub id: ResourceId,
    /// Index into the pool's shift schedules; `None` means always on shift.
    pub shift: Option<usize>,
    /// Event currently using the instance.
    pub held_by: Option<EventId>,
    /// Retained by an entity group between events.
    pub grouped: bool,
}

impl Instance {
    pub fn is_free(&self) -> bool {
        self.held_by.is_none() && !self.grouped
    }
}

/// A typed pool with fixed capacity and optional shifts.
#[derive(Debug)]
pub(crate) struct ResourcePool {
    pub table: String,
    pub resource_type: String,
    pub instances: Vec<Instance>,
    pub shifts: Vec<ShiftSchedule>,
    in_use: u32,
    allocations: u64,
    peak_in_use: u32,
    busy_minutes: f64,
    last_change: SimTime,
}

impl ResourcePool {
    pub fn new(
        table: String,
        resource_type: String,
        instances: Vec<Instance>,
        shifts: Vec<ShiftSchedule>,
    ) -> Self {
        Self {
            table,
            resource_type,
            instances,
            shifts,
            in_use: 0,
            allocations: 0,
            peak_in_use: 0,
            busy_minutes: 0.0,
            last_change: SimTime::ZERO,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.instances.len() as u32
    }

    pub fn in_use(&self) -> u32 {
        self.in_use
    }

    /// Whether an instance may be allocated at calendar time `at`.
    ///
    /// An unmappable time keeps shift-bound instances off shift.
    pub fn on_shift(&self, instance: &Instance, at: Option<NaiveDateTime>) -> bool {
        match (instance.shift, at) {
            (None, _) => true,
            (Some(group), Some(at)) => self.shifts.get(group).is_some_and(|s| s.is_on(at)),
            (Some(_), None) => false,
        }
    }

    /// Integrates busy time up to `now`.
    fn advance(&mut self, now: SimTime) {
        if now > self.last_change {
            self.busy_minutes += f64::from(self.in_use) * (now - self.last_change);
            self.last_change = now;
        }
    }

    pub fn mark_allocated(&mut self, count: u32, now: SimTime) {
        self.advance(now);
        self.in_use += count;
        self.allocations += u64::from(count);
        self.peak_in_use = self.peak_in_use.max(self.in_use);
    }

    pub fn mark_released(&mut self, count: u32, now: SimTime) {
        self.advance(now);
        self.in_use = self.in_use.saturating_sub(count);
    }

    pub fn report(&mut self, end: SimTime) -> PoolReport {
        self.advance(end);
        let window = end.as_minutes() * f64::from(self.capacity());
        PoolReport {
            table: self.table.clone(),
            resource_type: self.resource_type.clone(),
            capacity: self.capacity(),
            allocations: self.allocations,
            peak_in_use: self.peak_in_use,
            in_use_at_end: self.in_use,
            busy_minutes: self.busy_minutes,
            utilization: if window > 0.0 {
                self.busy_minutes / window
            } else {
                0.0
            },
        }
    }
}

/// End-of-run statistics for one pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolReport {
    /// Resource table.
    pub table: String,
    /// Resource type.
    pub resource_type: String,
    /// Configured instances.
    pub capacity: u32,
    /// Instances handed out over the run.
    pub allocations: u64,
    /// Highest number of instances held at once.
    pub peak_in_use: u32,
    /// Instances still held when the run stopped.
    pub in_use_at_end: u32,
    /// Sum over instances of held minutes.
    pub busy_minutes: f64,
    /// `busy_minutes / (capacity * duration)`.
    pub utilization: f64,
}
