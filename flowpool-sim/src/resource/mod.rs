//! Resource manager: pools, queues, groups and atomic allocation.
//!
//! Only this module mutates allocation state. A request either gets every
//! instance it needs at once or none of them and waits. Waiters are
//! served by a dispatch pass that runs after every request, release and
//! shift change:
//!
//! - requests without a queue form one arrival-ordered, first-fit list,
//!   so a later small request may pass an earlier one that does not fit;
//! - a named queue only ever offers its head, so its waiters are served
//!   strictly in FIFO or priority order.
//!
//! Grants for waiters that did not get their resources immediately are
//! buffered and drained by the engine with [`ResourceManager::take_grants`].

mod pool;
mod queue;
mod shift;

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use flowpool_core::{ConfigError, EntityId, EventId, ResourceId, ResourcesConfig, SimTime, Value};
use serde::Serialize;
use tracing::debug;

pub use pool::{PoolId, PoolReport};
pub use queue::{NamedQueue, QueueId};
pub use shift::{ShiftCalendar, ShiftSchedule};

use pool::{Instance, ResourcePool};

/// One line of a request: `count` instances from `pool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Need {
    /// Pool to draw from.
    pub pool: PoolId,
    /// Instances needed.
    pub count: u32,
}

/// A resource request for one Event step execution.
#[derive(Debug, Clone)]
pub struct Request {
    /// Event the resources will be bound to.
    pub event: EventId,
    /// Requesting entity.
    pub entity: EntityId,
    /// Engine path waiting on the request.
    pub path: u64,
    /// Group the requesting step belongs to; its retained instances are
    /// reused first.
    pub group: Option<String>,
    /// Requirements, satisfied all at once.
    pub needs: Vec<Need>,
    /// Queue ordering this request against other waiters.
    pub queue: Option<QueueId>,
    /// Priority value read from the entity for priority queues.
    pub priority: Option<Value>,
    /// Flow id, for diagnostics.
    pub flow: String,
    /// Step id, for diagnostics.
    pub step: String,
}

/// Outcome of [`ResourceManager::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// All resources are held now.
    Granted,
    /// The request waits; a [`Grant`] is produced once it is served.
    Queued,
}

/// Notification that a waiting request has been served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    /// Path to resume.
    pub path: u64,
    /// Event now holding resources.
    pub event: EventId,
}

/// Resources bound to one in-progress Event step.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// Owning event.
    pub event: EventId,
    /// Owning entity.
    pub entity: EntityId,
    /// Group of the step, if any.
    pub group: Option<String>,
    /// Instances allocated for this event.
    pub fresh: Vec<ResourceId>,
    /// Instances borrowed from the entity's group.
    pub reused: Vec<ResourceId>,
    /// When the request was made.
    pub requested_at: SimTime,
    /// When the resources were granted.
    pub acquired_at: SimTime,
}

impl Allocation {
    /// Every instance held, fresh first.
    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.fresh.iter().chain(self.reused.iter()).copied()
    }
}

/// A request still waiting when the run stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StalledRequest {
    /// Waiting entity.
    pub entity: EntityId,
    /// Flow of the waiting step.
    pub flow: String,
    /// Waiting step.
    pub step: String,
    /// Queue name, if the request named one.
    pub queue: Option<String>,
    /// `(table, type, count)` per requirement.
    pub needs: Vec<(String, String, u32)>,
    /// Request time.
    pub waiting_since: SimTime,
}

#[derive(Debug)]
struct Waiter {
    request: Request,
    since: SimTime,
}

/// Owner of every pool, queue, group and allocation of a run.
#[derive(Debug)]
pub struct ResourceManager {
    pools: Vec<ResourcePool>,
    pool_index: HashMap<(String, String), PoolId>,
    queues: Vec<NamedQueue>,
    queue_index: HashMap<String, QueueId>,
    locations: HashMap<ResourceId, (usize, usize)>,
    calendar: ShiftCalendar,
    waiters: BTreeMap<u64, Waiter>,
    next_waiter: u64,
    allocations: HashMap<EventId, Allocation>,
    groups: BTreeMap<(EntityId, String), Vec<ResourceId>>,
    grants: Vec<Grant>,
    wakeups: Vec<(PoolId, SimTime)>,
    pending_wakeups: HashMap<PoolId, SimTime>,
}

impl ResourceManager {
    /// Builds pools and queues from configuration.
    ///
    /// Instance ids are assigned sequentially across pools in configuration
    /// order. The first `instances` of a pool follow its first shift group,
    /// the next ones the second group, and the rest are always on shift.
    pub fn new(config: &ResourcesConfig, origin: NaiveDateTime) -> Result<Self, ConfigError> {
        let mut pools = Vec::with_capacity(config.pools.len());
        let mut pool_index = HashMap::new();
        let mut locations = HashMap::new();
        let mut next_id = 0;

        for (p, pool) in config.pools.iter().enumerate() {
            let key = (pool.table.clone(), pool.resource_type.clone());
            if pool_index.insert(key, PoolId(p)).is_some() {
                return Err(ConfigError::InvalidResource(format!(
                    "duplicate pool `{}`/`{}`",
                    pool.table, pool.resource_type
                )));
            }

            let mut shifts = Vec::with_capacity(pool.shifts.len());
            let mut assignment = Vec::new();
            for (g, group) in pool.shifts.iter().enumerate() {
                let schedule = ShiftSchedule::new(group.schedule.clone()).map_err(|reason| {
                    ConfigError::InvalidResource(format!(
                        "pool `{}`/`{}`: {reason}",
                        pool.table, pool.resource_type
                    ))
                })?;
                shifts.push(schedule);
                assignment.extend(std::iter::repeat(g).take(group.instances as usize));
            }
            if assignment.len() > pool.capacity as usize {
                return Err(ConfigError::InvalidResource(format!(
                    "pool `{}`/`{}`: shifts cover {} instances but capacity is {}",
                    pool.table,
                    pool.resource_type,
                    assignment.len(),
                    pool.capacity
                )));
            }

            let instances = (0..pool.capacity as usize)
                .map(|i| {
                    next_id += 1;
                    let id = ResourceId(next_id);
                    locations.insert(id, (p, i));
                    Instance {
                        id,
                        shift: assignment.get(i).copied(),
                        held_by: None,
                        grouped: false,
                    }
                })
                .collect();
            pools.push(ResourcePool::new(
                pool.table.clone(),
                pool.resource_type.clone(),
                instances,
                shifts,
            ));
        }

        let mut queues = Vec::with_capacity(config.queues.len());
        let mut queue_index = HashMap::new();
        for (q, queue) in config.queues.iter().enumerate() {
            if queue_index.insert(queue.name.clone(), QueueId(q)).is_some() {
                return Err(ConfigError::InvalidResource(format!(
                    "duplicate queue `{}`",
                    queue.name
                )));
            }
            queues.push(NamedQueue {
                name: queue.name.clone(),
                discipline: queue.discipline.clone(),
            });
        }

        Ok(Self {
            pools,
            pool_index,
            queues,
            queue_index,
            locations,
            calendar: ShiftCalendar::new(origin),
            waiters: BTreeMap::new(),
            next_waiter: 0,
            allocations: HashMap::new(),
            groups: BTreeMap::new(),
            grants: Vec::new(),
            wakeups: Vec::new(),
            pending_wakeups: HashMap::new(),
        })
    }

    /// Looks up a pool by table and type.
    pub fn pool_id(&self, table: &str, resource_type: &str) -> Option<PoolId> {
        self.pool_index
            .get(&(table.to_string(), resource_type.to_string()))
            .copied()
    }

    /// Looks up a queue by name.
    pub fn queue_id(&self, name: &str) -> Option<QueueId> {
        self.queue_index.get(name).copied()
    }

    /// A configured queue.
    pub fn queue(&self, id: QueueId) -> Option<&NamedQueue> {
        self.queues.get(id.0)
    }

    /// The calendar used for shifts.
    pub fn calendar(&self) -> &ShiftCalendar {
        &self.calendar
    }

    /// `(table, type)` of the pool owning `resource`.
    pub fn describe(&self, resource: ResourceId) -> Option<(&str, &str)> {
        let (p, _) = self.locations.get(&resource)?;
        let pool = self.pools.get(*p)?;
        Some((pool.table.as_str(), pool.resource_type.as_str()))
    }

    /// Number of configured pools.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Configured instances of a pool.
    pub fn capacity(&self, pool: PoolId) -> u32 {
        self.pools.get(pool.0).map_or(0, ResourcePool::capacity)
    }

    /// Instances of a pool on shift at `now`.
    pub fn effective_capacity(&self, pool: PoolId, now: SimTime) -> u32 {
        let Some(p) = self.pools.get(pool.0) else {
            return 0;
        };
        let at = self.calendar.datetime_at(now);
        p.instances.iter().filter(|i| p.on_shift(i, at)).count() as u32
    }

    /// Instances of a pool currently held by an event or a group.
    pub fn in_use(&self, pool: PoolId) -> u32 {
        self.pools.get(pool.0).map_or(0, ResourcePool::in_use)
    }

    /// Requests resources. Either everything is granted now, or the request
    /// waits and is granted later through [`Self::take_grants`].
    pub fn acquire(&mut self, request: Request, now: SimTime) -> Acquisition {
        let event = request.event;
        let seq = self.next_waiter;
        self.next_waiter += 1;
        debug!(
            entity = %request.entity,
            event = %event,
            step = %request.step,
            "requesting resources"
        );
        self.waiters.insert(
            seq,
            Waiter {
                request,
                since: now,
            },
        );
        self.dispatch(now);

        if let Some(pos) = self.grants.iter().position(|g| g.event == event) {
            self.grants.remove(pos);
            return Acquisition::Granted;
        }
        debug!(event = %event, waiting = self.waiters.len(), "request queued");
        Acquisition::Queued
    }

    /// Resources held by an in-progress event.
    pub fn allocation(&self, event: EventId) -> Option<&Allocation> {
        self.allocations.get(&event)
    }

    /// Ends an event's hold on its resources.
    ///
    /// With `retain`, instances allocated for the event join the entity's
    /// group and stay held. Otherwise fresh instances are released together
    /// with the whole group. Waiters are dispatched afterwards.
    pub fn complete(&mut self, event: EventId, retain: bool, now: SimTime) -> Option<Allocation> {
        let allocation = self.allocations.remove(&event)?;
        let group = allocation.group.clone().filter(|_| retain);

        let mut freed = Vec::new();
        for id in allocation.resources() {
            let Some(instance) = self.instance_mut(id) else {
                continue;
            };
            instance.held_by = None;
            if let Some(g) = &group {
                if !instance.grouped {
                    instance.grouped = true;
                    self.groups
                        .entry((allocation.entity, g.clone()))
                        .or_default()
                        .push(id);
                }
            } else if !instance.grouped {
                freed.push(id);
            }
        }
        self.release_instances(&freed, now);

        match (&allocation.group, retain) {
            (Some(g), true) => {
                debug!(entity = %allocation.entity, group = %g, event = %event, "resources retained")
            }
            (Some(g), false) => self.release_group(allocation.entity, g, now),
            (None, _) => {}
        }
        self.dispatch(now);
        Some(allocation)
    }

    /// Adds instances to an entity's group.
    pub fn add_to_group(&mut self, entity: EntityId, group: &str, resources: &[ResourceId]) {
        for &id in resources {
            let Some(instance) = self.instance_mut(id) else {
                continue;
            };
            if instance.grouped {
                continue;
            }
            instance.grouped = true;
            self.groups
                .entry((entity, group.to_string()))
                .or_default()
                .push(id);
        }
    }

    /// Instances retained under `(entity, group)`.
    pub fn group_resources(&self, entity: EntityId, group: &str) -> &[ResourceId] {
        self.groups
            .get(&(entity, group.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Frees every instance retained under `(entity, group)` that is not
    /// currently lent to an event, and dispatches waiters.
    pub fn release_group(&mut self, entity: EntityId, group: &str, now: SimTime) {
        let Some(ids) = self.groups.remove(&(entity, group.to_string())) else {
            return;
        };
        let mut freed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(instance) = self.instance_mut(id) {
                instance.grouped = false;
                if instance.held_by.is_none() {
                    freed.push(id);
                }
            }
        }
        debug!(entity = %entity, group = %group, released = freed.len(), "group released");
        self.release_instances(&freed, now);
        self.dispatch(now);
    }

    /// Releases every group of an entity.
    pub fn release_entity(&mut self, entity: EntityId, now: SimTime) {
        let groups: Vec<String> = self
            .groups
            .keys()
            .filter(|(e, _)| *e == entity)
            .map(|(_, g)| g.clone())
            .collect();
        for group in groups {
            self.release_group(entity, &group, now);
        }
    }

    /// Withdraws every waiting request of a path. Returns whether one was found.
    pub fn cancel(&mut self, path: u64, now: SimTime) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|_, w| w.request.path != path);
        let removed = self.waiters.len() != before;
        if removed {
            // A withdrawn queue head may unblock the waiters behind it.
            self.dispatch(now);
        }
        removed
    }

    /// Re-runs dispatch when a pool's shift may have started.
    pub fn on_shift_change(&mut self, pool: PoolId, now: SimTime) {
        if self.pending_wakeups.get(&pool).is_some_and(|t| *t <= now) {
            self.pending_wakeups.remove(&pool);
        }
        debug!(pool = pool.0, now = %now, "shift change");
        self.dispatch(now);
    }

    /// Grants produced since the last call, in grant order.
    pub fn take_grants(&mut self) -> Vec<Grant> {
        std::mem::take(&mut self.grants)
    }

    /// Shift wake-ups the engine should schedule.
    pub fn take_wakeups(&mut self) -> Vec<(PoolId, SimTime)> {
        std::mem::take(&mut self.wakeups)
    }

    /// Number of waiting requests.
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    /// Every waiting request, oldest first.
    pub fn stalled(&self) -> Vec<StalledRequest> {
        self.waiters
            .values()
            .map(|w| StalledRequest {
                entity: w.request.entity,
                flow: w.request.flow.clone(),
                step: w.request.step.clone(),
                queue: w
                    .request
                    .queue
                    .and_then(|q| self.queues.get(q.0))
                    .map(|q| q.name.clone()),
                needs: w
                    .request
                    .needs
                    .iter()
                    .filter_map(|n| {
                        let pool = self.pools.get(n.pool.0)?;
                        Some((pool.table.clone(), pool.resource_type.clone(), n.count))
                    })
                    .collect(),
                waiting_since: w.since,
            })
            .collect()
    }

    /// Per-pool statistics with busy time integrated up to `end`.
    pub fn pool_reports(&mut self, end: SimTime) -> Vec<PoolReport> {
        self.pools.iter_mut().map(|p| p.report(end)).collect()
    }

    fn instance_mut(&mut self, id: ResourceId) -> Option<&mut Instance> {
        let (p, i) = *self.locations.get(&id)?;
        self.pools.get_mut(p)?.instances.get_mut(i)
    }

    fn instance(&self, id: ResourceId) -> Option<(PoolId, &Instance)> {
        let (p, i) = *self.locations.get(&id)?;
        Some((PoolId(p), self.pools.get(p)?.instances.get(i)?))
    }

    fn release_instances(&mut self, ids: &[ResourceId], now: SimTime) {
        for &id in ids {
            if let Some(&(p, _)) = self.locations.get(&id) {
                if let Some(pool) = self.pools.get_mut(p) {
                    pool.mark_released(1, now);
                }
            }
        }
    }

    /// Waiters allowed to be served now, in arrival order.
    fn candidates(&self) -> Vec<u64> {
        let mut candidates: Vec<u64> = self
            .waiters
            .iter()
            .filter(|(_, w)| w.request.queue.is_none())
            .map(|(seq, _)| *seq)
            .collect();
        for (q, queue) in self.queues.iter().enumerate() {
            let head = self
                .waiters
                .iter()
                .filter(|(_, w)| w.request.queue == Some(QueueId(q)))
                .min_by(|(sa, a), (sb, b)| {
                    queue.order(
                        (**sa, a.request.priority.as_ref()),
                        (**sb, b.request.priority.as_ref()),
                    )
                })
                .map(|(seq, _)| *seq);
            candidates.extend(head);
        }
        candidates.sort_unstable();
        candidates
    }

    fn dispatch(&mut self, now: SimTime) {
        'serve: loop {
            for seq in self.candidates() {
                if let Some((fresh, reused)) = self.plan(seq, now) {
                    self.grant(seq, fresh, reused, now);
                    continue 'serve;
                }
            }
            break;
        }
        self.schedule_wakeups(now);
    }

    /// Picks instances for a waiter without mutating anything.
    fn plan(&self, seq: u64, now: SimTime) -> Option<(Vec<ResourceId>, Vec<ResourceId>)> {
        let request = &self.waiters.get(&seq)?.request;
        let group = request
            .group
            .as_ref()
            .map(|g| self.group_resources(request.entity, g))
            .unwrap_or(&[]);
        let at = self.calendar.datetime_at(now);

        let mut fresh = Vec::new();
        let mut reused = Vec::new();
        for need in &request.needs {
            let mut remaining = need.count;
            for &id in group {
                if remaining == 0 {
                    break;
                }
                let reusable = !reused.contains(&id)
                    && self
                        .instance(id)
                        .is_some_and(|(p, i)| p == need.pool && i.held_by.is_none());
                if reusable {
                    reused.push(id);
                    remaining -= 1;
                }
            }

            let pool = self.pools.get(need.pool.0)?;
            for instance in &pool.instances {
                if remaining == 0 {
                    break;
                }
                if instance.is_free() && !fresh.contains(&instance.id) && pool.on_shift(instance, at)
                {
                    fresh.push(instance.id);
                    remaining -= 1;
                }
            }
            if remaining > 0 {
                return None;
            }
        }
        Some((fresh, reused))
    }

    fn grant(&mut self, seq: u64, fresh: Vec<ResourceId>, reused: Vec<ResourceId>, now: SimTime) {
        let Some(waiter) = self.waiters.remove(&seq) else {
            return;
        };
        let request = waiter.request;
        for &id in fresh.iter().chain(reused.iter()) {
            if let Some(instance) = self.instance_mut(id) {
                instance.held_by = Some(request.event);
            }
        }
        for &id in &fresh {
            if let Some(&(p, _)) = self.locations.get(&id) {
                if let Some(pool) = self.pools.get_mut(p) {
                    pool.mark_allocated(1, now);
                }
            }
        }
        debug!(
            entity = %request.entity,
            event = %request.event,
            fresh = fresh.len(),
            reused = reused.len(),
            waited = now - waiter.since,
            "resources granted"
        );
        self.allocations.insert(
            request.event,
            Allocation {
                event: request.event,
                entity: request.entity,
                group: request.group,
                fresh,
                reused,
                requested_at: waiter.since,
                acquired_at: now,
            },
        );
        self.grants.push(Grant {
            path: request.path,
            event: request.event,
        });
    }

    /// Asks for a wake-up at the next shift start of every pool that has a
    /// waiter and free instances that are off shift.
    fn schedule_wakeups(&mut self, now: SimTime) {
        let Some(at) = self.calendar.datetime_at(now) else {
            return;
        };
        let mut wanted: Vec<PoolId> = self
            .waiters
            .values()
            .flat_map(|w| w.request.needs.iter().map(|n| n.pool))
            .collect();
        wanted.sort_unstable();
        wanted.dedup();

        for id in wanted {
            let Some(pool) = self.pools.get(id.0) else {
                continue;
            };
            let next = pool
                .instances
                .iter()
                .filter(|i| i.is_free() && !pool.on_shift(i, Some(at)))
                .filter_map(|i| pool.shifts.get(i.shift?)?.next_start_after(at))
                .min();
            let Some(next) = next else {
                continue;
            };
            let when = self.calendar.sim_time_of(next);
            let already = self.pending_wakeups.get(&id).is_some_and(|t| *t <= when);
            if !already {
                self.pending_wakeups.insert(id, when);
                self.wakeups.push((id, when));
            }
        }
    }
}
