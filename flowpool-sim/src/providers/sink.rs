//! Persistence collaborator interface and in-memory implementations.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use flowpool_core::{EntityId, EventId, ResourceId, SimTime, SinkError, Value};
use tracing::warn;

/// Receives the run's output records.
///
/// Calls are fire-and-forget from the engine's point of view: a failure is
/// logged and the run carries on with its in-memory state untouched.
pub trait RecordSink {
    /// An entity row was created.
    fn record_entity_created(
        &mut self,
        table: &str,
        id: EntityId,
        at: SimTime,
    ) -> Result<(), SinkError>;

    /// An Event step finished.
    fn record_event_processed(
        &mut self,
        flow: &str,
        event: EventId,
        entity: EntityId,
        start: SimTime,
        end: SimTime,
    ) -> Result<(), SinkError>;

    /// A resource instance was held by an event from `start` to `end`.
    fn record_resource_allocated(
        &mut self,
        event: EventId,
        resource_table: &str,
        resource: ResourceId,
        start: SimTime,
        end: SimTime,
        extra: &BTreeMap<String, Value>,
    ) -> Result<(), SinkError>;

    /// Writes columns of a row, creating the row when it does not exist.
    fn update_entity_columns(
        &mut self,
        table: &str,
        row: u64,
        columns: &BTreeMap<String, Value>,
    ) -> Result<(), SinkError>;
}

/// A sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn record_entity_created(&mut self, _: &str, _: EntityId, _: SimTime) -> Result<(), SinkError> {
        Ok(())
    }

    fn record_event_processed(
        &mut self,
        _: &str,
        _: EventId,
        _: EntityId,
        _: SimTime,
        _: SimTime,
    ) -> Result<(), SinkError> {
        Ok(())
    }

    fn record_resource_allocated(
        &mut self,
        _: EventId,
        _: &str,
        _: ResourceId,
        _: SimTime,
        _: SimTime,
        _: &BTreeMap<String, Value>,
    ) -> Result<(), SinkError> {
        Ok(())
    }

    fn update_entity_columns(
        &mut self,
        _: &str,
        _: u64,
        _: &BTreeMap<String, Value>,
    ) -> Result<(), SinkError> {
        Ok(())
    }
}

/// `record_entity_created` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    /// Table.
    pub table: String,
    /// Entity id.
    pub id: EntityId,
    /// Creation time.
    pub at: SimTime,
}

/// `record_event_processed` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Flow id.
    pub flow: String,
    /// Event id.
    pub event: EventId,
    /// Entity id.
    pub entity: EntityId,
    /// Acquisition time.
    pub start: SimTime,
    /// Completion time.
    pub end: SimTime,
}

/// `record_resource_allocated` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRecord {
    /// Event id.
    pub event: EventId,
    /// Resource table.
    pub resource_table: String,
    /// Resource instance.
    pub resource: ResourceId,
    /// Hold start.
    pub start: SimTime,
    /// Hold end.
    pub end: SimTime,
    /// Extra attributes.
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct MemoryRecords {
    entities: Vec<EntityRecord>,
    events: Vec<EventRecord>,
    allocations: Vec<AllocationRecord>,
    rows: BTreeMap<(String, u64), BTreeMap<String, Value>>,
    failing: bool,
}

/// A shared in-memory sink.
///
/// Clones share the same records, so a test keeps one handle and passes
/// another to the builder.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    inner: Rc<RefCell<MemoryRecords>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail without storing anything.
    pub fn set_failing(&self, failing: bool) {
        self.inner.borrow_mut().failing = failing;
    }

    /// Created entities, in creation order.
    pub fn entities(&self) -> Vec<EntityRecord> {
        self.inner.borrow().entities.clone()
    }

    /// Finished events, in completion order.
    pub fn events(&self) -> Vec<EventRecord> {
        self.inner.borrow().events.clone()
    }

    /// Resource holds, in completion order.
    pub fn allocations(&self) -> Vec<AllocationRecord> {
        self.inner.borrow().allocations.clone()
    }

    /// Columns written to one row.
    pub fn row(&self, table: &str, row: u64) -> Option<BTreeMap<String, Value>> {
        self.inner
            .borrow()
            .rows
            .get(&(table.to_string(), row))
            .cloned()
    }

    /// Every row of a table, by row id.
    pub fn rows(&self, table: &str) -> Vec<(u64, BTreeMap<String, Value>)> {
        self.inner
            .borrow()
            .rows
            .iter()
            .filter(|((t, _), _)| t == table)
            .map(|((_, id), columns)| (*id, columns.clone()))
            .collect()
    }

    fn with<F>(&self, f: F) -> Result<(), SinkError>
    where
        F: FnOnce(&mut MemoryRecords),
    {
        let mut records = self.inner.borrow_mut();
        if records.failing {
            return Err(SinkError("memory sink set to fail".to_string()));
        }
        f(&mut records);
        Ok(())
    }
}

impl RecordSink for MemorySink {
    fn record_entity_created(
        &mut self,
        table: &str,
        id: EntityId,
        at: SimTime,
    ) -> Result<(), SinkError> {
        self.with(|r| {
            r.entities.push(EntityRecord {
                table: table.to_string(),
                id,
                at,
            })
        })
    }

    fn record_event_processed(
        &mut self,
        flow: &str,
        event: EventId,
        entity: EntityId,
        start: SimTime,
        end: SimTime,
    ) -> Result<(), SinkError> {
        self.with(|r| {
            r.events.push(EventRecord {
                flow: flow.to_string(),
                event,
                entity,
                start,
                end,
            })
        })
    }

    fn record_resource_allocated(
        &mut self,
        event: EventId,
        resource_table: &str,
        resource: ResourceId,
        start: SimTime,
        end: SimTime,
        extra: &BTreeMap<String, Value>,
    ) -> Result<(), SinkError> {
        self.with(|r| {
            r.allocations.push(AllocationRecord {
                event,
                resource_table: resource_table.to_string(),
                resource,
                start,
                end,
                extra: extra.clone(),
            })
        })
    }

    fn update_entity_columns(
        &mut self,
        table: &str,
        row: u64,
        columns: &BTreeMap<String, Value>,
    ) -> Result<(), SinkError> {
        self.with(|r| {
            r.rows
                .entry((table.to_string(), row))
                .or_default()
                .extend(columns.iter().map(|(k, v)| (k.clone(), v.clone())))
        })
    }
}

/// Wraps a sink so failures are logged instead of propagated.
pub(crate) struct Recorder {
    sink: Box<dyn RecordSink>,
    failures: u64,
}

impl Recorder {
    pub fn new(sink: Box<dyn RecordSink>) -> Self {
        Self { sink, failures: 0 }
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    fn check(&mut self, what: &str, result: Result<(), SinkError>) {
        if let Err(err) = result {
            self.failures += 1;
            warn!(record = what, error = %err, "sink rejected record");
        }
    }

    pub fn entity_created(&mut self, table: &str, id: EntityId, at: SimTime) {
        let result = self.sink.record_entity_created(table, id, at);
        self.check("entity_created", result);
    }

    pub fn event_processed(
        &mut self,
        flow: &str,
        event: EventId,
        entity: EntityId,
        start: SimTime,
        end: SimTime,
    ) {
        let result = self
            .sink
            .record_event_processed(flow, event, entity, start, end);
        self.check("event_processed", result);
    }

    pub fn resource_allocated(
        &mut self,
        event: EventId,
        resource_table: &str,
        resource: ResourceId,
        span: (SimTime, SimTime),
        extra: &BTreeMap<String, Value>,
    ) {
        let result = self.sink.record_resource_allocated(
            event,
            resource_table,
            resource,
            span.0,
            span.1,
            extra,
        );
        self.check("resource_allocated", result);
    }

    pub fn columns(&mut self, table: &str, row: u64, columns: &BTreeMap<String, Value>) {
        if columns.is_empty() {
            return;
        }
        let result = self.sink.update_entity_columns(table, row, columns);
        self.check("entity_columns", result);
    }
}
