//! In-flight entities and their attributes.
//!
//! The store is owned by the engine and lent to step handlers by `&mut`.
//! Step execution is serialized, so there is never more than one writer.
//! An entity is dropped when its last path ends; only the counters remain.

use std::collections::BTreeMap;

use flowpool_core::{EntityId, SimTime, Value};

/// A simulated unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Unique id, also used as the backing row id.
    pub id: EntityId,
    /// Origin table.
    pub table: String,
    /// Simulated creation time.
    pub created_at: SimTime,
    attributes: BTreeMap<String, Value>,
    active_paths: u32,
}

impl Entity {
    /// Reads one attribute.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// All attributes, ordered by name.
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Number of paths of this entity still moving through a flow.
    pub fn active_paths(&self) -> u32 {
        self.active_paths
    }

    pub(crate) fn set_attribute(&mut self, name: &str, value: Value) {
        self.attributes.insert(name.to_string(), value);
    }
}

/// Owner of the entities still in flight.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
    next_row_id: u64,
    created: usize,
}

impl EntityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new entity with no attributes and no active path.
    pub fn create(&mut self, table: &str, now: SimTime) -> EntityId {
        let id = EntityId(self.allocate_row_id());
        self.entities.insert(
            id,
            Entity {
                id,
                table: table.to_string(),
                created_at: now,
                attributes: BTreeMap::new(),
                active_paths: 0,
            },
        );
        self.created += 1;
        id
    }

    /// Hands out the next row id. Entities and triggered rows share the
    /// sequence so ids are unique across tables.
    pub fn allocate_row_id(&mut self) -> u64 {
        self.next_row_id += 1;
        self.next_row_id
    }

    /// Writes one attribute; the last write wins. Unknown ids are ignored.
    pub fn set_attribute(&mut self, id: EntityId, name: &str, value: Value) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.set_attribute(name, value);
        }
    }

    /// Reads one attribute. `None` when the entity or attribute is absent.
    pub fn get_attribute(&self, id: EntityId, name: &str) -> Option<&Value> {
        self.entities.get(&id)?.attribute(name)
    }

    /// Snapshot of all attributes of an entity.
    pub fn get_all(&self, id: EntityId) -> Option<BTreeMap<String, Value>> {
        self.entities.get(&id).map(|e| e.attributes.clone())
    }

    /// Looks up an in-flight entity.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Registers one more path for the entity.
    pub fn add_path(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.active_paths += 1;
        }
    }

    /// Ends one path. Returns `true` when this was the entity's last path;
    /// the entity is then retired and removed from the store.
    pub fn end_path(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        entity.active_paths = entity.active_paths.saturating_sub(1);
        if entity.active_paths == 0 {
            self.entities.remove(&id);
            return true;
        }
        false
    }

    /// Total entities created.
    pub fn count(&self) -> usize {
        self.created
    }

    /// Entities not yet retired.
    pub fn in_flight(&self) -> usize {
        self.entities.len()
    }
}
