//! Resource pool, queue and shift configuration.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::DistributionSpec;

fn one() -> DistributionSpec {
    DistributionSpec::Number(1.0)
}

/// All resource definitions of a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Typed pools.
    #[serde(default)]
    pub pools: Vec<ResourcePoolConfig>,
    /// Named waiter queues.
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
}

/// A typed pool of interchangeable resource instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePoolConfig {
    /// Table the instances live in.
    pub table: String,
    /// Type value distinguishing pools within one table.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Number of instances.
    pub capacity: u32,
    /// Shift groups. Instances not covered by a group are always on shift.
    #[serde(default)]
    pub shifts: Vec<ShiftGroup>,
}

/// A block of instances sharing one on-shift calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftGroup {
    /// How many of the pool's instances follow this schedule.
    pub instances: u32,
    /// On-shift windows. An instance is on shift inside any of them.
    pub schedule: Vec<ShiftWindow>,
}

/// A recurring daily on-shift window.
///
/// `end <= start` denotes a window that crosses midnight; it belongs to the
/// day it starts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftWindow {
    /// Days the window starts on. Empty means every day.
    #[serde(default)]
    pub days: Vec<Weekday>,
    /// Start time of day.
    pub start: NaiveTime,
    /// End time of day.
    pub end: NaiveTime,
}

/// Order in which a named queue serves its waiters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum QueueDiscipline {
    /// First come, first served.
    #[default]
    Fifo,
    /// Highest attribute value first (lowest with `ascending`); ties by arrival.
    Priority {
        /// Entity attribute holding the priority.
        attribute: String,
        /// Serve lower values first.
        #[serde(default)]
        ascending: bool,
    },
}

/// A named waiter queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name referenced by requirements.
    pub name: String,
    /// Service order.
    #[serde(default)]
    pub discipline: QueueDiscipline,
}

/// One line of an Event step's resource needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    /// Resource table.
    pub table: String,
    /// Resource type within the table.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// How many instances. May be sampled.
    #[serde(default = "one")]
    pub count: DistributionSpec,
    /// Queue that orders waiters for this request.
    #[serde(default)]
    pub queue: Option<String>,
}
