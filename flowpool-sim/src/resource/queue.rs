//! Named waiter queues.

use std::cmp::Ordering;

use flowpool_core::{QueueDiscipline, Value};

/// Index of a named queue inside the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(pub(crate) usize);

/// A configured queue.
#[derive(Debug, Clone)]
pub struct NamedQueue {
    pub(crate) name: String,
    pub(crate) discipline: QueueDiscipline,
}

impl NamedQueue {
    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute read for priority ordering, if any.
    pub fn priority_attribute(&self) -> Option<&str> {
        match &self.discipline {
            QueueDiscipline::Fifo => None,
            QueueDiscipline::Priority { attribute, .. } => Some(attribute),
        }
    }

    /// Service order of two waiters: `Less` means `a` is served first.
    ///
    /// `a` and `b` are `(arrival sequence, priority)`. Missing or incomparable
    /// priorities sort after present ones; ties go to the earlier arrival.
    pub fn order(&self, a: (u64, Option<&Value>), b: (u64, Option<&Value>)) -> Ordering {
        let by_arrival = a.0.cmp(&b.0);
        let ascending = match &self.discipline {
            QueueDiscipline::Fifo => return by_arrival,
            QueueDiscipline::Priority { ascending, .. } => *ascending,
        };
        let by_priority = match (a.1, b.1) {
            (Some(pa), Some(pb)) => match pa.compare(pb) {
                Some(ord) if ascending => ord,
                Some(ord) => ord.reverse(),
                None => Ordering::Equal,
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_priority.then(by_arrival)
    }
}
