//! Simulation clock and scheduling core.
//!
//! `SimWorld` owns the simulated clock and the future-event list. Time only
//! advances when [`SimWorld::next_event`] pops an event; nothing else moves
//! the clock.

use flowpool_core::SimTime;
use tracing::instrument;

use super::events::{Event, EventQueue, ScheduledEvent};

/// The central scheduling coordinator.
#[derive(Debug, Default)]
pub struct SimWorld {
    current_time: SimTime,
    event_queue: EventQueue,
    next_sequence: u64,
    events_processed: u64,
}

impl SimWorld {
    /// Creates an empty world at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current simulation time.
    pub fn now(&self) -> SimTime {
        self.current_time
    }

    /// Schedules an event to execute after `delay` minutes.
    ///
    /// Negative or non-finite delays schedule at the current time.
    #[instrument(skip(self), level = "trace")]
    pub fn schedule_event(&mut self, event: Event, delay: f64) {
        let delay = if delay.is_finite() { delay.max(0.0) } else { 0.0 };
        let time = self.current_time + delay;
        self.schedule_event_at(event, time);
    }

    /// Schedules an event at an absolute time, never earlier than now.
    pub fn schedule_event_at(&mut self, event: Event, time: SimTime) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let time = time.max(self.current_time);
        self.event_queue
            .schedule(ScheduledEvent::new(time, event, sequence));
    }

    /// Pops the earliest event if it is due at or before `horizon`, advancing
    /// the clock to its timestamp.
    pub fn next_event(&mut self, horizon: SimTime) -> Option<Event> {
        let due = self
            .event_queue
            .peek_earliest()
            .is_some_and(|e| e.time() <= horizon);
        if !due {
            return None;
        }
        let scheduled = self.event_queue.pop_earliest()?;
        self.current_time = scheduled.time();
        self.events_processed += 1;
        Some(scheduled.into_event())
    }

    /// Time of the earliest pending event.
    pub fn next_event_time(&self) -> Option<SimTime> {
        self.event_queue.peek_earliest().map(ScheduledEvent::time)
    }

    /// Returns `true` if there are events waiting to be processed.
    pub fn has_pending_events(&self) -> bool {
        !self.event_queue.is_empty()
    }

    /// Returns the number of events waiting to be processed.
    pub fn pending_event_count(&self) -> usize {
        self.event_queue.len()
    }

    /// Number of events popped so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(minutes: f64) -> SimTime {
        SimTime::from_minutes(minutes)
    }

    #[test]
    fn clock_advances_only_on_pop() {
        let mut world = SimWorld::new();
        world.schedule_event(Event::Resume { path: 1 }, 10.0);
        world.schedule_event(Event::Resume { path: 2 }, 5.0);
        assert_eq!(world.now(), SimTime::ZERO);
        assert_eq!(world.pending_event_count(), 2);

        assert_eq!(world.next_event(at(100.0)), Some(Event::Resume { path: 2 }));
        assert_eq!(world.now(), at(5.0));
        assert_eq!(world.next_event(at(100.0)), Some(Event::Resume { path: 1 }));
        assert_eq!(world.now(), at(10.0));
        assert_eq!(world.events_processed(), 2);
        assert!(!world.has_pending_events());
    }

    #[test]
    fn horizon_stops_popping() {
        let mut world = SimWorld::new();
        world.schedule_event(Event::Arrival { source: 0 }, 50.0);
        assert_eq!(world.next_event(at(40.0)), None);
        assert_eq!(world.now(), SimTime::ZERO);
        assert_eq!(world.next_event_time(), Some(at(50.0)));
        assert_eq!(world.next_event(at(50.0)), Some(Event::Arrival { source: 0 }));
    }

    #[test]
    fn relative_delays_are_clamped() {
        let mut world = SimWorld::new();
        world.schedule_event(Event::Resume { path: 1 }, 4.0);
        world.next_event(at(10.0));
        world.schedule_event(Event::Resume { path: 2 }, -3.0);
        world.schedule_event_at(Event::Resume { path: 3 }, at(1.0));
        assert_eq!(world.next_event_time(), Some(at(4.0)));
        assert_eq!(world.next_event(at(10.0)), Some(Event::Resume { path: 2 }));
        assert_eq!(world.next_event(at(10.0)), Some(Event::Resume { path: 3 }));
        assert_eq!(world.now(), at(4.0));
    }
}
