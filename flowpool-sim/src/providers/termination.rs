//! Externally polled stop conditions for arrival sources.

use flowpool_core::SimTime;

/// Snapshot handed to termination conditions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStatus {
    /// Current simulated time.
    pub now: SimTime,
    /// Entities created so far.
    pub entities_created: usize,
    /// Event steps completed so far.
    pub events_completed: u64,
    /// Entities with a live path.
    pub in_flight: usize,
}

/// A condition that, once true, stops every arrival source.
///
/// It is polled at each arrival and each step boundary. Entities already in
/// a flow keep running until the horizon.
pub trait TerminationCondition {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Whether sources should stop.
    fn should_stop(&self, status: &RunStatus) -> bool;
}

/// Create a boxed termination condition from a name and closure.
///
/// ```ignore
/// let stop = termination_fn("hundred_done", |s| s.events_completed >= 100);
/// ```
pub fn termination_fn<F>(name: &str, check: F) -> Box<dyn TerminationCondition>
where
    F: Fn(&RunStatus) -> bool + 'static,
{
    Box::new(FnTermination {
        name: name.to_string(),
        check,
    })
}

struct FnTermination<F> {
    name: String,
    check: F,
}

impl<F> TerminationCondition for FnTermination<F>
where
    F: Fn(&RunStatus) -> bool,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn should_stop(&self, status: &RunStatus) -> bool {
        (self.check)(status)
    }
}
