//! Core scheduling primitives.
//!
//! ## Submodules
//!
//! - `events` - Event types and the future-event list
//! - `rng` - Per-run seeded random source
//! - `world` - Simulated clock and scheduling

pub mod events;
pub mod rng;
pub mod world;

pub use events::{Event, EventQueue, ScheduledEvent};
pub use rng::SimRng;
pub use world::SimWorld;
