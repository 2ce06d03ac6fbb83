//! Moderation events
//!
//! Everything the engine does that an operator may need to audit (fail-open
//! classifications, strikes, conflicts, bans, deliveries) is published here
//! in addition to being logged.

pub mod bus;
pub mod types;

pub use bus::{drain_matching, EventBus, EventFilter, SharedEventBus};
pub use types::ModerationEvent;
