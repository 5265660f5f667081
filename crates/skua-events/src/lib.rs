//! Event primitives for the Skua integration runtime.
//!
//! Layout: `payloads.rs` (application-level event types and envelopes),
//! `bus.rs` (replayable broadcast bus carrying those events), `router.rs`
//! (per-key update router used by the torrent catalog for hash-scoped and
//! wildcard subscriptions).

pub mod bus;
pub mod payloads;
pub mod router;

pub use bus::{EventBus, EventStream};
pub use payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
pub use router::{UpdateRouter, UpdateStream};
