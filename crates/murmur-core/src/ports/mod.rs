//! Ports: the seams between the engine and the outside world.
//!
//! Each trait hides one collaborator (network backend, account directory,
//! durable store, clock, ...) so tests and the CLI can swap implementations.

pub mod accounts;
pub mod backend;
pub mod clock;
pub mod command_store;
pub mod event_sink;
pub mod id_generator;
pub mod markers;

pub use self::accounts::{AccountContext, AccountDirectory, OriginContext, OriginType};
pub use self::backend::{
    Backend, DiscoveredOrigin, FetchCounts, ItemKind, OutgoingItem, RateLimit, TimelineFetch,
    TimelineRequest,
};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::command_store::{CommandStore, StoreError};
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, SequentialIdGenerator};
pub use self::markers::SyncMarkers;
