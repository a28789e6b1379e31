//! Port implementations for tests, the demo and single-process use.

pub mod counting_sink;
pub mod inmem_accounts;
pub mod inmem_store;
pub mod json_store;
pub mod scripted_backend;

pub use self::counting_sink::{CountingEventSink, TracingEventSink};
pub use self::inmem_accounts::InMemoryAccountDirectory;
pub use self::inmem_store::{InMemoryCommandStore, InMemorySyncMarkers};
pub use self::json_store::JsonFileCommandStore;
pub use self::scripted_backend::{BackendCall, ScriptedBackend, Step};
