//! EventSink port: where engine events go.

use crate::domain::EngineEvent;

/// Receives [`EngineEvent`]s. Must not block: it is called with no locks held
/// but on the scheduler's task.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &EngineEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &EngineEvent) {}
}
