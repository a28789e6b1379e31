//! Event sinks: a recording sink with the process-wide exception counter, and
//! a sink that forwards events to `tracing`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, error, warn};

use crate::domain::EngineEvent;
use crate::ports::EventSink;

/// Records every event and counts unexpected failures.
#[derive(Debug, Default)]
pub struct CountingEventSink {
    events: Mutex<Vec<EngineEvent>>,
    exceptions: AtomicU64,
}

impl CountingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded events with this [`EngineEvent::name`].
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }

    /// Unexpected failures plus fatal stops seen so far.
    pub fn exception_count(&self) -> u64 {
        self.exceptions.load(Ordering::SeqCst)
    }
}

impl EventSink for CountingEventSink {
    fn emit(&self, event: &EngineEvent) {
        if matches!(
            event,
            EngineEvent::UnexpectedFailure { .. } | EngineEvent::Fatal { .. }
        ) {
            self.exceptions.fetch_add(1, Ordering::SeqCst);
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Logs events with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &EngineEvent) {
        match event {
            EngineEvent::Fatal { message } => error!(message = %message, "engine stopped"),
            EngineEvent::UnexpectedFailure {
                command_id,
                kind,
                message,
            } => warn!(command_id = %command_id, kind = %kind, message = %message, "unexpected failure"),
            other => debug!(event = other.name(), details = ?other, "engine event"),
        }
    }
}
