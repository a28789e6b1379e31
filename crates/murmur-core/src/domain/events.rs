//! Engine events.
//!
//! Everything interesting the scheduler does is reported as an [`EngineEvent`]
//! through the [`EventSink`](crate::ports::EventSink) port. Events are
//! informational: dropping them never changes queue state.

use serde::Serialize;

use super::{CommandId, CommandKind, ErrorKind, SchedulerState};
use crate::queue::QueueType;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    StateChanged {
        from: SchedulerState,
        to: SchedulerState,
    },
    /// A command was admitted into a queue.
    Queued {
        command_id: CommandId,
        kind: CommandKind,
        queue: QueueType,
    },
    /// An enqueue was dropped because an equal command is pending or executing.
    Duplicate {
        command_id: CommandId,
        existing: CommandId,
    },
    /// A command finished an attempt (or was suppressed) and was routed.
    Executed {
        command_id: CommandId,
        kind: CommandKind,
        routed_to: QueueType,
        items_added: u64,
    },
    /// A failure the backend could not classify, or a local storage failure.
    UnexpectedFailure {
        command_id: CommandId,
        kind: ErrorKind,
        message: String,
    },
    Cancelled {
        command_id: CommandId,
    },
    Relaunched {
        command_id: CommandId,
    },
    /// The scheduler stopped itself. No drains happen until an explicit restart.
    Fatal {
        message: String,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::StateChanged { .. } => "state_changed",
            EngineEvent::Queued { .. } => "queued",
            EngineEvent::Duplicate { .. } => "duplicate",
            EngineEvent::Executed { .. } => "executed",
            EngineEvent::UnexpectedFailure { .. } => "unexpected_failure",
            EngineEvent::Cancelled { .. } => "cancelled",
            EngineEvent::Relaunched { .. } => "relaunched",
            EngineEvent::Fatal { .. } => "fatal",
        }
    }
}
