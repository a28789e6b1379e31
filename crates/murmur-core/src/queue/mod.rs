//! Queue module: queue types, priority ordering, per-queue storage and the
//! [`QueueSet`] that owns one queue per [`QueueType`].

mod command_queue;
mod priority;
mod record;
mod retry;
mod set;

pub use command_queue::{AddOutcome, Queue};
pub use priority::{PriorityKey, PriorityPolicy, default_rank};
pub use record::CommandRecord;
pub use retry::RetryPolicy;
pub use set::{Admission, CancelOutcome, QueueSet};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::CommandId;
use crate::ports::StoreError;

/// The queues a command can live in. A command identity is in at most one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueType {
    /// Ready to execute, in priority order.
    Current,
    /// Soft-failed, waiting for a cooldown to elapse.
    Retry,
    /// Retries exhausted or suppressed while the app was in the foreground.
    Skipped,
    /// Hard-failed. Waits for a manual relaunch.
    Error,
    /// Executed successfully, kept for reporting only.
    Done,
}

impl QueueType {
    pub const ALL: [QueueType; 5] = [
        QueueType::Current,
        QueueType::Retry,
        QueueType::Skipped,
        QueueType::Error,
        QueueType::Done,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            QueueType::Current => 0,
            QueueType::Retry => 1,
            QueueType::Skipped => 2,
            QueueType::Error => 3,
            QueueType::Done => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueueType::Current => "CURRENT",
            QueueType::Retry => "RETRY",
            QueueType::Skipped => "SKIPPED",
            QueueType::Error => "ERROR",
            QueueType::Done => "DONE",
        }
    }

    /// Stable lowercase name, used for file names.
    pub fn file_stem(self) -> &'static str {
        match self {
            QueueType::Current => "current",
            QueueType::Retry => "retry",
            QueueType::Skipped => "skipped",
            QueueType::Error => "error",
            QueueType::Done => "done",
        }
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue invariant violations and persistence failures.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("command {command_id} found in more than one queue: {queues:?}")]
    MultipleQueues {
        command_id: CommandId,
        queues: Vec<QueueType>,
    },

    #[error("command {command_id} is already in {queue}")]
    AlreadyQueued {
        command_id: CommandId,
        queue: QueueType,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    /// Errors after which the queue contents can no longer be trusted or saved.
    pub fn is_fatal(&self) -> bool {
        matches!(self, QueueError::MultipleQueues { .. } | QueueError::Store(_))
    }
}
