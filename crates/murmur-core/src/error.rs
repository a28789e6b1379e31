use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::{CommandId, SchedulerState};
use crate::queue::QueueError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("command {0} not found in SKIPPED or ERROR")]
    CommandNotFound(CommandId),

    #[error("scheduler stopped after a fatal error: {0}")]
    Fatal(String),

    #[error("scheduler is {0}")]
    NotRunning(SchedulerState),

    #[error("service task failed: {0}")]
    ServiceTask(String),
}
