//! Command store port: durable per-queue record sequences.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::queue::{CommandRecord, QueueType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("command store unavailable: {0}")]
    Unavailable(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt queue file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persists the ordered contents of each queue.
///
/// `save` replaces whatever was stored for the queue. `load` of a queue that
/// was never saved returns an empty list.
#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn save(&self, queue: QueueType, records: &[CommandRecord]) -> Result<(), StoreError>;

    async fn load(&self, queue: QueueType) -> Result<Vec<CommandRecord>, StoreError>;
}
