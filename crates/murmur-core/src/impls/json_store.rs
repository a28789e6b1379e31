//! Command store backed by one JSON file per queue.
//!
//! Files are written to `<dir>/<queue>.json.tmp` and renamed over
//! `<dir>/<queue>.json`, so a crash mid-save leaves the previous file intact.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::ports::{CommandStore, StoreError};
use crate::queue::{CommandRecord, QueueType};

#[derive(Debug, Clone)]
pub struct JsonFileCommandStore {
    dir: PathBuf,
}

impl JsonFileCommandStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, queue: QueueType) -> PathBuf {
        self.dir.join(format!("{}.json", queue.file_stem()))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl CommandStore for JsonFileCommandStore {
    async fn save(&self, queue: QueueType, records: &[CommandRecord]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let target = self.path_for(queue);
        let temp = target.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(records).map_err(|source| StoreError::Corrupt {
            path: target.clone(),
            source,
        })?;

        fs::write(&temp, &bytes).await.map_err(|e| io_error(&temp, e))?;
        fs::rename(&temp, &target)
            .await
            .map_err(|e| io_error(&target, e))?;
        debug!(path = %target.display(), count = records.len(), "queue file written");
        Ok(())
    }

    async fn load(&self, queue: QueueType) -> Result<Vec<CommandRecord>, StoreError> {
        let path = self.path_for(queue);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt { path, source })
    }
}
