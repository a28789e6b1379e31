//! In-memory command store and sync markers, for tests and the demo.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::{AccountId, TimelineType};
use crate::ports::{CommandStore, StoreError, SyncMarkers};
use crate::queue::{CommandRecord, QueueType};

/// Keeps saved queues in a map. Can be switched to "unavailable" to exercise
/// the fatal-store path.
#[derive(Debug)]
pub struct InMemoryCommandStore {
    queues: Mutex<HashMap<QueueType, Vec<CommandRecord>>>,
    available: AtomicBool,
    saves: AtomicUsize,
}

impl InMemoryCommandStore {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// What was last saved for `queue`.
    pub fn records(&self, queue: QueueType) -> Vec<CommandRecord> {
        let queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.get(&queue).cloned().unwrap_or_default()
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store switched off".into()))
        }
    }
}

impl Default for InMemoryCommandStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandStore for InMemoryCommandStore {
    async fn save(&self, queue: QueueType, records: &[CommandRecord]) -> Result<(), StoreError> {
        self.check_available()?;
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.insert(queue, records.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, queue: QueueType) -> Result<Vec<CommandRecord>, StoreError> {
        self.check_available()?;
        Ok(self.records(queue))
    }
}

/// Since-markers kept in a map.
#[derive(Debug, Default)]
pub struct InMemorySyncMarkers {
    markers: Mutex<HashMap<(AccountId, TimelineType), String>>,
}

impl InMemorySyncMarkers {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncMarkers for InMemorySyncMarkers {
    fn since(&self, account: AccountId, timeline: TimelineType) -> Option<String> {
        let markers = self.markers.lock().unwrap_or_else(PoisonError::into_inner);
        markers.get(&(account, timeline)).cloned()
    }

    fn record(&self, account: AccountId, timeline: TimelineType, marker: String) {
        let mut markers = self.markers.lock().unwrap_or_else(PoisonError::into_inner);
        markers.insert((account, timeline), marker);
    }
}
