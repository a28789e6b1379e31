//! IdGenerator port: command ids and creation timestamps.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::domain::{Command, CommandId, CommandKey};
use crate::ports::Clock;

/// Hands out command ids and creation timestamps, both strictly increasing.
pub trait IdGenerator: Send + Sync {
    /// Next `(id, created_at)` pair.
    fn next(&self) -> (CommandId, i64);

    /// Make sure future ids are above `max_id` (called after loading a store).
    fn observe(&self, max_id: CommandId);

    /// Build a fresh command for `key`.
    fn create(&self, key: CommandKey) -> Command {
        let (id, created_at) = self.next();
        Command::new(id, created_at, key)
    }
}

/// Counter-based generator. Timestamps come from the clock but never repeat:
/// two commands created in the same millisecond get consecutive stamps.
pub struct SequentialIdGenerator {
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
    last_stamp: AtomicI64,
}

impl SequentialIdGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_id: AtomicU64::new(1),
            last_stamp: AtomicI64::new(i64::MIN),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next(&self) -> (CommandId, i64) {
        let id = CommandId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = self.clock.now_millis();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        (id, now.max(previous.saturating_add(1)))
    }

    fn observe(&self, max_id: CommandId) {
        self.next_id
            .fetch_max(max_id.value().saturating_add(1), Ordering::SeqCst);
    }
}
