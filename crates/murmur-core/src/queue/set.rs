//! QueueSet: one [`Queue`] per [`QueueType`] behind a single async mutex.
//!
//! Every mutation (admission, routing, moves, save, load) runs under that
//! mutex, so a command identity is observed in at most one queue at any time.
//! A command being executed is held outside the queues ("in flight") and only
//! its identity is remembered here, which keeps backend calls lock-free.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::{AddOutcome, CommandRecord, PriorityPolicy, Queue, QueueError, QueueType};
use crate::domain::{Command, CommandId, CommandKey, Decision};
use crate::observability::QueueCounts;
use crate::ports::CommandStore;

/// Result of [`QueueSet::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued(QueueType),
    /// An equal command is pending or executing; the new one was dropped.
    Duplicate(CommandId),
}

/// Result of [`QueueSet::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Removed(QueueType),
    /// The command is executing; it is discarded when the attempt ends.
    InFlight,
    NotFound,
}

#[derive(Debug)]
struct InFlight {
    id: CommandId,
    key: CommandKey,
    cancelled: bool,
}

struct QueueTable {
    queues: [Queue; 5],
    in_flight: Option<InFlight>,
}

impl QueueTable {
    fn new(policy: &Arc<PriorityPolicy>) -> Self {
        Self {
            queues: QueueType::ALL.map(|qt| Queue::new(qt, Arc::clone(policy))),
            in_flight: None,
        }
    }

    fn queue(&self, queue: QueueType) -> &Queue {
        &self.queues[queue.index()]
    }

    fn queue_mut(&mut self, queue: QueueType) -> &mut Queue {
        &mut self.queues[queue.index()]
    }

    fn locate(&self, key: &CommandKey) -> Result<Option<(QueueType, CommandId)>, QueueError> {
        let found: Vec<(QueueType, CommandId)> = QueueType::ALL
            .into_iter()
            .filter_map(|qt| self.queue(qt).get(key).map(|c| (qt, c.id())))
            .collect();
        match found.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(*one)),
            [(_, command_id), ..] => Err(QueueError::MultipleQueues {
                command_id: *command_id,
                queues: found.iter().map(|(qt, _)| *qt).collect(),
            }),
        }
    }

    fn find_by_id(&self, id: CommandId) -> Option<(QueueType, &Command)> {
        QueueType::ALL
            .into_iter()
            .find_map(|qt| self.queue(qt).get_by_id(id).map(|c| (qt, c)))
    }

    fn insert(&mut self, queue: QueueType, command: Command) -> Result<AddOutcome, QueueError> {
        if let Some((other, _)) = self.locate(command.key())?
            && other != queue
        {
            return Err(QueueError::AlreadyQueued {
                command_id: command.id(),
                queue: other,
            });
        }
        Ok(self.queue_mut(queue).add(command))
    }

    fn admit(&mut self, command: Command, target: QueueType) -> Result<Admission, QueueError> {
        let existing = self.locate(command.key())?;

        if command.manually_launched() {
            if let Some((qt, _)) = existing {
                self.queue_mut(qt).remove(command.key());
            }
            self.queue_mut(QueueType::Current).add(command);
            return Ok(Admission::Queued(QueueType::Current));
        }

        if let Some(flight) = &self.in_flight
            && !flight.cancelled
            && flight.key == *command.key()
        {
            return Ok(Admission::Duplicate(flight.id));
        }

        match existing {
            Some((QueueType::Current | QueueType::Retry, id)) => {
                return Ok(Admission::Duplicate(id));
            }
            Some((qt, id)) => {
                debug!(command_id = %id, queue = %qt, "superseded by a new command");
                self.queue_mut(qt).remove(command.key());
            }
            None => {}
        }
        self.queue_mut(target).add(command);
        Ok(Admission::Queued(target))
    }

    fn promote_due(&mut self, now: i64) -> usize {
        let due = self.queue_mut(QueueType::Retry).take_due(now);
        let count = due.len();
        for mut command in due {
            command.requeue_at(now);
            self.queue_mut(QueueType::Current).add(command);
        }
        count
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for qt in QueueType::ALL {
            counts.set(qt, self.queue(qt).size());
        }
        counts.executing = usize::from(self.in_flight.is_some());
        counts
    }
}

/// The set of all queues, owned by one scheduler.
pub struct QueueSet {
    table: Mutex<QueueTable>,
    store: Arc<dyn CommandStore>,
    retain_done: usize,
}

impl QueueSet {
    pub fn new(store: Arc<dyn CommandStore>, policy: Arc<PriorityPolicy>) -> Self {
        Self {
            table: Mutex::new(QueueTable::new(&policy)),
            store,
            retain_done: 0,
        }
    }

    /// Keep up to `retain_done` successful commands in `DONE`.
    pub fn with_retain_done(mut self, retain_done: usize) -> Self {
        self.retain_done = retain_done;
        self
    }

    /// Snapshot of one queue.
    pub async fn get(&self, queue: QueueType) -> Queue {
        self.table.lock().await.queue(queue).clone()
    }

    pub async fn size(&self, queue: QueueType) -> usize {
        self.table.lock().await.queue(queue).size()
    }

    /// Put a command straight into `queue`.
    ///
    /// Fails with [`QueueError::AlreadyQueued`] when the identity lives in a
    /// different queue.
    pub async fn add(&self, queue: QueueType, command: Command) -> Result<AddOutcome, QueueError> {
        self.table.lock().await.insert(queue, command)
    }

    pub async fn poll(&self, queue: QueueType) -> Option<Command> {
        self.table.lock().await.queue_mut(queue).poll()
    }

    /// Remove an identity from whichever queue holds it.
    pub async fn remove(&self, key: &CommandKey) -> Option<(QueueType, Command)> {
        let mut table = self.table.lock().await;
        QueueType::ALL
            .into_iter()
            .find_map(|qt| table.queue_mut(qt).remove(key).map(|c| (qt, c)))
    }

    pub async fn in_which_queue(&self, key: &CommandKey) -> Result<Option<QueueType>, QueueError> {
        Ok(self.table.lock().await.locate(key)?.map(|(qt, _)| qt))
    }

    /// The stored instance of an identity, with its result.
    pub async fn get_from_any_queue(&self, key: &CommandKey) -> Option<Command> {
        let table = self.table.lock().await;
        QueueType::ALL
            .into_iter()
            .find_map(|qt| table.queue(qt).get(key).cloned())
    }

    pub async fn find(&self, id: CommandId) -> Option<(QueueType, Command)> {
        let table = self.table.lock().await;
        table.find_by_id(id).map(|(qt, c)| (qt, c.clone()))
    }

    /// Move an identity between queues. No-op (returns `false`) when it is not in `from`.
    pub async fn move_command(
        &self,
        key: &CommandKey,
        from: QueueType,
        to: QueueType,
    ) -> Result<bool, QueueError> {
        let mut table = self.table.lock().await;
        let Some(command) = table.queue_mut(from).remove(key) else {
            return Ok(false);
        };
        table.insert(to, command)?;
        Ok(true)
    }

    /// Admit a new command with duplicate suppression.
    ///
    /// - manual launch: any existing copy is replaced, the command goes to `CURRENT`
    /// - an equal command executing, in `CURRENT` or in `RETRY`: `Duplicate`
    /// - an equal command in `SKIPPED`, `ERROR` or `DONE`: superseded
    pub async fn admit(&self, command: Command, target: QueueType) -> Result<Admission, QueueError> {
        self.table.lock().await.admit(command, target)
    }

    /// Promote due retries and take the next command to execute.
    pub async fn begin_next(&self, now: i64) -> Option<Command> {
        let mut table = self.table.lock().await;
        table.promote_due(now);
        let command = table.queue_mut(QueueType::Current).poll()?;
        table.in_flight = Some(InFlight {
            id: command.id(),
            key: command.key().clone(),
            cancelled: false,
        });
        Some(command)
    }

    /// Route a command that finished an attempt.
    ///
    /// Returns the queue it was routed to (`DONE` also when it was discarded),
    /// or `None` when it was cancelled or re-enqueued while executing.
    pub async fn finish(
        &self,
        mut command: Command,
        decision: &Decision,
        now: i64,
    ) -> Result<Option<QueueType>, QueueError> {
        let mut table = self.table.lock().await;
        let flight = table.in_flight.take();
        if flight.is_some_and(|f| f.id == command.id() && f.cancelled) {
            debug!(command_id = %command.id(), "cancelled while executing, discarded");
            return Ok(None);
        }
        command.set_manually_launched(false);
        let target = decision.target_queue();
        let existing = match table.locate(command.key()) {
            Ok(existing) => existing,
            Err(err) => {
                // keep it so the fatal save still persists it
                error!(command_id = %command.id(), queue = %target, error = %err, "queue invariant broken while finishing");
                table.queue_mut(target).add(command);
                return Err(err);
            }
        };
        if let Some((qt, id)) = existing {
            debug!(command_id = %command.id(), newer = %id, queue = %qt, "re-enqueued while executing");
            return Ok(None);
        }

        match decision {
            Decision::Done if self.retain_done == 0 => return Ok(Some(QueueType::Done)),
            Decision::Done => {
                table.queue_mut(QueueType::Done).add(command);
                table.queue_mut(QueueType::Done).evict_oldest_executed(self.retain_done);
                return Ok(Some(QueueType::Done));
            }
            Decision::Retry { delay, .. } if !delay.is_zero() => {
                command.schedule_retry(now.saturating_add(millis(*delay)));
            }
            Decision::Retry { .. } => command.requeue_at(now),
            Decision::Skip { .. } | Decision::Error { .. } => {}
        }
        table.queue_mut(target).add(command);
        Ok(Some(target))
    }

    /// Move every `RETRY` entry whose cooldown elapsed to the tail of `CURRENT`.
    pub async fn promote_due(&self, now: i64) -> usize {
        self.table.lock().await.promote_due(now)
    }

    pub async fn next_retry_at(&self) -> Option<i64> {
        self.table.lock().await.queue(QueueType::Retry).earliest_retry_at()
    }

    pub async fn has_ready(&self) -> bool {
        !self.table.lock().await.queue(QueueType::Current).is_empty()
    }

    pub async fn cancel(&self, id: CommandId) -> CancelOutcome {
        let mut table = self.table.lock().await;
        if let Some(flight) = table.in_flight.as_mut()
            && flight.id == id
        {
            flight.cancelled = true;
            return CancelOutcome::InFlight;
        }
        match table.find_by_id(id).map(|(qt, _)| qt) {
            Some(qt) => {
                table.queue_mut(qt).remove_by_id(id);
                CancelOutcome::Removed(qt)
            }
            None => CancelOutcome::NotFound,
        }
    }

    /// Move one parked command from `SKIPPED` or `ERROR` back to `CURRENT` as a
    /// manual launch with a fresh retry budget.
    pub async fn relaunch(&self, id: CommandId, now: i64) -> Option<Command> {
        let mut table = self.table.lock().await;
        for qt in [QueueType::Skipped, QueueType::Error] {
            if let Some(mut command) = table.queue_mut(qt).remove_by_id(id) {
                command.result_mut().reset_retries();
                command.set_manually_launched(true);
                command.requeue_at(now);
                table.queue_mut(QueueType::Current).add(command.clone());
                return Some(command);
            }
        }
        None
    }

    /// Move every `SKIPPED` command back to `CURRENT` with a fresh retry budget.
    pub async fn relaunch_skipped(&self, now: i64) -> usize {
        let mut table = self.table.lock().await;
        let skipped = table.queue_mut(QueueType::Skipped).drain();
        let count = skipped.len();
        for mut command in skipped {
            command.result_mut().reset_retries();
            command.requeue_at(now);
            table.queue_mut(QueueType::Current).add(command);
        }
        count
    }

    /// Change the in-foreground flag of a queued command and re-sort it.
    pub async fn set_command_foreground(&self, id: CommandId, in_foreground: bool) -> bool {
        let mut table = self.table.lock().await;
        let Some(qt) = table.find_by_id(id).map(|(qt, _)| qt) else {
            return false;
        };
        let Some(mut command) = table.queue_mut(qt).remove_by_id(id) else {
            return false;
        };
        command.set_in_foreground(in_foreground);
        table.queue_mut(qt).add(command);
        true
    }

    /// Write one queue to the store. Returns the number of records written.
    pub async fn save(&self, queue: QueueType) -> Result<usize, QueueError> {
        let table = self.table.lock().await;
        self.save_from(&table, queue).await
    }

    /// Merge one queue from the store into memory. Returns the number of
    /// commands added.
    ///
    /// Records whose identity already lives in another queue are dropped.
    pub async fn load(&self, queue: QueueType) -> Result<usize, QueueError> {
        let mut table = self.table.lock().await;
        self.load_into(&mut table, queue).await
    }

    /// Every queue in one snapshot: nothing moves between two queue writes.
    pub async fn save_all(&self) -> Result<usize, QueueError> {
        let table = self.table.lock().await;
        let mut total = 0;
        for qt in QueueType::ALL {
            total += self.save_from(&table, qt).await?;
        }
        Ok(total)
    }

    /// Loads every queue under one lock, so a concurrent `save_all` never
    /// sees a half-loaded set.
    pub async fn load_all(&self) -> Result<usize, QueueError> {
        let mut table = self.table.lock().await;
        let mut total = 0;
        for qt in QueueType::ALL {
            total += self.load_into(&mut table, qt).await?;
        }
        Ok(total)
    }

    async fn save_from(&self, table: &QueueTable, queue: QueueType) -> Result<usize, QueueError> {
        let records: Vec<CommandRecord> = table.queue(queue).iter().map(CommandRecord::from).collect();
        self.store.save(queue, &records).await?;
        debug!(queue = %queue, count = records.len(), "queue saved");
        Ok(records.len())
    }

    async fn load_into(&self, table: &mut QueueTable, queue: QueueType) -> Result<usize, QueueError> {
        let records = self.store.load(queue).await?;
        let mut loaded = 0;
        for record in records {
            let command = record.into_command();
            match table.insert(queue, command) {
                Ok(AddOutcome::Inserted | AddOutcome::Replaced) => loaded += 1,
                Ok(AddOutcome::Ignored) => {}
                Err(QueueError::AlreadyQueued { command_id, queue: other }) => {
                    warn!(command_id = %command_id, queue = %queue, existing = %other, "duplicate record dropped on load");
                }
                Err(err) => return Err(err),
            }
        }
        debug!(queue = %queue, count = loaded, "queue loaded");
        Ok(loaded)
    }

    /// Empty every queue in memory. The store is untouched.
    pub async fn clear(&self) {
        let mut table = self.table.lock().await;
        for qt in QueueType::ALL {
            table.queue_mut(qt).clear();
        }
    }

    pub async fn counts(&self) -> QueueCounts {
        self.table.lock().await.counts()
    }

    /// Highest command id held anywhere, including the in-flight one.
    pub async fn max_command_id(&self) -> CommandId {
        let table = self.table.lock().await;
        let queued = QueueType::ALL
            .into_iter()
            .flat_map(|qt| table.queue(qt).iter().map(Command::id))
            .max()
            .unwrap_or_default();
        table.in_flight.as_ref().map_or(queued, |f| f.id.max(queued))
    }
}

fn millis(delay: Duration) -> i64 {
    i64::try_from(delay.as_millis()).unwrap_or(i64::MAX)
}
