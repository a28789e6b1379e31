//! One priority-ordered queue of commands.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{PriorityKey, PriorityPolicy, QueueType};
use crate::domain::{Command, CommandId, CommandKey};

/// What [`Queue::add`] did with the incoming command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    /// An equal command was there and the incoming one took its place.
    Replaced,
    /// An equal, newer command was already there.
    Ignored,
}

/// Commands of one [`QueueType`], ordered by [`PriorityKey`].
///
/// Never holds two commands with the same identity.
#[derive(Debug, Clone)]
pub struct Queue {
    queue_type: QueueType,
    policy: Arc<PriorityPolicy>,
    entries: BTreeMap<PriorityKey, Command>,
    index: HashMap<CommandKey, PriorityKey>,
}

impl Queue {
    pub fn new(queue_type: QueueType, policy: Arc<PriorityPolicy>) -> Self {
        Self {
            queue_type,
            policy,
            entries: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// Insert in priority order.
    ///
    /// An equal command already present is replaced only when the incoming one
    /// is newer, or is the same command (same id) carrying an updated result.
    pub fn add(&mut self, command: Command) -> AddOutcome {
        let outcome = match self.get(command.key()) {
            Some(existing)
                if existing.id() == command.id() || command.created_at() > existing.created_at() =>
            {
                AddOutcome::Replaced
            }
            Some(_) => return AddOutcome::Ignored,
            None => AddOutcome::Inserted,
        };
        if outcome == AddOutcome::Replaced {
            self.remove(command.key());
        }
        let key = self.policy.key_for(&command);
        self.index.insert(command.key().clone(), key);
        self.entries.insert(key, command);
        outcome
    }

    /// Take the highest-priority command.
    pub fn poll(&mut self) -> Option<Command> {
        let (_, command) = self.entries.pop_first()?;
        self.index.remove(command.key());
        Some(command)
    }

    pub fn peek(&self) -> Option<&Command> {
        self.entries.values().next()
    }

    pub fn remove(&mut self, key: &CommandKey) -> Option<Command> {
        let priority = self.index.remove(key)?;
        self.entries.remove(&priority)
    }

    pub fn remove_by_id(&mut self, id: CommandId) -> Option<Command> {
        let key = self.get_by_id(id)?.key().clone();
        self.remove(&key)
    }

    pub fn contains(&self, key: &CommandKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &CommandKey) -> Option<&Command> {
        self.index.get(key).and_then(|p| self.entries.get(p))
    }

    pub fn get_by_id(&self, id: CommandId) -> Option<&Command> {
        self.entries.values().find(|c| c.id() == id)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Commands in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.entries.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Remove every command, in priority order.
    pub fn drain(&mut self) -> Vec<Command> {
        self.index.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }

    /// Earliest not-before time of any parked command.
    pub fn earliest_retry_at(&self) -> Option<i64> {
        self.entries.values().filter_map(Command::retry_at).min()
    }

    /// Remove the commands whose cooldown has elapsed at `now`.
    pub fn take_due(&mut self, now: i64) -> Vec<Command> {
        let due: Vec<CommandKey> = self
            .entries
            .values()
            .filter(|c| !c.is_cooling_down(now))
            .map(|c| c.key().clone())
            .collect();
        due.iter().filter_map(|key| self.remove(key)).collect()
    }

    /// Drop the least recently executed commands until at most `max` remain.
    pub fn evict_oldest_executed(&mut self, max: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > max {
            let oldest = self
                .entries
                .values()
                .min_by_key(|c| (c.result().last_executed_at(), c.id()))
                .map(|c| c.key().clone());
            let Some(key) = oldest else { break };
            self.remove(&key);
            evicted += 1;
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountId, CommandKind, ItemId, TimelineType};

    fn queue() -> Queue {
        Queue::new(QueueType::Current, Arc::new(PriorityPolicy::new()))
    }

    fn home(id: u64, at: i64) -> Command {
        Command::new(
            CommandId::new(id),
            at,
            CommandKey::timeline(TimelineType::Home, AccountId::new(1)),
        )
    }

    fn note(id: u64, at: i64, item: u64) -> Command {
        Command::new(
            CommandId::new(id),
            at,
            CommandKey::new(CommandKind::GetNote)
                .account(AccountId::new(1))
                .item(ItemId::new(item)),
        )
    }

    #[test]
    fn empty_queue_is_harmless() {
        let mut q = queue();
        assert_eq!(q.size(), 0);
        assert!(q.poll().is_none());
        assert!(q.peek().is_none());
        assert!(q.remove(home(1, 1).key()).is_none());
        assert_eq!(q.earliest_retry_at(), None);
    }

    #[test]
    fn equal_commands_are_never_duplicated() {
        let mut q = queue();
        assert_eq!(q.add(home(1, 100)), AddOutcome::Inserted);
        assert_eq!(q.add(home(2, 200)), AddOutcome::Replaced);
        assert_eq!(q.add(home(3, 50)), AddOutcome::Ignored);
        assert_eq!(q.size(), 1);
        assert_eq!(q.peek().map(Command::id), Some(CommandId::new(2)));
    }

    #[test]
    fn same_id_replaces_with_merged_result() {
        let mut q = queue();
        q.add(home(1, 100));
        let mut updated = home(1, 100);
        updated.result_mut().record_soft_error("offline");
        assert_eq!(q.add(updated), AddOutcome::Replaced);
        let stored = q.get(home(9, 0).key()).unwrap();
        assert!(stored.result().has_soft_error());
    }

    #[test]
    fn poll_follows_priority() {
        let mut q = queue();
        q.add(note(1, 100, 10));
        q.add(home(2, 200));
        q.add(note(3, 50, 11).with_foreground(true));

        let order: Vec<u64> = std::iter::from_fn(|| q.poll()).map(|c| c.id().value()).collect();
        assert_eq!(order, vec![3, 2, 1]);
        assert!(q.is_empty());
    }

    #[test]
    fn remove_by_id_and_contains() {
        let mut q = queue();
        q.add(note(1, 100, 10));
        q.add(note(2, 100, 11));
        assert!(q.remove_by_id(CommandId::new(1)).is_some());
        assert!(!q.contains(note(0, 0, 10).key()));
        assert!(q.contains(note(0, 0, 11).key()));
        assert!(q.remove_by_id(CommandId::new(1)).is_none());
    }

    #[test]
    fn take_due_only_returns_elapsed_cooldowns() {
        let mut q = Queue::new(QueueType::Retry, Arc::new(PriorityPolicy::new()));
        let mut soon = note(1, 100, 10);
        soon.schedule_retry(1_000);
        let mut later = note(2, 100, 11);
        later.schedule_retry(5_000);
        q.add(soon);
        q.add(later);

        assert_eq!(q.earliest_retry_at(), Some(1_000));
        assert!(q.take_due(999).is_empty());
        let due = q.take_due(1_000);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id(), CommandId::new(1));
        assert_eq!(q.earliest_retry_at(), Some(5_000));
    }

    #[test]
    fn eviction_keeps_most_recently_executed() {
        let mut q = Queue::new(QueueType::Done, Arc::new(PriorityPolicy::new()));
        for (id, executed) in [(1, 30), (2, 10), (3, 20)] {
            let mut c = note(id, 100, id);
            c.result_mut().after_execution_ended(executed);
            q.add(c);
        }
        assert_eq!(q.evict_oldest_executed(2), 1);
        assert!(q.get_by_id(CommandId::new(2)).is_none());
        assert_eq!(q.size(), 2);
    }
}
