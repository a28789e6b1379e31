//! Execution history carried by every command.
//!
//! The result keeps durable counters (executions, retries left, error totals)
//! plus the outcome of the latest attempt only. Old error messages are not
//! kept: the counters are the history signal.

use serde::{Deserialize, Serialize};

/// Automatic attempts a command gets before it is parked in `SKIPPED`.
pub const INITIAL_RETRIES: u32 = 10;

/// Classification of the latest attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "severity", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorState {
    #[default]
    None,
    /// Transient: network, timeout, rate limit, temporary I/O.
    Soft(String),
    /// Permanent given the current state: auth, bad request, not found.
    Hard(String),
}

/// Items added to the local store by one attempt, per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItemCounts {
    pub notes: u64,
    pub mentions: u64,
    pub direct: u64,
    pub actors: u64,
}

impl NewItemCounts {
    pub fn total(&self) -> u64 {
        self.notes + self.mentions + self.direct + self.actors
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Mutable execution record of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    execution_count: u32,
    soft_error_count: u32,
    hard_error_count: u32,
    retries_left: u32,
    /// Epoch millis of the end of the latest attempt.
    last_executed_at: Option<i64>,
    downloaded_count: u64,
    new_items: NewItemCounts,
    error: ErrorState,
}

impl Default for CommandResult {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandResult {
    pub fn new() -> Self {
        Self {
            execution_count: 0,
            soft_error_count: 0,
            hard_error_count: 0,
            retries_left: INITIAL_RETRIES,
            last_executed_at: None,
            downloaded_count: 0,
            new_items: NewItemCounts::default(),
            error: ErrorState::None,
        }
    }

    /// Clear the per-attempt slots. Counters that describe history stay.
    pub fn prepare_for_launch(&mut self) {
        self.error = ErrorState::None;
        self.downloaded_count = 0;
        self.new_items = NewItemCounts::default();
    }

    /// Record a transient failure for this attempt.
    ///
    /// Ignored when the attempt already recorded a hard error.
    pub fn record_soft_error(&mut self, message: impl Into<String>) {
        if self.has_hard_error() {
            return;
        }
        self.error = ErrorState::Soft(message.into());
    }

    /// Record a permanent failure for this attempt. Overrides a soft error.
    pub fn record_hard_error(&mut self, message: impl Into<String>) {
        self.error = ErrorState::Hard(message.into());
        self.retries_left = 0;
    }

    /// Close the attempt: count it, spend a retry on a soft error, stamp the time.
    pub fn after_execution_ended(&mut self, now: i64) {
        self.execution_count += 1;
        match self.error {
            ErrorState::None => {}
            ErrorState::Soft(_) => {
                self.soft_error_count += 1;
                self.retries_left = self.retries_left.saturating_sub(1);
            }
            ErrorState::Hard(_) => {
                self.hard_error_count += 1;
                self.retries_left = 0;
            }
        }
        self.last_executed_at = Some(now);
    }

    pub fn should_we_retry(&self) -> bool {
        self.has_soft_error() && self.retries_left > 0
    }

    /// Give the command a fresh set of automatic attempts (manual relaunch).
    pub fn reset_retries(&mut self) {
        self.retries_left = INITIAL_RETRIES;
        self.error = ErrorState::None;
    }

    pub fn set_downloaded(&mut self, count: u64) {
        self.downloaded_count = count;
    }

    pub fn add_new_items(&mut self, counts: NewItemCounts) {
        self.new_items.notes += counts.notes;
        self.new_items.mentions += counts.mentions;
        self.new_items.direct += counts.direct;
        self.new_items.actors += counts.actors;
    }

    pub fn has_error(&self) -> bool {
        self.has_soft_error() || self.has_hard_error()
    }

    pub fn has_soft_error(&self) -> bool {
        matches!(self.error, ErrorState::Soft(_))
    }

    pub fn has_hard_error(&self) -> bool {
        matches!(self.error, ErrorState::Hard(_))
    }

    pub fn error(&self) -> &ErrorState {
        &self.error
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.error {
            ErrorState::None => None,
            ErrorState::Soft(message) | ErrorState::Hard(message) => Some(message),
        }
    }

    pub fn execution_count(&self) -> u32 {
        self.execution_count
    }

    pub fn soft_error_count(&self) -> u32 {
        self.soft_error_count
    }

    pub fn hard_error_count(&self) -> u32 {
        self.hard_error_count
    }

    pub fn retries_left(&self) -> u32 {
        self.retries_left
    }

    pub fn last_executed_at(&self) -> Option<i64> {
        self.last_executed_at
    }

    pub fn downloaded_count(&self) -> u64 {
        self.downloaded_count
    }

    pub fn new_items(&self) -> NewItemCounts {
        self.new_items
    }

    /// Total items added by the latest attempt.
    pub fn items_added(&self) -> u64 {
        self.new_items.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soft_attempt(result: &mut CommandResult, now: i64) {
        result.prepare_for_launch();
        result.record_soft_error("connection reset");
        result.after_execution_ended(now);
    }

    #[test]
    fn new_result_is_clean() {
        let r = CommandResult::new();
        assert_eq!(r.execution_count(), 0);
        assert_eq!(r.retries_left(), INITIAL_RETRIES);
        assert!(!r.has_error());
        assert!(!r.should_we_retry());
        assert_eq!(r.last_executed_at(), None);
    }

    #[test]
    fn has_error_is_soft_or_hard() {
        let mut r = CommandResult::new();
        r.record_soft_error("x");
        assert!(r.has_error() && r.has_soft_error() && !r.has_hard_error());
        r.record_hard_error("y");
        assert!(r.has_error() && r.has_hard_error() && !r.has_soft_error());
    }

    #[test]
    fn each_soft_attempt_spends_one_retry() {
        let mut r = CommandResult::new();
        for n in 1..=INITIAL_RETRIES {
            soft_attempt(&mut r, i64::from(n));
            assert_eq!(r.retries_left(), INITIAL_RETRIES - n);
            assert_eq!(r.execution_count(), n);
        }
        assert!(r.has_soft_error());
        assert!(!r.should_we_retry());
        assert_eq!(r.soft_error_count(), INITIAL_RETRIES);
    }

    #[test]
    fn soft_error_never_overrides_hard_in_same_attempt() {
        let mut r = CommandResult::new();
        r.prepare_for_launch();
        r.record_hard_error("401 unauthorized");
        r.record_soft_error("timeout");
        assert_eq!(r.error(), &ErrorState::Hard("401 unauthorized".into()));
    }

    #[test]
    fn hard_error_overrides_soft_and_zeroes_retries() {
        let mut r = CommandResult::new();
        r.prepare_for_launch();
        r.record_soft_error("timeout");
        r.record_hard_error("404");
        r.after_execution_ended(10);

        assert!(r.has_hard_error());
        assert_eq!(r.retries_left(), 0);
        assert_eq!(r.hard_error_count(), 1);
        assert_eq!(r.soft_error_count(), 0);
        assert!(!r.should_we_retry());
    }

    #[test]
    fn success_keeps_retries() {
        let mut r = CommandResult::new();
        soft_attempt(&mut r, 1);
        r.prepare_for_launch();
        r.after_execution_ended(2);
        assert!(!r.has_error());
        assert_eq!(r.retries_left(), INITIAL_RETRIES - 1);
        assert_eq!(r.execution_count(), 2);
        assert_eq!(r.last_executed_at(), Some(2));
    }

    #[test]
    fn prepare_keeps_history_and_clears_attempt() {
        let mut r = CommandResult::new();
        r.prepare_for_launch();
        r.set_downloaded(5);
        r.add_new_items(NewItemCounts {
            notes: 2,
            ..Default::default()
        });
        r.record_soft_error("x");
        r.after_execution_ended(1);

        r.prepare_for_launch();
        r.prepare_for_launch();
        assert_eq!(r.execution_count(), 1);
        assert_eq!(r.soft_error_count(), 1);
        assert_eq!(r.downloaded_count(), 0);
        assert_eq!(r.items_added(), 0);
        assert!(!r.has_error());
    }

    #[test]
    fn reset_retries_restores_budget() {
        let mut r = CommandResult::new();
        r.record_hard_error("bad");
        r.after_execution_ended(1);
        r.reset_retries();
        assert_eq!(r.retries_left(), INITIAL_RETRIES);
        assert!(!r.has_error());
        assert_eq!(r.hard_error_count(), 1);
    }

    #[test]
    fn error_state_serializes_with_severity() {
        let v = serde_json::to_value(ErrorState::Soft("offline".into())).unwrap();
        assert_eq!(v["severity"], "SOFT");
        assert_eq!(v["message"], "offline");
        let v = serde_json::to_value(ErrorState::None).unwrap();
        assert_eq!(v["severity"], "NONE");
    }
}
