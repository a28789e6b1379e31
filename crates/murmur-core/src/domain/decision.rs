//! Decision model: where a command goes after an attempt.
//!
//! The executor updates the command's [`CommandResult`](super::CommandResult)
//! and then asks a [`Decider`] for the routing. Deciders are pure: they read the
//! command and return a [`Decision`]; the scheduler applies it.

use std::fmt;
use std::time::Duration;

use super::Command;
use super::result::INITIAL_RETRIES;
use crate::queue::{QueueType, RetryPolicy};

/// The next step for a command that just finished an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Success. Discard, or keep in `DONE` when retention is on.
    Done,

    /// Soft error with retries left. `delay == 0` means "back of `CURRENT`".
    Retry { delay: Duration, reason: String },

    /// Park in `SKIPPED` (retries exhausted or suppressed in foreground).
    Skip { reason: String },

    /// Hard error. Park in `ERROR` until the user relaunches it.
    Error { reason: String },
}

impl Decision {
    /// The queue this decision routes to.
    pub fn target_queue(&self) -> QueueType {
        match self {
            Decision::Done => QueueType::Done,
            Decision::Retry { delay, .. } if delay.is_zero() => QueueType::Current,
            Decision::Retry { .. } => QueueType::Retry,
            Decision::Skip { .. } => QueueType::Skipped,
            Decision::Error { .. } => QueueType::Error,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Done => None,
            Decision::Retry { reason, .. }
            | Decision::Skip { reason }
            | Decision::Error { reason } => Some(reason),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Done => f.write_str("done"),
            Decision::Retry { delay, .. } => write!(f, "retry after {delay:?}"),
            Decision::Skip { .. } => f.write_str("skip"),
            Decision::Error { .. } => f.write_str("error"),
        }
    }
}

/// Decides the routing of a command from its result.
pub trait Decider: Send + Sync {
    fn decide(&self, command: &Command) -> Decision;
}

/// Retry-budget decider.
///
/// - hard error → `Error`
/// - soft error with retries left → `Retry` with the policy's backoff
/// - soft error, no retries left → `Skip`
/// - no error → `Done`
#[derive(Debug, Clone)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }
}

impl Default for DefaultDecider {
    fn default() -> Self {
        Self::new(RetryPolicy::immediate())
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, command: &Command) -> Decision {
        let result = command.result();
        let message = result.error_message().unwrap_or_default().to_string();

        if result.has_hard_error() {
            return Decision::Error { reason: message };
        }
        if result.should_we_retry() {
            let spent = INITIAL_RETRIES.saturating_sub(result.retries_left());
            let delay = self.retry_policy.next_delay(spent);
            return Decision::Retry {
                delay,
                reason: format!(
                    "{message} (retries left {}/{INITIAL_RETRIES})",
                    result.retries_left()
                ),
            };
        }
        if result.has_soft_error() {
            return Decision::Skip {
                reason: format!("{message} (retries exhausted)"),
            };
        }
        Decision::Done
    }
}
