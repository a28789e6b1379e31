//! Scheduler lifecycle state.
//!
//! Transitions follow a single cycle:
//! `Stopped → Starting → Running → Stopping → Stopped`.
//! A fatal condition jumps from any non-stopped state to `Stopping`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl SchedulerState {
    pub fn can_transition_to(self, next: SchedulerState) -> bool {
        use SchedulerState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// True while the scheduler accepts drains.
    pub fn is_active(self) -> bool {
        matches!(self, SchedulerState::Starting | SchedulerState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerState::Stopped => "STOPPED",
            SchedulerState::Starting => "STARTING",
            SchedulerState::Running => "RUNNING",
            SchedulerState::Stopping => "STOPPING",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
