//! Priority ordering inside a queue.
//!
//! Order is total and computed once, when a command enters a queue:
//! manual launches first, then foreground commands, then the class rank of the
//! command kind, then the queue stamp, then the command id.

use std::collections::HashMap;

use crate::domain::{Command, CommandId, CommandKind, TimelineType};

/// Sort key of a queued command. Smaller sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PriorityKey {
    lane: u8,
    rank: u8,
    queued_at: i64,
    id: CommandId,
}

impl PriorityKey {
    pub fn id(&self) -> CommandId {
        self.id
    }
}

const LANE_MANUAL: u8 = 0;
const LANE_FOREGROUND: u8 = 1;
const LANE_BACKGROUND: u8 = 2;

/// Built-in class rank of a command kind. Lower runs earlier.
pub fn default_rank(kind: CommandKind) -> u8 {
    match kind {
        CommandKind::RateLimitStatus | CommandKind::GetOrigins => 0,
        CommandKind::UpdateNote | CommandKind::DeleteNote | CommandKind::Relationship(_) => 1,
        CommandKind::GetTimeline(
            TimelineType::Home | TimelineType::Mentions | TimelineType::Direct,
        ) => 2,
        CommandKind::GetNote | CommandKind::GetConversation | CommandKind::GetActor => 3,
        CommandKind::GetAvatar | CommandKind::GetAttachment => 4,
        CommandKind::GetTimeline(
            TimelineType::Public
            | TimelineType::Search
            | TimelineType::Actor
            | TimelineType::Everything,
        ) => 5,
    }
}

/// Class-rank table, with per-kind overrides on top of [`default_rank`].
#[derive(Debug, Clone, Default)]
pub struct PriorityPolicy {
    overrides: HashMap<CommandKind, u8>,
}

impl PriorityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rank(mut self, kind: CommandKind, rank: u8) -> Self {
        self.overrides.insert(kind, rank);
        self
    }

    pub fn rank(&self, kind: CommandKind) -> u8 {
        self.overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| default_rank(kind))
    }

    pub fn key_for(&self, command: &Command) -> PriorityKey {
        let lane = if command.manually_launched() {
            LANE_MANUAL
        } else if command.in_foreground() {
            LANE_FOREGROUND
        } else {
            LANE_BACKGROUND
        };
        PriorityKey {
            lane,
            rank: self.rank(command.kind()),
            queued_at: command.queued_at(),
            id: command.id(),
        }
    }
}
