//! Command: one unit of background work.
//!
//! A command is "immutable by identity": its [`CommandKey`] (kind + target) never
//! changes once created, and two commands with the same key are duplicates.
//! Everything else (id, timestamps, flags, [`CommandResult`]) is bookkeeping that
//! travels with the command but is ignored by equality.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::ids::{AccountId, CommandId, ItemId, OriginId};
use super::result::CommandResult;

/// Timeline flavours a fetch can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimelineType {
    Home,
    Mentions,
    Direct,
    Public,
    Search,
    /// Notes of one actor; the actor is the command's item.
    Actor,
    Everything,
}

impl TimelineType {
    pub fn as_str(self) -> &'static str {
        match self {
            TimelineType::Home => "home",
            TimelineType::Mentions => "mentions",
            TimelineType::Direct => "direct",
            TimelineType::Public => "public",
            TimelineType::Search => "search",
            TimelineType::Actor => "actor",
            TimelineType::Everything => "everything",
        }
    }
}

/// Actions that change the account's relation to a note or an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipAction {
    Like,
    UndoLike,
    Announce,
    UndoAnnounce,
    Follow,
    Unfollow,
}

impl RelationshipAction {
    /// Undo-style actions: a missing target already is the desired state.
    pub fn is_idempotent(self) -> bool {
        matches!(
            self,
            RelationshipAction::UndoLike
                | RelationshipAction::UndoAnnounce
                | RelationshipAction::Unfollow
        )
    }
}

/// What a command does.
///
/// This is a closed sum type on purpose: the executor matches on it
/// exhaustively, so adding a kind is a compile error until it is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "code", content = "arg", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    GetTimeline(TimelineType),
    GetNote,
    GetConversation,
    GetActor,
    GetAvatar,
    GetAttachment,
    UpdateNote,
    DeleteNote,
    Relationship(RelationshipAction),
    RateLimitStatus,
    GetOrigins,
}

impl CommandKind {
    /// Kinds that act on a single item and cannot run without one.
    pub fn needs_item(self) -> bool {
        match self {
            CommandKind::GetTimeline(timeline) => timeline == TimelineType::Actor,
            CommandKind::GetNote
            | CommandKind::GetConversation
            | CommandKind::GetActor
            | CommandKind::GetAvatar
            | CommandKind::GetAttachment
            | CommandKind::DeleteNote
            | CommandKind::Relationship(_) => true,
            CommandKind::UpdateNote | CommandKind::RateLimitStatus | CommandKind::GetOrigins => {
                false
            }
        }
    }

    /// Kinds that run against an origin rather than an account.
    pub fn is_origin_scoped(self) -> bool {
        matches!(self, CommandKind::GetOrigins)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::GetTimeline(timeline) => write!(f, "get-timeline/{}", timeline.as_str()),
            CommandKind::GetNote => f.write_str("get-note"),
            CommandKind::GetConversation => f.write_str("get-conversation"),
            CommandKind::GetActor => f.write_str("get-actor"),
            CommandKind::GetAvatar => f.write_str("get-avatar"),
            CommandKind::GetAttachment => f.write_str("get-attachment"),
            CommandKind::UpdateNote => f.write_str("update-note"),
            CommandKind::DeleteNote => f.write_str("delete-note"),
            CommandKind::Relationship(action) => write!(f, "relationship/{action:?}"),
            CommandKind::RateLimitStatus => f.write_str("rate-limit-status"),
            CommandKind::GetOrigins => f.write_str("get-origins"),
        }
    }
}

/// Identity of a command: the fields that decide whether two commands are duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandKey {
    pub kind: CommandKind,
    pub account: AccountId,
    pub origin: OriginId,
    pub item: ItemId,
    pub param: Option<String>,
}

impl CommandKey {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            account: AccountId::EMPTY,
            origin: OriginId::EMPTY,
            item: ItemId::EMPTY,
            param: None,
        }
    }

    pub fn timeline(timeline: TimelineType, account: AccountId) -> Self {
        Self::new(CommandKind::GetTimeline(timeline)).account(account)
    }

    pub fn account(mut self, account: AccountId) -> Self {
        self.account = account;
        self
    }

    pub fn origin(mut self, origin: OriginId) -> Self {
        self.origin = origin;
        self
    }

    pub fn item(mut self, item: ItemId) -> Self {
        self.item = item;
        self
    }

    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.account)?;
        if !self.origin.is_empty() {
            write!(f, " {}", self.origin)?;
        }
        if !self.item.is_empty() {
            write!(f, " {}", self.item)?;
        }
        if let Some(param) = &self.param {
            write!(f, " {param:?}")?;
        }
        Ok(())
    }
}

/// A queued unit of work.
///
/// Equality and hashing only look at [`CommandKey`].
#[derive(Debug, Clone)]
pub struct Command {
    id: CommandId,
    key: CommandKey,
    /// Creation time, epoch millis. Strictly increasing per generator.
    created_at: i64,
    /// Ordering stamp inside a queue; starts at `created_at`, bumped on re-enqueue.
    queued_at: i64,
    /// Not-before time while parked in the retry queue.
    retry_at: Option<i64>,
    in_foreground: bool,
    manually_launched: bool,
    result: CommandResult,
}

impl Command {
    /// Create a command with a fresh result.
    ///
    /// Use [`crate::ports::IdGenerator::create`] to get an id and timestamp.
    pub fn new(id: CommandId, created_at: i64, key: CommandKey) -> Self {
        Self {
            id,
            key,
            created_at,
            queued_at: created_at,
            retry_at: None,
            in_foreground: false,
            manually_launched: false,
            result: CommandResult::new(),
        }
    }

    /// Rebuild a command from persisted parts.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: CommandId,
        key: CommandKey,
        created_at: i64,
        queued_at: i64,
        retry_at: Option<i64>,
        in_foreground: bool,
        manually_launched: bool,
        result: CommandResult,
    ) -> Self {
        Self {
            id,
            key,
            created_at,
            queued_at,
            retry_at,
            in_foreground,
            manually_launched,
            result,
        }
    }

    pub fn with_foreground(mut self, in_foreground: bool) -> Self {
        self.in_foreground = in_foreground;
        self
    }

    pub fn with_manual_launch(mut self, manually_launched: bool) -> Self {
        self.manually_launched = manually_launched;
        self
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn key(&self) -> &CommandKey {
        &self.key
    }

    pub fn kind(&self) -> CommandKind {
        self.key.kind
    }

    pub fn account(&self) -> AccountId {
        self.key.account
    }

    pub fn origin(&self) -> OriginId {
        self.key.origin
    }

    pub fn item(&self) -> ItemId {
        self.key.item
    }

    pub fn param(&self) -> Option<&str> {
        self.key.param.as_deref()
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn queued_at(&self) -> i64 {
        self.queued_at
    }

    pub fn retry_at(&self) -> Option<i64> {
        self.retry_at
    }

    pub fn in_foreground(&self) -> bool {
        self.in_foreground
    }

    pub fn manually_launched(&self) -> bool {
        self.manually_launched
    }

    pub fn result(&self) -> &CommandResult {
        &self.result
    }

    pub fn result_mut(&mut self) -> &mut CommandResult {
        &mut self.result
    }

    pub fn set_in_foreground(&mut self, in_foreground: bool) {
        self.in_foreground = in_foreground;
    }

    pub fn set_manually_launched(&mut self, manually_launched: bool) {
        self.manually_launched = manually_launched;
    }

    /// Put the command at the back of its priority class.
    pub(crate) fn requeue_at(&mut self, now: i64) {
        self.queued_at = now.max(self.queued_at);
        self.retry_at = None;
    }

    /// Park the command until `not_before`.
    pub(crate) fn schedule_retry(&mut self, not_before: i64) {
        self.retry_at = Some(not_before);
    }

    /// True when the command is parked and `now` has not reached its retry time.
    pub fn is_cooling_down(&self, now: i64) -> bool {
        self.retry_at.is_some_and(|at| at > now)
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Command {}

impl Hash for Command {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.key)
    }
}
