//! Persisted form of a command.

use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, Command, CommandId, CommandKey, CommandKind, CommandResult, ItemId, OriginId};

/// One command as written to a [`CommandStore`](crate::ports::CommandStore).
///
/// Flat on purpose: every identity field, timestamp and flag sits next to the
/// full result so a store can be inspected without the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command_id: CommandId,
    pub kind: CommandKind,
    pub account: AccountId,
    pub origin: OriginId,
    pub item: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    pub created_at: i64,
    pub queued_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<i64>,
    pub in_foreground: bool,
    pub manually_launched: bool,
    pub result: CommandResult,
}

impl From<&Command> for CommandRecord {
    fn from(command: &Command) -> Self {
        let key = command.key();
        Self {
            command_id: command.id(),
            kind: key.kind,
            account: key.account,
            origin: key.origin,
            item: key.item,
            param: key.param.clone(),
            created_at: command.created_at(),
            queued_at: command.queued_at(),
            retry_at: command.retry_at(),
            in_foreground: command.in_foreground(),
            manually_launched: command.manually_launched(),
            result: command.result().clone(),
        }
    }
}

impl CommandRecord {
    pub fn into_command(self) -> Command {
        let key = CommandKey {
            kind: self.kind,
            account: self.account,
            origin: self.origin,
            item: self.item,
            param: self.param,
        };
        Command::restore(
            self.command_id,
            key,
            self.created_at,
            self.queued_at,
            self.retry_at,
            self.in_foreground,
            self.manually_launched,
            self.result,
        )
    }
}
