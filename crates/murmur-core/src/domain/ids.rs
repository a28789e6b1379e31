//! Domain identifiers (strongly-typed IDs).
//!
//! All identifiers are plain numbers because that is what the local store hands
//! out (row ids) and what the command queue persists. A phantom marker keeps an
//! `AccountId` from being passed where an `OriginId` is expected.
//!
//! The value `0` is reserved as "empty": a command addressed to
//! `AccountId::EMPTY` has no account to run against.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Marker trait for each ID flavour.
pub trait IdMarker: Send + Sync + 'static {
    /// Prefix used by `Display` (e.g. "cmd-", "acct-").
    fn prefix() -> &'static str;
}

/// Generic numeric ID.
///
/// `T` is only used at compile time; `Id<T>` has the size of a `u64`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: u64,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// The reserved "nothing here" value.
    pub const EMPTY: Self = Self::new(0);

    pub const fn new(value: u64) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    pub const fn value(&self) -> u64 {
        self.value
    }

    pub const fn is_empty(&self) -> bool {
        self.value == 0
    }
}

impl<T: IdMarker> Default for Id<T> {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl<T: IdMarker> From<u64> for Id<T> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.value)
    }
}

// ========================================
// Markers
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Command {}

impl IdMarker for Command {
    fn prefix() -> &'static str {
        "cmd-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Account {}

impl IdMarker for Account {
    fn prefix() -> &'static str {
        "acct-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Origin {}

impl IdMarker for Origin {
    fn prefix() -> &'static str {
        "origin-"
    }
}

/// Notes, actors and timelines share one id space in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Item {}

impl IdMarker for Item {
    fn prefix() -> &'static str {
        "item-"
    }
}

// ========================================
// Type aliases
// ========================================

/// Identifier of a queued command (assigned at creation, persisted with it).
pub type CommandId = Id<Command>;

/// Identifier of a configured account ("MyAccount").
pub type AccountId = Id<Account>;

/// Identifier of an origin (a remote service instance).
pub type OriginId = Id<Origin>;

/// Identifier of a note, actor or other item in the local store.
pub type ItemId = Id<Item>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_marker_prefix() {
        assert_eq!(CommandId::new(7).to_string(), "cmd-7");
        assert_eq!(AccountId::new(1).to_string(), "acct-1");
        assert_eq!(OriginId::new(2).to_string(), "origin-2");
        assert_eq!(ItemId::new(3).to_string(), "item-3");
    }

    #[test]
    fn empty_is_zero_and_default() {
        assert!(AccountId::EMPTY.is_empty());
        assert_eq!(AccountId::default(), AccountId::EMPTY);
        assert!(!AccountId::new(5).is_empty());
    }

    #[test]
    fn ids_serialize_as_bare_numbers() {
        let s = serde_json::to_string(&CommandId::new(42)).unwrap();
        assert_eq!(s, "42");
        let back: CommandId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, CommandId::new(42));
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<CommandId>(), size_of::<u64>());
        assert_eq!(size_of::<ItemId>(), size_of::<u64>());
    }
}
