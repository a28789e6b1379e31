//! Account directory port: resolves account and origin ids to the context a
//! backend call needs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, OriginId};

/// Protocol family of an origin. One backend serves each type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginType {
    Twitter,
    GnuSocial,
    PumpIo,
    ActivityPub,
}

impl OriginType {
    pub fn as_str(self) -> &'static str {
        match self {
            OriginType::Twitter => "twitter",
            OriginType::GnuSocial => "gnusocial",
            OriginType::PumpIo => "pumpio",
            OriginType::ActivityPub => "activitypub",
        }
    }
}

impl fmt::Display for OriginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginContext {
    pub origin: OriginId,
    pub origin_type: OriginType,
    pub name: String,
}

/// A configured account on one origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountContext {
    pub account: AccountId,
    pub origin: OriginContext,
    pub username: String,
    /// False until the origin accepted the stored credentials.
    pub credentials_verified: bool,
}

pub trait AccountDirectory: Send + Sync {
    fn account(&self, id: AccountId) -> Option<AccountContext>;

    fn origin(&self, id: OriginId) -> Option<OriginContext>;

    /// False while accounts are still being loaded; the scheduler will not drain.
    fn is_ready(&self) -> bool {
        true
    }
}
