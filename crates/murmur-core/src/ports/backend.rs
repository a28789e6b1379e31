//! Backend port: the network side of command execution.
//!
//! One backend per [`OriginType`](super::OriginType). Every operation either
//! succeeds with counts or fails with a classified [`BackendError`]; the
//! executor bounds each call with the request timeout.

use async_trait::async_trait;

use super::{AccountContext, OriginContext};
use crate::domain::{BackendError, ItemId, NewItemCounts, RelationshipAction, TimelineType};

/// What to fetch for a timeline command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineRequest {
    pub timeline: TimelineType,
    /// Actor whose notes are fetched (actor timeline only).
    pub actor: ItemId,
    /// Search query (search timeline only).
    pub query: Option<String>,
    /// Only fetch items younger than this marker.
    pub since: Option<String>,
}

/// Items downloaded and how many of them were new to the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCounts {
    pub downloaded: u64,
    pub added: NewItemCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineFetch {
    pub counts: FetchCounts,
    /// Marker of the youngest item seen; becomes the next `since`.
    pub youngest_marker: Option<String>,
}

/// Single-item fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Note,
    Conversation,
    Actor,
    Avatar,
    Attachment,
}

/// A locally drafted note to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingItem {
    /// Local draft (or note being edited).
    pub draft: ItemId,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimit {
    pub remaining: u32,
    pub limit: u32,
}

/// An origin announced by a discovery call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredOrigin {
    pub name: String,
    pub host: String,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch_timeline(
        &self,
        ctx: &AccountContext,
        request: &TimelineRequest,
    ) -> Result<TimelineFetch, BackendError>;

    async fn fetch_item(
        &self,
        ctx: &AccountContext,
        kind: ItemKind,
        item: ItemId,
    ) -> Result<FetchCounts, BackendError>;

    /// Publish a note; returns the id the stored note got.
    async fn send_item(
        &self,
        ctx: &AccountContext,
        item: &OutgoingItem,
    ) -> Result<ItemId, BackendError>;

    async fn delete_item(&self, ctx: &AccountContext, item: ItemId) -> Result<(), BackendError>;

    async fn mutate_relationship(
        &self,
        ctx: &AccountContext,
        item: ItemId,
        action: RelationshipAction,
    ) -> Result<(), BackendError>;

    async fn rate_limit_status(&self, ctx: &AccountContext) -> Result<RateLimit, BackendError>;

    async fn discover_origins(
        &self,
        origin: &OriginContext,
    ) -> Result<Vec<DiscoveredOrigin>, BackendError>;
}
