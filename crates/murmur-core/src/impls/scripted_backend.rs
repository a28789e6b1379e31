//! A backend that plays back a script instead of talking to a network.
//!
//! Each call takes the next [`Step`] from the script (or succeeds when the
//! script is empty), records what was asked, and tracks how many calls overlap.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{AccountId, BackendError, ItemId, RelationshipAction};
use crate::ports::{
    AccountContext, Backend, DiscoveredOrigin, FetchCounts, ItemKind, OriginContext, OutgoingItem,
    RateLimit, TimelineFetch, TimelineRequest,
};

/// One scripted reaction.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(BackendError),
    /// Sleep, then succeed. Longer than the request timeout means "times out".
    Stall(Duration),
}

/// One observed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub operation: &'static str,
    pub account: AccountId,
    pub item: ItemId,
    pub since: Option<String>,
}

#[derive(Debug)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<BackendCall>>,
    timeline: Mutex<TimelineFetch>,
    origins: Vec<DiscoveredOrigin>,
    latency: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    next_remote_id: AtomicU64,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            timeline: Mutex::new(TimelineFetch::default()),
            origins: Vec::new(),
            latency: Duration::ZERO,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            next_remote_id: AtomicU64::new(1_000),
        }
    }

    /// Every call sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// What a successful `fetch_timeline` returns.
    pub fn with_timeline(self, fetch: TimelineFetch) -> Self {
        *self.timeline.lock().unwrap_or_else(PoisonError::into_inner) = fetch;
        self
    }

    pub fn with_origins(mut self, origins: Vec<DiscoveredOrigin>) -> Self {
        self.origins = origins;
        self
    }

    pub fn push(&self, step: Step) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
    }

    pub fn push_many(&self, step: Step, times: usize) {
        for _ in 0..times {
            self.push(step.clone());
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn play(
        &self,
        operation: &'static str,
        account: AccountId,
        item: ItemId,
        since: Option<String>,
    ) -> Result<(), BackendError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(BackendCall {
                operation,
                account,
                item,
                since,
            });
        let step = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Step::Succeed);

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let _active = ActiveCall(&self.active);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match step {
            Step::Succeed => Ok(()),
            Step::Fail(err) => Err(err),
            Step::Stall(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }
}

/// Decrements the active-call counter, also when the call is cancelled by a timeout.
struct ActiveCall<'a>(&'a AtomicUsize);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn fetch_timeline(
        &self,
        ctx: &AccountContext,
        request: &TimelineRequest,
    ) -> Result<TimelineFetch, BackendError> {
        self.play("fetch_timeline", ctx.account, request.actor, request.since.clone())
            .await?;
        Ok(self
            .timeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn fetch_item(
        &self,
        ctx: &AccountContext,
        _kind: ItemKind,
        item: ItemId,
    ) -> Result<FetchCounts, BackendError> {
        self.play("fetch_item", ctx.account, item, None).await?;
        Ok(FetchCounts {
            downloaded: 1,
            ..FetchCounts::default()
        })
    }

    async fn send_item(
        &self,
        ctx: &AccountContext,
        item: &OutgoingItem,
    ) -> Result<ItemId, BackendError> {
        self.play("send_item", ctx.account, item.draft, None).await?;
        Ok(ItemId::new(self.next_remote_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn delete_item(&self, ctx: &AccountContext, item: ItemId) -> Result<(), BackendError> {
        self.play("delete_item", ctx.account, item, None).await
    }

    async fn mutate_relationship(
        &self,
        ctx: &AccountContext,
        item: ItemId,
        _action: RelationshipAction,
    ) -> Result<(), BackendError> {
        self.play("mutate_relationship", ctx.account, item, None).await
    }

    async fn rate_limit_status(&self, ctx: &AccountContext) -> Result<RateLimit, BackendError> {
        self.play("rate_limit_status", ctx.account, ItemId::EMPTY, None)
            .await?;
        Ok(RateLimit {
            remaining: 150,
            limit: 150,
        })
    }

    async fn discover_origins(
        &self,
        _origin: &OriginContext,
    ) -> Result<Vec<DiscoveredOrigin>, BackendError> {
        self.play("discover_origins", AccountId::EMPTY, ItemId::EMPTY, None)
            .await?;
        Ok(self.origins.clone())
    }
}
