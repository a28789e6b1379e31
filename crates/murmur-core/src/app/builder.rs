//! SchedulerBuilder - wiring of the scheduler and its ports
//!
//! # 方針
//! - Builder パターンで port を差し替え可能にする
//! - 起動時検証（Fail-fast 設計）: `expect_origins` で期待した origin type
//!   の backend が揃っていなければ `build()` が失敗する
//! - 未指定の port はシングルプロセス向けの実装で埋める

use std::sync::Arc;

use super::{BackendRegistry, Executor, RegistryError, Scheduler};
use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Decider, DefaultDecider};
use crate::impls::{InMemoryCommandStore, InMemorySyncMarkers, JsonFileCommandStore};
use crate::ports::{
    AccountDirectory, Backend, Clock, CommandStore, EventSink, IdGenerator, NoopEventSink,
    OriginType, SequentialIdGenerator, SyncMarkers, SystemClock,
};
use crate::queue::{PriorityPolicy, QueueSet};

/// Builds a [`Scheduler`].
///
/// # 使用例
/// ```ignore
/// let scheduler = SchedulerBuilder::new()
///     .config(load_config(None)?)
///     .register(OriginType::ActivityPub, Arc::new(MyBackend::new()))?
///     .expect_origins(&[OriginType::ActivityPub])
///     .accounts(Arc::new(directory))
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    config: EngineConfig,
    registry: BackendRegistry,
    expected_origins: Option<Vec<OriginType>>,
    accounts: Option<Arc<dyn AccountDirectory>>,
    store: Option<Arc<dyn CommandStore>>,
    markers: Option<Arc<dyn SyncMarkers>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    events: Option<Arc<dyn EventSink>>,
    decider: Option<Arc<dyn Decider>>,
    priority: PriorityPolicy,
}

/// BuildError はスケジューラ構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing backends for origin types: {0:?}. These were expected but not registered.")]
    MissingBackends(Vec<OriginType>),

    #[error("No account directory was given.")]
    MissingAccounts,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            registry: BackendRegistry::new(),
            expected_origins: None,
            accounts: None,
            store: None,
            markers: None,
            clock: None,
            ids: None,
            events: None,
            decider: None,
            priority: PriorityPolicy::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Backend を登録
    pub fn register(
        mut self,
        origin_type: OriginType,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, BuildError> {
        self.registry.register(origin_type, backend)?;
        Ok(self)
    }

    /// 期待される origin type のリストを設定
    pub fn expect_origins(mut self, origin_types: &[OriginType]) -> Self {
        self.expected_origins = Some(origin_types.to_vec());
        self
    }

    pub fn accounts(mut self, accounts: Arc<dyn AccountDirectory>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn store(mut self, store: Arc<dyn CommandStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn markers(mut self, markers: Arc<dyn SyncMarkers>) -> Self {
        self.markers = Some(markers);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn priority_policy(mut self, policy: PriorityPolicy) -> Self {
        self.priority = policy;
        self
    }

    /// 検証してから Scheduler を生成
    ///
    /// # 検証
    /// - 設定値が妥当か
    /// - account directory が渡されているか
    /// - expect_origins() の origin type が全て登録されているか
    pub fn build(self) -> Result<Arc<Scheduler>, BuildError> {
        self.config.validate()?;
        let Some(accounts) = self.accounts else {
            return Err(BuildError::MissingAccounts);
        };
        if let Some(expected) = &self.expected_origins {
            let registered = self.registry.registered_types();
            let missing: Vec<OriginType> = expected
                .iter()
                .filter(|x| !registered.contains(x))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingBackends(missing));
            }
        }

        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store: Arc<dyn CommandStore> = match (self.store, &config.store_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(JsonFileCommandStore::new(dir.clone())),
            (None, None) => Arc::new(InMemoryCommandStore::new()),
        };
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(SequentialIdGenerator::new(Arc::clone(&clock))));
        let events = self.events.unwrap_or_else(|| Arc::new(NoopEventSink));
        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultDecider::new(config.retry_policy())));
        let markers = self
            .markers
            .unwrap_or_else(|| Arc::new(InMemorySyncMarkers::new()));

        let executor = Executor::new(
            Arc::new(self.registry),
            Arc::clone(&accounts),
            markers,
            decider,
            Arc::clone(&clock),
            Arc::clone(&events),
            config.request_timeout(),
        );
        let queues =
            QueueSet::new(store, Arc::new(self.priority)).with_retain_done(config.retain_done);

        Ok(Arc::new(Scheduler::new(
            queues,
            executor,
            ids,
            clock,
            accounts,
            events,
            config.suppress_background_in_foreground,
        )))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
