//! murmur-core
//!
//! Command execution engine for a multi-origin social client: background
//! commands (timeline fetches, item downloads, sends, deletes, relationship
//! changes) are queued, de-duplicated, executed one at a time against the
//! right backend, and routed by outcome.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, command, result, errors, decision, state, events）
//! - **ports**: 抽象化レイヤー（Backend, AccountDirectory, CommandStore, Clock, など）
//! - **queue**: 優先度付きキューと QueueSet（排他、永続化）
//! - **app**: builder, registry, executor, scheduler, service
//! - **impls**: 実装（InMemoryCommandStore, JsonFileCommandStore, ScriptedBackend など）
//! - **config**: figment による設定の読み込み
//! - **error**: エンジンレベルのエラー型
//! - **observability**: キューの状態ビュー

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{BuildError, Scheduler, SchedulerBuilder, ServiceHandle};
pub use config::{EngineConfig, load_config};
pub use error::EngineError;
pub use observability::QueueCounts;
