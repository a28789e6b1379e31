//! App - アプリケーション層
//!
//! ports を組み合わせてコマンド実行エンジンを組み立てます。
//!
//! # 主要コンポーネント
//! - **SchedulerBuilder**: 構築とワイヤリング（fail-fast 検証つき）
//! - **BackendRegistry**: origin type ごとの backend
//! - **Executor**: 1 コマンドの実行と振り分けの決定
//! - **Scheduler**: キューの所有、状態遷移、drain
//! - **ServiceHandle**: tokio 上で drain ループを回す

pub mod builder;
pub mod executor;
pub mod registry;
pub mod scheduler;
pub mod service;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, SchedulerBuilder};
pub use self::executor::{Executor, is_suppressed};
pub use self::registry::{BackendRegistry, RegistryError};
pub use self::scheduler::Scheduler;
pub use self::service::ServiceHandle;
