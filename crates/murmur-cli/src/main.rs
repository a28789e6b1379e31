use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::time::{Duration, sleep};
use tracing::info;

use murmur_core::domain::{
    AccountId, BackendError, CommandKey, CommandKind, ItemId, NewItemCounts, OriginId,
    RelationshipAction, TimelineType,
};
use murmur_core::impls::{
    InMemoryAccountDirectory, JsonFileCommandStore, ScriptedBackend, Step, TracingEventSink,
};
use murmur_core::ports::{CommandStore, FetchCounts, OriginType, TimelineFetch};
use murmur_core::queue::QueueType;
use murmur_core::{EngineConfig, Scheduler, SchedulerBuilder, load_config};

#[derive(Parser, Debug)]
#[command(name = "murmur", version, about, long_about = None)]
struct Cli {
    /// TOML configuration file (MURMUR_* variables override it).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scripted session against a fake backend and print the queues.
    Demo,
    /// Print how many commands each persisted queue holds.
    Queues {
        /// Directory of the JSON command store.
        #[arg(long)]
        store: PathBuf,
    },
}

const ALICE: AccountId = AccountId::new(1);
const ORIGIN: OriginId = OriginId::new(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Demo => demo(config).await,
        Commands::Queues { store } => queues(store).await,
    }
}

/// RUST_LOG があればそちらを優先
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("murmur_core={log_level},murmur={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn demo(config: EngineConfig) -> anyhow::Result<()> {
    // (A) 3 件の新着を返す backend と、検証済みのアカウント 1 つ
    let backend = Arc::new(ScriptedBackend::new().with_latency(Duration::from_millis(20)).with_timeline(
        TimelineFetch {
            counts: FetchCounts {
                downloaded: 3,
                added: NewItemCounts {
                    notes: 3,
                    ..NewItemCounts::default()
                },
            },
            youngest_marker: Some("demo-3".into()),
        },
    ));
    let accounts = InMemoryAccountDirectory::new()
        .with_origin(ORIGIN, OriginType::ActivityPub, "social.example")
        .with_account(ALICE, ORIGIN, "alice", true);

    let scheduler = SchedulerBuilder::new()
        .config(config)
        .register(OriginType::ActivityPub, backend.clone())?
        .expect_origins(&[OriginType::ActivityPub])
        .accounts(Arc::new(accounts))
        .events(Arc::new(TracingEventSink))
        .build()?;

    // (B) drain ループを起動
    let handle = scheduler.spawn();

    // (C) コマンド投入: 成功、一時エラーの後に成功、恒久エラー、重複
    backend.push(Step::Succeed);
    backend.push(Step::Fail(BackendError::network("connection reset")));
    let keys = [
        CommandKey::timeline(TimelineType::Home, ALICE),
        CommandKey::timeline(TimelineType::Mentions, ALICE),
        CommandKey::new(CommandKind::Relationship(RelationshipAction::Follow))
            .account(ALICE)
            .item(ItemId::new(7)),
        CommandKey::new(CommandKind::GetNote).account(ALICE),
        CommandKey::timeline(TimelineType::Home, ALICE),
    ];
    for key in keys {
        let admission = scheduler.enqueue(scheduler.create(key)).await?;
        info!(?admission, "enqueued");
    }

    // (D) キューが空になるまで待つ
    wait_until_idle(&scheduler).await?;
    let counts = scheduler.query_queue_state().await;
    println!("{}", serde_json::to_string_pretty(&counts)?);

    // (E) graceful shutdown（実行中のコマンドを待ち、キューを保存）
    handle.shutdown_and_join().await?;
    println!("backend calls: {}", backend.call_count());
    Ok(())
}

async fn wait_until_idle(scheduler: &Scheduler) -> anyhow::Result<()> {
    for _ in 0..500 {
        if scheduler.query_queue_state().await.pending() == 0 {
            return Ok(());
        }
        sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("queues did not drain in time")
}

async fn queues(dir: PathBuf) -> anyhow::Result<()> {
    let store = JsonFileCommandStore::new(dir);
    let mut report = serde_json::Map::new();
    for queue in QueueType::ALL {
        let records = store
            .load(queue)
            .await
            .with_context(|| format!("loading {queue} from {}", store.dir().display()))?;
        report.insert(queue.as_str().to_string(), records.len().into());
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
