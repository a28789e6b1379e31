use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::Scheduler;
use crate::error::EngineError;

/// Handle of a scheduler running on the tokio runtime.
/// - `request_shutdown()` で新しいコマンドの開始を止める
/// - `shutdown_and_join()` で実行中のコマンドの完了と保存を待つ
pub struct ServiceHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<Result<(), EngineError>>,
    scheduler: Arc<Scheduler>,
}

impl Scheduler {
    /// Start the scheduler and keep draining in a background task.
    ///
    /// The task wakes on enqueue, relaunch, re-enable and when the earliest
    /// `RETRY` entry is due. It never busy-polls.
    pub fn spawn(self: &Arc<Self>) -> ServiceHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);
        let join = tokio::spawn(async move { serve(scheduler, &mut shutdown_rx).await });
        ServiceHandle {
            shutdown_tx,
            join,
            scheduler: Arc::clone(self),
        }
    }
}

impl ServiceHandle {
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Stop taking new commands. The in-flight command is not cancelled.
    pub fn request_shutdown(&self) {
        self.scheduler.halt();
        // receiver が既に drop されていても問題ない
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown, wait for the in-flight command and the final save.
    pub async fn shutdown_and_join(self) -> Result<(), EngineError> {
        self.request_shutdown();
        self.join
            .await
            .map_err(|e| EngineError::ServiceTask(e.to_string()))?
    }
}

async fn serve(
    scheduler: Arc<Scheduler>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<(), EngineError> {
    match scheduler.start().await {
        // shutdown requested while loading; the loop below finishes the stop
        Ok(()) | Err(EngineError::NotRunning(_)) => {}
        Err(err) => return Err(err),
    }

    let outcome = loop {
        if *shutdown_rx.borrow() {
            break Ok(());
        }
        if let Err(err) = scheduler.run().await {
            error!(error = %err, "service loop stopped");
            break Err(err);
        }

        let retry_in = scheduler.next_retry_in().await;
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender が drop されたら終了
                if changed.is_err() {
                    break Ok(());
                }
            }
            () = scheduler.wake.notified() => {}
            () = sleep_for(retry_in) => {}
        }
    };

    // fatal の場合は scheduler 自身が既に STOPPED
    if outcome.is_ok() {
        let saved = scheduler.stop().await?;
        debug!(saved, "service loop finished");
    }
    outcome
}

async fn sleep_for(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}
