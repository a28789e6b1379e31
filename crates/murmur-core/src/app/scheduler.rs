//! Scheduler: owns the queues and drains `CURRENT` one command at a time.
//!
//! State machine: `STOPPED -> STARTING -> RUNNING -> STOPPING -> STOPPED`.
//! - an enqueue on an idle `STOPPED` scheduler starts it
//! - once `CURRENT` is drained with nothing in flight, the queues are saved
//!   and the scheduler goes back to `STOPPED`
//! - an explicit [`Scheduler::stop`] or a fatal error (store unavailable,
//!   queue invariant broken) holds it in `STOPPED`; nothing drains again
//!   until [`Scheduler::start`]
//!
//! Locks:
//! - `drain_lock` serialises drains, so at most one command is mid-execution.
//! - the queue mutex inside [`QueueSet`] is never held across a backend call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};
use tracing::{debug, error, info, warn};

use super::executor::{Executor, is_suppressed};
use crate::domain::{Command, CommandId, CommandKey, EngineEvent, SchedulerState};
use crate::error::EngineError;
use crate::observability::QueueCounts;
use crate::ports::{AccountDirectory, Clock, EventSink, IdGenerator};
use crate::queue::{Admission, CancelOutcome, QueueError, QueueSet, QueueType};

pub struct Scheduler {
    queues: QueueSet,
    executor: Executor,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    accounts: Arc<dyn AccountDirectory>,
    events: Arc<dyn EventSink>,
    state: watch::Sender<SchedulerState>,
    app_in_foreground: AtomicBool,
    enabled: AtomicBool,
    loaded: AtomicBool,
    /// Stopped on purpose or by a fatal error: enqueue does not restart.
    held: AtomicBool,
    suppress_background: bool,
    drain_lock: Mutex<()>,
    pub(crate) wake: Notify,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        queues: QueueSet,
        executor: Executor,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        accounts: Arc<dyn AccountDirectory>,
        events: Arc<dyn EventSink>,
        suppress_background: bool,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Stopped);
        Self {
            queues,
            executor,
            ids,
            clock,
            accounts,
            events,
            state,
            app_in_foreground: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            loaded: AtomicBool::new(false),
            held: AtomicBool::new(false),
            suppress_background,
            drain_lock: Mutex::new(()),
            wake: Notify::new(),
        }
    }

    /// A fresh command for `key`, with a new id and creation time.
    pub fn create(&self, key: CommandKey) -> Command {
        self.ids.create(key)
    }

    /// Admit a command into `CURRENT`, suppressing duplicates.
    ///
    /// Background work enqueued while the app is in the foreground goes to
    /// `SKIPPED` when suppression is on. An idle scheduler is started first
    /// so the store is loaded before duplicates are checked.
    pub async fn enqueue(&self, command: Command) -> Result<Admission, EngineError> {
        self.resume().await?;

        let command_id = command.id();
        let kind = command.kind();
        let target = if is_suppressed(&command, self.app_in_foreground(), self.suppress_background) {
            QueueType::Skipped
        } else {
            QueueType::Current
        };
        let admission = match self.queues.admit(command, target).await {
            Ok(admission) => admission,
            Err(err) => return Err(self.fail(err.into()).await),
        };
        match admission {
            Admission::Queued(queue) => {
                debug!(command_id = %command_id, kind = %kind, queue = %queue, "command queued");
                self.events.emit(&EngineEvent::Queued {
                    command_id,
                    kind,
                    queue,
                });
                if queue == QueueType::Current {
                    self.wake.notify_one();
                }
            }
            Admission::Duplicate(existing) => {
                debug!(command_id = %command_id, existing = %existing, "duplicate dropped");
                self.events.emit(&EngineEvent::Duplicate {
                    command_id,
                    existing,
                });
            }
        }
        Ok(admission)
    }

    /// Remove a queued command, or mark the executing one for discard.
    pub async fn cancel(&self, command_id: CommandId) -> CancelOutcome {
        let outcome = self.queues.cancel(command_id).await;
        if outcome != CancelOutcome::NotFound {
            info!(command_id = %command_id, outcome = ?outcome, "command cancelled");
            self.events.emit(&EngineEvent::Cancelled { command_id });
        }
        outcome
    }

    /// Relaunch a parked command from `SKIPPED` or `ERROR` as a manual launch.
    pub async fn relaunch(&self, command_id: CommandId) -> Result<(), EngineError> {
        let now = self.clock.now_millis();
        if self.queues.relaunch(command_id, now).await.is_none() {
            return Err(EngineError::CommandNotFound(command_id));
        }
        info!(command_id = %command_id, "command relaunched");
        self.events.emit(&EngineEvent::Relaunched { command_id });
        self.wake.notify_one();
        Ok(())
    }

    /// Give every `SKIPPED` command another round.
    pub async fn relaunch_skipped(&self) -> usize {
        let moved = self.queues.relaunch_skipped(self.clock.now_millis()).await;
        if moved > 0 {
            info!(count = moved, "skipped commands relaunched");
            self.wake.notify_one();
        }
        moved
    }

    pub async fn query_queue_state(&self) -> QueueCounts {
        self.queues.counts().await
    }

    /// True when a drain would execute commands right now.
    pub fn is_available(&self) -> bool {
        self.state() == SchedulerState::Running
            && self.enabled.load(Ordering::SeqCst)
            && self.accounts.is_ready()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn set_app_in_foreground(&self, in_foreground: bool) {
        let was = self.app_in_foreground.swap(in_foreground, Ordering::SeqCst);
        if was != in_foreground {
            debug!(in_foreground, "app foreground changed");
        }
    }

    pub fn app_in_foreground(&self) -> bool {
        self.app_in_foreground.load(Ordering::SeqCst)
    }

    /// Pause or resume draining (user preference, connectivity).
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            self.wake.notify_one();
        }
    }

    pub fn queues(&self) -> &QueueSet {
        &self.queues
    }

    /// Persist every queue.
    pub async fn save(&self) -> Result<usize, EngineError> {
        match self.queues.save_all().await {
            Ok(saved) => Ok(saved),
            Err(err) => Err(self.fail(err.into()).await),
        }
    }

    /// `STOPPED -> STARTING -> RUNNING`. Loads the store on first start.
    pub async fn start(&self) -> Result<(), EngineError> {
        let state = self.state();
        if state.is_active() {
            return Ok(());
        }
        if !self.transition(SchedulerState::Starting) {
            return Err(EngineError::NotRunning(state));
        }
        self.held.store(false, Ordering::SeqCst);

        if !self.loaded.swap(true, Ordering::SeqCst) {
            match self.queues.load_all().await {
                Ok(loaded) => info!(count = loaded, "queues loaded"),
                Err(err) => {
                    self.loaded.store(false, Ordering::SeqCst);
                    return Err(self.fail(err.into()).await);
                }
            }
            self.ids.observe(self.queues.max_command_id().await);
        }

        // A stop requested during loading wins.
        if !self.transition(SchedulerState::Running) {
            let state = self.state();
            warn!(state = %state, "stopped while starting");
            return Err(EngineError::NotRunning(state));
        }
        self.wake.notify_one();
        Ok(())
    }

    /// Start an idle scheduler. A held one stays `STOPPED`.
    async fn resume(&self) -> Result<(), EngineError> {
        if self.state() != SchedulerState::Stopped || self.held.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.start().await {
            // lost a race with stop(); the command stays queued
            Ok(()) | Err(EngineError::NotRunning(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Execute commands until `CURRENT` is empty or the scheduler becomes
    /// unavailable. Returns the number of commands routed.
    ///
    /// An idle scheduler with ready or due work is started first. Draining
    /// `CURRENT` saves the queues and stops the scheduler again.
    ///
    /// Returns `Ok(0)` immediately when another drain is in progress.
    pub async fn run(&self) -> Result<usize, EngineError> {
        let Ok(drain) = self.drain_lock.try_lock() else {
            return Ok(0);
        };
        if self.state() == SchedulerState::Stopped && self.has_work().await {
            self.resume().await?;
        }

        let mut executed = 0;
        let mut drained = false;
        while self.is_available() {
            let Some(mut command) = self.queues.begin_next(self.clock.now_millis()).await else {
                drained = true;
                break;
            };
            let suppressed = is_suppressed(
                &command,
                self.app_in_foreground(),
                self.suppress_background,
            );
            let decision = self.executor.execute(&mut command, suppressed).await;

            let command_id = command.id();
            let kind = command.kind();
            let items_added = command.result().items_added();
            match self
                .queues
                .finish(command, &decision, self.clock.now_millis())
                .await
            {
                Ok(Some(routed_to)) => {
                    info!(
                        command_id = %command_id,
                        kind = %kind,
                        queue = %routed_to,
                        items_added,
                        "command executed"
                    );
                    self.events.emit(&EngineEvent::Executed {
                        command_id,
                        kind,
                        routed_to,
                        items_added,
                    });
                }
                Ok(None) => {}
                Err(err) => return Err(self.fail(err.into()).await),
            }
            executed += 1;
        }
        if drained {
            self.stop_when_drained().await?;
        }
        drop(drain);

        // An enqueue that lost the race for the drain lock would otherwise wait
        // for the next wake-up.
        let idle = self.state() == SchedulerState::Stopped && !self.held.load(Ordering::SeqCst);
        if (idle || self.is_available()) && self.queues.has_ready().await {
            self.wake.notify_one();
        }
        Ok(executed)
    }

    /// `RUNNING -> STOPPING -> STOPPED` after a final save. Called with the
    /// drain lock held, so nothing is in flight.
    async fn stop_when_drained(&self) -> Result<(), EngineError> {
        // a concurrent stop() finishes the job
        if !self.transition(SchedulerState::Stopping) {
            return Ok(());
        }
        match self.queues.save_all().await {
            Ok(saved) => {
                self.transition(SchedulerState::Stopped);
                debug!(saved, "queues drained, scheduler idle");
                Ok(())
            }
            Err(err) => Err(self.fail(err.into()).await),
        }
    }

    /// Ready in `CURRENT` or due in `RETRY`.
    async fn has_work(&self) -> bool {
        if self.queues.has_ready().await {
            return true;
        }
        self.queues
            .next_retry_at()
            .await
            .is_some_and(|due| due <= self.clock.now_millis())
    }

    /// Time until the earliest `RETRY` entry is due, if any.
    pub async fn next_retry_in(&self) -> Option<Duration> {
        let due = self.queues.next_retry_at().await?;
        let wait = due.saturating_sub(self.clock.now_millis()).max(0);
        Some(Duration::from_millis(u64::try_from(wait).unwrap_or(0)))
    }

    /// Stop taking new commands, let the in-flight one finish, persist.
    ///
    /// The scheduler is held in `STOPPED` until the next [`Scheduler::start`].
    pub async fn stop(&self) -> Result<usize, EngineError> {
        self.halt();
        // nothing loaded yet: saving would wipe the store
        if !self.loaded.load(Ordering::SeqCst) {
            return Ok(0);
        }
        let _drain = self.drain_lock.lock().await;
        match self.queues.save_all().await {
            Ok(saved) => {
                self.transition(SchedulerState::Stopped);
                info!(saved, "scheduler stopped");
                Ok(saved)
            }
            Err(err) => Err(self.fail(err.into()).await),
        }
    }

    /// Enter `STOPPING` so no further command starts.
    pub(crate) fn halt(&self) {
        self.held.store(true, Ordering::SeqCst);
        self.transition(SchedulerState::Stopping);
    }

    async fn fail(&self, err: EngineError) -> EngineError {
        let message = err.to_string();
        error!(error = %message, "fatal engine error, stopping");
        self.events.emit(&EngineEvent::Fatal {
            message: message.clone(),
        });

        // Queues are still readable when only an invariant broke.
        if matches!(err, EngineError::Queue(QueueError::MultipleQueues { .. }))
            && let Err(save_err) = self.queues.save_all().await
        {
            warn!(error = %save_err, "could not persist queues after fatal error");
        }

        self.held.store(true, Ordering::SeqCst);
        self.transition(SchedulerState::Stopping);
        self.transition(SchedulerState::Stopped);
        EngineError::Fatal(message)
    }

    fn transition(&self, to: SchedulerState) -> bool {
        let mut from = None;
        self.state.send_if_modified(|state| {
            if !state.can_transition_to(to) {
                return false;
            }
            from = Some(*state);
            *state = to;
            true
        });
        let Some(from) = from else {
            return false;
        };
        debug!(from = %from, to = %to, "scheduler state changed");
        self.events.emit(&EngineEvent::StateChanged { from, to });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::SchedulerBuilder;
    use crate::config::EngineConfig;
    use crate::domain::{
        AccountId, BackendError, CommandKind, ItemId, NewItemCounts, OriginId, TimelineType,
        INITIAL_RETRIES,
    };
    use crate::impls::{
        CountingEventSink, InMemoryAccountDirectory, InMemoryCommandStore, ScriptedBackend, Step,
    };
    use crate::ports::{
        CommandStore, FetchCounts, FixedClock, OriginType, StoreError, TimelineFetch,
    };
    use crate::queue::CommandRecord;

    const ALICE: AccountId = AccountId::new(1);
    const ORIGIN: OriginId = OriginId::new(1);

    struct Harness {
        scheduler: Arc<Scheduler>,
        backend: Arc<ScriptedBackend>,
        store: Arc<InMemoryCommandStore>,
        events: Arc<CountingEventSink>,
        clock: Arc<FixedClock>,
        accounts: Arc<InMemoryAccountDirectory>,
    }

    fn harness_with(config: EngineConfig, backend: ScriptedBackend) -> Harness {
        let backend = Arc::new(backend);
        let store = Arc::new(InMemoryCommandStore::new());
        let events = Arc::new(CountingEventSink::new());
        let clock = Arc::new(FixedClock::from_millis(1_000_000));
        let accounts = Arc::new(
            InMemoryAccountDirectory::new()
                .with_origin(ORIGIN, OriginType::GnuSocial, "quitter")
                .with_account(ALICE, ORIGIN, "alice", true),
        );
        let scheduler = SchedulerBuilder::new()
            .config(config)
            .register(OriginType::GnuSocial, backend.clone())
            .unwrap()
            .accounts(accounts.clone())
            .store(store.clone())
            .clock(clock.clone())
            .events(events.clone())
            .build()
            .unwrap();
        Harness {
            scheduler,
            backend,
            store,
            events,
            clock,
            accounts,
        }
    }

    fn harness() -> Harness {
        harness_with(EngineConfig::default(), ScriptedBackend::new())
    }

    fn home() -> CommandKey {
        CommandKey::timeline(TimelineType::Home, ALICE)
    }

    async fn enqueue(h: &Harness, key: CommandKey) -> CommandId {
        let command = h.scheduler.create(key);
        let id = command.id();
        h.scheduler.enqueue(command).await.unwrap();
        id
    }

    #[tokio::test]
    async fn home_timeline_fetch_end_to_end() {
        let backend = ScriptedBackend::new().with_timeline(TimelineFetch {
            counts: FetchCounts {
                downloaded: 3,
                added: NewItemCounts {
                    notes: 3,
                    ..NewItemCounts::default()
                },
            },
            youngest_marker: None,
        });
        let config = EngineConfig {
            retain_done: 10,
            ..EngineConfig::default()
        };
        let h = harness_with(config, backend);
        h.scheduler.start().await.unwrap();
        let id = enqueue(&h, home()).await;

        assert_eq!(h.scheduler.run().await.unwrap(), 1);

        let (queue, done) = h.scheduler.queues().find(id).await.unwrap();
        assert_eq!(queue, QueueType::Done);
        assert_eq!(done.result().new_items().notes, 3);
        assert_eq!(done.result().execution_count(), 1);
        assert!(!done.result().has_error());
        assert_eq!(h.scheduler.query_queue_state().await.pending(), 0);
        assert_eq!(h.events.count("executed"), 1);
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn enqueue_starts_an_idle_scheduler() {
        let h = harness();
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);

        enqueue(&h, home()).await;

        assert_eq!(h.scheduler.state(), SchedulerState::Running);
        assert_eq!(h.events.count("state_changed"), 2);
    }

    #[tokio::test]
    async fn drained_scheduler_saves_and_stops() {
        let h = harness();
        let mut rx = h.scheduler.subscribe();
        h.scheduler.start().await.unwrap();
        enqueue(&h, home()).await;
        assert_eq!(h.store.save_count(), 0);

        assert_eq!(h.scheduler.run().await.unwrap(), 1);

        assert_eq!(*rx.borrow_and_update(), SchedulerState::Stopped);
        assert_eq!(h.store.save_count(), QueueType::ALL.len());
        assert!(h.store.records(QueueType::Current).is_empty());
        assert_eq!(h.events.count("state_changed"), 4);

        // the next enqueue brings it back
        enqueue(&h, CommandKey::timeline(TimelineType::Mentions, ALICE)).await;
        assert_eq!(h.scheduler.state(), SchedulerState::Running);
        assert_eq!(h.scheduler.run().await.unwrap(), 1);
        assert_eq!(h.backend.call_count(), 2);
    }

    #[tokio::test]
    async fn explicit_stop_is_not_undone_by_enqueue() {
        let h = harness();
        h.scheduler.start().await.unwrap();
        h.scheduler.stop().await.unwrap();

        enqueue(&h, home()).await;

        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
        assert_eq!(h.scheduler.run().await.unwrap(), 0);
        assert_eq!(h.scheduler.query_queue_state().await.current, 1);

        h.scheduler.start().await.unwrap();
        assert_eq!(h.scheduler.run().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn success_is_discarded_without_retention() {
        let h = harness();
        h.scheduler.start().await.unwrap();
        enqueue(&h, home()).await;
        h.scheduler.run().await.unwrap();
        assert_eq!(h.scheduler.query_queue_state().await, QueueCounts::default());
    }

    #[tokio::test]
    async fn ten_soft_failures_park_the_command_in_skipped() {
        let h = harness();
        h.backend
            .push_many(Step::Fail(BackendError::network("offline")), 10);
        h.scheduler.start().await.unwrap();
        let id = enqueue(&h, home()).await;

        let executed = h.scheduler.run().await.unwrap();

        assert_eq!(executed, 10);
        assert_eq!(h.backend.call_count(), 10);
        let (queue, command) = h.scheduler.queues().find(id).await.unwrap();
        assert_eq!(queue, QueueType::Skipped);
        assert_eq!(command.result().retries_left(), 0);
        assert_eq!(command.result().soft_error_count(), INITIAL_RETRIES);
    }

    #[tokio::test]
    async fn retries_left_counts_down_per_soft_failure() {
        let config = EngineConfig {
            retry: crate::config::RetryConfig {
                base_delay_ms: 1_000,
                ..Default::default()
            },
            ..EngineConfig::default()
        };
        let h = harness_with(config, ScriptedBackend::new());
        h.backend
            .push_many(Step::Fail(BackendError::network("offline")), 3);
        h.scheduler.start().await.unwrap();
        let id = enqueue(&h, home()).await;

        for n in 1..=3 {
            assert_eq!(h.scheduler.run().await.unwrap(), 1);
            let (queue, command) = h.scheduler.queues().find(id).await.unwrap();
            assert_eq!(queue, QueueType::Retry);
            assert_eq!(command.result().retries_left(), INITIAL_RETRIES - n);
            h.clock.advance(Duration::from_secs(60));
        }

        assert_eq!(h.scheduler.run().await.unwrap(), 1);
        assert!(h.scheduler.queues().find(id).await.is_none());
        assert_eq!(h.backend.call_count(), 4);
    }

    #[tokio::test]
    async fn hard_error_short_circuits_to_error() {
        let h = harness();
        h.backend
            .push(Step::Fail(BackendError::authentication("401")));
        h.scheduler.start().await.unwrap();
        let id = enqueue(&h, home()).await;

        assert_eq!(h.scheduler.run().await.unwrap(), 1);

        let (queue, command) = h.scheduler.queues().find(id).await.unwrap();
        assert_eq!(queue, QueueType::Error);
        assert_eq!(command.result().retries_left(), 0);
        assert_eq!(h.backend.call_count(), 1);
    }

    #[tokio::test]
    async fn deleting_an_absent_note_is_success() {
        let h = harness();
        h.backend.push(Step::Fail(BackendError::not_found("gone")));
        h.scheduler.start().await.unwrap();
        enqueue(
            &h,
            CommandKey::new(CommandKind::DeleteNote)
                .account(ALICE)
                .item(ItemId::new(42)),
        )
        .await;

        h.scheduler.run().await.unwrap();

        let counts = h.scheduler.query_queue_state().await;
        assert_eq!(counts.error, 0);
        assert_eq!(counts.skipped, 0);
    }

    #[tokio::test]
    async fn duplicates_are_dropped_while_pending() {
        let h = harness();
        h.scheduler.start().await.unwrap();
        let first = h.scheduler.create(home());
        let second = h.scheduler.create(home());
        let first_id = first.id();

        assert_eq!(
            h.scheduler.enqueue(first).await.unwrap(),
            Admission::Queued(QueueType::Current)
        );
        assert_eq!(
            h.scheduler.enqueue(second).await.unwrap(),
            Admission::Duplicate(first_id)
        );
        assert_eq!(h.scheduler.query_queue_state().await.current, 1);
        assert_eq!(h.events.count("duplicate"), 1);
    }

    #[tokio::test]
    async fn manual_launch_replaces_a_parked_copy() {
        let h = harness();
        h.backend.push(Step::Fail(BackendError::bad_request("400")));
        h.scheduler.start().await.unwrap();
        enqueue(&h, home()).await;
        h.scheduler.run().await.unwrap();
        assert_eq!(h.scheduler.query_queue_state().await.error, 1);

        let manual = h.scheduler.create(home()).with_manual_launch(true);
        h.scheduler.enqueue(manual).await.unwrap();

        let counts = h.scheduler.query_queue_state().await;
        assert_eq!((counts.current, counts.error), (1, 0));
        h.scheduler.run().await.unwrap();
        assert_eq!(h.scheduler.query_queue_state().await.pending(), 0);
    }

    #[tokio::test]
    async fn relaunch_moves_an_error_back_with_fresh_retries() {
        let h = harness();
        h.backend.push(Step::Fail(BackendError::authentication("401")));
        h.scheduler.start().await.unwrap();
        let id = enqueue(&h, home()).await;
        h.scheduler.run().await.unwrap();

        h.scheduler.set_enabled(false);
        h.scheduler.relaunch(id).await.unwrap();

        let (queue, command) = h.scheduler.queues().find(id).await.unwrap();
        assert_eq!(queue, QueueType::Current);
        assert!(command.manually_launched());
        assert_eq!(command.result().retries_left(), INITIAL_RETRIES);
        assert!(matches!(
            h.scheduler.relaunch(CommandId::new(999)).await,
            Err(EngineError::CommandNotFound(_))
        ));
    }

    #[tokio::test]
    async fn cooldown_parks_retries_until_due() {
        let config = EngineConfig {
            retry: crate::config::RetryConfig {
                base_delay_ms: 1_000,
                ..Default::default()
            },
            ..EngineConfig::default()
        };
        let h = harness_with(config, ScriptedBackend::new());
        h.backend.push(Step::Fail(BackendError::network("offline")));
        h.scheduler.start().await.unwrap();
        let id = enqueue(&h, home()).await;

        assert_eq!(h.scheduler.run().await.unwrap(), 1);
        assert_eq!(h.scheduler.queues().find(id).await.unwrap().0, QueueType::Retry);
        assert_eq!(
            h.scheduler.next_retry_in().await,
            Some(Duration::from_millis(1_000))
        );
        assert_eq!(h.scheduler.run().await.unwrap(), 0);

        h.clock.advance(Duration::from_millis(1_000));
        assert_eq!(h.scheduler.run().await.unwrap(), 1);
        assert!(h.scheduler.queues().find(id).await.is_none());
        assert_eq!(h.backend.call_count(), 2);
    }

    #[tokio::test]
    async fn background_work_is_skipped_while_in_foreground() {
        let config = EngineConfig {
            suppress_background_in_foreground: true,
            ..EngineConfig::default()
        };
        let h = harness_with(config, ScriptedBackend::new());
        h.scheduler.start().await.unwrap();
        h.scheduler.set_app_in_foreground(true);
        let background = enqueue(&h, home()).await;
        let foreground = h
            .scheduler
            .create(CommandKey::timeline(TimelineType::Mentions, ALICE))
            .with_foreground(true);
        assert_eq!(
            h.scheduler.enqueue(foreground).await.unwrap(),
            Admission::Queued(QueueType::Current)
        );

        h.scheduler.run().await.unwrap();

        assert_eq!(h.backend.call_count(), 1);
        let (queue, command) = h.scheduler.queues().find(background).await.unwrap();
        assert_eq!(queue, QueueType::Skipped);
        assert_eq!(command.result().execution_count(), 0);

        h.scheduler.set_app_in_foreground(false);
        assert_eq!(h.scheduler.relaunch_skipped().await, 1);
        h.scheduler.run().await.unwrap();
        assert_eq!(h.backend.call_count(), 2);
    }

    #[tokio::test]
    async fn background_enqueue_is_routed_to_skipped_in_foreground() {
        let config = EngineConfig {
            suppress_background_in_foreground: true,
            ..EngineConfig::default()
        };
        let h = harness_with(config, ScriptedBackend::new());
        h.scheduler.set_app_in_foreground(true);

        let background = h.scheduler.create(home());
        let key = background.key().clone();
        assert_eq!(
            h.scheduler.enqueue(background).await.unwrap(),
            Admission::Queued(QueueType::Skipped)
        );
        assert_eq!(
            h.scheduler.queues().in_which_queue(&key).await.unwrap(),
            Some(QueueType::Skipped)
        );

        // manual launches are not gated
        let manual = h
            .scheduler
            .create(CommandKey::timeline(TimelineType::Public, ALICE))
            .with_manual_launch(true);
        assert_eq!(
            h.scheduler.enqueue(manual).await.unwrap(),
            Admission::Queued(QueueType::Current)
        );
        let counts = h.scheduler.query_queue_state().await;
        assert_eq!((counts.current, counts.skipped), (1, 1));

        // without suppression the same command goes to CURRENT
        let h = harness();
        h.scheduler.set_app_in_foreground(true);
        assert_eq!(
            h.scheduler.enqueue(h.scheduler.create(home())).await.unwrap(),
            Admission::Queued(QueueType::Current)
        );
    }

    #[tokio::test]
    async fn nothing_drains_while_unavailable() {
        let h = harness();
        h.scheduler.set_enabled(false);
        enqueue(&h, home()).await;
        assert_eq!(h.scheduler.state(), SchedulerState::Running);
        assert!(!h.scheduler.is_available());
        assert_eq!(h.scheduler.run().await.unwrap(), 0);

        h.scheduler.set_enabled(true);
        h.accounts.set_ready(false);
        assert!(!h.scheduler.is_available());
        assert_eq!(h.scheduler.run().await.unwrap(), 0);
        assert_eq!(h.scheduler.query_queue_state().await.current, 1);
        // not drained, so not stopped either
        assert_eq!(h.scheduler.state(), SchedulerState::Running);
    }

    #[tokio::test]
    async fn unavailable_store_is_fatal_on_start() {
        let h = harness();
        h.store.set_available(false);

        let err = h.scheduler.start().await.unwrap_err();

        assert!(matches!(err, EngineError::Fatal(_)));
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
        assert_eq!(h.events.count("fatal"), 1);
        assert_eq!(h.events.exception_count(), 1);

        // held after a fatal error
        enqueue(&h, home()).await;
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);

        h.store.set_available(true);
        h.scheduler.start().await.unwrap();
        assert_eq!(h.scheduler.state(), SchedulerState::Running);
    }

    /// Loads slowly so a stop can land while the scheduler is starting.
    struct SlowLoadStore(InMemoryCommandStore);

    #[async_trait::async_trait]
    impl CommandStore for SlowLoadStore {
        async fn save(&self, queue: QueueType, records: &[CommandRecord]) -> Result<(), StoreError> {
            self.0.save(queue, records).await
        }

        async fn load(&self, queue: QueueType) -> Result<Vec<CommandRecord>, StoreError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.0.load(queue).await
        }
    }

    #[tokio::test]
    async fn stop_during_start_is_reported() {
        let h = harness();
        let scheduler = SchedulerBuilder::new()
            .accounts(h.accounts.clone())
            .store(Arc::new(SlowLoadStore(InMemoryCommandStore::new())))
            .build()
            .unwrap();

        let stopping = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert_eq!(scheduler.state(), SchedulerState::Starting);
            scheduler.stop().await.unwrap();
        };
        let (started, ()) = tokio::join!(scheduler.start(), stopping);

        assert!(matches!(started, Err(EngineError::NotRunning(_))));
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(!scheduler.is_available());
    }

    #[tokio::test]
    async fn stop_persists_queues_and_restart_reloads_them() {
        let h = harness();
        h.scheduler.start().await.unwrap();
        h.scheduler.set_enabled(false);
        let id = enqueue(&h, home()).await;

        assert_eq!(h.scheduler.stop().await.unwrap(), 1);
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
        assert_eq!(h.store.records(QueueType::Current)[0].command_id, id);

        // A second scheduler on the same store picks the command up.
        let events = Arc::new(CountingEventSink::new());
        let restarted = SchedulerBuilder::new()
            .register(OriginType::GnuSocial, h.backend.clone())
            .unwrap()
            .accounts(h.accounts.clone())
            .store(h.store.clone())
            .clock(h.clock.clone())
            .events(events)
            .build()
            .unwrap();
        restarted.start().await.unwrap();
        assert_eq!(restarted.query_queue_state().await.current, 1);
        assert!(restarted.create(home()).id() > id);
    }

    #[tokio::test]
    async fn state_changes_are_published() {
        let h = harness();
        let mut rx = h.scheduler.subscribe();
        h.scheduler.start().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SchedulerState::Running);

        h.scheduler.stop().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SchedulerState::Stopped);
        assert_eq!(h.events.count("state_changed"), 4);
    }

    #[tokio::test]
    async fn cancel_removes_a_queued_command() {
        let h = harness();
        let id = enqueue(&h, home()).await;
        assert_eq!(
            h.scheduler.cancel(id).await,
            CancelOutcome::Removed(QueueType::Current)
        );
        assert_eq!(h.scheduler.cancel(id).await, CancelOutcome::NotFound);
        assert_eq!(h.events.count("cancelled"), 1);
    }
}
