//! Executor: runs one command against its backend and decides its routing.
//!
//! Protocol for one attempt:
//! 1. foreground gate (suppressed commands are skipped, no execution counted)
//! 2. `prepare_for_launch`
//! 3. resolve account or origin, pick the backend, validate the target
//! 4. bounded backend call, dispatched by an exhaustive match on the kind
//! 5. classify the failure (soft / hard), `after_execution_ended`
//! 6. ask the [`Decider`] for the routing

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::BackendRegistry;
use crate::domain::{
    BackendError, Command, CommandKind, Decider, Decision, EngineEvent, ErrorKind, NewItemCounts,
    Severity, TimelineType,
};
use crate::ports::{
    AccountContext, AccountDirectory, Backend, Clock, EventSink, FetchCounts, ItemKind,
    OriginContext, OriginType, OutgoingItem, SyncMarkers, TimelineRequest,
};

/// True when a command must not run now: the app is in the foreground, the
/// user asked to hold background work, and the command is neither a
/// foreground request nor a manual launch.
pub fn is_suppressed(command: &Command, app_in_foreground: bool, suppress_background: bool) -> bool {
    app_in_foreground
        && suppress_background
        && !command.in_foreground()
        && !command.manually_launched()
}

/// Who a command runs as.
enum Target {
    Account(AccountContext),
    Origin(OriginContext),
}

impl Target {
    fn origin_type(&self) -> OriginType {
        match self {
            Target::Account(ctx) => ctx.origin.origin_type,
            Target::Origin(origin) => origin.origin_type,
        }
    }

    fn account(&self) -> Result<&AccountContext, BackendError> {
        match self {
            Target::Account(ctx) => Ok(ctx),
            Target::Origin(origin) => Err(BackendError::configuration(format!(
                "origin {} has no account to run as",
                origin.origin
            ))),
        }
    }

    fn origin(&self) -> &OriginContext {
        match self {
            Target::Account(ctx) => &ctx.origin,
            Target::Origin(origin) => origin,
        }
    }
}

pub struct Executor {
    registry: Arc<BackendRegistry>,
    accounts: Arc<dyn AccountDirectory>,
    markers: Arc<dyn SyncMarkers>,
    decider: Arc<dyn Decider>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    request_timeout: Duration,
}

impl Executor {
    pub fn new(
        registry: Arc<BackendRegistry>,
        accounts: Arc<dyn AccountDirectory>,
        markers: Arc<dyn SyncMarkers>,
        decider: Arc<dyn Decider>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            accounts,
            markers,
            decider,
            clock,
            events,
            request_timeout,
        }
    }

    /// Run one attempt of `command` and return where it should go next.
    ///
    /// `suppressed` is the foreground gate evaluated by the caller.
    pub async fn execute(&self, command: &mut Command, suppressed: bool) -> Decision {
        if suppressed {
            debug!(command_id = %command.id(), kind = %command.kind(), "suppressed while in foreground");
            return Decision::Skip {
                reason: "background work suppressed while in foreground".into(),
            };
        }

        command.result_mut().prepare_for_launch();
        if let Err(err) = self.run(command).await {
            self.record_failure(command, &err);
        }
        command
            .result_mut()
            .after_execution_ended(self.clock.now_millis());

        let decision = self.decider.decide(command);
        debug!(
            command_id = %command.id(),
            kind = %command.kind(),
            executions = command.result().execution_count(),
            retries_left = command.result().retries_left(),
            decision = %decision,
            "attempt finished"
        );
        decision
    }

    fn record_failure(&self, command: &mut Command, err: &BackendError) {
        if err.kind.is_unexpected() {
            warn!(command_id = %command.id(), kind = %err.kind, error = %err, "unexpected failure");
            self.events.emit(&EngineEvent::UnexpectedFailure {
                command_id: command.id(),
                kind: err.kind,
                message: err.message.clone(),
            });
        }
        match err.severity() {
            Severity::Soft => command.result_mut().record_soft_error(err.to_string()),
            Severity::Hard => command.result_mut().record_hard_error(err.to_string()),
        }
    }

    fn resolve(&self, command: &Command) -> Result<Target, BackendError> {
        if command.kind().is_origin_scoped() {
            if let Some(origin) = self.accounts.origin(command.origin()) {
                return Ok(Target::Origin(origin));
            }
            // Fall back to the origin of the account, if one was given.
            return self
                .accounts
                .account(command.account())
                .map(|ctx| Target::Origin(ctx.origin))
                .ok_or_else(|| {
                    BackendError::configuration(format!("no origin for {}", command.key()))
                });
        }

        let ctx = self.accounts.account(command.account()).ok_or_else(|| {
            BackendError::configuration(format!("no account for {}", command.key()))
        })?;
        if !ctx.credentials_verified {
            return Err(BackendError::authentication(format!(
                "credentials of {} are not verified",
                ctx.username
            )));
        }
        Ok(Target::Account(ctx))
    }

    fn backend_for(&self, origin_type: OriginType) -> Result<&Arc<dyn Backend>, BackendError> {
        self.registry.get(origin_type).ok_or_else(|| {
            BackendError::configuration(format!("no backend for origin type {origin_type}"))
        })
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| {
                BackendError::timeout(format!("no response within {:?}", self.request_timeout))
            })?
    }

    async fn run(&self, command: &mut Command) -> Result<(), BackendError> {
        let target = self.resolve(command)?;
        let backend = self.backend_for(target.origin_type())?;
        validate(command)?;

        let item = command.item();
        match command.kind() {
            CommandKind::GetTimeline(timeline) => {
                let ctx = target.account()?;
                let request = TimelineRequest {
                    timeline,
                    actor: item,
                    query: command.param().map(str::to_string),
                    since: self.markers.since(ctx.account, timeline),
                };
                let fetch = self.bounded(backend.fetch_timeline(ctx, &request)).await?;
                record_counts(command, fetch.counts);
                if let Some(marker) = fetch.youngest_marker {
                    self.markers.record(ctx.account, timeline, marker);
                }
            }
            CommandKind::GetNote => self.fetch_item(command, &target, backend, ItemKind::Note).await?,
            CommandKind::GetConversation => {
                self.fetch_item(command, &target, backend, ItemKind::Conversation).await?
            }
            CommandKind::GetActor => self.fetch_item(command, &target, backend, ItemKind::Actor).await?,
            CommandKind::GetAvatar => self.fetch_item(command, &target, backend, ItemKind::Avatar).await?,
            CommandKind::GetAttachment => {
                self.fetch_item(command, &target, backend, ItemKind::Attachment).await?
            }
            CommandKind::UpdateNote => {
                let outgoing = OutgoingItem {
                    draft: item,
                    content: command.param().map(str::to_string),
                };
                let sent = self.bounded(backend.send_item(target.account()?, &outgoing)).await?;
                debug!(command_id = %command.id(), sent = %sent, "note sent");
                record_counts(
                    command,
                    FetchCounts {
                        downloaded: 1,
                        added: NewItemCounts {
                            notes: 1,
                            ..NewItemCounts::default()
                        },
                    },
                );
            }
            CommandKind::DeleteNote => {
                let deleted = self.bounded(backend.delete_item(target.account()?, item)).await;
                already_in_desired_state(command, deleted, true)?;
            }
            CommandKind::Relationship(action) => {
                let changed = self
                    .bounded(backend.mutate_relationship(target.account()?, item, action))
                    .await;
                already_in_desired_state(command, changed, action.is_idempotent())?;
            }
            CommandKind::RateLimitStatus => {
                let limit = self.bounded(backend.rate_limit_status(target.account()?)).await?;
                debug!(command_id = %command.id(), remaining = limit.remaining, limit = limit.limit, "rate limit");
            }
            CommandKind::GetOrigins => {
                let found = self.bounded(backend.discover_origins(target.origin())).await?;
                command
                    .result_mut()
                    .set_downloaded(u64::try_from(found.len()).unwrap_or(u64::MAX));
            }
        }
        Ok(())
    }

    async fn fetch_item(
        &self,
        command: &mut Command,
        target: &Target,
        backend: &Arc<dyn Backend>,
        kind: ItemKind,
    ) -> Result<(), BackendError> {
        let counts = self
            .bounded(backend.fetch_item(target.account()?, kind, command.item()))
            .await?;
        record_counts(command, counts);
        Ok(())
    }
}

/// Reject targets that cannot be right before touching the network.
fn validate(command: &Command) -> Result<(), BackendError> {
    let kind = command.kind();
    if kind.needs_item() && command.item().is_empty() {
        let what = match kind {
            CommandKind::GetTimeline(TimelineType::Actor) => "an actor",
            _ => "an item",
        };
        return Err(BackendError::bad_request(format!("{kind} requires {what}")));
    }
    if kind == CommandKind::GetTimeline(TimelineType::Search)
        && command.param().is_none_or(|q| q.trim().is_empty())
    {
        return Err(BackendError::bad_request("search requires a query"));
    }
    Ok(())
}

fn record_counts(command: &mut Command, counts: FetchCounts) {
    let result = command.result_mut();
    result.set_downloaded(counts.downloaded);
    result.add_new_items(counts.added);
}

/// A missing target is success for operations whose goal is its absence.
fn already_in_desired_state(
    command: &Command,
    outcome: Result<(), BackendError>,
    idempotent: bool,
) -> Result<(), BackendError> {
    match outcome {
        Err(err) if idempotent && err.kind == ErrorKind::NotFound => {
            debug!(command_id = %command.id(), item = %command.item(), "target already absent");
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AccountId, CommandId, CommandKey, DefaultDecider, ItemId, OriginId, RelationshipAction,
        INITIAL_RETRIES,
    };
    use crate::impls::{
        CountingEventSink, InMemoryAccountDirectory, InMemorySyncMarkers, ScriptedBackend, Step,
    };
    use crate::ports::{FixedClock, TimelineFetch};
    use crate::queue::QueueType;
    use rstest::rstest;

    const ALICE: AccountId = AccountId::new(1);
    const UNVERIFIED: AccountId = AccountId::new(2);
    const ORIGIN: OriginId = OriginId::new(1);

    struct Fixture {
        executor: Executor,
        backend: Arc<ScriptedBackend>,
        markers: Arc<InMemorySyncMarkers>,
        events: Arc<CountingEventSink>,
    }

    fn fixture_with(backend: ScriptedBackend, timeout: Duration) -> Fixture {
        let backend = Arc::new(backend);
        let mut registry = BackendRegistry::new();
        registry
            .register(OriginType::ActivityPub, backend.clone())
            .unwrap();
        let accounts = InMemoryAccountDirectory::new()
            .with_origin(ORIGIN, OriginType::ActivityPub, "social.example")
            .with_account(ALICE, ORIGIN, "alice", true)
            .with_account(UNVERIFIED, ORIGIN, "mallory", false);
        let markers = Arc::new(InMemorySyncMarkers::new());
        let events = Arc::new(CountingEventSink::new());
        let executor = Executor::new(
            Arc::new(registry),
            Arc::new(accounts),
            markers.clone(),
            Arc::new(DefaultDecider::default()),
            Arc::new(FixedClock::from_millis(10_000)),
            events.clone(),
            timeout,
        );
        Fixture {
            executor,
            backend,
            markers,
            events,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ScriptedBackend::new(), Duration::from_secs(5))
    }

    fn command(key: CommandKey) -> Command {
        Command::new(CommandId::new(1), 1_000, key)
    }

    #[tokio::test]
    async fn timeline_fetch_records_counts_and_marker() {
        let backend = ScriptedBackend::new().with_timeline(TimelineFetch {
            counts: FetchCounts {
                downloaded: 3,
                added: NewItemCounts {
                    notes: 3,
                    ..NewItemCounts::default()
                },
            },
            youngest_marker: Some("note-99".into()),
        });
        let f = fixture_with(backend, Duration::from_secs(5));
        f.markers.record(ALICE, TimelineType::Home, "note-50".into());
        let mut c = command(CommandKey::timeline(TimelineType::Home, ALICE));

        let decision = f.executor.execute(&mut c, false).await;

        assert_eq!(decision, Decision::Done);
        assert_eq!(c.result().downloaded_count(), 3);
        assert_eq!(c.result().new_items().notes, 3);
        assert_eq!(c.result().execution_count(), 1);
        assert_eq!(c.result().last_executed_at(), Some(10_000));
        assert_eq!(f.backend.calls()[0].since.as_deref(), Some("note-50"));
        assert_eq!(
            f.markers.since(ALICE, TimelineType::Home).as_deref(),
            Some("note-99")
        );
    }

    #[rstest]
    #[case::empty_account(CommandKey::timeline(TimelineType::Home, AccountId::EMPTY))]
    #[case::unknown_account(CommandKey::timeline(TimelineType::Home, AccountId::new(77)))]
    #[case::unknown_origin(CommandKey::new(CommandKind::GetOrigins).origin(OriginId::new(9)))]
    #[tokio::test]
    async fn unresolvable_target_is_a_hard_configuration_error(#[case] key: CommandKey) {
        let f = fixture();
        let mut c = command(key);
        let decision = f.executor.execute(&mut c, false).await;

        assert_eq!(decision.target_queue(), QueueType::Error);
        assert!(c.result().error_message().unwrap().starts_with("configuration"));
        assert_eq!(c.result().retries_left(), 0);
        assert_eq!(f.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn unverified_credentials_fail_without_network() {
        let f = fixture();
        let mut c = command(CommandKey::timeline(TimelineType::Home, UNVERIFIED));
        let decision = f.executor.execute(&mut c, false).await;
        assert_eq!(decision.target_queue(), QueueType::Error);
        assert!(c.result().error_message().unwrap().starts_with("authentication"));
        assert_eq!(f.backend.call_count(), 0);
    }

    #[rstest]
    #[case::actor_timeline(CommandKey::timeline(TimelineType::Actor, ALICE))]
    #[case::search_without_query(CommandKey::timeline(TimelineType::Search, ALICE))]
    #[case::blank_query(CommandKey::timeline(TimelineType::Search, ALICE).param("  "))]
    #[case::note_without_item(CommandKey::new(CommandKind::GetNote).account(ALICE))]
    #[case::follow_without_item(
        CommandKey::new(CommandKind::Relationship(RelationshipAction::Follow)).account(ALICE)
    )]
    #[tokio::test]
    async fn invalid_targets_are_bad_requests(#[case] key: CommandKey) {
        let f = fixture();
        let mut c = command(key);
        let decision = f.executor.execute(&mut c, false).await;
        assert_eq!(decision.target_queue(), QueueType::Error);
        assert!(c.result().error_message().unwrap().starts_with("bad_request"));
        assert_eq!(f.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_backend_is_a_configuration_error() {
        let accounts = InMemoryAccountDirectory::new()
            .with_origin(ORIGIN, OriginType::Twitter, "twitter")
            .with_account(ALICE, ORIGIN, "alice", true);
        let executor = Executor::new(
            Arc::new(BackendRegistry::new()),
            Arc::new(accounts),
            Arc::new(InMemorySyncMarkers::new()),
            Arc::new(DefaultDecider::default()),
            Arc::new(FixedClock::from_millis(0)),
            Arc::new(CountingEventSink::new()),
            Duration::from_secs(1),
        );
        let mut c = command(CommandKey::timeline(TimelineType::Home, ALICE));
        let decision = executor.execute(&mut c, false).await;
        assert_eq!(decision.target_queue(), QueueType::Error);
    }

    #[tokio::test]
    async fn soft_error_spends_one_retry() {
        let f = fixture();
        f.backend.push(Step::Fail(BackendError::network("connection reset")));
        let mut c = command(CommandKey::timeline(TimelineType::Mentions, ALICE));

        let decision = f.executor.execute(&mut c, false).await;

        assert!(matches!(decision, Decision::Retry { .. }));
        assert_eq!(c.result().retries_left(), INITIAL_RETRIES - 1);
        assert_eq!(c.result().soft_error_count(), 1);
    }

    #[tokio::test]
    async fn storage_failure_is_soft_and_counted_as_exception() {
        let f = fixture();
        f.backend
            .push(Step::Fail(BackendError::new(ErrorKind::Storage, "disk full")));
        let mut c = command(CommandKey::new(CommandKind::GetAvatar).account(ALICE).item(ItemId::new(4)));

        let decision = f.executor.execute(&mut c, false).await;

        assert!(matches!(decision, Decision::Retry { .. }));
        assert_eq!(f.events.exception_count(), 1);
        assert_eq!(f.events.count("unexpected_failure"), 1);
    }

    #[tokio::test]
    async fn timeout_is_a_soft_error() {
        let f = fixture_with(ScriptedBackend::new(), Duration::from_millis(20));
        f.backend.push(Step::Stall(Duration::from_secs(5)));
        let mut c = command(CommandKey::timeline(TimelineType::Home, ALICE));

        let decision = f.executor.execute(&mut c, false).await;

        assert!(matches!(decision, Decision::Retry { .. }));
        assert!(c.result().error_message().unwrap().starts_with("timeout"));
    }

    #[rstest]
    #[case::delete(CommandKind::DeleteNote, true)]
    #[case::undo_like(CommandKind::Relationship(RelationshipAction::UndoLike), true)]
    #[case::unfollow(CommandKind::Relationship(RelationshipAction::Unfollow), true)]
    #[case::like(CommandKind::Relationship(RelationshipAction::Like), false)]
    #[tokio::test]
    async fn absent_target_counts_as_success_for_idempotent_actions(
        #[case] kind: CommandKind,
        #[case] succeeds: bool,
    ) {
        let f = fixture();
        f.backend.push(Step::Fail(BackendError::not_found("404")));
        let mut c = command(CommandKey::new(kind).account(ALICE).item(ItemId::new(8)));

        let decision = f.executor.execute(&mut c, false).await;

        assert_eq!(decision == Decision::Done, succeeds);
        assert_eq!(c.result().has_error(), !succeeds);
    }

    #[tokio::test]
    async fn suppressed_command_is_skipped_without_counting() {
        let f = fixture();
        let mut c = command(CommandKey::timeline(TimelineType::Home, ALICE));
        let decision = f.executor.execute(&mut c, true).await;
        assert_eq!(decision.target_queue(), QueueType::Skipped);
        assert_eq!(c.result().execution_count(), 0);
        assert_eq!(f.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn discovery_runs_against_the_origin() {
        let f = fixture();
        let mut c = command(CommandKey::new(CommandKind::GetOrigins).origin(ORIGIN));
        assert_eq!(f.executor.execute(&mut c, false).await, Decision::Done);
        assert_eq!(f.backend.calls()[0].operation, "discover_origins");
    }

    #[tokio::test]
    async fn sending_a_note_counts_it() {
        let f = fixture();
        let mut c = command(CommandKey::new(CommandKind::UpdateNote).account(ALICE).param("hello"));
        assert_eq!(f.executor.execute(&mut c, false).await, Decision::Done);
        assert_eq!(c.result().new_items().notes, 1);
    }

    #[rstest]
    #[case(true, true, false, false, true)]
    #[case(true, false, false, false, false)]
    #[case(false, true, false, false, false)]
    #[case(true, true, true, false, false)]
    #[case(true, true, false, true, false)]
    fn suppression_rule(
        #[case] app_in_foreground: bool,
        #[case] suppress: bool,
        #[case] command_in_foreground: bool,
        #[case] manual: bool,
        #[case] expected: bool,
    ) {
        let c = command(CommandKey::timeline(TimelineType::Home, ALICE))
            .with_foreground(command_in_foreground)
            .with_manual_launch(manual);
        assert_eq!(is_suppressed(&c, app_in_foreground, suppress), expected);
    }
}
