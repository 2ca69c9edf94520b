//! Capture scheduler state machine and tick loop.
//!
//! A [`CaptureScheduler`] moves `Idle → Running → Stopped`. While running, a
//! single tokio task performs ticks: fetch the tree, search it, click the
//! first match, record the outcome, then wait `interval` (+ jitter) measured
//! from the tick's completion. The tick body runs on a blocking worker so a
//! stalled host call cannot starve the runtime, and a panic inside it is
//! recorded as `ActionFailed` instead of tearing the loop down.
//!
//! `Stopped` is terminal for an instance. A new scheduler is needed to run
//! again.

use crate::dispatch::{ActionChannel, ActionDispatcher};
use crate::error::{CaptureError, Result};
use crate::keepalive::now_epoch_millis;
use crate::provider::TreeProvider;
use crate::scheduler::config::ScheduleConfig;
use crate::scheduler::outcome::{OutcomeCounters, TickHistory, TickOutcome, TickRecord};
use crate::tree::{MatchCriterion, MatchedNode, TreeMatcher};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

/// Capacity of the tick-record broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle status of one scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerStatus {
    /// Created, not yet started.
    Idle,
    /// Ticking.
    Running,
    /// Terminal. A stopped instance never ticks again.
    Stopped,
}

/// Point-in-time view of a scheduler, for status displays and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub status: SchedulerStatus,
    /// Completed ticks since start.
    pub tick_count: u64,
    /// Completed ticks by outcome.
    pub counters: OutcomeCounters,
    /// Most recent tick records, oldest first.
    pub history: Vec<TickRecord>,
}

/// The pending timer: the loop task and the token that cancels its wait.
struct TimerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Mutable state, written only by `start`/`stop` and the tick loop.
struct SchedulerState {
    status: SchedulerStatus,
    tick_count: u64,
    pending_timer: Option<TimerHandle>,
    counters: OutcomeCounters,
    history: TickHistory,
}

/// State shared between the scheduler, its handles and its loop task.
struct Shared {
    id: u64,
    state: Mutex<SchedulerState>,
    nudge: Notify,
    events: broadcast::Sender<TickRecord>,
    finished: CancellationToken,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn status(&self) -> SchedulerStatus {
        self.lock().status
    }

    /// Transition to `Stopped` and hand back the loop task, if running.
    fn stop(&self) -> Option<JoinHandle<()>> {
        let mut state = self.lock();
        match state.status {
            SchedulerStatus::Idle | SchedulerStatus::Stopped => None,
            SchedulerStatus::Running => {
                state.status = SchedulerStatus::Stopped;
                let timer = state.pending_timer.take()?;
                timer.cancel.cancel();
                info!(
                    scheduler = self.id,
                    ticks = state.tick_count,
                    "capture scheduler stopped"
                );
                Some(timer.task)
            }
        }
    }

    /// Whether a tick may begin now.
    fn may_tick(&self) -> bool {
        self.lock().status == SchedulerStatus::Running
    }

    /// Record a finished tick. Returns `true` if another tick should be
    /// scheduled.
    fn complete_tick(
        &self,
        started_at_ms: u64,
        outcome: TickOutcome,
        max_ticks: Option<u64>,
    ) -> bool {
        let mut state = self.lock();
        state.tick_count = state.tick_count.saturating_add(1);
        let tick = state.tick_count;
        state.counters.record(&outcome);

        match &outcome {
            TickOutcome::Matched(node) => {
                info!(scheduler = self.id, tick, path = ?node.path, "{outcome}");
            }
            TickOutcome::ActionFailed(_) => warn!(scheduler = self.id, tick, "{outcome}"),
            TickOutcome::NoTreeAvailable | TickOutcome::NoMatch => {
                debug!(scheduler = self.id, tick, outcome = outcome.name(), "tick completed");
            }
        }

        let record = TickRecord {
            tick,
            started_at_ms,
            finished_at_ms: now_epoch_millis(),
            outcome,
        };
        state.history.push(record.clone());
        // No subscribers is not an error.
        let _ = self.events.send(record);

        if state.status != SchedulerStatus::Running {
            return false;
        }

        if max_ticks.is_some_and(|max| tick >= max) {
            state.status = SchedulerStatus::Stopped;
            if let Some(timer) = state.pending_timer.take() {
                timer.cancel.cancel();
            }
            info!(
                scheduler = self.id,
                ticks = tick,
                "capture scheduler reached max ticks"
            );
            return false;
        }

        true
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.lock();
        SchedulerSnapshot {
            status: state.status,
            tick_count: state.tick_count,
            counters: state.counters,
            history: state.history.to_vec(),
        }
    }
}

/// Cloneable, non-generic view of a scheduler instance.
///
/// Handles observe, nudge and stop the instance. Under a
/// [`LifecycleGuard`](crate::lifecycle::LifecycleGuard), stop through
/// [`LifecycleGuard::stop`](crate::lifecycle::LifecycleGuard::stop) so
/// keep-alive is released too.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("id", &self.shared.id)
            .field("status", &self.status())
            .finish()
    }
}

impl SchedulerHandle {
    /// Process-unique id of the scheduler instance.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Current lifecycle state.
    pub fn status(&self) -> SchedulerStatus {
        self.shared.status()
    }

    /// Whether the loop is scheduling ticks.
    pub fn is_running(&self) -> bool {
        self.status() == SchedulerStatus::Running
    }

    /// Number of completed ticks.
    pub fn tick_count(&self) -> u64 {
        self.shared.lock().tick_count
    }

    /// Status, counters and recent tick history.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.shared.snapshot()
    }

    /// Receive a [`TickRecord`] for every completed tick from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TickRecord> {
        self.shared.events.subscribe()
    }

    /// Ask for a tick as soon as possible.
    ///
    /// Cuts the current wait short. A nudge that arrives during a tick is
    /// kept (at most one) and ends the following wait immediately. Ignored
    /// unless running.
    pub fn nudge(&self) {
        if self.is_running() {
            self.shared.nudge.notify_one();
        }
    }

    /// Resolves once the tick loop has exited (stop or max ticks).
    ///
    /// Never resolves for a scheduler that was not started.
    pub async fn finished(&self) {
        self.shared.finished.cancelled().await;
    }

    /// Stop without waiting. Safe from any thread; a no-op unless running.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn stop(&self) -> bool {
        self.shared.stop().is_some()
    }

    /// Stop and wait for an in-flight tick to finish.
    ///
    /// Concurrent callers all wait for the loop to exit; only the one that
    /// performed the transition gets `true`.
    pub async fn stop_and_wait(&self) -> bool {
        match self.shared.stop() {
            Some(task) => {
                if let Err(e) = task.await
                    && e.is_panic()
                {
                    warn!(scheduler = self.shared.id, "capture loop task panicked: {e}");
                }
                true
            }
            None => {
                if self.status() == SchedulerStatus::Stopped {
                    self.finished().await;
                }
                false
            }
        }
    }
}

/// What a tick needs, shared with the blocking worker.
struct TickContext<P, C> {
    provider: Arc<P>,
    dispatcher: ActionDispatcher<C>,
    matcher: TreeMatcher,
    criterion: MatchCriterion,
}

impl<P, C> TickContext<P, C>
where
    P: TreeProvider,
    C: ActionChannel<P::Node>,
{
    fn tick_body(&self) -> TickOutcome {
        let root = match self.provider.current_tree() {
            Ok(Some(root)) => root,
            Ok(None) => return TickOutcome::NoTreeAvailable,
            Err(e) => return TickOutcome::ActionFailed(e.to_string()),
        };

        let Some(found) = self.matcher.locate(Some(root), &self.criterion) else {
            return TickOutcome::NoMatch;
        };
        let summary = MatchedNode::from(&found);

        match self.dispatcher.dispatch(Some(&found.node)) {
            Ok(()) => TickOutcome::Matched(summary),
            Err(e) => TickOutcome::ActionFailed(e.to_string()),
        }
    }
}

/// Periodic search-and-click scheduler.
pub struct CaptureScheduler<P, C> {
    context: Arc<TickContext<P, C>>,
    config: ScheduleConfig,
    shared: Arc<Shared>,
}

impl<P, C> CaptureScheduler<P, C>
where
    P: TreeProvider + 'static,
    C: ActionChannel<P::Node> + 'static,
{
    /// Create an idle scheduler.
    pub fn new(
        provider: Arc<P>,
        channel: Arc<C>,
        criterion: MatchCriterion,
        config: ScheduleConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let history = TickHistory::new(config.history_limit);
        Self {
            context: Arc::new(TickContext {
                provider,
                dispatcher: ActionDispatcher::new(channel),
                matcher: TreeMatcher::default(),
                criterion,
            }),
            config,
            shared: Arc::new(Shared {
                id: NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(SchedulerState {
                    status: SchedulerStatus::Idle,
                    tick_count: 0,
                    pending_timer: None,
                    counters: OutcomeCounters::default(),
                    history,
                }),
                nudge: Notify::new(),
                events,
                finished: CancellationToken::new(),
            }),
        }
    }

    /// Replace the tree matcher (depth cap / node budget). Only effective
    /// before [`start`](Self::start).
    pub fn with_matcher(mut self, matcher: TreeMatcher) -> Self {
        if let Some(context) = Arc::get_mut(&mut self.context) {
            context.matcher = matcher;
        }
        self
    }

    /// A handle that observes and controls this instance.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> SchedulerStatus {
        self.shared.status()
    }

    /// Begin ticking. Must be called inside a tokio runtime.
    ///
    /// A no-op when already running.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Config`] for an invalid configuration or empty match
    /// text; [`CaptureError::SchedulerStopped`] if this instance has stopped.
    pub fn start(&self) -> Result<SchedulerHandle> {
        let mut state = self.shared.lock();
        match state.status {
            SchedulerStatus::Running => {
                debug!(scheduler = self.shared.id, "start ignored, already running");
                return Ok(self.handle());
            }
            SchedulerStatus::Stopped => return Err(CaptureError::SchedulerStopped),
            SchedulerStatus::Idle => {}
        }

        self.config.validate()?;
        if self.context.criterion.text.is_empty() {
            return Err(CaptureError::Config(
                "match text must not be empty".to_owned(),
            ));
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.context),
            Arc::clone(&self.shared),
            self.config.clone(),
            cancel.clone(),
            self.shared.finished.clone().drop_guard(),
        ));
        state.status = SchedulerStatus::Running;
        state.pending_timer = Some(TimerHandle { cancel, task });

        info!(
            scheduler = self.shared.id,
            interval_ms = self.config.interval.as_millis() as u64,
            initial_delay_ms = self.config.initial_delay.as_millis() as u64,
            max_ticks = ?self.config.max_ticks,
            criterion = %self.context.criterion,
            "capture scheduler started"
        );
        Ok(self.handle())
    }

    /// See [`SchedulerHandle::stop`].
    pub fn stop(&self) -> bool {
        self.handle().stop()
    }

    /// See [`SchedulerHandle::stop_and_wait`].
    pub async fn stop_and_wait(&self) -> bool {
        self.handle().stop_and_wait().await
    }
}

impl<P, C> Drop for CaptureScheduler<P, C> {
    fn drop(&mut self) {
        // Handles may outlive the scheduler; the loop must not.
        let _ = self.shared.stop();
    }
}

/// Wait for the next tick slot. Returns `false` on cancellation.
async fn wait_for_tick(shared: &Shared, cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = shared.nudge.notified() => {
            debug!(scheduler = shared.id, "tick nudged");
            true
        }
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn run_tick<P, C>(context: Arc<TickContext<P, C>>) -> TickOutcome
where
    P: TreeProvider + 'static,
    C: ActionChannel<P::Node> + 'static,
{
    match tokio::task::spawn_blocking(move || context.tick_body()).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => TickOutcome::ActionFailed(format!(
            "tick panicked: {}",
            panic_message(e.into_panic())
        )),
        Err(e) => TickOutcome::ActionFailed(format!("tick aborted: {e}")),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}

async fn run_loop<P, C>(
    context: Arc<TickContext<P, C>>,
    shared: Arc<Shared>,
    config: ScheduleConfig,
    cancel: CancellationToken,
    // Signals `finished` when the loop future is dropped, even unpolled.
    _finished: DropGuard,
) where
    P: TreeProvider + 'static,
    C: ActionChannel<P::Node> + 'static,
{
    let mut delay = config.initial_delay;
    let mut consecutive_failures = 0_u32;

    loop {
        if !wait_for_tick(&shared, &cancel, delay).await || !shared.may_tick() {
            break;
        }

        let started_at_ms = now_epoch_millis();
        let outcome = run_tick(Arc::clone(&context)).await;
        consecutive_failures = if outcome.is_failure() {
            consecutive_failures.saturating_add(1)
        } else {
            0
        };

        let reschedule = shared.complete_tick(started_at_ms, outcome, config.max_ticks);
        if !reschedule || cancel.is_cancelled() {
            break;
        }
        delay = config.next_delay(consecutive_failures);
    }

    debug!(scheduler = shared.id, "capture loop exited");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::dispatch::DispatchError;
    use crate::provider::ProviderError;
    use crate::tree::{MatchField, SnapshotNode};
    use std::sync::atomic::AtomicUsize;

    struct FixedProvider {
        tree: Option<Arc<SnapshotNode>>,
        calls: AtomicUsize,
    }

    impl TreeProvider for FixedProvider {
        type Node = Arc<SnapshotNode>;

        fn current_tree(&self) -> std::result::Result<Option<Self::Node>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tree.clone())
        }
    }

    #[derive(Default)]
    struct CountingChannel {
        clicks: AtomicUsize,
    }

    impl ActionChannel<Arc<SnapshotNode>> for CountingChannel {
        fn click(&self, _node: &Arc<SnapshotNode>) -> std::result::Result<(), DispatchError> {
            self.clicks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Channel whose click blocks long enough to stop mid-tick.
    #[derive(Default)]
    struct SlowChannel {
        entered: AtomicUsize,
        done: AtomicUsize,
    }

    impl ActionChannel<Arc<SnapshotNode>> for SlowChannel {
        fn click(&self, _node: &Arc<SnapshotNode>) -> std::result::Result<(), DispatchError> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(150));
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn capture_tree() -> Arc<SnapshotNode> {
        SnapshotNode::labelled("Home")
            .with_child(SnapshotNode::described("Capture").interactable(true))
            .into_shared()
    }

    fn make_scheduler(
        tree: Option<Arc<SnapshotNode>>,
        config: ScheduleConfig,
    ) -> (
        CaptureScheduler<FixedProvider, CountingChannel>,
        Arc<FixedProvider>,
        Arc<CountingChannel>,
    ) {
        let provider = Arc::new(FixedProvider {
            tree,
            calls: AtomicUsize::new(0),
        });
        let channel = Arc::new(CountingChannel::default());
        let scheduler = CaptureScheduler::new(
            Arc::clone(&provider),
            Arc::clone(&channel),
            MatchCriterion::new("Capture", MatchField::Either),
            config,
        );
        (scheduler, provider, channel)
    }

    #[test]
    fn tick_body_matches_and_clicks() {
        let (scheduler, _provider, channel) =
            make_scheduler(Some(capture_tree()), ScheduleConfig::new(Duration::from_secs(1)));
        let outcome = scheduler.context.tick_body();
        assert!(matches!(outcome, TickOutcome::Matched(ref node) if node.path == vec![0]));
        assert_eq!(channel.clicks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tick_body_reports_absent_tree() {
        let (scheduler, _provider, channel) =
            make_scheduler(None, ScheduleConfig::new(Duration::from_secs(1)));
        assert_eq!(scheduler.context.tick_body(), TickOutcome::NoTreeAvailable);
        assert_eq!(channel.clicks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn tick_body_reports_no_match() {
        let tree = SnapshotNode::labelled("Home").into_shared();
        let (scheduler, _provider, _channel) =
            make_scheduler(Some(tree), ScheduleConfig::new(Duration::from_secs(1)));
        assert_eq!(scheduler.context.tick_body(), TickOutcome::NoMatch);
    }

    #[test]
    fn non_interactable_match_is_action_failed() {
        let tree = SnapshotNode::labelled("Capture").into_shared();
        let (scheduler, _provider, channel) =
            make_scheduler(Some(tree), ScheduleConfig::new(Duration::from_secs(1)));
        assert!(scheduler.context.tick_body().is_failure());
        assert_eq!(channel.clicks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn new_scheduler_is_idle_and_stop_is_noop() {
        let (scheduler, _provider, _channel) =
            make_scheduler(None, ScheduleConfig::new(Duration::from_secs(1)));
        assert_eq!(scheduler.status(), SchedulerStatus::Idle);
        assert!(!scheduler.stop());
        assert_eq!(scheduler.status(), SchedulerStatus::Idle);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected_at_start() {
        let (scheduler, provider, _channel) =
            make_scheduler(None, ScheduleConfig::new(Duration::ZERO));
        assert!(matches!(scheduler.start(), Err(CaptureError::Config(_))));
        assert_eq!(scheduler.status(), SchedulerStatus::Idle);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_twice_is_idempotent() {
        let (scheduler, _provider, _channel) =
            make_scheduler(None, ScheduleConfig::new(Duration::from_secs(60)));
        let first = scheduler.start().unwrap();
        let second = scheduler.start().unwrap();
        assert_eq!(first.id(), second.id());
        assert!(first.is_running());
        assert!(scheduler.stop_and_wait().await);
    }

    #[tokio::test]
    async fn stopped_instance_cannot_restart() {
        let (scheduler, _provider, _channel) =
            make_scheduler(None, ScheduleConfig::new(Duration::from_secs(60)));
        scheduler.start().unwrap();
        assert!(scheduler.stop_and_wait().await);
        assert!(!scheduler.stop_and_wait().await);
        assert!(matches!(scheduler.start(), Err(CaptureError::SchedulerStopped)));
        assert_eq!(scheduler.status(), SchedulerStatus::Stopped);
    }

    #[tokio::test]
    async fn max_ticks_stops_the_loop() {
        let config = ScheduleConfig::new(Duration::from_millis(10)).with_max_ticks(3);
        let (scheduler, provider, channel) = make_scheduler(Some(capture_tree()), config);
        let handle = scheduler.start().unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle.finished())
            .await
            .expect("loop finishes");
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(handle.status(), SchedulerStatus::Stopped);
        assert_eq!(handle.tick_count(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(channel.clicks.load(Ordering::SeqCst), 3);
        assert_eq!(handle.snapshot().counters.matched, 3);
    }

    #[tokio::test]
    async fn nudge_cuts_the_wait_short() {
        let config = ScheduleConfig::new(Duration::from_secs(3600));
        let (scheduler, _provider, _channel) = make_scheduler(None, config);
        let handle = scheduler.start().unwrap();
        let mut events = handle.subscribe();

        let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("first tick")
            .unwrap();
        assert_eq!(first.tick, 1);

        handle.nudge();
        let second = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("nudged tick")
            .unwrap();
        assert_eq!(second.tick, 2);
        assert_eq!(second.outcome, TickOutcome::NoTreeAvailable);

        scheduler.stop_and_wait().await;
    }

    #[tokio::test]
    async fn dropping_the_scheduler_stops_the_loop() {
        let (scheduler, _provider, _channel) =
            make_scheduler(None, ScheduleConfig::new(Duration::from_millis(10)));
        let handle = scheduler.start().unwrap();
        drop(handle);
        let observer = scheduler.handle();
        drop(scheduler);

        assert_eq!(observer.status(), SchedulerStatus::Stopped);
        tokio::time::timeout(Duration::from_secs(5), observer.finished())
            .await
            .expect("loop exits after owner drop");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_stop_and_wait_caller_waits_for_the_tick() {
        let provider = Arc::new(FixedProvider {
            tree: Some(capture_tree()),
            calls: AtomicUsize::new(0),
        });
        let channel = Arc::new(SlowChannel::default());
        let scheduler = CaptureScheduler::new(
            provider,
            Arc::clone(&channel),
            MatchCriterion::new("Capture", MatchField::Either),
            ScheduleConfig::new(Duration::from_millis(10)),
        );
        let handle = scheduler.start().unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while channel.entered.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("click started");

        let other = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.stop_and_wait().await })
        };
        let here = handle.stop_and_wait().await;
        assert_eq!(channel.done.load(Ordering::SeqCst), 1);

        let other = other.await.unwrap();
        assert!(here != other, "exactly one caller performs the transition");
        assert_eq!(handle.tick_count(), 1);
        assert_eq!(channel.entered.load(Ordering::SeqCst), 1);
    }
}
