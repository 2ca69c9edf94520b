//! Scheduler lifecycle coordinated with the host keep-alive.
//!
//! [`LifecycleGuard`] owns at most one running [`CaptureScheduler`]. Starting
//! acquires keep-alive first and fails with
//! [`CaptureError::KeepAliveUnavailable`] if the host refuses. The keep-alive
//! token is released exactly once: by [`LifecycleGuard::stop`] after the tick
//! loop has exited, when the loop ends on its own (`max_ticks`), or when the
//! guard is dropped.
//!
//! The active run stays registered until its loop has exited, so a stop
//! future dropped halfway still ends with the keep-alive released by the
//! loop watcher.

use crate::config::CaptureConfig;
use crate::dispatch::ActionChannel;
use crate::error::{CaptureError, Result};
use crate::keepalive::{KeepAliveService, KeepAliveToken};
use crate::provider::TreeProvider;
use crate::scheduler::{CaptureScheduler, SchedulerHandle, SchedulerStatus};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The scheduler currently owned by a guard, with its keep-alive grant.
struct ActiveRun<P, C> {
    id: u64,
    scheduler: CaptureScheduler<P, C>,
    token: Option<KeepAliveToken>,
    heartbeat: CancellationToken,
}

struct GuardInner<P, C, K: KeepAliveService> {
    provider: Arc<P>,
    channel: Arc<C>,
    keepalive: Arc<K>,
    active: Mutex<Option<ActiveRun<P, C>>>,
}

impl<P, C, K: KeepAliveService> GuardInner<P, C, K> {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun<P, C>>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop the run's loop (if still going) and give its keep-alive back.
    fn retire(&self, run: ActiveRun<P, C>) {
        let ActiveRun {
            id,
            scheduler,
            token,
            heartbeat,
        } = run;
        // Dropping the owner cancels any pending timer.
        drop(scheduler);
        heartbeat.cancel();
        if let Some(token) = token {
            self.keepalive.release(token);
            debug!(scheduler = id, "keep-alive released");
        }
    }

    /// Retire the active run if it is `id`. Only called once its loop has
    /// exited. Retiring happens under the lock, so a concurrent caller that
    /// finds nothing left returns after the release, not before it.
    fn retire_if_current(&self, id: u64) -> bool {
        let mut active = self.lock_active();
        if active.as_ref().is_some_and(|run| run.id == id)
            && let Some(run) = active.take()
        {
            self.retire(run);
            return true;
        }
        false
    }

    fn renew(&self, id: u64) {
        let active = self.lock_active();
        let Some(run) = active.as_ref().filter(|run| run.id == id) else {
            return;
        };
        if let Some(token) = run.token.as_ref()
            && let Err(e) = self.keepalive.renew(token)
        {
            warn!(scheduler = id, "keep-alive renewal failed: {e}");
        }
    }
}

/// Starts and stops capture schedulers under host keep-alive.
pub struct LifecycleGuard<P, C, K: KeepAliveService> {
    inner: Arc<GuardInner<P, C, K>>,
}

impl<P, C, K> LifecycleGuard<P, C, K>
where
    P: TreeProvider + 'static,
    C: ActionChannel<P::Node> + 'static,
    K: KeepAliveService + 'static,
{
    pub fn new(provider: Arc<P>, channel: Arc<C>, keepalive: Arc<K>) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                provider,
                channel,
                keepalive,
                active: Mutex::new(None),
            }),
        }
    }

    /// Start a scheduler for `config`. Must be called inside a tokio runtime.
    ///
    /// While a scheduler is running this returns its handle and acquires
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Config`] for an invalid configuration (checked before
    /// keep-alive is requested), [`CaptureError::KeepAliveUnavailable`] if the
    /// host refuses keep-alive.
    pub fn start(&self, config: &CaptureConfig) -> Result<SchedulerHandle> {
        let mut active = self.inner.lock_active();
        if let Some(run) = active.as_ref()
            && run.scheduler.status() == SchedulerStatus::Running
        {
            debug!(scheduler = run.id, "start ignored, scheduler already running");
            return Ok(run.scheduler.handle());
        }
        if let Some(stale) = active.take() {
            self.inner.retire(stale);
        }

        let schedule = config.schedule();
        schedule.validate()?;
        if config.match_text.is_empty() {
            return Err(CaptureError::Config(
                "match text must not be empty".to_owned(),
            ));
        }

        let token = self
            .inner
            .keepalive
            .acquire()
            .map_err(|e| CaptureError::KeepAliveUnavailable(e.to_string()))?;

        let scheduler = CaptureScheduler::new(
            Arc::clone(&self.inner.provider),
            Arc::clone(&self.inner.channel),
            config.criterion(),
            schedule,
        )
        .with_matcher(config.matcher());

        let handle = match scheduler.start() {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.keepalive.release(token);
                return Err(e);
            }
        };
        let id = handle.id();

        let heartbeat = CancellationToken::new();
        if let Some(every) = self.inner.keepalive.renew_interval() {
            tokio::spawn(renew_keepalive(
                Arc::downgrade(&self.inner),
                id,
                every,
                heartbeat.clone(),
            ));
        }

        let weak = Arc::downgrade(&self.inner);
        let watched = handle.clone();
        tokio::spawn(async move {
            watched.finished().await;
            if let Some(inner) = weak.upgrade()
                && inner.retire_if_current(id)
            {
                info!(scheduler = id, "capture loop ended, keep-alive released");
            }
        });

        *active = Some(ActiveRun {
            id,
            scheduler,
            token: Some(token),
            heartbeat,
        });
        Ok(handle)
    }

    /// Stop `handle`'s scheduler, wait for an in-flight tick to finish, then
    /// release keep-alive.
    ///
    /// Idempotent and safe to call concurrently: every caller returns only
    /// after the loop has exited and keep-alive has been released, which
    /// happens once. Dropping the returned future early leaves the release
    /// to the loop watcher.
    pub async fn stop(&self, handle: &SchedulerHandle) {
        handle.stop_and_wait().await;
        if self.inner.retire_if_current(handle.id()) {
            debug!(scheduler = handle.id(), "capture loop stopped by caller");
        }
    }

    /// Stop whatever is running.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.active_handle() {
            self.stop(&handle).await;
        }
    }

    /// Handle of the scheduler currently owned by this guard.
    pub fn active_handle(&self) -> Option<SchedulerHandle> {
        self.inner
            .lock_active()
            .as_ref()
            .map(|run| run.scheduler.handle())
    }

    pub fn is_running(&self) -> bool {
        self.active_handle().is_some_and(|handle| handle.is_running())
    }
}

impl<P, C, K: KeepAliveService> Drop for LifecycleGuard<P, C, K> {
    fn drop(&mut self) {
        let run = self.inner.lock_active().take();
        if let Some(run) = run {
            self.inner.retire(run);
        }
    }
}

async fn renew_keepalive<P, C, K: KeepAliveService>(
    inner: Weak<GuardInner<P, C, K>>,
    id: u64,
    every: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(every) => {}
        }
        let Some(guard) = inner.upgrade() else {
            break;
        };
        guard.renew(id);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::dispatch::DispatchError;
    use crate::keepalive::{InProcessKeepAlive, KeepAliveError};
    use crate::provider::ProviderError;
    use crate::tree::SnapshotNode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EmptyProvider;

    impl TreeProvider for EmptyProvider {
        type Node = Arc<SnapshotNode>;

        fn current_tree(&self) -> std::result::Result<Option<Self::Node>, ProviderError> {
            Ok(None)
        }
    }

    struct NoopChannel;

    impl ActionChannel<Arc<SnapshotNode>> for NoopChannel {
        fn click(&self, _node: &Arc<SnapshotNode>) -> std::result::Result<(), DispatchError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingKeepAlive {
        inner: InProcessKeepAlive,
        acquired: AtomicUsize,
        released: AtomicUsize,
        renewed: AtomicUsize,
        renew_every: Option<Duration>,
    }

    impl KeepAliveService for CountingKeepAlive {
        fn acquire(&self) -> std::result::Result<KeepAliveToken, KeepAliveError> {
            let token = self.inner.acquire()?;
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(token)
        }

        fn release(&self, token: KeepAliveToken) {
            self.released.fetch_add(1, Ordering::SeqCst);
            self.inner.release(token);
        }

        fn renew(&self, _token: &KeepAliveToken) -> std::result::Result<(), KeepAliveError> {
            self.renewed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn renew_interval(&self) -> Option<Duration> {
            self.renew_every
        }
    }

    fn guard_with(
        keepalive: CountingKeepAlive,
    ) -> (
        LifecycleGuard<EmptyProvider, NoopChannel, CountingKeepAlive>,
        Arc<CountingKeepAlive>,
    ) {
        let keepalive = Arc::new(keepalive);
        let guard = LifecycleGuard::new(
            Arc::new(EmptyProvider),
            Arc::new(NoopChannel),
            Arc::clone(&keepalive),
        );
        (guard, keepalive)
    }

    fn fast_config() -> CaptureConfig {
        CaptureConfig {
            interval_ms: 10,
            ..CaptureConfig::default()
        }
    }

    #[tokio::test]
    async fn refused_keepalive_keeps_scheduler_out_of_running() {
        let (guard, keepalive) = guard_with(CountingKeepAlive::default());
        keepalive.inner.set_available(false);

        let result = guard.start(&fast_config());
        assert!(matches!(result, Err(CaptureError::KeepAliveUnavailable(_))));
        assert!(!guard.is_running());
        assert!(guard.active_handle().is_none());
    }

    #[tokio::test]
    async fn invalid_config_does_not_touch_keepalive() {
        let (guard, keepalive) = guard_with(CountingKeepAlive::default());
        let config = CaptureConfig {
            interval_ms: 0,
            ..CaptureConfig::default()
        };
        assert!(matches!(guard.start(&config), Err(CaptureError::Config(_))));
        assert_eq!(keepalive.acquired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_match_text_is_rejected() {
        let (guard, keepalive) = guard_with(CountingKeepAlive::default());
        let config = CaptureConfig {
            match_text: String::new(),
            ..fast_config()
        };
        assert!(matches!(guard.start(&config), Err(CaptureError::Config(_))));
        assert_eq!(keepalive.acquired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auto_stop_releases_keepalive() {
        let (guard, keepalive) = guard_with(CountingKeepAlive::default());
        let config = CaptureConfig {
            max_ticks: Some(2),
            ..fast_config()
        };
        let handle = guard.start(&config).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle.finished())
            .await
            .expect("loop finishes");
        for _ in 0..100 {
            if keepalive.released.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(keepalive.released.load(Ordering::SeqCst), 1);
        assert!(guard.active_handle().is_none());

        // Stopping afterwards must not release again.
        guard.stop(&handle).await;
        assert_eq!(keepalive.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn heartbeat_renews_while_running() {
        let (guard, keepalive) = guard_with(CountingKeepAlive {
            renew_every: Some(Duration::from_millis(10)),
            ..CountingKeepAlive::default()
        });
        let handle = guard.start(&fast_config()).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        guard.stop(&handle).await;

        let renewed = keepalive.renewed.load(Ordering::SeqCst);
        assert!(renewed >= 1, "renewed {renewed} times");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(keepalive.renewed.load(Ordering::SeqCst), renewed);
    }

    #[tokio::test]
    async fn dropping_the_guard_stops_and_releases() {
        let (guard, keepalive) = guard_with(CountingKeepAlive::default());
        let handle = guard.start(&fast_config()).unwrap();
        drop(guard);

        assert_eq!(handle.status(), SchedulerStatus::Stopped);
        assert_eq!(keepalive.released.load(Ordering::SeqCst), 1);
        tokio::time::timeout(Duration::from_secs(5), handle.finished())
            .await
            .expect("loop exits after guard drop");
    }
}
