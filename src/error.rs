//! Error types for the capture loop.

/// Top-level error type reported synchronously to callers of
/// [`LifecycleGuard::start`](crate::lifecycle::LifecycleGuard::start) and
/// the configuration loaders.
///
/// Steady-state tick conditions (no tree, no match, a failed click) are never
/// surfaced through this type; they are recorded as
/// [`TickOutcome`](crate::scheduler::TickOutcome)s instead.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Invalid configuration, rejected before the scheduler runs.
    #[error("config error: {0}")]
    Config(String),

    /// The host keep-alive mechanism refused to grant a token.
    #[error("keep-alive unavailable: {0}")]
    KeepAliveUnavailable(String),

    /// `start()` was called on a scheduler instance that has already stopped.
    #[error("scheduler instance already stopped")]
    SchedulerStopped,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CaptureError>;
