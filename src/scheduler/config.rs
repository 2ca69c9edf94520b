//! Immutable per-scheduler timing configuration.

use crate::error::{CaptureError, Result};
use std::time::Duration;

/// Default number of tick records kept in memory.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// How the wait between ticks reacts to tick outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CadencePolicy {
    /// Always wait `interval` (+ jitter), whatever the outcome.
    #[default]
    Fixed,
    /// Multiply the wait by `factor` per consecutive `ActionFailed`, capped at
    /// `max_interval`. Any other outcome resets to `interval`.
    BackoffOnFailure {
        factor: u32,
        max_interval: Duration,
    },
}

/// Timing configuration of one scheduler instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Wait between the completion of one tick and the start of the next.
    pub interval: Duration,
    /// Wait before the first tick.
    pub initial_delay: Duration,
    /// Stop automatically after this many ticks.
    pub max_ticks: Option<u64>,
    /// Upper bound of a uniformly random extra wait added to each interval.
    pub jitter: Option<Duration>,
    /// Whether failures stretch the wait.
    pub cadence: CadencePolicy,
    /// Number of tick records kept for snapshots.
    pub history_limit: usize,
}

impl ScheduleConfig {
    /// Fixed cadence at `interval`, first tick immediately, unbounded.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            initial_delay: Duration::ZERO,
            max_ticks: None,
            jitter: None,
            cadence: CadencePolicy::Fixed,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Wait `initial_delay` before the first tick.
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Stop after `max_ticks` completed ticks.
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    /// Add up to `jitter` of random wait per interval.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Use `cadence` instead of a fixed wait.
    pub fn with_cadence(mut self, cadence: CadencePolicy) -> Self {
        self.cadence = cadence;
        self
    }

    /// Keep at most `history_limit` tick records (at least one).
    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit.max(1);
        self
    }

    /// Reject configurations that cannot run.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Config`] for a zero interval, `max_ticks = 0`, a zero
    /// backoff factor or a backoff cap below the interval.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(CaptureError::Config(
                "interval must be greater than zero".to_owned(),
            ));
        }
        if self.max_ticks == Some(0) {
            return Err(CaptureError::Config(
                "max_ticks must be at least 1 when set".to_owned(),
            ));
        }
        if let CadencePolicy::BackoffOnFailure {
            factor,
            max_interval,
        } = self.cadence
        {
            if factor == 0 {
                return Err(CaptureError::Config(
                    "backoff factor must be at least 1".to_owned(),
                ));
            }
            if max_interval < self.interval {
                return Err(CaptureError::Config(format!(
                    "backoff max interval ({}ms) is below the interval ({}ms)",
                    max_interval.as_millis(),
                    self.interval.as_millis()
                )));
            }
        }
        Ok(())
    }

    /// Wait before the next tick, without jitter.
    pub fn base_delay(&self, consecutive_failures: u32) -> Duration {
        match self.cadence {
            CadencePolicy::Fixed => self.interval,
            CadencePolicy::BackoffOnFailure {
                factor,
                max_interval,
            } => {
                if consecutive_failures == 0 {
                    return self.interval;
                }
                let multiplier = factor.saturating_pow(consecutive_failures);
                self.interval
                    .checked_mul(multiplier)
                    .unwrap_or(max_interval)
                    .min(max_interval)
            }
        }
    }

    /// Wait before the next tick, with jitter applied.
    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        let base = self.base_delay(consecutive_failures);
        match self.jitter {
            Some(jitter) if !jitter.is_zero() => {
                let extra_ms = rand::random::<f64>() * jitter.as_millis() as f64;
                base.saturating_add(Duration::from_millis(extra_ms as u64))
            }
            _ => base,
        }
    }
}
