//! Host keep-alive abstraction.
//!
//! A [`KeepAliveService`] keeps the hosting process from being reclaimed
//! while a scheduler runs. Tokens are deliberately not `Clone`: each granted
//! token is released exactly once, by value.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Proof that keep-alive was granted.
#[derive(Debug, PartialEq, Eq)]
pub struct KeepAliveToken {
    id: String,
    acquired_at_ms: u64,
}

impl KeepAliveToken {
    fn issue() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            acquired_at_ms: now_epoch_millis(),
        }
    }

    /// Unique holder id of this grant.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Keep-alive failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeepAliveError {
    /// The host cannot (or will not) keep the process alive right now.
    #[error("{0}")]
    Unavailable(String),
}

/// Host mechanism that keeps the scheduler's process alive.
pub trait KeepAliveService: Send + Sync {
    /// Request keep-alive.
    fn acquire(&self) -> Result<KeepAliveToken, KeepAliveError>;

    /// Give keep-alive back.
    fn release(&self, token: KeepAliveToken);

    /// Refresh a grant that would otherwise expire.
    fn renew(&self, _token: &KeepAliveToken) -> Result<(), KeepAliveError> {
        Ok(())
    }

    /// How often [`renew`](Self::renew) must be called, if at all.
    fn renew_interval(&self) -> Option<Duration> {
        None
    }
}

/// In-process keep-alive for hosts whose process lifetime is already managed
/// (a daemon, a foreground app). It can be switched off to model revocation.
#[derive(Debug)]
pub struct InProcessKeepAlive {
    available: AtomicBool,
    holders: Mutex<HashSet<String>>,
}

impl Default for InProcessKeepAlive {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            holders: Mutex::new(HashSet::new()),
        }
    }
}

impl InProcessKeepAlive {
    /// Available, with no holders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow or refuse future acquisitions.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of outstanding grants.
    pub fn active_holders(&self) -> usize {
        self.holders.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl KeepAliveService for InProcessKeepAlive {
    fn acquire(&self) -> Result<KeepAliveToken, KeepAliveError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(KeepAliveError::Unavailable(
                "in-process keep-alive is disabled".to_owned(),
            ));
        }
        let token = KeepAliveToken::issue();
        self.holders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token.id.clone());
        Ok(token)
    }

    fn release(&self, token: KeepAliveToken) {
        let removed = self
            .holders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&token.id);
        if !removed {
            warn!(holder = %token.id, "released unknown keep-alive token");
        }
    }
}

/// Lease timing policy for [`LeaseKeepAlive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseConfig {
    /// Lease lifetime in seconds.
    pub ttl_secs: u64,
    /// Renewal interval in seconds.
    pub heartbeat_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 15,
            heartbeat_secs: 5,
        }
    }
}

/// Contents of the lease file: who keeps the host alive, and until when.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeepAliveLease {
    holder: String,
    pid: u32,
    granted_at_ms: u64,
    renewed_at_ms: u64,
    valid_until_ms: u64,
}

impl KeepAliveLease {
    fn is_live(&self, now_ms: u64) -> bool {
        self.valid_until_ms > now_ms
    }
}

/// File-backed keep-alive lease.
///
/// Only one live holder may own the lease file at a time. A lease whose
/// expiry has passed is taken over. The scheduler host renews it on the
/// configured heartbeat.
pub struct LeaseKeepAlive {
    path: PathBuf,
    config: LeaseConfig,
}

impl LeaseKeepAlive {
    /// Lease stored at `path`.
    #[must_use]
    pub fn new(path: PathBuf, config: LeaseConfig) -> Self {
        Self { path, config }
    }

    /// Location of the lease file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lease_for(&self, token: &KeepAliveToken, now_ms: u64) -> KeepAliveLease {
        KeepAliveLease {
            holder: token.id.clone(),
            pid: std::process::id(),
            granted_at_ms: token.acquired_at_ms,
            renewed_at_ms: now_ms,
            valid_until_ms: now_ms.saturating_add(self.config.ttl_secs.saturating_mul(1000)),
        }
    }

    /// Current lease, if any. A garbled file counts as no lease.
    fn load(&self) -> Result<Option<KeepAliveLease>, KeepAliveError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(KeepAliveError::Unavailable(format!(
                    "keep-alive lease {} unreadable: {e}",
                    self.path.display()
                )));
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(lease) => Ok(Some(lease)),
            Err(e) => {
                warn!(path = %self.path.display(), "discarding garbled keep-alive lease: {e}");
                Ok(None)
            }
        }
    }

    /// Replace the lease file in one step: write a sibling, then rename it
    /// over the lease.
    fn store(&self, lease: &KeepAliveLease) -> Result<(), KeepAliveError> {
        let refuse = |what: &str, e: &dyn std::fmt::Display| {
            KeepAliveError::Unavailable(format!(
                "cannot {what} keep-alive lease {} for holder {}: {e}",
                self.path.display(),
                lease.holder
            ))
        };

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| refuse("prepare directory of", &e))?;
        }
        let mut staged = self.path.clone().into_os_string();
        staged.push(".pending");
        let staged = PathBuf::from(staged);

        let body = serde_json::to_vec(lease).map_err(|e| refuse("encode", &e))?;
        std::fs::write(&staged, body).map_err(|e| refuse("stage", &e))?;
        std::fs::rename(&staged, &self.path).map_err(|e| refuse("commit", &e))
    }
}

impl KeepAliveService for LeaseKeepAlive {
    fn acquire(&self) -> Result<KeepAliveToken, KeepAliveError> {
        let now_ms = now_epoch_millis();
        match self.load()? {
            Some(current) if current.is_live(now_ms) => {
                return Err(KeepAliveError::Unavailable(format!(
                    "keep-alive lease {} held by {} (pid {}) until {}",
                    self.path.display(),
                    current.holder,
                    current.pid,
                    current.valid_until_ms
                )));
            }
            Some(current) => {
                info!(previous_holder = %current.holder, "taking over expired keep-alive lease");
            }
            None => {}
        }

        let token = KeepAliveToken::issue();
        self.store(&self.lease_for(&token, now_ms))?;
        debug!(path = %self.path.display(), holder = %token.id, "keep-alive lease acquired");
        Ok(token)
    }

    fn release(&self, token: KeepAliveToken) {
        match self.load() {
            Ok(Some(current)) if current.holder == token.id => {
                if let Err(e) = std::fs::remove_file(&self.path)
                    && e.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(path = %self.path.display(), "cannot drop keep-alive lease: {e}");
                }
            }
            Ok(Some(current)) => {
                warn!(
                    holder = %token.id,
                    current = %current.holder,
                    "keep-alive lease was taken over before release"
                );
            }
            Ok(None) => {}
            Err(e) => warn!("keep-alive lease not released: {e}"),
        }
    }

    fn renew(&self, token: &KeepAliveToken) -> Result<(), KeepAliveError> {
        let now_ms = now_epoch_millis();
        if let Some(current) = self.load()?
            && current.holder != token.id
            && current.is_live(now_ms)
        {
            return Err(KeepAliveError::Unavailable(format!(
                "keep-alive lease taken over by {}",
                current.holder
            )));
        }
        self.store(&self.lease_for(token, now_ms))
    }

    fn renew_interval(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.config.heartbeat_secs.max(1)))
    }
}

/// Current epoch time in milliseconds.
#[must_use]
pub fn now_epoch_millis() -> u64 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(duration) => u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        Err(_) => 0,
    }
}
