//! Tree provider interface and file-backed host adapters.
//!
//! [`TreeProvider`] is the host's source of tree snapshots. The adapters
//! here let the capture loop run headless: [`SnapshotFileProvider`] re-reads
//! a JSON tree each tick and [`JournalActionChannel`] records synthetic
//! clicks as JSON lines.

use crate::dispatch::{ActionChannel, DispatchError};
use crate::tree::{SnapshotNode, UiNode};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Failure to obtain a tree snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider is gone or access was revoked.
    #[error("tree provider unavailable: {0}")]
    Unavailable(String),

    /// The provider returned data that is not a tree.
    #[error("malformed tree snapshot: {0}")]
    Malformed(String),
}

/// Host source of UI tree snapshots.
///
/// `current_tree` may legitimately return `Ok(None)` at any time (target app
/// not foregrounded, tree mid-transition). It is called from a blocking
/// worker thread.
pub trait TreeProvider: Send + Sync {
    /// Node handle type of this host.
    type Node: UiNode + Send + 'static;

    /// The tree as it is right now, if there is one.
    fn current_tree(&self) -> Result<Option<Self::Node>, ProviderError>;
}

/// Reads a JSON [`SnapshotNode`] tree from disk on every call.
///
/// A missing or empty file means "no tree"; unreadable or unparsable
/// content is a provider fault.
#[derive(Debug, Clone)]
pub struct SnapshotFileProvider {
    path: PathBuf,
}

impl SnapshotFileProvider {
    /// Provider reading the snapshot at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot file location.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TreeProvider for SnapshotFileProvider {
    type Node = Arc<SnapshotNode>;

    fn current_tree(&self) -> Result<Option<Self::Node>, ProviderError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ProviderError::Unavailable(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let root: SnapshotNode = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Malformed(format!("{}: {e}", self.path.display())))?;
        Ok(Some(Arc::new(root)))
    }
}

/// One journal line per synthetic click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickRecord {
    pub clicked_at: chrono::DateTime<chrono::Utc>,
    pub label: Option<String>,
    pub description: Option<String>,
}

/// Action channel that appends each click to a JSONL journal.
pub struct JournalActionChannel {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JournalActionChannel {
    /// Channel appending to the journal at `path`. Created on first click.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Journal file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back all journal records, skipping (and logging) malformed lines.
    pub fn read_records(&self) -> std::io::Result<Vec<ClickRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ClickRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    journal = %self.path.display(),
                    line = index + 1,
                    "skipping malformed click record: {e}"
                ),
            }
        }
        Ok(records)
    }

    fn append(&self, record: &ClickRecord) -> Result<(), DispatchError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DispatchError::Unavailable(format!("cannot create journal directory: {e}"))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DispatchError::Unavailable(format!("cannot open click journal: {e}")))?;
        let json = serde_json::to_string(record)
            .map_err(|e| DispatchError::Rejected(format!("cannot encode click record: {e}")))?;
        writeln!(file, "{json}")
            .map_err(|e| DispatchError::Rejected(format!("cannot append click record: {e}")))
    }
}

impl<N: UiNode> ActionChannel<N> for JournalActionChannel {
    fn click(&self, node: &N) -> Result<(), DispatchError> {
        let record = ClickRecord {
            clicked_at: chrono::Utc::now(),
            label: node.text_label().map(str::to_owned),
            description: node.accessibility_description().map(str::to_owned),
        };
        self.append(&record)?;
        debug!(journal = %self.path.display(), "click journaled");
        Ok(())
    }
}
