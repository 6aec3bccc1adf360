//! Audit Log
//!
//! Append-only record of session events.
//!
//! ## Format
//! One JSON object per line:
//! ```text
//! {"timestamp":"2024-05-01T12:00:00Z","action":"connect","peer":"127.0.0.1:50512"}
//! ```
//! Entries are never rewritten or removed.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{QrLinkError, Result};

/// Events worth recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Connect,
    Greeting,
    Rejected,
    UploadStart,
    UploadComplete,
    UploadFailed,
    Close,
    Shutdown,
    Timeout,
    Disconnect,
    Error,
}

/// A single audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,

    pub action: AuditAction,

    /// Peer socket address
    pub peer: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEntry {
    /// Create an entry stamped with the current time
    pub fn new(action: AuditAction, peer: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            peer: peer.into(),
            session_id: None,
            detail: None,
        }
    }

    pub fn with_session(mut self, id: u64) -> Self {
        self.session_id = Some(id);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Destination for audit entries
///
/// Shared by every session worker, so `record` takes `&self` and each call
/// must land as one whole entry.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry) -> Result<()>;
}

/// Record an entry, logging instead of failing
pub(crate) fn record_or_warn(sink: &dyn AuditSink, entry: AuditEntry) {
    if let Err(e) = sink.record(&entry) {
        tracing::warn!("Failed to record {:?} for {}: {}", entry.action, entry.peer, e);
    }
}

// =============================================================================
// File sink
// =============================================================================

/// Appends JSON lines to a file
pub struct FileAuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAuditLog {
    /// Open or create the log file in append mode
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every entry in the file
    pub fn read_entries(path: &Path) -> Result<Vec<AuditEntry>> {
        let content = std::fs::read_to_string(path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| QrLinkError::Audit(e.to_string()))
            })
            .collect()
    }
}

impl AuditSink for FileAuditLog {
    fn record(&self, entry: &AuditEntry) -> Result<()> {
        let mut line =
            serde_json::to_vec(entry).map_err(|e| QrLinkError::Audit(e.to_string()))?;
        line.push(b'\n');

        // One write per entry so concurrent sessions never interleave a line
        let mut file = self.file.lock();
        file.write_all(&line)?;
        Ok(())
    }
}

// =============================================================================
// In-memory and no-op sinks
// =============================================================================

/// Keeps entries in memory
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries so far
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Actions recorded so far, in order
    pub fn actions(&self) -> Vec<AuditAction> {
        self.entries.lock().iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, entry: &AuditEntry) -> Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

/// Discards everything
pub struct NoopAuditLog;

impl AuditSink for NoopAuditLog {
    fn record(&self, _entry: &AuditEntry) -> Result<()> {
        Ok(())
    }
}
