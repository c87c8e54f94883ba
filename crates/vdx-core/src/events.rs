//! Scan engine event streams.
//!
//! [`ScanEvents`] carries the three outputs of a scan: a `watch` channel for
//! progress (last value wins, the client only needs the latest), a
//! `broadcast` channel for log entries backed by a bounded ring buffer of
//! recent entries for late joiners, and a `broadcast` channel for the
//! single completion summary per terminal transition.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::{broadcast, watch};

/// Maximum number of log entries retained in the ring buffer.
const MAX_RECENT_LOGS: usize = 256;

/// Capacity of the log broadcast channel; slow receivers lag and lose the
/// oldest entries, never the newest.
const LOG_CHANNEL_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// ScanState
// ---------------------------------------------------------------------------

/// Lifecycle state of the scan engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Idle,
    Scanning,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl ScanState {
    /// Whether this state ends a session for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// LogLevel / LogEntry
// ---------------------------------------------------------------------------

/// Severity of a scan log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A structured log entry published by the scan engine.
///
/// Entries carrying a `file_path` are actionable: the client can offer a
/// reveal-in-filesystem affordance for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub file_path: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            file_path: None,
        }
    }

    pub fn with_file(level: LogLevel, message: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            file_path: Some(file_path.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// ScanProgress / ScanCompletion
// ---------------------------------------------------------------------------

/// Snapshot of scan progress, published at most every 100 ms while
/// scanning and unthrottled on state transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub total: u64,
    pub processed: u64,
    pub current_file: Option<String>,
    pub state: ScanState,
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self {
            total: 0,
            processed: 0,
            current_file: None,
            state: ScanState::Idle,
        }
    }
}

/// Summary published once per terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCompletion {
    pub total: u64,
    pub processed: u64,
    pub duration_secs: f64,
    pub folder_path: String,
    pub state: ScanState,
}

// ---------------------------------------------------------------------------
// ScanEvents
// ---------------------------------------------------------------------------

/// The scan engine's three output streams.
pub struct ScanEvents {
    progress_tx: watch::Sender<ScanProgress>,
    log_tx: broadcast::Sender<LogEntry>,
    completion_tx: broadcast::Sender<ScanCompletion>,
    recent_logs: RwLock<VecDeque<LogEntry>>,
}

impl Default for ScanEvents {
    fn default() -> Self {
        let (progress_tx, _) = watch::channel(ScanProgress::default());
        let (log_tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        let (completion_tx, _) = broadcast::channel(8);
        Self {
            progress_tx,
            log_tx,
            completion_tx,
            recent_logs: RwLock::new(VecDeque::with_capacity(MAX_RECENT_LOGS)),
        }
    }
}

impl ScanEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a progress snapshot. Receivers only observe the latest value.
    pub fn publish_progress(&self, progress: ScanProgress) {
        // send_replace never fails, even with zero receivers.
        self.progress_tx.send_replace(progress);
    }

    /// Publish a log entry, retaining it in the ring buffer.
    pub fn publish_log(&self, entry: LogEntry) {
        {
            let mut recent = self.recent_logs.write();
            if recent.len() == MAX_RECENT_LOGS {
                recent.pop_front();
            }
            recent.push_back(entry.clone());
        }
        // A send error only means there are no subscribers right now.
        let _ = self.log_tx.send(entry);
    }

    /// Publish the completion summary for a terminal transition.
    pub fn publish_completion(&self, completion: ScanCompletion) {
        let _ = self.completion_tx.send(completion);
    }

    /// Subscribe to progress snapshots.
    pub fn subscribe_progress(&self) -> watch::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Subscribe to log entries.
    pub fn subscribe_log(&self) -> broadcast::Receiver<LogEntry> {
        self.log_tx.subscribe()
    }

    /// Subscribe to completion summaries.
    pub fn subscribe_completion(&self) -> broadcast::Receiver<ScanCompletion> {
        self.completion_tx.subscribe()
    }

    /// The most recent log entries, oldest first.
    pub fn recent_logs(&self) -> Vec<LogEntry> {
        self.recent_logs.read().iter().cloned().collect()
    }

    /// The latest published progress snapshot.
    pub fn current_progress(&self) -> ScanProgress {
        self.progress_tx.borrow().clone()
    }
}
