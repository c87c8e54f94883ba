//! Corruption detection through a full decode pass.
//!
//! Runs the decoder with error-only verbosity into a null sink; any
//! non-empty stderr line is evidence of corruption. Lines are classified by
//! substring and scanned for a media timestamp so the client can seek to
//! the damage.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Classified corruption evidence. First matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionKind {
    InvalidData,
    MissingData,
    Truncated,
    SyncError,
    DecodeError,
    HeaderError,
    ProcessError,
    Unknown,
}

impl CorruptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidData => "invalid_data",
            Self::MissingData => "missing_data",
            Self::Truncated => "truncated",
            Self::SyncError => "sync_error",
            Self::DecodeError => "decode_error",
            Self::HeaderError => "header_error",
            Self::ProcessError => "process_error",
            Self::Unknown => "unknown",
        }
    }
}

/// One classified stderr line from the decode pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorruptionError {
    #[serde(rename = "type")]
    pub kind: CorruptionKind,
    pub message: String,
    /// Seconds into the stream, when a timestamp could be extracted.
    pub timestamp: Option<f64>,
}

/// Outcome of one decode pass.
#[derive(Debug, Clone, Default)]
pub struct DecodeOutcome {
    pub errors: Vec<CorruptionError>,
}

impl DecodeOutcome {
    /// A file is corrupted iff the decoder produced any stderr.
    pub fn is_corrupted(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Decode `path` to a null sink and collect classified stderr evidence.
///
/// Blocks until the decode finishes; callers on an async runtime must use
/// `spawn_blocking`. A spawn failure is itself reported as corruption
/// evidence of kind `process_error` so the caller sees a uniform shape.
pub fn decode_check(ffmpeg: &Path, path: &Path) -> DecodeOutcome {
    let child = Command::new(ffmpeg)
        .arg("-v")
        .arg("error")
        .arg("-i")
        .arg(path)
        .arg("-f")
        .arg("null")
        .arg("-")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            return DecodeOutcome {
                errors: vec![CorruptionError {
                    kind: CorruptionKind::ProcessError,
                    message: format!("failed to start decoder: {e}"),
                    timestamp: None,
                }],
            };
        }
    };

    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr);
    }
    let _ = child.wait();

    let errors = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| CorruptionError {
            kind: classify_line(line),
            message: line.to_string(),
            timestamp: extract_timestamp(line),
        })
        .collect();

    DecodeOutcome { errors }
}

/// Classify a stderr line by case-insensitive substring; first match wins.
pub fn classify_line(line: &str) -> CorruptionKind {
    let lower = line.to_ascii_lowercase();
    if lower.contains("invalid") || lower.contains("corrupt") {
        CorruptionKind::InvalidData
    } else if lower.contains("missing") || lower.contains("not found") {
        CorruptionKind::MissingData
    } else if lower.contains("truncated") || lower.contains("end of file") {
        CorruptionKind::Truncated
    } else if lower.contains("sync") || lower.contains("timestamp") {
        CorruptionKind::SyncError
    } else if lower.contains("decode") || lower.contains("decoding") {
        CorruptionKind::DecodeError
    } else if lower.contains("header") {
        CorruptionKind::HeaderError
    } else {
        CorruptionKind::Unknown
    }
}

fn timestamp_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // "time=123.456" or "time: 123.456"
            r"(?i)\btime[=:]\s*([0-9]+(?:\.[0-9]+)?)\b",
            // "pts=90000" / "pts_time=3.75"
            r"(?i)\bpts(?:_time)?[=:]\s*([0-9]+(?:\.[0-9]+)?)\b",
            // "timestamp=3.75"
            r"(?i)\btimestamp[=:]\s*([0-9]+(?:\.[0-9]+)?)\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
    })
}

/// Scan a line for a media timestamp; the first matching pattern wins.
pub fn extract_timestamp(line: &str) -> Option<f64> {
    for pattern in timestamp_patterns() {
        if let Some(caps) = pattern.captures(line) {
            if let Some(value) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
                return Some(value);
            }
        }
    }
    None
}
