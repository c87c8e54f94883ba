//! Typed models matching the database schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use vdx_core::{
    AudioCodec, ContainerFormat, HdrFormat, ResolutionCategory, VideoCodec, VideoMetadata,
};

/// One catalogued video file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: i64,
    pub file_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub duration_seconds: Option<f64>,
    pub video_codec: VideoCodec,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub bit_rate: Option<u64>,
    pub bit_depth: Option<u32>,
    pub hdr_format: HdrFormat,
    pub audio_codec: AudioCodec,
    pub audio_channels: Option<u32>,
    pub is_atmos: bool,
    pub is_dtsx: bool,
    pub container_format: ContainerFormat,
    pub scan_session_id: Option<i64>,
    pub scanned_at: DateTime<Utc>,
    pub file_hash: Option<String>,
    pub is_corrupted: bool,
    pub corruption_details: Option<String>,
}

impl VideoRecord {
    /// Resolution band for this record, when the height is known.
    pub fn resolution_category(&self) -> Option<ResolutionCategory> {
        self.height.map(ResolutionCategory::from_height)
    }
}

/// Insert payload for one video file; `id` and `scanned_at` are assigned
/// by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideo {
    pub file_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub metadata: VideoMetadata,
    pub scan_session_id: Option<i64>,
}

/// Lifecycle status of a scan session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Whether this status ends the session for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// One scan invocation. `pending_files` is persisted in the row as JSON so
/// an interrupted session can be recovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    pub id: i64,
    pub folder_path: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_files: u64,
    pub processed_files: u64,
    pub status: SessionStatus,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub pending_files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_round_trip() {
        for status in [
            SessionStatus::InProgress,
            SessionStatus::Paused,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
            SessionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(!SessionStatus::Paused.is_terminal());
    }

    #[test]
    fn record_resolution_category() {
        let record = VideoRecord {
            id: 1,
            file_path: "/a.mkv".into(),
            file_name: "a.mkv".into(),
            file_size: 100,
            duration_seconds: None,
            video_codec: VideoCodec::Hevc,
            width: Some(3840),
            height: Some(2160),
            frame_rate: None,
            bit_rate: None,
            bit_depth: None,
            hdr_format: HdrFormat::Sdr,
            audio_codec: AudioCodec::Aac,
            audio_channels: None,
            is_atmos: false,
            is_dtsx: false,
            container_format: ContainerFormat::Mkv,
            scan_session_id: None,
            scanned_at: Utc::now(),
            file_hash: None,
            is_corrupted: false,
            corruption_details: None,
        };
        assert_eq!(
            record.resolution_category(),
            Some(ResolutionCategory::Uhd4k)
        );
    }
}
