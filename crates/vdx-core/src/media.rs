//! Media-domain enums and the normalized metadata value.
//!
//! All enums serialize in lowercase (via `serde(rename_all = "lowercase")`,
//! with explicit renames where the stored string differs) and implement
//! `Display`/`FromStr` manually so the database always sees the same stable
//! vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// VideoCodec
// ---------------------------------------------------------------------------

/// Recognized video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
    Vp9,
    Av1,
    Prores,
    Dnxhd,
    Mpeg2Video,
    Mpeg4,
    Vp8,
    Wmv3,
    Vc1,
    Mjpeg,
    Unknown,
}

impl VideoCodec {
    /// Every variant, in display order. Used by statistics and CLI parsing.
    pub const ALL: &'static [VideoCodec] = &[
        Self::H264,
        Self::Hevc,
        Self::Vp9,
        Self::Av1,
        Self::Prores,
        Self::Dnxhd,
        Self::Mpeg2Video,
        Self::Mpeg4,
        Self::Vp8,
        Self::Wmv3,
        Self::Vc1,
        Self::Mjpeg,
        Self::Unknown,
    ];

    /// Stable string form, as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::Prores => "prores",
            Self::Dnxhd => "dnxhd",
            Self::Mpeg2Video => "mpeg2video",
            Self::Mpeg4 => "mpeg4",
            Self::Vp8 => "vp8",
            Self::Wmv3 => "wmv3",
            Self::Vc1 => "vc1",
            Self::Mjpeg => "mjpeg",
            Self::Unknown => "unknown",
        }
    }

    /// Normalize an ffprobe `codec_name`, accepting common aliases.
    pub fn from_probe_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "h264" | "avc" | "avc1" => Self::H264,
            "hevc" | "h265" | "hvc1" | "hev1" => Self::Hevc,
            "vp9" => Self::Vp9,
            "av1" | "av01" => Self::Av1,
            "prores" => Self::Prores,
            "dnxhd" => Self::Dnxhd,
            "mpeg2video" | "mpeg2" => Self::Mpeg2Video,
            "mpeg4" | "mp4v" => Self::Mpeg4,
            "vp8" => Self::Vp8,
            "wmv3" => Self::Wmv3,
            "vc1" | "vc-1" => Self::Vc1,
            "mjpeg" | "mjpg" => Self::Mjpeg,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown video codec: {s}"))
    }
}

// ---------------------------------------------------------------------------
// AudioCodec
// ---------------------------------------------------------------------------

/// Recognized audio codecs, for the primary (first) audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Ac3,
    Eac3,
    #[serde(rename = "truehd")]
    TrueHd,
    Dts,
    #[serde(rename = "dts-hd")]
    DtsHd,
    Flac,
    Opus,
    Vorbis,
    Mp3,
    Pcm,
    Alac,
    Wma,
    Unknown,
}

impl AudioCodec {
    /// Every variant, in display order.
    pub const ALL: &'static [AudioCodec] = &[
        Self::Aac,
        Self::Ac3,
        Self::Eac3,
        Self::TrueHd,
        Self::Dts,
        Self::DtsHd,
        Self::Flac,
        Self::Opus,
        Self::Vorbis,
        Self::Mp3,
        Self::Pcm,
        Self::Alac,
        Self::Wma,
        Self::Unknown,
    ];

    /// Stable string form, as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Ac3 => "ac3",
            Self::Eac3 => "eac3",
            Self::TrueHd => "truehd",
            Self::Dts => "dts",
            Self::DtsHd => "dts-hd",
            Self::Flac => "flac",
            Self::Opus => "opus",
            Self::Vorbis => "vorbis",
            Self::Mp3 => "mp3",
            Self::Pcm => "pcm",
            Self::Alac => "alac",
            Self::Wma => "wma",
            Self::Unknown => "unknown",
        }
    }

    /// Normalize an ffprobe `codec_name`.
    ///
    /// ffprobe reports every DTS flavor as `dts` with the variant in the
    /// profile; callers that know the profile can upgrade via
    /// [`AudioCodec::DtsHd`].
    pub fn from_probe_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("pcm") {
            return Self::Pcm;
        }
        if lower.starts_with("wmav") || lower == "wma" {
            return Self::Wma;
        }
        match lower.as_str() {
            "aac" => Self::Aac,
            "ac3" => Self::Ac3,
            "eac3" => Self::Eac3,
            "truehd" => Self::TrueHd,
            "dts" => Self::Dts,
            "dts-hd" | "dtshd" => Self::DtsHd,
            "flac" => Self::Flac,
            "opus" => Self::Opus,
            "vorbis" => Self::Vorbis,
            "mp3" => Self::Mp3,
            "alac" => Self::Alac,
            _ => Self::Unknown,
        }
    }

    /// Whether this codec can carry a Dolby Atmos extension.
    pub fn can_carry_atmos(&self) -> bool {
        matches!(self, Self::TrueHd | Self::Eac3)
    }

    /// Whether this codec can carry a DTS:X extension.
    pub fn can_carry_dtsx(&self) -> bool {
        matches!(self, Self::Dts | Self::DtsHd)
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown audio codec: {s}"))
    }
}

// ---------------------------------------------------------------------------
// HdrFormat
// ---------------------------------------------------------------------------

/// HDR format classification.
///
/// `DolbyVision` and `DolbyVisionHdr10` are distinct variants: a DV track
/// with a PQ base layer plays back as HDR10 on non-DV displays, which
/// matters to the query surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HdrFormat {
    Sdr,
    Hdr10,
    #[serde(rename = "hdr10plus")]
    Hdr10Plus,
    #[serde(rename = "dolby_vision")]
    DolbyVision,
    Hlg,
    #[serde(rename = "dolby_vision_hdr10")]
    DolbyVisionHdr10,
}

impl HdrFormat {
    /// Every variant, in display order.
    pub const ALL: &'static [HdrFormat] = &[
        Self::Sdr,
        Self::Hdr10,
        Self::Hdr10Plus,
        Self::DolbyVision,
        Self::Hlg,
        Self::DolbyVisionHdr10,
    ];

    /// Stable string form, as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sdr => "sdr",
            Self::Hdr10 => "hdr10",
            Self::Hdr10Plus => "hdr10plus",
            Self::DolbyVision => "dolby_vision",
            Self::Hlg => "hlg",
            Self::DolbyVisionHdr10 => "dolby_vision_hdr10",
        }
    }
}

impl fmt::Display for HdrFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HdrFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown hdr format: {s}"))
    }
}

// ---------------------------------------------------------------------------
// ContainerFormat
// ---------------------------------------------------------------------------

/// Recognized container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mkv,
    Mp4,
    Mov,
    Avi,
    Wmv,
    Webm,
    Flv,
    M4v,
    Ts,
    Mts,
    M2ts,
    Vob,
    Mpg,
    Unknown,
}

impl ContainerFormat {
    /// Every variant, in display order.
    pub const ALL: &'static [ContainerFormat] = &[
        Self::Mkv,
        Self::Mp4,
        Self::Mov,
        Self::Avi,
        Self::Wmv,
        Self::Webm,
        Self::Flv,
        Self::M4v,
        Self::Ts,
        Self::Mts,
        Self::M2ts,
        Self::Vob,
        Self::Mpg,
        Self::Unknown,
    ];

    /// Stable string form, as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mkv => "mkv",
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Avi => "avi",
            Self::Wmv => "wmv",
            Self::Webm => "webm",
            Self::Flv => "flv",
            Self::M4v => "m4v",
            Self::Ts => "ts",
            Self::Mts => "mts",
            Self::M2ts => "m2ts",
            Self::Vob => "vob",
            Self::Mpg => "mpg",
            Self::Unknown => "unknown",
        }
    }

    /// Match a probe `format_name` against known substrings.
    ///
    /// Returns `None` when no substring matches; the caller should fall
    /// back to [`ContainerFormat::from_extension`].
    pub fn from_format_name(format_name: &str) -> Option<Self> {
        let lower = format_name.to_ascii_lowercase();
        // Demuxer names are comma-separated lists; order here resolves the
        // overlaps (e.g. "mov,mp4,m4a,3gp,3g2,mj2" covers both mov and mp4).
        const SUBSTRINGS: &[(&str, ContainerFormat)] = &[
            ("matroska", ContainerFormat::Mkv),
            ("mp4", ContainerFormat::Mp4),
            ("quicktime", ContainerFormat::Mov),
            ("avi", ContainerFormat::Avi),
            ("asf", ContainerFormat::Wmv),
            ("webm", ContainerFormat::Webm),
            ("flv", ContainerFormat::Flv),
            ("mpegts", ContainerFormat::Ts),
            ("vob", ContainerFormat::Vob),
            ("mpegvideo", ContainerFormat::Mpg),
            ("mpeg", ContainerFormat::Mpg),
        ];
        SUBSTRINGS
            .iter()
            .find(|(needle, _)| lower.contains(needle))
            .map(|(_, c)| *c)
    }

    /// Map a lowercase file extension to a container.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mkv" => Self::Mkv,
            "mp4" => Self::Mp4,
            "mov" => Self::Mov,
            "avi" => Self::Avi,
            "wmv" => Self::Wmv,
            "webm" => Self::Webm,
            "flv" => Self::Flv,
            "m4v" => Self::M4v,
            "ts" => Self::Ts,
            "mts" => Self::Mts,
            "m2ts" => Self::M2ts,
            "vob" => Self::Vob,
            "mpg" | "mpeg" => Self::Mpg,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown container format: {s}"))
    }
}

// ---------------------------------------------------------------------------
// ResolutionCategory
// ---------------------------------------------------------------------------

/// Coarse resolution band, keyed purely on frame height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionCategory {
    #[serde(rename = "SD")]
    Sd,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "4K")]
    Uhd4k,
    #[serde(rename = "8K")]
    Uhd8k,
}

impl ResolutionCategory {
    /// Every band, lowest first.
    pub const ALL: &'static [ResolutionCategory] = &[
        Self::Sd,
        Self::P360,
        Self::P480,
        Self::P720,
        Self::P1080,
        Self::P1440,
        Self::Uhd4k,
        Self::Uhd8k,
    ];

    /// Band name as shown in filters and statistics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sd => "SD",
            Self::P360 => "360p",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::P1440 => "1440p",
            Self::Uhd4k => "4K",
            Self::Uhd8k => "8K",
        }
    }

    /// Classify a frame height. Total over all heights: every height maps
    /// to exactly one band.
    pub fn from_height(height: u32) -> Self {
        match height {
            0..=359 => Self::Sd,
            360..=479 => Self::P360,
            480..=719 => Self::P480,
            720..=1079 => Self::P720,
            1080..=1439 => Self::P1080,
            1440..=2159 => Self::P1440,
            2160..=4319 => Self::Uhd4k,
            _ => Self::Uhd8k,
        }
    }

    /// Height range `[lower, upper)` covered by this band. The upper bound
    /// is `None` for the open-ended 8K band.
    pub fn height_range(&self) -> (u32, Option<u32>) {
        match self {
            Self::Sd => (0, Some(360)),
            Self::P360 => (360, Some(480)),
            Self::P480 => (480, Some(720)),
            Self::P720 => (720, Some(1080)),
            Self::P1080 => (1080, Some(1440)),
            Self::P1440 => (1440, Some(2160)),
            Self::Uhd4k => (2160, Some(4320)),
            Self::Uhd8k => (4320, None),
        }
    }
}

impl fmt::Display for ResolutionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown resolution category: {s}"))
    }
}

// ---------------------------------------------------------------------------
// VideoMetadata
// ---------------------------------------------------------------------------

/// Normalized metadata for one video file, as produced by the probe parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
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
}

impl Default for VideoMetadata {
    fn default() -> Self {
        Self {
            duration_seconds: None,
            video_codec: VideoCodec::Unknown,
            width: None,
            height: None,
            frame_rate: None,
            bit_rate: None,
            bit_depth: None,
            hdr_format: HdrFormat::Sdr,
            audio_codec: AudioCodec::Unknown,
            audio_channels: None,
            is_atmos: false,
            is_dtsx: false,
            container_format: ContainerFormat::Unknown,
        }
    }
}

impl VideoMetadata {
    /// Resolution band for this record, when the height is known.
    pub fn resolution_category(&self) -> Option<ResolutionCategory> {
        self.height.map(ResolutionCategory::from_height)
    }
}
