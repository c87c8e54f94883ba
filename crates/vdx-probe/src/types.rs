//! Serde model of the ffprobe JSON document.
//!
//! Only the fields the parser consumes are declared; everything else in the
//! probe output is ignored. Numeric values that ffprobe emits as strings
//! (`duration`, `bit_rate`, `bits_per_raw_sample`) stay strings here and are
//! parsed lazily.

use serde::Deserialize;
use std::collections::HashMap;

/// Top-level probe output: one `format` object plus one entry per stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeDocument {
    #[serde(default)]
    pub format: ProbeFormat,
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

impl ProbeDocument {
    /// The first video stream, if any. Later video streams are typically
    /// embedded cover art and are ignored.
    pub fn primary_video(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "video")
    }

    /// The first audio stream, if any.
    pub fn primary_audio(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "audio")
    }
}

/// Container-level fields from `-show_format`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeFormat {
    pub filename: Option<String>,
    pub format_name: Option<String>,
    pub format_long_name: Option<String>,
    pub duration: Option<String>,
    pub size: Option<String>,
    pub bit_rate: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl ProbeFormat {
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn bit_rate_bps(&self) -> Option<u64> {
        self.bit_rate.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Stream-level fields from `-show_streams`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeStream {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub codec_type: String,
    pub codec_name: Option<String>,
    pub codec_long_name: Option<String>,
    pub profile: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub coded_width: Option<u32>,
    pub coded_height: Option<u32>,
    pub pix_fmt: Option<String>,
    pub color_range: Option<String>,
    pub color_space: Option<String>,
    pub color_transfer: Option<String>,
    pub color_primaries: Option<String>,
    pub bits_per_raw_sample: Option<String>,
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
    pub bit_rate: Option<String>,
    pub channels: Option<u32>,
    pub channel_layout: Option<String>,
    pub sample_rate: Option<String>,
    #[serde(default)]
    pub side_data_list: Vec<ProbeSideData>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub disposition: ProbeDisposition,
}

impl ProbeStream {
    pub fn bit_rate_bps(&self) -> Option<u64> {
        self.bit_rate.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn bits_per_raw_sample_value(&self) -> Option<u32> {
        self.bits_per_raw_sample
            .as_deref()
            .and_then(|s| s.parse().ok())
    }

    /// Case-insensitive tag lookup.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Iterate the lowercased side-data type strings.
    pub fn side_data_types(&self) -> impl Iterator<Item = String> + '_ {
        self.side_data_list
            .iter()
            .filter_map(|sd| sd.side_data_type.as_deref())
            .map(|s| s.to_ascii_lowercase())
    }
}

/// One side-data entry; the primary evidence for Dolby Vision and HDR10+.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeSideData {
    pub side_data_type: Option<String>,
}

/// Stream disposition flags.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeDisposition {
    #[serde(default)]
    pub default: u8,
    #[serde(default)]
    pub attached_pic: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "format": {
            "filename": "/media/sample.mkv",
            "format_name": "matroska,webm",
            "duration": "5421.333000",
            "size": "4294967296",
            "bit_rate": "6336000",
            "tags": {"title": "Sample"}
        },
        "streams": [
            {
                "index": 0,
                "codec_type": "video",
                "codec_name": "hevc",
                "width": 3840,
                "height": 2160,
                "pix_fmt": "yuv420p10le",
                "color_transfer": "smpte2084",
                "color_primaries": "bt2020",
                "bits_per_raw_sample": "10",
                "avg_frame_rate": "24000/1001",
                "side_data_list": [{"side_data_type": "DOVI configuration record"}]
            },
            {
                "index": 1,
                "codec_type": "audio",
                "codec_name": "truehd",
                "channels": 8,
                "channel_layout": "7.1",
                "tags": {"TITLE": "TrueHD Atmos 7.1"}
            }
        ]
    }"#;

    #[test]
    fn deserializes_sample() {
        let doc: ProbeDocument = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(doc.format.duration_seconds(), Some(5421.333));
        assert_eq!(doc.format.bit_rate_bps(), Some(6_336_000));
        assert_eq!(doc.streams.len(), 2);

        let video = doc.primary_video().unwrap();
        assert_eq!(video.codec_name.as_deref(), Some("hevc"));
        assert_eq!(video.bits_per_raw_sample_value(), Some(10));
        assert_eq!(
            video.side_data_types().collect::<Vec<_>>(),
            vec!["dovi configuration record"]
        );

        let audio = doc.primary_audio().unwrap();
        assert_eq!(audio.channels, Some(8));
        assert_eq!(audio.tag("title"), Some("TrueHD Atmos 7.1"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let doc: ProbeDocument =
            serde_json::from_str(r#"{"format": {"nb_streams": 3}, "streams": [], "chapters": []}"#)
                .unwrap();
        assert!(doc.streams.is_empty());
    }

    #[test]
    fn empty_document_defaults() {
        let doc: ProbeDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.primary_video().is_none());
        assert!(doc.primary_audio().is_none());
        assert_eq!(doc.format.duration_seconds(), None);
    }
}
