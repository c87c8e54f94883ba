//! Pure interpretation of a probe document into normalized metadata.
//!
//! Everything here is a function of the probe output plus the file path;
//! there is no I/O. HDR classification is priority-ordered (Dolby Vision
//! side data beats everything, then HDR10+, HLG, HDR10) and bit depth alone
//! is never treated as HDR evidence, since 10-bit SDR masters exist.

use std::path::Path;

use vdx_core::{AudioCodec, ContainerFormat, HdrFormat, VideoCodec, VideoMetadata};

use crate::types::{ProbeDocument, ProbeStream};

/// Parse a probe document into a [`VideoMetadata`] record.
///
/// `file_path` supplies the extension fallback for container resolution.
pub fn parse(doc: &ProbeDocument, file_path: &Path) -> VideoMetadata {
    let video = doc.primary_video();
    let audio = doc.primary_audio();

    let video_codec = video
        .and_then(|s| s.codec_name.as_deref())
        .map(VideoCodec::from_probe_name)
        .unwrap_or(VideoCodec::Unknown);

    let bit_depth = video.and_then(resolve_bit_depth);
    let hdr_format = video
        .map(|s| classify_hdr(s, bit_depth))
        .unwrap_or(HdrFormat::Sdr);

    let (audio_codec, audio_channels, is_atmos, is_dtsx) = match audio {
        Some(stream) => resolve_audio(stream),
        None => (AudioCodec::Unknown, None, false, false),
    };

    VideoMetadata {
        duration_seconds: doc.format.duration_seconds(),
        video_codec,
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
        frame_rate: video.and_then(resolve_frame_rate),
        bit_rate: video
            .and_then(|s| s.bit_rate_bps())
            .or_else(|| doc.format.bit_rate_bps()),
        bit_depth,
        hdr_format,
        audio_codec,
        audio_channels,
        is_atmos,
        is_dtsx,
        container_format: resolve_container(doc, file_path),
    }
}

// ---------------------------------------------------------------------------
// Video stream resolution
// ---------------------------------------------------------------------------

/// Average frame rate when usable, else real frame rate. Rates arrive as
/// `numerator/denominator` and occasionally as a plain float.
fn resolve_frame_rate(stream: &ProbeStream) -> Option<f64> {
    stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rational))
}

fn parse_rational(raw: &str) -> Option<f64> {
    if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den != 0.0 {
            let value = num / den;
            return (value.is_finite() && value > 0.0).then_some(value);
        }
        return None;
    }
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Explicit bits-per-raw-sample first, then pixel-format inference.
fn resolve_bit_depth(stream: &ProbeStream) -> Option<u32> {
    if let Some(bits) = stream.bits_per_raw_sample_value() {
        return Some(bits);
    }

    let pix_fmt = stream.pix_fmt.as_deref()?.to_ascii_lowercase();
    if pix_fmt.contains("10le") || pix_fmt.contains("10be") || pix_fmt.contains("p010") {
        Some(10)
    } else if pix_fmt.contains("12le") || pix_fmt.contains("12be") {
        Some(12)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// HDR classification
// ---------------------------------------------------------------------------

/// Priority-ordered HDR classification; the highest matching rule wins.
fn classify_hdr(stream: &ProbeStream, bit_depth: Option<u32>) -> HdrFormat {
    let transfer = stream
        .color_transfer
        .as_deref()
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    let primaries = stream
        .color_primaries
        .as_deref()
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();

    let is_pq = transfer.contains("smpte2084") || transfer.contains("pq");

    // 1. Dolby Vision, from side data. A PQ base layer marks the dual-layer
    //    stream common in streaming, which plays as HDR10 on non-DV displays.
    let has_dovi = stream
        .side_data_types()
        .any(|t| t.contains("dolby vision") || t.contains("dovi"));
    if has_dovi {
        return if is_pq {
            HdrFormat::DolbyVisionHdr10
        } else {
            HdrFormat::DolbyVision
        };
    }

    // 2. HDR10+, from dynamic-metadata side data.
    let has_hdr10_plus = stream
        .side_data_types()
        .any(|t| t.contains("hdr10+") || t.contains("hdr dynamic metadata"));
    if has_hdr10_plus {
        return HdrFormat::Hdr10Plus;
    }

    // 3. HLG, from the transfer characteristic.
    if transfer.contains("arib-std-b67") || transfer.contains("hlg") {
        return HdrFormat::Hlg;
    }

    // 4. HDR10: PQ transfer plus wide-gamut primaries, or PQ plus >=10-bit
    //    depth when the primaries metadata is incomplete.
    let wide_gamut = primaries.contains("bt2020") || primaries.contains("2020");
    if is_pq && (wide_gamut || bit_depth.is_some_and(|b| b >= 10)) {
        return HdrFormat::Hdr10;
    }

    HdrFormat::Sdr
}

// ---------------------------------------------------------------------------
// Audio stream resolution
// ---------------------------------------------------------------------------

fn resolve_audio(stream: &ProbeStream) -> (AudioCodec, Option<u32>, bool, bool) {
    let mut codec = stream
        .codec_name
        .as_deref()
        .map(AudioCodec::from_probe_name)
        .unwrap_or(AudioCodec::Unknown);

    let profile = stream
        .profile
        .as_deref()
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();

    // ffprobe reports every DTS flavor as `dts`; the profile names the tier.
    if codec == AudioCodec::Dts && profile.contains("dts-hd") {
        codec = AudioCodec::DtsHd;
    }

    let channels = Some(resolve_channels(stream));
    let is_atmos = detect_atmos(stream, codec, &profile, channels);
    let is_dtsx = detect_dtsx(stream, codec, &profile);

    (codec, channels, is_atmos, is_dtsx)
}

/// Reported channel count, else layout inference.
fn resolve_channels(stream: &ProbeStream) -> u32 {
    if let Some(channels) = stream.channels {
        return channels;
    }

    let layout = stream
        .channel_layout
        .as_deref()
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();

    if layout.contains("7.1") || layout.contains("octagonal") {
        8
    } else if layout.contains("5.1") || layout.contains("hexagonal") {
        6
    } else if layout.contains("stereo") {
        2
    } else if layout.contains("mono") {
        1
    } else if layout.contains("quad") {
        4
    } else {
        2
    }
}

/// Atmos rides inside TrueHD or E-AC-3 only. Metadata evidence first; the
/// channel-count heuristic catches TrueHD masters where the Atmos flag is
/// absent but the 8-channel bed is present.
fn detect_atmos(
    stream: &ProbeStream,
    codec: AudioCodec,
    profile: &str,
    channels: Option<u32>,
) -> bool {
    if !codec.can_carry_atmos() {
        return false;
    }

    if profile.contains("atmos") {
        return true;
    }

    if stream
        .codec_long_name
        .as_deref()
        .is_some_and(|n| n.to_ascii_lowercase().contains("atmos"))
    {
        return true;
    }

    if stream
        .side_data_types()
        .any(|t| t.contains("atmos") || t.contains("dolby"))
    {
        return true;
    }

    if stream
        .tag("title")
        .is_some_and(|t| t.to_ascii_lowercase().contains("atmos"))
    {
        return true;
    }

    codec == AudioCodec::TrueHd && channels.is_some_and(|c| c >= 8)
}

/// DTS:X rides inside DTS-HD streams only. Explicit metadata is required;
/// there is no channel heuristic.
fn detect_dtsx(stream: &ProbeStream, codec: AudioCodec, profile: &str) -> bool {
    if !codec.can_carry_dtsx() {
        return false;
    }

    if mentions_dtsx(profile) {
        return true;
    }
    // "DTS-HD MA" plus a trailing X marker, e.g. "DTS-HD MA X".
    if profile.contains("dts-hd ma") {
        if let Some(rest) = profile.split("dts-hd ma").nth(1) {
            if rest.split_whitespace().any(|word| word == "x") {
                return true;
            }
        }
    }

    if stream
        .codec_long_name
        .as_deref()
        .is_some_and(|n| mentions_dtsx(&n.to_ascii_lowercase()))
    {
        return true;
    }

    stream
        .tag("title")
        .is_some_and(|t| mentions_dtsx_loose(&t.to_ascii_lowercase()))
}

fn mentions_dtsx(text: &str) -> bool {
    text.contains("dts:x") || text.contains("dts-x")
}

fn mentions_dtsx_loose(text: &str) -> bool {
    mentions_dtsx(text) || text.contains("dtsx")
}

// ---------------------------------------------------------------------------
// Container resolution
// ---------------------------------------------------------------------------

fn resolve_container(doc: &ProbeDocument, file_path: &Path) -> ContainerFormat {
    if let Some(container) = doc
        .format
        .format_name
        .as_deref()
        .and_then(ContainerFormat::from_format_name)
    {
        return container;
    }

    file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(ContainerFormat::from_extension)
        .unwrap_or(ContainerFormat::Unknown)
}
