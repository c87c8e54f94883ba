//! Duplicate detection over catalog records.
//!
//! Three methods, in increasing cost and confidence: fuzzy metadata
//! grouping, three-window partial hashing, and full-content hashing with an
//! exact-size pre-group. Files that cannot be opened are silently excluded.
//! Everything here does blocking file I/O; async callers go through
//! `spawn_blocking`.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use vdx_db::VideoRecord;

/// Chunk size for full-content hashing.
const FULL_HASH_CHUNK: usize = 1024 * 1024;

/// Fuzzy duration bucket width, in seconds.
const DURATION_BUCKET_SECS: u64 = 5;

/// How duplicate candidates are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateMethod {
    Fuzzy,
    PartialHash,
    FullHash,
}

impl fmt::Display for DuplicateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fuzzy => "fuzzy",
            Self::PartialHash => "partial-hash",
            Self::FullHash => "full-hash",
        };
        f.write_str(s)
    }
}

impl FromStr for DuplicateMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fuzzy" => Ok(Self::Fuzzy),
            "partial-hash" | "partial" => Ok(Self::PartialHash),
            "full-hash" | "full" => Ok(Self::FullHash),
            other => Err(format!("unknown duplicate method: {other}")),
        }
    }
}

/// Phase tag attached to per-file progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePhase {
    Analyzing,
    Hashing,
    Comparing,
}

/// Per-file progress emitted while detecting duplicates.
#[derive(Debug, Clone)]
pub struct DuplicateProgress {
    pub phase: DuplicatePhase,
    pub current: u64,
    pub total: u64,
    pub file_path: String,
}

/// One group of suspected duplicates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DuplicateGroup {
    pub files: Vec<VideoRecord>,
    pub match_type: DuplicateMethod,
    /// Match confidence in `[0, 1]`.
    pub confidence: f64,
    /// Shared content hash, for the hash-based methods.
    pub content_hash: Option<String>,
}

impl DuplicateGroup {
    /// Combined size of every file in the group.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.file_size).sum()
    }

    /// Bytes reclaimable by keeping only the largest file.
    pub fn potential_savings(&self) -> u64 {
        let largest = self.files.iter().map(|f| f.file_size).max().unwrap_or(0);
        self.total_size() - largest
    }
}

/// Find duplicate groups among `records` using the given method.
///
/// Groups of fewer than two files are dropped; the result is sorted by
/// total group size, largest first.
pub fn find_duplicates(
    records: &[VideoRecord],
    method: DuplicateMethod,
    partial_window: u64,
    mut on_progress: impl FnMut(DuplicateProgress),
) -> Vec<DuplicateGroup> {
    let mut groups = match method {
        DuplicateMethod::Fuzzy => fuzzy_groups(records, &mut on_progress),
        DuplicateMethod::PartialHash => partial_hash_groups(records, partial_window, &mut on_progress),
        DuplicateMethod::FullHash => full_hash_groups(records, &mut on_progress),
    };

    groups.retain(|g| g.files.len() >= 2);
    groups.sort_by(|a, b| b.total_size().cmp(&a.total_size()));
    groups
}

// ---------------------------------------------------------------------------
// Fuzzy
// ---------------------------------------------------------------------------

fn fuzzy_key(record: &VideoRecord) -> (u64, u64, String) {
    let duration_bucket = record
        .duration_seconds
        .map(|d| (d as u64 / DURATION_BUCKET_SECS) * DURATION_BUCKET_SECS)
        .unwrap_or(0);
    let size_bucket = record.file_size / (1024 * 1024);
    let resolution = format!(
        "{}x{}",
        record.width.unwrap_or(0),
        record.height.unwrap_or(0)
    );
    (duration_bucket, size_bucket, resolution)
}

/// Score a fuzzy group: tighter size agreement and matching codec and
/// container each add confidence on top of the 0.5 baseline.
fn fuzzy_confidence(files: &[VideoRecord]) -> f64 {
    let mut confidence: f64 = 0.5;

    let min_size = files.iter().map(|f| f.file_size).min().unwrap_or(0);
    let max_size = files.iter().map(|f| f.file_size).max().unwrap_or(0);
    if min_size > 0 {
        let variation = (max_size - min_size) as f64 / min_size as f64;
        if variation < 0.01 {
            confidence += 0.3;
        } else if variation < 0.05 {
            confidence += 0.2;
        } else if variation < 0.10 {
            confidence += 0.1;
        }
    }

    if files.windows(2).all(|w| w[0].video_codec == w[1].video_codec) {
        confidence += 0.1;
    }
    if files
        .windows(2)
        .all(|w| w[0].container_format == w[1].container_format)
    {
        confidence += 0.1;
    }

    confidence.min(1.0)
}

fn fuzzy_groups(
    records: &[VideoRecord],
    on_progress: &mut impl FnMut(DuplicateProgress),
) -> Vec<DuplicateGroup> {
    let total = records.len() as u64;
    let mut buckets: HashMap<(u64, u64, String), Vec<VideoRecord>> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        on_progress(DuplicateProgress {
            phase: DuplicatePhase::Analyzing,
            current: i as u64 + 1,
            total,
            file_path: record.file_path.clone(),
        });
        buckets.entry(fuzzy_key(record)).or_default().push(record.clone());
    }

    let candidates: Vec<Vec<VideoRecord>> =
        buckets.into_values().filter(|v| v.len() >= 2).collect();
    let comparing_total = candidates.len() as u64;

    candidates
        .into_iter()
        .enumerate()
        .map(|(i, files)| {
            on_progress(DuplicateProgress {
                phase: DuplicatePhase::Comparing,
                current: i as u64 + 1,
                total: comparing_total,
                file_path: files[0].file_path.clone(),
            });
            let confidence = fuzzy_confidence(&files);
            DuplicateGroup {
                files,
                match_type: DuplicateMethod::Fuzzy,
                confidence,
                content_hash: None,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Partial hash
// ---------------------------------------------------------------------------

/// SHA-256 over three windows: the first `window` bytes, `window` bytes at
/// the midpoint, and the final `window` bytes. Files no larger than two
/// windows hash only the leading window.
pub fn partial_hash(path: &Path, window: u64) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let mut hasher = Sha256::new();

    let mut buf = vec![0u8; window as usize];

    let leading = size.min(window) as usize;
    file.read_exact(&mut buf[..leading])?;
    hasher.update(&buf[..leading]);

    if size > 2 * window {
        file.seek(SeekFrom::Start(size / 2))?;
        file.read_exact(&mut buf)?;
        hasher.update(&buf[..]);

        file.seek(SeekFrom::Start(size - window))?;
        file.read_exact(&mut buf)?;
        hasher.update(&buf[..]);
    }

    Ok(hex_digest(hasher))
}

fn partial_hash_groups(
    records: &[VideoRecord],
    window: u64,
    on_progress: &mut impl FnMut(DuplicateProgress),
) -> Vec<DuplicateGroup> {
    hash_into_groups(records, DuplicateMethod::PartialHash, 0.95, on_progress, |path| {
        partial_hash(path, window)
    })
}

// ---------------------------------------------------------------------------
// Full hash
// ---------------------------------------------------------------------------

/// Full-content SHA-256, streamed in 1 MiB chunks.
pub fn full_hash(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();

    let mut buf = vec![0u8; FULL_HASH_CHUNK];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex_digest(hasher))
}

fn full_hash_groups(
    records: &[VideoRecord],
    on_progress: &mut impl FnMut(DuplicateProgress),
) -> Vec<DuplicateGroup> {
    // Identical content implies identical size, so sizes pre-group the
    // candidates and singleton sizes skip hashing entirely.
    let mut by_size: HashMap<u64, Vec<VideoRecord>> = HashMap::new();
    let total = records.len() as u64;
    for (i, record) in records.iter().enumerate() {
        on_progress(DuplicateProgress {
            phase: DuplicatePhase::Analyzing,
            current: i as u64 + 1,
            total,
            file_path: record.file_path.clone(),
        });
        by_size.entry(record.file_size).or_default().push(record.clone());
    }

    let candidates: Vec<VideoRecord> = by_size
        .into_values()
        .filter(|v| v.len() >= 2)
        .flatten()
        .collect();

    hash_into_groups(&candidates, DuplicateMethod::FullHash, 1.0, on_progress, full_hash)
}

fn hash_into_groups(
    records: &[VideoRecord],
    method: DuplicateMethod,
    confidence: f64,
    on_progress: &mut impl FnMut(DuplicateProgress),
    hash_fn: impl Fn(&Path) -> std::io::Result<String>,
) -> Vec<DuplicateGroup> {
    let total = records.len() as u64;
    let mut by_hash: HashMap<String, Vec<VideoRecord>> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        on_progress(DuplicateProgress {
            phase: DuplicatePhase::Hashing,
            current: i as u64 + 1,
            total,
            file_path: record.file_path.clone(),
        });

        match hash_fn(Path::new(&record.file_path)) {
            Ok(hash) => by_hash.entry(hash).or_default().push(record.clone()),
            Err(e) => {
                tracing::debug!(file = %record.file_path, error = %e, "Skipping unreadable file");
            }
        }
    }

    by_hash
        .into_iter()
        .map(|(hash, files)| DuplicateGroup {
            files,
            match_type: method,
            confidence,
            content_hash: Some(hash),
        })
        .collect()
}

fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vdx_core::{AudioCodec, ContainerFormat, HdrFormat, VideoCodec};

    fn record(path: &str, size: u64, duration: Option<f64>, height: Option<u32>) -> VideoRecord {
        VideoRecord {
            id: 0,
            file_path: path.to_string(),
            file_name: path.rsplit('/').next().unwrap().to_string(),
            file_size: size,
            duration_seconds: duration,
            video_codec: VideoCodec::Hevc,
            width: height.map(|h| h * 16 / 9),
            height,
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
        }
    }

    #[test]
    fn fuzzy_groups_near_identical_files() {
        let records = vec![
            record("/m/a.mkv", 1_073_700_000, Some(95.0), Some(1080)),
            record("/m/b.mkv", 1_073_700_500, Some(97.0), Some(1080)),
            // Same size bucket and duration bucket, different resolution.
            record("/m/c.mkv", 1_073_700_200, Some(96.0), Some(720)),
        ];

        let groups = find_duplicates(&records, DuplicateMethod::Fuzzy, 64 * 1024, |_| {});
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].files.len(), 2);
        // <1% size variation, same codec, same container: 0.5+0.3+0.1+0.1,
        // clamped to 1.0.
        assert!(groups[0].confidence >= 0.8);
        assert!((groups[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fuzzy_duration_buckets_split_groups() {
        let records = vec![
            record("/m/a.mkv", 1_000_000, Some(95.0), Some(1080)),
            record("/m/b.mkv", 1_000_000, Some(101.0), Some(1080)),
        ];
        // 95 buckets to 95, 101 buckets to 100.
        let groups = find_duplicates(&records, DuplicateMethod::Fuzzy, 64 * 1024, |_| {});
        assert!(groups.is_empty());
    }

    #[test]
    fn fuzzy_codec_disagreement_lowers_confidence() {
        let mut a = record("/m/a.mkv", 1_000_000, Some(95.0), Some(1080));
        let mut b = record("/m/b.mkv", 1_000_100, Some(95.0), Some(1080));
        a.video_codec = VideoCodec::Hevc;
        b.video_codec = VideoCodec::H264;

        let groups = find_duplicates(&[a, b], DuplicateMethod::Fuzzy, 64 * 1024, |_| {});
        assert_eq!(groups.len(), 1);
        // 0.5 + 0.3 (size) + 0.1 (container only).
        assert!((groups[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn partial_hash_small_file_uses_leading_window_only() {
        let dir = tempfile::tempdir().unwrap();
        let window = 1024u64;

        // Both files share the first kilobyte but differ afterwards; at
        // 2*window total they must hash equal under the leading-only rule.
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let mut a_data = vec![7u8; 2 * window as usize];
        let mut b_data = vec![7u8; 2 * window as usize];
        a_data[1500] = 1;
        b_data[1500] = 2;
        std::fs::write(&a, &a_data).unwrap();
        std::fs::write(&b, &b_data).unwrap();

        assert_eq!(
            partial_hash(&a, window).unwrap(),
            partial_hash(&b, window).unwrap()
        );

        // One byte past the 2*window threshold, the middle window kicks in.
        let c = dir.path().join("c.bin");
        let d = dir.path().join("d.bin");
        let mut c_data = vec![7u8; 2 * window as usize + 1];
        let mut d_data = vec![7u8; 2 * window as usize + 1];
        c_data[1500] = 1;
        d_data[1500] = 2;
        std::fs::write(&c, &c_data).unwrap();
        std::fs::write(&d, &d_data).unwrap();

        assert_ne!(
            partial_hash(&c, window).unwrap(),
            partial_hash(&d, window).unwrap()
        );
    }

    #[test]
    fn partial_hash_groups_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let c = dir.path().join("c.bin");
        std::fs::write(&a, vec![1u8; 4096]).unwrap();
        std::fs::write(&b, vec![1u8; 4096]).unwrap();
        std::fs::write(&c, vec![2u8; 4096]).unwrap();

        let records = vec![
            record(a.to_str().unwrap(), 4096, None, None),
            record(b.to_str().unwrap(), 4096, None, None),
            record(c.to_str().unwrap(), 4096, None, None),
        ];

        let groups = find_duplicates(&records, DuplicateMethod::PartialHash, 1024, |_| {});
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].files.len(), 2);
        assert!((groups[0].confidence - 0.95).abs() < 1e-9);
        assert!(groups[0].content_hash.is_some());
    }

    #[test]
    fn full_hash_requires_identical_size() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let c = dir.path().join("c.bin");
        std::fs::write(&a, vec![5u8; 2048]).unwrap();
        std::fs::write(&b, vec![5u8; 2048]).unwrap();
        // Same leading content, different size: never hashed together.
        std::fs::write(&c, vec![5u8; 2049]).unwrap();

        let records = vec![
            record(a.to_str().unwrap(), 2048, None, None),
            record(b.to_str().unwrap(), 2048, None, None),
            record(c.to_str().unwrap(), 2049, None, None),
        ];

        let groups = find_duplicates(&records, DuplicateMethod::FullHash, 64 * 1024, |_| {});
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].files.len(), 2);
        assert!((groups[0].confidence - 1.0).abs() < 1e-9);
        assert!(groups[0]
            .files
            .iter()
            .all(|f| f.file_size == groups[0].files[0].file_size));
    }

    #[test]
    fn unreadable_files_are_silently_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, vec![5u8; 2048]).unwrap();
        std::fs::write(&b, vec![5u8; 2048]).unwrap();

        let records = vec![
            record(a.to_str().unwrap(), 2048, None, None),
            record(b.to_str().unwrap(), 2048, None, None),
            record("/nonexistent/ghost.bin", 2048, None, None),
        ];

        let groups = find_duplicates(&records, DuplicateMethod::FullHash, 64 * 1024, |_| {});
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].files.len(), 2);
    }

    #[test]
    fn groups_sort_by_total_size_descending() {
        let records = vec![
            record("/m/small1.mkv", 10_000_000, Some(10.0), Some(720)),
            record("/m/small2.mkv", 10_000_000, Some(10.0), Some(720)),
            record("/m/big1.mkv", 900_000_000, Some(50.0), Some(1080)),
            record("/m/big2.mkv", 900_000_000, Some(50.0), Some(1080)),
        ];

        let groups = find_duplicates(&records, DuplicateMethod::Fuzzy, 64 * 1024, |_| {});
        assert_eq!(groups.len(), 2);
        assert!(groups[0].total_size() > groups[1].total_size());
    }

    #[test]
    fn potential_savings_is_all_but_largest() {
        let group = DuplicateGroup {
            files: vec![
                record("/m/a.mkv", 300, None, None),
                record("/m/b.mkv", 500, None, None),
                record("/m/c.mkv", 200, None, None),
            ],
            match_type: DuplicateMethod::Fuzzy,
            confidence: 1.0,
            content_hash: None,
        };
        assert_eq!(group.total_size(), 1000);
        assert_eq!(group.potential_savings(), 500);
    }

    #[test]
    fn progress_phases_are_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, vec![1u8; 1024]).unwrap();
        std::fs::write(&b, vec![1u8; 1024]).unwrap();

        let records = vec![
            record(a.to_str().unwrap(), 1024, None, None),
            record(b.to_str().unwrap(), 1024, None, None),
        ];

        let mut phases = Vec::new();
        find_duplicates(&records, DuplicateMethod::FullHash, 1024, |p| {
            phases.push(p.phase)
        });
        assert!(phases.contains(&DuplicatePhase::Analyzing));
        assert!(phases.contains(&DuplicatePhase::Hashing));
    }
}
