//! Parallel integrity verification over catalog records.
//!
//! Each record gets a full decode pass through the decoder binary; results
//! are written back onto the video row. Worker parallelism is bounded by a
//! semaphore, independently of the scan engine's probe pool.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};

use vdx_core::{Error, Result};
use vdx_db::queries::videos;
use vdx_db::{DbPool, VideoRecord};
use vdx_probe::{decode_check, CorruptionError};

/// Outcome of verifying one record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IntegrityReport {
    pub video_id: i64,
    pub file_path: String,
    pub is_corrupted: bool,
    pub errors: Vec<CorruptionError>,
}

/// Per-file progress emitted as decode passes finish.
#[derive(Debug, Clone)]
pub struct IntegrityProgress {
    pub current: u64,
    pub total: u64,
    pub file_path: String,
    pub is_corrupted: bool,
}

/// Run a decode pass over every record, with at most `concurrency` passes
/// in flight. Results are persisted onto the catalog rows and returned.
pub async fn check_integrity(
    pool: &DbPool,
    ffmpeg: PathBuf,
    records: Vec<VideoRecord>,
    concurrency: usize,
    mut on_progress: impl FnMut(IntegrityProgress),
) -> Result<Vec<IntegrityReport>> {
    let total = records.len() as u64;
    if total == 0 {
        return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let (tx, mut rx) = mpsc::channel::<IntegrityReport>(16);

    for record in records {
        let semaphore = semaphore.clone();
        let tx = tx.clone();
        let ffmpeg = ffmpeg.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let path = PathBuf::from(&record.file_path);
            let decoder = ffmpeg.clone();
            let outcome = tokio::task::spawn_blocking(move || decode_check(&decoder, &path)).await;

            let report = match outcome {
                Ok(outcome) => IntegrityReport {
                    video_id: record.id,
                    file_path: record.file_path,
                    is_corrupted: outcome.is_corrupted(),
                    errors: outcome.errors,
                },
                Err(e) => IntegrityReport {
                    video_id: record.id,
                    file_path: record.file_path,
                    is_corrupted: true,
                    errors: vec![CorruptionError {
                        kind: vdx_probe::CorruptionKind::ProcessError,
                        message: format!("decode task panicked: {e}"),
                        timestamp: None,
                    }],
                },
            };

            let _ = tx.send(report).await;
        });
    }
    drop(tx);

    let mut reports = Vec::with_capacity(total as usize);
    let mut completed = 0u64;

    while let Some(report) = rx.recv().await {
        completed += 1;
        on_progress(IntegrityProgress {
            current: completed,
            total,
            file_path: report.file_path.clone(),
            is_corrupted: report.is_corrupted,
        });

        persist_report(pool, &report).await?;
        reports.push(report);
    }

    Ok(reports)
}

/// Write one verification result onto its catalog row.
async fn persist_report(pool: &DbPool, report: &IntegrityReport) -> Result<()> {
    let details = if report.errors.is_empty() {
        None
    } else {
        Some(
            serde_json::to_string(&report.errors)
                .map_err(|e| Error::Internal(format!("corruption details serialize: {e}")))?,
        )
    };

    let pool = pool.clone();
    let video_id = report.video_id;
    let is_corrupted = report.is_corrupted;
    tokio::task::spawn_blocking(move || {
        let conn = vdx_db::get_conn(&pool)?;
        videos::update_integrity(&conn, video_id, is_corrupted, details.as_deref())
    })
    .await
    .map_err(|e| Error::Internal(format!("database task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdx_core::VideoMetadata;
    use vdx_db::NewVideo;

    #[cfg(unix)]
    fn fake_ffmpeg(body: &str) -> (tempfile::TempDir, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (dir, script)
    }

    fn insert_record(pool: &DbPool, path: &str) -> VideoRecord {
        let conn = vdx_db::get_conn(pool).unwrap();
        let id = videos::upsert_video(
            &conn,
            &NewVideo {
                file_path: path.into(),
                file_name: path.rsplit('/').next().unwrap().into(),
                file_size: 1,
                metadata: VideoMetadata::default(),
                scan_session_id: None,
            },
        )
        .unwrap();
        videos::get_video(&conn, id).unwrap().unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn corruption_is_persisted() {
        // Only paths containing "bad" produce decoder errors. The input
        // path arrives as $4 (-v error -i <path> -f null -).
        let (_dir, ffmpeg) = fake_ffmpeg(
            r#"case "$4" in *bad*) echo 'Invalid data found when processing input' >&2 ;; esac"#,
        );

        let pool = vdx_db::init_memory_pool().unwrap();
        let good = insert_record(&pool, "/m/good.mkv");
        let bad = insert_record(&pool, "/m/bad.mkv");

        let mut seen = 0u64;
        let reports = check_integrity(
            &pool,
            ffmpeg,
            vec![good.clone(), bad.clone()],
            2,
            |progress| {
                seen += 1;
                assert_eq!(progress.total, 2);
            },
        )
        .await
        .unwrap();

        assert_eq!(seen, 2);
        assert_eq!(reports.len(), 2);

        let conn = vdx_db::get_conn(&pool).unwrap();
        let good_row = videos::get_video(&conn, good.id).unwrap().unwrap();
        assert!(!good_row.is_corrupted);
        assert_eq!(good_row.corruption_details, None);

        let bad_row = videos::get_video(&conn, bad.id).unwrap().unwrap();
        assert!(bad_row.is_corrupted);
        let details = bad_row.corruption_details.unwrap();
        assert!(details.contains("invalid_data"));
    }

    #[tokio::test]
    async fn missing_decoder_reports_process_error() {
        let pool = vdx_db::init_memory_pool().unwrap();
        let record = insert_record(&pool, "/m/a.mkv");

        let reports = check_integrity(
            &pool,
            PathBuf::from("/nonexistent/ffmpeg-xyz"),
            vec![record],
            4,
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_corrupted);
        assert_eq!(
            reports[0].errors[0].kind,
            vdx_probe::CorruptionKind::ProcessError
        );
    }

    #[tokio::test]
    async fn empty_input_is_empty_output() {
        let pool = vdx_db::init_memory_pool().unwrap();
        let reports = check_integrity(&pool, PathBuf::from("ffmpeg"), vec![], 4, |_| {})
            .await
            .unwrap();
        assert!(reports.is_empty());
    }
}
