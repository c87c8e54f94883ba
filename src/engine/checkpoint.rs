//! Durable scan checkpoints and crash recovery.
//!
//! The checkpoint is a single JSON file outside the database, rewritten
//! atomically (write-temp-then-rename) so a crash can never leave a torn
//! file. It carries everything needed to resume an interrupted scan: the
//! session id, counters, and the untouched pending paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use vdx_core::config::RecoveryConfig;
use vdx_core::Result;
use vdx_db::queries::sessions;
use vdx_db::{DbPool, SessionStatus};

/// Serialized scan state, sufficient to resume after a crash or restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: i64,
    pub folder_path: String,
    pub total_files: u64,
    pub processed_files: u64,
    pub pending_file_paths: Vec<String>,
    pub saved_at: DateTime<Utc>,
}

/// Everything the client needs to decide whether to resume a crashed scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryInfo {
    pub checkpoint: Checkpoint,
    pub remaining_file_count: u64,
    pub folder_path: String,
    pub progress_percentage: f64,
}

/// Owns the checkpoint file location and its atomic rewrite protocol.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Atomically rewrite the checkpoint file.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| vdx_core::Error::Internal(format!("checkpoint serialize: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load the checkpoint, if one exists. An unreadable or corrupt file is
    /// treated as absent.
    pub fn load(&self) -> Option<Checkpoint> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read checkpoint {}: {e}", self.path.display());
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                tracing::warn!("Corrupt checkpoint {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Remove the checkpoint file. Missing files are fine.
    pub fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Inspect a leftover checkpoint at startup.
///
/// Returns recovery info when the checkpoint is fresh, its folder still
/// resolves, and at least one pending file still exists on disk. Stale or
/// invalid checkpoints are pruned and their sessions marked failed.
pub fn check_for_recovery(
    store: &CheckpointStore,
    pool: &DbPool,
    recovery: &RecoveryConfig,
) -> Result<Option<RecoveryInfo>> {
    let Some(checkpoint) = store.load() else {
        return Ok(None);
    };

    let age = Utc::now().signed_duration_since(checkpoint.saved_at);
    if age > recovery.stale_age() {
        tracing::warn!(
            session_id = checkpoint.session_id,
            "Pruning stale checkpoint ({} hours old)",
            age.num_hours()
        );
        discard_checkpoint(store, pool, &checkpoint)?;
        return Ok(None);
    }

    let folder_resolves = Path::new(&checkpoint.folder_path).is_dir();
    let any_pending_exists = checkpoint
        .pending_file_paths
        .iter()
        .any(|p| Path::new(p).exists());

    if !folder_resolves || !any_pending_exists {
        tracing::warn!(
            session_id = checkpoint.session_id,
            folder = %checkpoint.folder_path,
            "Checkpoint no longer matches the filesystem; discarding"
        );
        discard_checkpoint(store, pool, &checkpoint)?;
        return Ok(None);
    }

    let progress_percentage = if checkpoint.total_files == 0 {
        0.0
    } else {
        checkpoint.processed_files as f64 / checkpoint.total_files as f64 * 100.0
    };

    Ok(Some(RecoveryInfo {
        remaining_file_count: checkpoint.pending_file_paths.len() as u64,
        folder_path: checkpoint.folder_path.clone(),
        progress_percentage,
        checkpoint,
    }))
}

/// Delete a checkpoint the user dismissed (or that proved invalid) and mark
/// its session failed.
pub fn discard_checkpoint(
    store: &CheckpointStore,
    pool: &DbPool,
    checkpoint: &Checkpoint,
) -> Result<()> {
    store.delete()?;

    let conn = vdx_db::get_conn(pool)?;
    if let Err(e) = sessions::set_session_status(&conn, checkpoint.session_id, SessionStatus::Failed)
    {
        tracing::warn!(
            session_id = checkpoint.session_id,
            "Failed to mark session failed: {e}"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_checkpoint(pending: Vec<String>) -> Checkpoint {
        Checkpoint {
            session_id: 1,
            folder_path: "/media".into(),
            total_files: 100,
            processed_files: 40,
            pending_file_paths: pending,
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("scan_checkpoint.json"));

        assert!(store.load().is_none());

        let checkpoint = sample_checkpoint(vec!["/media/a.mkv".into()]);
        store.save(&checkpoint).unwrap();
        assert!(store.exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.session_id, 1);
        assert_eq!(loaded.processed_files, 40);
        assert_eq!(loaded.pending_file_paths, vec!["/media/a.mkv".to_string()]);
    }

    #[test]
    fn save_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("scan_checkpoint.json"));

        store.save(&sample_checkpoint(vec![])).unwrap();
        let mut second = sample_checkpoint(vec![]);
        second.processed_files = 90;
        store.save(&second).unwrap();

        assert_eq!(store.load().unwrap().processed_files, 90);
        // No temp file left behind.
        assert!(!dir.path().join("scan_checkpoint.json.tmp").exists());
    }

    #[test]
    fn corrupt_checkpoint_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_checkpoint.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = CheckpointStore::new(path);
        assert!(store.load().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("scan_checkpoint.json"));
        store.delete().unwrap();
        store.save(&sample_checkpoint(vec![])).unwrap();
        store.delete().unwrap();
        store.delete().unwrap();
        assert!(!store.exists());
    }

    #[test]
    fn recovery_requires_existing_pending_file() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir(&media).unwrap();
        let existing = media.join("a.mkv");
        std::fs::write(&existing, b"data").unwrap();

        let pool = vdx_db::init_memory_pool().unwrap();
        let conn = vdx_db::get_conn(&pool).unwrap();
        let session = sessions::create_session(&conn, media.to_str().unwrap(), 2, &[]).unwrap();
        drop(conn);

        let store = CheckpointStore::new(dir.path().join("scan_checkpoint.json"));
        let mut checkpoint = sample_checkpoint(vec![existing.to_string_lossy().into_owned()]);
        checkpoint.session_id = session.id;
        checkpoint.folder_path = media.to_string_lossy().into_owned();
        store.save(&checkpoint).unwrap();

        let info = check_for_recovery(&store, &pool, &Default::default())
            .unwrap()
            .unwrap();
        assert_eq!(info.remaining_file_count, 1);
        assert!((info.progress_percentage - 40.0).abs() < 1e-9);
    }

    #[test]
    fn recovery_prunes_when_folder_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let pool = vdx_db::init_memory_pool().unwrap();
        let conn = vdx_db::get_conn(&pool).unwrap();
        let session = sessions::create_session(&conn, "/gone", 2, &[]).unwrap();
        drop(conn);

        let store = CheckpointStore::new(dir.path().join("scan_checkpoint.json"));
        let mut checkpoint = sample_checkpoint(vec!["/gone/a.mkv".into()]);
        checkpoint.session_id = session.id;
        checkpoint.folder_path = "/gone".into();
        store.save(&checkpoint).unwrap();

        let info = check_for_recovery(&store, &pool, &Default::default()).unwrap();
        assert!(info.is_none());
        assert!(!store.exists());

        let conn = vdx_db::get_conn(&pool).unwrap();
        let session = sessions::get_session(&conn, session.id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.completed_at.is_some());
    }

    #[test]
    fn recovery_prunes_stale_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir(&media).unwrap();
        std::fs::write(media.join("a.mkv"), b"data").unwrap();

        let pool = vdx_db::init_memory_pool().unwrap();
        let conn = vdx_db::get_conn(&pool).unwrap();
        let session = sessions::create_session(&conn, media.to_str().unwrap(), 2, &[]).unwrap();
        drop(conn);

        let store = CheckpointStore::new(dir.path().join("scan_checkpoint.json"));
        let mut checkpoint =
            sample_checkpoint(vec![media.join("a.mkv").to_string_lossy().into_owned()]);
        checkpoint.session_id = session.id;
        checkpoint.folder_path = media.to_string_lossy().into_owned();
        checkpoint.saved_at = Utc::now() - chrono::Duration::hours(48);
        store.save(&checkpoint).unwrap();

        let info = check_for_recovery(&store, &pool, &Default::default()).unwrap();
        assert!(info.is_none());
        assert!(!store.exists());
    }
}
