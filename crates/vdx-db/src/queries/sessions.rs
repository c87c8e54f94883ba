//! Scan session query operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use vdx_core::{Error, Result};

use crate::models::{ScanSession, SessionStatus};

const SESSION_COLUMNS: &str = "id, folder_path, started_at, completed_at, total_files, \
     processed_files, status, last_checkpoint_at, pending_files";

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<ScanSession> {
    let pending_json: String = row.get(8)?;
    Ok(ScanSession {
        id: row.get(0)?,
        folder_path: row.get(1)?,
        started_at: parse_timestamp(&row.get::<_, String>(2)?),
        completed_at: row
            .get::<_, Option<String>>(3)?
            .map(|s| parse_timestamp(&s)),
        total_files: row.get::<_, i64>(4)? as u64,
        processed_files: row.get::<_, i64>(5)? as u64,
        status: row
            .get::<_, String>(6)?
            .parse()
            .unwrap_or(SessionStatus::Failed),
        last_checkpoint_at: row
            .get::<_, Option<String>>(7)?
            .map(|s| parse_timestamp(&s)),
        pending_files: serde_json::from_str(&pending_json).unwrap_or_default(),
    })
}

/// Create a new session in `in_progress` state.
pub fn create_session(
    conn: &Connection,
    folder_path: &str,
    total_files: u64,
    pending_files: &[String],
) -> Result<ScanSession> {
    let now = Utc::now();
    let pending_json =
        serde_json::to_string(pending_files).map_err(|e| Error::database(e.to_string()))?;

    conn.execute(
        "INSERT INTO scan_sessions (folder_path, started_at, total_files, processed_files,
                                    status, pending_files)
         VALUES (?, ?, ?, 0, ?, ?)",
        params![
            folder_path,
            now.to_rfc3339(),
            total_files as i64,
            SessionStatus::InProgress.as_str(),
            pending_json,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let id = conn.last_insert_rowid();
    Ok(ScanSession {
        id,
        folder_path: folder_path.to_string(),
        started_at: now,
        completed_at: None,
        total_files,
        processed_files: 0,
        status: SessionStatus::InProgress,
        last_checkpoint_at: None,
        pending_files: pending_files.to_vec(),
    })
}

/// Persist the current progress counters and pending list.
pub fn update_session_progress(
    conn: &Connection,
    id: i64,
    processed_files: u64,
    pending_files: &[String],
) -> Result<()> {
    let pending_json =
        serde_json::to_string(pending_files).map_err(|e| Error::database(e.to_string()))?;
    conn.execute(
        "UPDATE scan_sessions SET processed_files = ?, pending_files = ? WHERE id = ?",
        params![processed_files as i64, pending_json, id],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Transition a session's status. Terminal statuses also stamp
/// `completed_at`.
pub fn set_session_status(conn: &Connection, id: i64, status: SessionStatus) -> Result<()> {
    if status.is_terminal() {
        conn.execute(
            "UPDATE scan_sessions SET status = ?, completed_at = ? WHERE id = ?",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )
    } else {
        conn.execute(
            "UPDATE scan_sessions SET status = ? WHERE id = ?",
            params![status.as_str(), id],
        )
    }
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Record when the session's durable checkpoint was last rewritten.
pub fn touch_checkpoint(conn: &Connection, id: i64, at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE scan_sessions SET last_checkpoint_at = ? WHERE id = ?",
        params![at.to_rfc3339(), id],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Get a session by id.
pub fn get_session(conn: &Connection, id: i64) -> Result<Option<ScanSession>> {
    match conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM scan_sessions WHERE id = ?"),
        [id],
        row_to_session,
    ) {
        Ok(session) => Ok(Some(session)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all sessions, newest first.
pub fn list_sessions(conn: &Connection) -> Result<Vec<ScanSession>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM scan_sessions ORDER BY started_at DESC, id DESC"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], row_to_session)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// The most recently started session, if any.
pub fn latest_session(conn: &Connection) -> Result<Option<ScanSession>> {
    match conn.query_row(
        &format!(
            "SELECT {SESSION_COLUMNS} FROM scan_sessions ORDER BY started_at DESC, id DESC LIMIT 1"
        ),
        [],
        row_to_session,
    ) {
        Ok(session) => Ok(Some(session)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Delete a session. Video rows keep their data; their `scan_session_id`
/// cascades to NULL through the foreign key.
pub fn delete_session(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn
        .execute("DELETE FROM scan_sessions WHERE id = ?", [id])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewVideo;
    use crate::queries::videos;
    use vdx_core::VideoMetadata;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        crate::migrations::run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn create_and_get_round_trip() {
        let conn = test_conn();
        let pending = vec!["/media/a.mkv".to_string(), "/media/b.mkv".to_string()];
        let session = create_session(&conn, "/media", 2, &pending).unwrap();

        let stored = get_session(&conn, session.id).unwrap().unwrap();
        assert_eq!(stored.folder_path, "/media");
        assert_eq!(stored.total_files, 2);
        assert_eq!(stored.processed_files, 0);
        assert_eq!(stored.status, SessionStatus::InProgress);
        assert_eq!(stored.pending_files, pending);
        assert!(stored.completed_at.is_none());
    }

    #[test]
    fn progress_update_persists() {
        let conn = test_conn();
        let pending = vec!["/media/a.mkv".to_string(), "/media/b.mkv".to_string()];
        let session = create_session(&conn, "/media", 2, &pending).unwrap();

        update_session_progress(&conn, session.id, 1, &pending[1..]).unwrap();
        let stored = get_session(&conn, session.id).unwrap().unwrap();
        assert_eq!(stored.processed_files, 1);
        assert_eq!(stored.pending_files, vec!["/media/b.mkv".to_string()]);
    }

    #[test]
    fn terminal_status_sets_completed_at() {
        let conn = test_conn();
        let session = create_session(&conn, "/media", 0, &[]).unwrap();

        set_session_status(&conn, session.id, SessionStatus::Paused).unwrap();
        let stored = get_session(&conn, session.id).unwrap().unwrap();
        assert!(stored.completed_at.is_none());

        set_session_status(&conn, session.id, SessionStatus::Completed).unwrap();
        let stored = get_session(&conn, session.id).unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert!(stored.completed_at.is_some());
    }

    #[test]
    fn latest_returns_newest() {
        let conn = test_conn();
        create_session(&conn, "/media/one", 0, &[]).unwrap();
        let second = create_session(&conn, "/media/two", 0, &[]).unwrap();

        let latest = latest_session(&conn).unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[test]
    fn deleting_session_nulls_video_references() {
        let conn = test_conn();
        let session = create_session(&conn, "/media", 1, &[]).unwrap();

        let video = NewVideo {
            file_path: "/media/a.mkv".into(),
            file_name: "a.mkv".into(),
            file_size: 1,
            metadata: VideoMetadata::default(),
            scan_session_id: Some(session.id),
        };
        let video_id = videos::upsert_video(&conn, &video).unwrap();

        assert!(delete_session(&conn, session.id).unwrap());

        let stored = videos::get_video(&conn, video_id).unwrap().unwrap();
        assert_eq!(stored.scan_session_id, None);
    }
}
