//! Video catalog query operations.
//!
//! All writes funnel through the upsert so `file_path` stays unique: a
//! re-scan of the same path replaces the row in place, keeping its id.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use vdx_core::{
    AudioCodec, ContainerFormat, Error, HdrFormat, ResolutionCategory, Result, VideoCodec,
};

use crate::models::{NewVideo, VideoRecord};

const VIDEO_COLUMNS: &str = "id, file_path, file_name, file_size, duration_seconds, video_codec, \
     width, height, frame_rate, bit_rate, bit_depth, hdr_format, audio_codec, audio_channels, \
     is_atmos, is_dtsx, container_format, scan_session_id, scanned_at, file_hash, is_corrupted, \
     corruption_details";

fn row_to_video(row: &Row<'_>) -> rusqlite::Result<VideoRecord> {
    Ok(VideoRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        file_name: row.get(2)?,
        file_size: row.get::<_, i64>(3)? as u64,
        duration_seconds: row.get(4)?,
        video_codec: row
            .get::<_, String>(5)?
            .parse()
            .unwrap_or(VideoCodec::Unknown),
        width: row.get(6)?,
        height: row.get(7)?,
        frame_rate: row.get(8)?,
        bit_rate: row.get::<_, Option<i64>>(9)?.map(|v| v as u64),
        bit_depth: row.get(10)?,
        hdr_format: row.get::<_, String>(11)?.parse().unwrap_or(HdrFormat::Sdr),
        audio_codec: row
            .get::<_, String>(12)?
            .parse()
            .unwrap_or(AudioCodec::Unknown),
        audio_channels: row.get(13)?,
        is_atmos: row.get::<_, i64>(14)? != 0,
        is_dtsx: row.get::<_, i64>(15)? != 0,
        container_format: row
            .get::<_, String>(16)?
            .parse()
            .unwrap_or(ContainerFormat::Unknown),
        scan_session_id: row.get(17)?,
        scanned_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(18)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        file_hash: row.get(19)?,
        is_corrupted: row.get::<_, i64>(20)? != 0,
        corruption_details: row.get(21)?,
    })
}

/// Insert or replace one video record, keyed on `file_path`. A replace
/// resets the integrity columns, since the content may have changed.
/// Returns the row id.
pub fn upsert_video(conn: &Connection, video: &NewVideo) -> Result<i64> {
    let now = Utc::now();
    let m = &video.metadata;

    conn.execute(
        "INSERT INTO videos (file_path, file_name, file_size, duration_seconds, video_codec,
                             width, height, frame_rate, bit_rate, bit_depth, hdr_format,
                             audio_codec, audio_channels, is_atmos, is_dtsx, container_format,
                             scan_session_id, scanned_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
         ON CONFLICT(file_path) DO UPDATE SET
             file_name = excluded.file_name,
             file_size = excluded.file_size,
             duration_seconds = excluded.duration_seconds,
             video_codec = excluded.video_codec,
             width = excluded.width,
             height = excluded.height,
             frame_rate = excluded.frame_rate,
             bit_rate = excluded.bit_rate,
             bit_depth = excluded.bit_depth,
             hdr_format = excluded.hdr_format,
             audio_codec = excluded.audio_codec,
             audio_channels = excluded.audio_channels,
             is_atmos = excluded.is_atmos,
             is_dtsx = excluded.is_dtsx,
             container_format = excluded.container_format,
             scan_session_id = excluded.scan_session_id,
             scanned_at = excluded.scanned_at,
             file_hash = NULL,
             is_corrupted = 0,
             corruption_details = NULL",
        params![
            video.file_path,
            video.file_name,
            video.file_size as i64,
            m.duration_seconds,
            m.video_codec.as_str(),
            m.width,
            m.height,
            m.frame_rate,
            m.bit_rate.map(|v| v as i64),
            m.bit_depth,
            m.hdr_format.as_str(),
            m.audio_codec.as_str(),
            m.audio_channels,
            m.is_atmos,
            m.is_dtsx,
            m.container_format.as_str(),
            video.scan_session_id,
            now.to_rfc3339(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    conn.query_row(
        "SELECT id FROM videos WHERE file_path = ?",
        [&video.file_path],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Upsert a batch of records in a single transaction.
pub fn insert_batch(conn: &Connection, videos: &[NewVideo]) -> Result<()> {
    if videos.is_empty() {
        return Ok(());
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    for video in videos {
        upsert_video(&tx, video)?;
    }
    tx.commit().map_err(|e| Error::database(e.to_string()))
}

/// Get a video by id.
pub fn get_video(conn: &Connection, id: i64) -> Result<Option<VideoRecord>> {
    match conn.query_row(
        &format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?"),
        [id],
        row_to_video,
    ) {
        Ok(video) => Ok(Some(video)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get a video by absolute path.
pub fn get_video_by_path(conn: &Connection, file_path: &str) -> Result<Option<VideoRecord>> {
    match conn.query_row(
        &format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE file_path = ?"),
        [file_path],
        row_to_video,
    ) {
        Ok(video) => Ok(Some(video)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Delete a video by id. Returns whether a row was removed.
pub fn delete_video(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn
        .execute("DELETE FROM videos WHERE id = ?", [id])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(changed > 0)
}

/// Delete every video belonging to a session. Returns the number removed.
pub fn delete_videos_for_session(conn: &Connection, session_id: i64) -> Result<usize> {
    conn.execute("DELETE FROM videos WHERE scan_session_id = ?", [session_id])
        .map_err(|e| Error::database(e.to_string()))
}

/// Delete the whole catalog. Returns the number removed.
pub fn delete_all_videos(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM videos", [])
        .map_err(|e| Error::database(e.to_string()))
}

/// Store an integrity verification result.
pub fn update_integrity(
    conn: &Connection,
    id: i64,
    is_corrupted: bool,
    corruption_details: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE videos SET is_corrupted = ?, corruption_details = ? WHERE id = ?",
        params![is_corrupted, corruption_details, id],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Store a full-content hash.
pub fn update_file_hash(conn: &Connection, id: i64, file_hash: &str) -> Result<()> {
    conn.execute(
        "UPDATE videos SET file_hash = ? WHERE id = ?",
        params![file_hash, id],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Total number of catalogued videos.
pub fn count_videos(conn: &Connection) -> Result<u64> {
    conn.query_row("SELECT COUNT(*) FROM videos", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|v| v as u64)
    .map_err(|e| Error::database(e.to_string()))
}

// ---------------------------------------------------------------------------
// Filtered fetch
// ---------------------------------------------------------------------------

/// Sortable columns of the query surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    FileName,
    FileSize,
    Duration,
    Resolution,
    VideoCodec,
    HdrFormat,
    AudioCodec,
    BitRate,
    Container,
}

impl SortColumn {
    fn sql(&self) -> &'static str {
        match self {
            Self::FileName => "file_name COLLATE NOCASE",
            Self::FileSize => "file_size",
            Self::Duration => "duration_seconds",
            Self::Resolution => "height",
            Self::VideoCodec => "video_codec",
            Self::HdrFormat => "hdr_format",
            Self::AudioCodec => "audio_codec",
            Self::BitRate => "bit_rate",
            Self::Container => "container_format",
        }
    }
}

/// Composable filter set for [`fetch_filtered`]. Every filter is optional;
/// present filters combine with AND semantics, except resolution bands and
/// the immersive-audio flag which are OR'd internally.
#[derive(Debug, Clone)]
pub struct VideoFilter {
    /// Case-insensitive substring match on `file_name`.
    pub search_text: Option<String>,
    pub video_codecs: Vec<VideoCodec>,
    pub hdr_formats: Vec<HdrFormat>,
    pub audio_codecs: Vec<AudioCodec>,
    pub containers: Vec<ContainerFormat>,
    pub resolution_categories: Vec<ResolutionCategory>,
    pub has_atmos: Option<bool>,
    pub has_dtsx: Option<bool>,
    /// Atmos OR DTS:X.
    pub immersive_only: bool,
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub sort: SortColumn,
    pub sort_ascending: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Default for VideoFilter {
    fn default() -> Self {
        Self {
            search_text: None,
            video_codecs: Vec::new(),
            hdr_formats: Vec::new(),
            audio_codecs: Vec::new(),
            containers: Vec::new(),
            resolution_categories: Vec::new(),
            has_atmos: None,
            has_dtsx: None,
            immersive_only: false,
            min_duration: None,
            max_duration: None,
            min_size: None,
            max_size: None,
            sort: SortColumn::FileName,
            sort_ascending: true,
            limit: None,
            offset: None,
        }
    }
}

fn in_clause<T, F>(column: &str, items: &[T], to_value: F, clauses: &mut Vec<String>, params: &mut Vec<Value>)
where
    F: Fn(&T) -> Value,
{
    if items.is_empty() {
        return;
    }
    let placeholders = vec!["?"; items.len()].join(", ");
    clauses.push(format!("{column} IN ({placeholders})"));
    params.extend(items.iter().map(to_value));
}

/// Fetch records matching the filter, sorted and paginated.
pub fn fetch_filtered(conn: &Connection, filter: &VideoFilter) -> Result<Vec<VideoRecord>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(ref text) = filter.search_text {
        if !text.is_empty() {
            clauses.push("LOWER(file_name) LIKE LOWER(?)".into());
            params.push(Value::Text(format!("%{text}%")));
        }
    }

    in_clause(
        "video_codec",
        &filter.video_codecs,
        |c| Value::Text(c.as_str().into()),
        &mut clauses,
        &mut params,
    );
    in_clause(
        "hdr_format",
        &filter.hdr_formats,
        |c| Value::Text(c.as_str().into()),
        &mut clauses,
        &mut params,
    );
    in_clause(
        "audio_codec",
        &filter.audio_codecs,
        |c| Value::Text(c.as_str().into()),
        &mut clauses,
        &mut params,
    );
    in_clause(
        "container_format",
        &filter.containers,
        |c| Value::Text(c.as_str().into()),
        &mut clauses,
        &mut params,
    );

    // Resolution bands OR together, then AND with everything else.
    if !filter.resolution_categories.is_empty() {
        let mut band_clauses = Vec::new();
        for band in &filter.resolution_categories {
            let (lower, upper) = band.height_range();
            match upper {
                Some(upper) => {
                    band_clauses.push("(height >= ? AND height < ?)".to_string());
                    params.push(Value::Integer(lower as i64));
                    params.push(Value::Integer(upper as i64));
                }
                None => {
                    band_clauses.push("height >= ?".to_string());
                    params.push(Value::Integer(lower as i64));
                }
            }
        }
        clauses.push(format!("({})", band_clauses.join(" OR ")));
    }

    if let Some(atmos) = filter.has_atmos {
        clauses.push("is_atmos = ?".into());
        params.push(Value::Integer(atmos as i64));
    }
    if let Some(dtsx) = filter.has_dtsx {
        clauses.push("is_dtsx = ?".into());
        params.push(Value::Integer(dtsx as i64));
    }
    if filter.immersive_only {
        clauses.push("(is_atmos = 1 OR is_dtsx = 1)".into());
    }

    if let Some(min) = filter.min_duration {
        clauses.push("duration_seconds >= ?".into());
        params.push(Value::Real(min));
    }
    if let Some(max) = filter.max_duration {
        clauses.push("duration_seconds <= ?".into());
        params.push(Value::Real(max));
    }
    if let Some(min) = filter.min_size {
        clauses.push("file_size >= ?".into());
        params.push(Value::Integer(min as i64));
    }
    if let Some(max) = filter.max_size {
        clauses.push("file_size <= ?".into());
        params.push(Value::Integer(max as i64));
    }

    let mut sql = format!("SELECT {VIDEO_COLUMNS} FROM videos");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    sql.push_str(" ORDER BY ");
    sql.push_str(filter.sort.sql());
    sql.push_str(if filter.sort_ascending { " ASC" } else { " DESC" });
    // Stable tie-break so pagination never repeats rows.
    sql.push_str(", id ASC");

    match (filter.limit, filter.offset) {
        (Some(limit), Some(offset)) => {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(limit as i64));
            params.push(Value::Integer(offset as i64));
        }
        (Some(limit), None) => {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }
        (None, Some(offset)) => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            params.push(Value::Integer(offset as i64));
        }
        (None, None) => {}
    }

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(params_from_iter(params), row_to_video)
        .map_err(|e| Error::database(e.to_string()))?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}
