//! Aggregate statistics over the catalog.
//!
//! Everything runs as grouped aggregate queries; no row streaming.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use vdx_core::{Error, ResolutionCategory, Result};

/// One (bucket, count) pair of a grouped aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCount {
    pub key: String,
    pub count: u64,
}

/// Catalog-wide totals and per-dimension breakdowns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_files: u64,
    pub total_size: u64,
    pub total_duration_seconds: f64,
    pub by_video_codec: Vec<BucketCount>,
    pub by_hdr_format: Vec<BucketCount>,
    pub by_audio_codec: Vec<BucketCount>,
    pub by_container: Vec<BucketCount>,
    pub by_resolution: Vec<BucketCount>,
    pub atmos_count: u64,
    pub dtsx_count: u64,
    pub corrupted_count: u64,
}

fn group_counts(conn: &Connection, column: &str) -> Result<Vec<BucketCount>> {
    let sql =
        format!("SELECT {column}, COUNT(*) FROM videos GROUP BY {column} ORDER BY COUNT(*) DESC");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(BucketCount {
                key: row.get(0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// SQL CASE expression mapping `height` to its band name.
fn resolution_case_expr() -> String {
    let mut expr = String::from("CASE ");
    // Highest band first so each WHEN is a simple lower-bound test.
    for band in ResolutionCategory::ALL.iter().rev() {
        let (lower, _) = band.height_range();
        expr.push_str(&format!("WHEN height >= {lower} THEN '{band}' "));
    }
    expr.push_str("END");
    expr
}

fn resolution_counts(conn: &Connection) -> Result<Vec<BucketCount>> {
    let case = resolution_case_expr();
    let sql = format!(
        "SELECT {case} AS band, COUNT(*) FROM videos \
         WHERE height IS NOT NULL GROUP BY band ORDER BY COUNT(*) DESC"
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(BucketCount {
                key: row.get(0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Compute catalog statistics.
pub fn fetch_statistics(conn: &Connection) -> Result<Statistics> {
    let (total_files, total_size, total_duration_seconds, atmos_count, dtsx_count, corrupted_count) =
        conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(file_size), 0),
                    COALESCE(SUM(duration_seconds), 0.0),
                    COALESCE(SUM(is_atmos), 0),
                    COALESCE(SUM(is_dtsx), 0),
                    COALESCE(SUM(is_corrupted), 0)
             FROM videos",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, i64>(1)? as u64,
                    row.get::<_, f64>(2)?,
                    row.get::<_, i64>(3)? as u64,
                    row.get::<_, i64>(4)? as u64,
                    row.get::<_, i64>(5)? as u64,
                ))
            },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(Statistics {
        total_files,
        total_size,
        total_duration_seconds,
        by_video_codec: group_counts(conn, "video_codec")?,
        by_hdr_format: group_counts(conn, "hdr_format")?,
        by_audio_codec: group_counts(conn, "audio_codec")?,
        by_container: group_counts(conn, "container_format")?,
        by_resolution: resolution_counts(conn)?,
        atmos_count,
        dtsx_count,
        corrupted_count,
    })
}
