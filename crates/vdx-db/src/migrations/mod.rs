//! Database schema migrations.
//!
//! Migrations are embedded in the binary and executed in order, each inside
//! its own transaction. Applied versions are recorded in the
//! `schema_migrations` table, so rerunning the migrator is a no-op.

use rusqlite::Connection;
use vdx_core::{Error, Result};

/// A single migration with its SQL content.
struct Migration {
    version: usize,
    name: &'static str,
    sql: &'static str,
}

/// All available migrations, in application order.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial",
        sql: include_str!("001_initial.sql"),
    },
    Migration {
        version: 2,
        name: "integrity",
        sql: include_str!("002_integrity.sql"),
    },
];

fn init_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;
    Ok(())
}

fn current_schema_version(conn: &Connection) -> rusqlite::Result<usize> {
    conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
        row.get::<_, Option<usize>>(0)
    })
    .map(|v| v.unwrap_or(0))
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute_batch(migration.sql)
        .map_err(|e| Error::Migration {
            version: migration.version,
            message: e.to_string(),
        })?;

    conn.execute(
        "INSERT INTO schema_migrations (version, name) VALUES (?, ?)",
        rusqlite::params![migration.version, migration.name],
    )
    .map_err(|e| Error::Migration {
        version: migration.version,
        message: e.to_string(),
    })?;

    Ok(())
}

/// Run all pending migrations. Returns the number applied.
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    init_migrations_table(conn).map_err(Error::database)?;

    let current = current_schema_version(conn).map_err(Error::database)?;

    let pending: Vec<_> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let mut applied = 0;
    for migration in pending {
        let tx = conn.unchecked_transaction().map_err(Error::database)?;

        apply_migration(&tx, migration)?;

        tx.commit().map_err(|e| Error::Migration {
            version: migration.version,
            message: e.to_string(),
        })?;

        applied += 1;
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applied migration"
        );
    }

    Ok(applied)
}

/// The current schema version, without applying anything.
pub fn current_version(conn: &Connection) -> Result<usize> {
    init_migrations_table(conn).map_err(Error::database)?;
    current_schema_version(conn).map_err(Error::database)
}

/// The latest available migration version.
pub fn latest_version() -> usize {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_once() {
        let conn = Connection::open_in_memory().unwrap();

        let applied = run_migrations(&conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len());
        assert_eq!(current_version(&conn).unwrap(), latest_version());

        // Second run is a no-op.
        let applied = run_migrations(&conn).unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn schema_tables_exist() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["videos", "scan_sessions", "schema_migrations"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "table {table} should exist");
        }
    }

    #[test]
    fn integrity_columns_added_by_v2() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        // Inserting into the v2 columns must succeed.
        conn.execute(
            "INSERT INTO videos (file_path, file_name, file_size, scanned_at, file_hash, is_corrupted)
             VALUES ('/a.mkv', 'a.mkv', 1, '2026-01-01T00:00:00Z', 'abc', 1)",
            [],
        )
        .unwrap();

        let hash: String = conn
            .query_row("SELECT file_hash FROM videos WHERE file_path = '/a.mkv'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(hash, "abc");
    }

    #[test]
    fn file_hash_index_exists() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name='idx_videos_file_hash'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
