//! The videodex catalog store: SQLite schema, migrations, and queries.
//!
//! # Modules
//!
//! - `migrations` - database schema migrations
//! - `pool` - connection pool management
//! - `models` - Rust models matching the database schema
//! - `queries` - query operations

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

pub use models::{NewVideo, ScanSession, SessionStatus, VideoRecord};
pub use pool::{get_conn, init_memory_pool, init_pool, DbPool, PooledConnection};
