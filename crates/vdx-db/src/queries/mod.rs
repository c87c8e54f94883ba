//! Database query operations, grouped by table.

pub mod sessions;
pub mod stats;
pub mod videos;
