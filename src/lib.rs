//! videodex: catalog a directory tree of video files into a queryable
//! local library.
//!
//! The library surface exists for the CLI binary and the integration
//! tests; the crates under `crates/` hold the domain layers (core types,
//! probe tooling, catalog store).

pub mod duplicates;
pub mod engine;
pub mod integrity;
