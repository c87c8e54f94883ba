//! Probe and decode tooling for videodex.
//!
//! # Modules
//!
//! - `tools` - discovery of the ffprobe/ffmpeg binaries
//! - `types` - serde model of the ffprobe JSON document
//! - `runner` - the [`MediaProber`] trait and the ffprobe-backed runner
//! - `parser` - pure probe-document → [`vdx_core::VideoMetadata`] parsing
//! - `decode` - full-decode corruption detection

pub mod decode;
pub mod parser;
pub mod runner;
pub mod tools;
pub mod types;

pub use decode::{decode_check, CorruptionError, CorruptionKind, DecodeOutcome};
pub use parser::parse;
pub use runner::{FfprobeRunner, MediaProber, ProbeError};
pub use tools::{ToolInfo, ToolRegistry};
pub use types::ProbeDocument;
