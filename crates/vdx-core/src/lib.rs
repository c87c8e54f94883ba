//! Shared domain types for videodex.
//!
//! # Modules
//!
//! - `config` - application configuration with serde-JSON loading
//! - `error` - the unified [`Error`] type and [`Result`] alias
//! - `events` - scan event streams (progress, log, completion)
//! - `media` - codec/HDR/container enums and [`VideoMetadata`]
//! - `paths` - discovery predicates and persistent-state locations

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod paths;

pub use error::{Error, Result};
pub use media::{
    AudioCodec, ContainerFormat, HdrFormat, ResolutionCategory, VideoCodec, VideoMetadata,
};
