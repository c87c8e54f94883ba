//! Unified error type for the videodex application.
//!
//! Per-file probe failures have their own typed error in `vdx-probe`; this
//! enum covers everything that can abort an operation outright.

use std::fmt;
use std::path::PathBuf;

/// Unified error type covering all failure modes in videodex.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "video", "session").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A schema migration failed; the store must not be used.
    #[error("Migration {version} failed: {message}")]
    Migration { version: usize, message: String },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffprobe, ffmpeg) could not be used.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The scan root could not be read.
    #[error("Folder access denied: {}", path.display())]
    FolderAccessDenied {
        /// The folder that could not be enumerated.
        path: PathBuf,
    },

    /// A scan session is already active in this process.
    #[error("A scan is already in progress")]
    ScanAlreadyInProgress,

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("video", 42);
        assert_eq!(err.to_string(), "video not found: 42");
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffprobe", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffprobe]: exit code 1");
    }

    #[test]
    fn database_display() {
        let err = Error::database("locked");
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn folder_access_display() {
        let err = Error::FolderAccessDenied {
            path: PathBuf::from("/srv/media"),
        };
        assert_eq!(err.to_string(), "Folder access denied: /srv/media");
    }
}
