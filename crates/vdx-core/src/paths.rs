//! Discovery predicates and persistent-state locations.
//!
//! Scan discovery keeps regular files whose extension is in
//! [`SCAN_EXTENSIONS`]; the database and checkpoint live under the per-user
//! application-data directory.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// File extensions considered for cataloguing during discovery.
pub const SCAN_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "mov", "avi", "wmv", "webm", "flv", "m4v", "ts", "mts", "m2ts", "vob", "mpg",
    "mpeg", "m2v", "3gp", "ogv", "divx", "rm", "rmvb", "asf",
];

/// Directory extensions treated as opaque bundles; their descendants are
/// never scanned.
const BUNDLE_EXTENSIONS: &[&str] = &[
    "app",
    "bundle",
    "framework",
    "fcpbundle",
    "photoslibrary",
    "imovielibrary",
    "tvlibrary",
];

/// Check whether a path has a supported video extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use vdx_core::paths::is_scannable_file;
///
/// assert!(is_scannable_file(Path::new("movie.mkv")));
/// assert!(is_scannable_file(Path::new("/path/to/video.M2TS")));
/// assert!(!is_scannable_file(Path::new("subtitle.srt")));
/// ```
pub fn is_scannable_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SCAN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Check whether a directory entry name denotes a hidden entry.
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Check whether a directory name denotes an opaque bundle.
pub fn is_bundle_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| BUNDLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Locations of the application's persistent state.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Name of the subdirectory under the platform data directory.
    const APP_DIR: &'static str = "VideoAnalyzer";

    /// Resolve the per-user application-data directory, creating it if
    /// missing.
    pub fn resolve() -> Result<Self> {
        let base = directories::BaseDirs::new()
            .ok_or_else(|| Error::Internal("no home directory available".into()))?;
        Self::at(base.data_dir().join(Self::APP_DIR))
    }

    /// Use an explicit directory instead of the platform default.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding all persistent state.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the catalog database. WAL files live alongside.
    pub fn database_path(&self) -> PathBuf {
        self.root.join("video_analyzer.sqlite")
    }

    /// Location of the durable scan checkpoint.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.root.join("scan_checkpoint.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scannable_extensions() {
        assert!(is_scannable_file(Path::new("movie.mkv")));
        assert!(is_scannable_file(Path::new("movie.MKV")));
        assert!(is_scannable_file(Path::new("clip.rmvb")));
        assert!(is_scannable_file(Path::new("tape.m2v")));
        assert!(!is_scannable_file(Path::new("notes.txt")));
        assert!(!is_scannable_file(Path::new("no_extension")));
    }

    #[test]
    fn hidden_and_bundle_names() {
        assert!(is_hidden_name(".DS_Store"));
        assert!(is_hidden_name(".cache"));
        assert!(!is_hidden_name("Movies"));

        assert!(is_bundle_name("Final Cut.fcpbundle"));
        assert!(is_bundle_name("Photos.photoslibrary"));
        assert!(is_bundle_name("Tool.app"));
        assert!(!is_bundle_name("Season.1"));
        assert!(!is_bundle_name("Movies"));
    }

    #[test]
    fn data_paths_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::at(dir.path().join("VideoAnalyzer")).unwrap();
        assert!(paths.root().is_dir());
        assert_eq!(
            paths.database_path().file_name().unwrap(),
            "video_analyzer.sqlite"
        );
        assert_eq!(
            paths.checkpoint_path().file_name().unwrap(),
            "scan_checkpoint.json"
        );
    }
}
