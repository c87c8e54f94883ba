//! Recursive discovery of scannable video files.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use vdx_core::paths::{is_bundle_name, is_hidden_name, is_scannable_file};
use vdx_core::{Error, Result};

fn keep_entry(entry: &DirEntry) -> bool {
    // The scan root itself is always kept, whatever its name.
    if entry.depth() == 0 {
        return true;
    }

    let Some(name) = entry.file_name().to_str() else {
        return false;
    };

    if is_hidden_name(name) {
        return false;
    }
    if entry.file_type().is_dir() && is_bundle_name(name) {
        return false;
    }
    true
}

/// Enumerate the folder recursively, skipping hidden entries and bundle
/// descendants, keeping regular files with a supported extension. The
/// result is ordered deterministically (by file name at every level).
pub fn discover_files(folder: &Path) -> Result<Vec<PathBuf>> {
    // Surface an unreadable root as an access failure before walking; the
    // walker itself downgrades per-entry errors to warnings.
    std::fs::read_dir(folder).map_err(|e| {
        tracing::warn!("Cannot enumerate {}: {e}", folder.display());
        Error::FolderAccessDenied {
            path: folder.to_path_buf(),
        }
    })?;

    let mut files = Vec::new();
    for entry in WalkDir::new(folder)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(keep_entry)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Error walking directory: {e}");
                continue;
            }
        };

        if entry.file_type().is_file() && is_scannable_file(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn finds_supported_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.mkv"));
        touch(&dir.path().join("season1/b.mp4"));
        touch(&dir.path().join("season1/notes.txt"));
        touch(&dir.path().join("season1/extras/c.M2TS"));

        let files = discover_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.mkv", "b.mp4", "c.M2TS"]);
    }

    #[test]
    fn skips_hidden_entries() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("visible.mkv"));
        touch(&dir.path().join(".hidden.mkv"));
        touch(&dir.path().join(".cache/nested.mkv"));

        let files = discover_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("visible.mkv"));
    }

    #[test]
    fn skips_bundle_descendants() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("keep.mkv"));
        touch(&dir.path().join("Library.photoslibrary/originals/skip.mov"));
        touch(&dir.path().join("Editor.app/Contents/skip.mp4"));

        let files = discover_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.mkv"));
    }

    #[test]
    fn empty_folder_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_folder_is_access_denied() {
        let err = discover_files(Path::new("/nonexistent/media-root")).unwrap_err();
        assert!(matches!(err, Error::FolderAccessDenied { .. }));
    }

    #[test]
    fn ordering_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("c.mkv"));
        touch(&dir.path().join("a.mkv"));
        touch(&dir.path().join("b.mkv"));

        let first = discover_files(dir.path()).unwrap();
        let second = discover_files(dir.path()).unwrap();
        assert_eq!(first, second);
        let names: Vec<_> = first
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.mkv", "b.mkv", "c.mkv"]);
    }
}
