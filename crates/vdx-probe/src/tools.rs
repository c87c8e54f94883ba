//! External tool detection.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the probe and
//! decoder binaries (ffprobe, ffmpeg) and provides lookup methods for the
//! rest of the workspace.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use vdx_core::config::ToolsConfig;

/// Known tool names that the registry manages.
const KNOWN_TOOLS: &[&str] = &["ffprobe", "ffmpeg"];

/// Conventional install locations checked before falling back to `PATH`.
const SYSTEM_DIRS: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin"];

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool locations.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, PathBuf>,
}

impl ToolRegistry {
    /// Discover tools, preferring config overrides, then an executable
    /// sitting next to our own binary, then conventional system locations,
    /// then `PATH`. Tools that are not found are omitted from the registry.
    pub fn discover(tools_config: &ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "ffprobe" => tools_config.ffprobe_path.as_deref(),
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                _ => None,
            };

            if let Some(path) = resolve_tool(name, custom_path) {
                tools.insert(name.to_string(), path);
            }
        }

        Self { tools }
    }

    /// Return the resolved path for the given tool, or a
    /// [`vdx_core::Error::Tool`] if it was not found during discovery.
    pub fn require(&self, name: &str) -> vdx_core::Result<&PathBuf> {
        self.tools.get(name).ok_or_else(|| vdx_core::Error::Tool {
            tool: name.to_string(),
            message: format!("{name} not found; is it installed and in PATH?"),
        })
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| {
                if let Some(path) = self.tools.get(name) {
                    ToolInfo {
                        name: name.to_string(),
                        available: true,
                        version: detect_version(path),
                        path: Some(path.clone()),
                    }
                } else {
                    ToolInfo {
                        name: name.to_string(),
                        available: false,
                        version: None,
                        path: None,
                    }
                }
            })
            .collect()
    }
}

/// Resolve one tool: override → bundled → system dirs → PATH.
fn resolve_tool(name: &str, custom_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = custom_path {
        if p.exists() {
            return Some(p.to_path_buf());
        }
        tracing::warn!(
            tool = name,
            path = %p.display(),
            "Configured tool path does not exist; falling back to discovery"
        );
    }

    // A binary shipped alongside our own executable wins over the system.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let bundled = dir.join(name);
            if bundled.is_file() {
                return Some(bundled);
            }
        }
    }

    for dir in SYSTEM_DIRS {
        let candidate = Path::new(dir).join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    which::which(name).ok()
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}
