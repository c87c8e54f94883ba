//! The probe runner: spawns the external probe binary with a fixed argument
//! profile, bounds its runtime, and returns a parsed [`ProbeDocument`].
//!
//! The runner blocks while waiting on the subprocess; callers on an async
//! runtime must invoke it through `spawn_blocking`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::types::ProbeDocument;

/// Cap on the bytes ffprobe reads for format detection.
const PROBE_SIZE_BYTES: &str = "5000000";

/// Cap on the media duration ffprobe analyzes, in microseconds.
const ANALYZE_DURATION_US: &str = "5000000";

/// Grace period between SIGTERM and SIGKILL after a timeout.
const KILL_GRACE: Duration = Duration::from_millis(100);

/// How much of stderr to keep on a non-zero exit.
const STDERR_TAIL_BYTES: usize = 512;

/// A per-file probe failure. All variants are non-fatal to a scan.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    /// The probe binary could not be found.
    #[error("probe binary not found")]
    NotFound,

    /// The probe process could not be started.
    #[error("failed to start probe: {0}")]
    ProcessStartFailed(String),

    /// The probe exceeded its wall-clock limit and was killed.
    #[error("probe timed out on {}", .0.display())]
    Timeout(PathBuf),

    /// The probe exited with a non-zero status.
    #[error("probe exited with status {code}: {stderr_tail}")]
    NonZeroExit { code: i32, stderr_tail: String },

    /// The probe's stdout was not valid JSON.
    #[error("failed to parse probe output: {0}")]
    ParseError(String),
}

/// A media prober capable of extracting a raw metadata document from a file.
///
/// Implementations must be safe to share across threads (`Send + Sync`).
pub trait MediaProber: Send + Sync {
    /// Human-readable name identifying this prober implementation.
    fn name(&self) -> &'static str;

    /// Probe the file at `path` and return its raw metadata document.
    fn probe(&self, path: &Path) -> Result<ProbeDocument, ProbeError>;
}

/// Probe implementation backed by the ffprobe binary.
#[derive(Debug, Clone)]
pub struct FfprobeRunner {
    binary: PathBuf,
    timeout: Duration,
}

impl FfprobeRunner {
    pub fn new(binary: PathBuf, timeout: Duration) -> Self {
        Self { binary, timeout }
    }
}

impl MediaProber for FfprobeRunner {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn probe(&self, path: &Path) -> Result<ProbeDocument, ProbeError> {
        let mut child = Command::new(&self.binary)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-probesize",
                PROBE_SIZE_BYTES,
                "-analyzeduration",
                ANALYZE_DURATION_US,
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProbeError::NotFound
                } else {
                    ProbeError::ProcessStartFailed(e.to_string())
                }
            })?;

        // Drain both pipes on their own threads so a large JSON document
        // cannot deadlock against the bounded pipe buffer while we wait.
        let stdout_handle = child.stdout.take().map(spawn_pipe_reader);
        let stderr_handle = child.stderr.take().map(spawn_pipe_reader);

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                terminate(&mut child);
                join_reader(stdout_handle);
                join_reader(stderr_handle);
                return Err(ProbeError::Timeout(path.to_path_buf()));
            }
            Err(e) => {
                terminate(&mut child);
                join_reader(stdout_handle);
                join_reader(stderr_handle);
                return Err(ProbeError::ProcessStartFailed(e.to_string()));
            }
        };

        let stdout = join_reader(stdout_handle);
        let stderr = join_reader(stderr_handle);

        if !status.success() {
            let tail = String::from_utf8_lossy(&stderr);
            let tail = tail.trim();
            let mut start = tail.len().saturating_sub(STDERR_TAIL_BYTES);
            while !tail.is_char_boundary(start) {
                start += 1;
            }
            return Err(ProbeError::NonZeroExit {
                code: status.code().unwrap_or(-1),
                stderr_tail: tail[start..].to_string(),
            });
        }

        serde_json::from_slice(&stdout).map_err(|e| ProbeError::ParseError(e.to_string()))
    }
}

fn spawn_pipe_reader<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Stop a timed-out child: graceful signal first, then kill after a short
/// grace period. The graceful step matters for network-mounted files where
/// the probe can hang on I/O.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let _ = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM);
        std::thread::sleep(KILL_GRACE);
        if matches!(child.try_wait(), Ok(None)) {
            let _ = child.kill();
        }
    }

    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }

    let _ = child.wait();
}
