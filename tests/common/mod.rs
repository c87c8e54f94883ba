//! Shared test harness for integration tests.
//!
//! Provides an in-memory catalog, a temp-dir checkpoint store, and fake
//! probers so engine scenarios run without ffprobe or real media files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use videodex::engine::{CheckpointStore, ScanEngine};
use vdx_core::config::ScanConfig;
use vdx_core::events::ScanEvents;
use vdx_db::DbPool;
use vdx_probe::types::{ProbeDocument, ProbeFormat, ProbeStream};
use vdx_probe::{MediaProber, ProbeError};

/// A prober that fabricates a plausible 1080p HEVC document for any path,
/// with optional per-call latency and a failure trigger.
pub struct FakeProber {
    /// Simulated probe latency.
    pub delay: Duration,
    /// Paths containing this substring always fail.
    pub fail_substring: Option<String>,
}

impl FakeProber {
    pub fn instant() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            fail_substring: None,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_substring: None,
        })
    }

    pub fn failing_on(substring: &str) -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            fail_substring: Some(substring.to_string()),
        })
    }
}

pub fn sample_document() -> ProbeDocument {
    ProbeDocument {
        format: ProbeFormat {
            format_name: Some("matroska,webm".into()),
            duration: Some("120.0".into()),
            bit_rate: Some("5000000".into()),
            ..Default::default()
        },
        streams: vec![
            ProbeStream {
                codec_type: "video".into(),
                codec_name: Some("hevc".into()),
                width: Some(1920),
                height: Some(1080),
                avg_frame_rate: Some("24/1".into()),
                ..Default::default()
            },
            ProbeStream {
                codec_type: "audio".into(),
                codec_name: Some("aac".into()),
                channels: Some(2),
                ..Default::default()
            },
        ],
    }
}

impl MediaProber for FakeProber {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn probe(&self, path: &Path) -> Result<ProbeDocument, ProbeError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(ref needle) = self.fail_substring {
            if path.to_string_lossy().contains(needle.as_str()) {
                return Err(ProbeError::NonZeroExit {
                    code: 1,
                    stderr_tail: "simulated probe failure".into(),
                });
            }
        }
        Ok(sample_document())
    }
}

/// A prober that fails a fixed number of times per path before succeeding.
pub struct FlakyProber {
    succeed_after: u32,
    attempts: Mutex<HashMap<PathBuf, u32>>,
}

impl FlakyProber {
    pub fn new(succeed_after: u32) -> Arc<Self> {
        Arc::new(Self {
            succeed_after,
            attempts: Mutex::new(HashMap::new()),
        })
    }

    pub fn attempts_for(&self, path: &Path) -> u32 {
        self.attempts.lock().get(path).copied().unwrap_or(0)
    }
}

impl MediaProber for FlakyProber {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn probe(&self, path: &Path) -> Result<ProbeDocument, ProbeError> {
        let mut attempts = self.attempts.lock();
        let count = attempts.entry(path.to_path_buf()).or_insert(0);
        *count += 1;
        if *count <= self.succeed_after {
            return Err(ProbeError::Timeout(path.to_path_buf()));
        }
        Ok(sample_document())
    }
}

/// Engine plus everything it was built from.
pub struct TestHarness {
    pub engine: ScanEngine,
    pub events: Arc<ScanEvents>,
    pub pool: DbPool,
    pub checkpoints: CheckpointStore,
    _state_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn new(prober: Arc<dyn MediaProber>, config: ScanConfig) -> Self {
        let pool = vdx_db::init_memory_pool().expect("in-memory pool");
        let state_dir = tempfile::tempdir().expect("state dir");
        let checkpoints = CheckpointStore::new(state_dir.path().join("scan_checkpoint.json"));
        Self::with_parts(prober, config, pool, checkpoints, state_dir)
    }

    /// Rebuild an engine over existing state, as a fresh process would
    /// after a crash.
    pub fn with_parts(
        prober: Arc<dyn MediaProber>,
        config: ScanConfig,
        pool: DbPool,
        checkpoints: CheckpointStore,
        state_dir: tempfile::TempDir,
    ) -> Self {
        let events = Arc::new(ScanEvents::new());
        let engine = ScanEngine::new(
            pool.clone(),
            prober,
            checkpoints.clone(),
            config,
            events.clone(),
        );
        Self {
            engine,
            events,
            pool,
            checkpoints,
            _state_dir: state_dir,
        }
    }

    /// Tear down, handing back the persistent pieces for a relaunch.
    pub fn into_state(self) -> (DbPool, CheckpointStore, tempfile::TempDir) {
        (self.pool, self.checkpoints, self._state_dir)
    }
}

/// Fast test configuration: small batches, quick retries.
pub fn test_config() -> ScanConfig {
    ScanConfig {
        max_concurrency: 4,
        batch_size: 3,
        checkpoint_interval_secs: 3600,
        max_retries: 1,
        retry_backoff_ms: 10,
    }
}

/// Create `count` empty `.mkv` files under a fresh temp dir.
pub fn media_tree(count: usize) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("media dir");
    for i in 0..count {
        std::fs::write(dir.path().join(format!("file{i:03}.mkv")), b"fake").unwrap();
    }
    dir
}

/// Wait until the published progress satisfies `predicate`, or panic after
/// ten seconds.
pub async fn wait_for_progress(
    events: &ScanEvents,
    mut predicate: impl FnMut(&vdx_core::events::ScanProgress) -> bool,
) {
    let mut rx = events.subscribe_progress();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if predicate(&rx.borrow_and_update()) {
            return;
        }
        tokio::select! {
            changed = rx.changed() => changed.expect("progress channel closed"),
            _ = tokio::time::sleep_until(deadline) => panic!("timed out waiting for progress"),
        }
    }
}
