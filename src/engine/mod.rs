//! The scan engine.
//!
//! A single actor task owns all mutable scan state (pending queue,
//! counters, insert buffer, lifecycle state); its inbox multiplexes
//! lifecycle commands, worker completions, and the checkpoint timer, so no
//! locks are needed. Probe workers run the blocking subprocess wait on the
//! blocking thread pool and report back over a channel.
//!
//! Pipeline:
//!   discovery ──> pending queue ──dispatch──> probe workers (bounded) ──>
//!   insert buffer ──batched──> catalog store
//!
//! Pause and cancel quiesce: dispatch stops immediately, in-flight workers
//! run to completion (probes are bounded by their own timeout), then the
//! buffer flushes and the transition fires.

mod checkpoint;
mod discovery;

pub use checkpoint::{
    check_for_recovery, discard_checkpoint, Checkpoint, CheckpointStore, RecoveryInfo,
};
pub use discovery::discover_files;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use vdx_core::config::ScanConfig;
use vdx_core::events::{
    LogEntry, LogLevel, ScanCompletion, ScanEvents, ScanProgress, ScanState,
};
use vdx_core::{Error, Result};
use vdx_db::queries::{sessions, videos};
use vdx_db::{DbPool, NewVideo, SessionStatus};
use vdx_probe::MediaProber;

/// Minimum interval between throttled progress emissions.
const PROGRESS_THROTTLE: Duration = Duration::from_millis(100);

/// Commands accepted by the engine actor.
enum Command {
    Start {
        folder: PathBuf,
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        reply: oneshot::Sender<Result<()>>,
    },
    Cancel {
        reply: oneshot::Sender<Result<()>>,
    },
    ResumeFromCheckpoint {
        checkpoint: Checkpoint,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Result of one worker: a parsed record, or a terminal per-file failure.
struct WorkerOutcome {
    path: String,
    record: Option<NewVideo>,
    error: Option<String>,
}

/// Handle to the scan engine actor. Cheap to clone.
#[derive(Clone)]
pub struct ScanEngine {
    cmd_tx: mpsc::Sender<Command>,
    events: Arc<ScanEvents>,
}

impl ScanEngine {
    /// Construct the engine and spawn its actor task on the current
    /// runtime.
    pub fn new(
        pool: DbPool,
        prober: Arc<dyn MediaProber>,
        checkpoints: CheckpointStore,
        config: ScanConfig,
        events: Arc<ScanEvents>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (result_tx, result_rx) = mpsc::channel(64);

        let actor = EngineActor {
            pool,
            prober,
            checkpoints,
            config,
            events: events.clone(),
            cmd_rx,
            result_tx,
            result_rx,
            scan: None,
        };
        tokio::spawn(actor.run());

        Self { cmd_tx, events }
    }

    /// The engine's event streams.
    pub fn events(&self) -> &Arc<ScanEvents> {
        &self.events
    }

    async fn send(&self, build: impl FnOnce(oneshot::Sender<Result<()>>) -> Command) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| Error::Internal("scan engine stopped".into()))?;
        reply_rx
            .await
            .map_err(|_| Error::Internal("scan engine dropped reply".into()))?
    }

    /// Start scanning a folder. Rejects if a session is already active.
    pub async fn start_scan(&self, folder: impl Into<PathBuf>) -> Result<()> {
        let folder = folder.into();
        self.send(|reply| Command::Start { folder, reply }).await
    }

    /// Pause the active scan. Resolves once producers have quiesced, the
    /// buffer is flushed, and the checkpoint is written.
    pub async fn pause(&self) -> Result<()> {
        self.send(|reply| Command::Pause { reply }).await
    }

    /// Resume a paused scan from the in-memory pending list.
    pub async fn resume(&self) -> Result<()> {
        self.send(|reply| Command::Resume { reply }).await
    }

    /// Cancel the active scan. Resolves after the terminal transition.
    pub async fn cancel(&self) -> Result<()> {
        self.send(|reply| Command::Cancel { reply }).await
    }

    /// Rehydrate a checkpointed session and continue scanning it.
    pub async fn resume_from_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        self.send(|reply| Command::ResumeFromCheckpoint { checkpoint, reply })
            .await
    }
}

/// State of the one active scan.
struct ActiveScan {
    session_id: i64,
    folder: PathBuf,
    total: u64,
    processed: u64,
    pending: VecDeque<String>,
    in_flight: usize,
    buffer: Vec<NewVideo>,
    state: ScanState,
    pausing: bool,
    cancelling: bool,
    pause_reply: Option<oneshot::Sender<Result<()>>>,
    cancel_reply: Option<oneshot::Sender<Result<()>>>,
    started_at: Instant,
    last_checkpoint: Instant,
    last_progress_emit: Option<Instant>,
    current_file: Option<String>,
}

enum Event {
    Cmd(Option<Command>),
    Outcome(WorkerOutcome),
    Timer,
}

struct EngineActor {
    pool: DbPool,
    prober: Arc<dyn MediaProber>,
    checkpoints: CheckpointStore,
    config: ScanConfig,
    events: Arc<ScanEvents>,
    cmd_rx: mpsc::Receiver<Command>,
    result_tx: mpsc::Sender<WorkerOutcome>,
    result_rx: mpsc::Receiver<WorkerOutcome>,
    scan: Option<ActiveScan>,
}

impl EngineActor {
    async fn run(mut self) {
        let mut timer = tokio::time::interval(Duration::from_secs(1));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                cmd = self.cmd_rx.recv() => Event::Cmd(cmd),
                outcome = self.result_rx.recv() => {
                    // The actor holds a sender, so recv never yields None.
                    match outcome {
                        Some(outcome) => Event::Outcome(outcome),
                        None => continue,
                    }
                }
                _ = timer.tick() => Event::Timer,
            };

            match event {
                Event::Cmd(None) => break, // engine handle dropped
                Event::Cmd(Some(cmd)) => self.handle_command(cmd).await,
                Event::Outcome(outcome) => self.handle_outcome(outcome).await,
                Event::Timer => self.handle_timer().await,
            }

            self.dispatch();
            self.maybe_finalize().await;
        }
    }

    // -- Command handling ----------------------------------------------------

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { folder, reply } => {
                let result = self.handle_start(folder).await;
                let _ = reply.send(result);
            }
            Command::Pause { reply } => match self.scan.as_mut() {
                Some(scan) if scan.state == ScanState::Scanning && !scan.cancelling => {
                    scan.pausing = true;
                    scan.pause_reply = Some(reply);
                }
                _ => {
                    let _ = reply.send(Err(Error::Validation("no scan is running".into())));
                }
            },
            Command::Resume { reply } => {
                let resumed = match self.scan.as_mut() {
                    Some(scan) if scan.state == ScanState::Paused => {
                        scan.state = ScanState::Scanning;
                        scan.last_checkpoint = Instant::now();
                        true
                    }
                    _ => false,
                };
                if resumed {
                    self.log(LogEntry::new(LogLevel::Info, "Scan resumed"));
                    self.emit_progress(false);
                    let _ = reply.send(Ok(()));
                } else {
                    let _ = reply.send(Err(Error::Validation("no paused scan to resume".into())));
                }
            }
            Command::Cancel { reply } => match self.scan.as_mut() {
                Some(scan) => {
                    scan.cancelling = true;
                    // A cancel overrides a pause in progress.
                    if let Some(pause_reply) = scan.pause_reply.take() {
                        let _ = pause_reply.send(Ok(()));
                    }
                    scan.pausing = false;
                    scan.cancel_reply = Some(reply);
                }
                None => {
                    let _ = reply.send(Err(Error::Validation("no scan to cancel".into())));
                }
            },
            Command::ResumeFromCheckpoint { checkpoint, reply } => {
                let result = self.handle_resume_from_checkpoint(checkpoint).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_start(&mut self, folder: PathBuf) -> Result<()> {
        if self.scan.is_some() {
            return Err(Error::ScanAlreadyInProgress);
        }

        let discover_root = folder.clone();
        let files = tokio::task::spawn_blocking(move || discover_files(&discover_root))
            .await
            .map_err(|e| Error::Internal(format!("discovery task panicked: {e}")))??;

        let pending: Vec<String> = files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let total = pending.len() as u64;

        let folder_str = folder.to_string_lossy().into_owned();
        let session_pending = pending.clone();
        let session = self
            .db(move |conn| sessions::create_session(conn, &folder_str, total, &session_pending))
            .await?;

        self.log(LogEntry::new(
            LogLevel::Info,
            format!("Scan started: {total} video files in {}", folder.display()),
        ));

        self.scan = Some(ActiveScan {
            session_id: session.id,
            folder,
            total,
            processed: 0,
            pending: pending.into(),
            in_flight: 0,
            buffer: Vec::with_capacity(self.config.batch_size),
            state: ScanState::Scanning,
            pausing: false,
            cancelling: false,
            pause_reply: None,
            cancel_reply: None,
            started_at: Instant::now(),
            last_checkpoint: Instant::now(),
            last_progress_emit: None,
            current_file: None,
        });
        self.emit_progress(false);

        Ok(())
    }

    async fn handle_resume_from_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if self.scan.is_some() {
            return Err(Error::ScanAlreadyInProgress);
        }

        let session_id = checkpoint.session_id;
        self.db(move |conn| {
            sessions::set_session_status(conn, session_id, SessionStatus::InProgress)
        })
        .await?;

        self.log(LogEntry::new(
            LogLevel::Info,
            format!(
                "Resuming scan of {} ({} of {} files done)",
                checkpoint.folder_path, checkpoint.processed_files, checkpoint.total_files
            ),
        ));

        self.scan = Some(ActiveScan {
            session_id,
            folder: PathBuf::from(&checkpoint.folder_path),
            total: checkpoint.total_files,
            processed: checkpoint.processed_files,
            pending: checkpoint.pending_file_paths.into(),
            in_flight: 0,
            buffer: Vec::with_capacity(self.config.batch_size),
            state: ScanState::Scanning,
            pausing: false,
            cancelling: false,
            pause_reply: None,
            cancel_reply: None,
            started_at: Instant::now(),
            last_checkpoint: Instant::now(),
            last_progress_emit: None,
            current_file: None,
        });
        self.emit_progress(false);

        Ok(())
    }

    // -- Worker dispatch and completion --------------------------------------

    fn dispatch(&mut self) {
        let Some(scan) = self.scan.as_mut() else {
            return;
        };
        if scan.state != ScanState::Scanning || scan.pausing || scan.cancelling {
            return;
        }

        while scan.in_flight < self.config.max_concurrency {
            let Some(path) = scan.pending.pop_front() else {
                break;
            };
            scan.in_flight += 1;
            scan.current_file = Some(path.clone());

            let prober = self.prober.clone();
            let tx = self.result_tx.clone();
            let config = self.config.clone();
            let session_id = scan.session_id;
            tokio::spawn(run_worker(prober, tx, config, session_id, path));
        }
    }

    async fn handle_outcome(&mut self, outcome: WorkerOutcome) {
        let (entry, should_flush) = {
            let Some(scan) = self.scan.as_mut() else {
                return;
            };

            scan.in_flight -= 1;
            scan.processed += 1;
            scan.current_file = Some(outcome.path.clone());

            match outcome.record {
                Some(record) => {
                    let entry = LogEntry::with_file(
                        LogLevel::Success,
                        format!("Processed {}", record.file_name),
                        outcome.path,
                    );
                    scan.buffer.push(record);
                    (entry, scan.buffer.len() >= self.config.batch_size)
                }
                None => {
                    let detail = outcome.error.unwrap_or_else(|| "unknown error".into());
                    let entry = LogEntry::with_file(
                        LogLevel::Error,
                        format!(
                            "Failed after {} attempts: {detail}",
                            self.config.max_retries + 1
                        ),
                        outcome.path,
                    );
                    (entry, false)
                }
            }
        };

        self.log(entry);
        if should_flush {
            self.flush_buffer().await;
        }
        self.emit_progress(true);
    }

    // -- Timer ---------------------------------------------------------------

    async fn handle_timer(&mut self) {
        let due = match self.scan.as_ref() {
            Some(scan)
                if scan.state == ScanState::Scanning && !scan.pausing && !scan.cancelling =>
            {
                scan.last_checkpoint.elapsed() >= self.config.checkpoint_interval()
            }
            _ => false,
        };

        if due {
            self.flush_buffer().await;
            self.write_checkpoint().await;
            if let Some(scan) = self.scan.as_mut() {
                scan.last_checkpoint = Instant::now();
            }
        }
    }

    // -- Quiesce and terminal transitions ------------------------------------

    async fn maybe_finalize(&mut self) {
        let (cancelling, pausing, drained) = match self.scan.as_ref() {
            Some(scan) if scan.in_flight == 0 => (
                scan.cancelling,
                scan.pausing,
                scan.state == ScanState::Scanning && scan.pending.is_empty(),
            ),
            _ => return,
        };

        if cancelling {
            self.finish(SessionStatus::Cancelled).await;
        } else if pausing {
            self.finish_pause().await;
        } else if drained {
            self.finish(SessionStatus::Completed).await;
        }
    }

    /// Complete a pause: flush, persist session state, write the
    /// checkpoint, and transition to `paused`.
    async fn finish_pause(&mut self) {
        self.flush_buffer().await;
        self.update_session_progress(SessionStatus::Paused).await;
        self.write_checkpoint().await;

        if let Some(scan) = self.scan.as_mut() {
            scan.state = ScanState::Paused;
            scan.pausing = false;
            if let Some(reply) = scan.pause_reply.take() {
                let _ = reply.send(Ok(()));
            }
        }
        self.log(LogEntry::new(LogLevel::Info, "Scan paused"));
        self.emit_progress(false);
    }

    /// Fire a terminal transition: flush, persist the session, drop the
    /// checkpoint, and publish the completion summary.
    async fn finish(&mut self, status: SessionStatus) {
        self.flush_buffer().await;
        self.update_session_progress(status).await;

        let checkpoints = self.checkpoints.clone();
        let delete_result =
            tokio::task::spawn_blocking(move || checkpoints.delete()).await;
        if let Ok(Err(e)) = delete_result {
            self.log(LogEntry::new(
                LogLevel::Warning,
                format!("Failed to delete checkpoint: {e}"),
            ));
        }

        let Some(mut scan) = self.scan.take() else {
            return;
        };

        let state = match status {
            SessionStatus::Cancelled => ScanState::Cancelled,
            SessionStatus::Failed => ScanState::Failed,
            _ => ScanState::Completed,
        };

        let duration_secs = scan.started_at.elapsed().as_secs_f64();
        self.log(LogEntry::new(
            match state {
                ScanState::Completed => LogLevel::Success,
                _ => LogLevel::Info,
            },
            format!(
                "Scan {state}: {} of {} files in {duration_secs:.1}s",
                scan.processed, scan.total
            ),
        ));

        self.events.publish_progress(ScanProgress {
            total: scan.total,
            processed: scan.processed,
            current_file: None,
            state,
        });
        self.events.publish_completion(ScanCompletion {
            total: scan.total,
            processed: scan.processed,
            duration_secs,
            folder_path: scan.folder.to_string_lossy().into_owned(),
            state,
        });

        if let Some(reply) = scan.cancel_reply.take() {
            let _ = reply.send(Ok(()));
        }
    }

    // -- Persistence helpers -------------------------------------------------

    async fn db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = vdx_db::get_conn(&pool)?;
            f(&conn)
        })
        .await
        .map_err(|e| Error::Internal(format!("database task panicked: {e}")))?
    }

    /// Flush the insert buffer in one transaction. A failed batch is logged
    /// and dropped; the scan continues.
    async fn flush_buffer(&mut self) {
        let Some(scan) = self.scan.as_mut() else {
            return;
        };
        if scan.buffer.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut scan.buffer);
        let count = batch.len();
        let result = self.db(move |conn| videos::insert_batch(conn, &batch)).await;

        match result {
            Ok(()) => {
                tracing::debug!(count, "Flushed record batch");
            }
            Err(e) => {
                self.log(LogEntry::new(
                    LogLevel::Warning,
                    format!("Dropped batch of {count} records: {e}"),
                ));
            }
        }
    }

    /// Persist counters, the pending list, and the status onto the session
    /// row. Failures are logged and ignored.
    async fn update_session_progress(&mut self, status: SessionStatus) {
        let Some(scan) = self.scan.as_ref() else {
            return;
        };
        let session_id = scan.session_id;
        let processed = scan.processed;
        let pending: Vec<String> = scan.pending.iter().cloned().collect();

        let result = self
            .db(move |conn| {
                sessions::update_session_progress(conn, session_id, processed, &pending)?;
                sessions::set_session_status(conn, session_id, status)
            })
            .await;

        if let Err(e) = result {
            self.log(LogEntry::new(
                LogLevel::Warning,
                format!("Failed to update session: {e}"),
            ));
        }
    }

    /// Atomically rewrite the checkpoint file. Failures are logged and the
    /// scan continues.
    async fn write_checkpoint(&mut self) {
        let Some(scan) = self.scan.as_ref() else {
            return;
        };

        let checkpoint = Checkpoint {
            session_id: scan.session_id,
            folder_path: scan.folder.to_string_lossy().into_owned(),
            total_files: scan.total,
            processed_files: scan.processed,
            pending_file_paths: scan.pending.iter().cloned().collect(),
            saved_at: Utc::now(),
        };
        let session_id = scan.session_id;

        let checkpoints = self.checkpoints.clone();
        let save_result =
            tokio::task::spawn_blocking(move || checkpoints.save(&checkpoint)).await;

        match save_result {
            Ok(Ok(())) => {
                let now = Utc::now();
                let result = self
                    .db(move |conn| sessions::touch_checkpoint(conn, session_id, now))
                    .await;
                if let Err(e) = result {
                    tracing::warn!("Failed to record checkpoint time: {e}");
                }
            }
            Ok(Err(e)) => {
                self.log(LogEntry::new(
                    LogLevel::Warning,
                    format!("Failed to write checkpoint: {e}"),
                ));
            }
            Err(e) => {
                tracing::warn!("Checkpoint task panicked: {e}");
            }
        }
    }

    // -- Event helpers -------------------------------------------------------

    fn log(&self, entry: LogEntry) {
        self.events.publish_log(entry);
    }

    /// Publish progress, throttled to one emission per 100 ms while
    /// scanning. State transitions pass `throttled = false`.
    fn emit_progress(&mut self, throttled: bool) {
        let Some(scan) = self.scan.as_mut() else {
            return;
        };

        if throttled {
            if let Some(last) = scan.last_progress_emit {
                if last.elapsed() < PROGRESS_THROTTLE {
                    return;
                }
            }
        }
        scan.last_progress_emit = Some(Instant::now());

        self.events.publish_progress(ScanProgress {
            total: scan.total,
            processed: scan.processed,
            current_file: scan.current_file.clone(),
            state: scan.state,
        });
    }
}

/// One probe worker: probe + parse with retry and exponential backoff.
/// Every attempt consumes the worker's slot; retries never reset the probe
/// timeout.
async fn run_worker(
    prober: Arc<dyn MediaProber>,
    tx: mpsc::Sender<WorkerOutcome>,
    config: ScanConfig,
    session_id: i64,
    path: String,
) {
    let mut last_error = String::new();

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            tokio::time::sleep(config.backoff_for_attempt(attempt)).await;
        }

        let prober = prober.clone();
        let probe_path = PathBuf::from(&path);
        let result = tokio::task::spawn_blocking(move || {
            let doc = prober.probe(&probe_path)?;
            let size = std::fs::metadata(&probe_path).map(|m| m.len()).unwrap_or(0);
            Ok::<_, vdx_probe::ProbeError>((doc, size))
        })
        .await;

        match result {
            Ok(Ok((doc, file_size))) => {
                let file_path = Path::new(&path);
                let metadata = vdx_probe::parse(&doc, file_path);
                let file_name = file_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone());

                let _ = tx
                    .send(WorkerOutcome {
                        path: path.clone(),
                        record: Some(NewVideo {
                            file_path: path,
                            file_name,
                            file_size,
                            metadata,
                            scan_session_id: Some(session_id),
                        }),
                        error: None,
                    })
                    .await;
                return;
            }
            Ok(Err(e)) => {
                tracing::debug!(file = %path, attempt, error = %e, "Probe attempt failed");
                last_error = e.to_string();
            }
            Err(e) => {
                last_error = format!("probe task panicked: {e}");
            }
        }
    }

    let _ = tx
        .send(WorkerOutcome {
            path,
            record: None,
            error: Some(last_error),
        })
        .await;
}
