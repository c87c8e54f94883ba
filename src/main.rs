mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use videodex::duplicates::{self, DuplicateMethod};
use videodex::engine::{
    check_for_recovery, discard_checkpoint, Checkpoint, CheckpointStore, ScanEngine,
};
use videodex::integrity;

use vdx_core::config::Config;
use vdx_core::events::{LogLevel, ScanEvents, ScanState};
use vdx_core::paths::DataPaths;
use vdx_db::queries::{stats, videos};
use vdx_db::DbPool;
use vdx_probe::{FfprobeRunner, MediaProber, ToolRegistry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise choose defaults by verbosity.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "videodex=debug,vdx_core=debug,vdx_probe=debug,vdx_db=debug".to_string()
        } else {
            "videodex=info,vdx_db=warn".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load_or_default(cli.config.as_deref());
    for warning in config.validate() {
        tracing::warn!("Config: {warning}");
    }

    let paths = match &cli.data_dir {
        Some(dir) => DataPaths::at(dir.clone())?,
        None => DataPaths::resolve()?,
    };

    match cli.command {
        Commands::Scan { folder, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_scan(&paths, &config, folder, json))
        }
        Commands::Query {
            search,
            codecs,
            hdr_formats,
            audio_codecs,
            containers,
            resolutions,
            atmos,
            dtsx,
            immersive,
            min_duration,
            max_duration,
            min_size,
            max_size,
            sort,
            desc,
            limit,
            offset,
            json,
        } => {
            let filter = videos::VideoFilter {
                search_text: search,
                video_codecs: parse_all(&codecs)?,
                hdr_formats: parse_all(&hdr_formats)?,
                audio_codecs: parse_all(&audio_codecs)?,
                containers: parse_all(&containers)?,
                resolution_categories: parse_all(&resolutions)?,
                has_atmos: atmos,
                has_dtsx: dtsx,
                immersive_only: immersive,
                min_duration,
                max_duration,
                min_size,
                max_size,
                sort: parse_sort(&sort)?,
                sort_ascending: !desc,
                limit,
                offset,
            };
            run_query(&paths, &filter, json)
        }
        Commands::Stats { json } => run_stats(&paths, json),
        Commands::Duplicates { method, json } => {
            let method: DuplicateMethod = method.parse().map_err(anyhow::Error::msg)?;
            run_duplicates(&paths, &config, method, json)
        }
        Commands::Verify { all, ids, json } => {
            if !all && ids.is_empty() {
                anyhow::bail!("verify requires --all or at least one record id");
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_verify(&paths, &config, all, ids, json))
        }
        Commands::CheckTools => run_check_tools(&config),
        Commands::Recover { accept, discard } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_recover(&paths, &config, accept, discard))
        }
    }
}

fn parse_all<T>(raw: &[String]) -> Result<Vec<T>>
where
    T: std::str::FromStr<Err = String>,
{
    raw.iter()
        .map(|s| s.parse::<T>().map_err(anyhow::Error::msg))
        .collect()
}

fn parse_sort(raw: &str) -> Result<videos::SortColumn> {
    use videos::SortColumn;
    Ok(match raw {
        "name" => SortColumn::FileName,
        "size" => SortColumn::FileSize,
        "duration" => SortColumn::Duration,
        "resolution" => SortColumn::Resolution,
        "codec" => SortColumn::VideoCodec,
        "hdr" => SortColumn::HdrFormat,
        "audio" => SortColumn::AudioCodec,
        "bitrate" => SortColumn::BitRate,
        "container" => SortColumn::Container,
        other => anyhow::bail!("unknown sort column: {other}"),
    })
}

fn open_pool(paths: &DataPaths) -> Result<DbPool> {
    tracing::debug!("Opening catalog at {}", paths.database_path().display());
    vdx_db::init_pool(&paths.database_path()).context("failed to open the catalog database")
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

// ---------------------------------------------------------------------------
// scan / recover
// ---------------------------------------------------------------------------

enum EngineStart {
    Folder(PathBuf),
    Checkpoint(Checkpoint),
}

async fn run_scan(paths: &DataPaths, config: &Config, folder: PathBuf, json: bool) -> Result<()> {
    let checkpoints = CheckpointStore::new(paths.checkpoint_path());
    if checkpoints.exists() {
        tracing::warn!(
            "A scan checkpoint exists; `videodex recover` can resume or discard it. Starting fresh."
        );
    }
    drive_engine(paths, config, EngineStart::Folder(folder), json).await
}

/// Construct the engine, render its event streams to the terminal, and run
/// one scan to a terminal state. Ctrl-C cancels cleanly.
async fn drive_engine(
    paths: &DataPaths,
    config: &Config,
    start: EngineStart,
    json: bool,
) -> Result<()> {
    let pool = open_pool(paths)?;
    let tools = ToolRegistry::discover(&config.tools);
    let ffprobe = tools.require("ffprobe")?.clone();

    let prober: Arc<dyn MediaProber> =
        Arc::new(FfprobeRunner::new(ffprobe, config.tools.probe_timeout()));
    let events = Arc::new(ScanEvents::new());
    let engine = ScanEngine::new(
        pool,
        prober,
        CheckpointStore::new(paths.checkpoint_path()),
        config.scan.clone(),
        events.clone(),
    );

    let mut completion_rx = events.subscribe_completion();

    // Log stream: forward to tracing so entries interleave with our own.
    let mut log_rx = events.subscribe_log();
    let log_task = tokio::spawn(async move {
        loop {
            match log_rx.recv().await {
                Ok(entry) => match entry.level {
                    LogLevel::Error => match entry.file_path {
                        Some(file) => tracing::error!(file, "{}", entry.message),
                        None => tracing::error!("{}", entry.message),
                    },
                    LogLevel::Warning => tracing::warn!("{}", entry.message),
                    LogLevel::Info | LogLevel::Success => tracing::debug!("{}", entry.message),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Progress stream: one rewritten terminal line.
    let mut progress_rx = events.subscribe_progress();
    let progress_task = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let progress = progress_rx.borrow_and_update().clone();
            if progress.total > 0 {
                eprint!(
                    "\r[{}] {}/{} {}\x1b[K",
                    progress.state,
                    progress.processed,
                    progress.total,
                    progress
                        .current_file
                        .as_deref()
                        .and_then(|p| std::path::Path::new(p).file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                );
            }
            if progress.state.is_terminal() {
                eprintln!();
                break;
            }
        }
    });

    match start {
        EngineStart::Folder(folder) => engine.start_scan(folder).await?,
        EngineStart::Checkpoint(checkpoint) => engine.resume_from_checkpoint(checkpoint).await?,
    }

    let completion = tokio::select! {
        completion = completion_rx.recv() => completion?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!();
            tracing::info!("Interrupted; cancelling scan");
            engine.cancel().await?;
            completion_rx.recv().await?
        }
    };

    let _ = progress_task.await;
    // The log channel stays open as long as the event bus lives; the
    // scan is over, so stop forwarding.
    log_task.abort();

    if json {
        println!("{}", serde_json::to_string_pretty(&completion)?);
    } else {
        println!(
            "Scan {}: {} of {} files from {} in {:.1}s",
            completion.state,
            completion.processed,
            completion.total,
            completion.folder_path,
            completion.duration_secs
        );
    }

    if completion.state == ScanState::Failed {
        anyhow::bail!("scan failed");
    }
    Ok(())
}

async fn run_recover(paths: &DataPaths, config: &Config, accept: bool, discard: bool) -> Result<()> {
    let pool = open_pool(paths)?;
    let store = CheckpointStore::new(paths.checkpoint_path());

    let Some(info) = check_for_recovery(&store, &pool, &config.recovery)? else {
        println!("No recoverable scan found.");
        return Ok(());
    };

    println!(
        "Interrupted scan of {}: {:.0}% done, {} files remaining (saved {})",
        info.folder_path,
        info.progress_percentage,
        info.remaining_file_count,
        info.checkpoint.saved_at.to_rfc3339()
    );

    if discard {
        discard_checkpoint(&store, &pool, &info.checkpoint)?;
        println!("Checkpoint discarded.");
        return Ok(());
    }

    if accept {
        drop(pool);
        return drive_engine(paths, config, EngineStart::Checkpoint(info.checkpoint), false).await;
    }

    println!("Run with --accept to resume or --discard to delete the checkpoint.");
    Ok(())
}

// ---------------------------------------------------------------------------
// query / stats
// ---------------------------------------------------------------------------

fn run_query(paths: &DataPaths, filter: &videos::VideoFilter, json: bool) -> Result<()> {
    let pool = open_pool(paths)?;
    let conn = vdx_db::get_conn(&pool)?;
    let records = videos::fetch_filtered(&conn, filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No matching records.");
        return Ok(());
    }

    for record in &records {
        let resolution = match (record.width, record.height) {
            (Some(w), Some(h)) => format!("{w}x{h}"),
            _ => "-".to_string(),
        };
        let mut audio = record.audio_codec.to_string();
        if record.is_atmos {
            audio.push_str("+atmos");
        }
        if record.is_dtsx {
            audio.push_str("+dtsx");
        }
        println!(
            "{:>6}  {:<50}  {:>9}  {:<10}  {:<18}  {:<12}  {:>10}",
            record.id,
            truncate(&record.file_name, 50),
            resolution,
            record.video_codec,
            record.hdr_format,
            audio,
            format_size(record.file_size)
        );
    }
    println!("{} record(s)", records.len());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}…")
    }
}

fn run_stats(paths: &DataPaths, json: bool) -> Result<()> {
    let pool = open_pool(paths)?;
    let conn = vdx_db::get_conn(&pool)?;
    let statistics = stats::fetch_statistics(&conn)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statistics)?);
        return Ok(());
    }

    println!("Files:      {}", statistics.total_files);
    println!("Total size: {}", format_size(statistics.total_size));
    println!(
        "Duration:   {:.1} hours",
        statistics.total_duration_seconds / 3600.0
    );
    println!(
        "Immersive:  {} Atmos, {} DTS:X",
        statistics.atmos_count, statistics.dtsx_count
    );
    if statistics.corrupted_count > 0 {
        println!("Corrupted:  {}", statistics.corrupted_count);
    }

    let sections = [
        ("Video codecs", &statistics.by_video_codec),
        ("HDR formats", &statistics.by_hdr_format),
        ("Audio codecs", &statistics.by_audio_codec),
        ("Containers", &statistics.by_container),
        ("Resolutions", &statistics.by_resolution),
    ];
    for (title, buckets) in sections {
        if buckets.is_empty() {
            continue;
        }
        println!("\n{title}:");
        for bucket in buckets.iter() {
            println!("  {:<22} {}", bucket.key, bucket.count);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// duplicates / verify / tools
// ---------------------------------------------------------------------------

fn run_duplicates(
    paths: &DataPaths,
    config: &Config,
    method: DuplicateMethod,
    json: bool,
) -> Result<()> {
    let pool = open_pool(paths)?;
    let conn = vdx_db::get_conn(&pool)?;
    let records = videos::fetch_filtered(&conn, &videos::VideoFilter::default())?;

    let groups = duplicates::find_duplicates(
        &records,
        method,
        config.duplicates.partial_hash_window,
        |progress| {
            eprint!(
                "\r[{:?}] {}/{}\x1b[K",
                progress.phase, progress.current, progress.total
            );
        },
    );
    eprintln!();

    // Full hashing already paid for the digests; keep them.
    if method == DuplicateMethod::FullHash {
        for group in &groups {
            if let Some(hash) = &group.content_hash {
                for file in &group.files {
                    if let Err(e) = videos::update_file_hash(&conn, file.id, hash) {
                        tracing::warn!(file = %file.file_path, "Failed to store file hash: {e}");
                    }
                }
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    if groups.is_empty() {
        println!("No duplicates found ({method}).");
        return Ok(());
    }

    let total_savings: u64 = groups.iter().map(|g| g.potential_savings()).sum();
    for (i, group) in groups.iter().enumerate() {
        println!(
            "Group {} ({:.0}% confidence, {} reclaimable):",
            i + 1,
            group.confidence * 100.0,
            format_size(group.potential_savings())
        );
        for file in &group.files {
            println!("  {:>10}  {}", format_size(file.file_size), file.file_path);
        }
    }
    println!(
        "{} group(s); potential savings {}",
        groups.len(),
        format_size(total_savings)
    );
    Ok(())
}

async fn run_verify(
    paths: &DataPaths,
    config: &Config,
    all: bool,
    ids: Vec<i64>,
    json: bool,
) -> Result<()> {
    let pool = open_pool(paths)?;
    let tools = ToolRegistry::discover(&config.tools);
    let ffmpeg = tools.require("ffmpeg")?.clone();

    let records = {
        let conn = vdx_db::get_conn(&pool)?;
        if all {
            videos::fetch_filtered(&conn, &videos::VideoFilter::default())?
        } else {
            let mut records = Vec::with_capacity(ids.len());
            for id in ids {
                match videos::get_video(&conn, id)? {
                    Some(record) => records.push(record),
                    None => tracing::warn!("No record with id {id}"),
                }
            }
            records
        }
    };

    if records.is_empty() {
        println!("Nothing to verify.");
        return Ok(());
    }

    let reports = integrity::check_integrity(
        &pool,
        ffmpeg,
        records,
        config.integrity.concurrency,
        |progress| {
            eprint!("\r{}/{}\x1b[K", progress.current, progress.total);
        },
    )
    .await?;
    eprintln!();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    let corrupted: Vec<_> = reports.iter().filter(|r| r.is_corrupted).collect();
    println!(
        "Verified {} file(s); {} corrupted",
        reports.len(),
        corrupted.len()
    );
    for report in corrupted {
        let first = report.errors.first();
        println!(
            "  {}  [{}] {}",
            report.file_path,
            first.map(|e| e.kind.as_str()).unwrap_or("unknown"),
            first.map(|e| e.message.as_str()).unwrap_or("")
        );
    }
    Ok(())
}

fn run_check_tools(config: &Config) -> Result<()> {
    let tools = ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for info in tools.check_all() {
        let status = if info.available {
            "ok"
        } else {
            all_ok = false;
            "missing"
        };
        print!("{:<8} {}", status, info.name);
        if let Some(version) = &info.version {
            print!(" ({version})");
        }
        if let Some(path) = &info.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    if !all_ok {
        anyhow::bail!("some required tools are missing");
    }
    Ok(())
}
