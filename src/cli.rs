use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "videodex")]
#[command(author, version, about = "Catalog video files into a queryable local library")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the application data directory (database + checkpoint)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a folder tree and catalog every video file found
    Scan {
        /// Folder to scan recursively
        #[arg(required = true)]
        folder: PathBuf,

        /// Print the completion summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Query the catalog with optional filters
    Query {
        /// Case-insensitive substring match on file name
        #[arg(long)]
        search: Option<String>,

        /// Keep records with any of these video codecs (repeatable)
        #[arg(long = "codec")]
        codecs: Vec<String>,

        /// Keep records with any of these HDR formats (repeatable)
        #[arg(long = "hdr")]
        hdr_formats: Vec<String>,

        /// Keep records with any of these audio codecs (repeatable)
        #[arg(long = "audio")]
        audio_codecs: Vec<String>,

        /// Keep records with any of these containers (repeatable)
        #[arg(long = "container")]
        containers: Vec<String>,

        /// Keep records in any of these resolution bands (repeatable)
        #[arg(long = "resolution")]
        resolutions: Vec<String>,

        /// Filter on the Atmos flag
        #[arg(long)]
        atmos: Option<bool>,

        /// Filter on the DTS:X flag
        #[arg(long)]
        dtsx: Option<bool>,

        /// Keep only immersive audio (Atmos or DTS:X)
        #[arg(long)]
        immersive: bool,

        /// Minimum duration in seconds
        #[arg(long)]
        min_duration: Option<f64>,

        /// Maximum duration in seconds
        #[arg(long)]
        max_duration: Option<f64>,

        /// Minimum file size in bytes
        #[arg(long)]
        min_size: Option<u64>,

        /// Maximum file size in bytes
        #[arg(long)]
        max_size: Option<u64>,

        /// Sort column: name, size, duration, resolution, codec, hdr,
        /// audio, bitrate, container
        #[arg(long, default_value = "name")]
        sort: String,

        /// Sort descending instead of ascending
        #[arg(long)]
        desc: bool,

        /// Maximum number of rows
        #[arg(long)]
        limit: Option<u32>,

        /// Number of rows to skip
        #[arg(long)]
        offset: Option<u32>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show aggregate catalog statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find duplicate files in the catalog
    Duplicates {
        /// Detection method: fuzzy, partial-hash, or full-hash
        #[arg(long, default_value = "fuzzy")]
        method: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a full decode pass to detect corrupted files
    Verify {
        /// Verify every catalogued file
        #[arg(long)]
        all: bool,

        /// Specific record ids to verify
        ids: Vec<i64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Inspect a leftover scan checkpoint and optionally resume it
    Recover {
        /// Resume the checkpointed scan
        #[arg(long, conflicts_with = "discard")]
        accept: bool,

        /// Delete the checkpoint and mark its session failed
        #[arg(long)]
        discard: bool,
    },
}
