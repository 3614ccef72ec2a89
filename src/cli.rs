//! Command-line interface definitions for dirmatch.
//!
//! Global options (verbosity, color, config file, error format) apply to
//! every subcommand.
//!
//! # Example
//!
//! ```bash
//! # Index a reference tree once, with content digests
//! dirmatch build-index ~/Music/archive archive.json --blake3
//!
//! # Bring the saved index up to date
//! dirmatch refresh-index archive.json
//!
//! # Classify an incoming folder against the saved index
//! dirmatch compare ~/Downloads/incoming --load-index archive.json --blake3
//!
//! # Delete incoming files that already exist in the archive
//! dirmatch compare ~/Downloads/incoming ~/Music/archive --blake3 --rm --trash
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::plugins::digest::DIGEST_PLUGIN_ID;
use crate::plugins::media::MEDIA_PLUGIN_ID;

/// Compare a target directory tree against a reference tree.
///
/// Every target file is reported as Missing, Matched, Renamed or Modified
/// relative to the reference, optionally deleting files that already have a
/// counterpart.
#[derive(Debug, Parser)]
#[command(name = "dirmatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors and results
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file (default: config.toml in the platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Index a directory tree and save the snapshot
    BuildIndex(BuildIndexArgs),
    /// Update a saved index with the current state of its tree
    RefreshIndex(RefreshIndexArgs),
    /// Classify the files of a target against a reference
    Compare(CompareArgs),
    /// Show what a saved index contains
    IndexInfo(IndexInfoArgs),
    /// List the available fingerprint plugins
    Plugins,
}

/// Fingerprint plugin selection.
#[derive(Debug, Clone, Default, Args)]
pub struct PluginArgs {
    /// Enable a fingerprint plugin by id (can be specified multiple times)
    #[arg(long = "plugin", value_name = "ID")]
    pub plugins: Vec<String>,

    /// Enable the BLAKE3 content digest (same as --plugin blake3)
    #[arg(long)]
    pub blake3: bool,

    /// Enable the audio payload checksum (same as --plugin media_checksum)
    ///
    /// Requires ffmpeg.
    #[arg(long)]
    pub media_checksum: bool,
}

impl PluginArgs {
    /// Requested plugin ids in command-line order, shorthand flags last.
    #[must_use]
    pub fn requested(&self) -> Vec<String> {
        let mut ids = self.plugins.clone();
        if self.blake3 {
            ids.push(DIGEST_PLUGIN_ID.to_string());
        }
        if self.media_checksum {
            ids.push(MEDIA_PLUGIN_ID.to_string());
        }
        ids
    }

    /// Whether no plugin was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && !self.blake3 && !self.media_checksum
    }
}

/// Traversal options.
#[derive(Debug, Clone, Default, Args)]
pub struct WalkArgs {
    /// Glob patterns to ignore (can be specified multiple times)
    ///
    /// These patterns are added to any configured ignore patterns.
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Follow symbolic links
    ///
    /// Warning: May cause infinite loops if symlinks form cycles.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Number of threads for fingerprinting (default: 4)
    ///
    /// Lower values reduce disk thrashing on HDDs.
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,
}

/// Arguments for the build-index subcommand.
#[derive(Debug, Args)]
pub struct BuildIndexArgs {
    /// Directory to index
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Where to save the index
    #[arg(value_name = "SAVE_LOCATION")]
    pub save_location: PathBuf,

    #[command(flatten)]
    pub plugins: PluginArgs,

    #[command(flatten)]
    pub walk: WalkArgs,
}

/// Arguments for the refresh-index subcommand.
#[derive(Debug, Args)]
pub struct RefreshIndexArgs {
    /// Saved index to update in place
    #[arg(value_name = "INDEX")]
    pub index: PathBuf,

    // Without plugin flags the index keeps its current features.
    #[command(flatten)]
    pub plugins: PluginArgs,

    #[command(flatten)]
    pub walk: WalkArgs,
}

/// Arguments for the compare subcommand.
#[derive(Debug, Args)]
pub struct CompareArgs {
    /// File or directory to classify
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// Reference directory, indexed on the fly
    #[arg(value_name = "REFERENCE", required_unless_present = "load_index")]
    pub reference: Option<PathBuf>,

    /// Use a saved index as the reference
    #[arg(long, value_name = "PATH", conflicts_with = "reference")]
    pub load_index: Option<PathBuf>,

    /// Save the reference index (built or loaded) to this path
    #[arg(long, value_name = "PATH")]
    pub save_index: Option<PathBuf>,

    #[command(flatten)]
    pub plugins: PluginArgs,

    #[command(flatten)]
    pub walk: WalkArgs,

    /// Delete target files that have a counterpart in the reference
    #[arg(long)]
    pub rm: bool,

    /// Move deleted files to the system trash instead of removing them
    #[arg(long, requires = "rm")]
    pub trash: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the index-info subcommand.
#[derive(Debug, Args)]
pub struct IndexInfoArgs {
    /// Saved index to describe
    #[arg(value_name = "INDEX")]
    pub index: PathBuf,
}

/// Output format for comparison results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One classification line per file
    Text,
    /// One JSON object per file, then a summary object
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
