//! Subcommand handlers.
//!
//! Each handler merges command-line flags over the loaded [`Config`] and
//! drives the library types. Results go to the given writer; logs and
//! progress go to stderr.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use bytesize::ByteSize;

use crate::actions::DeleteConfig;
use crate::cli::{
    BuildIndexArgs, CompareArgs, IndexInfoArgs, OutputFormat, PluginArgs, RefreshIndexArgs,
    WalkArgs,
};
use crate::config::Config;
use crate::error::ExitCode;
use crate::index::{BuildOptions, DirectoryIndex};
use crate::matching::{EvaluationSummary, Evaluator, EvaluatorConfig, Matcher};
use crate::output::{JsonOutput, Reporter, TextOutput};
use crate::plugins::{PluginHandle, PluginRegistry};
use crate::progress::Progress;
use crate::scanner::WalkerConfig;
use crate::signal::CancellationToken;

/// State shared by all subcommands of one run.
#[derive(Debug)]
pub struct AppContext {
    /// Layered configuration
    pub config: Config,
    /// Available plugins
    pub registry: PluginRegistry,
    /// Ctrl+C cancellation
    pub token: CancellationToken,
    /// Suppress progress bars and the text summary
    pub quiet: bool,
    /// Color classification labels
    pub color: bool,
}

impl AppContext {
    /// Context with the built-in plugins, using the configured ffmpeg.
    #[must_use]
    pub fn new(config: Config, token: CancellationToken, quiet: bool, color: bool) -> Self {
        let registry = config
            .ffmpeg_path
            .as_deref()
            .map_or_else(PluginRegistry::builtin, PluginRegistry::with_ffmpeg);
        Self {
            config,
            registry,
            token,
            quiet,
            color,
        }
    }

    /// Replace the plugin registry.
    #[must_use]
    pub fn with_registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = registry;
        self
    }

    fn walker_config(&self, walk: &WalkArgs) -> WalkerConfig {
        let mut patterns = self.config.ignore_patterns.clone();
        patterns.extend(walk.ignore_patterns.iter().cloned());
        WalkerConfig::new(
            walk.follow_symlinks || self.config.follow_symlinks,
            walk.skip_hidden || self.config.skip_hidden,
            patterns,
        )
    }

    fn build_options(&self, walk: &WalkArgs) -> BuildOptions {
        let options = BuildOptions::default()
            .with_walker(self.walker_config(walk))
            .with_io_threads(walk.io_threads.unwrap_or(self.config.io_threads))
            .with_shutdown_flag(self.token.flag());
        if self.quiet {
            options
        } else {
            options.with_progress_callback(Arc::new(Progress::new(false)))
        }
    }

    /// Plugins named on the command line, or the configured defaults.
    fn requested_plugins(&self, args: &PluginArgs) -> Vec<String> {
        if args.is_empty() {
            self.config.plugins.clone()
        } else {
            args.requested()
        }
    }

    /// Registered plugins for the features of a loaded index.
    fn plugins_for(&self, index: &DirectoryIndex) -> Vec<PluginHandle> {
        index
            .features()
            .iter()
            .filter_map(|feature| {
                let plugin = self.registry.get(feature);
                if plugin.is_none() {
                    log::warn!(
                        "Index feature '{}' has no registered plugin and is ignored",
                        feature
                    );
                }
                plugin
            })
            .collect()
    }
}

/// `build-index`: index a tree and save it.
///
/// # Errors
///
/// Unknown plugins, an unusable root, interruption, or a failed save.
pub fn build_index(ctx: &AppContext, args: &BuildIndexArgs) -> Result<ExitCode> {
    let plugins = ctx.registry.select(&ctx.requested_plugins(&args.plugins))?;
    let index = DirectoryIndex::build(&args.root, &plugins, &ctx.build_options(&args.walk))?;
    index.save(&args.save_location)?;
    log::info!(
        "Saved index of {} files ({}) to {}",
        index.len(),
        ByteSize::b(index.total_size()),
        args.save_location.display()
    );
    Ok(ExitCode::Success)
}

/// `refresh-index`: update a saved index in place.
///
/// Without `--plugin` flags the refreshed index keeps the features it had,
/// minus any that no registered plugin provides.
///
/// # Errors
///
/// A corrupt index, unknown plugins, an unusable root, interruption, or a
/// failed save. The saved file is untouched on error.
pub fn refresh_index(ctx: &AppContext, args: &RefreshIndexArgs) -> Result<ExitCode> {
    let mut index = DirectoryIndex::load(&args.index)?;
    let plugins = if args.plugins.is_empty() {
        ctx.plugins_for(&index)
    } else {
        ctx.registry.select(&args.plugins.requested())?
    };

    let stats = index.refresh(&plugins, &ctx.build_options(&args.walk))?;
    index.save(&args.index)?;
    log::info!(
        "Refreshed {}: {} unchanged, {} changed, {} added, {} removed; {} fingerprint(s) computed, {} reused",
        args.index.display(),
        stats.unchanged,
        stats.changed,
        stats.added,
        stats.removed,
        stats.recomputed,
        stats.reused_fingerprints
    );
    Ok(ExitCode::Success)
}

/// `compare`: classify the target against a reference and report each file.
///
/// A loaded index without `--plugin` flags is compared with every feature
/// it carries that a registered plugin provides. `--save-index` writes the
/// reference index, built or loaded, before any target file is evaluated.
///
/// # Errors
///
/// Fatal errors only: unknown plugins, a missing feature, a corrupt index,
/// an unusable target or reference, or a failing writer. Per-file failures
/// are reported inline and yield [`ExitCode::PartialSuccess`].
pub fn compare(ctx: &AppContext, args: &CompareArgs, writer: &mut dyn Write) -> Result<ExitCode> {
    let requested = ctx.requested_plugins(&args.plugins);

    let (index, plugins) = match (&args.load_index, &args.reference) {
        (Some(path), _) => {
            let index = DirectoryIndex::load(path)?;
            let plugins = if requested.is_empty() {
                ctx.plugins_for(&index)
            } else {
                ctx.registry.select(&requested)?
            };
            index.require_features(&plugins)?;
            (index, plugins)
        }
        (None, Some(reference)) => {
            let plugins = ctx.registry.select(&requested)?;
            let index = DirectoryIndex::build(reference, &plugins, &ctx.build_options(&args.walk))?;
            (index, plugins)
        }
        (None, None) => anyhow::bail!("A reference directory or --load-index is required"),
    };
    if let Some(save) = &args.save_index {
        index.save(save)?;
        log::info!("Saved reference index to {}", save.display());
    }

    let mut config = EvaluatorConfig::default()
        .with_walker(ctx.walker_config(&args.walk))
        .with_shutdown_flag(ctx.token.flag());
    if args.rm {
        let delete = if args.trash || ctx.config.use_trash {
            DeleteConfig::trash()
        } else {
            DeleteConfig::permanent()
        };
        config = config.with_delete(delete);
    }

    let evaluator = Evaluator::new(Matcher::new(&index, &plugins), config);
    let reporter = match args.output {
        OutputFormat::Text => Reporter::Text(TextOutput::new(ctx.color)),
        OutputFormat::Json => Reporter::Json(JsonOutput::new()),
    };

    let mut summary = EvaluationSummary::default();
    for evaluation in evaluator.evaluate(&args.target)? {
        reporter.evaluation(writer, &evaluation)?;
        summary.record(&evaluation);
    }
    summary.interrupted = ctx.token.is_cancelled();

    let exit_code = ExitCode::from_summary(&summary);
    reporter.summary(writer, &summary, exit_code, ctx.quiet)?;
    writer.flush()?;
    Ok(exit_code)
}

/// `index-info`: describe a saved index.
///
/// # Errors
///
/// A corrupt or unreadable index, or a failing writer.
pub fn index_info(ctx: &AppContext, args: &IndexInfoArgs, writer: &mut dyn Write) -> Result<ExitCode> {
    let index = DirectoryIndex::load(&args.index)?;

    let features: Vec<String> = index
        .features()
        .iter()
        .map(|feature| match ctx.registry.get(feature) {
            Some(_) => feature.clone(),
            None => format!("{feature} (unavailable)"),
        })
        .collect();

    writeln!(writer, "Index:      {}", args.index.display())?;
    writeln!(writer, "Directory:  {}", index.root().display())?;
    writeln!(writer, "Indexed on: {}", index.indexed_on().to_rfc3339())?;
    writeln!(writer, "Files:      {}", index.len())?;
    writeln!(writer, "Total size: {}", ByteSize::b(index.total_size()))?;
    if features.is_empty() {
        writeln!(writer, "Features:   (none)")?;
    } else {
        writeln!(writer, "Features:   {}", features.join(", "))?;
    }
    Ok(ExitCode::Success)
}

/// `plugins`: list the registered plugins.
///
/// # Errors
///
/// A failing writer.
pub fn list_plugins(ctx: &AppContext, writer: &mut dyn Write) -> Result<ExitCode> {
    for plugin in ctx.registry.list() {
        writeln!(writer, "{:<16} {}", plugin.id(), plugin.description())?;
    }
    Ok(ExitCode::Success)
}
