//! DropSift: bulk file intake for uploads.
//!
//! Thin binary entry point. All logic lives in the `dropsift-core` crate;
//! this file parses arguments, wires logging and prints the result.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dropsift_core::analysis::{analyze_selection, format_duration, format_size};
use dropsift_core::progress::{HashProgress, WalkProgress};
use dropsift_core::render::UploadQueue;
use dropsift_core::report::{export_queue_csv, QueueCounts, RunSummary};
use dropsift_core::stall::StallDiagnostic;
use dropsift_core::{Pipeline, PipelineConfig, PipelineObserver};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "DropSift", version, about = "Sift a folder into an upload queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log at DEBUG instead of INFO.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Walk a folder, drop duplicates and print the upload queue summary.
    Scan {
        folder: PathBuf,

        /// JSON pipeline configuration; missing fields keep their defaults.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the queue to this CSV file.
        #[arg(long, value_name = "FILE")]
        export_csv: Option<PathBuf>,

        /// Print a JSON run summary instead of the text report.
        #[arg(long)]
        json: bool,

        /// Deduplicate on the main thread.
        #[arg(long)]
        no_worker: bool,
    },
}

/// Routes pipeline events into the log.
struct LogObserver;

impl PipelineObserver for LogObserver {
    fn on_walk_progress(&self, progress: &WalkProgress) {
        tracing::debug!(
            "walk: {} files after {} ms",
            progress.files_discovered,
            progress.elapsed_ms
        );
    }

    fn on_skipped_folder(&self, diagnostic: &StallDiagnostic) {
        tracing::warn!("{}", diagnostic.message);
    }

    fn on_hash_progress(&self, progress: &HashProgress) {
        tracing::debug!("hashing {}/{}: {}", progress.current, progress.total, progress.current_file);
    }

    fn on_hashing_failure(&self, path: &str, message: &str) {
        tracing::warn!("could not hash '{path}', kept as unique: {message}");
    }

    fn on_fallback(&self, reason: &str) {
        tracing::info!("worker unavailable, continued on the main thread: {reason}");
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays machine-readable.
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("DropSift starting");

    match cli.command {
        Command::Scan {
            folder,
            config,
            export_csv,
            json,
            no_worker,
        } => scan(folder, config, export_csv, json, no_worker),
    }
}

fn scan(
    folder: PathBuf,
    config_path: Option<PathBuf>,
    export_csv: Option<PathBuf>,
    json: bool,
    no_worker: bool,
) -> anyhow::Result<()> {
    if !folder.is_dir() {
        anyhow::bail!("'{}' is not a folder", folder.display());
    }

    let mut config = match &config_path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if no_worker {
        config.worker.enabled = false;
    }

    let pipeline = Pipeline::new(config).context("could not start the pipeline")?;
    let observer = LogObserver;

    let walked = pipeline.walk_selection(&folder, &observer);
    let walk_summary = walked.summary();
    let stalls = walked.diagnostics.clone();
    let analysis = analyze_selection(&walked.files);
    tracing::info!(
        "{} files ({}), {} duplicate candidates, estimated {}",
        analysis.total_files,
        format_size(analysis.total_bytes),
        analysis.duplicate_candidates,
        format_duration(analysis.estimate.total())
    );

    let outcome = pipeline
        .run_deduplication(walked.files, &observer)
        .context("deduplication failed")?;

    let mut queue = UploadQueue::new();
    pipeline.render(&outcome, &mut queue);
    let counts = QueueCounts::of(&queue);

    if let Some(path) = &export_csv {
        export_queue_csv(queue.items(), path)
            .with_context(|| format!("could not write '{}'", path.display()))?;
        tracing::info!("Queue written to '{}'", path.display());
    }

    if json {
        let summary = RunSummary {
            generated_at: chrono::Local::now(),
            root: folder.display().to_string(),
            strategy: pipeline.strategy_name(),
            walk: walk_summary,
            stalls,
            analysis,
            dedup: outcome.report,
            queue: counts,
            worker: pipeline.worker_record().map(|r| r.stats),
        };
        println!("{}", summary.to_json()?);
        return Ok(());
    }

    println!("Scanned     {}", folder.display());
    println!(
        "Found       {} files in {}",
        walk_summary.files,
        format_duration(std::time::Duration::from_millis(walk_summary.elapsed_ms))
    );
    for stall in &stalls {
        println!("Skipped     {}", stall.message);
    }
    if walk_summary.filtered > 0 {
        println!(
            "Filtered    {} files ({} hidden, {} system, {} temporary)",
            walk_summary.filtered,
            walk_summary.hidden_files,
            walk_summary.system_files,
            walk_summary.temporary_files
        );
    }
    if walk_summary.placeholders > 0 {
        println!("Cloud-only  {} placeholder files", walk_summary.placeholders);
    }
    println!(
        "Ready       {} files ({})",
        counts.ready,
        format_size(counts.ready_bytes)
    );
    println!(
        "Duplicate   {} files ({})",
        counts.duplicate,
        format_size(counts.duplicate_bytes)
    );
    if outcome.report.collapsed > 0 {
        println!("Collapsed   {} repeated selections", outcome.report.collapsed);
    }
    if !outcome.report.hash_failures.is_empty() {
        println!(
            "Unreadable  {} files kept as unique",
            outcome.report.hash_failures.len()
        );
    }
    println!(
        "Processed   on {} in {}",
        pipeline.strategy_name(),
        format_duration(outcome.report.timings.total)
    );
    Ok(())
}
