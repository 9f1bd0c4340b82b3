//! # rookery-cli
//!
//! Binary entry point for Rookery.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Configuration loading and command-line overrides
//! - Single-record (`rookery run`) and batch (`rookery batch`) entry points
//! - Run history viewing via `rookery history`

mod report;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use report::colors;
use rookery_adapters::{build_stages, record_source};
use rookery_core::{BatchRunner, RecordSelection, RookeryConfig, RunHistory, SummaryWriter};
use rookery_proto::InputRecord;
use std::io::{IsTerminal, stdout};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Color output mode for terminal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    /// Returns true if colors should be used based on mode and terminal detection.
    fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

/// Output format for the history command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for programmatic access
    Json,
}

/// Status filter for the history command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusFilter {
    Completed,
    Failed,
}

/// Rookery - research, write, illustrate, publish and commit posts
#[derive(Parser, Debug)]
#[command(name = "rookery", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "rookery.yml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline for a single record
    Run(RunArgs),

    /// Run the pipeline for many records
    Batch(BatchArgs),

    /// View run history
    History(HistoryArgs),
}

/// Settings that override the configuration file.
#[derive(Args, Debug, Default)]
struct OverrideArgs {
    /// Override retries per gated stage
    #[arg(long)]
    max_retries: Option<u32>,

    /// Override how many records run at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Override the directory posts are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Skip the commit stage
    #[arg(long)]
    no_commit: bool,

    /// Skip the illustrate stage
    #[arg(long)]
    no_illustrate: bool,

    /// Show the effective configuration and selected records without running
    #[arg(long)]
    dry_run: bool,
}

/// Arguments for the run subcommand.
#[derive(Parser, Debug)]
struct RunArgs {
    /// Date to write about (YYYY-MM-DD). Defaults to today.
    #[arg(long, conflicts_with = "file")]
    date: Option<String>,

    /// Data file to write about, relative to the research data directory
    #[arg(long, conflicts_with = "date")]
    file: Option<String>,

    #[command(flatten)]
    overrides: OverrideArgs,
}

/// Arguments for the batch subcommand.
#[derive(Parser, Debug)]
struct BatchArgs {
    /// Process every data file in the research data directory
    #[arg(long, conflicts_with = "records")]
    all: bool,

    /// Records to process: dates (YYYY-MM-DD) or data file names
    #[arg(required_unless_present = "all")]
    records: Vec<String>,

    #[command(flatten)]
    overrides: OverrideArgs,
}

/// Arguments for the history subcommand.
#[derive(Parser, Debug)]
struct HistoryArgs {
    /// Show only the last N runs
    #[arg(long)]
    last: Option<usize>,

    /// Show only runs with this status
    #[arg(long, value_enum)]
    status: Option<StatusFilter>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Path to history file (default: batch.history_file from config)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Clear the run history
    #[arg(long)]
    clear: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    let use_colors = cli.color.should_use_colors();
    let exit_code = match cli.command {
        Commands::Run(args) => {
            let record = single_record(args.date.as_deref(), args.file.as_deref())?;
            let config = prepared_config(&cli.config, &args.overrides)?;
            execute(
                config,
                RecordSelection::Explicit(vec![record]),
                args.overrides.dry_run,
                use_colors,
            )
            .await?
        }
        Commands::Batch(args) => {
            let config = prepared_config(&cli.config, &args.overrides)?;
            let selection = if args.all {
                RecordSelection::DiscoverAll
            } else {
                RecordSelection::Explicit(args.records.iter().map(|r| InputRecord::parse(r)).collect())
            };
            execute(config, selection, args.overrides.dry_run, use_colors).await?
        }
        Commands::History(args) => {
            let config = load_config(&cli.config)?;
            history_command(&config, use_colors, args)?;
            0
        }
    };

    // Use explicit exit for non-zero codes to ensure proper exit status
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Resolves `run`'s record: an explicit date, a data file, or today.
fn single_record(date: Option<&str>, file: Option<&str>) -> Result<InputRecord> {
    match (date, file) {
        (Some(date), _) => {
            let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .with_context(|| format!("Invalid --date '{date}', expected YYYY-MM-DD"))?;
            Ok(InputRecord::Date(date))
        }
        (None, Some(file)) => {
            if file.trim().is_empty() {
                bail!("--file must not be empty");
            }
            Ok(InputRecord::File(file.trim().to_string()))
        }
        (None, None) => Ok(InputRecord::Date(Local::now().date_naive())),
    }
}

/// Loads the configuration file, falling back to defaults when it is absent.
fn load_config(path: &Path) -> Result<RookeryConfig> {
    if path.exists() {
        RookeryConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))
    } else {
        warn!("Config file {} not found, using defaults", path.display());
        Ok(RookeryConfig::default())
    }
}

/// Loads the configuration and applies command-line overrides.
fn prepared_config(path: &Path, overrides: &OverrideArgs) -> Result<RookeryConfig> {
    let mut config = load_config(path)?;
    apply_overrides(&mut config, overrides);
    Ok(config)
}

fn apply_overrides(config: &mut RookeryConfig, overrides: &OverrideArgs) {
    if let Some(max_retries) = overrides.max_retries {
        config.workflow.max_retries = max_retries;
    }
    if let Some(concurrency) = overrides.concurrency {
        config.batch.concurrency = concurrency;
    }
    if let Some(dir) = &overrides.output_dir {
        config.publisher.output_dir = dir.display().to_string();
    }
    if overrides.no_commit {
        config.committer.enabled = false;
    }
    if overrides.no_illustrate {
        config.illustrator.enabled = false;
    }
}

/// Validates the configuration, runs the selection and reports the outcome.
///
/// Returns the process exit code.
async fn execute(
    config: RookeryConfig,
    selection: RecordSelection,
    dry_run: bool,
    use_colors: bool,
) -> Result<i32> {
    let warnings = config.validate().context("Configuration validation failed")?;
    for warning in &warnings {
        eprintln!("{warning}");
    }

    if dry_run {
        print_dry_run(&config, &selection, warnings.len()).await?;
        return Ok(0);
    }

    let stages = build_stages(&config).context("Failed to set up pipeline stages")?;
    let runner = BatchRunner::from_config(&config, stages)?;
    let source = record_source(&config);
    let result = runner
        .run_selection(selection, source.as_ref())
        .await
        .context("Failed to list records")?;

    report::print_report(&result, use_colors);

    let history = RunHistory::new(&config.batch.history_file);
    if let Err(e) = history.append_batch(&result) {
        warn!(path = %history.path().display(), error = %e, "Could not record run history");
    }
    if let Some(path) = &config.batch.summary_file {
        let writer = SummaryWriter::new(path);
        match writer.write(&result) {
            Ok(()) => info!(path = %writer.path().display(), "Wrote batch summary"),
            Err(e) => warn!(path = %writer.path().display(), error = %e, "Could not write batch summary"),
        }
    }

    Ok(result.exit_code())
}

async fn print_dry_run(
    config: &RookeryConfig,
    selection: &RecordSelection,
    warning_count: usize,
) -> Result<()> {
    println!("Dry run mode - configuration:");
    println!("  Data dir: {}", config.research.data_dir);
    println!("  Writer: {}", config.writer.backend);
    println!(
        "  Illustrator: {}",
        if config.illustrator.enabled { "enabled" } else { "disabled" }
    );
    println!("  Output dir: {}", config.publisher.output_dir);
    match (&config.committer.enabled, &config.committer.repo_dir) {
        (true, Some(repo)) => println!(
            "  Commit: {repo} ({} -> {}/{}{})",
            config.committer.content_dir,
            config.committer.remote,
            config.committer.branch,
            if config.committer.push { ", push" } else { "" }
        ),
        _ => println!("  Commit: disabled"),
    }
    println!("  Max retries: {}", config.workflow.max_retries);
    println!("  Stage timeout: {}s", config.workflow.stage_timeout_seconds);
    println!("  Concurrency: {}", config.batch.concurrency);
    if warning_count > 0 {
        println!("  Warnings: {warning_count}");
    }

    let records = match selection {
        RecordSelection::Explicit(records) => records.clone(),
        RecordSelection::DiscoverAll => record_source(config)
            .list_records()
            .await
            .context("Failed to list records")?,
    };
    println!("  Records ({}):", records.len());
    for record in &records {
        println!("    - {record}");
    }
    Ok(())
}

fn history_command(config: &RookeryConfig, use_colors: bool, args: HistoryArgs) -> Result<()> {
    let history = match args.file {
        Some(path) => RunHistory::new(path),
        None => RunHistory::new(&config.batch.history_file),
    };
    debug!(path = %history.path().display(), "Reading run history");

    if args.clear {
        history.clear()?;
        if use_colors {
            println!("{}✓{} Run history cleared", colors::GREEN, colors::RESET);
        } else {
            println!("Run history cleared");
        }
        return Ok(());
    }

    if !history.exists() {
        if use_colors {
            println!(
                "{}No run history found.{} Run `rookery run` to record runs.",
                colors::DIM,
                colors::RESET
            );
        } else {
            println!("No run history found. Run `rookery run` to record runs.");
        }
        return Ok(());
    }

    let mut records = history.read_all()?;

    if let Some(status) = args.status {
        records.retain(|r| r.is_failure() == (status == StatusFilter::Failed));
    }

    // Apply 'last' after filtering to get the last N matching runs
    if let Some(n) = args.last
        && records.len() > n
    {
        records = records.split_off(records.len() - n);
    }

    if records.is_empty() {
        if use_colors {
            println!("{}No matching runs found.{}", colors::DIM, colors::RESET);
        } else {
            println!("No matching runs found.");
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&records)?;
            println!("{json}");
        }
        OutputFormat::Table => report::print_history_table(&records, use_colors),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_batch_records() {
        let cli = Cli::try_parse_from([
            "rookery",
            "batch",
            "2026-02-01",
            "cam-1.csv",
            "--concurrency",
            "4",
            "--no-commit",
        ])
        .unwrap();
        let Commands::Batch(args) = cli.command else {
            panic!("expected batch");
        };
        assert!(!args.all);
        assert_eq!(args.records, vec!["2026-02-01", "cam-1.csv"]);
        assert_eq!(args.overrides.concurrency, Some(4));
        assert!(args.overrides.no_commit);
    }

    #[test]
    fn test_batch_requires_records_or_all() {
        assert!(Cli::try_parse_from(["rookery", "batch"]).is_err());
        assert!(Cli::try_parse_from(["rookery", "batch", "--all", "2026-02-01"]).is_err());
        assert!(Cli::try_parse_from(["rookery", "batch", "--all"]).is_ok());
    }

    #[test]
    fn test_run_date_and_file_conflict() {
        assert!(
            Cli::try_parse_from(["rookery", "run", "--date", "2026-02-01", "--file", "a.json"])
                .is_err()
        );
    }

    #[test]
    fn test_single_record() {
        assert_eq!(
            single_record(Some("2026-02-01"), None).unwrap(),
            InputRecord::parse("2026-02-01")
        );
        assert_eq!(
            single_record(None, Some("cam-1.csv")).unwrap(),
            InputRecord::File("cam-1.csv".to_string())
        );
        assert!(single_record(Some("02/01/2026"), None).is_err());
        assert!(matches!(
            single_record(None, None).unwrap(),
            InputRecord::Date(_)
        ));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = RookeryConfig::parse_yaml(
            "workflow:\n  max_retries: 5\nillustrator:\n  enabled: true\n  command: draw\n",
        )
        .unwrap();
        apply_overrides(
            &mut config,
            &OverrideArgs {
                max_retries: Some(0),
                output_dir: Some(PathBuf::from("out")),
                no_illustrate: true,
                ..Default::default()
            },
        );
        assert_eq!(config.workflow.max_retries, 0);
        assert_eq!(config.publisher.output_dir, "out");
        assert!(!config.illustrator.enabled);
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.yml")).unwrap();
        assert_eq!(config.batch.concurrency, 1);
    }
}
