use anyhow::{Context, Result};
use clap::Parser;
use pgsafesync::api::{sync, SyncOptions};
use pgsafesync::config::{load_config, DEFAULT_CONFIG_FILE, DEFAULT_ENVIRONMENT};
use pgsafesync::logging::{init_logging, log_file_path};
use pgsafesync::report::{generate_text_report, RunReport};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pgsafesync")]
#[command(about = "Apply the additive part of a PostgreSQL schema comparison, safely", long_about = None)]
struct Cli {
    /// Schema comparison document (JSON)
    diff: PathBuf,

    /// Describe the plan without connecting to the database (default)
    #[arg(long, conflicts_with = "apply")]
    dry_run: bool,

    /// Execute the plan against the target environment
    #[arg(long)]
    apply: bool,

    /// Target environment defined in the config file
    #[arg(long, env = "PGSAFESYNC_ENVIRONMENT", default_value = DEFAULT_ENVIRONMENT)]
    environment: String,

    #[arg(long, env = "PGSAFESYNC_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Source-schema companion with full column lists for new tables
    #[arg(long)]
    source_schema: Option<PathBuf>,

    /// Skip the pre-apply backup
    #[arg(long)]
    no_backup: bool,

    #[arg(long)]
    no_indexes: bool,

    #[arg(long)]
    no_constraints: bool,

    #[arg(long)]
    no_sequences: bool,

    /// Proceed even when safety validation reports errors
    #[arg(long)]
    force: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let log_path = log_file_path(&config.output.log_directory, &cli.environment, &stamp);
    init_logging(Some(&log_path), cli.verbose)
        .with_context(|| format!("Failed to open run log {}", log_path.display()))?;

    let mut options = SyncOptions::new(&cli.diff)
        .with_environment(&cli.environment)
        .with_config(config)
        .with_log_path(&log_path);
    if cli.apply {
        options = options.apply();
    }
    if let Some(path) = cli.source_schema {
        options = options.with_source_schema(path);
    }
    if cli.no_backup {
        options = options.without_backup();
    }
    if cli.no_indexes {
        options = options.without_indexes();
    }
    if cli.no_constraints {
        options = options.without_constraints();
    }
    if cli.no_sequences {
        options = options.without_sequences();
    }
    if cli.force {
        options = options.force();
    }

    match sync(options).await {
        Ok(report) => {
            print_report(&report, cli.json)?;
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(failure) => {
            print_report(&failure.report, cli.json)?;
            eprintln!("Error: {}", failure.error);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", generate_text_report(report));
    }
    Ok(())
}
