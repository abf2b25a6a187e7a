//! composer - builds per-organization composites from public e-file data

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Args, Parser, Subcommand};
use composer_common::config::{
    default_workers, load_toml_config, resolve_setting, DEFAULT_FIRST_YEAR,
    DEFAULT_MAX_LOCK_WAIT_MS, DEFAULT_SOURCE,
};
use composer_efile::{UpdateEfileState, UpdateSettings};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for composer
#[derive(Parser, Debug)]
#[command(name = "composer")]
#[command(about = "Compose per-organization documents from public e-file data")]
#[command(version)]
struct Cli {
    /// TOML config file (default: <config dir>/composer/composer.toml)
    #[arg(long, global = true, env = "COMPOSER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest new e-files and update composites
    Efile(EfileArgs),
}

#[derive(Args, Debug)]
struct EfileArgs {
    /// Data root holding state.sqlite and the composite tree
    data_path: Option<PathBuf>,

    /// Parent directory for scratch files (default: system temp dir)
    #[arg(long)]
    temp_path: Option<PathBuf>,

    /// Keep scratch directories after the run
    #[arg(long)]
    no_cleanup: bool,

    /// Object-store URL or local directory with listings and raw e-files
    #[arg(long)]
    source: Option<String>,

    /// First listing year to ingest
    #[arg(long)]
    first_year: Option<i32>,

    /// Last listing year to ingest (default: current year)
    #[arg(long)]
    last_year: Option<i32>,

    /// Worker count for each pipeline stage
    #[arg(long)]
    workers: Option<usize>,

    /// Concurrent downloads per fetch worker
    #[arg(long)]
    io_workers: Option<usize>,
}

fn resolve_settings(args: EfileArgs, toml: composer_common::config::TomlConfig) -> Result<UpdateSettings> {
    let data_root = match args.data_path {
        Some(path) => path,
        None => std::env::var("COMPOSER_DATA_PATH")
            .ok()
            .map(PathBuf::from)
            .or(toml.data_path)
            .context("No data path given (argument, COMPOSER_DATA_PATH or config data_path)")?,
    };
    let temp_root = match args.temp_path {
        Some(path) => path,
        None => std::env::var("COMPOSER_TEMP_PATH")
            .ok()
            .map(PathBuf::from)
            .or(toml.temp_path)
            .unwrap_or_else(std::env::temp_dir),
    };

    let current_year = chrono::Local::now().year();
    Ok(UpdateSettings {
        data_root,
        temp_root,
        no_cleanup: resolve_setting(
            args.no_cleanup.then_some(true),
            "COMPOSER_NO_CLEANUP",
            toml.no_cleanup,
            || false,
        )?,
        source: resolve_setting(args.source, "COMPOSER_SOURCE", toml.source, || {
            DEFAULT_SOURCE.to_string()
        })?,
        first_year: resolve_setting(args.first_year, "COMPOSER_FIRST_YEAR", toml.first_year, || {
            DEFAULT_FIRST_YEAR
        })?,
        last_year: resolve_setting(args.last_year, "COMPOSER_LAST_YEAR", toml.last_year, || {
            current_year
        })?,
        workers: resolve_setting(args.workers, "COMPOSER_WORKERS", toml.workers, default_workers)?,
        io_workers: resolve_setting(args.io_workers, "COMPOSER_IO_WORKERS", toml.io_workers, || 5)?,
        max_lock_wait_ms: resolve_setting(
            None,
            "COMPOSER_MAX_LOCK_WAIT_MS",
            toml.max_lock_wait_ms,
            || DEFAULT_MAX_LOCK_WAIT_MS,
        )?,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let toml = load_toml_config(cli.config.as_deref())
        .context("Failed to load config file")?
        .unwrap_or_default();

    let default_filter = toml
        .logging
        .level
        .clone()
        .unwrap_or_else(|| "composer=info,composer_efile=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Efile(args) => {
            let settings = resolve_settings(args, toml)?;
            info!(
                data_root = %settings.data_root.display(),
                temp_root = %settings.temp_root.display(),
                workers = settings.workers,
                io_workers = settings.io_workers,
                "Starting e-file update"
            );

            let summary = UpdateEfileState::new(settings)
                .context("Failed to set up e-file update")?
                .run()
                .await
                .context("E-file update failed")?;

            info!(
                listings = summary.ingest.years_read,
                changes = summary.changes,
                superseded = summary.superseded,
                composites = summary.composites,
                "E-file update complete"
            );
        }
    }

    Ok(())
}
