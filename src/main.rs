use clap::{CommandFactory, Parser, error::ErrorKind};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::{str::FromStr, sync::Arc};
use tokio::fs;
use tracing_subscriber::EnvFilter;

use crate::{
    cli::Command,
    config::{AppConfig, Args},
    errors::{FilesError, FilesResult},
    services::FileService,
};

mod cli;
mod config;
mod errors;
mod handlers;
mod models;
mod services;

const USAGE_EXIT_CODE: i32 = -1;

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                let _ = err.print();
                std::process::exit(USAGE_EXIT_CODE);
            }
        },
    };

    // --- Logging setup (stderr, so `get -` output stays clean) ---
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(AppConfig::log_filter(args.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // --- Parse config ---
    let cfg = match AppConfig::from_env_and_args(&args) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("ERROR: {:#}", err);
            std::process::exit(USAGE_EXIT_CODE);
        }
    };
    tracing::debug!("Starting files with config: {:?}", cfg);

    let code = match run(cfg, args).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("ERROR: {}", err);
            if err.is_usage() {
                eprintln!();
                eprintln!("{}", Args::command().render_help());
            }
            err.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cfg: AppConfig, args: Args) -> FilesResult<()> {
    let command = Command::from_args(args, cfg.default_chunk_size)?;

    let db = Arc::new(connect(&cfg.database_url).await?);
    let service = FileService::open(db, &cfg.prefix).await?;
    tracing::debug!(
        "using collections \"{0}.files\" / \"{0}.chunks\"",
        service.store.collections().prefix()
    );

    let mut out = tokio::io::stdout();
    cli::dispatch(&service, command, &mut out).await
}

/// Open the SQLite database, creating its file and parent directory if needed.
async fn connect(database_url: &str) -> FilesResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let db_path = options.get_filename().to_path_buf();
    tracing::debug!("Interpreted SQLite path => {}", db_path.display());
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !fs::try_exists(parent).await? {
            fs::create_dir_all(parent).await?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(FilesError::from)
}
