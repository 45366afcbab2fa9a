use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::env;

use crate::services::collections::DEFAULT_PREFIX;

const EXTRA_HELP: &str = "\
Browse and modify a chunked file store.

commands:
  list    list all files. 'name' is an optional prefix which listed
          filenames must begin with (matched literally).
  search  search all files. 'name' is a substring which listed filenames
          must contain (glob syntax such as * and ? is honoured).
  put     add a file with filename 'name'.
  get     get a file with filename 'name'.
  delete  delete all files with filename 'name'.

exit codes:
  0 success, -1 usage error, -2 file not found, -3 invalid chunk size,
  -4 corrupt file, -5 store or local I/O failure.";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub prefix: String,
    pub default_chunk_size: Option<i64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CommandKind {
    List,
    Search,
    Put,
    Get,
    Delete,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(
    name = "files",
    author,
    version,
    about = "Store and retrieve files as fixed-size chunks",
    after_help = EXTRA_HELP
)]
pub struct Args {
    /// Command to run
    #[arg(value_enum)]
    pub command: Option<CommandKind>,

    /// Stored filename for put|get|delete, prefix for list, substring for search
    pub name: Option<String>,

    /// Local filename for put|get (default is the stored filename, '-' for stdin/stdout)
    #[arg(short, long)]
    pub local: Option<String>,

    /// MIME type recorded on put (default is to omit)
    #[arg(short = 't', long = "type")]
    pub content_type: Option<String>,

    /// Remove other files with the same name after put
    #[arg(short, long)]
    pub replace: bool,

    /// Chunk size in bytes for put (0 selects the default; overrides FILES_CHUNK_SIZE)
    #[arg(short = 's', long, allow_negative_numbers = true)]
    pub chunk_size: Option<i64>,

    /// Database URL (overrides FILES_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Collection prefix; files live in "<prefix>.files" and "<prefix>.chunks" (overrides FILES_PREFIX)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl AppConfig {
    /// Merge parsed CLI args over environment variables over defaults.
    pub fn from_env_and_args(args: &Args) -> Result<Self> {
        let env_db = env::var("FILES_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/files.db".into());
        let env_prefix = env::var("FILES_PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.into());
        let env_chunk_size = match env::var("FILES_CHUNK_SIZE") {
            Ok(value) => Some(
                value
                    .parse::<i64>()
                    .with_context(|| format!("parsing FILES_CHUNK_SIZE value `{}`", value))?,
            ),
            Err(env::VarError::NotPresent) => None,
            Err(err) => return Err(err).context("reading FILES_CHUNK_SIZE"),
        };

        Ok(Self {
            database_url: args.database_url.clone().unwrap_or(env_db),
            prefix: args.prefix.clone().unwrap_or(env_prefix),
            default_chunk_size: env_chunk_size,
        })
    }

    pub fn log_filter(verbose: bool) -> &'static str {
        if verbose { "files=debug" } else { "files=warn" }
    }
}
