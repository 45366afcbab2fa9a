use crate::{
    config::{Args, CommandKind},
    errors::{FilesError, FilesResult},
    handlers::file_handlers::{delete_file, get_file, list_files, put_file, search_files},
    models::chunk::ChunkSize,
    services::FileService,
};
use tokio::io::AsyncWrite;

/// Everything `put` needs, resolved and validated up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub filename: String,
    /// Local source path; `-` reads stdin.
    pub local: String,
    pub content_type: Option<String>,
    pub chunk_size: ChunkSize,
    pub replace: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOptions {
    pub filename: String,
    /// Local destination; `None` means the stored filename, `-` means stdout.
    pub local: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List { prefix: Option<String> },
    Search { needle: String },
    Put(PutOptions),
    Get(GetOptions),
    Delete { filename: String },
}

impl Command {
    /// Validate parsed arguments into a command.
    ///
    /// `default_chunk_size` applies when `--chunk-size` is absent. Every
    /// command but `list` requires a non-empty name.
    pub fn from_args(args: Args, default_chunk_size: Option<i64>) -> FilesResult<Self> {
        let kind = args.command.ok_or(FilesError::MissingArgument("command"))?;
        let name = args.name.filter(|name| !name.is_empty());
        let required = |name: Option<String>| name.ok_or(FilesError::MissingArgument("a filename"));

        let command = match kind {
            CommandKind::List => Command::List { prefix: name },
            CommandKind::Search => Command::Search {
                needle: required(name)?,
            },
            CommandKind::Put => {
                let filename = required(name)?;
                Command::Put(PutOptions {
                    local: args.local.unwrap_or_else(|| filename.clone()),
                    filename,
                    content_type: args.content_type,
                    chunk_size: ChunkSize::from_option(args.chunk_size.or(default_chunk_size))?,
                    replace: args.replace,
                })
            }
            CommandKind::Get => Command::Get(GetOptions {
                filename: required(name)?,
                local: args.local,
            }),
            CommandKind::Delete => Command::Delete {
                filename: required(name)?,
            },
        };
        Ok(command)
    }
}

/// Run `command` to completion, writing its report to `out`.
pub async fn dispatch<W>(service: &FileService, command: Command, out: &mut W) -> FilesResult<()>
where
    W: AsyncWrite + Unpin,
{
    match command {
        Command::List { prefix } => list_files(service, prefix.as_deref(), out).await,
        Command::Search { needle } => search_files(service, &needle, out).await,
        Command::Put(opts) => put_file(service, opts, out).await,
        Command::Get(opts) => get_file(service, opts, out).await,
        Command::Delete { filename } => delete_file(service, &filename, out).await,
    }
}
