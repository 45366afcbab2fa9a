use std::io;
use thiserror::Error;
use uuid::Uuid;

/// Every failure a `files` command can end with.
///
/// Each variant belongs to an exit-code class so scripts can branch on the
/// cause without parsing stderr.
#[derive(Debug, Error)]
pub enum FilesError {
    #[error("need {0}")]
    MissingArgument(&'static str),
    #[error("prefix `{0}` invalid: only ASCII letters, digits, '_' and '-' are allowed")]
    InvalidNamespace(String),
    #[error("{reason}: {value}")]
    InvalidChunkSize { value: i64, reason: &'static str },
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("object {id} is corrupt: {detail}")]
    CorruptObject { id: Uuid, detail: String },
    #[error(transparent)]
    StoreUnavailable(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type FilesResult<T> = Result<T, FilesError>;

impl FilesError {
    pub fn corrupt(id: Uuid, detail: impl Into<String>) -> Self {
        Self::CorruptObject {
            id,
            detail: detail.into(),
        }
    }

    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingArgument(_) | Self::InvalidNamespace(_) => -1,
            Self::NotFound(_) => -2,
            Self::InvalidChunkSize { .. } => -3,
            Self::CorruptObject { .. } => -4,
            Self::StoreUnavailable(_) | Self::Io(_) => -5,
        }
    }

    /// Usage-class errors are reported together with the help text.
    pub fn is_usage(&self) -> bool {
        self.exit_code() == -1
    }
}
