//! Local side of `put` and `get`: turns a path into a byte source or sink.
//!
//! The path `-` stands for stdin on read and stdout on write. File sinks write
//! to a hidden temporary sibling and only replace the destination on
//! `commit`, so an aborted download never leaves a truncated file behind.

use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
};
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
};
use tracing::debug;
use uuid::Uuid;

pub const STDIO_PATH: &str = "-";

pub type LocalSource = Pin<Box<dyn AsyncRead + Send>>;

pub async fn open_for_read(path: &str) -> io::Result<LocalSource> {
    if path == STDIO_PATH {
        return Ok(Box::pin(BufReader::new(tokio::io::stdin())));
    }
    let file = File::open(path).await?;
    Ok(Box::pin(BufReader::new(file)))
}

pub enum LocalSink {
    Stdout(tokio::io::Stdout),
    File {
        file: File,
        tmp_path: PathBuf,
        dest: PathBuf,
    },
}

impl LocalSink {
    pub async fn open_for_write(path: &str) -> io::Result<Self> {
        if path == STDIO_PATH {
            return Ok(Self::Stdout(tokio::io::stdout()));
        }

        let dest = PathBuf::from(path);
        let parent = dest.parent().map(Path::to_path_buf).unwrap_or_default();
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let file = File::create(&tmp_path).await?;
        debug!("writing {} via {}", dest.display(), tmp_path.display());
        Ok(Self::File {
            file,
            tmp_path,
            dest,
        })
    }

    pub fn writer(&mut self) -> &mut (dyn AsyncWrite + Unpin + Send) {
        match self {
            Self::Stdout(stdout) => stdout,
            Self::File { file, .. } => file,
        }
    }

    /// Flush everything and move the temporary file into place.
    pub async fn commit(self) -> io::Result<()> {
        match self {
            Self::Stdout(mut stdout) => stdout.flush().await,
            Self::File {
                mut file,
                tmp_path,
                dest,
            } => {
                let synced = async {
                    file.flush().await?;
                    file.sync_all().await
                }
                .await;
                drop(file);
                if let Err(err) = synced {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(err);
                }
                if let Err(err) = fs::rename(&tmp_path, &dest).await {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(err);
                }
                Ok(())
            }
        }
    }

    /// Drop whatever was written so far. Stdout output cannot be taken back.
    pub async fn abort(self) {
        if let Self::File { file, tmp_path, .. } = self {
            drop(file);
            if let Err(err) = fs::remove_file(&tmp_path).await {
                debug!("failed to remove {}: {}", tmp_path.display(), err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn commit_moves_tmp_into_place() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");

        let mut sink = LocalSink::open_for_write(dest.to_str().unwrap()).await.unwrap();
        assert!(matches!(sink, LocalSink::File { .. }));
        sink.writer().write_all(b"hello").await.unwrap();
        sink.commit().await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
        assert_eq!(leftovers(dir.path()), vec!["out.bin".to_string()]);
    }

    #[tokio::test]
    async fn abort_leaves_destination_untouched() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        std::fs::write(&dest, b"previous").unwrap();

        let mut sink = LocalSink::open_for_write(dest.to_str().unwrap()).await.unwrap();
        sink.writer().write_all(b"partial").await.unwrap();
        sink.abort().await;

        assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
        assert_eq!(leftovers(dir.path()), vec!["out.bin".to_string()]);
    }

    #[tokio::test]
    async fn reads_local_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in.bin");
        std::fs::write(&src, b"payload").unwrap();

        let mut source = open_for_read(src.to_str().unwrap()).await.unwrap();
        let mut buf = Vec::new();
        source.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"payload");
    }

    #[tokio::test]
    async fn missing_source_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("nope");
        let err = open_for_read(src.to_str().unwrap()).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn dash_means_stdout() {
        let sink = LocalSink::open_for_write(STDIO_PATH).await.unwrap();
        assert!(matches!(sink, LocalSink::Stdout(_)));
    }
}
