//! One handler per command. Handlers delegate storage concerns to
//! `FileService` and write their human-readable report to `out`; payloads
//! stream chunk by chunk and are never buffered whole.

use crate::{
    cli::{GetOptions, PutOptions},
    errors::{FilesError, FilesResult},
    models::metadata::ObjectMetadata,
    services::{FileService, local_fs},
};
use futures::{Stream, TryStreamExt, pin_mut};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;

/// `list [prefix]`
pub async fn list_files<W>(service: &FileService, prefix: Option<&str>, out: &mut W) -> FilesResult<()>
where
    W: AsyncWrite + Unpin,
{
    let rows = display(service.catalog.list_prefix(prefix), out).await?;
    info!("listed {} file(s) with prefix {:?}", rows, prefix);
    Ok(())
}

/// `search <substring>`
pub async fn search_files<W>(service: &FileService, needle: &str, out: &mut W) -> FilesResult<()>
where
    W: AsyncWrite + Unpin,
{
    if needle.is_empty() {
        return Err(FilesError::MissingArgument("a filename"));
    }
    let rows = display(service.catalog.search_substring(needle), out).await?;
    info!("search for {:?} matched {} file(s)", needle, rows);
    Ok(())
}

/// `put <name>`: store, optionally replacing older files with the same name.
pub async fn put_file<W>(service: &FileService, opts: PutOptions, out: &mut W) -> FilesResult<()>
where
    W: AsyncWrite + Unpin,
{
    if opts.filename.is_empty() {
        return Err(FilesError::MissingArgument("a filename"));
    }
    let source = local_fs::open_for_read(&opts.local).await?;

    if opts.replace {
        let outcome = service
            .replacer
            .store_and_replace(source, &opts.filename, opts.content_type, opts.chunk_size)
            .await?;
        report(out, "added file", &outcome.stored).await?;
        for removed in &outcome.removed {
            report(out, "removed file", removed).await?;
        }
    } else {
        let stored = service
            .store
            .store_file(source, &opts.filename, opts.content_type, opts.chunk_size)
            .await?;
        report(out, "added file", &stored).await?;
    }

    out.write_all(b"done!\n").await?;
    out.flush().await?;
    Ok(())
}

/// `get <name>`: newest file with that name, to `--local` or its own name.
pub async fn get_file<W>(service: &FileService, opts: GetOptions, out: &mut W) -> FilesResult<()>
where
    W: AsyncWrite + Unpin,
{
    if opts.filename.is_empty() {
        return Err(FilesError::MissingArgument("a filename"));
    }
    let meta = service
        .store
        .find_file(&opts.filename)
        .await?
        .ok_or_else(|| FilesError::NotFound(opts.filename.clone()))?;

    let dest = opts.local.unwrap_or_else(|| meta.filename.clone());
    let written = service.store.write_to_local(&meta, &dest).await?;
    info!("wrote {} bytes of {} to {}", written, meta.id, dest);

    if dest != local_fs::STDIO_PATH {
        out.write_all(format!("done write to: {}\n", dest).as_bytes())
            .await?;
        out.flush().await?;
    }
    Ok(())
}

/// `delete <name>`: every file with that name.
pub async fn delete_file<W>(service: &FileService, filename: &str, out: &mut W) -> FilesResult<()>
where
    W: AsyncWrite + Unpin,
{
    if filename.is_empty() {
        return Err(FilesError::MissingArgument("a filename"));
    }
    service.store.remove_file(filename).await?;
    out.write_all(b"done!\n").await?;
    out.flush().await?;
    Ok(())
}

/// Print `filename<TAB>length` per row; returns the row count.
async fn display<S, W>(rows: S, out: &mut W) -> FilesResult<u64>
where
    S: Stream<Item = FilesResult<ObjectMetadata>>,
    W: AsyncWrite + Unpin,
{
    pin_mut!(rows);
    let mut count = 0;
    while let Some(meta) = rows.try_next().await? {
        out.write_all(meta.display_line().as_bytes()).await?;
        count += 1;
    }
    out.flush().await?;
    Ok(count)
}

async fn report<W>(out: &mut W, label: &str, meta: &ObjectMetadata) -> FilesResult<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(meta).map_err(io::Error::from)?;
    out.write_all(format!("{}: {}\n", label, json).as_bytes())
        .await?;
    Ok(())
}
