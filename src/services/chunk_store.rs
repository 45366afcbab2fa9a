//! src/services/chunk_store.rs
//!
//! ChunkStore — splits payloads into fixed-size chunks on the way in and
//! reassembles them on the way out. Chunks are always written before the
//! metadata record and the metadata record is always removed before the
//! chunks, so a file is visible exactly when its metadata row exists. Writes
//! are not atomic as a group; a crash mid-put leaves unreferenced chunks.

use crate::{
    errors::{FilesError, FilesResult},
    models::{
        chunk::{Chunk, ChunkSize},
        metadata::ObjectMetadata,
    },
    services::{
        collections::{Collections, FileFilter},
        local_fs::LocalSink,
    },
};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, TryStreamExt, pin_mut};
use md5::Context;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct ChunkStore {
    collections: Collections,
}

struct ReadState {
    n: i64,
    read: i64,
    digest: Context,
    laid_out: bool,
}

impl ChunkStore {
    pub fn new(collections: Collections) -> Self {
        Self { collections }
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    /// Split `source` into `chunk_size` pieces and store it under `filename`.
    ///
    /// At most one chunk is held in memory. Length and MD5 are computed while
    /// streaming and recorded in the metadata row, which is inserted last.
    /// If reading or a chunk insert fails, the chunks written so far are
    /// removed best-effort before the error is returned.
    pub async fn store_file<R>(
        &self,
        source: R,
        filename: &str,
        content_type: Option<String>,
        chunk_size: ChunkSize,
    ) -> FilesResult<ObjectMetadata>
    where
        R: AsyncRead + Unpin,
    {
        let id = Uuid::new_v4();
        let written = self.write_chunks(id, source, chunk_size).await;
        let (length, digest) = match written {
            Ok(done) => done,
            Err(err) => {
                self.discard_chunks(id).await;
                return Err(err);
            }
        };

        let meta = ObjectMetadata {
            id,
            filename: filename.to_string(),
            length,
            chunk_size: chunk_size.bytes(),
            content_type: content_type.filter(|t| !t.is_empty()),
            upload_date: Utc::now(),
            md5: format!("{:x}", digest.compute()),
        };
        if let Err(err) = self.collections.insert_file(&meta).await {
            self.discard_chunks(id).await;
            return Err(err);
        }

        info!(
            "stored `{}` as {} ({} bytes, {} chunks)",
            meta.filename,
            meta.id,
            meta.length,
            meta.num_chunks()
        );
        Ok(meta)
    }

    async fn write_chunks<R>(
        &self,
        id: Uuid,
        mut source: R,
        chunk_size: ChunkSize,
    ) -> FilesResult<(i64, Context)>
    where
        R: AsyncRead + Unpin,
    {
        let limit = chunk_size.bytes() as u64;
        let mut digest = Context::new();
        let mut length: i64 = 0;
        let mut n: i64 = 0;

        loop {
            let mut data = Vec::new();
            (&mut source).take(limit).read_to_end(&mut data).await?;
            if data.is_empty() {
                break;
            }

            let short = (data.len() as u64) < limit;
            length += data.len() as i64;
            digest.consume(&data);
            debug!("writing chunk {} of {} ({} bytes)", n, id, data.len());
            self.collections
                .insert_chunk(&Chunk {
                    files_id: id,
                    n,
                    data,
                })
                .await?;
            n += 1;

            if short {
                break;
            }
        }

        Ok((length, digest))
    }

    async fn discard_chunks(&self, id: Uuid) {
        match self.collections.remove_chunks(id).await {
            Ok(removed) => debug!("discarded {} chunks of unfinished {}", removed, id),
            Err(err) => warn!("failed to discard chunks of unfinished {}: {}", id, err),
        }
    }

    /// Exact-name lookup. When several files share the name, the most
    /// recently uploaded one wins (ties broken by insertion order).
    pub async fn find_file(&self, filename: &str) -> FilesResult<Option<ObjectMetadata>> {
        self.collections.find_latest(filename).await
    }

    /// Lazily yield the payload of `meta` chunk by chunk, in sequence order.
    ///
    /// Before the first byte is yielded the chunk layout is checked against
    /// `meta`, so a gap, an oversized or short chunk or a length mismatch
    /// fails with `CorruptObject` without emitting any payload. Only a
    /// checksum mismatch is reported after the last chunk. Calling it again
    /// starts a fresh read from chunk 0.
    pub fn read_file<'a>(
        &'a self,
        meta: &'a ObjectMetadata,
    ) -> impl Stream<Item = FilesResult<Bytes>> + 'a {
        let state = ReadState {
            n: 0,
            read: 0,
            digest: Context::new(),
            laid_out: false,
        };
        futures::stream::try_unfold(state, move |state| self.next_chunk(meta, state))
    }

    async fn next_chunk(
        &self,
        meta: &ObjectMetadata,
        mut state: ReadState,
    ) -> FilesResult<Option<(Bytes, ReadState)>> {
        if !state.laid_out {
            self.collections.verify_layout(meta).await?;
            state.laid_out = true;
        }

        let expected = meta.num_chunks();
        if state.n >= expected {
            if state.read != meta.length {
                return Err(FilesError::corrupt(
                    meta.id,
                    format!("read {} bytes, expected {}", state.read, meta.length),
                ));
            }
            let md5 = format!("{:x}", state.digest.compute());
            if md5 != meta.md5 {
                return Err(FilesError::corrupt(
                    meta.id,
                    format!("md5 {} does not match recorded {}", md5, meta.md5),
                ));
            }
            return Ok(None);
        }

        let chunk = self
            .collections
            .fetch_chunk(meta.id, state.n)
            .await?
            .ok_or_else(|| {
                FilesError::corrupt(meta.id, format!("missing chunk {} of {}", state.n, expected))
            })?;

        let len = chunk.data.len() as i64;
        if len > meta.chunk_size {
            return Err(FilesError::corrupt(
                meta.id,
                format!(
                    "chunk {} holds {} bytes, chunk size is {}",
                    state.n, len, meta.chunk_size
                ),
            ));
        }
        if state.n + 1 < expected && len != meta.chunk_size {
            return Err(FilesError::corrupt(
                meta.id,
                format!("chunk {} is short ({} bytes)", state.n, len),
            ));
        }

        state.read += len;
        state.digest.consume(&chunk.data);
        state.n += 1;
        Ok(Some((Bytes::from(chunk.data), state)))
    }

    /// Drain `read_file` into `sink`. Returns the number of bytes written.
    pub async fn write_file<W>(&self, meta: &ObjectMetadata, sink: &mut W) -> FilesResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let chunks = self.read_file(meta);
        pin_mut!(chunks);

        let mut written: u64 = 0;
        while let Some(bytes) = chunks.try_next().await? {
            sink.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }
        sink.flush().await?;
        Ok(written)
    }

    /// Write `meta` to a local path (`-` for stdout). The destination file is
    /// replaced only once the whole payload has been read and verified.
    pub async fn write_to_local(&self, meta: &ObjectMetadata, dest: &str) -> FilesResult<u64> {
        let mut sink = LocalSink::open_for_write(dest).await?;
        let result = self.write_file(meta, sink.writer()).await;
        match result {
            Ok(written) => {
                sink.commit().await?;
                Ok(written)
            }
            Err(err) => {
                sink.abort().await;
                Err(err)
            }
        }
    }

    /// Remove every file named exactly `filename`, returning what was removed.
    pub async fn remove_file(&self, filename: &str) -> FilesResult<Vec<ObjectMetadata>> {
        let matches: Vec<ObjectMetadata> = self
            .collections
            .cursor(FileFilter::Filename(filename.to_string()))
            .try_collect()
            .await?;

        for meta in &matches {
            self.remove_by_id(meta.id).await?;
        }
        info!("removed {} file(s) named `{}`", matches.len(), filename);
        Ok(matches)
    }

    /// Metadata first, then chunks.
    pub async fn remove_by_id(&self, id: Uuid) -> FilesResult<()> {
        self.collections.remove_file(id).await?;
        let chunks = self.collections.remove_chunks(id).await?;
        debug!("removed {} and {} chunks", id, chunks);
        Ok(())
    }
}
