//! src/services/collections.rs
//!
//! Collections — thin table-level access to one namespace: the
//! `"<prefix>.files"` metadata table and the `"<prefix>.chunks"` payload table.
//! Everything above this file talks in `ObjectMetadata` / `Chunk` values and
//! `FileFilter` predicates; SQL stays here.

use crate::{
    errors::{FilesError, FilesResult},
    models::{chunk::Chunk, metadata::ObjectMetadata},
};
use futures::{Stream, TryStreamExt};
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{collections::VecDeque, sync::Arc};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_PREFIX: &str = "fs";

/// Rows fetched per round trip by `cursor`.
const PAGE_SIZE: i64 = 100;

const SCHEMA_SQL: &str = include_str!("../../migrations/0001_init.sql");

const FILE_COLUMNS: &str = "id, filename, length, chunk_size, content_type, upload_date, md5";

/// Predicate over the files table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileFilter {
    All,
    /// SQLite `GLOB` pattern matched against the whole filename.
    Glob(String),
    Filename(String),
    /// Same filename, any identity but `id`.
    FilenameExcept { filename: String, id: Uuid },
}

impl FileFilter {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            FileFilter::All => {}
            FileFilter::Glob(pattern) => {
                builder.push(" AND filename GLOB ");
                builder.push_bind(pattern.clone());
            }
            FileFilter::Filename(filename) => {
                builder.push(" AND filename = ");
                builder.push_bind(filename.clone());
            }
            FileFilter::FilenameExcept { filename, id } => {
                builder.push(" AND filename = ");
                builder.push_bind(filename.clone());
                builder.push(" AND id != ");
                builder.push_bind(*id);
            }
        }
    }
}

/// A metadata row plus its position in table order, used as the paging key.
#[derive(FromRow, Debug)]
struct FileRow {
    seq: i64,
    #[sqlx(flatten)]
    meta: ObjectMetadata,
}

struct CursorState {
    filter: FileFilter,
    after: i64,
    buffer: VecDeque<ObjectMetadata>,
    exhausted: bool,
}

/// Handle on the two tables of one namespace.
#[derive(Clone, Debug)]
pub struct Collections {
    db: Arc<SqlitePool>,
    prefix: String,
    files: String,
    chunks: String,
}

impl Collections {
    /// Bind to the namespace `prefix`. The prefix is spliced into quoted
    /// table names, so it is restricted to `[A-Za-z0-9_-]+`.
    pub fn new(db: Arc<SqlitePool>, prefix: impl Into<String>) -> FilesResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty()
            || !prefix
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(FilesError::InvalidNamespace(prefix));
        }
        Ok(Self {
            files: format!("\"{}.files\"", prefix),
            chunks: format!("\"{}.chunks\"", prefix),
            db,
            prefix,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Create both tables and their indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> FilesResult<()> {
        let sql = SCHEMA_SQL.replace("{prefix}", &self.prefix);
        let statements = sql
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!(
            "ensuring schema for prefix `{}` ({} statements)",
            self.prefix,
            statements.len()
        );
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    pub async fn insert_chunk(&self, chunk: &Chunk) -> FilesResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (files_id, n, data) VALUES (?, ?, ?)",
            self.chunks
        ))
        .bind(chunk.files_id)
        .bind(chunk.n)
        .bind(&chunk.data)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn insert_file(&self, meta: &ObjectMetadata) -> FilesResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.files, FILE_COLUMNS
        ))
        .bind(meta.id)
        .bind(&meta.filename)
        .bind(meta.length)
        .bind(meta.chunk_size)
        .bind(meta.content_type.as_deref())
        .bind(meta.upload_date)
        .bind(&meta.md5)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Newest record with exactly this filename: latest `upload_date`,
    /// then highest `seq`. `seq` is AUTOINCREMENT, so it never goes back
    /// and survives `VACUUM`.
    pub async fn find_latest(&self, filename: &str) -> FilesResult<Option<ObjectMetadata>> {
        let meta = sqlx::query_as::<_, ObjectMetadata>(&format!(
            "SELECT {} FROM {} WHERE filename = ? ORDER BY upload_date DESC, seq DESC LIMIT 1",
            FILE_COLUMNS, self.files
        ))
        .bind(filename)
        .fetch_optional(&*self.db)
        .await?;
        Ok(meta)
    }

    pub async fn fetch_chunk(&self, files_id: Uuid, n: i64) -> FilesResult<Option<Chunk>> {
        let chunk = sqlx::query_as::<_, Chunk>(&format!(
            "SELECT files_id, n, data FROM {} WHERE files_id = ? AND n = ?",
            self.chunks
        ))
        .bind(files_id)
        .bind(n)
        .fetch_optional(&*self.db)
        .await?;
        Ok(chunk)
    }

    pub async fn remove_file(&self, id: Uuid) -> FilesResult<u64> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.files))
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn remove_chunks(&self, files_id: Uuid) -> FilesResult<u64> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE files_id = ?", self.chunks))
            .bind(files_id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Walk the `(n, length(data))` layout of every chunk of `meta` without
    /// loading payloads, and fail with `CorruptObject` unless it is exactly
    /// `0..num_chunks` with full-size chunks except possibly the last and a
    /// total equal to `meta.length`.
    pub async fn verify_layout(&self, meta: &ObjectMetadata) -> FilesResult<()> {
        let sql = format!(
            "SELECT n, length(data) FROM {} WHERE files_id = ? ORDER BY n ASC",
            self.chunks
        );
        let mut rows = sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(meta.id)
            .fetch(&*self.db);

        let expected = meta.num_chunks();
        let mut next = 0;
        let mut total = 0;
        while let Some((n, len)) = rows.try_next().await? {
            if n >= expected {
                return Err(FilesError::corrupt(
                    meta.id,
                    format!("unexpected chunk {}, expected {} chunks", n, expected),
                ));
            }
            if n != next {
                return Err(FilesError::corrupt(
                    meta.id,
                    format!("missing chunk {} of {}", next, expected),
                ));
            }
            if len > meta.chunk_size || (n + 1 < expected && len != meta.chunk_size) {
                return Err(FilesError::corrupt(
                    meta.id,
                    format!(
                        "chunk {} holds {} bytes, chunk size is {}",
                        n, len, meta.chunk_size
                    ),
                ));
            }
            total += len;
            next += 1;
        }

        if next != expected {
            return Err(FilesError::corrupt(
                meta.id,
                format!("missing chunk {} of {}", next, expected),
            ));
        }
        if total != meta.length {
            return Err(FilesError::corrupt(
                meta.id,
                format!("chunks hold {} bytes, expected {}", total, meta.length),
            ));
        }
        debug!("chunk layout of {} checked ({} chunks)", meta.id, expected);
        Ok(())
    }

    /// Lazy, forward-only cursor over the metadata rows matching `filter`,
    /// in table order. Rows are fetched one page at a time; a fresh call
    /// starts over from the beginning.
    pub fn cursor(&self, filter: FileFilter) -> impl Stream<Item = FilesResult<ObjectMetadata>> + '_ {
        let state = CursorState {
            filter,
            after: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        };
        futures::stream::try_unfold(state, move |state| self.advance(state))
    }

    async fn advance(
        &self,
        mut state: CursorState,
    ) -> FilesResult<Option<(ObjectMetadata, CursorState)>> {
        loop {
            if let Some(meta) = state.buffer.pop_front() {
                return Ok(Some((meta, state)));
            }
            if state.exhausted {
                return Ok(None);
            }

            let rows = self.query_page(&state.filter, state.after).await?;
            debug!(
                "fetched {} metadata rows after seq {} ({:?})",
                rows.len(),
                state.after,
                state.filter
            );
            state.exhausted = (rows.len() as i64) < PAGE_SIZE;
            if let Some(last) = rows.last() {
                state.after = last.seq;
            }
            state.buffer.extend(rows.into_iter().map(|row| row.meta));
        }
    }

    async fn query_page(&self, filter: &FileFilter, after: i64) -> FilesResult<Vec<FileRow>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT seq, {} FROM {} WHERE seq > ",
            FILE_COLUMNS, self.files
        ));
        builder.push_bind(after);
        filter.push_where(&mut builder);
        builder.push(" ORDER BY seq ASC LIMIT ");
        builder.push_bind(PAGE_SIZE);

        let rows = builder.build_query_as::<FileRow>().fetch_all(&*self.db).await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::memory_collections;
    use chrono::Utc;

    fn meta(filename: &str) -> ObjectMetadata {
        ObjectMetadata {
            id: Uuid::new_v4(),
            filename: filename.into(),
            length: 0,
            chunk_size: 4,
            content_type: Some("text/plain".into()),
            upload_date: Utc::now(),
            md5: "d41d8cd98f00b204e9800998ecf8427e".into(),
        }
    }

    #[tokio::test]
    async fn rejects_prefixes_that_could_escape_the_table_name() {
        let collections = memory_collections().await;
        let pool = Arc::new(collections.pool().clone());
        for bad in ["", "fs\"", "a.b", "a b", "fs;drop"] {
            assert!(matches!(
                Collections::new(pool.clone(), bad),
                Err(FilesError::InvalidNamespace(_))
            ));
        }
        assert!(Collections::new(pool, "photos_2024-v2").is_ok());
    }

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let collections = memory_collections().await;
        collections.ensure_schema().await.unwrap();
        collections.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn namespaces_do_not_see_each_other() {
        let fs = memory_collections().await;
        let other = Collections::new(Arc::new(fs.pool().clone()), "backup").unwrap();
        other.ensure_schema().await.unwrap();

        fs.insert_file(&meta("a.txt")).await.unwrap();

        let seen: Vec<_> = other.cursor(FileFilter::All).try_collect().await.unwrap();
        assert!(seen.is_empty());
        let seen: Vec<_> = fs.cursor(FileFilter::All).try_collect().await.unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn cursor_pages_through_every_row_once() {
        let collections = memory_collections().await;
        let total = PAGE_SIZE as usize * 2 + 7;
        for i in 0..total {
            collections
                .insert_file(&meta(&format!("file-{i:04}")))
                .await
                .unwrap();
        }

        let seen: Vec<_> = collections
            .cursor(FileFilter::All)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(seen.len(), total);
        assert_eq!(seen[0].filename, "file-0000");
        assert_eq!(seen[total - 1].filename, format!("file-{:04}", total - 1));
    }

    #[tokio::test]
    async fn filename_except_skips_the_given_identity() {
        let collections = memory_collections().await;
        let keep = meta("x");
        let other = meta("x");
        collections.insert_file(&keep).await.unwrap();
        collections.insert_file(&other).await.unwrap();
        collections.insert_file(&meta("y")).await.unwrap();

        let seen: Vec<_> = collections
            .cursor(FileFilter::FilenameExcept {
                filename: "x".into(),
                id: keep.id,
            })
            .try_collect()
            .await
            .unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, other.id);
    }

    #[tokio::test]
    async fn find_latest_breaks_date_ties_by_insertion_order() {
        let collections = memory_collections().await;
        let first = meta("same");
        let mut second = meta("same");
        second.upload_date = first.upload_date;
        collections.insert_file(&first).await.unwrap();
        collections.insert_file(&second).await.unwrap();

        sqlx::query("VACUUM").execute(collections.pool()).await.unwrap();

        let found = collections.find_latest("same").await.unwrap().unwrap();
        assert_eq!(found.id, second.id);
    }

    async fn with_chunks(collections: &Collections, length: i64, sizes: &[(i64, usize)]) -> ObjectMetadata {
        let mut stored = meta("layout");
        stored.length = length;
        for &(n, len) in sizes {
            collections
                .insert_chunk(&Chunk {
                    files_id: stored.id,
                    n,
                    data: vec![0; len],
                })
                .await
                .unwrap();
        }
        stored
    }

    #[tokio::test]
    async fn verify_layout_accepts_a_complete_object() {
        let collections = memory_collections().await;
        let stored = with_chunks(&collections, 10, &[(0, 4), (1, 4), (2, 2)]).await;
        collections.verify_layout(&stored).await.unwrap();

        let empty = with_chunks(&collections, 0, &[]).await;
        collections.verify_layout(&empty).await.unwrap();
    }

    #[tokio::test]
    async fn verify_layout_rejects_gaps_and_bad_sizes() {
        let collections = memory_collections().await;
        let cases: [(i64, &[(i64, usize)]); 5] = [
            (12, &[(0, 4), (1, 4)]),
            (12, &[(0, 4), (2, 4)]),
            (10, &[(0, 4), (1, 3), (2, 3)]),
            (8, &[(0, 4), (1, 5)]),
            (4, &[(0, 4), (1, 1)]),
        ];
        for (length, sizes) in cases {
            let stored = with_chunks(&collections, length, sizes).await;
            let err = collections.verify_layout(&stored).await.unwrap_err();
            assert!(
                matches!(err, FilesError::CorruptObject { .. }),
                "{:?} passed",
                sizes
            );
        }
    }

    #[tokio::test]
    async fn metadata_round_trips_through_the_table() {
        let collections = memory_collections().await;
        let stored = meta("a.txt");
        collections.insert_file(&stored).await.unwrap();

        let found = collections.find_latest("a.txt").await.unwrap().unwrap();
        assert_eq!(found.id, stored.id);
        assert_eq!(found.content_type.as_deref(), Some("text/plain"));
        assert_eq!(found.md5, stored.md5);
        assert!(collections.find_latest("b.txt").await.unwrap().is_none());
    }
}
