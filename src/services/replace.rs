//! `put --replace`: store the new file, then remove every other file with the
//! same name.
//!
//! The store comes first so the name never resolves to nothing. The two
//! phases are not atomic: if the process dies between them, or a removal
//! fails, the older files stay next to the new one and a later
//! `put --replace` or `delete` cleans them up. Concurrent replaces of the same
//! name are not coordinated.

use crate::{
    errors::FilesResult,
    models::{chunk::ChunkSize, metadata::ObjectMetadata},
    services::{chunk_store::ChunkStore, collections::FileFilter},
};
use futures::TryStreamExt;
use tokio::io::AsyncRead;
use tracing::{info, warn};

#[derive(Debug)]
pub struct ReplaceOutcome {
    pub stored: ObjectMetadata,
    pub removed: Vec<ObjectMetadata>,
}

#[derive(Clone, Debug)]
pub struct Replacer {
    store: ChunkStore,
}

impl Replacer {
    pub fn new(store: ChunkStore) -> Self {
        Self { store }
    }

    pub async fn store_and_replace<R>(
        &self,
        source: R,
        filename: &str,
        content_type: Option<String>,
        chunk_size: ChunkSize,
    ) -> FilesResult<ReplaceOutcome>
    where
        R: AsyncRead + Unpin,
    {
        let stored = self
            .store
            .store_file(source, filename, content_type, chunk_size)
            .await?;
        let removed = self.remove_others(&stored).await?;
        Ok(ReplaceOutcome { stored, removed })
    }

    /// Remove every file named like `keep` except `keep` itself.
    pub async fn remove_others(&self, keep: &ObjectMetadata) -> FilesResult<Vec<ObjectMetadata>> {
        let others: Vec<ObjectMetadata> = self
            .store
            .collections()
            .cursor(FileFilter::FilenameExcept {
                filename: keep.filename.clone(),
                id: keep.id,
            })
            .try_collect()
            .await?;

        for (done, old) in others.iter().enumerate() {
            if let Err(err) = self.store.remove_by_id(old.id).await {
                warn!(
                    "replace of `{}` stopped after removing {} of {} older files: {}",
                    keep.filename,
                    done,
                    others.len(),
                    err
                );
                return Err(err);
            }
            info!("replaced {} with {} for `{}`", old.id, keep.id, keep.filename);
        }
        Ok(others)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{memory_store, payload};

    #[tokio::test]
    async fn leaves_exactly_the_newest_file() {
        let store = memory_store().await;
        let replacer = Replacer::new(store.clone());
        for i in 0..3 {
            store
                .store_file(&payload(20 + i)[..], "x", None, ChunkSize::new(7).unwrap())
                .await
                .unwrap();
        }

        let newest = b"the newest write".to_vec();
        let outcome = replacer
            .store_and_replace(&newest[..], "x", None, ChunkSize::new(5).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.removed.len(), 3);
        assert!(outcome.removed.iter().all(|m| m.id != outcome.stored.id));

        let remaining: Vec<_> = store
            .collections()
            .cursor(FileFilter::Filename("x".into()))
            .try_collect()
            .await
            .unwrap();
        let ids: Vec<_> = remaining.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![outcome.stored.id]);

        let mut out = Vec::new();
        store.write_file(&remaining[0], &mut out).await.unwrap();
        assert_eq!(out, newest);

        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM \"fs.chunks\"")
            .fetch_one(store.collections().pool())
            .await
            .unwrap();
        assert_eq!(chunk_count, outcome.stored.num_chunks());
    }

    #[tokio::test]
    async fn other_names_are_untouched() {
        let store = memory_store().await;
        let replacer = Replacer::new(store.clone());
        store
            .store_file(&b"keep me"[..], "x.bak", None, ChunkSize::default())
            .await
            .unwrap();

        let outcome = replacer
            .store_and_replace(&b"first"[..], "x", None, ChunkSize::default())
            .await
            .unwrap();
        assert!(outcome.removed.is_empty());
        assert!(store.find_file("x.bak").await.unwrap().is_some());
    }
}
