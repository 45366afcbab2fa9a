//! Storage services: table access, chunking, catalog queries, replace policy
//! and the local filesystem side of transfers.

pub mod catalog;
pub mod chunk_store;
pub mod collections;
pub mod local_fs;
pub mod replace;

use crate::{
    errors::FilesResult,
    services::{
        catalog::Catalog, chunk_store::ChunkStore, collections::Collections, replace::Replacer,
    },
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Everything a command handler needs, bound to one namespace.
#[derive(Clone, Debug)]
pub struct FileService {
    pub store: ChunkStore,
    pub catalog: Catalog,
    pub replacer: Replacer,
}

impl FileService {
    /// Bind to `prefix` and make sure its tables exist.
    pub async fn open(db: Arc<SqlitePool>, prefix: &str) -> FilesResult<Self> {
        let collections = Collections::new(db, prefix)?;
        collections.ensure_schema().await?;
        Ok(Self::new(collections))
    }

    pub fn new(collections: Collections) -> Self {
        let store = ChunkStore::new(collections.clone());
        Self {
            catalog: Catalog::new(collections),
            replacer: Replacer::new(store.clone()),
            store,
        }
    }
}
