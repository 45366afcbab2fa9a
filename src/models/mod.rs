//! Core data models for the chunked file store.
//!
//! A stored file is one `ObjectMetadata` row plus an ordered run of `Chunk`
//! rows. Both map to database tables via `sqlx::FromRow`; metadata also
//! serializes as JSON via `serde` for command output.

pub mod chunk;
pub mod metadata;
