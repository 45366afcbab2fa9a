//! Represents fixed-size slices of a file payload and the chunk-size bound.

use crate::errors::{FilesError, FilesResult};
use sqlx::FromRow;
use uuid::Uuid;

/// Largest document the backing store accepts.
pub const MAX_DOCUMENT_SIZE: i64 = 16 * 1024 * 1024;

/// Room left in a document for the chunk envelope (ids, sequence number).
pub const CHUNK_ENVELOPE_RESERVE: i64 = 16 * 1024;

pub const MAX_CHUNK_SIZE: i64 = MAX_DOCUMENT_SIZE - CHUNK_ENVELOPE_RESERVE;

pub const DEFAULT_CHUNK_SIZE: i64 = 256 * 1024;

/// One row of the `<prefix>.chunks` table.
#[derive(Clone, FromRow, Debug)]
pub struct Chunk {
    /// Identity of the owning file.
    pub files_id: Uuid,

    /// Sequence number (0-based).
    pub n: i64,

    /// Raw payload; only the last chunk of a file may be shorter than the chunk size.
    pub data: Vec<u8>,
}

/// A validated chunk size in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkSize(i64);

impl ChunkSize {
    /// Validate a user-supplied size. `0` selects the default.
    pub fn new(bytes: i64) -> FilesResult<Self> {
        if bytes < 0 {
            return Err(FilesError::InvalidChunkSize {
                value: bytes,
                reason: "chunk size cannot be negative",
            });
        }
        if bytes > MAX_CHUNK_SIZE {
            return Err(FilesError::InvalidChunkSize {
                value: bytes,
                reason: "chunk size beyond maximum document size",
            });
        }
        if bytes == 0 {
            return Ok(Self::default());
        }
        Ok(Self(bytes))
    }

    pub fn from_option(bytes: Option<i64>) -> FilesResult<Self> {
        bytes.map_or(Ok(Self::default()), Self::new)
    }

    pub fn bytes(self) -> i64 {
        self.0
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self(DEFAULT_CHUNK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_absent_select_default() {
        assert_eq!(ChunkSize::new(0).unwrap().bytes(), DEFAULT_CHUNK_SIZE);
        assert_eq!(ChunkSize::from_option(None).unwrap(), ChunkSize::default());
    }

    #[test]
    fn negative_is_rejected() {
        let err = ChunkSize::new(-1).unwrap_err();
        assert!(matches!(err, FilesError::InvalidChunkSize { value: -1, .. }));
        assert_eq!(err.exit_code(), -3);
    }

    #[test]
    fn upper_bound_leaves_room_for_envelope() {
        assert_eq!(MAX_CHUNK_SIZE, 16_760_832);
        assert_eq!(ChunkSize::new(MAX_CHUNK_SIZE).unwrap().bytes(), MAX_CHUNK_SIZE);
        assert!(matches!(
            ChunkSize::new(MAX_CHUNK_SIZE + 1),
            Err(FilesError::InvalidChunkSize { .. })
        ));
        assert!(ChunkSize::new(MAX_DOCUMENT_SIZE).is_err());
    }

    #[test]
    fn small_sizes_are_kept() {
        assert_eq!(ChunkSize::new(1).unwrap().bytes(), 1);
        assert_eq!(ChunkSize::from_option(Some(4096)).unwrap().bytes(), 4096);
    }
}
