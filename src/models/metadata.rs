//! Represents the metadata record kept for every stored file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One row of the `<prefix>.files` table.
///
/// A file becomes visible to `list`, `search` and `get` only once this record
/// exists; its chunks are always written first. Records are never updated,
/// only deleted.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct ObjectMetadata {
    /// Store-assigned identity, referenced by every chunk as `files_id`.
    pub id: Uuid,

    /// User-supplied name. Not unique.
    pub filename: String,

    /// Total payload length in bytes.
    pub length: i64,

    /// Chunk size the payload was split with.
    pub chunk_size: i64,

    /// Content type (MIME type), when given on put.
    pub content_type: Option<String>,

    /// When the upload finished.
    pub upload_date: DateTime<Utc>,

    /// Lowercase hex MD5 of the full payload.
    pub md5: String,
}

impl ObjectMetadata {
    /// Number of chunks the payload must consist of.
    pub fn num_chunks(&self) -> i64 {
        if self.length <= 0 || self.chunk_size <= 0 {
            return 0;
        }
        (self.length + self.chunk_size - 1) / self.chunk_size
    }

    /// The `filename<TAB>length` line printed by `list` and `search`.
    pub fn display_line(&self) -> String {
        format!("{}\t{}\n", self.filename, self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(length: i64, chunk_size: i64) -> ObjectMetadata {
        ObjectMetadata {
            id: Uuid::new_v4(),
            filename: "report.pdf".into(),
            length,
            chunk_size,
            content_type: None,
            upload_date: Utc::now(),
            md5: String::new(),
        }
    }

    #[test]
    fn num_chunks_rounds_up() {
        assert_eq!(meta(0, 4).num_chunks(), 0);
        assert_eq!(meta(1, 4).num_chunks(), 1);
        assert_eq!(meta(4, 4).num_chunks(), 1);
        assert_eq!(meta(5, 4).num_chunks(), 2);
        assert_eq!(meta(10, 1).num_chunks(), 10);
    }

    #[test]
    fn display_line_is_tab_separated() {
        assert_eq!(meta(1234, 256).display_line(), "report.pdf\t1234\n");
    }
}
