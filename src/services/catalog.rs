//! Metadata-only queries behind `list` and `search`.
//!
//! Matching runs in SQLite as `GLOB`, which is case-sensitive and treats
//! `*`, `?` and `[...]` as pattern syntax. `list` quotes its prefix so user
//! input is always literal; `search` passes its needle through unescaped, so
//! `search 'img_*.png'` is a pattern while `list 'img_*'` is not.

use crate::{
    errors::FilesResult,
    models::metadata::ObjectMetadata,
    services::collections::{Collections, FileFilter},
};
use futures::Stream;

#[derive(Clone, Debug)]
pub struct Catalog {
    collections: Collections,
}

impl Catalog {
    pub fn new(collections: Collections) -> Self {
        Self { collections }
    }

    /// Every file whose name starts with `prefix`, or every file when the
    /// prefix is absent or empty.
    pub fn list_prefix(
        &self,
        prefix: Option<&str>,
    ) -> impl Stream<Item = FilesResult<ObjectMetadata>> + '_ {
        self.collections.cursor(prefix_filter(prefix))
    }

    /// Every file whose name contains `needle`, with glob syntax honoured.
    pub fn search_substring(
        &self,
        needle: &str,
    ) -> impl Stream<Item = FilesResult<ObjectMetadata>> + '_ {
        self.collections.cursor(substring_filter(needle))
    }
}

fn prefix_filter(prefix: Option<&str>) -> FileFilter {
    match prefix {
        Some(prefix) if !prefix.is_empty() => FileFilter::Glob(format!("{}*", quote_glob(prefix))),
        _ => FileFilter::All,
    }
}

fn substring_filter(needle: &str) -> FileFilter {
    FileFilter::Glob(format!("*{}*", needle))
}

/// Escape `literal` so `GLOB` matches it character for character.
///
/// Each metacharacter is wrapped in a one-element bracket class; `]` is only
/// special inside a class and needs no quoting.
pub fn quote_glob(literal: &str) -> String {
    let mut quoted = String::with_capacity(literal.len());
    for c in literal.chars() {
        match c {
            '*' | '?' | '[' => {
                quoted.push('[');
                quoted.push(c);
                quoted.push(']');
            }
            _ => quoted.push(c),
        }
    }
    quoted
}
