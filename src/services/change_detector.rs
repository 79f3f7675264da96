//! Decides whether a freshly built document has to be written.
//!
//! This is the only de-staling mechanism of the sync engine: a document is
//! written when the index does not have it or holds a different version.
//! Documents that disappear upstream are never removed from the index.

use crate::models::{Item, User};

/// A document with a primary key in its index.
pub trait Document {
    fn document_id(&self) -> String;
}

impl Document for User {
    fn document_id(&self) -> String {
        self.id.to_string()
    }
}

impl Document for Item {
    fn document_id(&self) -> String {
        self.id.clone()
    }
}

/// `true` when `fresh` is missing from the index or differs from `indexed`.
///
/// Comparison is structural and order-sensitive, nested labels and users
/// included.
pub fn needs_write<T: PartialEq>(fresh: &T, indexed: Option<&T>) -> bool {
    indexed.map_or(true, |current| current != fresh)
}

/// Keep only the documents that need a write, preserving order.
pub fn changed<T: PartialEq>(pairs: impl IntoIterator<Item = (T, Option<T>)>) -> Vec<T> {
    pairs
        .into_iter()
        .filter(|(fresh, indexed)| needs_write(fresh, indexed.as_ref()))
        .map(|(fresh, _)| fresh)
        .collect()
}
