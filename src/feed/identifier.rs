//! Stable entry ids.
//!
//! An id is the MD5 hex digest of the first non-empty of the entry's own id,
//! its link and its title, so the same item maps to the same id across runs
//! and across processes.

use super::types::RawEntry;
use super::util::non_empty;

/// 32 lowercase hex chars.
pub fn hash_key(key: &str) -> String {
    format!("{:x}", md5::compute(key.as_bytes()))
}

/// The raw string the id is derived from, if the entry has one.
pub fn identity_key(entry: &RawEntry) -> Option<&str> {
    non_empty(entry.id.as_deref())
        .or_else(|| non_empty(entry.link.as_deref()))
        .or_else(|| non_empty(entry.title.as_deref()))
}

/// `None` only when id, link and title are all empty.
pub fn entry_id(entry: &RawEntry) -> Option<String> {
    identity_key(entry).map(hash_key)
}
