//! Entries name the files of a bundle: a path, a content fingerprint, a
//! modification time and the file mode bits.
//!
//! Collections of entries preserve the order in which paths first appeared,
//! which makes every operation here deterministic and gives the aggregate
//! hash a stable input. Identity is the path: two entries with equal path
//! but different fingerprints are a potential conflict, resolved at commit
//! time by [`crate::repo::merge`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::fingerprint::{self, Fingerprint, FingerprintError};

/// A single file of a bundle or split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub path: String,
    /// Hex-encoded content fingerprint.
    pub hash: String,
    pub mtime: DateTime<Utc>,
    /// Unix file mode bits.
    pub mode: u32,
}

/// An ordered collection of entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entries(pub Vec<Entry>);

impl Entries {
    pub fn new() -> Self {
        Entries(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, entry: Entry) {
        self.0.push(entry);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.0.iter()
    }

    /// Merges `incoming` over `self`: for each path present in both, the
    /// incoming entry wins; new paths are appended in first-seen order.
    pub fn merge(&self, incoming: &Entries) -> Entries {
        let mut chained = self.clone();
        chained.0.extend(incoming.0.iter().cloned());
        chained.flatten_to_latest()
    }

    /// Removes every entry whose path matches one in `to_remove`.
    pub fn subtract(&self, to_remove: &Entries) -> Entries {
        Entries(
            self.0
                .iter()
                .filter(|e| !to_remove.0.iter().any(|del| del.path == e.path))
                .cloned()
                .collect(),
        )
    }

    /// Flattens repeated paths (e.g. concatenated index chunks) to the last
    /// occurrence per path, preserving first-seen order of paths.
    pub fn flatten_to_latest(&self) -> Entries {
        let mut order: Vec<&str> = Vec::with_capacity(self.0.len());
        let mut latest: HashMap<&str, &Entry> = HashMap::with_capacity(self.0.len());
        for entry in &self.0 {
            if latest.insert(entry.path.as_str(), entry).is_none() {
                order.push(entry.path.as_str());
            }
        }
        Entries(order.into_iter().map(|p| latest[p].clone()).collect())
    }

    /// The single fingerprint identifying this ordered entry collection.
    ///
    /// Fails with the underlying [`FingerprintError`] if any entry carries a
    /// malformed fingerprint.
    pub fn aggregate_hash(&self) -> Result<Fingerprint, FingerprintError> {
        fingerprint::aggregate(self.0.iter().map(|e| e.hash.as_str()))
    }
}

impl FromIterator<Entry> for Entries {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        Entries(iter.into_iter().collect())
    }
}

impl IntoIterator for Entries {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Entries {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
