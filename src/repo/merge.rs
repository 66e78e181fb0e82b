//! Deterministic reconciliation of the entry collections contributed by the
//! splits of a diamond.
//!
//! The resolver is a pure function: no I/O, no clock, no randomness. Given
//! the same ordered input and mode it yields byte-identical output. Callers
//! are responsible for establishing the input order; the commit step sorts
//! contributions by split start time, tie-broken by split id, so "last
//! contribution wins" refers to that total order.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use crate::model::paths;
use crate::model::{ConflictMode, Entries, Entry};

/// A non-canonical contribution preserved under an archive path.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedEntry {
    /// Split which contributed the archived entry.
    pub split_id: String,
    /// Path the entry was originally uploaded under.
    pub original_path: String,
    /// The entry, rewritten to its archive location.
    pub entry: Entry,
}

/// Outcome of conflict resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Final entry collection: one canonical entry per path in first-seen
    /// order, followed by any archived contributions.
    pub entries: Entries,
    pub conflicts: Vec<ArchivedEntry>,
    pub checkpoints: Vec<ArchivedEntry>,
    pub has_conflicts: bool,
    pub has_checkpoints: bool,
}

/// Resolves the ordered `(split id, entries)` contributions into the final
/// entry collection for a bundle.
///
/// Paths contributed by exactly one split are adopted unchanged regardless
/// of mode. For contested paths the last contribution in input order is
/// canonical; what happens to the earlier ones depends on `mode` (see
/// [`ConflictMode`]). Under [`ConflictMode::ForbidConflicts`] any two
/// differing contributions abort the merge with
/// [`MergeError::ConflictForbidden`] naming every offending path, and
/// nothing is produced.
pub fn resolve(
    contributions: &[(String, Entries)],
    mode: ConflictMode,
) -> Result<Resolution, MergeError> {
    // path -> ordered list of (split id, entry) in contribution order
    let mut order: Vec<&str> = Vec::new();
    let mut by_path: HashMap<&str, Vec<(&str, &Entry)>> = HashMap::new();
    for (split_id, entries) in contributions {
        for entry in entries {
            if !by_path.contains_key(entry.path.as_str()) {
                order.push(entry.path.as_str());
            }
            by_path
                .entry(entry.path.as_str())
                .or_default()
                .push((split_id.as_str(), entry));
        }
    }

    if mode == ConflictMode::ForbidConflicts {
        let offending: Vec<String> = order
            .iter()
            .filter(|path| {
                let contenders = &by_path[**path];
                contenders
                    .iter()
                    .any(|(_, e)| e.hash != contenders[contenders.len() - 1].1.hash)
            })
            .map(|p| p.to_string())
            .collect();
        if !offending.is_empty() {
            return Err(MergeError::ConflictForbidden { paths: offending });
        }
    }

    let mut resolution = Resolution::default();
    let mut archived: Vec<ArchivedEntry> = Vec::new();

    for path in order {
        let contenders = &by_path[path];
        let (_, canonical) = contenders[contenders.len() - 1];
        resolution.entries.push(canonical.clone());

        if contenders.len() < 2 {
            continue;
        }

        match mode {
            ConflictMode::Ignore | ConflictMode::ForbidConflicts => {}
            ConflictMode::EnableConflicts => {
                for (split_id, entry) in &contenders[..contenders.len() - 1] {
                    if entry.hash == canonical.hash {
                        continue;
                    }
                    archived.push(archive(split_id, entry, paths::conflict_path));
                }
            }
            ConflictMode::EnableCheckpoints => {
                for (split_id, entry) in &contenders[..contenders.len() - 1] {
                    if entry.hash == canonical.hash {
                        continue;
                    }
                    archived.push(archive(split_id, entry, paths::checkpoint_path));
                }
            }
        }
    }

    // archived contributions become part of the bundle, after the canonical set
    for record in &archived {
        resolution.entries.push(record.entry.clone());
    }
    match mode {
        ConflictMode::EnableConflicts => {
            resolution.has_conflicts = !archived.is_empty();
            resolution.conflicts = archived;
        }
        ConflictMode::EnableCheckpoints => {
            resolution.has_checkpoints = !archived.is_empty();
            resolution.checkpoints = archived;
        }
        _ => {}
    }

    Ok(resolution)
}

fn archive(
    split_id: &str,
    entry: &Entry,
    rename: fn(&str, &str) -> String,
) -> ArchivedEntry {
    let mut renamed = entry.clone();
    renamed.path = rename(split_id, &entry.path);
    ArchivedEntry {
        split_id: split_id.to_string(),
        original_path: entry.path.clone(),
        entry: renamed,
    }
}

/// Errors from conflict resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeError {
    /// Differing contributions for the named paths under
    /// [`ConflictMode::ForbidConflicts`].
    ConflictForbidden { paths: Vec<String> },
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConflictForbidden { paths } => {
                write!(f, "conflicting contributions for: {}", paths.join(", "))
            }
        }
    }
}

impl Error for MergeError {}
