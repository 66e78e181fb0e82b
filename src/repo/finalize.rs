//! Makes a resolved entry collection visible as a bundle.
//!
//! Write order matters here: file-list chunks first, the bundle descriptor
//! second, and only then does the caller write the diamond's terminal
//! record, so a diamond is never marked done without a readable bundle
//! behind it. Labels, the only mutable pointers in the system, are updated
//! last.

use std::error::Error;
use std::fmt;

use tracing::info;

use crate::fingerprint::FingerprintError;
use crate::model::paths;
use crate::model::{self, BundleDescriptor, Contributor, Entries, LabelDescriptor};
use crate::repo::{read_yaml, write_yaml_once, write_yaml_overwrite};
use crate::store::{MetaStore, StoreError};

/// Maximum number of entries serialized into a single file-list chunk.
pub const ENTRIES_PER_FILE_LIST: usize = 1000;

/// Writes `entries` as a new bundle of `repo` and returns its descriptor.
///
/// Chunks the entry collection into file-list objects, records the
/// aggregate fingerprint, and creates the descriptor last. All writes are
/// create-once: the bundle id is freshly minted, so collisions only arise
/// from id reuse and surface as store errors rather than silent overwrites.
pub fn finalize_bundle<S: MetaStore>(
    store: &S,
    repo: &str,
    entries: &Entries,
    message: String,
    contributors: Vec<Contributor>,
) -> Result<BundleDescriptor, BundleError> {
    let mut descriptor = BundleDescriptor::new(message, contributors);
    descriptor.entries_hash = entries.aggregate_hash()?.to_hex();

    let chunks: Vec<&[model::Entry]> = entries.0.chunks(ENTRIES_PER_FILE_LIST).collect();
    for (index, chunk) in chunks.iter().enumerate() {
        let path = paths::bundle_file_list(repo, &descriptor.id, index as u64);
        write_yaml_once::<_, _, BundleError>(store, &path, chunk)?;
    }
    descriptor.entry_chunk_count = chunks.len() as u64;

    write_yaml_once::<_, _, BundleError>(
        store,
        &paths::bundle_descriptor(repo, &descriptor.id),
        &descriptor,
    )?;

    info!(bundle_id = %descriptor.id, entries = entries.len(), "uploaded bundle");
    Ok(descriptor)
}

/// Points `label` at `bundle_id`, replacing any previous target.
pub fn write_label<S: MetaStore>(
    store: &S,
    repo: &str,
    label: &str,
    bundle_id: &str,
    contributors: Vec<Contributor>,
) -> Result<LabelDescriptor, BundleError> {
    model::validate_name("label", label)?;
    let descriptor = LabelDescriptor {
        name: label.to_string(),
        bundle_id: bundle_id.to_string(),
        timestamp: Some(model::timestamp()),
        contributors,
    };
    write_yaml_overwrite::<_, _, BundleError>(
        store,
        &paths::label_descriptor(repo, label),
        &descriptor,
    )?;
    info!(label = %label, bundle_id = %bundle_id, "label updated");
    Ok(descriptor)
}

/// Retrieves a bundle descriptor.
pub fn get_bundle<S: MetaStore>(
    store: &S,
    repo: &str,
    bundle_id: &str,
) -> Result<BundleDescriptor, BundleError> {
    read_yaml(store, &paths::bundle_descriptor(repo, bundle_id))
}

/// Reads back the complete entry collection of a bundle, concatenating its
/// file-list chunks in index order.
pub fn read_bundle_entries<S: MetaStore>(
    store: &S,
    repo: &str,
    bundle: &BundleDescriptor,
) -> Result<Entries, BundleError> {
    let mut entries = Entries::new();
    for index in 0..bundle.entry_chunk_count {
        let path = paths::bundle_file_list(repo, &bundle.id, index);
        let chunk = read_yaml::<_, Vec<model::Entry>, BundleError>(store, &path)?;
        entries.0.extend(chunk);
    }
    Ok(entries)
}

/// Retrieves a label descriptor.
pub fn get_label<S: MetaStore>(
    store: &S,
    repo: &str,
    label: &str,
) -> Result<LabelDescriptor, BundleError> {
    read_yaml(store, &paths::label_descriptor(repo, label))
}

/// Errors from bundle finalization and label updates.
#[derive(Debug)]
pub enum BundleError {
    InvalidFingerprint(FingerprintError),
    InvalidName(model::InvalidName),
    Store(StoreError),
    Codec(serde_yaml::Error),
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFingerprint(e) => write!(f, "bundle entries: {e}"),
            Self::InvalidName(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "bundle write failed: {e}"),
            Self::Codec(e) => write!(f, "bundle encoding failed: {e}"),
        }
    }
}

impl Error for BundleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidFingerprint(e) => Some(e),
            Self::InvalidName(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Codec(e) => Some(e),
        }
    }
}

impl From<FingerprintError> for BundleError {
    fn from(e: FingerprintError) -> Self {
        BundleError::InvalidFingerprint(e)
    }
}

impl From<model::InvalidName> for BundleError {
    fn from(e: model::InvalidName) -> Self {
        BundleError::InvalidName(e)
    }
}

impl From<StoreError> for BundleError {
    fn from(e: StoreError) -> Self {
        BundleError::Store(e)
    }
}

impl From<serde_yaml::Error> for BundleError {
    fn from(e: serde_yaml::Error) -> Self {
        BundleError::Codec(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::model::Entry;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn entry(path: &str, content: &[u8]) -> Entry {
        Entry {
            path: path.to_string(),
            hash: Fingerprint::digest(content).to_hex(),
            mtime: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            mode: 0o644,
        }
    }

    #[test]
    fn finalize_then_read_back() {
        let store = MemoryStore::new();
        let entries = Entries(vec![entry("a", b"1"), entry("b", b"2")]);
        let bundle =
            finalize_bundle(&store, "r", &entries, "first".to_string(), Vec::new()).expect("finalize");

        assert_eq!(bundle.entry_chunk_count, 1);
        assert_eq!(bundle.entries_hash, entries.aggregate_hash().unwrap().to_hex());

        let back = get_bundle(&store, "r", &bundle.id).expect("get");
        assert_eq!(back, bundle);
        assert_eq!(read_bundle_entries(&store, "r", &back).expect("entries"), entries);
    }

    #[test]
    fn chunking_splits_large_collections() {
        let store = MemoryStore::new();
        let entries: Entries = (0..ENTRIES_PER_FILE_LIST + 1)
            .map(|i| entry(&format!("f{i}"), &i.to_be_bytes()))
            .collect();
        let bundle =
            finalize_bundle(&store, "r", &entries, "big".to_string(), Vec::new()).expect("finalize");
        assert_eq!(bundle.entry_chunk_count, 2);
        assert_eq!(
            read_bundle_entries(&store, "r", &bundle).expect("entries").len(),
            entries.len()
        );
    }

    #[test]
    fn label_points_at_latest_bundle() {
        let store = MemoryStore::new();
        write_label(&store, "r", "latest", "b1", Vec::new()).expect("label");
        write_label(&store, "r", "latest", "b2", Vec::new()).expect("relabel");
        assert_eq!(get_label(&store, "r", "latest").expect("get").bundle_id, "b2");
    }

    #[test]
    fn label_name_is_validated() {
        let store = MemoryStore::new();
        match write_label(&store, "r", "bad/name", "b1", Vec::new()) {
            Err(BundleError::InvalidName(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
