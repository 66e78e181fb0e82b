//! The storage contract every lifecycle record is persisted through.
//!
//! The protocol needs very little from its backing store: get, prefix
//! listing, plain overwrite for the mutable label pointers, and one crucial
//! primitive: `create`, which must fail when the key already exists. That
//! create-once discipline is the only concurrency control the diamond
//! protocol relies on: it is what makes commit and cancel mutually exclusive
//! and what isolates the generations of a resumed split. No cross-key
//! transactions are assumed.

pub mod memorystore;
pub mod objectstore;

use bytes::Bytes;
use std::error::Error;
use std::fmt;

pub use memorystore::MemoryStore;
pub use objectstore::ObjectStoreMeta;

/// Store of metadata records and content blobs.
///
/// Implementations must provide per-key create-once semantics and a
/// prefix listing that pages through arbitrarily large result sets; listing
/// order is unspecified.
pub trait MetaStore {
    type ListIter<'a>: Iterator<Item = Result<String, StoreError>>
    where
        Self: 'a;

    /// Writes `bytes` at `path`, failing with [`StoreError::AlreadyExists`]
    /// if an object is already present. Never overwrites.
    fn create(&self, path: &str, bytes: Bytes) -> Result<(), StoreError>;

    /// Writes `bytes` at `path`, replacing any existing object. Reserved for
    /// mutable pointers (labels); descriptors always go through [`create`].
    ///
    /// [`create`]: MetaStore::create
    fn overwrite(&self, path: &str, bytes: Bytes) -> Result<(), StoreError>;

    /// Reads the object at `path`, failing with [`StoreError::NotFound`] if
    /// absent.
    fn get(&self, path: &str) -> Result<Bytes, StoreError>;

    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        match self.get(path) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lists all keys under `prefix`.
    fn list<'a>(&'a self, prefix: &str) -> Self::ListIter<'a>;
}

/// Writes a content-addressed blob, treating an existing object as a
/// deduplication hit rather than an error.
pub fn create_deduplicated<S: MetaStore + ?Sized>(
    store: &S,
    path: &str,
    bytes: Bytes,
) -> Result<(), StoreError> {
    match store.create(path, bytes) {
        Ok(()) | Err(StoreError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Errors surfaced by [`MetaStore`] implementations.
///
/// Backend failures carry the operation and the path for diagnostics.
#[derive(Debug)]
pub enum StoreError {
    NotFound {
        path: String,
    },
    AlreadyExists {
        path: String,
    },
    Backend {
        op: &'static str,
        path: String,
        source: object_store::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => write!(f, "no object at {path}"),
            Self::AlreadyExists { path } => write!(f, "object already exists at {path}"),
            Self::Backend { op, path, source } => {
                write!(f, "store {op} failed at {path}: {source}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}
