//! High-level operations for versioning datasets as content-addressed
//! bundles.
//!
//! The design separates storage concerns from the data model and keeps the
//! mutable state of a repository to an absolute minimum: every lifecycle
//! record (repo, diamond, split, bundle) is written exactly once and never
//! rewritten, and the only mutable objects are label pointers. Coordination
//! between concurrent producers never goes through shared memory or locks;
//! it relies purely on the store's create-once semantics and on each split
//! writing under its own storage namespace.
//!
//! A commit flows bottom-up through the submodules: [`split`] uploads file
//! content and per-split index chunks, [`merge`] deterministically reconciles
//! the splits' entry collections, [`finalize`] makes the resulting bundle
//! visible, and [`diamond`] owns the state machine tying it all together.

pub mod diamond;
pub mod finalize;
pub mod merge;
pub mod split;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt;

use crate::model::paths;
use crate::model::{self, InvalidName, RepoDescriptor};
use crate::store::{MetaStore, StoreError};

pub(crate) fn read_yaml<S, T, E>(store: &S, path: &str) -> Result<T, E>
where
    S: MetaStore + ?Sized,
    T: DeserializeOwned,
    E: From<StoreError> + From<serde_yaml::Error>,
{
    let bytes = store.get(path)?;
    Ok(serde_yaml::from_slice(&bytes)?)
}

pub(crate) fn write_yaml_once<S, T, E>(store: &S, path: &str, value: &T) -> Result<(), E>
where
    S: MetaStore + ?Sized,
    T: Serialize,
    E: From<StoreError> + From<serde_yaml::Error>,
{
    let buffer = serde_yaml::to_string(value)?;
    store.create(path, Bytes::from(buffer))?;
    Ok(())
}

pub(crate) fn write_yaml_overwrite<S, T, E>(store: &S, path: &str, value: &T) -> Result<(), E>
where
    S: MetaStore + ?Sized,
    T: Serialize,
    E: From<StoreError> + From<serde_yaml::Error>,
{
    let buffer = serde_yaml::to_string(value)?;
    store.overwrite(path, Bytes::from(buffer))?;
    Ok(())
}

/// Persists a new repo descriptor. The repo must not already exist.
pub fn create_repo<S: MetaStore>(store: &S, mut desc: RepoDescriptor) -> Result<RepoDescriptor, RepoError> {
    model::validate_name("repo", &desc.name)?;
    if desc.description.is_empty() {
        return Err(RepoError::EmptyDescription {
            repo: desc.name.clone(),
        });
    }
    if desc.timestamp.is_none() {
        desc.timestamp = Some(model::timestamp());
    }

    let path = paths::repo_descriptor(&desc.name);
    match write_yaml_once::<_, _, RepoError>(store, &path, &desc) {
        Ok(()) => Ok(desc),
        Err(RepoError::Store(e)) if e.is_already_exists() => Err(RepoError::AlreadyExists {
            repo: desc.name.clone(),
        }),
        Err(e) => Err(e),
    }
}

/// Checks that `repo` exists, failing with [`RepoError::NotFound`] otherwise.
pub fn repo_exists<S: MetaStore>(store: &S, repo: &str) -> Result<(), RepoError> {
    match store.exists(&paths::repo_descriptor(repo))? {
        true => Ok(()),
        false => Err(RepoError::NotFound {
            repo: repo.to_string(),
        }),
    }
}

/// Retrieves the descriptor of `repo`.
pub fn get_repo<S: MetaStore>(store: &S, repo: &str) -> Result<RepoDescriptor, RepoError> {
    match read_yaml::<_, _, RepoError>(store, &paths::repo_descriptor(repo)) {
        Err(RepoError::Store(e)) if e.is_not_found() => Err(RepoError::NotFound {
            repo: repo.to_string(),
        }),
        other => other,
    }
}

/// Errors from repo-level operations.
#[derive(Debug)]
pub enum RepoError {
    NotFound { repo: String },
    AlreadyExists { repo: String },
    EmptyDescription { repo: String },
    InvalidName(InvalidName),
    Store(StoreError),
    Codec(serde_yaml::Error),
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { repo } => write!(f, "repo {repo} doesn't exist"),
            Self::AlreadyExists { repo } => write!(f, "repo {repo} already exists"),
            Self::EmptyDescription { repo } => {
                write!(f, "repo {repo} requires a description")
            }
            Self::InvalidName(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "repo operation failed: {e}"),
            Self::Codec(e) => write!(f, "repo descriptor encoding failed: {e}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidName(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InvalidName> for RepoError {
    fn from(e: InvalidName) -> Self {
        RepoError::InvalidName(e)
    }
}

impl From<StoreError> for RepoError {
    fn from(e: StoreError) -> Self {
        RepoError::Store(e)
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Codec(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn descriptor(name: &str) -> RepoDescriptor {
        RepoDescriptor {
            name: name.to_string(),
            description: "test datasets".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn create_then_get() {
        let store = MemoryStore::new();
        create_repo(&store, descriptor("datasets")).expect("create");
        repo_exists(&store, "datasets").expect("exists");
        let back = get_repo(&store, "datasets").expect("get");
        assert_eq!(back.name, "datasets");
        assert!(back.timestamp.is_some());
    }

    #[test]
    fn create_twice_fails() {
        let store = MemoryStore::new();
        create_repo(&store, descriptor("datasets")).expect("create");
        match create_repo(&store, descriptor("datasets")) {
            Err(RepoError::AlreadyExists { repo }) => assert_eq!(repo, "datasets"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_repo_is_not_found() {
        let store = MemoryStore::new();
        match repo_exists(&store, "nope") {
            Err(RepoError::NotFound { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
