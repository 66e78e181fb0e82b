//! Diamond lifecycle: a bounded epoch during which many splits upload
//! concurrently, ended by exactly one commit or cancel.
//!
//! Terminal transitions are serialized through a single create-once write of
//! `diamond-done.yaml`. Two racing commits, or a commit racing a cancel,
//! both render their own terminal descriptor; the store accepts exactly one
//! and the loser observes [`DiamondError::UnexpectedUpdate`]. There is no
//! other lock anywhere in the protocol.

use std::error::Error;
use std::fmt;

use itertools::Itertools;
use tracing::{info, warn};

use crate::model::paths;
use crate::model::{
    ConflictMode, DiamondConfig, DiamondDescriptor, DiamondState, Entries, SplitDescriptor,
    SplitState,
};
use crate::repo::finalize::{self, BundleError};
use crate::repo::merge::{self, MergeError};
use crate::repo::{read_yaml, repo_exists, write_yaml_once, RepoError};
use crate::store::{MetaStore, StoreError};

/// Commit-time configuration, validated before use.
#[derive(Debug, Clone, Default)]
pub struct CommitConfig {
    /// Commit message recorded on the resulting bundle.
    pub message: String,
    /// Overrides the conflict mode recorded at initialization.
    pub mode: Option<ConflictMode>,
    /// Label to point at the resulting bundle once visible.
    pub label: Option<String>,
    /// Split ids whose final record must exist for the commit to proceed.
    /// In-flight or abandoned splits are otherwise silently excluded.
    pub required_splits: Vec<String>,
}

impl CommitConfig {
    pub fn validate(&self) -> Result<(), DiamondError> {
        if let Some(label) = &self.label {
            crate::model::validate_name("label", label)
                .map_err(|e| DiamondError::InvalidConfig(e.to_string()))?;
        }
        Ok(())
    }
}

/// Coordinator for one diamond of a repo.
#[derive(Debug)]
pub struct Diamond<'s, S: MetaStore> {
    store: &'s S,
    repo: String,
    descriptor: DiamondDescriptor,
}

impl<'s, S: MetaStore> Diamond<'s, S> {
    /// Mints a new diamond on `repo` and persists its `Initialized`
    /// descriptor.
    pub fn initialize(store: &'s S, repo: &str, cfg: DiamondConfig) -> Result<Self, DiamondError> {
        cfg.validate().map_err(DiamondError::InvalidConfig)?;
        repo_exists(store, repo)?;

        let descriptor = DiamondDescriptor::new(&cfg);
        let path = paths::diamond_running(repo, &descriptor.diamond_id);
        match write_yaml_once::<_, _, DiamondError>(store, &path, &descriptor) {
            Ok(()) => {}
            Err(DiamondError::Store(e)) if e.is_already_exists() => {
                return Err(DiamondError::UnexpectedUpdate {
                    diamond_id: descriptor.diamond_id,
                })
            }
            Err(e) => return Err(e),
        }

        info!(diamond_id = %descriptor.diamond_id, mode = %descriptor.mode, "diamond initialized");
        Ok(Diamond {
            store,
            repo: repo.to_string(),
            descriptor,
        })
    }

    /// Binds to an existing diamond, reading back its current descriptor
    /// (terminal record preferred over the initial one).
    pub fn attach(store: &'s S, repo: &str, diamond_id: &str) -> Result<Self, DiamondError> {
        repo_exists(store, repo)?;
        let descriptor = load_descriptor(store, repo, diamond_id)?;
        Ok(Diamond {
            store,
            repo: repo.to_string(),
            descriptor,
        })
    }

    pub fn descriptor(&self) -> &DiamondDescriptor {
        &self.descriptor
    }

    pub fn diamond_id(&self) -> &str {
        &self.descriptor.diamond_id
    }

    /// Cancels the diamond. Fails with [`DiamondError::UnexpectedUpdate`] if
    /// any terminal transition already happened.
    pub fn cancel(mut self) -> Result<DiamondDescriptor, DiamondError> {
        let current = load_descriptor(self.store, &self.repo, &self.descriptor.diamond_id)?;
        if current.state.is_terminal() {
            return Err(DiamondError::UnexpectedUpdate {
                diamond_id: self.descriptor.diamond_id,
            });
        }

        self.descriptor = current.with_state(DiamondState::Canceled);
        self.write_terminal_descriptor()?;
        info!(diamond_id = %self.descriptor.diamond_id, "diamond canceled");
        Ok(self.descriptor)
    }

    /// Commits the diamond: collects the completed splits, resolves
    /// conflicts, finalizes a bundle and writes the terminal descriptor.
    ///
    /// A conflict under [`ConflictMode::ForbidConflicts`] aborts before any
    /// bundle object is written and leaves the diamond retryable in its
    /// `Initialized` state.
    pub fn commit(mut self, cfg: CommitConfig) -> Result<DiamondDescriptor, DiamondError> {
        cfg.validate()?;

        // terminal states reject any further transition
        let current = load_descriptor(self.store, &self.repo, &self.descriptor.diamond_id)?;
        if current.state != DiamondState::Initialized {
            return Err(DiamondError::UnexpectedUpdate {
                diamond_id: self.descriptor.diamond_id,
            });
        }
        self.descriptor = current;
        if let Some(mode) = cfg.mode {
            self.descriptor.mode = mode;
        }

        let splits = self.collect_splits()?;
        if splits.is_empty() {
            return Err(DiamondError::NoSplits {
                diamond_id: self.descriptor.diamond_id,
            });
        }
        for required in &cfg.required_splits {
            if !splits.iter().any(|s| &s.split_id == required) {
                return Err(DiamondError::SplitNotDone {
                    diamond_id: self.descriptor.diamond_id.clone(),
                    split_id: required.clone(),
                });
            }
        }
        info!(
            diamond_id = %self.descriptor.diamond_id,
            num_splits = splits.len(),
            "splits for this commit"
        );

        let mut contributions = Vec::with_capacity(splits.len());
        for split in &splits {
            contributions.push((split.split_id.clone(), self.load_split_entries(split)?));
        }

        let resolution = merge::resolve(&contributions, self.descriptor.mode)?;
        if resolution.has_conflicts {
            warn!(
                diamond_id = %self.descriptor.diamond_id,
                conflicts = resolution.conflicts.len(),
                "conflicts detected"
            );
        }

        let contributors = splits
            .iter()
            .flat_map(|s| s.contributors.iter().cloned())
            .collect();
        let bundle = finalize::finalize_bundle(
            self.store,
            &self.repo,
            &resolution.entries,
            cfg.message.clone(),
            contributors,
        )?;

        self.descriptor.splits = splits;
        self.descriptor.has_conflicts = resolution.has_conflicts;
        self.descriptor.has_checkpoints = resolution.has_checkpoints;
        self.descriptor.bundle_id = Some(bundle.id.clone());
        self.descriptor = self.descriptor.with_state(DiamondState::Done);
        self.write_terminal_descriptor()?;

        if let Some(label) = &cfg.label {
            finalize::write_label(
                self.store,
                &self.repo,
                label,
                &bundle.id,
                bundle.contributors.clone(),
            )?;
        }

        info!(
            diamond_id = %self.descriptor.diamond_id,
            bundle_id = %bundle.id,
            "diamond committed"
        );
        Ok(self.descriptor)
    }

    /// The create-once write of the terminal record: the sole serialization
    /// point between racing terminal transitions.
    fn write_terminal_descriptor(&self) -> Result<(), DiamondError> {
        let path = paths::diamond_done(&self.repo, &self.descriptor.diamond_id);
        match write_yaml_once::<_, _, DiamondError>(self.store, &path, &self.descriptor) {
            Ok(()) => Ok(()),
            Err(DiamondError::Store(e)) if e.is_already_exists() => {
                Err(DiamondError::UnexpectedUpdate {
                    diamond_id: self.descriptor.diamond_id.clone(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Collects the splits whose final record exists, ordered by start time
    /// and split id: the total order conflict resolution is defined over.
    fn collect_splits(&self) -> Result<Vec<SplitDescriptor>, DiamondError> {
        let prefix = paths::splits_prefix(&self.repo, &self.descriptor.diamond_id);
        let mut descriptors = Vec::new();
        for key in self.store.list(&prefix) {
            let key = key?;
            if paths::split_id_of_final_descriptor(&prefix, &key).is_none() {
                continue;
            }
            let split = read_yaml::<_, SplitDescriptor, DiamondError>(self.store, &key)?;
            if split.state == SplitState::Done {
                descriptors.push(split);
            }
        }
        Ok(descriptors
            .into_iter()
            .sorted_by(|a, b| {
                a.start_time
                    .cmp(&b.start_time)
                    .then_with(|| a.split_id.cmp(&b.split_id))
            })
            .collect())
    }

    /// Loads one split's contributed entries: the index chunks of its final
    /// generation, concatenated and flattened to the latest entry per path.
    /// Chunks written by abandoned generations are never touched.
    fn load_split_entries(&self, split: &SplitDescriptor) -> Result<Entries, DiamondError> {
        let mut entries = Entries::new();
        for index in 0..split.entry_chunk_count {
            let path = paths::split_file_list(
                &self.repo,
                &self.descriptor.diamond_id,
                &split.split_id,
                &split.generation_id,
                index,
            );
            let chunk =
                read_yaml::<_, Vec<crate::model::Entry>, DiamondError>(self.store, &path)?;
            entries.0.extend(chunk);
        }
        Ok(entries.flatten_to_latest())
    }
}

/// Reads a diamond descriptor, preferring the terminal record.
pub(crate) fn load_descriptor<S: MetaStore>(
    store: &S,
    repo: &str,
    diamond_id: &str,
) -> Result<DiamondDescriptor, DiamondError> {
    match read_yaml::<_, DiamondDescriptor, DiamondError>(
        store,
        &paths::diamond_done(repo, diamond_id),
    ) {
        Ok(d) => Ok(d),
        Err(DiamondError::Store(e)) if e.is_not_found() => {
            match read_yaml::<_, DiamondDescriptor, DiamondError>(
                store,
                &paths::diamond_running(repo, diamond_id),
            ) {
                Ok(d) => Ok(d),
                Err(DiamondError::Store(e)) if e.is_not_found() => Err(DiamondError::NotFound {
                    diamond_id: diamond_id.to_string(),
                }),
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// Retrieves a diamond descriptor.
pub fn get_diamond<S: MetaStore>(
    store: &S,
    repo: &str,
    diamond_id: &str,
) -> Result<DiamondDescriptor, DiamondError> {
    repo_exists(store, repo)?;
    load_descriptor(store, repo, diamond_id)
}

/// Lists the diamonds of a repo in start-time order.
pub fn list_diamonds<S: MetaStore>(
    store: &S,
    repo: &str,
) -> Result<Vec<DiamondDescriptor>, DiamondError> {
    repo_exists(store, repo)?;
    let prefix = paths::diamonds_prefix(repo);
    let mut seen = std::collections::BTreeSet::new();
    for key in store.list(&prefix) {
        let key = key?;
        let Some(rest) = key.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if let Some((diamond_id, _)) = rest.split_once('/') {
            seen.insert(diamond_id.to_string());
        }
    }
    let mut descriptors = Vec::with_capacity(seen.len());
    for diamond_id in seen {
        descriptors.push(load_descriptor(store, repo, &diamond_id)?);
    }
    Ok(descriptors
        .into_iter()
        .sorted_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.diamond_id.cmp(&b.diamond_id))
        })
        .collect())
}

/// Lists the completed splits of a diamond in start-time order.
pub fn list_splits<S: MetaStore>(
    store: &S,
    repo: &str,
    diamond_id: &str,
) -> Result<Vec<SplitDescriptor>, DiamondError> {
    let diamond = Diamond::attach(store, repo, diamond_id)?;
    diamond.collect_splits()
}

/// Errors from diamond lifecycle operations.
#[derive(Debug)]
pub enum DiamondError {
    NotFound {
        diamond_id: String,
    },
    /// A terminal record already exists: the diamond was committed or
    /// canceled by someone else.
    UnexpectedUpdate {
        diamond_id: String,
    },
    NoSplits {
        diamond_id: String,
    },
    SplitNotDone {
        diamond_id: String,
        split_id: String,
    },
    InvalidConfig(String),
    Merge(MergeError),
    Bundle(BundleError),
    Repo(RepoError),
    Store(StoreError),
    Codec(serde_yaml::Error),
}

impl fmt::Display for DiamondError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { diamond_id } => write!(f, "diamond {diamond_id} doesn't exist"),
            Self::UnexpectedUpdate { diamond_id } => {
                write!(f, "diamond {diamond_id} already finalized")
            }
            Self::NoSplits { diamond_id } => {
                write!(f, "diamond {diamond_id}: no split to commit")
            }
            Self::SplitNotDone {
                diamond_id,
                split_id,
            } => write!(
                f,
                "diamond {diamond_id}: required split {split_id} has no final record"
            ),
            Self::InvalidConfig(msg) => write!(f, "invalid diamond configuration: {msg}"),
            Self::Merge(e) => write!(f, "commit given up: {e}"),
            Self::Bundle(e) => write!(f, "{e}"),
            Self::Repo(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "diamond operation failed: {e}"),
            Self::Codec(e) => write!(f, "diamond descriptor encoding failed: {e}"),
        }
    }
}

impl Error for DiamondError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Merge(e) => Some(e),
            Self::Bundle(e) => Some(e),
            Self::Repo(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MergeError> for DiamondError {
    fn from(e: MergeError) -> Self {
        DiamondError::Merge(e)
    }
}

impl From<BundleError> for DiamondError {
    fn from(e: BundleError) -> Self {
        DiamondError::Bundle(e)
    }
}

impl From<RepoError> for DiamondError {
    fn from(e: RepoError) -> Self {
        DiamondError::Repo(e)
    }
}

impl From<StoreError> for DiamondError {
    fn from(e: StoreError) -> Self {
        DiamondError::Store(e)
    }
}

impl From<serde_yaml::Error> for DiamondError {
    fn from(e: serde_yaml::Error) -> Self {
        DiamondError::Codec(e)
    }
}
