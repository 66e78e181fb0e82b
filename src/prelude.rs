//! Re-exports of the most commonly used types and functions.
//! Intended to be glob imported as `use stockpile::prelude::*;`.

pub use crate::fingerprint::Fingerprint;
pub use crate::id::ordid;
pub use crate::model::{
    BundleDescriptor, ConflictMode, Contributor, DiamondConfig, DiamondDescriptor, DiamondState,
    Entries, Entry, LabelDescriptor, RepoDescriptor, SplitDescriptor, SplitState,
};
pub use crate::repo::diamond::{CommitConfig, Diamond};
pub use crate::repo::finalize::{get_bundle, get_label, read_bundle_entries};
pub use crate::repo::split::{SourceFile, SplitConfig, SplitWriter};
pub use crate::repo::{create_repo, get_repo, repo_exists};
pub use crate::store::{MemoryStore, MetaStore, ObjectStoreMeta};
