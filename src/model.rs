//! Descriptor and entry types shared across the crate.
//!
//! Everything in this module is plain data: descriptors are persisted as
//! YAML objects in the metadata store (see [`crate::model::paths`] for where
//! each record lives) and entry collections support the deterministic set
//! algebra the merge step is built on. No I/O happens here.

pub mod bundle;
pub mod diamond;
pub mod entry;
pub mod paths;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use bundle::{BundleDescriptor, LabelDescriptor, RepoDescriptor};
pub use diamond::{
    ConflictMode, DiamondConfig, DiamondDescriptor, DiamondState, SplitDescriptor, SplitState,
};
pub use entry::{Entries, Entry};

/// A person contributing content to a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
}

/// Wall clock timestamp recorded in descriptors, truncated to UTC.
pub fn timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Validates a repo or label name: letters, digits and hyphens only.
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), InvalidName> {
    if name.is_empty() {
        return Err(InvalidName {
            kind,
            name: name.to_string(),
            offending: None,
        });
    }
    for c in name.chars() {
        if !c.is_alphanumeric() && c != '-' {
            return Err(InvalidName {
                kind,
                name: name.to_string(),
                offending: Some(c),
            });
        }
    }
    Ok(())
}

/// A repo or label name failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidName {
    pub kind: &'static str,
    pub name: String,
    pub offending: Option<char>,
}

impl std::fmt::Display for InvalidName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.offending {
            Some(c) => write!(
                f,
                "invalid {} name {:?}: unsupported character {:?}",
                self.kind, self.name, c
            ),
            None => write!(f, "invalid {} name: empty", self.kind),
        }
    }
}

impl std::error::Error for InvalidName {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(validate_name("repo", "datasets-2024").is_ok());
        assert!(validate_name("repo", "").is_err());
        assert!(validate_name("label", "v1.0").is_err());
        assert!(validate_name("label", "release/1").is_err());
    }
}
