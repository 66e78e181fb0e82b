//! Bundle, label and repo descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ordid;
use crate::model::{timestamp, Contributor};

/// Version of the bundle metadata layout.
pub const CURRENT_BUNDLE_VERSION: u64 = 1;

/// An immutable, content-addressed snapshot of a repo's file set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleDescriptor {
    pub id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
    /// Number of file-list chunk objects holding this bundle's entries.
    #[serde(rename = "count", default)]
    pub entry_chunk_count: u64,
    /// Aggregate fingerprint over the ordered entry fingerprints.
    #[serde(rename = "entriesHash", default, skip_serializing_if = "String::is_empty")]
    pub entries_hash: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub version: u64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl BundleDescriptor {
    pub fn new(message: String, contributors: Vec<Contributor>) -> Self {
        BundleDescriptor {
            id: ordid(),
            message,
            timestamp: Some(timestamp()),
            contributors,
            entry_chunk_count: 0,
            entries_hash: String::new(),
            version: CURRENT_BUNDLE_VERSION,
        }
    }
}

/// A mutable named pointer to a bundle id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelDescriptor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "id")]
    pub bundle_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
}

/// A named, long-lived dataset whose history is a sequence of bundles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoDescriptor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor: Option<Contributor>,
}
