//! Diamond and split descriptors.
//!
//! A diamond is a bounded coordination epoch during which any number of
//! splits upload concurrently; its descriptor is the record every lifecycle
//! transition is serialized through. Descriptors are immutable once written
//! in a terminal state: the create-once write of the terminal record is what
//! makes commit and cancel mutually exclusive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::ordid;
use crate::model::{timestamp, Contributor};

/// Conflict handling mode, fixed when a diamond is committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictMode {
    /// Latest contribution wins, no record kept of clobbered files.
    #[serde(rename = "ignore")]
    Ignore,
    /// Every intermediate contribution is archived as a checkpoint.
    #[serde(rename = "enable-checkpoints")]
    EnableCheckpoints,
    /// Conflicting contributions are archived under a conflict path.
    #[default]
    #[serde(rename = "enable-conflicts")]
    EnableConflicts,
    /// Any conflict aborts the commit.
    #[serde(rename = "forbid-conflicts")]
    ForbidConflicts,
}

impl fmt::Display for ConflictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictMode::Ignore => "ignore",
            ConflictMode::EnableCheckpoints => "enable-checkpoints",
            ConflictMode::EnableConflicts => "enable-conflicts",
            ConflictMode::ForbidConflicts => "forbid-conflicts",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a diamond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiamondState {
    #[serde(rename = "initialized")]
    Initialized,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "canceled")]
    Canceled,
}

impl DiamondState {
    /// Done and Canceled are terminal: no further transition may succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DiamondState::Done | DiamondState::Canceled)
    }
}

impl fmt::Display for DiamondState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiamondState::Initialized => "initialized",
            DiamondState::Done => "done",
            DiamondState::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitState {
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "done")]
    Done,
}

impl fmt::Display for SplitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SplitState::Running => "running",
            SplitState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Configuration for a new diamond, validated before use.
#[derive(Debug, Clone, Default)]
pub struct DiamondConfig {
    /// Forces the diamond id instead of minting one. Used when replaying.
    pub diamond_id: Option<String>,
    /// Conflict handling mode recorded on the descriptor.
    pub mode: ConflictMode,
    /// Free-form tag carried into logs and the descriptor.
    pub tag: String,
}

impl DiamondConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(id) = &self.diamond_id {
            if id.is_empty() {
                return Err("a diamond must have a non-empty diamondID".to_string());
            }
        }
        Ok(())
    }
}

/// Metadata describing one diamond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiamondDescriptor {
    #[serde(rename = "diamondID")]
    pub diamond_id: String,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTime", default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub state: DiamondState,
    pub mode: ConflictMode,
    #[serde(rename = "hasConflicts", default, skip_serializing_if = "std::ops::Not::not")]
    pub has_conflicts: bool,
    #[serde(rename = "hasCheckpoints", default, skip_serializing_if = "std::ops::Not::not")]
    pub has_checkpoints: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
    #[serde(rename = "bundleID", default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    /// Snapshot of the contributing splits, filled only after a commit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub splits: Vec<SplitDescriptor>,
}

impl DiamondDescriptor {
    pub fn new(cfg: &DiamondConfig) -> Self {
        DiamondDescriptor {
            diamond_id: cfg.diamond_id.clone().unwrap_or_else(ordid),
            start_time: timestamp(),
            end_time: None,
            state: DiamondState::Initialized,
            mode: cfg.mode,
            has_conflicts: false,
            has_checkpoints: false,
            tag: cfg.tag.clone(),
            bundle_id: None,
            splits: Vec::new(),
        }
    }

    /// Moves the descriptor to `state`, stamping the transition time for
    /// terminal states.
    pub fn with_state(mut self, state: DiamondState) -> Self {
        if state == self.state {
            return self;
        }
        self.state = state;
        if state.is_terminal() {
            self.end_time = Some(timestamp());
        }
        self
    }
}

/// Metadata describing one split within a diamond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitDescriptor {
    #[serde(rename = "splitID")]
    pub split_id: String,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTime", default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub state: SplitState,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
    /// Unique location of the index files referenced by the final state.
    /// Chunks written under any other generation are ignored by the merge.
    #[serde(rename = "generationID", default, skip_serializing_if = "String::is_empty")]
    pub generation_id: String,
    /// Number of index chunk files written by this split.
    #[serde(rename = "count", default)]
    pub entry_chunk_count: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
}

impl SplitDescriptor {
    pub fn new(split_id: Option<String>, contributors: Vec<Contributor>, tag: String) -> Self {
        SplitDescriptor {
            split_id: split_id.unwrap_or_else(ordid),
            start_time: timestamp(),
            end_time: None,
            state: SplitState::Running,
            contributors,
            generation_id: String::new(),
            entry_chunk_count: 0,
            tag,
        }
    }

    /// Moves the descriptor to `state`, stamping the transition time.
    pub fn with_state(mut self, state: SplitState) -> Self {
        match state {
            SplitState::Running => {
                self.start_time = timestamp();
                self.end_time = None;
            }
            SplitState::Done => {
                self.end_time = Some(timestamp());
            }
        }
        self.state = state;
        self
    }
}
