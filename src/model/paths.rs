//! Archive path derivations.
//!
//! Every lifecycle record lives at a fixed path relative to the repo's
//! metadata root. The running/done file names double as the state machine's
//! storage representation: an initialized diamond owns
//! `diamond-running.yaml`, and whichever terminal transition wins the
//! create-once race owns `diamond-done.yaml`.

use crate::model::{DiamondState, SplitState};

const EXT: &str = ".yaml";
const DIAMOND_RUNNING: &str = "diamond-running.yaml";
const DIAMOND_DONE: &str = "diamond-done.yaml";
const SPLIT_RUNNING: &str = "split-running.yaml";
const SPLIT_DONE: &str = "split-done.yaml";
const FILE_INDEX_PREFIX: &str = "bundle-files-";

/// `repos/{repo}/repo.yaml`
pub fn repo_descriptor(repo: &str) -> String {
    format!("repos/{repo}/repo{EXT}")
}

/// `diamonds/{repo}/`
pub fn diamonds_prefix(repo: &str) -> String {
    format!("diamonds/{repo}/")
}

/// `diamonds/{repo}/{diamond}/diamond-running.yaml` or `diamond-done.yaml`,
/// depending on whether the state is terminal.
pub fn diamond_descriptor(repo: &str, diamond_id: &str, state: DiamondState) -> String {
    let file = if state.is_terminal() {
        DIAMOND_DONE
    } else {
        DIAMOND_RUNNING
    };
    format!("diamonds/{repo}/{diamond_id}/{file}")
}

pub fn diamond_running(repo: &str, diamond_id: &str) -> String {
    format!("diamonds/{repo}/{diamond_id}/{DIAMOND_RUNNING}")
}

pub fn diamond_done(repo: &str, diamond_id: &str) -> String {
    format!("diamonds/{repo}/{diamond_id}/{DIAMOND_DONE}")
}

/// `diamonds/{repo}/{diamond}/splits/`
pub fn splits_prefix(repo: &str, diamond_id: &str) -> String {
    format!("diamonds/{repo}/{diamond_id}/splits/")
}

pub fn split_descriptor(repo: &str, diamond_id: &str, split_id: &str, state: SplitState) -> String {
    let file = match state {
        SplitState::Running => SPLIT_RUNNING,
        SplitState::Done => SPLIT_DONE,
    };
    format!("diamonds/{repo}/{diamond_id}/splits/{split_id}/{file}")
}

pub fn split_running(repo: &str, diamond_id: &str, split_id: &str) -> String {
    split_descriptor(repo, diamond_id, split_id, SplitState::Running)
}

pub fn split_done(repo: &str, diamond_id: &str, split_id: &str) -> String {
    split_descriptor(repo, diamond_id, split_id, SplitState::Done)
}

/// `diamonds/{repo}/{diamond}/splits/{split}/{generation}/bundle-files-{index}.yaml`
pub fn split_file_list(
    repo: &str,
    diamond_id: &str,
    split_id: &str,
    generation_id: &str,
    index: u64,
) -> String {
    format!(
        "diamonds/{repo}/{diamond_id}/splits/{split_id}/{generation_id}/{FILE_INDEX_PREFIX}{index}{EXT}"
    )
}

/// `bundles/{repo}/`
pub fn bundles_prefix(repo: &str) -> String {
    format!("bundles/{repo}/")
}

/// `bundles/{repo}/{bundle}/bundle.yaml`
pub fn bundle_descriptor(repo: &str, bundle_id: &str) -> String {
    format!("bundles/{repo}/{bundle_id}/bundle{EXT}")
}

/// `bundles/{repo}/{bundle}/bundle-files-{index}.yaml`
pub fn bundle_file_list(repo: &str, bundle_id: &str, index: u64) -> String {
    format!("bundles/{repo}/{bundle_id}/{FILE_INDEX_PREFIX}{index}{EXT}")
}

/// `labels/{repo}/{label}/label.yaml`
pub fn label_descriptor(repo: &str, label: &str) -> String {
    format!("labels/{repo}/{label}/label{EXT}")
}

/// `blobs/{fingerprint}`, the content-addressed file payloads.
pub fn blob(fingerprint_hex: &str) -> String {
    format!("blobs/{fingerprint_hex}")
}

/// Path in the dataset under which a conflicting contribution is archived.
pub fn conflict_path(split_id: &str, path: &str) -> String {
    format!(".conflicts/{split_id}/{path}")
}

/// Path in the dataset under which a checkpointed contribution is archived.
pub fn checkpoint_path(split_id: &str, path: &str) -> String {
    format!(".checkpoints/{split_id}/{path}")
}

/// Extracts the split id from a listed `split-done.yaml` key, if the key
/// names one under the given prefix.
pub fn split_id_of_final_descriptor<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    let rest = key.strip_prefix(prefix)?;
    let (split_id, file) = rest.split_once('/')?;
    (file == SPLIT_DONE && !split_id.is_empty()).then_some(split_id)
}
