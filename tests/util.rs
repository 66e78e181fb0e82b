//! Helpers shared by the integration tests.

use std::fs;
use std::path::Path;

use stockpile::prelude::*;
use url::Url;

/// A fresh store backed by the in-memory object_store backend.
pub fn memory_store(name: &str) -> ObjectStoreMeta {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let url = Url::parse(&format!("memory:///{name}")).unwrap();
    ObjectStoreMeta::with_url(&url).unwrap()
}

pub fn create_test_repo(store: &ObjectStoreMeta, name: &str) {
    create_repo(
        store,
        RepoDescriptor {
            name: name.to_string(),
            description: "integration fixtures".to_string(),
            ..Default::default()
        },
    )
    .expect("create repo");
}

/// Writes `files` as `(bundle path, content)` pairs under `dir` and returns
/// the matching upload sources.
pub fn source_tree(dir: &Path, files: &[(&str, &str)]) -> Vec<SourceFile> {
    files
        .iter()
        .map(|(path, content)| {
            let local = dir.join(path.replace('/', "_"));
            fs::write(&local, content).expect("write fixture");
            SourceFile {
                path: path.to_string(),
                local,
            }
        })
        .collect()
}

pub fn content_hash(content: &str) -> String {
    Fingerprint::digest(content.as_bytes()).to_hex()
}
