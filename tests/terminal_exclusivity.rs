use std::thread;

use stockpile::prelude::*;
use stockpile::repo::diamond::DiamondError;

mod util;
use util::{create_test_repo, memory_store, source_tree};

fn diamond_with_one_split(store: &ObjectStoreMeta, name: &str) -> String {
    create_test_repo(store, "datasets");
    let diamond =
        Diamond::initialize(store, "datasets", DiamondConfig::default()).expect("initialize");
    let diamond_id = diamond.diamond_id().to_string();

    let dir = tempfile::tempdir().expect("tempdir");
    let mut split =
        SplitWriter::create(store, "datasets", &diamond_id, SplitConfig::default())
            .expect("create split");
    split
        .upload(source_tree(dir.path(), &[(name, "payload")]))
        .expect("upload");
    split.complete().expect("complete");
    diamond_id
}

#[test]
fn cancel_after_commit_is_rejected() {
    let store = memory_store("excl-1");
    let diamond_id = diamond_with_one_split(&store, "a");

    let committer = Diamond::attach(&store, "datasets", &diamond_id).expect("attach");
    committer
        .commit(CommitConfig {
            message: "winner".to_string(),
            ..Default::default()
        })
        .expect("commit");

    let canceler = Diamond::attach(&store, "datasets", &diamond_id).expect("attach");
    match canceler.cancel() {
        Err(DiamondError::UnexpectedUpdate { .. }) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn commit_after_cancel_is_rejected() {
    let store = memory_store("excl-2");
    let diamond_id = diamond_with_one_split(&store, "a");

    let canceler = Diamond::attach(&store, "datasets", &diamond_id).expect("attach");
    let descriptor = canceler.cancel().expect("cancel");
    assert_eq!(descriptor.state, DiamondState::Canceled);
    assert!(descriptor.bundle_id.is_none());

    let committer = Diamond::attach(&store, "datasets", &diamond_id).expect("attach");
    match committer.commit(CommitConfig::default()) {
        Err(DiamondError::UnexpectedUpdate { .. }) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn racing_commits_succeed_exactly_once() {
    let store = memory_store("excl-3");
    let diamond_id = diamond_with_one_split(&store, "a");

    let results: Vec<Result<DiamondDescriptor, DiamondError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = &store;
                let diamond_id = diamond_id.as_str();
                scope.spawn(move || {
                    let diamond = Diamond::attach(store, "datasets", diamond_id)?;
                    diamond.commit(CommitConfig {
                        message: format!("contender {i}"),
                        ..Default::default()
                    })
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("join")).collect()
    });

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for result in results {
        match result {
            Ok(descriptor) => assert_eq!(descriptor.state, DiamondState::Done),
            Err(DiamondError::UnexpectedUpdate { .. }) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
}

#[test]
fn new_splits_are_rejected_on_terminated_diamonds() {
    let store = memory_store("excl-4");
    let diamond_id = diamond_with_one_split(&store, "a");
    Diamond::attach(&store, "datasets", &diamond_id)
        .expect("attach")
        .cancel()
        .expect("cancel");

    match SplitWriter::create(&store, "datasets", &diamond_id, SplitConfig::default()) {
        Err(stockpile::repo::split::SplitError::DiamondNotReady { state, .. }) => {
            assert_eq!(state, DiamondState::Canceled);
        }
        other => panic!("unexpected result: {:?}", other.map(|w| w.split_id().to_string())),
    }
}
