use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stockpile::prelude::*;
use stockpile::repo::split::SplitError;

mod util;
use util::{content_hash, create_test_repo, memory_store, source_tree};

#[test]
fn resumed_split_abandons_earlier_generation() {
    let store = memory_store("resume");
    create_test_repo(&store, "datasets");
    let diamond =
        Diamond::initialize(&store, "datasets", DiamondConfig::default()).expect("initialize");
    let diamond_id = diamond.diamond_id().to_string();

    let dir = tempfile::tempdir().expect("tempdir");

    // first attempt: writes an index chunk, then the producer dies before done
    let mut attempt1 = SplitWriter::create(
        &store,
        "datasets",
        &diamond_id,
        SplitConfig {
            split_id: Some("ingest-1".to_string()),
            entries_per_index: 1,
            ..Default::default()
        },
    )
    .expect("create attempt 1");
    let generation1 = attempt1.generation_id().to_string();
    attempt1
        .upload(source_tree(dir.path(), &[("a", "stale"), ("zombie", "junk")]))
        .expect("upload attempt 1");
    drop(attempt1);

    // replaying the same split id resumes the descriptor under a new generation
    let mut attempt2 = SplitWriter::create(
        &store,
        "datasets",
        &diamond_id,
        SplitConfig {
            split_id: Some("ingest-1".to_string()),
            entries_per_index: 1,
            ..Default::default()
        },
    )
    .expect("create attempt 2");
    assert_ne!(attempt2.generation_id(), generation1);
    attempt2
        .upload(source_tree(dir.path(), &[("a", "fresh"), ("b", "new")]))
        .expect("upload attempt 2");
    let outcome = attempt2.complete().expect("complete");
    assert_eq!(outcome.descriptor.split_id, "ingest-1");
    assert_eq!(outcome.uploaded, 2);

    let descriptor = diamond
        .commit(CommitConfig {
            message: "replayed".to_string(),
            ..Default::default()
        })
        .expect("commit");

    let bundle = get_bundle(&store, "datasets", descriptor.bundle_id.as_ref().unwrap())
        .expect("get bundle");
    let entries = read_bundle_entries(&store, "datasets", &bundle).expect("read entries");
    let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["a", "b"]);
    assert_eq!(entries.0[0].hash, content_hash("fresh"));
    assert!(entries.iter().all(|e| e.path != "zombie"));
}

#[test]
fn completed_split_id_cannot_be_reused() {
    let store = memory_store("reuse");
    create_test_repo(&store, "datasets");
    let diamond =
        Diamond::initialize(&store, "datasets", DiamondConfig::default()).expect("initialize");

    let dir = tempfile::tempdir().expect("tempdir");
    let mut split = SplitWriter::create(
        &store,
        "datasets",
        diamond.diamond_id(),
        SplitConfig {
            split_id: Some("ingest-1".to_string()),
            ..Default::default()
        },
    )
    .expect("create");
    split.upload(source_tree(dir.path(), &[("a", "1")])).expect("upload");
    split.complete().expect("complete");

    match SplitWriter::create(
        &store,
        "datasets",
        diamond.diamond_id(),
        SplitConfig {
            split_id: Some("ingest-1".to_string()),
            ..Default::default()
        },
    ) {
        Err(SplitError::AlreadyDone { split_id }) => assert_eq!(split_id, "ingest-1"),
        other => panic!("unexpected result: {:?}", other.map(|w| w.split_id().to_string())),
    }
}

#[test]
fn must_exist_requires_prior_registration() {
    let store = memory_store("must-exist");
    create_test_repo(&store, "datasets");
    let diamond =
        Diamond::initialize(&store, "datasets", DiamondConfig::default()).expect("initialize");

    match SplitWriter::create(
        &store,
        "datasets",
        diamond.diamond_id(),
        SplitConfig {
            split_id: Some("replayed".to_string()),
            must_exist: true,
            ..Default::default()
        },
    ) {
        Err(SplitError::MustExist { split_id }) => assert_eq!(split_id, "replayed"),
        other => panic!("unexpected result: {:?}", other.map(|w| w.split_id().to_string())),
    }
}

#[test]
fn unreadable_sources_are_skipped_when_allowed() {
    let store = memory_store("skip");
    create_test_repo(&store, "datasets");
    let diamond =
        Diamond::initialize(&store, "datasets", DiamondConfig::default()).expect("initialize");

    let dir = tempfile::tempdir().expect("tempdir");
    let mut sources = source_tree(dir.path(), &[("good", "data")]);
    sources.push(SourceFile {
        path: "missing".to_string(),
        local: dir.path().join("does-not-exist"),
    });

    let mut split = SplitWriter::create(
        &store,
        "datasets",
        diamond.diamond_id(),
        SplitConfig {
            skip_missing: true,
            ..Default::default()
        },
    )
    .expect("create");
    split.upload(sources).expect("upload");
    let outcome = split.complete().expect("complete");

    assert_eq!(outcome.uploaded, 1);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].path, "missing");
}

#[test]
fn unreadable_sources_are_fatal_by_default() {
    let store = memory_store("fatal");
    create_test_repo(&store, "datasets");
    let diamond =
        Diamond::initialize(&store, "datasets", DiamondConfig::default()).expect("initialize");

    let dir = tempfile::tempdir().expect("tempdir");
    let mut split = SplitWriter::create(
        &store,
        "datasets",
        diamond.diamond_id(),
        SplitConfig::default(),
    )
    .expect("create");

    let sources = vec![SourceFile {
        path: "missing".to_string(),
        local: dir.path().join("does-not-exist"),
    }];
    match split.upload(sources) {
        Err(SplitError::Source { path, .. }) => assert_eq!(path, "missing"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn stop_flag_interrupts_the_session() {
    let store = memory_store("interrupt");
    create_test_repo(&store, "datasets");
    let diamond =
        Diamond::initialize(&store, "datasets", DiamondConfig::default()).expect("initialize");

    let stop = Arc::new(AtomicBool::new(false));
    let dir = tempfile::tempdir().expect("tempdir");
    let mut split = SplitWriter::create(
        &store,
        "datasets",
        diamond.diamond_id(),
        SplitConfig {
            stop: Some(stop.clone()),
            ..Default::default()
        },
    )
    .expect("create");

    stop.store(true, Ordering::Relaxed);
    match split.upload(source_tree(dir.path(), &[("a", "1")])) {
        Err(SplitError::Interrupted) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}
