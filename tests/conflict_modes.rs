use stockpile::model::paths;
use stockpile::prelude::*;
use stockpile::repo::diamond::DiamondError;
use stockpile::repo::merge::MergeError;

mod util;
use util::{content_hash, create_test_repo, memory_store, source_tree};

/// Sets up a diamond with two completed splits both writing `shared` with
/// different content; `second` also writes a path of its own.
fn overlapping_diamond(store: &ObjectStoreMeta, mode: ConflictMode) -> String {
    create_test_repo(store, "datasets");
    let diamond = Diamond::initialize(
        store,
        "datasets",
        DiamondConfig {
            mode,
            ..Default::default()
        },
    )
    .expect("initialize");
    let diamond_id = diamond.diamond_id().to_string();

    let dir = tempfile::tempdir().expect("tempdir");
    let mut first = SplitWriter::create(
        store,
        "datasets",
        &diamond_id,
        SplitConfig {
            split_id: Some("first".to_string()),
            ..Default::default()
        },
    )
    .expect("create first");
    first
        .upload(source_tree(dir.path(), &[("shared", "from first")]))
        .expect("upload first");
    first.complete().expect("complete first");

    std::thread::sleep(std::time::Duration::from_millis(5));
    let mut second = SplitWriter::create(
        store,
        "datasets",
        &diamond_id,
        SplitConfig {
            split_id: Some("second".to_string()),
            ..Default::default()
        },
    )
    .expect("create second");
    second
        .upload(source_tree(dir.path(), &[("shared", "from second"), ("own", "x")]))
        .expect("upload second");
    second.complete().expect("complete second");

    diamond_id
}

#[test]
fn forbid_mode_aborts_without_writing_a_bundle() {
    let store = memory_store("forbid");
    let diamond_id = overlapping_diamond(&store, ConflictMode::ForbidConflicts);

    let diamond = Diamond::attach(&store, "datasets", &diamond_id).expect("attach");
    match diamond.commit(CommitConfig::default()) {
        Err(DiamondError::Merge(MergeError::ConflictForbidden { paths })) => {
            assert_eq!(paths, vec!["shared"]);
        }
        other => panic!("unexpected result: {:?}", other),
    }

    // no bundle object of any kind was created
    let keys: Vec<String> = store
        .list(&paths::bundles_prefix("datasets"))
        .collect::<Result<_, _>>()
        .expect("list");
    assert!(keys.is_empty(), "unexpected bundle objects: {:?}", keys);

    // the diamond is unchanged and retryable with a more permissive mode
    let diamond = Diamond::attach(&store, "datasets", &diamond_id).expect("attach");
    assert_eq!(diamond.descriptor().state, DiamondState::Initialized);
    let descriptor = diamond
        .commit(CommitConfig {
            message: "retry".to_string(),
            mode: Some(ConflictMode::EnableConflicts),
            ..Default::default()
        })
        .expect("retry commit");
    assert!(descriptor.has_conflicts);
    assert_eq!(descriptor.mode, ConflictMode::EnableConflicts);
}

#[test]
fn ignore_mode_keeps_only_the_latest_contribution() {
    let store = memory_store("ignore");
    let diamond_id = overlapping_diamond(&store, ConflictMode::Ignore);

    let diamond = Diamond::attach(&store, "datasets", &diamond_id).expect("attach");
    let descriptor = diamond
        .commit(CommitConfig {
            message: "silent".to_string(),
            ..Default::default()
        })
        .expect("commit");

    assert!(!descriptor.has_conflicts);
    assert!(!descriptor.has_checkpoints);

    let bundle = get_bundle(&store, "datasets", descriptor.bundle_id.as_ref().unwrap())
        .expect("get bundle");
    let entries = read_bundle_entries(&store, "datasets", &bundle).expect("read entries");
    let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["shared", "own"]);
    assert_eq!(entries.0[0].hash, content_hash("from second"));
}

#[test]
fn checkpoint_mode_archives_intermediate_states() {
    let store = memory_store("checkpoints");
    let diamond_id = overlapping_diamond(&store, ConflictMode::EnableCheckpoints);

    let diamond = Diamond::attach(&store, "datasets", &diamond_id).expect("attach");
    let descriptor = diamond
        .commit(CommitConfig {
            message: "incremental".to_string(),
            ..Default::default()
        })
        .expect("commit");

    assert!(descriptor.has_checkpoints);
    assert!(!descriptor.has_conflicts);

    let bundle = get_bundle(&store, "datasets", descriptor.bundle_id.as_ref().unwrap())
        .expect("get bundle");
    let entries = read_bundle_entries(&store, "datasets", &bundle).expect("read entries");
    let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["shared", "own", ".checkpoints/first/shared"]);
}
