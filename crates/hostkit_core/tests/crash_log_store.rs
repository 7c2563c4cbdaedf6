use hostkit_core::crash::{CrashLogStore, CrashReport, CrashStoreError, MAX_CRASH_LOGS};
use std::path::Path;

fn file_name(path: &Path) -> String {
    path.file_name()
        .expect("crash file name")
        .to_string_lossy()
        .into_owned()
}

#[test]
fn fifty_one_saves_keep_the_fifty_newest() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = CrashLogStore::open(dir.path()).expect("open store");

    let mut saved = Vec::new();
    for index in 0..51 {
        let path = store
            .save(&format!("report #{index}"))
            .expect("save crash report");
        assert_eq!(
            store.pending_file_name().as_deref(),
            Some(file_name(&path).as_str()),
            "pending marker must name the latest save"
        );
        saved.push(path);
    }

    assert_eq!(store.count().expect("count"), MAX_CRASH_LOGS);
    assert!(!saved[0].exists(), "oldest report is trimmed");
    for path in &saved[1..] {
        assert!(path.exists(), "{} should be kept", path.display());
    }

    let listed = store.list().expect("list");
    assert_eq!(listed.first(), saved.last());
    assert_eq!(listed.last(), saved.get(1));
}

#[test]
fn reports_can_be_read_and_deleted() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = CrashLogStore::open(dir.path()).expect("open store");
    let first = file_name(&store.save("first").expect("save first"));
    let second = file_name(&store.save("second").expect("save second"));

    assert_eq!(store.read(&first).expect("read").as_deref(), Some("first"));
    assert!(store.delete(&first).expect("delete"));
    assert!(!store.delete(&first).expect("delete again"));
    assert_eq!(store.read(&first).expect("read deleted"), None);
    assert_eq!(store.pending_file_name(), Some(second));

    assert_eq!(store.delete_all().expect("delete all"), 1);
    assert_eq!(store.count().expect("count"), 0);
    assert!(store.pending_file_name().is_none());
}

#[test]
fn pending_marker_is_cleared_when_its_file_is_missing() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = CrashLogStore::open(dir.path()).expect("open store");
    let path = store.save("lost").expect("save");
    assert!(store.has_pending());

    std::fs::remove_file(&path).expect("remove report behind the store");

    assert!(store.pending_file().is_none());
    assert!(store.pending_file_name().is_none());
}

#[test]
fn acknowledging_keeps_the_report() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = CrashLogStore::open(dir.path()).expect("open store");
    let path = store.save("seen").expect("save");

    store.clear_pending().expect("clear pending");

    assert!(!store.has_pending());
    assert!(path.exists());
}

#[test]
fn names_outside_the_store_are_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = CrashLogStore::open(dir.path()).expect("open store");
    for name in ["../secrets.log", "crash_/../x.log", "notes.txt", "pending_crash.flag"] {
        assert!(matches!(
            store.read(name),
            Err(CrashStoreError::InvalidName(_))
        ));
    }
}

#[test]
fn rendered_panic_report_round_trips_through_the_store() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = CrashLogStore::open(dir.path()).expect("open store");
    let report = CrashReport::new("PANIC", "payload entry point exploded");

    let path = store.save(&report.render()).expect("save");
    let text = store
        .read(&file_name(&path))
        .expect("read")
        .expect("report exists");

    assert!(text.starts_with("========"));
    assert!(text.contains("Crash Type: PANIC"));
    assert!(text.contains("Message: payload entry point exploded"));
    assert!(text.trim_end().ends_with("========"));
}
