mod common;

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use wc_bridge_adapters::SessionStoreAdapter;
use wc_bridge_core::{PortError, SessionStorePort, SessionUpdate};

use common::{account, active_session, TestClock};

fn snapshot_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("wc-bridge-{}-{name}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join("sessions.json");
    let _ = fs::remove_file(&path);
    path
}

#[test]
fn sessions_survive_reopen() {
    let path = snapshot_path("reopen");
    {
        let store = SessionStoreAdapter::open_with_clock(&path, TestClock::default())
            .expect("open empty store");
        store
            .add_or_update(&active_session("t1", &[1, 137]))
            .expect("insert t1");
        store
            .add_or_update(&active_session("t2", &[10]))
            .expect("insert t2");
        store
            .update("t1", SessionUpdate::Accounts(BTreeSet::from([account(1)])))
            .expect("narrow t1");
        assert!(store.remove("t2").expect("remove t2"));
    }

    let reopened =
        SessionStoreAdapter::open_with_clock(&path, TestClock::default()).expect("reopen");
    let sessions = reopened.all().expect("all");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].topic, "t1");
    assert_eq!(sessions[0].accounts(), BTreeSet::from([account(1)]));
    assert_eq!(sessions[0].servers.len(), 2);
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn unknown_snapshot_version_is_refused() {
    let path = snapshot_path("version");
    fs::write(&path, r#"{"schemaVersion":99,"sessions":[]}"#).expect("write snapshot");

    let err = SessionStoreAdapter::open_with_clock(&path, TestClock::default())
        .expect_err("unsupported version");
    assert!(matches!(err, PortError::Validation(_)));
}

#[test]
fn corrupt_snapshot_is_refused() {
    let path = snapshot_path("corrupt");
    fs::write(&path, b"not json").expect("write snapshot");

    let err = SessionStoreAdapter::open_with_clock(&path, TestClock::default())
        .expect_err("corrupt snapshot");
    assert!(matches!(err, PortError::Validation(_)));
}

#[test]
fn clones_share_one_session_map() {
    let store = SessionStoreAdapter::with_clock(TestClock::default());
    let other = store.clone();
    store
        .add_or_update(&active_session("t1", &[1]))
        .expect("insert");
    assert!(other.contains("t1").expect("contains"));
    assert!(other.remove("t1").expect("remove"));
    assert!(!store.remove("t1").expect("remove again"));
}

#[test]
fn failed_write_leaves_memory_on_the_last_snapshot() {
    let path = snapshot_path("unwritable");
    let store = SessionStoreAdapter::open_with_clock(&path, TestClock::default())
        .expect("open empty store");
    let before = store
        .add_or_update(&active_session("t1", &[1, 137]))
        .expect("insert t1");
    fs::remove_dir_all(path.parent().expect("snapshot dir")).expect("remove snapshot dir");

    let err = store
        .update("t1", SessionUpdate::Accounts(BTreeSet::from([account(1)])))
        .expect_err("snapshot dir is gone");
    assert!(matches!(err, PortError::Transport(_)));
    assert_eq!(store.session("t1").expect("read"), Some(before.clone()));

    store
        .add_or_update(&active_session("t2", &[10]))
        .expect_err("insert without snapshot dir");
    assert!(!store.contains("t2").expect("contains"));

    store.remove("t1").expect_err("remove without snapshot dir");
    assert_eq!(store.session("t1").expect("read"), Some(before));
}
