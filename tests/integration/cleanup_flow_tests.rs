//! Artifact cleanup driven by session end.
#![cfg(unix)]

use std::fs;

use live_transmux::Session;

use super::test_helpers::{config_in, wait_ended};

fn seed(dir: &std::path::Path) {
    fs::create_dir_all(dir).expect("out dir");
    for name in ["seg1.ts", "index.m3u8", "keep.mp4"] {
        fs::write(dir.join(name), b"x").expect("seed artifact");
    }
}

#[tokio::test]
async fn remove_on_exit_deletes_artifacts_before_ended_fires() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = temp.path().join("s1");
    seed(&out);

    let config = config_in(&out, "true #").with_remove_on_exit(true);
    let mut session = Session::new(config).expect("session");
    let mut ended = session.subscribe();

    session.run().expect("run");
    wait_ended(&mut ended).await;

    assert!(!out.join("seg1.ts").exists());
    assert!(!out.join("index.m3u8").exists());
    assert!(out.join("keep.mp4").exists());
    assert!(out.is_dir());
}

#[tokio::test]
async fn artifacts_survive_when_cleanup_disabled() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = temp.path().join("s1");
    seed(&out);

    let mut session = Session::new(config_in(&out, "exit 1 #")).expect("session");
    let mut ended = session.subscribe();

    session.run().expect("run");
    wait_ended(&mut ended).await;

    assert!(out.join("seg1.ts").exists());
    assert!(out.join("index.m3u8").exists());
}
