//! Forced termination through `Session::end`.
#![cfg(unix)]

use std::time::Duration;

use live_transmux::Session;

use super::test_helpers::{config_in, wait_ended};

#[tokio::test]
async fn end_before_run_is_a_no_op() {
    let temp = tempfile::tempdir().expect("tempdir");
    let session = Session::new(config_in(temp.path(), "true #")).expect("session");
    let ended = session.subscribe();

    session.end();
    session.end();

    assert!(!session.is_running());
    assert_eq!(ended.peek(), None);
}

#[tokio::test]
async fn end_sends_sigterm_to_running_process() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = Session::new(config_in(temp.path(), "exec sleep 30 #")).expect("session");
    let mut ended = session.subscribe();

    session.run().expect("run");
    assert!(session.is_running());
    assert!(session.pid().is_some());

    session.end();
    session.end();
    let end = wait_ended(&mut ended).await;

    assert_eq!(end.exit_code, None);
    assert_eq!(end.signal, Some(15));
    assert_eq!(end.reason, "process terminated by signal 15");
    assert!(!session.is_running());
}

#[tokio::test]
async fn end_after_exit_does_not_refire() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = Session::new(config_in(temp.path(), "true #")).expect("session");
    let mut ended = session.subscribe();

    session.run().expect("run");
    let end = wait_ended(&mut ended).await;

    session.end();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(ended.peek(), Some(end));
    assert!(!session.is_running());
    assert_eq!(session.pid(), None);
}

#[tokio::test]
async fn end_reaches_every_process_in_the_pipeline() {
    for command in ["sleep 30 | cat #", "sleep 30; true #"] {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut session = Session::new(config_in(temp.path(), command)).expect("session");
        let mut ended = session.subscribe();

        session.run().expect("run");
        tokio::time::sleep(Duration::from_millis(200)).await;
        session.end();

        let end = tokio::time::timeout(Duration::from_secs(5), ended.wait())
            .await
            .unwrap_or_else(|_| panic!("`{command}` outlived end()"))
            .expect("session dropped without ending");
        assert!(!end.success(), "{command}: {end:?}");
        assert_eq!(end.signal, Some(15), "{command}");
        assert!(!session.is_running());
    }
}
