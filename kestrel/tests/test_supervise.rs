//! Child supervision tests using real short-lived processes.

use kestrel::pipeline::Shutdown;
use kestrel::supervise;
use tokio::sync::mpsc;

fn sh(script: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

#[tokio::test]
async fn child_exit_status_reaches_the_shutdown_channel() {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket = dir.path().join("instrument.sock");

    let (child, pid) = supervise::spawn(&sh("exit 7"), &socket).expect("spawn");
    assert!(pid.0 > 0);

    let (tx, mut rx) = mpsc::channel(1);
    supervise::watch(child, tx).await;

    match rx.recv().await {
        Some(Shutdown::ChildExited(status)) => assert_eq!(status.code(), Some(7)),
        other => panic!("expected child exit notification, got {other:?}"),
    }
}

#[tokio::test]
async fn socket_path_is_exported_to_the_child() {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket = dir.path().join("instrument.sock");

    // The child succeeds only if KESTREL_SOCKET names our socket path.
    let script = format!("test \"$KESTREL_SOCKET\" = \"{}\"", socket.display());
    let (child, _pid) = supervise::spawn(&sh(&script), &socket).expect("spawn");

    let (tx, mut rx) = mpsc::channel(1);
    supervise::watch(child, tx).await;

    match rx.recv().await {
        Some(Shutdown::ChildExited(status)) => assert!(status.success()),
        other => panic!("expected child exit notification, got {other:?}"),
    }
}
