#![cfg(unix)]

mod common;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::{Collect, SharedBuf, CURSOR_BINARY, CURSOR_TEXT, EXPORT_BINARY, EXPORT_TEXT};
use journal_recorder::{RecordError, Recorder, TransportError};
use serial_test::serial;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Install a fake `journalctl` that logs its arguments to `args.log`, prints
/// `fixture` and then runs `tail`.
fn fake_journalctl(dir: &Path, fixture: &str, tail: &str) -> PathBuf {
    let fixture_path = dir.join("fixture.export");
    fs::write(&fixture_path, fixture).unwrap();

    let script = dir.join("journalctl");
    let body = format!(
        "#!/bin/sh\necho \"$@\" >> '{args}'\ncat '{fixture}'\n{tail}\n",
        args = dir.join("args.log").display(),
        fixture = fixture_path.display(),
    );
    fs::write(&script, body).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

fn logged_args(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("args.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[tokio::test]
#[serial]
async fn test_local_recording_resumes_after_cursor() {
    let dir = TempDir::new().unwrap();
    let collect = Collect::default();
    let raw = SharedBuf::default();

    let script = fake_journalctl(dir.path(), EXPORT_TEXT, "exit 0");
    let mut recorder = Recorder::new(collect.clone(), raw.clone()).with_journalctl(&script);
    recorder.run_local(CancellationToken::new()).await.unwrap();
    assert_eq!(recorder.cursor().as_deref(), Some(CURSOR_TEXT));

    fake_journalctl(dir.path(), EXPORT_BINARY, "exit 0");
    recorder.run_local(CancellationToken::new()).await.unwrap();
    assert_eq!(recorder.cursor().as_deref(), Some(CURSOR_BINARY));

    assert_eq!(
        logged_args(dir.path()),
        vec![
            "--output=export --follow --lines=all --boot".to_owned(),
            format!("--output=export --follow --lines=all --after-cursor {CURSOR_TEXT}"),
        ]
    );
    assert_eq!(collect.messages().len(), 3);
    assert_eq!(raw.contents(), [EXPORT_TEXT, EXPORT_BINARY].concat().as_bytes());
}

#[tokio::test]
#[serial]
async fn test_cancel_stops_local_follower() {
    let dir = TempDir::new().unwrap();
    let collect = Collect::default();
    let script = fake_journalctl(dir.path(), EXPORT_TEXT, "exec sleep 30");

    let mut recorder =
        Recorder::new(collect.clone(), SharedBuf::default()).with_journalctl(&script);
    let cancel = CancellationToken::new();
    recorder.start_local(cancel.clone()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while recorder.cursor().as_deref() != Some(CURSOR_TEXT) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("journalctl output never arrived");

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), recorder.wait())
        .await
        .expect("journalctl was not stopped");
    assert!(result.is_ok(), "{result:?}");
    assert_eq!(collect.messages().len(), 2);
}

#[tokio::test]
#[serial]
async fn test_failing_journalctl_reports_exit_status() {
    let dir = TempDir::new().unwrap();
    let collect = Collect::default();
    let script = fake_journalctl(dir.path(), EXPORT_TEXT, "exit 3");

    let mut recorder =
        Recorder::new(collect.clone(), SharedBuf::default()).with_journalctl(&script);
    let err = recorder
        .run_local(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(
        matches!(err, RecordError::Transport(TransportError::ExitStatus(3))),
        "{err:?}"
    );
    assert_eq!(collect.messages().len(), 2);
}

#[tokio::test]
#[serial]
async fn test_missing_journalctl_fails_to_start() {
    let dir = TempDir::new().unwrap();
    let mut recorder = Recorder::new(Collect::default(), SharedBuf::default())
        .with_journalctl(dir.path().join("no-such-journalctl"));

    let err = recorder.start_local(CancellationToken::new()).unwrap_err();
    assert!(matches!(err, RecordError::Spawn { .. }), "{err:?}");
    assert!(!recorder.is_running());

    // Nothing was started, so there is nothing to wait for.
    recorder.wait().await.unwrap();
}
