use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn help_lists_record_command() {
    let mut cmd = Command::cargo_bin("journal-recorder").expect("Binary exists");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("record"));
}

#[test]
fn record_fails_for_missing_config() {
    let mut cmd = Command::cargo_bin("journal-recorder").expect("Binary exists");
    cmd.arg("record")
        .arg("--config")
        .arg("/definitely/not/here.yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn record_fails_for_ssh_target_without_host() {
    let dir = TempDir::new().unwrap();
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        format!("output_dir: {}\ntarget: ssh\n", dir.path().display()),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("journal-recorder").expect("Binary exists");
    cmd.arg("record")
        .arg("--config")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("ssh"));
}

#[cfg(unix)]
mod local {
    use journal_recorder_cli::{run_until, Cli, Commands};
    use serial_test::serial;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;

    const EXPORT: &str = concat!(
        "__CURSOR=s=1;i=1\n",
        "__REALTIME_TIMESTAMP=1342540861416409\n",
        "_BOOT_ID=6c7c6013a26343b29e964691ff25d04c\n",
        "SYSLOG_IDENTIFIER=sshd\n",
        "_PID=42\n",
        "MESSAGE=Accepted publickey for core\n",
        "\n",
    );

    #[tokio::test]
    #[serial]
    async fn record_local_journal_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let fixture = dir.path().join("fixture.export");
        fs::write(&fixture, EXPORT).unwrap();
        let journalctl = dir.path().join("journalctl");
        fs::write(
            &journalctl,
            format!("#!/bin/sh\ncat '{}'\nexec sleep 30\n", fixture.display()),
        )
        .unwrap();
        fs::set_permissions(&journalctl, fs::Permissions::from_mode(0o755)).unwrap();

        let out = dir.path().join("out");
        let config = dir.path().join("config.yaml");
        fs::write(
            &config,
            format!(
                "output_dir: {}\ntarget: local\nrecorder:\n  journalctl: {}\n  timezone: utc\n",
                out.display(),
                journalctl.display()
            ),
        )
        .unwrap();

        let journal_txt = out.join("journal.txt");
        let shutdown = {
            let journal_txt = journal_txt.clone();
            async move {
                for _ in 0..500 {
                    if fs::metadata(&journal_txt).map(|m| m.len() > 0).unwrap_or(false) {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        };

        let cli = Cli {
            command: Commands::Record { config },
        };
        tokio::time::timeout(Duration::from_secs(10), run_until(cli, shutdown))
            .await
            .expect("recording did not stop")
            .expect("recording failed");

        assert_eq!(
            fs::read_to_string(&journal_txt).unwrap(),
            "Jul 17 16:01:01.416409 sshd[42]: Accepted publickey for core\n"
        );
        assert!(out.join("journal-raw.txt.gz").exists());
    }
}
