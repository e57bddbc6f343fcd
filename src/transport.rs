//! # transport: remote command sessions
//!
//! The recorder runs `journalctl` on a remote machine through a
//! [`SessionTransport`]: something that can run one shell command per
//! session, hand back its standard output, and report how it ended.
//!
//! ## Interface & Extensibility
//! - Implement [`SessionTransport`] for a new way of reaching a machine.
//! - [`SessionTransport::close`] must be idempotent and safe to call while a
//!   session is being read; reads of open sessions then end promptly.
//! - A session that ends because its connection was closed reports
//!   [`TransportError::ExitMissing`], which callers treat as a clean stop.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`, so tests can script sessions
//!   without a real machine.
//!
//! [`SshTransport`] is the concrete implementation, driving the system `ssh`
//! client.

use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use mockall::automock;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SshConfig;

#[derive(Error, Debug)]
pub enum TransportError {
    /// The session could not be opened.
    #[error("failed to open session: {0}")]
    Open(String),

    #[error("transport is closed")]
    Closed,

    #[error("remote command exited with status {0}")]
    ExitStatus(i32),

    #[error("remote command terminated: {0}")]
    ExitSignal(String),

    /// The session ended without an exit status because the connection was
    /// closed or cancelled.
    #[error("remote command exited without exit status")]
    ExitMissing,

    #[error("i/o error on session: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this is the expected outcome of a caller-initiated close.
    pub fn is_benign(&self) -> bool {
        matches!(self, TransportError::ExitMissing)
    }
}

pub type SessionOutput = Box<dyn AsyncRead + Send + Unpin>;
pub type SessionExit = BoxFuture<'static, Result<(), TransportError>>;

/// One running remote command.
pub struct Session {
    /// Standard output of the remote command.
    pub stdout: SessionOutput,
    /// Resolves when the remote command has finished.
    pub exit: SessionExit,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Start `command` (a single shell command line) in a new session.
    async fn open_session(&self, command: &str) -> Result<Session, TransportError>;

    /// Force-close the transport, ending every open session.
    fn close(&self);
}

/// Run `command` to completion and collect its standard output.
pub async fn output(
    transport: &dyn SessionTransport,
    command: &str,
) -> Result<Vec<u8>, TransportError> {
    let mut session = transport.open_session(command).await?;
    let mut out = Vec::new();
    session.stdout.read_to_end(&mut out).await?;
    session.exit.await?;
    Ok(out)
}

fn is_shell_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b",-./:=@_+%^".contains(&b)
}

/// Quote one word for a POSIX shell, escaping special characters with
/// backslashes.
pub fn quote_word(word: &str) -> String {
    if word.is_empty() {
        return "''".to_owned();
    }
    let mut quoted = String::with_capacity(word.len());
    for c in word.chars() {
        match c {
            '\n' => quoted.push_str("'\n'"),
            c if c.is_ascii() && is_shell_safe(c as u8) => quoted.push(c),
            c if !c.is_ascii() => quoted.push(c),
            c => {
                quoted.push('\\');
                quoted.push(c);
            }
        }
    }
    quoted
}

/// Join `words` into a single shell command line.
pub fn quote_command<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| quote_word(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn exit_result(status: ExitStatus) -> Result<(), TransportError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(TransportError::ExitStatus(code)),
        None => Err(TransportError::ExitSignal(status.to_string())),
    }
}

/// Sessions through the system `ssh` client, one client process per session.
pub struct SshTransport {
    config: SshConfig,
    closed: CancellationToken,
}

impl SshTransport {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            closed: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl SessionTransport for SshTransport {
    async fn open_session(&self, command: &str) -> Result<Session, TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let args = self.config.client_args();
        debug!(program = %self.config.program, ?args, command, "Opening ssh session");

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Open(format!("{}: {e}", self.config.program)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Open("ssh stdout not captured".to_owned()))?;

        // The client is reaped by its own task so that `close` kills it even
        // while nobody polls the exit future.
        let closed = self.closed.clone();
        let (mut exited_tx, exited_rx) = oneshot::channel();
        tokio::spawn(async move {
            let waited = tokio::select! {
                status = child.wait() => Some(status),
                _ = closed.cancelled() => None,
                _ = exited_tx.closed() => None,
            };
            let result = match waited {
                Some(Ok(status)) => exit_result(status),
                Some(Err(e)) => Err(TransportError::Io(e)),
                None => {
                    debug!("Stopping ssh client");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    Err(TransportError::ExitMissing)
                }
            };
            let _ = exited_tx.send(result);
        });

        let exit = async move {
            exited_rx
                .await
                .unwrap_or(Err(TransportError::ExitMissing))
        }
        .boxed();

        Ok(Session {
            stdout: Box::new(stdout),
            exit,
        })
    }

    fn close(&self) {
        self.closed.cancel();
    }
}
