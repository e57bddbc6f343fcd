//! # record: following a live journal
//!
//! A [`Recorder`] runs `journalctl --output=export --follow` locally or over a
//! [`SessionTransport`], copies the raw stream into a capture sink, parses it
//! and hands each entry to a [`Formatter`].
//!
//! # Responsibilities
//! - Resume after the last seen `__CURSOR`, or start from the current boot.
//! - One background task per session owns the read loop; entries reach the
//!   formatter in stream order and the cursor is updated before each one is
//!   formatted.
//! - Cancellation closes the transport (or kills `journalctl`) so the read
//!   ends promptly; a close we caused is reported as success.
//! - Parse errors end the session. Reconnecting is up to the caller, which
//!   can simply start again: the recorder keeps its cursor, formatter and
//!   raw sink across sessions.
//!
//! # Navigation
//! - Entrypoints: [`Recorder::start_local`], [`Recorder::start_ssh`],
//!   [`Recorder::wait`] and the `run_*` shorthands.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::export::{ExportError, ExportReader};
use crate::format::Formatter;
use crate::tee::{SinkError, TeeReader};
use crate::transport::{exit_result, quote_command, Session, SessionTransport, TransportError};

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("journalctl stdout not captured")]
    MissingStdout,

    #[error("reading journal export stream: {0}")]
    Export(#[from] ExportError),

    #[error("formatting journal entry: {0}")]
    Format(#[source] io::Error),

    #[error("writing raw journal: {0}")]
    Raw(#[source] io::Error),

    #[error("journal session: {0}")]
    Transport(#[from] TransportError),

    #[error("a recording is already running")]
    AlreadyRunning,

    /// The background task died and took the formatter and raw sink with it.
    #[error("recording task failed: {0}")]
    Task(String),
}

/// What a session borrows from the recorder while it runs.
struct RecordState<W> {
    formatter: Box<dyn Formatter>,
    raw: W,
}

type Completion<W> = JoinHandle<(RecordState<W>, Result<(), RecordError>)>;

/// Records a journal stream, resuming from its last cursor on each start.
///
/// `W` receives the exact bytes of the export stream. It is append-only and
/// lives as long as the recorder, across sessions.
pub struct Recorder<W = Box<dyn Write + Send>> {
    state: Option<RecordState<W>>,
    running: Option<Completion<W>>,
    cursor: Arc<watch::Sender<Option<String>>>,
    journalctl: PathBuf,
}

impl<W> Recorder<W>
where
    W: Write + Send + Unpin + 'static,
{
    pub fn new<F>(formatter: F, raw: W) -> Self
    where
        F: Formatter + 'static,
    {
        let (cursor, _) = watch::channel(None);
        Self {
            state: Some(RecordState {
                formatter: Box::new(formatter),
                raw,
            }),
            running: None,
            cursor: Arc::new(cursor),
            journalctl: PathBuf::from("journalctl"),
        }
    }

    /// Resume after `cursor` instead of starting at the current boot.
    pub fn with_cursor(self, cursor: impl Into<String>) -> Self {
        self.cursor.send_replace(Some(cursor.into()));
        self
    }

    /// Program run by [`Recorder::start_local`].
    pub fn with_journalctl(mut self, program: impl AsRef<Path>) -> Self {
        self.journalctl = program.as_ref().to_path_buf();
        self
    }

    /// Cursor of the last entry consumed, live while a session runs.
    pub fn cursor(&self) -> Option<String> {
        self.cursor.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// `journalctl` arguments for the next session.
    pub fn journal_args(&self) -> Vec<String> {
        let mut args = vec![
            "--output=export".to_owned(),
            "--follow".to_owned(),
            "--lines=all".to_owned(),
        ];
        match self.cursor() {
            Some(cursor) => {
                args.push("--after-cursor".to_owned());
                args.push(cursor);
            }
            None => args.push("--boot".to_owned()),
        }
        args
    }

    /// Remote command line for the next session.
    pub fn remote_command(&self) -> String {
        let mut words = vec!["journalctl".to_owned()];
        words.extend(self.journal_args());
        quote_command(&words)
    }

    fn take_state(&mut self) -> Result<RecordState<W>, RecordError> {
        if self.running.is_some() {
            return Err(RecordError::AlreadyRunning);
        }
        self.state
            .take()
            .ok_or_else(|| RecordError::Task("recorder state was lost".to_owned()))
    }

    /// Start following the local journal.
    ///
    /// Returns once `journalctl` has been spawned; its stderr goes to ours.
    /// Must be called within a tokio runtime.
    pub fn start_local(&mut self, cancel: CancellationToken) -> Result<(), RecordError> {
        let mut state = self.take_state()?;
        let args = self.journal_args();

        let spawned = Command::new(&self.journalctl)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                self.state = Some(state);
                return Err(RecordError::Spawn {
                    program: self.journalctl.display().to_string(),
                    source,
                });
            }
        };
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                self.state = Some(state);
                return Err(RecordError::MissingStdout);
            }
        };

        info!(program = %self.journalctl.display(), ?args, "Started local journal recording");

        let cursor = self.cursor.clone();
        self.running = Some(tokio::spawn(async move {
            let recorded = {
                let reading = record(&mut state, stdout, &cursor);
                tokio::pin!(reading);
                let finished = tokio::select! {
                    res = &mut reading => Some(res),
                    _ = cancel.cancelled() => None,
                };
                match finished {
                    Some(res) => res,
                    None => {
                        debug!("Recording cancelled, stopping journalctl");
                        let _ = child.start_kill();
                        reading.await
                    }
                }
            };

            // A follower that is still running after a stream error would
            // never exit on its own.
            if recorded.is_err() {
                let _ = child.start_kill();
            }
            let exited = match child.wait().await {
                Ok(status) => exit_result(status),
                Err(e) => Err(TransportError::Io(e)),
            };
            let exited = match exited {
                Err(e) if cancel.is_cancelled() => {
                    debug!(error = %e, "Ignoring journalctl exit after cancellation");
                    Ok(())
                }
                other => other,
            };

            let result = finish(&mut state, recorded, exited);
            (state, result)
        }));
        Ok(())
    }

    /// Start following a remote journal over `transport`.
    ///
    /// Returns once the remote session is open. Cancelling `cancel` closes the
    /// transport, which ends the session.
    pub async fn start_ssh(
        &mut self,
        cancel: CancellationToken,
        transport: Arc<dyn SessionTransport>,
    ) -> Result<(), RecordError> {
        let mut state = self.take_state()?;
        let command = self.remote_command();

        let session = match transport.open_session(&command).await {
            Ok(session) => session,
            Err(e) => {
                self.state = Some(state);
                return Err(RecordError::Transport(e));
            }
        };

        info!(%command, "Started remote journal recording");

        let done = CancellationToken::new();
        let watcher = tokio::spawn({
            let transport = transport.clone();
            let done = done.clone();
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Recording cancelled, closing transport");
                        transport.close();
                    }
                    _ = done.cancelled() => {}
                }
            }
        });

        let cursor = self.cursor.clone();
        self.running = Some(tokio::spawn(async move {
            let Session { stdout, exit } = session;
            let recorded = record(&mut state, stdout, &cursor).await;
            if recorded.is_err() {
                transport.close();
            }
            let exited = exit.await;

            done.cancel();
            let _ = watcher.await;

            let result = finish(&mut state, recorded, exited);
            (state, result)
        }));
        Ok(())
    }

    /// Wait for the running session to end and return its outcome.
    ///
    /// Returns `Ok(())` straight away when nothing is running.
    pub async fn wait(&mut self) -> Result<(), RecordError> {
        let handle = match self.running.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };
        match handle.await {
            Ok((state, result)) => {
                self.state = Some(state);
                result
            }
            Err(e) => {
                error!(error = %e, "Recording task failed");
                Err(RecordError::Task(e.to_string()))
            }
        }
    }

    pub async fn run_local(&mut self, cancel: CancellationToken) -> Result<(), RecordError> {
        self.start_local(cancel)?;
        self.wait().await
    }

    pub async fn run_ssh(
        &mut self,
        cancel: CancellationToken,
        transport: Arc<dyn SessionTransport>,
    ) -> Result<(), RecordError> {
        self.start_ssh(cancel, transport).await?;
        self.wait().await
    }

    /// Give back the formatter and raw sink. Fails while a session runs.
    pub fn into_parts(mut self) -> Result<(Box<dyn Formatter>, W), RecordError> {
        let state = self.take_state()?;
        Ok((state.formatter, state.raw))
    }
}

/// Read `stream` to its end, feeding every entry to the formatter.
async fn record<R, W>(
    state: &mut RecordState<W>,
    stream: R,
    cursor: &watch::Sender<Option<String>>,
) -> Result<(), RecordError>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let tee = TeeReader::new(stream, &mut state.raw);
    let mut reader = ExportReader::new(BufReader::new(tee));

    loop {
        let entry = match reader.read_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(ExportError::Io(e)) if SinkError::is_sink(&e) => {
                return Err(RecordError::Raw(SinkError::unwrap_sink(e)));
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(position) = entry.cursor() {
            cursor.send_replace(Some(position.to_owned()));
        }
        state
            .formatter
            .write_entry(&entry)
            .map_err(RecordError::Format)?;
    }
    Ok(())
}

/// Combine the read loop and exit outcomes; a stream error wins.
fn finish<W: Write>(
    state: &mut RecordState<W>,
    recorded: Result<(), RecordError>,
    exited: Result<(), TransportError>,
) -> Result<(), RecordError> {
    let exited = match exited {
        Err(e) if e.is_benign() => {
            debug!(error = %e, "Session closed");
            Ok(())
        }
        other => other,
    };
    let flushed = state
        .raw
        .flush()
        .map_err(RecordError::Raw)
        .and(state.formatter.flush().map_err(RecordError::Format));

    let result = recorded
        .and(exited.map_err(RecordError::Transport))
        .and(flushed);
    match &result {
        Ok(()) => info!("Journal recording finished"),
        Err(e) => warn!(error = %e, "Journal recording stopped"),
    }
    result
}
