//! Per-machine journal recording into an output directory.

use std::fs::{self, File, OpenOptions};
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::RecorderConfig;
use crate::format::{Formatter, OutputFormat};
use crate::record::{RecordError, Recorder};
use crate::transport::{self, SessionTransport, TransportError};

const BOOT_ID_COMMAND: &str = "cat /proc/sys/kernel/random/boot_id";

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("journal file i/o: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("connecting: {0}")]
    Transport(#[from] TransportError),

    /// The machine still reports the boot id from before a reboot.
    #[error("found old boot ID {0} (likely still rebooting)")]
    StaleBoot(String),

    #[error("journal did not start within {after:?}: {last}")]
    Timeout { after: Duration, last: String },
}

/// Raw export capture, optionally gzipped.
pub enum RawSink {
    Plain(File),
    Gzip(GzEncoder<File>),
}

impl RawSink {
    /// Flush and, for gzip, write the stream trailer.
    pub fn finish(self) -> io::Result<()> {
        match self {
            RawSink::Plain(mut file) => file.flush(),
            RawSink::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for RawSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            RawSink::Plain(file) => file.write(buf),
            RawSink::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            RawSink::Plain(file) => file.flush(),
            RawSink::Gzip(encoder) => encoder.flush(),
        }
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().append(true).create(true).open(path)
}

fn journal_file_name(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Short => "journal.txt",
        OutputFormat::Export => "journal.export",
        OutputFormat::Json => "journal.json",
    }
}

/// Records the journal of one machine into `journal.txt` and
/// `journal-raw.txt.gz` inside an output directory.
///
/// Starting again after a reboot or a dropped connection continues after
/// the last recorded entry; both files are only ever appended to.
pub struct Journal {
    recorder: Recorder<RawSink>,
    journal_path: PathBuf,
    cancel: Option<CancellationToken>,
    config: RecorderConfig,
}

impl Journal {
    pub fn new(dir: impl AsRef<Path>, config: RecorderConfig) -> Result<Self, JournalError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let journal_path = dir.join(journal_file_name(config.format));
        let mut formatter = config.format.formatter(append(&journal_path)?);
        formatter.set_timezone(config.timezone);

        let raw = if config.compress_raw {
            let file = append(&dir.join("journal-raw.txt.gz"))?;
            RawSink::Gzip(GzEncoder::new(file, Compression::best()))
        } else {
            RawSink::Plain(append(&dir.join("journal-raw.txt"))?)
        };

        info!(path = %journal_path.display(), format = ?config.format, "Created journal");

        let recorder = Recorder::new(formatter, raw).with_journalctl(&config.journalctl);
        Ok(Self {
            recorder,
            journal_path,
            cancel: None,
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.journal_path
    }

    pub fn cursor(&self) -> Option<String> {
        self.recorder.cursor()
    }

    /// Stop the running recording, if any.
    async fn stop(&mut self) -> Result<(), RecordError> {
        match self.cancel.take() {
            Some(cancel) => {
                cancel.cancel();
                self.recorder.wait().await
            }
            None => Ok(()),
        }
    }

    /// Begin or resume recording the local journal.
    pub async fn start_local(&mut self, cancel: &CancellationToken) -> Result<(), JournalError> {
        // Only the status of the previous session is consumed here.
        let _ = self.stop().await;
        let token = cancel.child_token();
        self.recorder.start_local(token.clone())?;
        self.cancel = Some(token);
        Ok(())
    }

    /// Begin or resume recording a remote journal.
    ///
    /// `connect` is retried every `retry_interval` until `start_timeout`
    /// because the machine is likely still booting. With `old_boot_id`, an
    /// attempt fails while the machine still reports that boot id.
    pub async fn start_ssh<C, Fut>(
        &mut self,
        cancel: &CancellationToken,
        mut connect: C,
        old_boot_id: Option<&str>,
    ) -> Result<(), JournalError>
    where
        C: FnMut() -> Fut,
        Fut: Future<Output = Result<Arc<dyn SessionTransport>, TransportError>>,
    {
        let _ = self.stop().await;
        let token = cancel.child_token();

        let timeout = self.config.start_timeout();
        let interval = self.config.retry_interval();
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = match connect().await {
                Ok(transport) => {
                    let outcome = self.start_attempt(&token, transport.clone(), old_boot_id).await;
                    if outcome.is_err() {
                        transport.close();
                    }
                    outcome
                }
                Err(e) => Err(JournalError::from(e)),
            };

            let err = match result {
                Ok(()) => {
                    self.cancel = Some(token);
                    return Ok(());
                }
                Err(err) => err,
            };

            if token.is_cancelled() {
                return Err(err);
            }
            if started.elapsed() + interval > timeout {
                token.cancel();
                return Err(JournalError::Timeout {
                    after: started.elapsed(),
                    last: err.to_string(),
                });
            }
            warn!(attempt, error = %err, "Journal start failed, retrying");
            tokio::time::sleep(interval).await;
        }
    }

    async fn start_attempt(
        &mut self,
        token: &CancellationToken,
        transport: Arc<dyn SessionTransport>,
        old_boot_id: Option<&str>,
    ) -> Result<(), JournalError> {
        if let Some(old) = old_boot_id {
            let boot_id = transport::output(transport.as_ref(), BOOT_ID_COMMAND).await?;
            if String::from_utf8_lossy(&boot_id).trim() == old {
                return Err(JournalError::StaleBoot(old.to_owned()));
            }
        }
        self.recorder.start_ssh(token.clone(), transport).await?;
        Ok(())
    }

    /// Contents of the rendered journal so far.
    pub fn read(&self) -> Result<Vec<u8>, JournalError> {
        Ok(fs::read(&self.journal_path)?)
    }

    /// Stop recording and close both files.
    pub async fn destroy(mut self) -> Result<(), JournalError> {
        if let Err(e) = self.stop().await {
            error!(error = %e, "Journal recorder failed");
        }

        let (mut formatter, raw) = self.recorder.into_parts()?;
        if let Err(e) = formatter.flush() {
            error!(error = %e, "Failed to close journal");
        }
        if let Err(e) = raw.finish() {
            error!(error = %e, "Failed to close raw journal");
            return Err(e.into());
        }
        Ok(())
    }
}
