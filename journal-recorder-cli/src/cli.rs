/// # journal-recorder CLI Interface (Module)
///
/// Command parsing and orchestration for the `journal-recorder` binary. All
/// parsing, rendering and recording lives in the `journal-recorder` library;
/// this module only wires a loaded config to a [`Journal`] and keeps it
/// running until shutdown.
///
/// ## How To Use
/// - For command-line users: `journal-recorder record --config <file>`, stop
///   with Ctrl-C.
/// - For programmatic/integration use: call [`run_until`] with a constructed
///   [`Cli`] and a shutdown future.
///
/// [`Journal`]: journal_recorder::Journal
use crate::load_config::{load_config, CliConfig, Target};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use journal_recorder::{Journal, SessionTransport, SshTransport, TransportError};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// CLI for journal-recorder: follow a systemd journal into files.
#[derive(Parser)]
#[clap(
    name = "journal-recorder",
    version,
    about = "Record a systemd journal, locally or over SSH, into an output directory"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record the configured machine's journal until interrupted
    Record {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Async CLI entrypoint used by `main()`: records until Ctrl-C.
pub async fn run(cli: Cli) -> Result<()> {
    run_until(cli, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C, stopping");
        }
    })
    .await
}

/// Run `cli`, stopping the recording when `shutdown` completes.
pub async fn run_until<F>(cli: Cli, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Record { config } => {
            let config = load_config(config)?;
            record(config, shutdown).await
        }
    }
}

async fn record<F>(config: CliConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    config.recorder.trace_loaded();
    let cancel = CancellationToken::new();

    let mut journal = Journal::new(&config.output_dir, config.recorder.clone())
        .with_context(|| format!("Failed to create journal in {}", config.output_dir.display()))?;

    match config.target {
        Target::Local => {
            tracing::info!(command = "record", target = "local", "Starting journal recording");
            journal.start_local(&cancel).await?;
        }
        Target::Ssh => {
            let ssh = config.ssh_config()?.clone();
            tracing::info!(
                command = "record",
                target = "ssh",
                destination = %ssh.destination(),
                "Starting journal recording"
            );
            let connect = || {
                let transport: Arc<dyn SessionTransport> = Arc::new(SshTransport::new(ssh.clone()));
                futures::future::ready(Ok::<_, TransportError>(transport))
            };
            journal.start_ssh(&cancel, connect, None).await?;
        }
    }

    tracing::info!(path = %journal.path().display(), "Recording, press Ctrl-C to stop");
    shutdown.await;
    tracing::info!(command = "record", "Stopping journal recording");

    cancel.cancel();
    match journal.destroy().await {
        Ok(()) => {
            tracing::info!(command = "record", "Journal closed");
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = "record", error = %e, "Failed to close journal");
            Err(e.into())
        }
    }
}
