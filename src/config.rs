use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::format::{OutputFormat, Zone};

/// Settings shared by every recording session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// `journalctl` program used for local recording.
    pub journalctl: PathBuf,
    pub timezone: Zone,
    pub format: OutputFormat,
    /// Gzip the raw export capture.
    pub compress_raw: bool,
    /// How long `Journal::start_ssh` keeps retrying.
    pub start_timeout_secs: u64,
    pub retry_interval_secs: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            journalctl: PathBuf::from("journalctl"),
            timezone: Zone::Local,
            format: OutputFormat::Short,
            compress_raw: true,
            start_timeout_secs: 600,
            retry_interval_secs: 10,
        }
    }
}

impl RecorderConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn trace_loaded(&self) {
        info!(
            journalctl = %self.journalctl.display(),
            format = ?self.format,
            timezone = ?self.timezone,
            compress_raw = self.compress_raw,
            "Loaded RecorderConfig"
        );
        debug!(?self, "RecorderConfig loaded (full debug)");
    }
}

/// How to reach a remote machine with the system `ssh` client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    /// Extra `-o` options, e.g. `StrictHostKeyChecking=no`.
    pub options: Vec<String>,
    /// The ssh client binary.
    pub program: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: None,
            port: None,
            identity_file: None,
            options: Vec::new(),
            program: "ssh".to_owned(),
        }
    }
}

impl SshConfig {
    /// Client arguments up to and including the destination.
    pub fn client_args(&self) -> Vec<String> {
        let mut args = vec!["-T".to_owned()];
        if let Some(port) = self.port {
            args.push("-p".to_owned());
            args.push(port.to_string());
        }
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_owned());
            args.push(identity.display().to_string());
        }
        for option in &self.options {
            args.push("-o".to_owned());
            args.push(option.clone());
        }
        args.push(self.destination());
        args
    }

    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}
