/// `load_config` module: loads the static YAML file that tells the CLI which
/// machine to record and where to put the result.
///
/// This module is the only place where untrusted YAML is parsed into the
/// library's typed configuration.
///
/// # Accepted schema
/// ```yaml
/// output_dir: ./journals/machine-1
/// target: ssh            # or `local`
/// ssh:                   # required for `target: ssh`
///   host: 10.0.0.5
///   user: core
///   port: 22
///   identity_file: ~/.ssh/id_ed25519
///   options: ["StrictHostKeyChecking=no"]
/// recorder:              # optional, every key has a default
///   timezone: utc
///   format: short
///   compress_raw: true
///   start_timeout_secs: 600
///   retry_interval_secs: 10
/// ```
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{bail, Context, Result};
use journal_recorder::{RecorderConfig, SshConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// The machine the CLI runs on.
    Local,
    /// A remote machine reached with the system `ssh` client.
    Ssh,
}

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub output_dir: PathBuf,
    pub target: Target,
    #[serde(default)]
    pub ssh: Option<SshConfig>,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

impl CliConfig {
    /// The SSH settings, which `target: ssh` requires.
    pub fn ssh_config(&self) -> Result<&SshConfig> {
        match &self.ssh {
            Some(ssh) if !ssh.host.is_empty() => Ok(ssh),
            Some(_) => bail!("ssh.host must not be empty"),
            None => bail!("target `ssh` requires an `ssh` section"),
        }
    }
}

/// Loads and validates a YAML config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if config.target == Target::Ssh {
        config
            .ssh_config()
            .with_context(|| format!("Invalid config {}", path_ref.display()))?;
    }

    Ok(config)
}
