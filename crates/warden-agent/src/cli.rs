//! Command line arguments and their merge into [`AgentConfig`].

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use warden_api::AgentConfig;

/// Warden agent: serves the control socket API
#[derive(Parser, Debug, Default)]
#[command(name = "warden-agent")]
#[command(about = "Serve a Warden agent's control socket API")]
pub struct Args {
    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Unix socket to listen on
    #[arg(short, long)]
    pub socket: Option<PathBuf>,

    /// Account descriptor, [readonly|full:]USERNAME:PASSWORDFILE (repeatable)
    #[arg(short = 'a', long = "authorize", value_name = "DESCRIPTOR")]
    pub authorizations: Vec<String>,

    /// Accepted API key (repeatable)
    #[arg(long = "api-key", value_name = "KEY")]
    pub api_keys: Vec<String>,

    /// Extra UID allowed to use the API through peer credentials (repeatable)
    #[arg(long = "trusted-uid", value_name = "UID")]
    pub trusted_uids: Vec<u32>,

    /// Ignore peer credentials; only accounts and API keys authorize
    #[arg(long)]
    pub no_peer_uid_auth: bool,

    /// Instance directory shared with the watchdog
    #[arg(long)]
    pub instance_dir: Option<PathBuf>,

    /// File holding the watchdog's descriptor passing password
    #[arg(long)]
    pub fd_passing_password_file: Option<PathBuf>,

    /// Timeout for requests to other agents, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub internal_request_timeout: Option<u64>,

    /// Main log file (default: stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// File descriptor log file
    #[arg(long)]
    pub fd_log_file: Option<PathBuf>,

    /// Log filter, overrides WARDEN_LOG_LEVEL
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Load the configuration file, if any, and apply the flags on top.
    pub fn into_config(self) -> Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::from_json_file(path)?,
            None => AgentConfig::default(),
        };

        if let Some(socket) = self.socket {
            config.socket_path = socket;
        }
        config.authorizations.extend(self.authorizations);
        config.api_keys.extend(self.api_keys);
        config.trusted_uids.extend(self.trusted_uids);
        if self.no_peer_uid_auth {
            config.peer_uid_auth = false;
        }
        if let Some(dir) = self.instance_dir {
            config.instance_dir = Some(dir);
        }
        if let Some(path) = self.fd_passing_password_file {
            let password = fs::read_to_string(&path).with_context(|| {
                format!("cannot read fd passing password file {}", path.display())
            })?;
            config.fd_passing_password = Some(password.trim().to_string());
        }
        if let Some(secs) = self.internal_request_timeout {
            config.internal_request_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = self.log_file {
            config.log_file = Some(path);
        }
        if let Some(path) = self.fd_log_file {
            config.fd_log_file = Some(path);
        }

        config.validate().context("invalid agent configuration")?;
        Ok(config)
    }
}
