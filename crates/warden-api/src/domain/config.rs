//! Agent configuration with validation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::account::{AccountError, AccountStore};
use super::api_key::{ApiKeyRing, InvalidApiKey};
use crate::auth::LocalTrustPolicy;
use crate::host::WatchdogLink;
use crate::internal::DEFAULT_TIMEOUT;

/// Configuration of an agent's control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Unix socket the API server listens on
    pub socket_path: PathBuf,
    /// Account descriptors, `[LEVEL:]USERNAME:PASSWORDFILE`
    pub authorizations: Vec<String>,
    /// Accepted API keys
    pub api_keys: Vec<String>,
    /// Peer UIDs granted pool access besides root and the agent's own user
    pub trusted_uids: Vec<u32>,
    /// Whether Unix peer credentials may authorize requests at all
    pub peer_uid_auth: bool,
    /// Instance directory shared with the watchdog
    pub instance_dir: Option<PathBuf>,
    /// Password the watchdog requires before handing over descriptors
    pub fd_passing_password: Option<String>,
    /// Budget for one internal request to another agent
    #[serde(with = "humantime_serde")]
    pub internal_request_timeout: Duration,
    /// Largest accepted request line plus headers
    pub max_request_head_bytes: usize,
    /// Largest accepted request body
    pub max_request_body_bytes: usize,
    /// Main log file; stderr when unset
    pub log_file: Option<PathBuf>,
    /// Separate log file for file descriptor tracing
    pub fd_log_file: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/run/warden/agent_api"),
            authorizations: Vec::new(),
            api_keys: Vec::new(),
            trusted_uids: Vec::new(),
            peer_uid_auth: true,
            instance_dir: None,
            fd_passing_password: None,
            internal_request_timeout: DEFAULT_TIMEOUT,
            max_request_head_bytes: 16 * 1024,
            max_request_body_bytes: 64 * 1024,
            log_file: None,
            fd_log_file: None,
        }
    }
}

impl AgentConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("socket_path cannot be empty".into()));
        }

        if self.internal_request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "internal_request_timeout cannot be 0".into(),
            ));
        }

        if self.max_request_head_bytes == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_request_head_bytes cannot be 0".into(),
            ));
        }

        if self.max_request_body_bytes == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_request_body_bytes cannot be 0".into(),
            ));
        }

        // Both halves of the watchdog link, or neither
        let has_dir = self
            .instance_dir
            .as_ref()
            .is_some_and(|dir| !dir.as_os_str().is_empty());
        let has_password = self
            .fd_passing_password
            .as_ref()
            .is_some_and(|password| !password.is_empty());
        if has_dir != has_password {
            return Err(ConfigError::Invalid(
                "instance_dir and fd_passing_password must be configured together".into(),
            ));
        }

        self.build_api_key_ring()?;
        Ok(())
    }

    /// Register every configured authorization descriptor.
    pub fn build_account_store(&self) -> Result<AccountStore, ConfigError> {
        let mut store = AccountStore::new();
        for descriptor in &self.authorizations {
            store.add_descriptor(descriptor)?;
        }
        Ok(store)
    }

    pub fn build_api_key_ring(&self) -> Result<ApiKeyRing, ConfigError> {
        Ok(ApiKeyRing::from_strings(&self.api_keys)?)
    }

    /// Local trust policy for the current process.
    pub fn trust_policy(&self) -> LocalTrustPolicy {
        if self.peer_uid_auth {
            LocalTrustPolicy::current().with_trusted_uids(self.trusted_uids.iter().copied())
        } else {
            LocalTrustPolicy::disabled()
        }
    }

    /// Link to the watchdog, when both halves are configured.
    pub fn watchdog_link(&self) -> Option<WatchdogLink> {
        let instance_dir = self.instance_dir.clone()?;
        let password = self.fd_passing_password.clone()?;
        WatchdogLink::new(instance_dir, password)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid size limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    ApiKey(#[from] InvalidApiKey),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Durations as human readable strings such as `"60s"` or `"1m 30s"`.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.internal_request_timeout, Duration::from_secs(60));
        assert!(config.watchdog_link().is_none());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = AgentConfig {
            internal_request_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_half_watchdog_link_rejected() {
        let config = AgentConfig {
            instance_dir: Some(PathBuf::from("/run/warden/instance")),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = AgentConfig {
            fd_passing_password: Some("hunter2".into()),
            ..config
        };
        assert!(config.validate().is_ok());
        let link = config.watchdog_link().unwrap();
        assert_eq!(
            link.api_address(),
            "unix:/run/warden/instance/agents.s/watchdog_api"
        );
    }

    #[test]
    fn test_invalid_api_key_rejected() {
        let config = AgentConfig {
            api_keys: vec!["too-short".into()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ApiKey(_))));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        fs::write(
            &path,
            r#"{
                "socket_path": "/tmp/warden.sock",
                "api_keys": ["abcdefgh12345678"],
                "internal_request_timeout": "5s",
                "trusted_uids": [1000]
            }"#,
        )
        .unwrap();

        let config = AgentConfig::from_json_file(&path).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/warden.sock"));
        assert_eq!(config.internal_request_timeout, Duration::from_secs(5));
        assert_eq!(config.trusted_uids, vec![1000]);
        assert_eq!(config.max_request_body_bytes, 64 * 1024);
        assert_eq!(config.build_api_key_ring().unwrap().len(), 1);
    }

    #[test]
    fn test_from_json_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            AgentConfig::from_json_file(&missing),
            Err(ConfigError::Read { .. })
        ));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            AgentConfig::from_json_file(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_build_account_store() {
        let dir = tempfile::tempdir().unwrap();
        let password = dir.path().join("password");
        fs::write(&password, "secret\n").unwrap();

        let config = AgentConfig {
            authorizations: vec![format!("readonly:viewer:{}", password.display())],
            ..Default::default()
        };
        let store = config.build_account_store().unwrap();
        assert!(store.lookup("viewer").unwrap().is_read_only());

        let config = AgentConfig {
            authorizations: vec![format!("api:{}", password.display())],
            ..Default::default()
        };
        assert!(matches!(
            config.build_account_store(),
            Err(ConfigError::Account(AccountError::ReservedUsername))
        ));
    }

    #[test]
    fn test_humane_timeouts() {
        let config: AgentConfig =
            serde_json::from_str(r#"{"internal_request_timeout": "1m 30s"}"#).unwrap();
        assert_eq!(config.internal_request_timeout, Duration::from_secs(90));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["internal_request_timeout"], "1m 30s");

        assert!(serde_json::from_str::<AgentConfig>(r#"{"internal_request_timeout": "soon"}"#).is_err());
    }

    #[test]
    fn test_zero_body_limit_rejected() {
        let config = AgentConfig {
            max_request_body_bytes: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit(_))));
    }
}
