//! # Warden Telemetry
//!
//! Logging for Warden agents.
//!
//! ## Components
//!
//! - [`TelemetryConfig`]: settings read from the environment
//! - [`LogFiles`] / [`LogSink`]: log outputs that can be reopened or replaced
//!   by a descriptor handed over from the supervising process
//! - [`activity`]: registry of named threads, rendered by the backtraces endpoint
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_telemetry::{init_telemetry, LogFiles, TelemetryConfig};
//!
//! let logs = LogFiles::open(Some(Path::new("/var/log/warden.log")), None)?;
//! let _guard = init_telemetry(&TelemetryConfig::from_env(), &logs)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `WARDEN_SERVICE_NAME` | `warden-agent` | Service name in the startup line |
//! | `WARDEN_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `WARDEN_JSON_LOGS` | `false` | Emit JSON lines |
//! | `WARDEN_THREAD_NAMES` | `true` | Include thread names |

pub mod activity;
mod config;
mod log_files;
mod subscriber;

pub use activity::{all_backtraces, register_thread, ThreadRegistration, ThreadSnapshot};
pub use config::TelemetryConfig;
pub use log_files::{LogFiles, LogSink, SinkWriter};
pub use subscriber::init_subscriber;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Initialize logging to the main log output of `logs`.
///
/// Returns a guard that should be held for the lifetime of the process.
pub fn init_telemetry(
    config: &TelemetryConfig,
    logs: &LogFiles,
) -> Result<TelemetryGuard, TelemetryError> {
    init_subscriber(config, logs.main().clone())?;
    Ok(TelemetryGuard {
        service_name: config.service_name.clone(),
    })
}

/// Guard that keeps telemetry active. Logs a final line on drop.
#[derive(Debug)]
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
