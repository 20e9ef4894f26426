//! tracing subscriber setup.
//!
//! Events are filtered by an `EnvFilter` and formatted either as JSON or as
//! plain text, then written to the agent's main log sink.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{LogSink, TelemetryConfig, TelemetryError};

/// Install the global subscriber writing to `sink`.
pub fn init_subscriber(config: &TelemetryConfig, sink: LogSink) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Filter(e.to_string()))?;

    if config.json_logs {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(config.thread_names)
            .with_writer(sink);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(config.thread_names)
            .with_ansi(false)
            .with_writer(sink);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;
    }

    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        json = config.json_logs,
        "Logging initialized"
    );

    Ok(())
}
