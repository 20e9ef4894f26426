//! # Warden Agent
//!
//! Serves an agent's control socket API.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (JSON file, then command line flags)
//! 2. Open log files and initialize telemetry
//! 3. Build accounts and API keys, bind the socket
//! 4. Serve on a single-threaded runtime until `/shutdown.json`, SIGINT or SIGTERM

mod cli;

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use warden_api::{AgentApiServer, AgentConfig, ApiServer, EventLoop};
use warden_telemetry::{init_telemetry, LogFiles, TelemetryConfig};

use crate::cli::Args;

fn main() -> Result<()> {
    let args = Args::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if let Some(level) = &args.log_level {
        telemetry = telemetry.with_log_level(level.clone());
    }
    let config = args.into_config()?;

    let logs = LogFiles::open(config.log_file.as_deref(), config.fd_log_file.as_deref())
        .context("cannot open log files")?;
    let _telemetry = init_telemetry(&telemetry, &logs)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot start runtime")?;
    runtime.block_on(run(config, logs))
}

async fn run(config: AgentConfig, logs: LogFiles) -> Result<()> {
    let event_loop = EventLoop::new();
    let server = Arc::new(AgentApiServer::new(&config, logs, event_loop.handle())?);
    let listener = AgentApiServer::bind(&config.socket_path)?;
    info!(socket = %config.socket_path.display(), "Listening for API requests");

    let mut interrupt = signal(SignalKind::interrupt()).context("cannot install SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("cannot install SIGTERM handler")?;
    let signalled = Arc::clone(&server);
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("Received SIGINT"),
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
        signalled.notify_exit();
    });

    let result = Arc::clone(&server).serve(listener, event_loop).await;

    if let Err(err) = fs::remove_file(&config.socket_path) {
        warn!(error = %err, "Cannot remove API socket");
    }
    result?;
    info!("Agent stopped");
    Ok(())
}
