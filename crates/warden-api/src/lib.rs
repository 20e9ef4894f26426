//! Warden Agent API - control sockets of supervised agent processes.
//!
//! Every agent exposes a small HTTP API on a Unix socket. This crate holds
//! the pieces shared by those servers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      AGENT API SERVER                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  connection tasks ── request head ──► event loop             │
//! │                                          │                   │
//! │                           ┌──────────────┴─────────────┐     │
//! │                           │  authorize (UID / key /    │     │
//! │                           │  Basic account)            │     │
//! │                           └──────────────┬─────────────┘     │
//! │                                          ▼                   │
//! │            ping · version · backtraces · shutdown ·          │
//! │            reopen_logs · reinherit_logs                      │
//! │                                          │                   │
//! │                 internal request worker ◄┘ (blocking I/O,    │
//! │                 completion posted back to the event loop)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Authorization
//!
//! - **UID**: the connecting process runs as root, as the agent's own user,
//!   or as a trusted user
//! - **API key**: Basic credentials with username `api` and a 16 character key
//! - **Account**: Basic credentials checked against configured accounts, which
//!   are either read-only or full access
//!
//! With no accounts configured, every request is fully authorized.
//!
//! # Usage
//!
//! ```ignore
//! use warden_api::{AgentApiServer, AgentConfig, EventLoop};
//!
//! let event_loop = EventLoop::new();
//! let server = Arc::new(AgentApiServer::new(&config, logs, event_loop.handle())?);
//! let listener = AgentApiServer::bind(&config.socket_path)?;
//! server.serve(listener, event_loop).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod auth;
pub mod domain;
pub mod endpoints;
pub mod event_loop;
pub mod host;
pub mod internal;
pub mod server;

#[cfg(test)]
mod testing;

pub use auth::{authorize, authorize_admin, authorize_state_inspection, Authorization};
pub use domain::{AccountStore, AgentConfig, ApiKey, ConfigError, HeaderTable};
pub use event_loop::{EventLoop, LoopHandle};
pub use host::{ApiServer, ClientRequest, RequestLease, WatchdogLink};
pub use internal::{submit_internal_request, InternalRequest, InternalResponse, ResponseStatus};
pub use server::{AgentApiServer, HostedRequest, ServerError};

/// Name reported by the version endpoint and in operator-facing messages.
pub const PROGRAM_NAME: &str = "Warden";

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const API_VERSION_MAJOR: u32 = 1;
pub const API_VERSION_MINOR: u32 = 0;
