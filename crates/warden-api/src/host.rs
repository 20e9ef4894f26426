//! Seams between the shared API code and the agent hosting it.
//!
//! An agent's API server implements [`ApiServer`]; each in-flight request it
//! serves implements [`ClientRequest`]. Handlers, authorization and the
//! internal request executor only talk to these traits.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use warden_telemetry::LogFiles;

use crate::auth::{LocalTrustPolicy, PeerCredentials, PeerCredentialsError};
use crate::domain::{AccountStore, ApiKey, HeaderTable};
use crate::event_loop::LoopHandle;
use crate::internal::DEFAULT_TIMEOUT;

/// The API server of one agent.
pub trait ApiServer: Send + Sync + 'static {
    type Request: ClientRequest;

    /// Accounts allowed to authenticate with HTTP Basic credentials.
    fn accounts(&self) -> &AccountStore;

    /// Which local users are trusted by UID.
    fn trust_policy(&self) -> &LocalTrustPolicy;

    /// Whether a peer connecting as `uid` gets pool access.
    fn authorize_by_uid(&self, uid: u32) -> bool {
        self.trust_policy().authorizes(uid)
    }

    /// Whether `key` is an accepted API key. Never called with the super key.
    fn authorize_by_api_key(&self, key: &ApiKey) -> bool;

    /// Handle used to run completions on the server's event loop.
    fn event_loop(&self) -> &LoopHandle;

    /// Ask the agent to shut down.
    fn notify_exit(&self);

    fn log_files(&self) -> &LogFiles;

    /// Link to the supervising watchdog, if this agent has one.
    fn watchdog(&self) -> Option<&WatchdogLink>;

    /// Budget for internal requests issued on behalf of a client.
    fn internal_request_timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }
}

/// One client request, together with the connection it arrived on.
///
/// Requests are reference counted by the host: [`ClientRequest::retain`] and
/// [`ClientRequest::release`] keep the exchange open while background work
/// still needs to answer it. Use [`RequestLease`] instead of calling them
/// directly.
pub trait ClientRequest: Send + Sync + 'static {
    fn method(&self) -> &Method;

    /// Case-insensitive request header lookup.
    fn header(&self, name: &str) -> Option<String>;

    /// Credentials of the connected peer. `Ok(None)` if unavailable.
    fn peer_credentials(&self) -> Result<Option<PeerCredentials>, PeerCredentialsError>;

    /// Write a complete response with the given status, headers and body.
    fn write_simple_response(&self, status: StatusCode, headers: &HeaderTable, body: &[u8]);

    fn is_ended(&self) -> bool;

    fn end_request(&self);

    fn set_keep_alive(&self, _keep_alive: bool) {}

    fn retain(&self);

    fn release(&self);
}

/// Keeps a request alive until dropped.
pub struct RequestLease<R: ClientRequest> {
    request: Arc<R>,
}

impl<R: ClientRequest> RequestLease<R> {
    pub fn acquire(request: Arc<R>) -> Self {
        request.retain();
        Self { request }
    }

    pub fn request(&self) -> &Arc<R> {
        &self.request
    }
}

impl<R: ClientRequest> Drop for RequestLease<R> {
    fn drop(&mut self) {
        self.request.release();
    }
}

impl<R: ClientRequest> fmt::Debug for RequestLease<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLease").finish_non_exhaustive()
    }
}

/// Where to reach the watchdog and how to authenticate descriptor hand-overs.
#[derive(Clone)]
pub struct WatchdogLink {
    instance_dir: PathBuf,
    fd_passing_password: String,
}

impl WatchdogLink {
    /// `None` if either part is empty.
    pub fn new(instance_dir: impl Into<PathBuf>, fd_passing_password: impl Into<String>) -> Option<Self> {
        let instance_dir = instance_dir.into();
        let fd_passing_password = fd_passing_password.into();
        if instance_dir.as_os_str().is_empty() || fd_passing_password.is_empty() {
            return None;
        }
        Some(Self {
            instance_dir,
            fd_passing_password,
        })
    }

    pub fn instance_dir(&self) -> &Path {
        &self.instance_dir
    }

    pub fn fd_passing_password(&self) -> &str {
        &self.fd_passing_password
    }

    /// Address of the watchdog's API socket.
    pub fn api_address(&self) -> String {
        format!(
            "unix:{}/agents.s/watchdog_api",
            self.instance_dir.display()
        )
    }
}

impl fmt::Debug for WatchdogLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchdogLink")
            .field("instance_dir", &self.instance_dir)
            .field("fd_passing_password", &"<redacted>")
            .finish()
    }
}
