//! The control socket of an agent.
//!
//! [`AgentApiServer`] accepts connections on a Unix socket, reads one request
//! per connection and hands it to the event loop, where authorization and the
//! endpoint handlers run. The connection task writes the response once the
//! request has ended and any internal request on its behalf has completed.

mod http;
mod request;
mod router;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use warden_telemetry::{register_thread, LogFiles};

use self::http::{encode_response, read_request_head, HeadError, RequestHead};
use crate::auth::{read_peer_credentials, LocalTrustPolicy, PeerCredentials, PeerCredentialsError};
use crate::domain::{AccountStore, AgentConfig, ApiKey, ApiKeyRing, ConfigError, HeaderTable};
use crate::endpoints::respond_with_413;
use crate::event_loop::{EventLoop, LoopHandle};
use crate::host::{ApiServer, WatchdogLink};

pub use self::request::HostedRequest;

const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot bind API socket {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// API server of one agent, listening on a Unix socket.
#[derive(Debug)]
pub struct AgentApiServer {
    accounts: AccountStore,
    api_keys: ApiKeyRing,
    trust: LocalTrustPolicy,
    event_loop: LoopHandle,
    exit: watch::Sender<bool>,
    logs: LogFiles,
    watchdog: Option<WatchdogLink>,
    internal_request_timeout: Duration,
    max_head_bytes: usize,
    max_body_bytes: usize,
}

impl AgentApiServer {
    /// Build a server from validated configuration.
    pub fn new(
        config: &AgentConfig,
        logs: LogFiles,
        event_loop: LoopHandle,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        Ok(Self {
            accounts: config.build_account_store()?,
            api_keys: config.build_api_key_ring()?,
            trust: config.trust_policy(),
            event_loop,
            exit: watch::channel(false).0,
            logs,
            watchdog: config.watchdog_link(),
            internal_request_timeout: config.internal_request_timeout,
            max_head_bytes: config.max_request_head_bytes,
            max_body_bytes: config.max_request_body_bytes,
        })
    }

    /// Replace the UID trust policy derived from the configuration.
    pub fn with_trust_policy(mut self, trust: LocalTrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    pub fn exit_requested(&self) -> bool {
        *self.exit.borrow()
    }

    /// Receiver that flips to `true` once exit has been requested.
    pub fn subscribe_exit(&self) -> watch::Receiver<bool> {
        self.exit.subscribe()
    }

    /// Bind the API socket at `path`, replacing a stale socket file.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(path: &Path) -> Result<UnixListener, ServerError> {
        let bind_error = |source| ServerError::Bind {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(bind_error)?;
        }
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed stale API socket"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(bind_error(err)),
        }
        UnixListener::bind(path).map_err(bind_error)
    }

    /// Serve until exit is requested, then give in-flight requests a short
    /// grace period to finish.
    ///
    /// `event_loop` must be the loop whose handle was passed to
    /// [`AgentApiServer::new`].
    pub async fn serve(
        self: Arc<Self>,
        listener: UnixListener,
        mut event_loop: EventLoop,
    ) -> Result<(), ServerError> {
        let activity = register_thread("API server");
        let mut exit = self.exit.subscribe();
        let mut connections = JoinSet::new();
        info!(
            accounts = self.accounts.len(),
            api_keys = self.api_keys.len(),
            watchdog = self.watchdog.is_some(),
            "API server ready"
        );

        while !*exit.borrow_and_update() {
            activity.set_activity("waiting for events");
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        connections.spawn(Arc::clone(&self).handle_connection(stream));
                    }
                    Err(err) => warn!(error = %err, "Cannot accept API connection"),
                },
                () = event_loop.turn() => {}
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = exit.changed() => {}
            }
        }

        info!(in_flight = connections.len(), "Exit requested; finishing API requests");
        activity.set_activity("draining connections");
        let drained = timeout(SHUTDOWN_GRACE, async {
            loop {
                tokio::select! {
                    joined = connections.join_next() => {
                        if joined.is_none() {
                            break;
                        }
                    }
                    () = event_loop.turn() => {}
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                abandoned = connections.len(),
                "Abandoning unfinished API connections"
            );
        }
        Ok(())
    }

    async fn handle_connection(self: Arc<Self>, stream: UnixStream) {
        let peer = read_peer_credentials(&stream);
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let Some(response) = self.exchange(&mut reader, peer).await else {
            return;
        };
        if let Err(err) = write_half.write_all(&response).await {
            debug!(error = %err, "Cannot write API response");
            return;
        }
        let _ = write_half.shutdown().await;
    }

    /// Read one request, run it, and return the encoded response.
    async fn exchange(
        self: &Arc<Self>,
        reader: &mut BufReader<OwnedReadHalf>,
        peer: Result<Option<PeerCredentials>, PeerCredentialsError>,
    ) -> Option<Vec<u8>> {
        let reading = read_request_head(reader, self.max_head_bytes);
        let head = match timeout(REQUEST_READ_TIMEOUT, reading).await {
            Ok(Ok(head)) => head,
            Ok(Err(HeadError::Closed)) => return None,
            Ok(Err(HeadError::TooLarge(limit))) => {
                debug!(limit, "API request head too large");
                return Some(too_large(RequestHead::default(), peer));
            }
            Ok(Err(err)) => {
                debug!(error = %err, "Malformed API request");
                return Some(bad_request());
            }
            Err(_) => {
                debug!("Timed out reading API request");
                return None;
            }
        };

        if head.content_length > self.max_body_bytes as u64 {
            debug!(content_length = head.content_length, "API request body too large");
            return Some(too_large(head, peer));
        }
        if head.content_length > 0 {
            let mut body = (&mut *reader).take(head.content_length);
            let mut sink = tokio::io::sink();
            let discarded = timeout(REQUEST_READ_TIMEOUT, tokio::io::copy(&mut body, &mut sink)).await;
            if !matches!(discarded, Ok(Ok(read)) if read == head.content_length) {
                debug!("API client went away while sending the request body");
                return None;
            }
        }

        let request = Arc::new(HostedRequest::new(head, peer));
        let server = Arc::clone(self);
        let routed = Arc::clone(&request);
        if !self
            .event_loop
            .run_later(move || router::dispatch(&server, &routed))
        {
            return None;
        }
        request.finished().await
    }
}

fn too_large(
    head: RequestHead,
    peer: Result<Option<PeerCredentials>, PeerCredentialsError>,
) -> Vec<u8> {
    let request = HostedRequest::new(head, peer);
    respond_with_413(&request);
    request.take_response().unwrap_or_default()
}

fn bad_request() -> Vec<u8> {
    let headers = HeaderTable::new().with("Content-Type", "text/plain; charset=utf-8");
    encode_response(StatusCode::BAD_REQUEST, &headers, b"Bad request")
}

impl ApiServer for AgentApiServer {
    type Request = HostedRequest;

    fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    fn trust_policy(&self) -> &LocalTrustPolicy {
        &self.trust
    }

    fn authorize_by_api_key(&self, key: &ApiKey) -> bool {
        self.api_keys.authorize(key)
    }

    fn event_loop(&self) -> &LoopHandle {
        &self.event_loop
    }

    fn notify_exit(&self) {
        self.exit.send_replace(true);
    }

    fn log_files(&self) -> &LogFiles {
        &self.logs
    }

    fn watchdog(&self) -> Option<&WatchdogLink> {
        self.watchdog.as_ref()
    }

    fn internal_request_timeout(&self) -> Duration {
        self.internal_request_timeout
    }
}
