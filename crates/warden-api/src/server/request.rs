//! Requests as hosted by [`AgentApiServer`](super::AgentApiServer).

use http::{Method, StatusCode};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use super::http::{encode_response, RequestHead};
use crate::auth::{PeerCredentials, PeerCredentialsError};
use crate::domain::HeaderTable;
use crate::host::ClientRequest;

#[derive(Debug, Default)]
struct Exchange {
    response: Option<Vec<u8>>,
    ended: bool,
    refs: usize,
}

impl Exchange {
    fn is_finished(&self) -> bool {
        self.ended && self.refs == 0
    }
}

/// One request on the control socket.
///
/// The connection task waits in [`HostedRequest::finished`] until the request
/// has ended and no lease holds it any more, then writes the buffered
/// response.
#[derive(Debug)]
pub struct HostedRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderTable,
    peer: Result<Option<PeerCredentials>, PeerCredentialsError>,
    exchange: Mutex<Exchange>,
    finished: Notify,
}

impl HostedRequest {
    pub(crate) fn new(
        head: RequestHead,
        peer: Result<Option<PeerCredentials>, PeerCredentialsError>,
    ) -> Self {
        Self {
            method: head.method,
            path: head.path,
            query: head.query,
            headers: head.headers,
            peer,
            exchange: Mutex::new(Exchange::default()),
            finished: Notify::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Wait until the request has ended and been released, then take the
    /// encoded response.
    pub(crate) async fn finished(&self) -> Option<Vec<u8>> {
        loop {
            let notified = self.finished.notified();
            {
                let mut exchange = self.exchange.lock();
                if exchange.is_finished() {
                    return exchange.response.take();
                }
            }
            notified.await;
        }
    }

    /// Take the response without waiting.
    pub(crate) fn take_response(&self) -> Option<Vec<u8>> {
        self.exchange.lock().response.take()
    }

    fn update(&self, change: impl FnOnce(&mut Exchange)) {
        let mut exchange = self.exchange.lock();
        change(&mut exchange);
        if exchange.is_finished() {
            self.finished.notify_one();
        }
    }
}

impl ClientRequest for HostedRequest {
    fn method(&self) -> &Method {
        &self.method
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name).map(str::to_owned)
    }

    fn peer_credentials(&self) -> Result<Option<PeerCredentials>, PeerCredentialsError> {
        self.peer
    }

    fn write_simple_response(&self, status: StatusCode, headers: &HeaderTable, body: &[u8]) {
        let mut exchange = self.exchange.lock();
        if exchange.response.is_some() || exchange.ended {
            warn!(path = %self.path, %status, "Dropping second response for API request");
            return;
        }
        exchange.response = Some(encode_response(status, headers, body));
    }

    fn is_ended(&self) -> bool {
        self.exchange.lock().ended
    }

    fn end_request(&self) {
        self.update(|exchange| exchange.ended = true);
    }

    fn retain(&self) {
        self.exchange.lock().refs += 1;
    }

    fn release(&self) {
        self.update(|exchange| exchange.refs = exchange.refs.saturating_sub(1));
    }
}
