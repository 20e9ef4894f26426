//! In-memory server and request doubles for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::{Method, StatusCode};
use nix::errno::Errno;
use parking_lot::Mutex;
use warden_telemetry::LogFiles;

use crate::auth::{LocalTrustPolicy, PeerCredentials, PeerCredentialsError};
use crate::domain::{AccountStore, ApiKey, ApiKeyRing, HeaderTable};
use crate::event_loop::{EventLoop, LoopHandle};
use crate::host::{ApiServer, ClientRequest, WatchdogLink};

pub(crate) struct FakeServer {
    pub accounts: AccountStore,
    api_keys: ApiKeyRing,
    trust: LocalTrustPolicy,
    event_loop: LoopHandle,
    _own_loop: Mutex<Option<EventLoop>>,
    logs: LogFiles,
    watchdog: Option<WatchdogLink>,
    exits: AtomicUsize,
}

impl FakeServer {
    /// Empty account store, no API keys, no UID trust.
    pub fn new() -> Self {
        let own_loop = EventLoop::new();
        Self {
            accounts: AccountStore::new(),
            api_keys: ApiKeyRing::new(),
            trust: LocalTrustPolicy::disabled(),
            event_loop: own_loop.handle(),
            _own_loop: Mutex::new(Some(own_loop)),
            logs: LogFiles::default(),
            watchdog: None,
            exits: AtomicUsize::new(0),
        }
    }

    pub fn with_api_keys<const N: usize>(mut self, keys: [&str; N]) -> Self {
        self.api_keys = ApiKeyRing::from_strings(keys).unwrap();
        self
    }

    pub fn with_trust_policy(mut self, trust: LocalTrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_log_files(mut self, logs: LogFiles) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_event_loop(mut self, event_loop: LoopHandle) -> Self {
        self.event_loop = event_loop;
        self
    }

    pub fn with_watchdog(mut self, watchdog: WatchdogLink) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    pub fn exit_requests(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }
}

impl ApiServer for FakeServer {
    type Request = FakeRequest;

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
        self.exits.fetch_add(1, Ordering::SeqCst);
    }

    fn log_files(&self) -> &LogFiles {
        &self.logs
    }

    fn watchdog(&self) -> Option<&WatchdogLink> {
        self.watchdog.as_ref()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedResponse {
    pub status: StatusCode,
    pub headers: HeaderTable,
    pub body: String,
}

pub(crate) struct FakeRequest {
    method: Method,
    headers: HeaderTable,
    peer: Result<Option<PeerCredentials>, PeerCredentialsError>,
    response: Mutex<Option<RecordedResponse>>,
    ended: AtomicBool,
    refs: AtomicUsize,
    keep_alive: AtomicBool,
}

impl FakeRequest {
    fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderTable::new(),
            peer: Ok(None),
            response: Mutex::new(None),
            ended: AtomicBool::new(false),
            refs: AtomicUsize::new(0),
            keep_alive: AtomicBool::new(true),
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_basic_auth(self, username: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        self.with_header("Authorization", &format!("Basic {encoded}"))
    }

    pub fn with_peer_uid(mut self, uid: u32) -> Self {
        self.peer = Ok(Some(PeerCredentials {
            pid: Some(4242),
            uid,
            gid: uid,
        }));
        self
    }

    pub fn with_peer_error(mut self, errno: Errno) -> Self {
        self.peer = Err(PeerCredentialsError { errno });
        self
    }

    pub fn response(&self) -> Option<RecordedResponse> {
        self.response.lock().clone()
    }

    pub fn refs(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive.load(Ordering::SeqCst)
    }
}

impl ClientRequest for FakeRequest {
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
        let previous = self.response.lock().replace(RecordedResponse {
            status,
            headers: headers.clone(),
            body: String::from_utf8_lossy(body).into_owned(),
        });
        assert!(previous.is_none(), "response written twice");
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn end_request(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    fn set_keep_alive(&self, keep_alive: bool) {
        self.keep_alive.store(keep_alive, Ordering::SeqCst);
    }

    fn retain(&self) {
        self.refs.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.refs.fetch_sub(1, Ordering::SeqCst);
    }
}
