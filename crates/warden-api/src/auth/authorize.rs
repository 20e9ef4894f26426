//! Request authorization.
//!
//! Three independent sources can grant capabilities to a request: the Unix
//! peer UID, an empty account store, and HTTP Basic credentials naming either
//! an account or (with the reserved `api` username) an API key. Grants only
//! accumulate; no source can take away what another granted.

use tracing::{debug, info};

use super::basic::parse_basic_auth_header;
use super::compare::constant_time_compare;
use super::credentials::PeerCredentialsError;
use crate::domain::{ApiKey, RESERVED_USERNAME};
use crate::host::{ApiServer, ClientRequest};

/// Capabilities granted to one request.
#[derive(Debug, Clone, Default)]
pub struct Authorization {
    /// Peer UID, when that UID was authorized.
    pub uid: Option<u32>,
    /// Key the request authenticated with. The super key stands for an
    /// account or an empty account store.
    pub api_key: Option<ApiKey>,
    pub can_read_pool: bool,
    pub can_modify_pool: bool,
    pub can_inspect_state: bool,
    pub can_administer: bool,
}

impl Authorization {
    /// Whether status endpoints such as ping may be served.
    pub fn can_query_status(&self) -> bool {
        self.can_read_pool || self.can_inspect_state
    }

    fn grant_all(&mut self) {
        self.can_read_pool = true;
        self.can_modify_pool = true;
        self.can_inspect_state = true;
        self.can_administer = true;
    }
}

/// Authorization failures that leave the request unanswerable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthorizationError {
    #[error(transparent)]
    PeerCredentials(#[from] PeerCredentialsError),
}

/// Work out what `request` may do.
pub fn authorize<S: ApiServer>(
    server: &S,
    request: &S::Request,
) -> Result<Authorization, AuthorizationError> {
    let mut auth = Authorization::default();

    if let Some(peer) = request.peer_credentials()? {
        let uid = peer.uid;
        if server.authorize_by_uid(uid) {
            info!(uid, "Authenticated with UID");
            auth.uid = Some(uid);
            auth.can_read_pool = true;
            auth.can_modify_pool = true;
            let privileged = server.trust_policy().is_privileged(uid);
            auth.can_inspect_state |= privileged;
            auth.can_administer |= privileged;
        } else {
            info!(uid, "Authentication failed for UID");
        }
    }

    if server.accounts().is_empty() {
        info!("Authenticated as administrator because API account database is empty");
        auth.api_key = Some(ApiKey::make_super());
        auth.grant_all();
    } else if let Some(credentials) =
        parse_basic_auth_header(request.header("authorization").as_deref())
    {
        debug!(username = %credentials.username, "HTTP basic authentication supplied");
        if credentials.username == RESERVED_USERNAME {
            authorize_api_key(server, &mut auth, &credentials.password);
        } else {
            authorize_account(server, &mut auth, &credentials.username, &credentials.password);
        }
    }

    Ok(auth)
}

fn authorize_api_key<S: ApiServer>(server: &S, auth: &mut Authorization, presented: &str) {
    let Some(key) = ApiKey::parse(presented) else {
        info!("Authentication failed: malformed API key");
        return;
    };
    debug_assert!(!key.is_super());

    if server.authorize_by_api_key(&key) {
        info!(api_key = %key, "Authenticated with API key");
        auth.api_key = Some(key);
        auth.can_read_pool = true;
        auth.can_modify_pool = true;
    } else {
        info!(api_key = %key, "Authentication failed for API key");
    }
}

fn authorize_account<S: ApiServer>(
    server: &S,
    auth: &mut Authorization,
    username: &str,
    password: &str,
) {
    let account = server.accounts().lookup(username).filter(|account| {
        constant_time_compare(password.as_bytes(), account.password().as_bytes())
    });
    let Some(account) = account else {
        info!(username, "Authentication failed for account");
        return;
    };

    if account.is_read_only() {
        info!(username, "Authenticated with read-only administrator account");
    } else {
        info!(username, "Authenticated with administrator account");
    }
    auth.api_key = Some(ApiKey::make_super());
    auth.can_read_pool = true;
    auth.can_modify_pool |= !account.is_read_only();
    auth.can_inspect_state = true;
    auth.can_administer |= !account.is_read_only();
}

/// Whether `request` may inspect agent state.
pub fn authorize_state_inspection<S: ApiServer>(
    server: &S,
    request: &S::Request,
) -> Result<bool, AuthorizationError> {
    Ok(authorize(server, request)?.can_inspect_state)
}

/// Whether `request` may perform administrative actions.
pub fn authorize_admin<S: ApiServer>(
    server: &S,
    request: &S::Request,
) -> Result<bool, AuthorizationError> {
    Ok(authorize(server, request)?.can_administer)
}
