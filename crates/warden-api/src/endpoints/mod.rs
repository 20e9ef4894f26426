//! Endpoint handlers shared by every agent's API server.

pub mod admin;
pub mod reinherit;
pub mod responses;
pub mod status;

use tracing::error;

use crate::auth::{authorize, Authorization, AuthorizationError};
use crate::host::{ApiServer, ClientRequest};

pub use admin::{process_reopen_logs, process_shutdown};
pub use reinherit::process_reinherit_logs;
pub use responses::{
    respond_with_401, respond_with_404, respond_with_405, respond_with_413, respond_with_422,
    respond_with_500,
};
pub use status::{process_backtraces, process_ping, process_version};

/// Error codes in JSON error bodies.
pub mod codes {
    pub const NO_LOG_FILE: &str = "NO_LOG_FILE";
    pub const LOG_FILE_OPEN_ERROR: &str = "LOG_FILE_OPEN_ERROR";
    pub const FD_LOG_FILE_OPEN_ERROR: &str = "FD_LOG_FILE_OPEN_ERROR";
    pub const NO_WATCHDOG: &str = "NO_WATCHDOG";
    pub const INHERIT_ERROR: &str = "INHERIT_ERROR";
}

/// Authorize `request`, answering 500 if that is impossible.
fn authorize_or_fail<S: ApiServer>(server: &S, request: &S::Request) -> Option<Authorization> {
    authorize(server, request)
        .map_err(|err| cannot_authorize(request, err))
        .ok()
}

/// Answer 401 or 500 unless a capability check passed. Returns whether the
/// handler may go on.
fn require<R: ClientRequest>(request: &R, allowed: Result<bool, AuthorizationError>) -> bool {
    match allowed {
        Ok(true) => true,
        Ok(false) => {
            responses::respond_with_401(request);
            false
        }
        Err(err) => {
            cannot_authorize(request, err);
            false
        }
    }
}

fn cannot_authorize<R: ClientRequest>(request: &R, err: AuthorizationError) {
    error!(error = %err, "Cannot authorize API request");
    responses::respond_with_500(request, "Internal server error: cannot authorize request");
}
