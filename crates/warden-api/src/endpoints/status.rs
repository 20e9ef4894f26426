//! Read-only status endpoints.

use http::StatusCode;
use serde_json::json;
use tracing::debug;

use super::{authorize_or_fail, require};
use crate::auth::authorize_state_inspection;
use super::responses::{ok_body, respond_with_401, respond_with_json, respond_with_text};
use crate::host::ApiServer;
use crate::{API_VERSION_MAJOR, API_VERSION_MINOR, PROGRAM_NAME, VERSION};

/// `GET /ping.json`
pub fn process_ping<S: ApiServer>(server: &S, request: &S::Request) {
    let Some(auth) = authorize_or_fail(server, request) else {
        return;
    };
    if auth.can_query_status() {
        respond_with_json(request, StatusCode::OK, &ok_body());
    } else {
        respond_with_401(request);
    }
}

/// `GET /version.json`
pub fn process_version<S: ApiServer>(server: &S, request: &S::Request) {
    let Some(auth) = authorize_or_fail(server, request) else {
        return;
    };
    if !auth.can_query_status() {
        respond_with_401(request);
        return;
    }

    let body = json!({
        "program_name": PROGRAM_NAME,
        "program_version": VERSION,
        "api_version": format!("{API_VERSION_MAJOR}.{API_VERSION_MINOR}"),
        "api_version_major": API_VERSION_MAJOR,
        "api_version_minor": API_VERSION_MINOR,
    });
    respond_with_json(request, StatusCode::OK, &body);
}

/// `GET /backtraces.txt`
pub fn process_backtraces<S: ApiServer>(server: &S, request: &S::Request) {
    if !require(request, authorize_state_inspection(server, request)) {
        return;
    }

    debug!("Dumping thread backtraces");
    respond_with_text(request, StatusCode::OK, &warden_telemetry::all_backtraces());
}
