use std::sync::Arc;

use tracing::debug;

use super::request::HostedRequest;
use super::AgentApiServer;
use crate::domain::parse_query_string;
use crate::endpoints::{
    process_backtraces, process_ping, process_reinherit_logs, process_reopen_logs,
    process_shutdown, process_version, respond_with_404, respond_with_422,
};
use crate::host::ClientRequest;

/// Route one request to its endpoint. Runs on the event loop.
pub(crate) fn dispatch(server: &Arc<AgentApiServer>, request: &Arc<HostedRequest>) {
    debug!(method = %request.method(), path = request.path(), "Processing API request");

    if let Some(query) = request.query() {
        if let Err(err) = parse_query_string(query) {
            respond_with_422(request.as_ref(), &err.to_string());
            return;
        }
    }

    match request.path() {
        "/ping.json" => process_ping(server.as_ref(), request.as_ref()),
        "/version.json" => process_version(server.as_ref(), request.as_ref()),
        "/backtraces.txt" => process_backtraces(server.as_ref(), request.as_ref()),
        "/shutdown.json" => process_shutdown(server.as_ref(), request.as_ref()),
        "/reopen_logs.json" => process_reopen_logs(server.as_ref(), request.as_ref()),
        "/reinherit_logs.json" => process_reinherit_logs(server, request),
        _ => respond_with_404(request.as_ref()),
    }
}
