//! Administrative endpoints.

use std::io;
use std::path::Path;

use http::{Method, StatusCode};
use nix::errno::Errno;
use tracing::{info, warn};

use super::codes;
use super::require;
use super::responses::{error_body, ok_body, respond_with_405, respond_with_json};
use crate::auth::authorize_admin;
use crate::host::{ApiServer, ClientRequest};
use crate::PROGRAM_NAME;

/// `POST /shutdown.json`
pub fn process_shutdown<S: ApiServer>(server: &S, request: &S::Request) {
    if *request.method() != Method::POST {
        respond_with_405(request);
        return;
    }
    if !require(request, authorize_admin(server, request)) {
        return;
    }

    info!("Shutdown requested through the API");
    server.notify_exit();
    respond_with_json(request, StatusCode::OK, &ok_body());
}

/// `POST /reopen_logs.json`
///
/// Re-opens the main log file, then the file descriptor log file if one is
/// configured. Stops at the first failure.
pub fn process_reopen_logs<S: ApiServer>(server: &S, request: &S::Request) {
    if *request.method() != Method::POST {
        respond_with_405(request);
        return;
    }
    if !require(request, authorize_admin(server, request)) {
        return;
    }

    let logs = server.log_files();
    let Some(path) = logs.main().path() else {
        fail(
            request,
            codes::NO_LOG_FILE,
            format!("{PROGRAM_NAME} was not configured with a log file."),
        );
        return;
    };
    if let Err(err) = logs.main().reopen() {
        fail(
            request,
            codes::LOG_FILE_OPEN_ERROR,
            reopen_error("log file", &path, &err),
        );
        return;
    }
    info!(path = %path.display(), "Log file reopened");

    if let Some(fd_log) = logs.fd_log() {
        if let Some(path) = fd_log.path() {
            if let Err(err) = fd_log.reopen() {
                fail(
                    request,
                    codes::FD_LOG_FILE_OPEN_ERROR,
                    reopen_error("file descriptor log file", &path, &err),
                );
                return;
            }
            info!(path = %path.display(), "File descriptor log file reopened");
        }
    }

    respond_with_json(request, StatusCode::OK, &ok_body());
}

fn fail<R: ClientRequest>(request: &R, code: &str, message: String) {
    warn!(code, "{message}");
    respond_with_json(
        request,
        StatusCode::INTERNAL_SERVER_ERROR,
        &error_body(code, message),
    );
}

fn reopen_error(what: &str, path: &Path, err: &io::Error) -> String {
    match err.raw_os_error() {
        Some(errno) => format!(
            "Cannot reopen {what} {}: {} (errno={errno})",
            path.display(),
            Errno::from_raw(errno).desc()
        ),
        None => format!("Cannot reopen {what} {}: {err}", path.display()),
    }
}
