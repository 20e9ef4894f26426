//! `POST /reinherit_logs.json`: take over the watchdog's log file.
//!
//! The agent asks the watchdog for the descriptor of its current log file
//! and switches its own main log output to it. The descriptor arrives over
//! the watchdog's API socket after an HTTP response carrying the file name.

use std::os::fd::AsFd;
use std::sync::Arc;

use http::{Method, StatusCode};
use tracing::{info, warn};

use super::codes;
use super::require;
use super::responses::{error_body, ok_body, respond_with_405, respond_with_json};
use crate::auth::authorize_admin;
use crate::host::{ApiServer, ClientRequest};
use crate::internal::{
    submit_internal_request, InternalRequest, InternalRequestError, InternalResponse,
    ResponseStatus, ResponseStream,
};

pub const LOG_FILE_FD_URI: &str = "/config/log_file.fd";
pub const FD_PASSING_PASSWORD_HEADER: &str = "Fd-Passing-Password";
pub const FILENAME_HEADER: &str = "Filename";

const WATCHDOG_ERROR_PREFIX: &str = "Error communicating with Watchdog process";

pub fn process_reinherit_logs<S: ApiServer>(server: &Arc<S>, request: &Arc<S::Request>) {
    if *request.method() != Method::POST {
        respond_with_405(request.as_ref());
        return;
    }
    if !require(request.as_ref(), authorize_admin(server.as_ref(), request.as_ref())) {
        return;
    }

    let Some(watchdog) = server.watchdog() else {
        respond_with_json(
            request.as_ref(),
            StatusCode::NOT_IMPLEMENTED,
            &error_body(codes::NO_WATCHDOG, "No Watchdog process"),
        );
        return;
    };

    let done_server = Arc::clone(server);
    let done_request = Arc::clone(request);
    let internal = InternalRequest::new(
        watchdog.api_address(),
        LOG_FILE_FD_URI,
        move |response| reinherit_done(done_server.as_ref(), done_request.as_ref(), response),
    )
    .method(Method::GET)
    .header(FD_PASSING_PASSWORD_HEADER, watchdog.fd_passing_password())
    .timeout(server.internal_request_timeout())
    .body_processor(receive_log_fd);

    info!(address = %internal.address(), "Asking Watchdog for its log file");
    submit_internal_request(server.event_loop(), request, internal);
}

/// Runs on the worker thread once the watchdog's headers are in.
fn receive_log_fd(
    response: &mut InternalResponse,
    stream: &mut ResponseStream,
) -> Result<(), InternalRequestError> {
    if response.status != ResponseStatus::Http(200) {
        return Ok(());
    }
    if response.headers.get(FILENAME_HEADER).is_none() {
        response.status = ResponseStatus::InvalidBody;
        response.append_error(format!(
            "{WATCHDOG_ERROR_PREFIX}: no log filename received in response"
        ));
        return Ok(());
    }

    response.received_fd = Some(stream.receive_file_descriptor()?);
    Ok(())
}

/// Runs on the event loop with the watchdog's answer.
fn reinherit_done<S: ApiServer>(server: &S, request: &S::Request, mut response: InternalResponse) {
    if request.is_ended() {
        return;
    }

    let outcome = match response.status {
        ResponseStatus::Http(200) => install_log_fd(server, &mut response),
        ResponseStatus::Http(code) => Err(format!(
            "{WATCHDOG_ERROR_PREFIX}: non-200 response ({code})"
        )),
        ResponseStatus::InvalidHeader => Err(format!(
            "{WATCHDOG_ERROR_PREFIX}: invalid response headers from Watchdog"
        )),
        ResponseStatus::InvalidBody => Err(format!(
            "{WATCHDOG_ERROR_PREFIX}: invalid response body from Watchdog"
        )),
        ResponseStatus::Internal => Err(format!(
            "{WATCHDOG_ERROR_PREFIX}: an internal error occurred"
        )),
    };

    request.set_keep_alive(false);
    match outcome {
        Ok(()) => respond_with_json(request, StatusCode::OK, &ok_body()),
        Err(message) => {
            warn!("{message}");
            respond_with_json(
                request,
                StatusCode::INTERNAL_SERVER_ERROR,
                &error_body(codes::INHERIT_ERROR, message),
            );
        }
    }
}

fn install_log_fd<S: ApiServer>(server: &S, response: &mut InternalResponse) -> Result<(), String> {
    let (Some(fd), Some(path)) = (
        response.received_fd.take(),
        response.headers.get(FILENAME_HEADER),
    ) else {
        return Err(format!(
            "{WATCHDOG_ERROR_PREFIX}: invalid response body from Watchdog"
        ));
    };

    server
        .log_files()
        .main()
        .install_fd(path, fd.as_fd())
        .map_err(|err| format!("Cannot use the log file received from Watchdog: {err}"))?;
    info!(path, "Log file reinherited from Watchdog");
    Ok(())
}
