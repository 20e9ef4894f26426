//! Canned responses shared by every endpoint.

use http::StatusCode;
use serde_json::{json, Value};

use crate::domain::HeaderTable;
use crate::host::ClientRequest;

pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

fn headers(content_type: &str) -> HeaderTable {
    HeaderTable::new()
        .with("Content-Type", content_type)
        .with("Cache-Control", NO_CACHE)
}

/// Write the response and end the request.
fn finish<R: ClientRequest>(request: &R, status: StatusCode, headers: &HeaderTable, body: &[u8]) {
    request.write_simple_response(status, headers, body);
    if !request.is_ended() {
        request.end_request();
    }
}

pub fn respond_with_401<R: ClientRequest>(request: &R) {
    let headers = headers(TEXT_PLAIN).with("WWW-Authenticate", "Basic realm=\"api\"");
    finish(request, StatusCode::UNAUTHORIZED, &headers, b"Unauthorized");
}

pub fn respond_with_404<R: ClientRequest>(request: &R) {
    finish(request, StatusCode::NOT_FOUND, &headers(TEXT_PLAIN), b"Not found");
}

pub fn respond_with_405<R: ClientRequest>(request: &R) {
    finish(
        request,
        StatusCode::METHOD_NOT_ALLOWED,
        &headers(TEXT_PLAIN),
        b"Method not allowed",
    );
}

pub fn respond_with_413<R: ClientRequest>(request: &R) {
    finish(
        request,
        StatusCode::PAYLOAD_TOO_LARGE,
        &headers(TEXT_PLAIN),
        b"Request body too large",
    );
}

pub fn respond_with_422<R: ClientRequest>(request: &R, body: &str) {
    finish(
        request,
        StatusCode::UNPROCESSABLE_ENTITY,
        &headers(TEXT_PLAIN),
        body.as_bytes(),
    );
}

pub fn respond_with_500<R: ClientRequest>(request: &R, body: &str) {
    finish(
        request,
        StatusCode::INTERNAL_SERVER_ERROR,
        &headers(TEXT_PLAIN),
        body.as_bytes(),
    );
}

pub fn respond_with_json<R: ClientRequest>(request: &R, status: StatusCode, body: &Value) {
    finish(
        request,
        status,
        &headers(APPLICATION_JSON),
        body.to_string().as_bytes(),
    );
}

pub fn respond_with_text<R: ClientRequest>(request: &R, status: StatusCode, body: &str) {
    finish(request, status, &headers(TEXT_PLAIN), body.as_bytes());
}

/// `{"status": "ok"}`
pub fn ok_body() -> Value {
    json!({ "status": "ok" })
}

/// `{"status": "error", "code": ..., "message": ...}`
pub fn error_body(code: &str, message: impl Into<String>) -> Value {
    json!({
        "status": "error",
        "code": code,
        "message": message.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRequest;

    #[test]
    fn test_401_challenges_basic_auth() {
        let request = FakeRequest::get();
        respond_with_401(&request);

        let response = request.response().unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers.get("www-authenticate"),
            Some("Basic realm=\"api\"")
        );
        assert_eq!(response.headers.get("cache-control"), Some(NO_CACHE));
        assert_eq!(response.body, "Unauthorized");
        assert!(request.is_ended());
    }

    #[test]
    fn test_plain_error_responses() {
        let cases: [(fn(&FakeRequest), StatusCode, &str); 3] = [
            (respond_with_404, StatusCode::NOT_FOUND, "Not found"),
            (respond_with_405, StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
            (respond_with_413, StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"),
        ];
        for (respond, status, body) in cases {
            let request = FakeRequest::get();
            respond(&request);
            let response = request.response().unwrap();
            assert_eq!(response.status, status);
            assert_eq!(response.body, body);
            assert_eq!(response.headers.get("content-type"), Some(TEXT_PLAIN));
            assert!(request.is_ended());
        }
    }

    #[test]
    fn test_422_and_500_carry_body() {
        let request = FakeRequest::get();
        respond_with_422(&request, "bad field");
        assert_eq!(request.response().unwrap().status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(request.response().unwrap().body, "bad field");

        let request = FakeRequest::get();
        respond_with_500(&request, "boom");
        assert_eq!(request.response().unwrap().status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(request.response().unwrap().body, "boom");
    }

    #[test]
    fn test_json_bodies() {
        assert_eq!(ok_body().to_string(), r#"{"status":"ok"}"#);
        let error = error_body("NO_WATCHDOG", "No Watchdog process");
        assert_eq!(error["status"], "error");
        assert_eq!(error["code"], "NO_WATCHDOG");
        assert_eq!(error["message"], "No Watchdog process");
    }
}
