use std::fmt;
use std::os::fd::OwnedFd;
use std::time::Duration;

use http::Method;

use super::error::InternalRequestError;
use super::stream::ResponseStream;
use crate::domain::HeaderTable;

/// Default budget for one internal request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of an internal request: an HTTP status code, or one of three
/// failures that never reach the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Http(u16),
    /// The status line or headers could not be parsed.
    InvalidHeader,
    /// The body processor rejected the body.
    InvalidBody,
    /// The exchange failed; details are in the error log.
    Internal,
}

impl ResponseStatus {
    /// Numeric form. Failures map to -1, -2 and -3.
    pub fn code(self) -> i32 {
        match self {
            Self::Http(code) => i32::from(code),
            Self::InvalidHeader => -1,
            Self::InvalidBody => -2,
            Self::Internal => -3,
        }
    }

    pub fn is_http(self) -> bool {
        matches!(self, Self::Http(_))
    }
}

/// Everything an internal request produced, handed to its callback.
#[derive(Debug)]
pub struct InternalResponse {
    pub status: ResponseStatus,
    pub headers: HeaderTable,
    pub body: Vec<u8>,
    /// Raw protocol lines, logged at debug level on completion.
    pub debug_logs: Vec<String>,
    /// Failure report, logged at error level on completion.
    pub error_logs: String,
    /// Descriptor received by a body processor.
    pub received_fd: Option<OwnedFd>,
}

impl InternalResponse {
    pub(crate) fn new() -> Self {
        Self {
            status: ResponseStatus::Internal,
            headers: HeaderTable::new(),
            body: Vec::new(),
            debug_logs: Vec::new(),
            error_logs: String::new(),
            received_fd: None,
        }
    }

    /// Add a line to the error log.
    pub fn append_error(&mut self, message: impl AsRef<str>) {
        self.error_logs.push_str(message.as_ref());
        if !self.error_logs.ends_with('\n') {
            self.error_logs.push('\n');
        }
    }

    pub(crate) fn record_line(&mut self, raw: &[u8]) {
        self.debug_logs.push(format!(
            "Internal request response data: \"{}\"",
            raw.escape_ascii()
        ));
    }

    /// Reset to the internal-error state, keeping the logs.
    pub(crate) fn fail(&mut self, message: impl AsRef<str>) {
        self.status = ResponseStatus::Internal;
        self.headers.clear();
        self.body.clear();
        self.received_fd = None;
        self.append_error(message);
    }
}

/// Custom body handling, run on the worker thread once the headers are in.
///
/// It may replace `status` (typically with [`ResponseStatus::InvalidBody`])
/// and store results in the response. Returning an error fails the request
/// with [`ResponseStatus::Internal`].
pub type BodyProcessor = Box<
    dyn FnOnce(&mut InternalResponse, &mut ResponseStream) -> Result<(), InternalRequestError>
        + Send
        + 'static,
>;

/// Runs on the event loop with the finished response.
pub type CompletionCallback = Box<dyn FnOnce(InternalResponse) + Send + 'static>;

/// A one-shot HTTP/1.1 request to another agent.
pub struct InternalRequest {
    pub(crate) address: String,
    pub(crate) method: Method,
    pub(crate) uri: String,
    pub(crate) headers: HeaderTable,
    pub(crate) timeout: Duration,
    pub(crate) body_processor: Option<BodyProcessor>,
    pub(crate) callback: CompletionCallback,
}

impl InternalRequest {
    /// GET `uri` at `address` with the default timeout.
    pub fn new<F>(address: impl Into<String>, uri: impl Into<String>, callback: F) -> Self
    where
        F: FnOnce(InternalResponse) + Send + 'static,
    {
        Self {
            address: address.into(),
            method: Method::GET,
            uri: uri.into(),
            headers: HeaderTable::new(),
            timeout: DEFAULT_TIMEOUT,
            body_processor: None,
            callback: Box::new(callback),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn body_processor<F>(mut self, processor: F) -> Self
    where
        F: FnOnce(&mut InternalResponse, &mut ResponseStream) -> Result<(), InternalRequestError>
            + Send
            + 'static,
    {
        self.body_processor = Some(Box::new(processor));
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Request line and headers, ending with the blank line.
    pub(crate) fn encode_head(&self) -> Vec<u8> {
        let mut head = format!("{} {} HTTP/1.1\r\n", self.method, self.uri);
        for (name, value) in self.headers.iter() {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("Connection: close\r\n\r\n");
        head.into_bytes()
    }
}

impl fmt::Debug for InternalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalRequest")
            .field("address", &self.address)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("timeout", &self.timeout)
            .field("body_processor", &self.body_processor.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ResponseStatus::Http(200).code(), 200);
        assert_eq!(ResponseStatus::InvalidHeader.code(), -1);
        assert_eq!(ResponseStatus::InvalidBody.code(), -2);
        assert_eq!(ResponseStatus::Internal.code(), -3);
        assert!(!ResponseStatus::Internal.is_http());
    }

    #[test]
    fn test_encode_head() {
        let request = InternalRequest::new("unix:/tmp/api", "/config/log_file.fd", |_| {})
            .header("Fd-Passing-Password", "pw");
        assert_eq!(
            String::from_utf8(request.encode_head()).unwrap(),
            "GET /config/log_file.fd HTTP/1.1\r\nFd-Passing-Password: pw\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_fail_resets_response() {
        let mut response = InternalResponse::new();
        response.status = ResponseStatus::Http(200);
        response.headers.insert("A", "b");
        response.body = b"partial".to_vec();

        response.fail("connection reset");
        assert_eq!(response.status, ResponseStatus::Internal);
        assert!(response.headers.is_empty());
        assert!(response.body.is_empty());
        assert_eq!(response.error_logs, "connection reset\n");
    }

    #[test]
    fn test_record_line_escapes() {
        let mut response = InternalResponse::new();
        response.record_line(b"HTTP/1.1 200 OK\r\n");
        assert_eq!(
            response.debug_logs,
            vec!["Internal request response data: \"HTTP/1.1 200 OK\\r\\n\"".to_string()]
        );
    }
}
