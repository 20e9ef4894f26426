//! Minimal HTTP/1.1 framing for the control socket.
//!
//! Each connection carries exactly one request. Bodies are read and
//! discarded since no endpoint takes one.

use std::io;

use http::{Method, StatusCode};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::domain::HeaderTable;

#[derive(Debug, Default)]
pub(crate) struct RequestHead {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderTable,
    pub content_length: u64,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum HeadError {
    #[error("connection closed before a request arrived")]
    Closed,

    #[error("request head exceeds {0} bytes")]
    TooLarge(usize),

    #[error("malformed request: {0}")]
    Malformed(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Read the request line and headers, at most `limit` bytes in total.
pub(crate) async fn read_request_head<R>(reader: &mut R, limit: usize) -> Result<RequestHead, HeadError>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0;
    let Some(request_line) = read_head_line(reader, limit, &mut consumed).await? else {
        return Err(HeadError::Closed);
    };

    let mut parts = request_line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HeadError::Malformed("invalid request line"));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HeadError::Malformed("unsupported HTTP version"));
    }
    let method =
        Method::from_bytes(method.as_bytes()).map_err(|_| HeadError::Malformed("invalid method"))?;
    if !target.starts_with('/') {
        return Err(HeadError::Malformed("invalid request target"));
    }
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    };

    let mut headers = HeaderTable::new();
    loop {
        let Some(line) = read_head_line(reader, limit, &mut consumed).await? else {
            return Err(HeadError::Malformed("incomplete request head"));
        };
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or(HeadError::Malformed("invalid header line"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(HeadError::Malformed("invalid header line"));
        }
        headers.insert(name, value.trim());
    }

    if headers.contains("transfer-encoding") {
        return Err(HeadError::Malformed("chunked request bodies are not supported"));
    }
    let content_length = headers
        .get("content-length")
        .map(str::parse::<u64>)
        .transpose()
        .map_err(|_| HeadError::Malformed("invalid Content-Length"))?
        .unwrap_or(0);

    Ok(RequestHead {
        method,
        path,
        query,
        headers,
        content_length,
    })
}

/// One line without its terminator, or `None` at end of stream.
async fn read_head_line<R>(
    reader: &mut R,
    limit: usize,
    consumed: &mut usize,
) -> Result<Option<String>, HeadError>
where
    R: AsyncBufRead + Unpin,
{
    let remaining = limit.saturating_sub(*consumed);
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(remaining as u64)
        .read_until(b'\n', &mut line)
        .await?;
    *consumed += read;

    if !line.ends_with(b"\n") {
        return if *consumed >= limit {
            Err(HeadError::TooLarge(limit))
        } else if read == 0 {
            Ok(None)
        } else {
            Err(HeadError::Malformed("incomplete request head"))
        };
    }

    line.pop();
    if line.ends_with(b"\r") {
        line.pop();
    }
    String::from_utf8(line)
        .map(Some)
        .map_err(|_| HeadError::Malformed("request head is not UTF-8"))
}

/// Serialize a complete response. The connection always closes afterwards.
pub(crate) fn encode_response(status: StatusCode, headers: &HeaderTable, body: &[u8]) -> Vec<u8> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    );
    for (name, value) in headers.iter() {
        if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection") {
            continue;
        }
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    ));

    let mut response = head.into_bytes();
    response.extend_from_slice(body);
    response
}
