//! Parsing of the status line and header lines of an internal response.

/// Outcome of reading one header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HeaderLine {
    Header(String, String),
    EndOfHeaders,
    /// The connection closed before the headers ended.
    Eof,
    Malformed,
}

/// Status code from `HTTP/<version> <code> <reason>`, if it is in 1..=999.
pub(crate) fn parse_status_line(line: &[u8]) -> Option<u16> {
    let text = std::str::from_utf8(strip_line_ending(line)).ok()?;
    let rest = text.strip_prefix("HTTP/")?;
    let (version, rest) = rest.split_once(' ')?;
    let (code, _reason) = rest.split_once(' ')?;
    if version.is_empty() || code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code: u32 = code.parse().ok()?;
    u16::try_from(code).ok().filter(|code| (1..=999).contains(code))
}

/// Classify one raw line read after the status line.
pub(crate) fn parse_header_line(line: &[u8]) -> HeaderLine {
    if line.is_empty() {
        return HeaderLine::Eof;
    }
    let content = strip_line_ending(line);
    if content.is_empty() {
        return HeaderLine::EndOfHeaders;
    }

    let content = String::from_utf8_lossy(content);
    let Some((name, value)) = content.split_once(':') else {
        return HeaderLine::Malformed;
    };
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() {
        return HeaderLine::Malformed;
    }
    HeaderLine::Header(name.to_string(), value.to_string())
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line() {
        assert_eq!(parse_status_line(b"HTTP/1.1 200 OK\r\n"), Some(200));
        assert_eq!(parse_status_line(b"HTTP/1.0 404 Not Found\n"), Some(404));
        assert_eq!(parse_status_line(b"HTTP/1.1 999 Custom"), Some(999));
        assert_eq!(parse_status_line(b"HTTP/1.1 204 \r\n"), Some(204));
    }

    #[test]
    fn test_status_line_rejected() {
        for line in [
            &b""[..],
            b"\r\n",
            b"garbage\r\n",
            b"HTTP/1.1 200\r\n",
            b"HTTP/1.1 abc OK\r\n",
            b"HTTP/1.1 0 Zero\r\n",
            b"HTTP/1.1 1000 Big\r\n",
            b"HTTP/1.1 99999999999 Huge\r\n",
            b"HTTP/ 200 OK\r\n",
            b"http/1.1 200 OK\r\n",
        ] {
            assert_eq!(parse_status_line(line), None, "{:?}", line.escape_ascii().to_string());
        }
    }

    #[test]
    fn test_header_lines() {
        assert_eq!(
            parse_header_line(b"Content-Type:  text/plain \r\n"),
            HeaderLine::Header("Content-Type".into(), "text/plain".into())
        );
        assert_eq!(
            parse_header_line(b"Filename: /var/log/a:b.log\r\n"),
            HeaderLine::Header("Filename".into(), "/var/log/a:b.log".into())
        );
        assert_eq!(parse_header_line(b"\r\n"), HeaderLine::EndOfHeaders);
        assert_eq!(parse_header_line(b"\n"), HeaderLine::EndOfHeaders);
        assert_eq!(parse_header_line(b""), HeaderLine::Eof);
    }

    #[test]
    fn test_malformed_header_lines() {
        assert_eq!(parse_header_line(b"NoColon\r\n"), HeaderLine::Malformed);
        assert_eq!(parse_header_line(b": value\r\n"), HeaderLine::Malformed);
        assert_eq!(parse_header_line(b"Name:   \r\n"), HeaderLine::Malformed);
        assert_eq!(parse_header_line(b"   \r\n"), HeaderLine::Malformed);
    }
}
