//! HTTP Basic authentication header parsing.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const SCHEME_PREFIX: &str = "Basic ";

/// Username and password from an `Authorization: Basic` header.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parse an `Authorization` header value.
///
/// The scheme must be exactly `Basic ` followed by base64 of
/// `username:password`, split at the first colon. Anything else, including
/// credentials that are not valid UTF-8, yields `None`.
pub fn parse_basic_auth_header(value: Option<&str>) -> Option<BasicCredentials> {
    let encoded = value?.strip_prefix(SCHEME_PREFIX)?;
    if encoded.is_empty() {
        return None;
    }

    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(raw: &str) -> String {
        format!("Basic {}", STANDARD.encode(raw))
    }

    #[test]
    fn test_parse_valid() {
        let creds = parse_basic_auth_header(Some(&header("admin:secret"))).unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn test_split_at_first_colon() {
        let creds = parse_basic_auth_header(Some(&header("admin:pa:ss"))).unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "pa:ss");

        let creds = parse_basic_auth_header(Some(&header(":"))).unwrap();
        assert_eq!(creds.username, "");
        assert_eq!(creds.password, "");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse_basic_auth_header(None).is_none());
        assert!(parse_basic_auth_header(Some("")).is_none());
        assert!(parse_basic_auth_header(Some("Basic ")).is_none());
        assert!(parse_basic_auth_header(Some("basic YWRtaW46c2VjcmV0")).is_none());
        assert!(parse_basic_auth_header(Some("Bearer YWRtaW46c2VjcmV0")).is_none());
        assert!(parse_basic_auth_header(Some("Basic !!!not-base64")).is_none());
        assert!(parse_basic_auth_header(Some(&header("no-colon"))).is_none());
    }

    #[test]
    fn test_rejects_surrounding_whitespace() {
        let encoded = STANDARD.encode("admin:secret");
        assert!(parse_basic_auth_header(Some(&format!("Basic   {encoded}  "))).is_none());
        assert!(parse_basic_auth_header(Some(&format!("Basic  {encoded}"))).is_none());
        assert!(parse_basic_auth_header(Some(&format!("Basic {encoded}\t"))).is_none());
        assert!(parse_basic_auth_header(Some(&format!(" Basic {encoded}"))).is_none());
    }

    #[test]
    fn test_rejects_non_utf8() {
        let value = format!("Basic {}", STANDARD.encode([0xff, b':', b'x']));
        assert!(parse_basic_auth_header(Some(&value)).is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = parse_basic_auth_header(Some(&header("admin:hunter2"))).unwrap();
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
