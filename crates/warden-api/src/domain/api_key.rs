//! API keys.
//!
//! An API key is a fixed-length alphanumeric token presented as the password
//! of the reserved `api` username. The special super key is never parsed from
//! input; it marks requests authorized through an account or an empty account
//! store.

use std::fmt;

use subtle::ConstantTimeEq;

#[derive(Clone)]
enum Repr {
    Super,
    Key([u8; ApiKey::SIZE]),
}

/// An API key, or the super key.
///
/// Equality is only available through [`ApiKey::matches`], which runs in
/// constant time. `Display` and `Debug` never reveal more than the first
/// three characters.
#[derive(Clone)]
pub struct ApiKey(Repr);

impl ApiKey {
    /// Length of a regular key in bytes.
    pub const SIZE: usize = 16;

    /// Parse a regular key. Returns `None` unless `input` is exactly
    /// [`ApiKey::SIZE`] ASCII alphanumeric characters.
    pub fn parse(input: &str) -> Option<Self> {
        let bytes = input.as_bytes();
        if bytes.len() != Self::SIZE || !bytes.iter().all(u8::is_ascii_alphanumeric) {
            return None;
        }
        let mut key = [0u8; Self::SIZE];
        key.copy_from_slice(bytes);
        Some(Self(Repr::Key(key)))
    }

    pub fn make_super() -> Self {
        Self(Repr::Super)
    }

    pub fn is_super(&self) -> bool {
        matches!(self.0, Repr::Super)
    }

    /// Raw key bytes; `None` for the super key.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.0 {
            Repr::Super => None,
            Repr::Key(key) => Some(key),
        }
    }

    /// Constant-time comparison of two regular keys. The super key matches
    /// nothing, not even itself.
    pub fn matches(&self, other: &ApiKey) -> bool {
        match (&self.0, &other.0) {
            (Repr::Key(a), Repr::Key(b)) => a[..].ct_eq(&b[..]).into(),
            _ => false,
        }
    }

    /// Loggable form: the first three characters followed by a mask.
    pub fn truncated(&self) -> String {
        match &self.0 {
            Repr::Super => "<super>".to_string(),
            Repr::Key(key) => truncate_api_key(key),
        }
    }
}

/// First three bytes of `key` followed by `*****`.
pub fn truncate_api_key(key: &[u8]) -> String {
    let prefix = &key[..key.len().min(3)];
    format!("{}*****", String::from_utf8_lossy(prefix))
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.truncated())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.truncated())
    }
}

/// Invalid key found while building an [`ApiKeyRing`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid API key at position {index}: expected {} alphanumeric characters", ApiKey::SIZE)]
pub struct InvalidApiKey {
    pub index: usize,
}

/// The set of API keys an agent accepts.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyRing {
    keys: Vec<ApiKey>,
}

impl ApiKeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every string in `keys`, failing on the first invalid one.
    pub fn from_strings<I, S>(keys: I) -> Result<Self, InvalidApiKey>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .enumerate()
            .map(|(index, key)| ApiKey::parse(key.as_ref()).ok_or(InvalidApiKey { index }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { keys })
    }

    pub fn insert(&mut self, key: ApiKey) {
        if !key.is_super() {
            self.keys.push(key);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether `key` is in the ring. Every stored key is compared so the
    /// running time does not depend on which key matched.
    pub fn authorize(&self, key: &ApiKey) -> bool {
        self.keys
            .iter()
            .fold(false, |found, candidate| candidate.matches(key) | found)
    }
}
