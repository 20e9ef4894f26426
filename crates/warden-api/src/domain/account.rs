//! API accounts.
//!
//! The control socket can be password protected with a fixed set of accounts,
//! each either read-only or with full access. Accounts are registered during
//! startup and never change afterwards.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Username that selects API-key authentication instead of an account.
pub const RESERVED_USERNAME: &str = "api";

/// Errors raised while registering accounts.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("it is not allowed to register an API account with username 'api'")]
    ReservedUsername,

    #[error("invalid privilege level '{0}'; expected 'readonly' or 'full'")]
    InvalidLevel(String),

    #[error("invalid authorization description '{0}'; expected [LEVEL:]USERNAME:PASSWORDFILE")]
    InvalidDescriptor(String),

    #[error("cannot read password file {}: {source}", path.display())]
    PasswordFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A single API account.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    username: String,
    password: String,
    read_only: bool,
}

impl Account {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Accounts keyed by username.
///
/// Accounts are kept in registration order. Lookup returns the first account
/// with a matching username.
#[derive(Debug, Clone, Default)]
pub struct AccountStore {
    accounts: Vec<Account>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account.
    pub fn add(
        &mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        read_only: bool,
    ) -> Result<(), AccountError> {
        let username = username.into();
        if username == RESERVED_USERNAME {
            return Err(AccountError::ReservedUsername);
        }

        self.accounts.push(Account {
            username,
            password: password.into(),
            read_only,
        });
        Ok(())
    }

    /// Register an account from a `[LEVEL:]USERNAME:PASSWORDFILE` descriptor.
    ///
    /// LEVEL is `readonly` or `full` and defaults to `full`. The password is
    /// the content of PASSWORDFILE with surrounding whitespace removed.
    pub fn add_descriptor(&mut self, descriptor: &str) -> Result<(), AccountError> {
        let parts: Vec<&str> = descriptor.split(':').collect();
        let (read_only, username, password_file) = match parts.as_slice() {
            [username, password_file] => (false, *username, *password_file),
            [level, username, password_file] => (parse_level(level)?, *username, *password_file),
            _ => return Err(AccountError::InvalidDescriptor(descriptor.to_string())),
        };
        if username.is_empty() || password_file.is_empty() {
            return Err(AccountError::InvalidDescriptor(descriptor.to_string()));
        }
        if username == RESERVED_USERNAME {
            return Err(AccountError::ReservedUsername);
        }

        let password = read_password(password_file)?;
        self.add(username, password, read_only)
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, username: &str) -> Option<&Account> {
        self.accounts.iter().find(|account| account.username == username)
    }
}

fn parse_level(level: &str) -> Result<bool, AccountError> {
    match level {
        "readonly" => Ok(true),
        "full" => Ok(false),
        other => Err(AccountError::InvalidLevel(other.to_string())),
    }
}

fn read_password(path: &str) -> Result<String, AccountError> {
    fs::read_to_string(path)
        .map(|content| content.trim().to_string())
        .map_err(|source| AccountError::PasswordFile {
            path: PathBuf::from(path),
            source,
        })
}
