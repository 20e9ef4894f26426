//! Domain types: accounts, API keys, headers and configuration.

pub mod account;
pub mod api_key;
pub mod config;
pub mod headers;
pub mod query;

pub use account::{Account, AccountError, AccountStore, RESERVED_USERNAME};
pub use api_key::{truncate_api_key, ApiKey, ApiKeyRing, InvalidApiKey};
pub use config::{AgentConfig, ConfigError};
pub use headers::HeaderTable;
pub use query::{parse_query_string, QueryStringError};
