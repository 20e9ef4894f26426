//! Query string parsing.

use std::collections::BTreeMap;

use url::form_urlencoded;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid query string format: '{pair}' has no '='")]
pub struct QueryStringError {
    pub pair: String,
}

/// Parse `name=value&...` into a map, percent-decoding names and values.
///
/// Every non-empty pair must contain `=`. Later duplicates win.
pub fn parse_query_string(query: &str) -> Result<BTreeMap<String, String>, QueryStringError> {
    if let Some(pair) = query
        .split('&')
        .find(|pair| !pair.is_empty() && !pair.contains('='))
    {
        return Err(QueryStringError {
            pair: pair.to_string(),
        });
    }

    Ok(form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect())
}
