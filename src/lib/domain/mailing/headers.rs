//! Custom mail headers

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use lazy_static::lazy_static;
use regex::Regex;

use super::errors::HeaderError;

/// Maximum length of a header name
pub const MAX_HEADER_NAME_LENGTH: usize = 70;

/// Maximum length of a header value, the RFC 5322 line limit
pub const MAX_HEADER_VALUE_LENGTH: usize = 998;

lazy_static! {
    static ref HEADER_NAME_REGEX: Regex = Regex::new(r"^[-a-zA-Z0-9_]+$").unwrap();
}

/// A custom header set on a campaign or a mail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailHeader {
    name: String,
    value: String,
}

impl MailHeader {
    /// Create a validated header
    pub fn new(name: &str, value: &str) -> Result<Self, HeaderError> {
        let name = name.trim();

        if name.len() > MAX_HEADER_NAME_LENGTH {
            return Err(HeaderError::NameTooLong(MAX_HEADER_NAME_LENGTH));
        }

        if !HEADER_NAME_REGEX.is_match(name) {
            return Err(HeaderError::InvalidName(name.to_string()));
        }

        if value.len() > MAX_HEADER_VALUE_LENGTH {
            return Err(HeaderError::ValueTooLong(MAX_HEADER_VALUE_LENGTH));
        }

        if value.contains(['\r', '\n']) {
            return Err(HeaderError::InvalidValue(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    /// Wrap a header that was already validated, e.g. one read back from the database
    pub fn new_unchecked(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// Header name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Header value
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for MailHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Campaign headers overridden by mail headers of the same (case-insensitive) name.
///
/// A mail header replaces every campaign header of its name, taking the position of the first
/// one. Repeats on the same level are kept. Mail headers with new names are appended in order.
pub fn merge_headers(campaign: Vec<MailHeader>, mail: Vec<MailHeader>) -> Vec<MailHeader> {
    let mut merged: Vec<MailHeader> = Vec::with_capacity(campaign.len() + mail.len());
    let mut order: Vec<String> = Vec::new();
    let mut overrides: HashMap<String, Vec<MailHeader>> = HashMap::new();

    for header in mail {
        let key = header.name.to_ascii_lowercase();

        overrides
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(header);
    }

    let mut overridden: HashSet<String> = HashSet::new();

    for header in campaign {
        let key = header.name.to_ascii_lowercase();

        match overrides.remove(&key) {
            Some(replacements) => {
                merged.extend(replacements);
                overridden.insert(key);
            }
            None if overridden.contains(&key) => {}
            None => merged.push(header),
        }
    }

    for key in order {
        if let Some(headers) = overrides.remove(&key) {
            merged.extend(headers);
        }
    }

    merged
}
