use std::{collections::BTreeMap, fmt};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unsupported selector: {0}")]
    Unsupported(String),
}

/// The selector forms the bridge relies on: `#id`, `[attr]` and `[attr=value]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Id(String),
    Attribute { name: String, value: Option<String> },
}

impl Selector {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn has_attribute(name: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            value: None,
        }
    }

    pub fn attribute_equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, SelectorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SelectorError::Empty);
        }

        if let Some(id) = raw.strip_prefix('#') {
            if id.is_empty() || !id.chars().all(is_name_char) {
                return Err(SelectorError::Unsupported(raw.to_string()));
            }
            return Ok(Self::Id(id.to_string()));
        }

        let Some(inner) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
            return Err(SelectorError::Unsupported(raw.to_string()));
        };

        let (name, value) = match inner.split_once('=') {
            Some((name, value)) => (name.trim(), Some(unquote(value.trim()))),
            None => (inner.trim(), None),
        };
        if name.is_empty() || !name.chars().all(is_name_char) {
            return Err(SelectorError::Unsupported(raw.to_string()));
        }
        let value = match value {
            Some(Some(value)) => Some(value.to_string()),
            Some(None) => return Err(SelectorError::Unsupported(raw.to_string())),
            None => None,
        };

        Ok(Self::Attribute {
            name: name.to_string(),
            value,
        })
    }

    pub fn matches(&self, attributes: &BTreeMap<String, String>) -> bool {
        match self {
            Selector::Id(id) => attributes.get("id").is_some_and(|v| v == id),
            Selector::Attribute { name, value: None } => attributes.contains_key(name),
            Selector::Attribute {
                name,
                value: Some(expected),
            } => attributes.get(name).is_some_and(|v| v == expected),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Id(id) => write!(f, "#{id}"),
            Selector::Attribute { name, value: None } => write!(f, "[{name}]"),
            Selector::Attribute {
                name,
                value: Some(value),
            } => write!(f, "[{name}=\"{value}\"]"),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':' || c == '.'
}

/// Strips one pair of matching quotes; `None` when quotes are unbalanced.
fn unquote(value: &str) -> Option<&str> {
    for quote in ['"', '\''] {
        if let Some(rest) = value.strip_prefix(quote) {
            return rest.strip_suffix(quote);
        }
    }
    if value.ends_with(['"', '\'']) {
        return None;
    }
    Some(value)
}
