//! Qualified names for services, ports and header blocks.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced when parsing a [`QName`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QNameError {
    /// The namespace part was opened with `{` but never closed.
    #[error("unterminated namespace in qualified name: {0}")]
    UnterminatedNamespace(String),

    /// The local part is empty.
    #[error("empty local part in qualified name: {0}")]
    EmptyLocalPart(String),
}

/// A namespace-qualified name, written `{namespace}local`.
///
/// The prefix is informational only and does not take part in equality.
#[derive(Debug, Clone, Default)]
pub struct QName {
    namespace: String,
    local_part: String,
    prefix: String,
}

impl QName {
    /// Creates a qualified name.
    pub fn new(namespace: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_part: local_part.into(),
            prefix: String::new(),
        }
    }

    /// Creates a qualified name with a prefix.
    pub fn with_prefix(
        namespace: impl Into<String>,
        local_part: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            local_part: local_part.into(),
            prefix: prefix.into(),
        }
    }

    /// Creates a name without a namespace.
    pub fn local(local_part: impl Into<String>) -> Self {
        Self::new(String::new(), local_part)
    }

    /// The namespace URI.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The local part.
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    /// The prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.local_part == other.local_part
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.local_part.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local_part)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_part)
        }
    }
}

impl FromStr for QName {
    type Err = QNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, local) = match s.strip_prefix('{') {
            Some(rest) => rest
                .split_once('}')
                .ok_or_else(|| QNameError::UnterminatedNamespace(s.to_string()))?,
            None => ("", s),
        };

        if local.is_empty() {
            return Err(QNameError::EmptyLocalPart(s.to_string()));
        }

        Ok(Self::new(namespace, local))
    }
}

impl Serialize for QName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
