use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};

/// Stable handle the messaging platform assigns to a user.
///
/// Stored and compared as a string. Records written by other systems may carry
/// the identity as a JSON number, so deserialization accepts both shapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.len() == raw.len() {
            Self(raw)
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for Identity {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIdentity {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawIdentity::deserialize(deserializer)? {
            RawIdentity::Text(raw) => Self::new(raw),
            RawIdentity::Signed(raw) => Self::from(raw),
            RawIdentity::Unsigned(raw) => Self::from(raw),
        })
    }
}
