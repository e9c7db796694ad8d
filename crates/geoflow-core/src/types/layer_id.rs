//! Layer identifiers.
//!
//! Two shapes share one type: permanent store keys (`Layer 3`) and the
//! provisional `Result_N` names an action's output goes by until it
//! materializes.

use serde::{Deserialize, Serialize};
use std::fmt;

const PLACEHOLDER_PREFIX: &str = "Result_";
const LAYER_PREFIX: &str = "Layer ";

/// Strongly-typed layer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Permanent store identifier, e.g. `Layer 2`.
    pub fn numbered(index: usize) -> Self {
        Self(format!("{}{}", LAYER_PREFIX, index))
    }

    /// Placeholder for a not-yet-computed result, e.g. `Result_1`.
    pub fn placeholder(index: usize) -> Self {
        Self(format!("{}{}", PLACEHOLDER_PREFIX, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_placeholder(&self) -> bool {
        placeholder_index(&self.0).is_some()
    }
}

/// Numeric part of a `Result_N` placeholder, `None` for anything else.
pub fn placeholder_index(value: &str) -> Option<usize> {
    let digits = value.strip_prefix(PLACEHOLDER_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl From<String> for LayerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&LayerId> for LayerId {
    fn from(value: &LayerId) -> Self {
        value.clone()
    }
}

impl From<LayerId> for String {
    fn from(value: LayerId) -> Self {
        value.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for LayerId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::borrow::Borrow<str> for LayerId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<&str> for LayerId {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
