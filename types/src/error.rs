//! Validation error values.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::FieldName;

/// Error reported by a validator for a single field.
///
/// Validators may report one message or a (possibly nested) list of them.
/// [`FieldError::messages`] is the normalized, display-ready view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldError {
    Message(String),
    List(Vec<FieldError>),
}

impl FieldError {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Flattened messages with empty entries dropped.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_messages(&mut out);
        out
    }

    fn collect_messages(&self, out: &mut Vec<String>) {
        match self {
            Self::Message(message) => {
                if !message.trim().is_empty() {
                    out.push(message.clone());
                }
            }
            Self::List(items) => {
                for item in items {
                    item.collect_messages(out);
                }
            }
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages = self.messages();
        if messages.is_empty() {
            f.write_str("invalid value")
        } else {
            f.write_str(&messages.join("; "))
        }
    }
}

impl Error for FieldError {}

impl From<&str> for FieldError {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<String> for FieldError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl<T: Into<FieldError>> From<Vec<T>> for FieldError {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

/// Per-field errors collected while validating a whole form.
pub type ValidationErrors = BTreeMap<FieldName, FieldError>;
