use std::fmt;

use serde::{Deserialize, Serialize};

/// Free-form caller text. Immutable once received.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Utterance(String);

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Lowercased text with runs of whitespace collapsed to a single space.
    pub fn normalized(&self) -> String {
        normalize_text(&self.0)
    }

    /// Lowercased text with every whitespace character removed.
    pub fn compact(&self) -> String {
        compact_text(&self.0)
    }
}

impl From<&str> for Utterance {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Utterance {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

pub fn compact_text(text: &str) -> String {
    text.chars().filter(|character| !character.is_whitespace()).flat_map(char::to_lowercase).collect()
}
