use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of routing labels. `Unrelated` is the catch-all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Billing,
    Product,
    Technical,
    Unrelated,
}

impl Category {
    pub const ALL: [Category; 4] =
        [Category::Billing, Category::Product, Category::Technical, Category::Unrelated];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Billing => "billing",
            Self::Product => "product",
            Self::Technical => "technical",
            Self::Unrelated => "unrelated",
        }
    }

    /// Lenient parse used on model output; anything unknown lands in the catch-all.
    pub fn parse_or_unrelated(value: &str) -> Self {
        let cleaned = value
            .trim()
            .trim_matches(|character: char| !character.is_ascii_alphanumeric())
            .to_ascii_lowercase();
        cleaned.parse().unwrap_or(Self::Unrelated)
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "billing" => Ok(Self::Billing),
            "product" => Ok(Self::Product),
            "technical" => Ok(Self::Technical),
            "unrelated" | "other" => Ok(Self::Unrelated),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown category `{0}`")]
pub struct UnknownCategory(pub String);
