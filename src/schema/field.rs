//! The closed set of searchable document fields.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QevalError;

/// A searchable text field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// Document body text (the default field).
    #[default]
    Body,
    /// Document title.
    Title,
    /// Tokenized URL.
    Url,
    /// Anchor text of links pointing at the document.
    Inlink,
    /// Meta keywords.
    Keywords,
}

impl Field {
    /// Every recognized field.
    pub const ALL: [Field; 5] = [
        Field::Body,
        Field::Title,
        Field::Url,
        Field::Inlink,
        Field::Keywords,
    ];

    /// Fields that carry per-field ranking features.
    pub const TEXT_FIELDS: [Field; 4] = [Field::Body, Field::Title, Field::Url, Field::Inlink];

    /// The field name as written in queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Body => "body",
            Field::Title => "title",
            Field::Url => "url",
            Field::Inlink => "inlink",
            Field::Keywords => "keywords",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = QevalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "body" => Ok(Field::Body),
            "title" => Ok(Field::Title),
            "url" => Ok(Field::Url),
            "inlink" => Ok(Field::Inlink),
            "keywords" => Ok(Field::Keywords),
            other => Err(QevalError::query_syntax(format!("unknown field '{other}'"))),
        }
    }
}
