//! The synonym catalog's stored shape.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Category of synonym list. Address synonyms expand jurisdiction and
/// street-type abbreviations; name synonyms expand business-name
/// vocabulary (e.g. "bc" <-> "british columbia").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SynonymType {
    Name,
    Address,
}

impl SynonymType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynonymType::Name => "NAME",
            SynonymType::Address => "ADDRESS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NAME" => Some(SynonymType::Name),
            "ADDRESS" => Some(SynonymType::Address),
            _ => None,
        }
    }
}

/// One stored `(synonym_type, key)` -> expansion-list row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynonymEntry {
    pub synonym_type: SynonymType,
    /// Lowercased, whitespace-normalized key (invariant I5). May span
    /// multiple tokens, e.g. "british columbia".
    pub synonym: String,
    pub synonym_list: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_update_date: OffsetDateTime,
}
