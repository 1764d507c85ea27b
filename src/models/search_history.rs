//! Append-only search audit trail.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHistory {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitter_id: Option<String>,
    pub query: serde_json::Value,
    pub results: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub search_date: OffsetDateTime,
}
