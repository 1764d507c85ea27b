//! JSON DTOs for the HTTP surface (§6). These are deliberately
//! permissive/flat — the Search Orchestrator is responsible for
//! turning them into the richer internal `QueryParams`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Body of `POST /search/possible-conflict-names` and `POST /search/nrs`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequestBody {
    pub query: SearchQueryInput,
    #[serde(default)]
    pub rows: Option<u32>,
    #[serde(default)]
    pub start: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQueryInput {
    #[serde(default)]
    pub value: Option<String>,
    /// Per-field free-text filters, e.g. `{"corp_num": "BC0012345"}`.
    #[serde(default)]
    pub filters: HashMap<String, String>,
    /// Facet category overrides, e.g. `{"state": ["ACTIVE"]}`. Unset
    /// categories fall back to the endpoint's configured defaults.
    #[serde(default)]
    pub categories: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub child_query: HashMap<String, String>,
    #[serde(default)]
    pub child_categories: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub highlight: bool,
}

/// Response envelope for both search endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponseBody {
    pub search_results: SearchResultsInfo,
    pub total_results: u64,
    pub results: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultsInfo {
    pub query_info: QueryInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryInfo {
    pub categories: HashMap<String, Vec<String>>,
    pub query: String,
    pub rows: u32,
    pub start: u32,
}

/// Body of `PUT /update`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequestBody {
    #[serde(flatten)]
    pub conflict: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateAcceptedResponse {
    pub entity_id: String,
    pub event_id: i64,
}

/// Body of `POST /update/resync`: `{minutesOffset?, identifiers?}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncRequestBody {
    #[serde(default)]
    pub minutes_offset: Option<i64>,
    #[serde(default)]
    pub identifiers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResyncResponse {
    pub identifiers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    pub drained: usize,
    pub entity_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatResponse {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Body of `PUT /update/synonyms`: `{TYPE: {key: [alts, ...]}}`.
pub type SynonymUpdateRequestBody = HashMap<String, HashMap<String, Vec<String>>>;

#[derive(Debug, Clone, Serialize)]
pub struct SynonymUpdateResponse {
    pub updated_keys: Vec<String>,
}
