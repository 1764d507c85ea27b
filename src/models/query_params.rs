//! Internal request shape consumed by the query builder.
//!
//! `QueryParams` is assembled by the Search Orchestrator from the
//! caller's request body plus per-endpoint static configuration
//! (which fields are searchable, which are boosted/fuzzy/synonym
//! capable) — it is never deserialized directly from an HTTP body.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::synonym::SynonymType;

/// Query-able fields on the possible-conflict nested document.
///
/// Several analyzer variants exist per logical field: `NameQ*` fields
/// differ only in which Solr text analyzer built them, not in what
/// they conceptually mean.
// TODO: confirm the full canonical NAME_STATE/CORP state code list with
// the registry team before this enumeration grows past what's needed
// for query-field selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryField {
    NameQ,
    NameQExact,
    NameQSingle,
    NameQAgro,
    NameQStemHighlight,
    NameQSyn,
    CorpNumQ,
    NrNumQ,
    Jurisdiction,
    Type,
    State,
    NameState,
    Id,
}

impl QueryField {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryField::NameQ => "name_q",
            QueryField::NameQExact => "name_q_exact",
            QueryField::NameQSingle => "name_q_single",
            QueryField::NameQAgro => "name_q_agro",
            QueryField::NameQStemHighlight => "name_q_stem_highlight",
            QueryField::NameQSyn => "name_q_syn",
            QueryField::CorpNumQ => "corp_num_q",
            QueryField::NrNumQ => "nr_num_q",
            QueryField::Jurisdiction => "jurisdiction",
            QueryField::Type => "type",
            QueryField::State => "state",
            QueryField::NameState => "name_state",
            QueryField::Id => "id",
        }
    }
}

impl std::fmt::Display for QueryField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the parent/child join a field lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocSide {
    Parent,
    Child,
}

/// One entry of the "full query boost" bundle: `OR
/// (<field>:"<value>"[~<fuzzy>]^<boost>)` appended verbatim to the
/// assembled base query.
#[derive(Debug, Clone)]
pub struct FullQueryBoost {
    pub field: QueryField,
    pub value: String,
    pub boost: u32,
    pub fuzzy: Option<u32>,
}

/// Fully assembled query request passed to the query builder.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub value: String,
    pub rows: u32,
    pub start: u32,
    /// Parent-side facet filters (field -> accepted values), AND'd
    /// together as `build_facet_query` clauses.
    pub categories: HashMap<String, Vec<String>>,
    /// Free-text per-field filters on the parent side.
    pub filters: HashMap<String, String>,
    /// Free-text per-field filters on the child side.
    pub child_query: HashMap<String, String>,
    /// Child-side facet filters.
    pub child_categories: HashMap<String, Vec<String>>,
    /// Which fields participate in the base term query, and which
    /// side of the join they live on.
    pub fields: HashMap<QueryField, DocSide>,
    pub boost_fields: HashMap<QueryField, u32>,
    /// (short, long) edit-distance thresholds per fuzzy-eligible field.
    pub fuzzy_fields: HashMap<QueryField, (u8, u8)>,
    pub synonym_fields: HashMap<QueryField, SynonymType>,
    pub full_query_boosts: Vec<FullQueryBoost>,
    pub highlighted_fields: Vec<QueryField>,
    pub is_child_search: bool,
}
