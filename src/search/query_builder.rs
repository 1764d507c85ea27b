//! Compiles a search request into the engine's query string.
//!
//! Grounded on `original_source/namex-solr-api/.../utils/query_builder.py`'s
//! `QueryBuilder` class. The clause-assembly shape (string concatenation with
//! `join_clause`, rather than building an AST) is kept from the original on
//! purpose: the engine's query parser consumes a flat string, and an AST
//! layer here would just be translated back to a string with no behavioral
//! difference — working directly in the target representation rather than
//! through an intermediate nobody else needs.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

use crate::models::query_params::{DocSide, FullQueryBoost, QueryField, QueryParams};
use crate::models::synonym::SynonymType;

/// Looks up multi-word synonym expansions. Implemented by the store's
/// SQLite-backed catalog; kept as a trait so the builder (and its
/// tests) don't depend on a live database.
pub trait SynonymCatalog {
    fn find_by_prefix(&self, first_token: &str, synonym_type: SynonymType) -> Result<Vec<Vec<String>>>;
}

fn identifier_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z]+)(\d+)$").unwrap())
}

/// Stateless query compiler, configured once with which fields need
/// identifier-prefix splitting and the field used to discriminate
/// parent documents from children in join queries.
pub struct QueryBuilder {
    identifier_field_values: HashSet<String>,
    parent_discriminator_field: String,
}

impl QueryBuilder {
    pub fn new(identifier_field_values: HashSet<String>, parent_discriminator_field: impl Into<String>) -> Self {
        Self {
            identifier_field_values,
            parent_discriminator_field: parent_discriminator_field.into(),
        }
    }

    fn join_prefix(&self, is_child: bool, is_child_search: bool) -> String {
        if is_child && !is_child_search {
            format!("{{!parent which=\"{}:*\"}}", self.parent_discriminator_field)
        } else if !is_child && is_child_search {
            format!("{{!child of=\"{}:*\"}}", self.parent_discriminator_field)
        } else {
            String::new()
        }
    }

    /// The atomic building block: `field:term`, wrapped with a join
    /// prefix when the field's side differs from the search root, and
    /// split into `(field:"<numeric>" AND field:"<PREFIX>")` when
    /// `field` is an identifier field and `term` matches
    /// `^([A-Za-z]+)\d+$` (P3).
    pub fn create_clause(&self, field: &str, term: &str, is_child: bool, is_child_search: bool) -> String {
        let prefix = self.join_prefix(is_child, is_child_search);

        let body = if self.identifier_field_values.contains(field) {
            if let Some(caps) = identifier_pattern().captures(term) {
                let alpha = caps.get(1).unwrap().as_str().to_uppercase();
                let numeric = caps.get(2).unwrap().as_str();
                format!("({field}:\"{numeric}\" AND {field}:\"{alpha}\")")
            } else {
                format!("{field}:{term}")
            }
        } else {
            format!("{field}:{term}")
        };

        format!("{prefix}{body}")
    }

    /// Concatenate `new` onto `current` with a space-padded boolean
    /// operator, or return `new` unchanged if `current` is empty —
    /// keeps the leading term clean instead of emitting `" AND foo"`.
    pub fn join_clause(current: &str, new: &str, op: &str) -> String {
        if current.is_empty() {
            new.to_string()
        } else if new.is_empty() {
            current.to_string()
        } else {
            format!("{current} {op} {new}")
        }
    }

    /// `""` for terms under 4 chars, `"~short"` for 4..7, else `"~long"` (P4).
    pub fn get_fuzzy_str(term: &str, short: u8, long: u8) -> String {
        let len = term.chars().count();
        if len < 4 {
            String::new()
        } else if len < 7 {
            format!("~{short}")
        } else {
            format!("~{long}")
        }
    }

    /// Per-field accumulator for multi-word synonym continuation: a
    /// scan over terms carrying `(start_index, matched_key)` per
    /// field.
    fn find_synonym_clause(
        &self,
        catalog: &dyn SynonymCatalog,
        field: QueryField,
        synonym_type: SynonymType,
        terms: &[&str],
        index: usize,
        state: &mut HashMap<QueryField, (usize, usize, String)>,
    ) -> Result<Option<String>> {
        if let Some((start, len, clause)) = state.get(&field) {
            if index < start + len {
                return Ok(Some(clause.clone()));
            }
        }

        let candidates = catalog.find_by_prefix(terms[index], synonym_type)?;
        let remaining = terms.len() - index;

        let mut best: Option<Vec<String>> = None;
        for key_tokens in candidates {
            if key_tokens.is_empty() || key_tokens.len() > remaining {
                continue;
            }
            let matches = key_tokens
                .iter()
                .zip(&terms[index..index + key_tokens.len()])
                .all(|(k, t)| k.eq_ignore_ascii_case(t));
            if !matches {
                continue;
            }
            if best.as_ref().map(|b| key_tokens.len() > b.len()).unwrap_or(true) {
                best = Some(key_tokens);
            }
        }

        match best {
            Some(tokens) => {
                let clause = format!("{}:{}", field.as_str(), tokens.join(" "));
                state.insert(field, (index, tokens.len(), clause.clone()));
                Ok(Some(clause))
            }
            None => {
                state.remove(&field);
                Ok(None)
            }
        }
    }

    /// Compose the base term query: an AND of per-term OR-groups
    /// covering every queryable field, its boost, its fuzzy twin, and
    /// any synonym expansion.
    pub fn build_base_query(&self, catalog: &dyn SynonymCatalog, params: &QueryParams) -> Result<String> {
        let terms: Vec<&str> = params.value.split_whitespace().collect();
        let mut query = String::new();
        let mut synonym_state: HashMap<QueryField, (usize, usize, String)> = HashMap::new();

        for (index, term) in terms.iter().enumerate() {
            let mut term_clause = String::new();

            for (field, side) in &params.fields {
                let is_child = *side == DocSide::Child;
                let mut clause = self.create_clause(field.as_str(), term, is_child, params.is_child_search);

                if let Some(boost) = params.boost_fields.get(field) {
                    let boosted = format!("{clause}^{boost}");

                    if let Some((short, long)) = params.fuzzy_fields.get(field) {
                        let fuzzy = Self::get_fuzzy_str(term, *short, *long);
                        if !fuzzy.is_empty() {
                            let fuzzy_clause = format!("{clause}{fuzzy}");
                            term_clause = Self::join_clause(&term_clause, &fuzzy_clause, "OR");
                        }
                    }
                    clause = boosted;
                }

                term_clause = Self::join_clause(&term_clause, &clause, "OR");
            }

            for (field, synonym_type) in &params.synonym_fields {
                if let Some(clause) = self.find_synonym_clause(
                    catalog,
                    *field,
                    *synonym_type,
                    &terms,
                    index,
                    &mut synonym_state,
                )? {
                    term_clause = Self::join_clause(&term_clause, &clause, "OR");
                }
            }

            if !term_clause.is_empty() {
                query = Self::join_clause(&query, &format!("({term_clause})"), "AND");
            }
        }

        if query.is_empty() {
            query = "\"\"".to_string();
        }

        Ok(query)
    }

    /// One AND'd clause per whitespace-separated token of each
    /// non-empty filter value; filters are always parent-side fields.
    pub fn build_filter_clause(&self, filters: &HashMap<String, String>, is_child_search: bool) -> String {
        let mut clause = String::new();
        for (field, value) in filters {
            if value.trim().is_empty() {
                continue;
            }
            for token in value.split_whitespace() {
                let term_clause = self.create_clause(field, token, false, is_child_search);
                clause = Self::join_clause(&clause, &term_clause, "AND");
            }
        }
        clause
    }

    /// AND of per-token child-side clauses, parenthesized; `None` when
    /// no child criteria are set.
    pub fn build_child_query(&self, child_query: &HashMap<String, String>, is_child_search: bool) -> Option<String> {
        let mut clause = String::new();
        for (field, value) in child_query {
            if value.trim().is_empty() {
                continue;
            }
            for token in value.split_whitespace() {
                let term_clause = self.create_clause(field, token, true, is_child_search);
                clause = Self::join_clause(&clause, &term_clause, "AND");
            }
        }
        if clause.is_empty() {
            None
        } else {
            Some(format!("({clause})"))
        }
    }

    /// `field:("v1" OR "v2" ...)`, join-prefixed when `field`'s side
    /// differs from the search root.
    pub fn build_facet_query(&self, field: &str, values: &[String], is_child: bool, is_child_search: bool) -> String {
        let prefix = self.join_prefix(is_child, is_child_search);
        let inner = values
            .iter()
            .map(|v| format!("\"{v}\""))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("{prefix}{field}:({inner})")
    }

    /// Engine facet descriptor; nested facets add `domain.blockChildren`
    /// and a `uniqueBlock` sub-facet so counts are parent-unique.
    pub fn build_facet(&self, field: &str, is_nested: bool) -> serde_json::Value {
        if is_nested {
            serde_json::json!({
                "type": "terms",
                "field": field,
                "domain": { "blockChildren": format!("{}:*", self.parent_discriminator_field) },
                "facet": { "unique_parents": "uniqueBlock()" },
            })
        } else {
            serde_json::json!({ "type": "terms", "field": field })
        }
    }

    /// Append the full-query boost bundle: `OR (<field>:"<value>"[~<fuzzy>]^<boost>)` per entry.
    pub fn apply_full_query_boosts(base_query: &str, boosts: &[FullQueryBoost]) -> String {
        let mut query = base_query.to_string();
        for boost in boosts {
            let fuzzy = boost.fuzzy.map(|f| format!("~{f}")).unwrap_or_default();
            let clause = format!("({}:\"{}\"{}^{})", boost.field.as_str(), boost.value, fuzzy, boost.boost);
            query = Self::join_clause(&query, &clause, "OR");
        }
        query
    }
}
