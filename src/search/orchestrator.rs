//! Binds the two public search endpoints to the query builder, appends
//! the phrase-proximity and full-query boost bundles, attaches
//! highlighting, and best-effort records the request/response in
//! SearchHistory. Grounded on
//! `original_source/namex-solr-api/.../namex_search_helper.py` and
//! `.../resources/v1/search.py`.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use time::OffsetDateTime;

use crate::error::AppError;
use crate::models::query_params::{DocSide, FullQueryBoost, QueryField, QueryParams};
use crate::models::synonym::SynonymType;
use crate::models::{SearchHistory, SearchQueryInput};
use crate::normalize::{normalize_name_query, DashPolicy};
use crate::search::query_builder::{QueryBuilder, SynonymCatalog};
use crate::solr::SolrClient;
use crate::store::Store;

/// The parent-discriminator field used in `{!parent}`/`{!child}` join
/// prefixes. Kept as a single named constant rather than config: it's
/// an indexing-schema detail, not an operational knob (unlike, say,
/// `MAX_BATCH_UPDATE_NUM`).
pub const PARENT_DISCRIMINATOR_FIELD: &str = "parent_type";

const SENTINEL_PRE: &str = "|||";
const SENTINEL_POST: &str = "|||";

fn sentinel_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\|\|\|([^|]*)\|\|\|").unwrap())
}

/// Which root the search is rooted at, and the endpoint-specific
/// defaults that go with it.
pub struct EndpointConfig {
    pub is_child_search: bool,
    pub is_name_search: bool,
    pub default_categories: HashMap<String, Vec<String>>,
    pub forced_categories: HashMap<String, Vec<String>>,
    pub save_history: bool,
}

pub fn possible_conflict_names_config() -> EndpointConfig {
    EndpointConfig {
        is_child_search: true,
        is_name_search: true,
        default_categories: HashMap::from([
            ("state".to_string(), vec!["ACTIVE".to_string(), "APPROVED".to_string(), "CONDITION".to_string()]),
            ("name_state".to_string(), vec!["A".to_string(), "C".to_string(), "CORP".to_string()]),
        ]),
        forced_categories: HashMap::new(),
        save_history: true,
    }
}

pub fn nrs_config() -> EndpointConfig {
    EndpointConfig {
        is_child_search: false,
        is_name_search: false,
        default_categories: HashMap::new(),
        forced_categories: HashMap::from([("type".to_string(), vec!["NR".to_string()])]),
        save_history: false,
    }
}

fn base_name_fields() -> HashMap<QueryField, DocSide> {
    HashMap::from([
        (QueryField::NameQ, DocSide::Child),
        (QueryField::NameQExact, DocSide::Child),
        (QueryField::NameQSingle, DocSide::Child),
        (QueryField::NameQAgro, DocSide::Child),
    ])
}

fn base_boost_fields() -> HashMap<QueryField, u32> {
    HashMap::from([
        (QueryField::NameQExact, 3),
        (QueryField::NameQSingle, 2),
        (QueryField::NameQ, 5),
        (QueryField::NameQAgro, 3),
    ])
}

fn base_fuzzy_fields() -> HashMap<QueryField, (u8, u8)> {
    HashMap::from([(QueryField::NameQ, (5, 10)), (QueryField::NameQAgro, (5, 10))])
}

fn base_synonym_fields() -> HashMap<QueryField, SynonymType> {
    HashMap::from([(QueryField::NameQSyn, SynonymType::Name)])
}

/// The fixed name-search full-query boost bundle: exact/single/stem/
/// aggressive-stem boosts at the unchanged dash policy, plus — only
/// when the value carries a literal hyphen — four more `name_q`
/// boosts, one per dash policy (`remove`/`pad-with-spaces`/`tighten`/
/// `tighten-remove`), each re-normalized from `raw_value` under that
/// policy with boosts 3/7/7/3 and fuzzy 5.
fn name_search_full_query_boosts(
    normalized_value: &str,
    raw_value: &str,
    designations: &[String],
) -> Vec<FullQueryBoost> {
    let mut boosts = vec![
        FullQueryBoost { field: QueryField::NameQExact, value: normalized_value.to_string(), boost: 3, fuzzy: None },
        FullQueryBoost { field: QueryField::NameQSingle, value: normalized_value.to_string(), boost: 2, fuzzy: None },
        FullQueryBoost { field: QueryField::NameQ, value: normalized_value.to_string(), boost: 5, fuzzy: Some(5) },
        FullQueryBoost { field: QueryField::NameQAgro, value: normalized_value.to_string(), boost: 3, fuzzy: Some(10) },
    ];

    if normalized_value.contains('-') {
        for (policy, boost) in [
            (DashPolicy::Remove, 3),
            (DashPolicy::PadWithSpaces, 7),
            (DashPolicy::Tighten, 7),
            (DashPolicy::TightenRemove, 3),
        ] {
            let value = normalize_name_query(raw_value, designations, policy, true, true);
            boosts.push(FullQueryBoost { field: QueryField::NameQ, value, boost, fuzzy: Some(5) });
        }
    }

    boosts
}

/// Three phrase-proximity OR clauses (step 4 of §4.4), one per
/// backing analyzer, at fixed slop/boost: `name_q` (slop 5, boost 5),
/// `name_q_agro` (slop 10, boost 3), `name_q_syn` (slop 10, boost 2).
/// Only emitted for multi-token name searches.
fn proximity_clauses(normalized_value: &str) -> Option<String> {
    let token_count = normalized_value.split_whitespace().count();
    if token_count < 2 {
        return None;
    }
    Some(format!(
        "(({}:\"{}\"~5^5) OR ({}:\"{}\"~10^3) OR ({}:\"{}\"~10^2))",
        QueryField::NameQ.as_str(),
        normalized_value,
        QueryField::NameQAgro.as_str(),
        normalized_value,
        QueryField::NameQSyn.as_str(),
        normalized_value,
    ))
}

/// Map a caller-facing filter key (e.g. `corp_num`) onto the solr
/// field the query builder understands (e.g. `corp_num_q`).
fn resolve_filter_field(key: &str) -> String {
    match key {
        "corp_num" => QueryField::CorpNumQ.as_str().to_string(),
        "nr_num" => QueryField::NrNumQ.as_str().to_string(),
        "jurisdiction" => QueryField::Jurisdiction.as_str().to_string(),
        "type" => QueryField::Type.as_str().to_string(),
        "state" => QueryField::State.as_str().to_string(),
        "name_state" => QueryField::NameState.as_str().to_string(),
        other => other.to_string(),
    }
}

pub fn identifier_fields() -> HashSet<String> {
    [QueryField::CorpNumQ.as_str().to_string(), QueryField::NrNumQ.as_str().to_string()]
        .into_iter()
        .collect()
}

/// Result of compiling a search request: the engine-facing select
/// payload plus the normalized query string, kept separately so a
/// caller can log/audit the human-readable value without re-parsing
/// the Solr JSON.
pub struct CompiledSearch {
    pub select_payload: serde_json::Value,
    pub normalized_value: String,
    pub effective_categories: HashMap<String, Vec<String>>,
}

pub fn compile_search(
    builder: &QueryBuilder,
    catalog: &dyn SynonymCatalog,
    config: &EndpointConfig,
    designations: &[String],
    input: &SearchQueryInput,
    rows: u32,
    start: u32,
) -> Result<CompiledSearch, AppError> {
    let raw_value = input.value.clone().unwrap_or_default();
    let normalized_value = if config.is_name_search {
        normalize_name_query(&raw_value, designations, DashPolicy::Unchanged, true, true)
    } else {
        normalize_name_query(&raw_value, &[], DashPolicy::Unchanged, true, false)
    };

    let mut filters = HashMap::new();
    for (key, value) in &input.filters {
        let normalized = normalize_name_query(value, &[], DashPolicy::Unchanged, true, false);
        filters.insert(resolve_filter_field(key), normalized);
    }

    let mut categories = config.default_categories.clone();
    for (key, values) in &input.categories {
        categories.insert(key.clone(), values.clone());
    }
    for (key, values) in &config.forced_categories {
        categories.insert(key.clone(), values.clone());
    }

    let params = QueryParams {
        value: normalized_value.clone(),
        rows,
        start,
        categories: categories.clone(),
        filters,
        child_query: input.child_query.clone(),
        child_categories: input.child_categories.clone(),
        fields: base_name_fields(),
        boost_fields: base_boost_fields(),
        fuzzy_fields: base_fuzzy_fields(),
        synonym_fields: base_synonym_fields(),
        full_query_boosts: if config.is_name_search {
            name_search_full_query_boosts(&normalized_value, &raw_value, designations)
        } else {
            Vec::new()
        },
        highlighted_fields: if input.highlight { vec![QueryField::NameQStemHighlight] } else { Vec::new() },
        is_child_search: config.is_child_search,
    };

    let mut base_query = builder
        .build_base_query(catalog, &params)
        .map_err(|e| AppError::SearchEngine { message: e.to_string(), engine_unavailable: false })?;

    if config.is_name_search {
        if let Some(proximity) = proximity_clauses(&normalized_value) {
            base_query = format!("({base_query}) AND {proximity}");
        }
    }
    base_query = QueryBuilder::apply_full_query_boosts(&base_query, &params.full_query_boosts);

    let filter_clause = builder.build_filter_clause(&params.filters, params.is_child_search);
    let child_query = builder.build_child_query(&params.child_query, params.is_child_search);

    let mut facets = serde_json::Map::new();
    for (field, values) in &categories {
        facets.insert(field.clone(), builder.build_facet(field, false));
        let _ = values; // values drive the filter clause below, not the facet descriptor
    }
    for field in params.child_categories.keys() {
        facets.insert(field.clone(), builder.build_facet(field, true));
    }

    let mut category_filter = filter_clause.clone();
    for (field, values) in &categories {
        if values.is_empty() {
            continue;
        }
        let facet_filter = builder.build_facet_query(field, values, false, params.is_child_search);
        category_filter = QueryBuilder::join_clause(&category_filter, &facet_filter, "AND");
    }

    let mut payload = serde_json::json!({
        "query": base_query,
        "limit": rows,
        "offset": start,
        "facet": facets,
        "params": {
            "queries.parents": format!("{}:*", PARENT_DISCRIMINATOR_FIELD),
        },
    });

    if !category_filter.is_empty() {
        payload["filter"] = serde_json::Value::String(category_filter.clone());
        payload["params"]["queries.parentFilters"] = serde_json::Value::String(category_filter);
    }

    if let Some(child_clause) = child_query {
        payload["params"]["child_filter"] = serde_json::Value::String(child_clause);
    }

    if !params.highlighted_fields.is_empty() {
        payload["params"]["hl"] = serde_json::Value::Bool(true);
        payload["params"]["hl.tag.pre"] = serde_json::Value::String(SENTINEL_PRE.to_string());
        payload["params"]["hl.tag.post"] = serde_json::Value::String(SENTINEL_POST.to_string());
        payload["params"]["hl.fl"] = serde_json::Value::String(
            params.highlighted_fields.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(","),
        );
    }

    Ok(CompiledSearch { select_payload: payload, normalized_value, effective_categories: categories })
}

/// Regex-extract the sentinel-wrapped matched substrings out of a
/// Solr highlighting response fragment.
pub fn extract_highlighted_terms(fragment: &str) -> Vec<String> {
    sentinel_pattern()
        .captures_iter(fragment)
        .map(|c| c[1].to_string())
        .collect()
}

/// Run a search end to end: compile, call the engine, best-effort
/// record history.
pub async fn run_search(
    builder: &QueryBuilder,
    catalog: &dyn SynonymCatalog,
    engine: &SolrClient,
    store: &Store,
    config: &EndpointConfig,
    designations: &[String],
    submitter_id: Option<&str>,
    request_body: &serde_json::Value,
    input: &SearchQueryInput,
    rows: u32,
    start: u32,
) -> Result<(serde_json::Value, HashMap<String, Vec<String>>, String), AppError> {
    let compiled = compile_search(builder, catalog, config, designations, input, rows, start)?;

    let response = engine
        .select(&compiled.select_payload)
        .await
        .map_err(|e| AppError::SearchEngine { message: e.to_string(), engine_unavailable: false })?;

    if config.save_history {
        if let Err(err) = store.record_search_history(&SearchHistory {
            id: None,
            submitter_id: submitter_id.map(str::to_string),
            query: request_body.clone(),
            results: response.clone(),
            search_date: OffsetDateTime::now_utc(),
        }) {
            tracing::warn!(error = %err, "failed to record search history (best-effort, non-fatal)");
        }
    }

    Ok((response, compiled.effective_categories, compiled.normalized_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    struct EmptyCatalog;
    impl SynonymCatalog for EmptyCatalog {
        fn find_by_prefix(&self, _first_token: &str, _synonym_type: SynonymType) -> anyhow::Result<Vec<Vec<String>>> {
            Ok(vec![])
        }
    }

    fn builder() -> QueryBuilder {
        QueryBuilder::new(identifier_fields(), PARENT_DISCRIMINATOR_FIELD)
    }

    #[test]
    fn basic_search_includes_proximity_and_default_categories() {
        let input = SearchQueryInput {
            value: Some("acme holdings".to_string()),
            filters: Map::new(),
            categories: Map::new(),
            child_query: Map::new(),
            child_categories: Map::new(),
            highlight: false,
        };
        let config = possible_conflict_names_config();
        let compiled = compile_search(&builder(), &EmptyCatalog, &config, &[], &input, 25, 0).unwrap();

        let query = compiled.select_payload["query"].as_str().unwrap();
        assert!(query.contains("name_q:\"acme holdings\"~5^5"));
        assert!(query.contains("name_q_agro:\"acme holdings\"~10^3"));
        assert!(query.contains("name_q_syn:\"acme holdings\"~10^2"));
        assert_eq!(compiled.effective_categories["state"], vec!["ACTIVE", "APPROVED", "CONDITION"]);
        assert_eq!(compiled.effective_categories["name_state"], vec!["A", "C", "CORP"]);
    }

    #[test]
    fn nrs_search_forces_type_filter_and_has_no_full_query_boosts() {
        let input = SearchQueryInput {
            value: Some("acme".to_string()),
            filters: Map::new(),
            categories: Map::new(),
            child_query: Map::new(),
            child_categories: Map::new(),
            highlight: false,
        };
        let config = nrs_config();
        let compiled = compile_search(&builder(), &EmptyCatalog, &config, &[], &input, 25, 0).unwrap();

        assert_eq!(compiled.effective_categories["type"], vec!["NR"]);
        let query = compiled.select_payload["query"].as_str().unwrap();
        assert!(!query.contains("~5^5"), "nrs search should not carry the name full-query boost bundle");
    }

    #[test]
    fn identifier_filter_splits_corp_num_p3() {
        let mut filters = Map::new();
        filters.insert("corp_num".to_string(), "BC0012345".to_string());
        let input = SearchQueryInput {
            value: None,
            filters,
            categories: Map::new(),
            child_query: Map::new(),
            child_categories: Map::new(),
            highlight: false,
        };
        let config = possible_conflict_names_config();
        let compiled = compile_search(&builder(), &EmptyCatalog, &config, &[], &input, 25, 0).unwrap();
        let filter = compiled.select_payload["filter"].as_str().unwrap();
        assert!(filter.contains("(corp_num_q:\"0012345\" AND corp_num_q:\"BC\")"));
    }

    #[test]
    fn dash_in_value_adds_four_name_q_boosts_per_dash_policy() {
        let input = SearchQueryInput {
            value: Some("acme-co".to_string()),
            filters: Map::new(),
            categories: Map::new(),
            child_query: Map::new(),
            child_categories: Map::new(),
            highlight: false,
        };
        let config = possible_conflict_names_config();
        let compiled = compile_search(&builder(), &EmptyCatalog, &config, &[], &input, 25, 0).unwrap();
        let query = compiled.select_payload["query"].as_str().unwrap();

        // "acme-co" has no whitespace around its dash, so `remove` and
        // `tighten-remove` both collapse it to "acmeco" — same value,
        // same boost, two clauses.
        assert_eq!(
            query.matches("name_q:\"acmeco\"~5^3").count(),
            2,
            "remove + tighten-remove policy boosts missing: {query}"
        );
        assert!(
            query.contains("name_q:\"acme \\- co\"~5^7"),
            "pad-with-spaces policy boost missing: {query}"
        );
        assert_eq!(
            query.matches("name_q:\"acme-co\"~5^7").count(),
            1,
            "tighten policy boost missing: {query}"
        );
        assert!(
            !query.contains("name_q_exact:\"acmeco\""),
            "dash-variant boosts must stay on name_q only, not spread across the base fields"
        );
    }

    #[test]
    fn extracts_sentinel_wrapped_highlight_terms() {
        let fragment = "the |||acme||| company";
        assert_eq!(extract_highlighted_terms(fragment), vec!["acme".to_string()]);
    }
}
