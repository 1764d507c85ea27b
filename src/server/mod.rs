//! HTTP surface: a plain `Router` builder, a `run`/
//! `serve_with_listener` split so tests can bind an ephemeral port,
//! and handlers that delegate to the core engine and translate errors
//! through a single `IntoResponse` impl ([`crate::error::AppError`]).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::error::AppError;
use crate::models::domain::{PossibleConflict, SourceType};
use crate::models::synonym::SynonymType;
use crate::models::user::{Role, User};
use crate::models::{
    HeartbeatResponse, QueryInfo, ResyncRequestBody, ResyncResponse, SearchRequestBody, SearchResponseBody,
    SearchResultsInfo, SyncResponse, SynonymUpdateRequestBody, SynonymUpdateResponse, UpdateAcceptedResponse,
    UpdateRequestBody,
};
use crate::search::orchestrator::{self, nrs_config, possible_conflict_names_config, EndpointConfig};
use crate::search::query_builder::{QueryBuilder, SynonymCatalog};
use crate::solr::SolrClient;
use crate::store::Store;
use crate::sync::{self, ResyncScope};
use crate::{auth, heartbeat, reindex};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub engine: Arc<SolrClient>,
    pub query_builder: Arc<QueryBuilder>,
    pub config: Arc<Config>,
    pub verifier: Arc<dyn TokenVerifier>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/search/possible-conflict-names", post(search_possible_conflict_names))
        .route("/search/nrs", post(search_nrs))
        .route("/update", put(update))
        .route("/update/resync", post(update_resync))
        .route("/update/sync", get(update_sync))
        .route("/update/sync/heartbeat", get(update_sync_heartbeat))
        .route("/update/synonyms", put(update_synonyms))
        .route("/update/synonyms/resync-all", get(update_synonyms_resync_all))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn run(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_listener(listener, state).await
}

pub async fn serve_with_listener(listener: TcpListener, state: AppState) -> Result<()> {
    let app = router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Authorization("missing bearer token".to_string()))
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let token = bearer_token(headers)?;
    state.verifier.verify(token)
}

fn authorize_system(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let user = authenticate(state, headers)?;
    if !auth::has_role(&user, Role::System, &state.config) {
        return Err(AppError::Authorization("system role required".to_string()));
    }
    Ok(user)
}

struct StoreSynonymCatalog<'a>(&'a Store);
impl SynonymCatalog for StoreSynonymCatalog<'_> {
    fn find_by_prefix(&self, first_token: &str, synonym_type: SynonymType) -> anyhow::Result<Vec<Vec<String>>> {
        self.0.find_by_prefix(first_token, synonym_type)
    }
}

async fn run_search_endpoint(
    state: &AppState,
    submitter_id: Option<&str>,
    config: &EndpointConfig,
    body: SearchRequestBody,
) -> Result<Json<SearchResponseBody>, AppError> {
    let rows = body.rows.unwrap_or(25);
    let start = body.start.unwrap_or(0);
    let request_body = serde_json::json!({
        "value": body.query.value,
        "filters": body.query.filters,
        "categories": body.query.categories,
        "rows": rows,
        "start": start,
    });
    let catalog = StoreSynonymCatalog(&state.store);

    let (response, categories, normalized_value) = orchestrator::run_search(
        &state.query_builder,
        &catalog,
        &state.engine,
        &state.store,
        config,
        &state.config.designations,
        submitter_id,
        &request_body,
        &body.query,
        rows,
        start,
    )
    .await?;

    let total_results = response
        .get("response")
        .and_then(|r| r.get("numFound"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    Ok(Json(SearchResponseBody {
        search_results: SearchResultsInfo {
            query_info: QueryInfo { categories, query: normalized_value, rows, start },
        },
        total_results,
        results: response,
    }))
}

async fn search_possible_conflict_names(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SearchRequestBody>,
) -> Result<Json<SearchResponseBody>, AppError> {
    let user = authenticate(&state, &headers)?;
    let config = possible_conflict_names_config();
    run_search_endpoint(&state, Some(&user.unique_user_key), &config, body).await
}

async fn search_nrs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SearchRequestBody>,
) -> Result<Json<SearchResponseBody>, AppError> {
    let user = authenticate(&state, &headers)?;
    let config = nrs_config();
    run_search_endpoint(&state, Some(&user.unique_user_key), &config, body).await
}

/// Parses the request body into a [`PossibleConflict`], re-validating
/// invariant I1 the same way [`PossibleConflict::new`] does (the
/// `Deserialize` derive alone can't enforce a cross-field invariant)
/// and then re-denormalizing its children (I2).
fn parse_possible_conflict(raw: serde_json::Value) -> Result<PossibleConflict, AppError> {
    let mut conflict: PossibleConflict = serde_json::from_value(raw)
        .map_err(|e| AppError::Validation(format!("invalid possible-conflict document: {e}")))?;

    let identity_ok = match (conflict.source_type, &conflict.nr_num, &conflict.corp_num) {
        (SourceType::Nr, Some(_), None) => true,
        (SourceType::Corp, None, Some(_)) => true,
        _ => false,
    };
    if !identity_ok {
        return Err(AppError::Validation(
            "possible conflict must set exactly one of nr_num/corp_num matching its type".to_string(),
        ));
    }

    conflict.denormalize();
    Ok(conflict)
}

async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateRequestBody>,
) -> Result<(StatusCode, Json<UpdateAcceptedResponse>), AppError> {
    let user = authorize_system(&state, &headers)?;
    let conflict = parse_possible_conflict(body.conflict)?;
    let entity_id = conflict.id().to_string();
    let doc = serde_json::to_value(&conflict).map_err(|e| AppError::Validation(e.to_string()))?;

    let (_, event_id) = state.store.insert_solr_doc(&entity_id, Some(&user.unique_user_key), &doc)?;

    Ok((StatusCode::ACCEPTED, Json(UpdateAcceptedResponse { entity_id, event_id })))
}

async fn update_resync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ResyncRequestBody>,
) -> Result<(StatusCode, Json<ResyncResponse>), AppError> {
    authorize_system(&state, &headers)?;

    let scope = match (body.minutes_offset, body.identifiers) {
        (Some(minutes), None) => ResyncScope::MinutesOffset(minutes),
        (None, Some(ids)) => ResyncScope::Identifiers(ids),
        _ => {
            return Err(AppError::Validation(
                "resync requires exactly one of minutesOffset or identifiers".to_string(),
            ))
        }
    };

    let identifiers = match &scope {
        ResyncScope::Identifiers(ids) => ids.clone(),
        ResyncScope::MinutesOffset(_) => Vec::new(),
    };

    sync::run_resync(&state.store, &state.engine, scope).await?;

    Ok((StatusCode::CREATED, Json(ResyncResponse { identifiers })))
}

async fn update_sync(State(state): State<AppState>) -> Result<Json<SyncResponse>, AppError> {
    let summary = sync::run_sync(&state.store, &state.engine, state.config.max_batch_update_num).await?;
    Ok(Json(SyncResponse { drained: summary.events_drained, entity_ids: Vec::new() }))
}

async fn update_sync_heartbeat(State(state): State<AppState>) -> Result<Json<HeartbeatResponse>, AppError> {
    let result =
        heartbeat::run_heartbeat(&state.store, &state.engine, state.config.last_replication_threshold_hours).await?;

    let response = match result {
        heartbeat::HeartbeatResult::Healthy => HeartbeatResponse { healthy: true, detail: None },
        heartbeat::HeartbeatResult::Skipped { reason } => HeartbeatResponse { healthy: true, detail: Some(reason) },
        heartbeat::HeartbeatResult::Failed { reason } => HeartbeatResponse { healthy: false, detail: Some(reason) },
    };
    Ok(Json(response))
}

async fn update_synonyms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SynonymUpdateRequestBody>,
) -> Result<Json<SynonymUpdateResponse>, AppError> {
    authorize_system(&state, &headers)?;

    let mut updated_keys = Vec::new();
    for (type_key, pairs) in &body {
        if !state.config.synonym_request_type_allowlist.contains(type_key) {
            return Err(AppError::Validation(format!(
                "synonym type '{type_key}' is not in the recognized allowlist"
            )));
        }
        let synonym_type = SynonymType::parse(type_key)
            .ok_or_else(|| AppError::Validation(format!("unrecognized synonym type '{type_key}'")))?;

        let touched = state.store.create_or_replace_all(pairs, synonym_type)?;
        updated_keys.extend(touched);

        state
            .engine
            .create_or_update_synonyms(synonym_type.as_str(), pairs)
            .await
            .map_err(|e| AppError::SearchEngine { message: e.to_string(), engine_unavailable: false })?;
    }

    state
        .engine
        .reload_core()
        .await
        .map_err(|e| AppError::SearchEngine { message: e.to_string(), engine_unavailable: false })?;

    Ok(Json(SynonymUpdateResponse { updated_keys }))
}

async fn update_synonyms_resync_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SynonymUpdateResponse>, AppError> {
    authorize_system(&state, &headers)?;

    let mut updated_keys = Vec::new();
    for synonym_type in [SynonymType::Name, SynonymType::Address] {
        let all: HashMap<String, Vec<String>> = state.store.find_all(synonym_type)?;
        if all.is_empty() {
            continue;
        }
        updated_keys.extend(all.keys().cloned());

        state
            .engine
            .create_or_update_synonyms(synonym_type.as_str(), &all)
            .await
            .map_err(|e| AppError::SearchEngine { message: e.to_string(), engine_unavailable: false })?;
    }

    state
        .engine
        .reload_core()
        .await
        .map_err(|e| AppError::SearchEngine { message: e.to_string(), engine_unavailable: false })?;

    Ok(Json(SynonymUpdateResponse { updated_keys }))
}

/// Trigger a full reindex: prep phases, hand off to the external
/// importer is out of band, then the caller invokes [`reindex_post`]
/// (not wired as an HTTP route — invoked by the importer's own
/// completion hook).
pub async fn trigger_reindex_prep(state: &AppState) -> Result<(), AppError> {
    reindex::reindex_prep(&state.engine, &reindex::TokioSleeper, state.config.has_follower).await
}

pub async fn trigger_reindex_post(state: &AppState) -> Result<(), AppError> {
    reindex::reindex_post(&state.engine, &reindex::TokioSleeper, state.config.has_follower).await
}

pub async fn trigger_reindex_recovery(state: &AppState) -> Result<(), AppError> {
    reindex::reindex_recovery(&state.engine, &reindex::TokioSleeper, state.config.has_follower).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenVerifier;

    struct FakeVerifier {
        user: User,
        reject: bool,
    }

    impl TokenVerifier for FakeVerifier {
        fn verify(&self, _token: &str) -> Result<User, AppError> {
            if self.reject {
                Err(AppError::Authorization("invalid token".to_string()))
            } else {
                Ok(self.user.clone())
            }
        }
    }

    fn system_user() -> User {
        User {
            username: "svc".to_string(),
            firstname: String::new(),
            lastname: String::new(),
            email: None,
            login_source: "system".to_string(),
            sub: "svc-account".to_string(),
            iss: "issuer".to_string(),
            unique_user_key: "svc-key".to_string(),
        }
    }

    fn test_state() -> AppState {
        use clap::Parser;
        let mut config = Config::parse_from(["conflict-search"]);
        config.svc_acc_client_id = "svc-account".to_string();

        AppState {
            store: Store::open_in_memory().unwrap(),
            engine: Arc::new(SolrClient::new("http://127.0.0.1:1/solr", None, std::time::Duration::from_millis(50)).unwrap()),
            query_builder: Arc::new(QueryBuilder::new(orchestrator::identifier_fields(), orchestrator::PARENT_DISCRIMINATOR_FIELD)),
            config: Arc::new(config),
            verifier: Arc::new(FakeVerifier { user: system_user(), reject: false }),
        }
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let Json(response) = health().await;
        assert_eq!(response.status, "ok");
    }

    #[tokio::test]
    async fn update_without_bearer_token_is_unauthorized() {
        let state = test_state();
        let headers = HeaderMap::new();
        let body = UpdateRequestBody { conflict: serde_json::json!({}) };

        let err = update(State(state), headers, Json(body)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn update_rejects_conflict_missing_identity_fields() {
        let state = test_state();
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer anything".parse().unwrap());

        let body = UpdateRequestBody {
            conflict: serde_json::json!({
                "type": "NR",
                "jurisdiction": "BC",
                "state": "APPROVED",
                "start_date": "2023-11-14T22:13:20Z",
                "names": [],
            }),
        };

        let err = update(State(state), headers, Json(body)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_accepts_valid_conflict_and_enqueues_event() {
        let state = test_state();
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer anything".parse().unwrap());

        let body = UpdateRequestBody {
            conflict: serde_json::json!({
                "nr_num": "NR1234567",
                "type": "NR",
                "jurisdiction": "BC",
                "state": "APPROVED",
                "start_date": "2023-11-14T22:13:20Z",
                "names": [{"name": "Acme Holdings", "name_state": "A", "submit_count": 0}],
            }),
        };

        let (status, Json(response)) = update(State(state), headers, Json(body)).await.unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(response.entity_id, "NR1234567");
    }

    #[tokio::test]
    async fn update_sync_heartbeat_skips_with_empty_store() {
        let state = test_state();
        let Json(response) = update_sync_heartbeat(State(state)).await.unwrap();
        assert!(response.healthy);
    }
}
