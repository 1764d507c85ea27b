//! Drains staged UPDATE events into bulk engine writes, and the
//! separate resync path that force-pushes a wholesale `names`
//! replacement for an explicit set of entities.
//!
//! Grounded on
//! `original_source/namex-solr-api/.../resources/internal/solr/update/sync.py`
//! and `.../resync.py`.

use std::collections::HashSet;

use time::{Duration as TimeDuration, OffsetDateTime};

use crate::error::AppError;
use crate::models::domain::PossibleConflict;
use crate::models::{EventStatus, EventType};
use crate::solr::SolrClient;
use crate::store::Store;

/// Outcome of a drain: how many events were picked up and how many
/// distinct entities were pushed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncSummary {
    pub events_drained: usize,
    pub entities_pushed: usize,
}

fn doc_from_json(raw: &serde_json::Value) -> Result<PossibleConflict, AppError> {
    serde_json::from_value(raw.clone())
        .map_err(|e| AppError::Business { message: format!("staged document failed to parse: {e}"), status: axum::http::StatusCode::INTERNAL_SERVER_ERROR })
}

/// Drain up to `max_batch` PENDING/ERROR UPDATE events, resolve to the
/// latest SolrDoc per distinct entity_id, push in one bulk write, then
/// mark all drained events COMPLETE or ERROR together.
pub async fn run_sync(store: &Store, engine: &SolrClient, max_batch: usize) -> Result<SyncSummary, AppError> {
    let events = store.get_events_by_status(
        &[EventStatus::Pending, EventStatus::Error],
        Some(EventType::Update),
        None,
        Some(max_batch),
    )?;

    if events.is_empty() {
        return Ok(SyncSummary::default());
    }

    let mut entity_ids: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for event in &events {
        let Some(solr_doc) = store.get_solr_doc(event.solr_doc_id)? else {
            continue;
        };
        if seen.insert(solr_doc.entity_id.clone()) {
            entity_ids.push(solr_doc.entity_id);
        }
    }

    let mut docs = Vec::with_capacity(entity_ids.len());
    for entity_id in &entity_ids {
        if let Some(latest) = store.find_most_recent_by_entity_id(entity_id)? {
            docs.push(doc_from_json(&latest.doc)?);
        }
    }

    let event_ids: Vec<i64> = events.iter().map(|e| e.id).collect();

    match engine.update(&docs).await {
        Ok(()) => {
            store.update_events_status(EventStatus::Complete, &event_ids)?;
            Ok(SyncSummary { events_drained: events.len(), entities_pushed: docs.len() })
        }
        Err(err) => {
            store.update_events_status(EventStatus::Error, &event_ids)?;
            Err(AppError::SearchEngine { message: err.to_string(), engine_unavailable: false })
        }
    }
}

/// Operator-supplied resync scope: either a time window or an
/// explicit identifier list, mutually exclusive — callers are
/// expected to supply exactly one.
pub enum ResyncScope {
    MinutesOffset(i64),
    Identifiers(Vec<String>),
}

/// Resolve a resync scope to the distinct entity ids in play.
fn resolve_scope(store: &Store, scope: &ResyncScope) -> Result<Vec<String>, AppError> {
    match scope {
        ResyncScope::MinutesOffset(minutes) => {
            let cutoff = OffsetDateTime::now_utc() - TimeDuration::minutes(*minutes);
            Ok(store.get_updated_entity_ids_after_date(cutoff)?)
        }
        ResyncScope::Identifiers(ids) => Ok(ids.clone()),
    }
}

/// Push a wholesale `names` replacement (additive=false) for every
/// entity in `scope`, recording a fresh RESYNC event per touched
/// SolrDoc and marking all of them COMPLETE or ERROR together.
pub async fn run_resync(store: &Store, engine: &SolrClient, scope: ResyncScope) -> Result<SyncSummary, AppError> {
    let entity_ids = resolve_scope(store, &scope)?;

    let mut docs = Vec::with_capacity(entity_ids.len());
    let mut event_ids = Vec::with_capacity(entity_ids.len());

    for entity_id in &entity_ids {
        let Some(latest) = store.find_most_recent_by_entity_id(entity_id)? else {
            continue;
        };
        let event = store.create_resync_event(latest.id)?;
        event_ids.push(event.id);
        docs.push(doc_from_json(&latest.doc)?);
    }

    if docs.is_empty() {
        return Ok(SyncSummary::default());
    }

    match engine.update_set_names(&docs).await {
        Ok(()) => {
            store.update_events_status(EventStatus::Complete, &event_ids)?;
            Ok(SyncSummary { events_drained: event_ids.len(), entities_pushed: docs.len() })
        }
        Err(err) => {
            store.update_events_status(EventStatus::Error, &event_ids)?;
            Err(AppError::SearchEngine { message: err.to_string(), engine_unavailable: false })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_scope_identifiers_passes_through_unchanged() {
        let store = Store::open_in_memory().unwrap();
        let scope = ResyncScope::Identifiers(vec!["NR1".to_string(), "NR2".to_string()]);
        let ids = resolve_scope(&store, &scope).unwrap();
        assert_eq!(ids, vec!["NR1".to_string(), "NR2".to_string()]);
    }

    #[test]
    fn resolve_scope_minutes_offset_queries_store() {
        let store = Store::open_in_memory().unwrap();
        store.insert_solr_doc("NR1", None, &serde_json::json!({})).unwrap();
        let scope = ResyncScope::MinutesOffset(60);
        let ids = resolve_scope(&store, &scope).unwrap();
        assert_eq!(ids, vec!["NR1".to_string()]);
    }

    #[tokio::test]
    async fn run_sync_with_no_pending_events_is_a_noop() {
        let store = Store::open_in_memory().unwrap();
        let engine = SolrClient::new("http://localhost:1/solr", None, std::time::Duration::from_secs(1)).unwrap();
        let summary = run_sync(&store, &engine, 10).await.unwrap();
        assert_eq!(summary.events_drained, 0);
        assert_eq!(summary.entities_pushed, 0);
    }
}
