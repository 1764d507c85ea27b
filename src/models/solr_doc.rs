//! The staging store's two row types: `SolrDoc` (a durable upsert
//! record) and `SolrDocEvent` (its status transitions). Grounded on
//! `original_source/namex-solr-api/.../models/solr_doc_event.py`.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Update,
    Resync,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Update => "UPDATE",
            EventType::Resync => "RESYNC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "UPDATE" => Some(EventType::Update),
            "RESYNC" => Some(EventType::Resync),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Pending,
    Complete,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "PENDING",
            EventStatus::Complete => "COMPLETE",
            EventStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(EventStatus::Pending),
            "COMPLETE" => Some(EventStatus::Complete),
            "ERROR" => Some(EventStatus::Error),
            _ => None,
        }
    }
}

/// A durable staging row: one submitted document payload. Invariant
/// I3: for a given `entity_id`, the row with the latest `created_date`
/// (ties broken by `id`) is the ground truth fed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolrDoc {
    pub id: i64,
    pub entity_id: String,
    pub submitter_id: Option<String>,
    pub doc: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
}

/// One status transition for a [`SolrDoc`]. Invariant I4: every
/// `SolrDoc` has at least one event; events move
/// PENDING -> {COMPLETE, ERROR} and are only re-driven to PENDING by a
/// fresh RESYNC event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolrDocEvent {
    pub id: i64,
    pub solr_doc_id: i64,
    pub event_type: EventType,
    pub status: EventStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub event_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub event_last_update: OffsetDateTime,
}
