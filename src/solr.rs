//! Async HTTP client for the Solr-family engine.
//!
//! Grounded on the `cli/http_backend.rs` base-url-plus-`post_json`
//! helper shape, translated from `reqwest::blocking` to
//! `reqwest::Client` since this service's request handlers are async
//! all the way down.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;

use crate::models::domain::PossibleConflict;

/// Bulk writes of at least this many docs route to `/update/bulk`
/// instead of `/update`.
const BULK_THRESHOLD: usize = 1000;

/// Commands accepted by the engine's `/replication` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationCommand {
    Backup,
    Restore,
    DisablePoll,
    EnablePoll,
    DisableReplication,
    EnableReplication,
    FetchIndex,
    Details,
    RestoreStatus,
}

impl ReplicationCommand {
    fn as_str(&self) -> &'static str {
        match self {
            ReplicationCommand::Backup => "backup",
            ReplicationCommand::Restore => "restore",
            ReplicationCommand::DisablePoll => "disablepoll",
            ReplicationCommand::EnablePoll => "enablepoll",
            ReplicationCommand::DisableReplication => "disablereplication",
            ReplicationCommand::EnableReplication => "enablereplication",
            ReplicationCommand::FetchIndex => "fetchindex",
            ReplicationCommand::Details => "details",
            ReplicationCommand::RestoreStatus => "restorestatus",
        }
    }
}

/// Which core (leader or follower) a replication command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Core {
    Leader,
    Follower,
}

/// Thin async wrapper around the engine's HTTP surface. One client per
/// core pair; both base URLs are carried so replication commands can
/// be aimed at leader or follower without constructing a second
/// client.
pub struct SolrClient {
    http: Client,
    leader_url: String,
    follower_url: Option<String>,
}

impl SolrClient {
    pub fn new(leader_url: impl Into<String>, follower_url: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Solr HTTP client")?;
        Ok(Self { http, leader_url: leader_url.into(), follower_url })
    }

    fn base_url(&self, core: Core) -> Result<&str> {
        match core {
            Core::Leader => Ok(&self.leader_url),
            Core::Follower => self
                .follower_url
                .as_deref()
                .context("no follower core configured"),
        }
    }

    fn url_for(&self, core: Core, path: &str) -> Result<String> {
        Ok(format!("{}/{}", self.base_url(core)?.trim_end_matches('/'), path.trim_start_matches('/')))
    }

    async fn post_json<T: Serialize>(&self, url: &str, body: &T) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to send request to {url}"))?
            .error_for_status()
            .with_context(|| format!("engine returned error for {url}"))?;

        response.json::<serde_json::Value>().await.context("failed to decode engine JSON response")
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to send request to {url}"))?
            .error_for_status()
            .with_context(|| format!("engine returned error for {url}"))?;

        response.json::<serde_json::Value>().await.context("failed to decode engine JSON response")
    }

    /// `POST /select` — run a compiled query, returning the raw
    /// response document (the orchestrator reshapes it downstream).
    pub async fn select(&self, payload: &serde_json::Value) -> Result<serde_json::Value> {
        let url = self.url_for(Core::Leader, "select")?;
        self.post_json(&url, payload).await
    }

    /// Push docs to the engine, auto-routing to the bulk endpoint at
    /// or above [`BULK_THRESHOLD`] docs.
    pub async fn update(&self, docs: &[PossibleConflict]) -> Result<()> {
        let path = if docs.len() >= BULK_THRESHOLD { "update/bulk" } else { "update" };
        let url = self.url_for(Core::Leader, path)?;
        self.post_json(&url, &docs).await?;
        Ok(())
    }

    /// Resync push: replaces each document's `names` collection
    /// wholesale rather than merging — the engine payload wraps
    /// `names` in `{"set": …}`.
    pub async fn update_set_names(&self, docs: &[PossibleConflict]) -> Result<()> {
        let payload: Vec<serde_json::Value> = docs
            .iter()
            .map(|doc| {
                let mut value = serde_json::to_value(doc).expect("PossibleConflict always serializes");
                value["names"] = serde_json::json!({ "set": doc.names });
                value
            })
            .collect();

        let path = if payload.len() >= BULK_THRESHOLD { "update/bulk" } else { "update" };
        let url = self.url_for(Core::Leader, path)?;
        self.post_json(&url, &payload).await?;
        Ok(())
    }

    /// Delete every document in the core (reindex prep, final phase).
    pub async fn delete_all_docs(&self) -> Result<()> {
        let url = self.url_for(Core::Leader, "update")?;
        self.post_json(&url, &serde_json::json!({ "delete": { "query": "*:*" } })).await?;
        Ok(())
    }

    /// `GET /replication?command=<cmd>` against the given core.
    pub async fn replication(&self, command: ReplicationCommand, core: Core) -> Result<serde_json::Value> {
        let base = self.url_for(core, "replication")?;
        let url = format!("{base}?command={}", command.as_str());
        self.get_json(&url).await
    }

    /// Push the synonym catalog to the engine's synonyms resource.
    pub async fn create_or_update_synonyms(
        &self,
        synonym_type: &str,
        entries: &std::collections::HashMap<String, Vec<String>>,
    ) -> Result<()> {
        let url = self.url_for(Core::Leader, &format!("schema/analysis/synonyms/{synonym_type}"))?;
        self.post_json(&url, entries).await?;
        Ok(())
    }

    /// `GET /admin/cores?action=RELOAD`.
    pub async fn reload_core(&self) -> Result<()> {
        let url = self.url_for(Core::Leader, "admin/cores?action=RELOAD")?;
        self.get_json(&url).await?;
        Ok(())
    }

    pub fn has_follower(&self) -> bool {
        self.follower_url.is_some()
    }
}
