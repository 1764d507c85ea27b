//! The six-phase backup/disable/swap/re-enable protocol that keeps
//! the engine readable during a full reindex, plus recovery on
//! importer failure.
//!
//! Grounded on
//! `original_source/namex-solr-importer/.../utils/reindex.py`, with a
//! key-path/command-name inconsistency on the recovery branch of the
//! original resolved here: `restorestatus.status` is read the same
//! way on both branches, and the command issued is always
//! `enablepoll`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use time::OffsetDateTime;

use crate::error::AppError;
use crate::solr::{Core, ReplicationCommand, SolrClient};

/// Abstracts "wait this long" so the 30s/60s/10s production delays
/// don't have to run in unit tests. No `async_trait` dependency is
/// needed for a single method returning a boxed future.
pub trait Sleeper: Send + Sync {
    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

pub struct TokioSleeper;
impl Sleeper for TokioSleeper {
    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Sleeps instantly. Used by tests to run the full retry/backoff shape
/// of the protocol without the real wall-clock delays.
pub struct NoopSleeper;
impl Sleeper for NoopSleeper {
    fn sleep<'a>(&'a self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

fn fatal(message: impl Into<String>) -> AppError {
    AppError::SearchEngine { message: message.into(), engine_unavailable: false }
}

fn status_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Phase 4: poll `replication(details, leader)` up to 20 times with
/// delay `30 + 2*i` seconds. Success iff `status=="success"` and
/// `startTime > trigger_time`.
async fn verify_backup(
    engine: &SolrClient,
    sleeper: &dyn Sleeper,
    trigger_time: OffsetDateTime,
) -> Result<(), AppError> {
    for i in 0..20u32 {
        sleeper.sleep(Duration::from_secs(30 + 2 * i as u64)).await;

        let details = engine
            .replication(ReplicationCommand::Details, Core::Leader)
            .await
            .map_err(|e| fatal(e.to_string()))?;

        let status = status_str(&details, "status");
        let start_time = details
            .get("startTime")
            .and_then(|v| v.as_str())
            .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok());

        if status.as_deref() == Some("success") {
            if let Some(start_time) = start_time {
                if start_time > trigger_time {
                    return Ok(());
                }
            }
        }
    }
    Err(fatal("backup verification did not succeed after 20 attempts"))
}

/// Phases 1-6: prepare the engine for a full reindex. Returns once the
/// existing docs have been deleted; the caller hands off to the
/// external importer next.
pub async fn reindex_prep(
    engine: &SolrClient,
    sleeper: &dyn Sleeper,
    has_follower: bool,
) -> Result<(), AppError> {
    let trigger_time = OffsetDateTime::now_utc();
    engine
        .replication(ReplicationCommand::Backup, Core::Leader)
        .await
        .map_err(|e| fatal(e.to_string()))?;

    if has_follower {
        engine
            .replication(ReplicationCommand::DisablePoll, Core::Follower)
            .await
            .map_err(|e| fatal(e.to_string()))?;
    }

    sleeper.sleep(Duration::from_secs(60)).await;

    verify_backup(engine, sleeper, trigger_time).await?;

    if has_follower {
        let details = engine
            .replication(ReplicationCommand::Details, Core::Follower)
            .await
            .map_err(|e| fatal(e.to_string()))?;
        let polling_disabled = details.get("isPollingDisabled").and_then(|v| v.as_str()) == Some("true");
        if !polling_disabled {
            return Err(fatal("follower did not confirm polling disabled before leader replication was disabled"));
        }
    }

    engine
        .replication(ReplicationCommand::DisableReplication, Core::Leader)
        .await
        .map_err(|e| fatal(e.to_string()))?;

    engine.delete_all_docs().await.map_err(|e| fatal(e.to_string()))?;

    Ok(())
}

/// Post-reindex: re-enable leader replication, sleep 5s, force
/// follower fetchindex, sleep 10s, re-enable polling.
pub async fn reindex_post(engine: &SolrClient, sleeper: &dyn Sleeper, has_follower: bool) -> Result<(), AppError> {
    engine
        .replication(ReplicationCommand::EnableReplication, Core::Leader)
        .await
        .map_err(|e| fatal(e.to_string()))?;

    sleeper.sleep(Duration::from_secs(5)).await;

    if has_follower {
        engine
            .replication(ReplicationCommand::FetchIndex, Core::Follower)
            .await
            .map_err(|e| fatal(e.to_string()))?;
    }

    sleeper.sleep(Duration::from_secs(10)).await;

    if has_follower {
        engine
            .replication(ReplicationCommand::EnablePoll, Core::Follower)
            .await
            .map_err(|e| fatal(e.to_string()))?;
    }

    Ok(())
}

/// Recovery on importer failure: trigger `restore`, poll
/// `restorestatus` up to 100 times (delay `10 + 2*i` seconds), reading
/// `restorestatus.status` consistently on both the success and failure
/// checks. On success, re-enable replication then polling; on terminal
/// failure, log for manual intervention and return an error.
pub async fn reindex_recovery(engine: &SolrClient, sleeper: &dyn Sleeper, has_follower: bool) -> Result<(), AppError> {
    engine
        .replication(ReplicationCommand::Restore, Core::Leader)
        .await
        .map_err(|e| fatal(e.to_string()))?;

    let mut recovered = false;
    for i in 0..100u32 {
        sleeper.sleep(Duration::from_secs(10 + 2 * i as u64)).await;

        let status = engine
            .replication(ReplicationCommand::RestoreStatus, Core::Leader)
            .await
            .map_err(|e| fatal(e.to_string()))?;

        let restore_status = status
            .get("restorestatus")
            .and_then(|v| v.get("status"))
            .and_then(|v| v.as_str());

        if restore_status == Some("success") {
            recovered = true;
            break;
        }
    }

    if !recovered {
        tracing::error!("reindex recovery did not succeed after 100 attempts; manual intervention required");
        return Err(fatal("reindex recovery failed"));
    }

    engine
        .replication(ReplicationCommand::EnableReplication, Core::Leader)
        .await
        .map_err(|e| fatal(e.to_string()))?;

    if has_follower {
        engine
            .replication(ReplicationCommand::EnablePoll, Core::Follower)
            .await
            .map_err(|e| fatal(e.to_string()))?;
    }

    Ok(())
}
