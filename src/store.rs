//! Staging store and synonym catalog, backed by a single SQLite
//! connection opened with WAL plus a busy timeout, schema created with
//! `CREATE TABLE IF NOT EXISTS`, writes wrapped in short transactions.
//! Shared across concurrent Axum handlers, so it's wrapped in an
//! `Arc<Mutex<Connection>>`; the database is the serialization point
//! for staging writes, and transactions are kept short.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::models::{EventStatus, EventType, SearchHistory, SolrDoc, SolrDocEvent, SynonymType};
use crate::search::query_builder::SynonymCatalog;

fn to_rfc3339(dt: OffsetDateTime) -> String {
    dt.format(&Rfc3339).expect("OffsetDateTime always formats as rfc3339")
}

fn from_rfc3339(s: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).with_context(|| format!("invalid rfc3339 timestamp: {s}"))
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(5000))?;

        Self::initialize_schema(&conn)?;

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn initialize_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS solr_doc (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id     TEXT NOT NULL,
                submitter_id  TEXT,
                doc           TEXT NOT NULL,
                created_date  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_solr_doc_entity_id ON solr_doc(entity_id);

            CREATE TABLE IF NOT EXISTS solr_doc_event (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                solr_doc_id        INTEGER NOT NULL REFERENCES solr_doc(id),
                event_type         TEXT NOT NULL,
                status             TEXT NOT NULL,
                event_date         TEXT NOT NULL,
                event_last_update  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_solr_doc_event_status ON solr_doc_event(status, event_type);

            CREATE TABLE IF NOT EXISTS solr_synonym_list (
                synonym_type      TEXT NOT NULL,
                synonym           TEXT NOT NULL,
                synonym_list      TEXT NOT NULL,
                last_update_date  TEXT NOT NULL,
                PRIMARY KEY (synonym_type, synonym)
            );

            CREATE TABLE IF NOT EXISTS search_history (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                submitter_id  TEXT,
                query         TEXT NOT NULL,
                results       TEXT NOT NULL,
                search_date   TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Atomically write a `SolrDoc` row and its one initial PENDING
    /// UPDATE event (invariant I4). Returns `(solr_doc_id, event_id)`.
    pub fn insert_solr_doc(
        &self,
        entity_id: &str,
        submitter_id: Option<&str>,
        doc: &serde_json::Value,
    ) -> Result<(i64, i64)> {
        let now = to_rfc3339(OffsetDateTime::now_utc());
        let doc_json = serde_json::to_string(doc)?;

        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO solr_doc (entity_id, submitter_id, doc, created_date) VALUES (?1, ?2, ?3, ?4)",
            params![entity_id, submitter_id, doc_json, now],
        )?;
        let solr_doc_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO solr_doc_event (solr_doc_id, event_type, status, event_date, event_last_update)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![solr_doc_id, EventType::Update.as_str(), EventStatus::Pending.as_str(), now],
        )?;
        let event_id = tx.last_insert_rowid();

        tx.commit()?;
        Ok((solr_doc_id, event_id))
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<SolrDocEvent> {
        let event_type: String = row.get(2)?;
        let status: String = row.get(3)?;
        let event_date: String = row.get(4)?;
        let event_last_update: String = row.get(5)?;
        Ok(SolrDocEvent {
            id: row.get(0)?,
            solr_doc_id: row.get(1)?,
            event_type: EventType::parse(&event_type).unwrap_or(EventType::Update),
            status: EventStatus::parse(&status).unwrap_or(EventStatus::Pending),
            event_date: from_rfc3339(&event_date).unwrap_or(OffsetDateTime::UNIX_EPOCH),
            event_last_update: from_rfc3339(&event_last_update).unwrap_or(OffsetDateTime::UNIX_EPOCH),
        })
    }

    /// Events matching `statuses` (and, if given, `event_type` /
    /// `start_date`), ordered by `event_date` ascending (oldest
    /// first). `limit` caps the result size.
    pub fn get_events_by_status(
        &self,
        statuses: &[EventStatus],
        event_type: Option<EventType>,
        start_date: Option<OffsetDateTime>,
        limit: Option<usize>,
    ) -> Result<Vec<SolrDocEvent>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT id, solr_doc_id, event_type, status, event_date, event_last_update
             FROM solr_doc_event WHERE status IN (",
        );
        sql.push_str(&vec!["?"; statuses.len()].join(","));
        sql.push(')');

        let mut values: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();

        if let Some(et) = event_type {
            sql.push_str(" AND event_type = ?");
            values.push(et.as_str().to_string());
        }
        if let Some(start) = start_date {
            sql.push_str(" AND event_date >= ?");
            values.push(to_rfc3339(start));
        }
        sql.push_str(" ORDER BY event_date ASC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), Self::row_to_event)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Bulk status mutation inside a single transaction; each row's
    /// `event_last_update` is bumped to *now*.
    pub fn update_events_status(&self, new_status: EventStatus, event_ids: &[i64]) -> Result<()> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let now = to_rfc3339(OffsetDateTime::now_utc());

        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare("UPDATE solr_doc_event SET status = ?1, event_last_update = ?2 WHERE id = ?3")?;
            for id in event_ids {
                stmt.execute(params![new_status.as_str(), now, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn row_to_solr_doc(row: &rusqlite::Row) -> rusqlite::Result<SolrDoc> {
        let doc_json: String = row.get(3)?;
        let created_date: String = row.get(4)?;
        Ok(SolrDoc {
            id: row.get(0)?,
            entity_id: row.get(1)?,
            submitter_id: row.get(2)?,
            doc: serde_json::from_str(&doc_json).unwrap_or(serde_json::Value::Null),
            created_date: from_rfc3339(&created_date).unwrap_or(OffsetDateTime::UNIX_EPOCH),
        })
    }

    pub fn get_solr_doc(&self, id: i64) -> Result<Option<SolrDoc>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, entity_id, submitter_id, doc, created_date FROM solr_doc WHERE id = ?1",
        )?;
        Ok(stmt.query_row(params![id], Self::row_to_solr_doc).optional()?)
    }

    /// Invariant I3: the authoritative snapshot for `entity_id`.
    pub fn find_most_recent_by_entity_id(&self, entity_id: &str) -> Result<Option<SolrDoc>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, entity_id, submitter_id, doc, created_date FROM solr_doc
             WHERE entity_id = ?1 ORDER BY created_date DESC, id DESC LIMIT 1",
        )?;
        Ok(stmt.query_row(params![entity_id], Self::row_to_solr_doc).optional()?)
    }

    pub fn get_updated_entity_ids_after_date(&self, cutoff: OffsetDateTime) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT DISTINCT entity_id FROM solr_doc WHERE created_date > ?1")?;
        let rows = stmt.query_map(params![to_rfc3339(cutoff)], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Append a fresh RESYNC event tied to `solr_doc_id`.
    pub fn create_resync_event(&self, solr_doc_id: i64) -> Result<SolrDocEvent> {
        let now = to_rfc3339(OffsetDateTime::now_utc());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO solr_doc_event (solr_doc_id, event_type, status, event_date, event_last_update)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![solr_doc_id, EventType::Resync.as_str(), EventStatus::Pending.as_str(), now],
        )?;
        let id = conn.last_insert_rowid();
        Ok(SolrDocEvent {
            id,
            solr_doc_id,
            event_type: EventType::Resync,
            status: EventStatus::Pending,
            event_date: from_rfc3339(&now)?,
            event_last_update: from_rfc3339(&now)?,
        })
    }

    /// Best-effort audit write; callers are expected to log and
    /// swallow failures.
    pub fn record_search_history(&self, entry: &SearchHistory) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO search_history (submitter_id, query, results, search_date) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.submitter_id,
                serde_json::to_string(&entry.query)?,
                serde_json::to_string(&entry.results)?,
                to_rfc3339(entry.search_date),
            ],
        )?;
        Ok(())
    }

    // --- Synonym catalog ---

    fn normalize_key(key: &str) -> String {
        key.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
    }

    /// Bulk upsert: every `(key, value-list)` pair is written,
    /// returning the full set of (normalized) keys touched.
    pub fn create_or_replace_all(
        &self,
        pairs: &HashMap<String, Vec<String>>,
        synonym_type: SynonymType,
    ) -> Result<HashSet<String>> {
        let now = to_rfc3339(OffsetDateTime::now_utc());
        let mut touched = HashSet::new();

        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO solr_synonym_list (synonym_type, synonym, synonym_list, last_update_date)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(synonym_type, synonym) DO UPDATE SET
                     synonym_list = excluded.synonym_list,
                     last_update_date = excluded.last_update_date",
            )?;
            for (key, values) in pairs {
                let key = Self::normalize_key(key);
                let lowered: Vec<String> = values.iter().map(|v| v.to_lowercase()).collect();
                stmt.execute(params![
                    synonym_type.as_str(),
                    key,
                    serde_json::to_string(&lowered)?,
                    now,
                ])?;
                touched.insert(key);
            }
        }
        tx.commit()?;
        Ok(touched)
    }

    /// Remove entries of `synonym_type` not present in `keep`
    /// (prune semantics).
    pub fn delete_all(&self, synonym_type: SynonymType, keep: &HashSet<String>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if keep.is_empty() {
            conn.execute(
                "DELETE FROM solr_synonym_list WHERE synonym_type = ?1",
                params![synonym_type.as_str()],
            )?;
            return Ok(());
        }

        let mut sql = String::from("DELETE FROM solr_synonym_list WHERE synonym_type = ? AND synonym NOT IN (");
        sql.push_str(&vec!["?"; keep.len()].join(","));
        sql.push(')');

        let mut values = vec![synonym_type.as_str().to_string()];
        values.extend(keep.iter().cloned());

        conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    /// All `(key -> expansion list)` rows of `synonym_type` whose key
    /// is in `keys`, preserving the shape the engine's synonym
    /// resource expects.
    pub fn find_all_by_keys(
        &self,
        keys: &HashSet<String>,
        synonym_type: SynonymType,
    ) -> Result<HashMap<String, Vec<String>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut sql = String::from(
            "SELECT synonym, synonym_list FROM solr_synonym_list WHERE synonym_type = ? AND synonym IN (",
        );
        sql.push_str(&vec!["?"; keys.len()].join(","));
        sql.push(')');

        let mut values = vec![synonym_type.as_str().to_string()];
        values.extend(keys.iter().cloned());

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            let key: String = row.get(0)?;
            let list_json: String = row.get(1)?;
            Ok((key, list_json))
        })?;

        let mut out = HashMap::new();
        for row in rows {
            let (key, list_json) = row?;
            let list: Vec<String> = serde_json::from_str(&list_json)?;
            out.insert(key, list);
        }
        Ok(out)
    }

    /// Every stored `(key -> expansion list)` row of `synonym_type`.
    /// Used by the resync-all endpoint to push the whole catalog back
    /// to the engine after a manual correction.
    pub fn find_all(&self, synonym_type: SynonymType) -> Result<HashMap<String, Vec<String>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT synonym, synonym_list FROM solr_synonym_list WHERE synonym_type = ?1",
        )?;
        let rows = stmt.query_map(params![synonym_type.as_str()], |row| {
            let key: String = row.get(0)?;
            let list_json: String = row.get(1)?;
            Ok((key, list_json))
        })?;

        let mut out = HashMap::new();
        for row in rows {
            let (key, list_json) = row?;
            let list: Vec<String> = serde_json::from_str(&list_json)?;
            out.insert(key, list);
        }
        Ok(out)
    }

    pub fn find_exact(&self, key: &str, synonym_type: SynonymType) -> Result<Option<Vec<String>>> {
        let key = Self::normalize_key(key);
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT synonym_list FROM solr_synonym_list WHERE synonym_type = ?1 AND synonym = ?2",
        )?;
        let value: Option<String> = stmt.query_row(params![synonym_type.as_str(), key], |row| row.get(0)).optional()?;
        Ok(match value {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }
}

impl SynonymCatalog for Store {
    /// All keys of `synonym_type` that begin with `first_token`,
    /// each split into its whitespace-separated tokens (I5: stored
    /// lowercased, so the prefix match is implicitly case-insensitive
    /// once `first_token` is lowercased here too).
    fn find_by_prefix(&self, first_token: &str, synonym_type: SynonymType) -> Result<Vec<Vec<String>>> {
        let prefix = first_token.to_lowercase();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT synonym FROM solr_synonym_list WHERE synonym_type = ?1 AND synonym LIKE ?2 ESCAPE '\\'",
        )?;
        let like_prefix = format!("{}%", prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        let rows = stmt.query_map(params![synonym_type.as_str(), like_prefix], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            let key = row?;
            out.push(key.split_whitespace().map(str::to_string).collect());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_solr_doc_creates_one_pending_update_event() {
        let store = Store::open_in_memory().unwrap();
        let (_doc_id, _event_id) =
            store.insert_solr_doc("NR1234567", Some("user-1"), &serde_json::json!({"a": 1})).unwrap();

        let events = store
            .get_events_by_status(&[EventStatus::Pending], Some(EventType::Update), None, None)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::Pending);
        assert_eq!(events[0].event_type, EventType::Update);
    }

    #[test]
    fn event_invariant_p6_counts_n_distinct_updates_in_order() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store.insert_solr_doc(&format!("NR{i}"), None, &serde_json::json!({})).unwrap();
        }
        let events = store
            .get_events_by_status(&[EventStatus::Pending], Some(EventType::Update), None, None)
            .unwrap();
        assert_eq!(events.len(), 5);
        for pair in events.windows(2) {
            assert!(pair[0].event_date <= pair[1].event_date);
        }
    }

    #[test]
    fn update_events_status_bulk_transitions_and_bumps_last_update() {
        let store = Store::open_in_memory().unwrap();
        let (_doc_id, event_id) =
            store.insert_solr_doc("NR1", None, &serde_json::json!({})).unwrap();

        store.update_events_status(EventStatus::Complete, &[event_id]).unwrap();

        let events = store
            .get_events_by_status(&[EventStatus::Complete], None, None, None)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, event_id);
        assert!(events[0].event_last_update >= events[0].event_date);
    }

    #[test]
    fn find_most_recent_by_entity_id_returns_latest_row() {
        let store = Store::open_in_memory().unwrap();
        store.insert_solr_doc("NR1", None, &serde_json::json!({"v": 1})).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.insert_solr_doc("NR1", None, &serde_json::json!({"v": 2})).unwrap();

        let latest = store.find_most_recent_by_entity_id("NR1").unwrap().unwrap();
        assert_eq!(latest.doc["v"], 2);
    }

    #[test]
    fn synonym_prefix_lookup_is_case_insensitive() {
        let store = Store::open_in_memory().unwrap();
        let mut pairs = HashMap::new();
        pairs.insert("British Columbia".to_string(), vec!["bc".to_string()]);
        store.create_or_replace_all(&pairs, SynonymType::Name).unwrap();

        let found = store.find_by_prefix("BRITISH", SynonymType::Name).unwrap();
        assert_eq!(found, vec![vec!["british".to_string(), "columbia".to_string()]]);
    }

    #[test]
    fn delete_all_prunes_keys_not_in_keep_set() {
        let store = Store::open_in_memory().unwrap();
        let mut pairs = HashMap::new();
        pairs.insert("bc".to_string(), vec!["british columbia".to_string()]);
        pairs.insert("ab".to_string(), vec!["alberta".to_string()]);
        store.create_or_replace_all(&pairs, SynonymType::Name).unwrap();

        let keep: HashSet<String> = ["bc".to_string()].into_iter().collect();
        store.delete_all(SynonymType::Name, &keep).unwrap();

        assert!(store.find_exact("bc", SynonymType::Name).unwrap().is_some());
        assert!(store.find_exact("ab", SynonymType::Name).unwrap().is_none());
    }
}
