//! Integration coverage for the sync worker and heartbeat verifier
//! against a mocked Solr-family engine, using `wiremock` for HTTP
//! mocking.

use std::time::Duration;

use conflict_search::heartbeat::{run_heartbeat, HeartbeatResult};
use conflict_search::solr::SolrClient;
use conflict_search::store::Store;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine_for(mock: &MockServer) -> SolrClient {
    SolrClient::new(mock.uri(), None, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn run_sync_drains_pending_events_on_engine_success() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/update"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"responseHeader": {"status": 0}})))
        .mount(&mock)
        .await;

    let store = Store::open_in_memory().unwrap();
    store
        .insert_solr_doc(
            "NR1234567",
            None,
            &serde_json::json!({
                "nr_num": "NR1234567",
                "type": "NR",
                "jurisdiction": "BC",
                "state": "APPROVED",
                "start_date": "2023-11-14T22:13:20Z",
                "names": [{"name": "Acme Holdings", "name_state": "A", "submit_count": 0}],
            }),
        )
        .unwrap();

    let engine = engine_for(&mock);
    let summary = conflict_search::sync::run_sync(&store, &engine, 10).await.unwrap();

    assert_eq!(summary.events_drained, 1);
    assert_eq!(summary.entities_pushed, 1);

    let remaining = store
        .get_events_by_status(&[conflict_search::models::EventStatus::Pending], None, None, None)
        .unwrap();
    assert!(remaining.is_empty(), "drained event should no longer be PENDING");

    let completed = store
        .get_events_by_status(&[conflict_search::models::EventStatus::Complete], None, None, None)
        .unwrap();
    assert_eq!(completed.len(), 1);
}

#[tokio::test]
async fn run_sync_marks_events_error_when_engine_rejects_the_batch() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/update"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock)
        .await;

    let store = Store::open_in_memory().unwrap();
    store
        .insert_solr_doc(
            "NR7654321",
            None,
            &serde_json::json!({
                "nr_num": "NR7654321",
                "type": "NR",
                "jurisdiction": "BC",
                "state": "APPROVED",
                "start_date": "2023-11-14T22:13:20Z",
                "names": [{"name": "Contoso Ltd", "name_state": "A", "submit_count": 0}],
            }),
        )
        .unwrap();

    let engine = engine_for(&mock);
    let result = conflict_search::sync::run_sync(&store, &engine, 10).await;
    assert!(result.is_err(), "engine rejection should surface as an error");

    let errored = store
        .get_events_by_status(&[conflict_search::models::EventStatus::Error], None, None, None)
        .unwrap();
    assert_eq!(errored.len(), 1, "drained events must still transition together, to ERROR (P7)");

    let pending = store
        .get_events_by_status(&[conflict_search::models::EventStatus::Pending], None, None, None)
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn run_heartbeat_fails_when_follower_polling_is_disabled() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/replication"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "isPollingDisabled": "true",
        })))
        .mount(&mock)
        .await;

    let store = Store::open_in_memory().unwrap();
    let engine = SolrClient::new(mock.uri(), Some(mock.uri()), Duration::from_secs(5)).unwrap();

    let result = run_heartbeat(&store, &engine, 2).await.unwrap();
    assert_eq!(
        result,
        HeartbeatResult::Failed { reason: "follower is not fresh or polling is disabled".to_string() }
    );
}

#[tokio::test]
async fn run_heartbeat_is_healthy_with_no_follower_configured_and_no_recent_events() {
    let mock = MockServer::start().await;
    let store = Store::open_in_memory().unwrap();
    let engine = engine_for(&mock);

    let result = run_heartbeat(&store, &engine, 2).await.unwrap();
    assert_eq!(result, HeartbeatResult::Skipped { reason: "no recent COMPLETE update events".to_string() });
}
