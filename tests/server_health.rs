//! End-to-end smoke test: spawns the compiled binary against an
//! ephemeral port and polls `/health` before driving a couple of
//! auth-boundary checks.

use std::net::TcpListener;
use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

use assert_cmd::cargo::CommandCargoExt;
use reqwest::blocking::Client;
use serde_json::Value;
use tempfile::tempdir;

struct TestServer {
    base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral TCP listener");
        let addr = listener.local_addr().expect("local_addr");
        let port = addr.port();
        drop(listener);

        let base_url = format!("http://127.0.0.1:{port}");
        let tmp = tempdir().expect("tempdir");
        let db_path = tmp.path().join("staging.db");

        let mut cmd = Command::cargo_bin("conflict-search").expect("locate conflict-search binary");
        cmd.env("BIND_ADDR", format!("127.0.0.1:{port}"))
            .env("DATABASE_PATH", &db_path)
            .env("SOLR_LEADER_URL", "http://127.0.0.1:1/solr")
            .env("RUST_LOG", "info");
        let child = cmd.spawn().expect("spawn conflict-search server");

        let server = Self { base_url, child };
        server.wait_for_health();
        server
    }

    fn wait_for_health(&self) {
        let client = Client::new();
        let url = format!("{}/health", self.base_url);

        for _ in 0..150 {
            match client.get(&url).send() {
                Ok(resp) if resp.status().is_success() => return,
                _ => thread::sleep(Duration::from_millis(100)),
            }
        }
        panic!("conflict-search server did not become healthy in time");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn health_endpoint_reports_ok_status() {
    let server = TestServer::spawn();
    let client = Client::new();
    let url = format!("{}/health", server.base_url);

    let resp = client.get(&url).send().expect("health response");
    assert!(resp.status().is_success());

    let value: Value = resp.json().expect("valid health JSON body");
    assert_eq!(value["status"], "ok");
}

#[test]
fn search_endpoint_requires_bearer_token() {
    let server = TestServer::spawn();
    let client = Client::new();
    let url = format!("{}/search/possible-conflict-names", server.base_url);

    let resp = client
        .post(&url)
        .json(&serde_json::json!({"query": {"value": "acme"}}))
        .send()
        .expect("search response");

    assert_eq!(resp.status().as_u16(), 401);
}

#[test]
fn update_endpoint_requires_bearer_token() {
    let server = TestServer::spawn();
    let client = Client::new();
    let url = format!("{}/update", server.base_url);

    let resp = client
        .put(&url)
        .json(&serde_json::json!({"nr_num": "NR1", "type": "NR", "jurisdiction": "BC", "state": "APPROVED", "start_date": "2023-11-14T22:13:20Z", "names": []}))
        .send()
        .expect("update response");

    assert_eq!(resp.status().as_u16(), 401);
}
