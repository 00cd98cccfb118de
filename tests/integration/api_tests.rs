//! Integration tests for the HTTP task API.
//!
//! Each test serves the router on an ephemeral port backed by an
//! in-memory database and talks to it with `reqwest`.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use tasklane::api::{self, AppState};
use tasklane::config::GlobalConfig;
use tasklane::persistence::db::Database;
use tasklane::worker::Worker;

use super::test_helpers::{fast_config, memory_db, store, FailingProcessor};

struct TestServer {
    base_url: String,
    ct: CancellationToken,
    instance_id: String,
    #[allow(dead_code)]
    db: Arc<Database>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

const BASE_CONFIG: &str = r#"
db_path = "unused.db"
http_port = 0
environment = "test"
"#;

async fn spawn_server() -> TestServer {
    spawn_server_with(BASE_CONFIG).await
}

async fn spawn_server_with(raw_config: &str) -> TestServer {
    let db = memory_db().await;
    let config = GlobalConfig::from_toml_str(raw_config).expect("config");

    let worker = Worker::new(store(&db), Arc::new(FailingProcessor), fast_config());
    let state = Arc::new(AppState {
        config: Arc::new(config),
        db: Arc::clone(&db),
        workers: vec![worker.probe()],
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = api::serve(state, listener, server_ct).await;
    });

    TestServer {
        base_url: format!("http://127.0.0.1:{port}"),
        ct,
        instance_id: worker.instance_id().to_owned(),
        db,
    }
}

async fn create_task(server: &TestServer, body: Value) -> Value {
    let resp = reqwest::Client::new()
        .post(format!("{}/tasks", server.base_url))
        .json(&body)
        .send()
        .await
        .expect("POST /tasks");
    assert_eq!(resp.status(), 201);
    resp.json().await.expect("json")
}

#[tokio::test]
async fn create_and_get_task_with_conversations() {
    let server = spawn_server().await;

    let created = create_task(
        &server,
        json!({
            "title": "triage",
            "description": "inbox",
            "conversations": [{"content": "hi"}, {"content": "bye", "status": "archived"}]
        }),
    )
    .await;

    assert_eq!(created["title"], "triage");
    assert_eq!(created["status"], "pending");
    assert_eq!(created["processed_at"], Value::Null);
    assert_eq!(created["conversations"][0]["status"], "active");
    assert_eq!(created["conversations"][1]["status"], "archived");

    let id = created["id"].as_i64().expect("id");
    let fetched: Value = reqwest::get(format!("{}/tasks/{id}", server.base_url))
        .await
        .expect("GET")
        .json()
        .await
        .expect("json");
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn list_reports_conversation_counts() {
    let server = spawn_server().await;
    create_task(&server, json!({"title": "a", "conversations": [{"content": "x"}]})).await;
    create_task(&server, json!({"title": "b"})).await;

    let listed: Vec<Value> = reqwest::get(format!("{}/tasks?limit=10", server.base_url))
        .await
        .expect("GET")
        .json()
        .await
        .expect("json");

    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["title"], "b");
    assert_eq!(listed[0]["conversation_count"], 0);
    assert_eq!(listed[1]["conversation_count"], 1);
}

#[tokio::test]
async fn update_is_partial() {
    let server = spawn_server().await;
    let created = create_task(&server, json!({"title": "a", "description": "keep"})).await;
    let id = created["id"].as_i64().expect("id");

    let updated: Value = reqwest::Client::new()
        .put(format!("{}/tasks/{id}", server.base_url))
        .json(&json!({"title": "renamed"}))
        .send()
        .await
        .expect("PUT")
        .json()
        .await
        .expect("json");

    assert_eq!(updated["title"], "renamed");
    assert_eq!(updated["description"], "keep");
    assert_eq!(updated["status"], "pending");
}

#[tokio::test]
async fn delete_then_get_is_404() {
    let server = spawn_server().await;
    let created = create_task(&server, json!({"title": "gone"})).await;
    let id = created["id"].as_i64().expect("id");
    let client = reqwest::Client::new();

    let resp = client
        .delete(format!("{}/tasks/{id}", server.base_url))
        .send()
        .await
        .expect("DELETE");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["message"], "Task deleted successfully");

    let resp = reqwest::get(format!("{}/tasks/{id}", server.base_url))
        .await
        .expect("GET");
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["detail"], "Task not found");

    let resp = client
        .delete(format!("{}/tasks/{id}", server.base_url))
        .send()
        .await
        .expect("DELETE again");
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn empty_title_is_unprocessable() {
    let server = spawn_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/tasks", server.base_url))
        .json(&json!({"title": ""}))
        .send()
        .await
        .expect("POST");
    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn conversation_routes() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let created = create_task(&server, json!({"title": "t"})).await;
    let id = created["id"].as_i64().expect("id");

    let resp = client
        .post(format!("{}/tasks/{id}/conversations", server.base_url))
        .json(&json!({"content": "hello"}))
        .send()
        .await
        .expect("POST conversation");
    assert_eq!(resp.status(), 201);
    let conversation: Value = resp.json().await.expect("json");
    assert_eq!(conversation["task_id"], id);
    let conversation_id = conversation["id"].as_i64().expect("id");

    let updated: Value = client
        .put(format!("{}/conversations/{conversation_id}", server.base_url))
        .json(&json!({"status": "archived"}))
        .send()
        .await
        .expect("PUT conversation")
        .json()
        .await
        .expect("json");
    assert_eq!(updated["status"], "archived");
    assert_eq!(updated["content"], "hello");

    let listed: Vec<Value> = reqwest::get(format!("{}/tasks/{id}/conversations", server.base_url))
        .await
        .expect("GET conversations")
        .json()
        .await
        .expect("json");
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn conversation_routes_404_for_missing_parents() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/tasks/999/conversations", server.base_url))
        .json(&json!({"content": "x"}))
        .send()
        .await
        .expect("POST");
    assert_eq!(resp.status(), 404);

    let resp = reqwest::get(format!("{}/tasks/999/conversations", server.base_url))
        .await
        .expect("GET");
    assert_eq!(resp.status(), 404);

    let resp = client
        .put(format!("{}/conversations/999", server.base_url))
        .json(&json!({"content": "x"}))
        .send()
        .await
        .expect("PUT");
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["detail"], "Conversation not found");
}

#[tokio::test]
async fn health_probes() {
    let server = spawn_server().await;

    let resp = reqwest::get(format!("{}/health", server.base_url))
        .await
        .expect("GET /health");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "ok");

    create_task(&server, json!({"title": "t", "conversations": [{"content": "c"}]})).await;
    let detailed: Value = reqwest::get(format!("{}/health/detailed", server.base_url))
        .await
        .expect("GET /health/detailed")
        .json()
        .await
        .expect("json");
    assert_eq!(detailed["database"]["status"], "healthy");
    assert_eq!(detailed["database"]["total_tasks"], 1);
    assert_eq!(detailed["database"]["total_conversations"], 1);
    assert_eq!(detailed["application"]["environment"], "test");
}

#[tokio::test]
async fn status_lists_workers() {
    let server = spawn_server().await;
    let status: Value = reqwest::get(format!("{}/status", server.base_url))
        .await
        .expect("GET /status")
        .json()
        .await
        .expect("json");

    assert_eq!(status["workers"][0]["instance_id"], server.instance_id.as_str());
    assert_eq!(status["workers"][0]["running"], false);
}

#[tokio::test]
async fn metrics_count_by_status() {
    let server = spawn_server().await;
    create_task(&server, json!({"title": "a"})).await;
    create_task(&server, json!({"title": "b"})).await;

    let metrics: Value = reqwest::get(format!("{}/metrics", server.base_url))
        .await
        .expect("GET /metrics")
        .json()
        .await
        .expect("json");
    assert_eq!(metrics["task_counts"]["pending"], 2);
    assert_eq!(metrics["recent_tasks_1h"], 2);

    let info: Value = reqwest::get(format!("{}/info", server.base_url))
        .await
        .expect("GET /info")
        .json()
        .await
        .expect("json");
    assert_eq!(info["name"], "tasklane");
    assert_eq!(info["worker_instances"], 1);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let server = spawn_server().await;
    let resp = reqwest::get(format!("{}/nonexistent", server.base_url))
        .await
        .expect("GET");
    assert_eq!(resp.status(), 404);
}

async fn preflight(server: &TestServer, origin: &str) -> reqwest::Response {
    reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{}/tasks", server.base_url))
        .header("Origin", origin)
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .send()
        .await
        .expect("OPTIONS /tasks")
}

fn header<'a>(resp: &'a reqwest::Response, name: &str) -> Option<&'a str> {
    resp.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn default_cors_echoes_origin_with_credentials() {
    let server = spawn_server().await;
    let resp = preflight(&server, "https://app.example.com").await;

    assert_eq!(resp.status(), 200);
    assert_eq!(
        header(&resp, "access-control-allow-origin"),
        Some("https://app.example.com")
    );
    assert_eq!(header(&resp, "access-control-allow-credentials"), Some("true"));
    assert_eq!(header(&resp, "access-control-allow-methods"), Some("POST"));
}

#[tokio::test]
async fn restricted_cors_ignores_unlisted_origins() {
    let server = spawn_server_with(&format!(
        "{BASE_CONFIG}\n[cors]\norigins = [\"https://allowed.example.com\"]\nallow_credentials = false\nallow_methods = [\"GET\", \"POST\"]\n"
    ))
    .await;

    let allowed = preflight(&server, "https://allowed.example.com").await;
    assert_eq!(
        header(&allowed, "access-control-allow-origin"),
        Some("https://allowed.example.com")
    );
    assert!(header(&allowed, "access-control-allow-credentials").is_none());

    let denied = preflight(&server, "https://evil.example.com").await;
    assert!(header(&denied, "access-control-allow-origin").is_none());
}
