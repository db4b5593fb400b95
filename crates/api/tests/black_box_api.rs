use std::sync::Arc;

use chrono::Utc;
use reqwest::StatusCode;
use serde_json::json;

use courseboard_queue::{InMemoryJobStore, JobAdmin, JobStore, SharedJobStore};

struct TestServer {
    base_url: String,
    store: SharedJobStore,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build the same router as prod, but over an in-memory store and an
        // ephemeral port. The scheduler is not started: the admin surface
        // only needs the store.
        let store: SharedJobStore = Arc::new(InMemoryJobStore::new());
        let app = courseboard_api::app::build_app(JobAdmin::new(store.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            store,
            handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

const OPERATOR: &str = "admin-1";

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", server.base_url))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let url = format!("{}/jobs", server.base_url);

    let get = client.get(&url).send().await.unwrap();
    assert_eq!(get.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = get.json().await.unwrap();
    assert_eq!(body["code"], 401);
    assert_eq!(body["message"], "Unauthorized");

    let post = client
        .post(&url)
        .json(&json!({"name": "send-welcome-email"}))
        .send()
        .await
        .unwrap();
    assert_eq!(post.status(), StatusCode::UNAUTHORIZED);

    let delete = client
        .delete(format!("{}?name=send-welcome-email", url))
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::UNAUTHORIZED);

    // Nothing was attempted on the store.
    assert_eq!(server.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn enqueue_then_list() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let url = format!("{}/jobs", server.base_url);

    let res = client
        .post(&url)
        .header("x-user-id", OPERATOR)
        .json(&json!({
            "name": "send-welcome-email",
            "data": {"email": "admin@example.com", "username": "Admin"},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], 201);
    assert_eq!(body["data"]["name"], "send-welcome-email");
    assert_eq!(body["data"]["data"]["email"], "admin@example.com");
    assert_eq!(body["data"]["lastModifiedBy"], OPERATOR);
    assert!(body["data"]["nextRunAt"].is_string());

    let res = client
        .get(&url)
        .header("x-user-id", OPERATOR)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["jobs"][0]["name"], "send-welcome-email");

    // Case-insensitive substring filter.
    let res = client
        .get(format!("{}?name=WELCOME", url))
        .header("x-user-id", OPERATOR)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);

    let res = client
        .get(format!("{}?name=nothing-matches", url))
        .header("x-user-id", OPERATOR)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["total"], 0);
    assert_eq!(body["data"]["jobs"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn enqueue_without_name_is_rejected() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/jobs", server.base_url))
        .header("x-user-id", OPERATOR)
        .json(&json!({"data": {"email": "x@y.z"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], 400);

    // No record was created.
    assert_eq!(server.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn overview_groups_by_name() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let url = format!("{}/jobs", server.base_url);

    for _ in 0..3 {
        client
            .post(&url)
            .header("x-user-id", OPERATOR)
            .json(&json!({"name": "send-welcome-email"}))
            .send()
            .await
            .unwrap();
    }
    client
        .post(&url)
        .header("x-user-id", OPERATOR)
        .json(&json!({"name": "purge-sessions"}))
        .send()
        .await
        .unwrap();

    // Lock one record so it shows up as running.
    let (jobs, _) = server.store.query(Some("welcome"), 10, 0).await.unwrap();
    assert!(server
        .store
        .claim(jobs[0].id, Utc::now(), chrono::Duration::minutes(10))
        .await
        .unwrap());

    let res = client
        .get(format!("{}?overview=true", url))
        .header("x-user-id", OPERATOR)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();

    let stats = body["data"].as_array().unwrap();
    let welcome = stats
        .iter()
        .find(|s| s["name"] == "send-welcome-email")
        .unwrap();
    assert_eq!(welcome["total"], 3);
    assert_eq!(welcome["running"], 1);
    let purge = stats.iter().find(|s| s["name"] == "purge-sessions").unwrap();
    assert_eq!(purge["total"], 1);
    assert_eq!(purge["running"], 0);
}

#[tokio::test]
async fn delete_requires_id_or_name() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let url = format!("{}/jobs", server.base_url);

    let res = client
        .delete(&url)
        .header("x-user-id", OPERATOR)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .delete(format!("{}?id=not-a-uuid", url))
        .header("x-user-id", OPERATOR)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "invalid job id");
}

#[tokio::test]
async fn cancel_by_name_removes_matching_jobs() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let url = format!("{}/jobs", server.base_url);

    for name in ["x", "x", "y"] {
        client
            .post(&url)
            .header("x-user-id", OPERATOR)
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap();
    }

    let res = client
        .delete(format!("{}?name=x", url))
        .header("x-user-id", OPERATOR)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["numRemoved"], 2);

    let res = client
        .get(format!("{}?name=x", url))
        .header("x-user-id", OPERATOR)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["total"], 0);

    let res = client
        .get(format!("{}?name=y", url))
        .header("x-user-id", OPERATOR)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn retry_replaces_failed_record() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let url = format!("{}/jobs", server.base_url);

    let res = client
        .post(&url)
        .header("x-user-id", OPERATOR)
        .json(&json!({
            "name": "send-welcome-email",
            "data": {"email": "admin@example.com"},
        }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let failed_id: courseboard_core::JobId =
        serde_json::from_value(body["data"]["id"].clone()).unwrap();

    // Simulate the handler having failed.
    server
        .store
        .mark_failure(failed_id, Utc::now(), "SMTP timeout")
        .await
        .unwrap();

    let res = client
        .post(&url)
        .header("x-user-id", OPERATOR)
        .json(&json!({
            "name": "send-welcome-email",
            "data": {"email": "admin@example.com"},
            "retryJobId": failed_id.to_string(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let new_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_ne!(new_id, failed_id.to_string());

    // Exactly one record remains and the failed one no longer appears.
    let res = client
        .get(format!("{}?name=send-welcome-email", url))
        .header("x-user-id", OPERATOR)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["jobs"][0]["id"], new_id);
    assert!(body["data"]["jobs"][0]["failedAt"].is_null());

    // A malformed retry id is rejected up front.
    let res = client
        .post(&url)
        .header("x-user-id", OPERATOR)
        .json(&json!({"name": "send-welcome-email", "retryJobId": "garbage"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
