use std::sync::Arc;
use std::time::Duration;

use lodestar_core::RegistryStore;
use lodestar_db::MemoryStore;
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

mod common;
use common::spawn_app;

async fn register(client: &reqwest::Client, app: &common::TestApp, name: &str, url: &str) -> String {
    let response = client
        .post(app.url("/register"))
        .json(&json!({ "name": name, "url": url }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn register_returns_created_instance_and_makes_it_discoverable() {
    let app = spawn_app(Vec::new()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(app.url("/register"))
        .json(&json!({ "name": "auth", "url": "http://host:3002" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "auth");
    assert_eq!(body["url"], "http://host:3002");
    let id = body["id"].as_str().unwrap();

    let instances: Value = client.get(app.url("/auth")).send().await.unwrap().json().await.unwrap();
    assert_eq!(instances.as_array().unwrap().len(), 1);
    assert_eq!(instances[0]["id"], id);
    assert_eq!(instances[0]["name"], "auth");
    assert_eq!(instances[0]["url"], "http://host:3002");
    assert_eq!(instances[0]["lastHeartbeat"], 1_700_000_000_000u64);
}

#[tokio::test]
async fn register_rejects_malformed_input() {
    let app = spawn_app(Vec::new()).await;
    let client = reqwest::Client::new();

    let cases = [
        json!({ "name": "auth", "url": "not a url" }),
        json!({ "name": "", "url": "http://host:3002" }),
        json!({ "name": "   ", "url": "http://host:3002" }),
        json!({ "name": "auth" }),
        json!({ "name": 7, "url": "http://host:3002" }),
    ];
    for case in cases {
        let response = client.post(app.url("/register")).json(&case).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "accepted {case}");
        let body: Value = response.json().await.unwrap();
        assert!(body["message"].is_string());
    }

    let response = client
        .post(app.url("/register"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client.post(app.url("/register")).body("name=auth").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // nothing reached the registry
    let services: Value = client.get(app.url("/services")).send().await.unwrap().json().await.unwrap();
    assert_eq!(services, json!({}));
}

#[tokio::test]
async fn heartbeat_reports_ok_for_live_instance() {
    let app = spawn_app(Vec::new()).await;
    let client = reqwest::Client::new();
    let id = register(&client, &app, "auth", "http://host:3002").await;

    let response = client
        .post(app.url("/heartbeat"))
        .json(&json!({ "name": "auth", "id": id }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn heartbeat_for_unknown_instance_is_not_found() {
    let app = spawn_app(Vec::new()).await;
    let client = reqwest::Client::new();

    for id in ["0b0e7a3c-58c5-4a43-9c43-5f0d6c1f4b8e", "not-a-uuid"] {
        let response = client
            .post(app.url("/heartbeat"))
            .json(&json!({ "name": "auth", "id": id }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], "Service instance not found");
    }

    let response = client
        .post(app.url("/heartbeat"))
        .json(&json!({ "name": "auth", "id": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expired_instance_disappears_and_heartbeat_reports_not_found() {
    let app = spawn_app(Vec::new()).await;
    let client = reqwest::Client::new();
    let id = register(&client, &app, "auth", "http://host:3002").await;

    app.clock.advance(Duration::from_secs(31));

    let instances: Value = client.get(app.url("/auth")).send().await.unwrap().json().await.unwrap();
    assert_eq!(instances, json!([]));

    let response = client
        .post(app.url("/heartbeat"))
        .json(&json!({ "name": "auth", "id": id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unregister_removes_instance_immediately() {
    let app = spawn_app(Vec::new()).await;
    let client = reqwest::Client::new();
    let id = register(&client, &app, "auth", "http://host:3002").await;

    let response = client
        .post(app.url("/unregister"))
        .json(&json!({ "name": "auth", "id": id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.bytes().await.unwrap().is_empty());

    let instances: Value = client.get(app.url("/auth")).send().await.unwrap().json().await.unwrap();
    assert_eq!(instances, json!([]));

    // idempotent, including ids that never existed
    for id in [id.as_str(), "never-registered"] {
        let response = client
            .post(app.url("/unregister"))
            .json(&json!({ "name": "auth", "id": id }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = client
        .post(app.url("/unregister"))
        .json(&json!({ "name": "auth" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_services_groups_instances_by_name() {
    let app = spawn_app(Vec::new()).await;
    let client = reqwest::Client::new();

    let empty: Value = client.get(app.url("/services")).send().await.unwrap().json().await.unwrap();
    assert_eq!(empty, json!({}));

    register(&client, &app, "auth", "http://auth-1:3002").await;
    register(&client, &app, "auth", "http://auth-2:3002").await;
    register(&client, &app, "core", "http://core:3000").await;

    let services: Value = client.get(app.url("/services")).send().await.unwrap().json().await.unwrap();
    assert_eq!(services["auth"].as_array().unwrap().len(), 2);
    assert_eq!(services["core"].as_array().unwrap().len(), 1);
    assert_eq!(services["core"][0]["url"], "http://core:3000");
}

#[tokio::test]
async fn discover_unknown_service_is_empty_list() {
    let app = spawn_app(Vec::new()).await;
    let response = reqwest::get(app.url("/nobody")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let app = spawn_app(Vec::new()).await;

    let response = reqwest::get(app.url("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");

    let doc: Value = reqwest::get(app.url("/api-docs/openapi.json")).await.unwrap().json().await.unwrap();
    assert!(doc["paths"]["/register"].is_object());
    assert!(doc["paths"]["/heartbeat"].is_object());
}

#[tokio::test]
async fn unreachable_store_is_service_unavailable() {
    let app = common::spawn_with_store(Arc::new(common::UnreachableStore));
    let client = reqwest::Client::new();

    let requests = [
        client.post(app.url("/register")).json(&json!({ "name": "auth", "url": "http://host:3002" })),
        client.post(app.url("/heartbeat")).json(&json!({ "name": "auth", "id": Uuid::new_v4() })),
        client.post(app.url("/unregister")).json(&json!({ "name": "auth", "id": Uuid::new_v4() })),
        client.get(app.url("/auth")),
        client.get(app.url("/services")),
    ];
    for request in requests {
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json().await.unwrap();
        assert!(body["message"].as_str().unwrap().contains("connection refused"));
    }
}

#[tokio::test]
async fn validation_still_runs_before_an_unreachable_store() {
    let app = common::spawn_with_store(Arc::new(common::UnreachableStore));
    let response = reqwest::Client::new()
        .post(app.url("/register"))
        .json(&json!({ "name": "auth", "url": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn corrupt_record_is_internal_server_error() {
    let store = Arc::new(MemoryStore::new());
    let id = Uuid::new_v4();
    store
        .set_with_ttl(&format!("service:auth:{id}"), "not json", Duration::from_secs(3600))
        .await
        .unwrap();
    let app = common::spawn_with_store(store);
    let client = reqwest::Client::new();

    let requests = [
        client.get(app.url("/auth")),
        client.get(app.url("/services")),
        client.post(app.url("/heartbeat")).json(&json!({ "name": "auth", "id": id })),
    ];
    for request in requests {
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json().await.unwrap();
        assert!(body["message"].as_str().unwrap().contains("corrupt instance record"));
    }
}
