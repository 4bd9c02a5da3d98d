use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::time::Duration;
use taskgate_lib::engine::api::{create_router, ApiState};
use taskgate_lib::engine::config::AuthConfig;
use taskgate_lib::engine::database::Database;
use taskgate_lib::engine::identity::IdentityStore;
use taskgate_lib::engine::rbac::RightsRegistry;
use taskgate_lib::engine::seed;
use tower::ServiceExt;

fn app() -> Router {
    let db = Database::in_memory().unwrap();
    seed::seed_admin(
        &RightsRegistry::new(db.clone()),
        &IdentityStore::new(db.clone()),
        "root",
        "root-pw",
    )
    .unwrap();
    let auth = AuthConfig {
        token_ttl_secs: 60,
        default_role: Some(seed::USER_ROLE.to_string()),
    };
    create_router(ApiState::new(db, &auth), Duration::from_secs(30))
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register_and_login(app: &Router, name: &str) -> (i64, String) {
    let credentials = json!({ "username": name, "password": format!("{}-pw", name) });
    let (status, user) = send(app, "POST", "/user", None, Some(credentials.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, login) = send(app, "POST", "/login", None, Some(credentials)).await;
    assert_eq!(status, StatusCode::OK);
    (user["id"].as_i64().unwrap(), login["token"].as_str().unwrap().to_string())
}

async fn login(app: &Router, name: &str, password: &str) -> String {
    let (status, body) = send(app, "POST", "/login", None, Some(json!({ "username": name, "password": password }))).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_registration_and_login() {
    let app = app();
    let (status, user) = send(&app, "POST", "/user", None, Some(json!({ "username": "alice", "password": "pw" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["username"], "alice");
    assert!(user.get("password_hash").is_none());

    let (status, body) = send(&app, "POST", "/user", None, Some(json!({ "username": "alice", "password": "other" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate_name");

    let (status, body) = send(&app, "POST", "/login", None, Some(json!({ "username": "alice", "password": "nope" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credentials");

    let (status, body) = send(&app, "POST", "/login", None, Some(json!({ "username": "ghost", "password": "nope" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credentials");

    let (status, body) = send(&app, "POST", "/login", None, Some(json!({ "username": "alice", "password": "pw" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user["id"]);
    assert!(body["token"].as_str().is_some());
}

#[tokio::test]
async fn test_padded_username_can_log_in() {
    let app = app();
    let credentials = json!({ "username": "  carol ", "password": "pw" });
    let (status, user) = send(&app, "POST", "/user", None, Some(credentials.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["username"], "carol");

    let (status, body) = send(&app, "POST", "/login", None, Some(credentials)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user["id"]);
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let app = app();
    let (status, body) = send(&app, "GET", "/todo", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");

    let (status, _) = send(&app, "GET", "/todo", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, token) = register_and_login(&app, "alice").await;
    let request = Request::builder()
        .uri("/todo")
        .header(header::AUTHORIZATION, format!("bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .uri("/todo")
        .header("x-token", token)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_todos_are_private_to_their_owner() {
    let app = app();
    let (alice_id, alice) = register_and_login(&app, "alice").await;
    let (bob_id, bob) = register_and_login(&app, "bob").await;

    let (status, todo) = send(&app, "POST", "/todo", Some(&alice), Some(json!({ "name": "buy milk", "important": true }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(todo["user_id"], alice_id);
    assert_eq!(todo["done"], false);
    let todo_uri = format!("/todo/{}", todo["id"]);

    let (status, _) = send(&app, "GET", &todo_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", &todo_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    let (status, _) = send(&app, "DELETE", &todo_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "GET", &format!("/user/{}/todos", alice_id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "GET", &format!("/user/{}", alice_id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "GET", &format!("/user/{}", bob_id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, done) = send(&app, "PATCH", &todo_uri, Some(&alice), Some(json!({ "done": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["done"], true);
    assert!(done["finish_time"].is_string());

    let (status, list) = send(&app, "GET", "/todo", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_rights_management_requires_admin() {
    let app = app();
    let (_, user) = register_and_login(&app, "mallory").await;
    let admin = login(&app, "root", "root-pw").await;

    let (status, _) = send(&app, "POST", "/right", Some(&user), Some(json!({ "model": "Todo", "read": true }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "POST", "/role", Some(&user), Some(json!({ "name": "hackers" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, role) = send(&app, "POST", "/role", Some(&admin), Some(json!({ "name": "auditors" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let rights_uri = format!("/role/{}/rights", role["id"]);

    let (status, body) = send(&app, "POST", &rights_uri, Some(&admin), Some(json!({ "model": "Invoice", "read": true }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, right) = send(&app, "POST", &rights_uri, Some(&admin), Some(json!({ "model": "Todo", "read": true, "only_own": false }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(right["model"], "Todo");
    assert_eq!(right["write"], false);

    let (status, role) = send(&app, "GET", &format!("/role/{}", role["id"]), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(role["rights"], json!([right["id"]]));
}

#[tokio::test]
async fn test_role_assignment_grants_access() {
    let app = app();
    let (alice_id, alice) = register_and_login(&app, "alice").await;
    let (bob_id, bob) = register_and_login(&app, "bob").await;
    let admin = login(&app, "root", "root-pw").await;

    let (_, todo) = send(&app, "POST", "/todo", Some(&alice), Some(json!({ "name": "secret plan" }))).await;
    let todo_uri = format!("/todo/{}", todo["id"]);
    assert_eq!(send(&app, "GET", &todo_uri, Some(&bob), None).await.0, StatusCode::FORBIDDEN);

    let (_, role) = send(&app, "POST", "/role", Some(&admin), Some(json!({ "name": "todo-readers" }))).await;
    let (status, _) = send(
        &app,
        "POST",
        &format!("/role/{}/rights", role["id"]),
        Some(&admin),
        Some(json!({ "model": "Todo", "read": true, "only_own": false })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let membership = format!("/user/{}/roles/{}", bob_id, role["id"]);
    assert_eq!(send(&app, "POST", &membership, Some(&bob), None).await.0, StatusCode::FORBIDDEN);
    assert_eq!(send(&app, "POST", &membership, Some(&admin), None).await.0, StatusCode::NO_CONTENT);

    assert_eq!(send(&app, "GET", &todo_uri, Some(&bob), None).await.0, StatusCode::OK);
    let (status, list) = send(&app, "GET", &format!("/user/{}/todos", alice_id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().map(Vec::len), Some(1));
    // Read-only: writes stay forbidden
    assert_eq!(send(&app, "DELETE", &todo_uri, Some(&bob), None).await.0, StatusCode::FORBIDDEN);

    assert_eq!(send(&app, "DELETE", &membership, Some(&admin), None).await.0, StatusCode::NO_CONTENT);
    assert_eq!(send(&app, "GET", &todo_uri, Some(&bob), None).await.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_logout_and_tokens() {
    let app = app();
    let (_, first) = register_and_login(&app, "alice").await;
    let second = login(&app, "alice", "alice-pw").await;

    let (status, tokens) = send(&app, "GET", "/token", Some(&first), None).await;
    assert_eq!(status, StatusCode::OK);
    let tokens = tokens.as_array().cloned().unwrap_or_default();
    assert_eq!(tokens.len(), 2);
    assert!(tokens.iter().all(|t| t.get("value").is_none()));

    assert_eq!(send(&app, "POST", "/logout", Some(&first), None).await.0, StatusCode::NO_CONTENT);
    assert_eq!(send(&app, "GET", "/todo", Some(&first), None).await.0, StatusCode::UNAUTHORIZED);

    let (_, tokens) = send(&app, "GET", "/token", Some(&second), None).await;
    let remaining = tokens[0]["id"].clone();
    let (_, bob) = register_and_login(&app, "bob").await;
    assert_eq!(
        send(&app, "DELETE", &format!("/token/{}", remaining), Some(&bob), None).await.0,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        send(&app, "DELETE", &format!("/token/{}", remaining), Some(&second), None).await.0,
        StatusCode::NO_CONTENT
    );
    assert_eq!(send(&app, "GET", "/token", Some(&second), None).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deleting_user_removes_sessions_and_todos() {
    let app = app();
    let (alice_id, alice) = register_and_login(&app, "alice").await;
    let admin = login(&app, "root", "root-pw").await;
    let (_, todo) = send(&app, "POST", "/todo", Some(&alice), Some(json!({ "name": "pack" }))).await;

    assert_eq!(send(&app, "DELETE", &format!("/user/{}", alice_id), Some(&alice), None).await.0, StatusCode::NO_CONTENT);
    assert_eq!(send(&app, "GET", "/todo", Some(&alice), None).await.0, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, "GET", &format!("/todo/{}", todo["id"]), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_health_and_openapi() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, doc) = send(&app, "GET", "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/todo/{id}"].is_object());
}
