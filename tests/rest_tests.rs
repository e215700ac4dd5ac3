//! HTTP-level tests for the REST exposure
//!
//! Requests go through the full stack:
//! JSON → HTTP request → generic handler → dispatcher → store → HTTP response.

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::TestServer;
use exposed::prelude::*;
use serde_json::{Value, json};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    #[serde(default)]
    id: i64,
    title: String,
    #[serde(default)]
    content: String,
}

impl Record for Note {
    type Id = i64;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Secret {
    #[serde(default)]
    id: i64,
    value: String,
}

impl Record for Secret {
    type Id = i64;
}

fn server(builder: ServerBuilder) -> TestServer {
    let router = builder.build().unwrap();
    TestServer::new(router)
}

fn notes_server() -> TestServer {
    server(
        ServerBuilder::new()
            .register(Component::record::<Note>().exposed_with(ExposeMarker::new().rule("permit_all")))
            .register(Component::record::<Secret>().exposed_with(
                ExposeMarker::new()
                    .rule("authenticated")
                    .rule_for(Capability::Delete, "admin_only"),
            )),
    )
}

// =============================================================================
// CRUD round trips
// =============================================================================

#[tokio::test]
async fn test_rest_note_lifecycle() {
    let server = notes_server();

    let response = server.get("/note").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({"data": []}));

    let response = server
        .post("/note")
        .json(&json!({"title": "Groceries", "content": "milk"}))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    assert_eq!(created["id"], 1);
    assert_eq!(created["title"], "Groceries");

    let response = server.get("/note/1").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<Value>(), created);

    let response = server
        .put("/note/1")
        .json(&json!({"content": "oat milk"}))
        .await;
    response.assert_status(StatusCode::OK);
    let updated: Value = response.json();
    assert_eq!(updated["title"], "Groceries");
    assert_eq!(updated["content"], "oat milk");

    server.delete("/note/1").await.assert_status(StatusCode::NO_CONTENT);
    server.get("/note/1").await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rest_list_query_is_ignored_without_paging() {
    let server = notes_server();
    for i in 0..3 {
        server
            .post("/note")
            .json(&json!({"title": format!("n{}", i)}))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let body: Value = server.get("/note?page=2&limit=1").await.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
    assert!(body.get("pagination").is_none());
}

// =============================================================================
// Problem payloads
// =============================================================================

#[tokio::test]
async fn test_rest_problem_payload_shape() {
    let server = notes_server();

    let response = server.get("/note/abc").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.header(header::CONTENT_TYPE),
        HeaderValue::from_static("application/problem+json")
    );

    let problem: ProblemDetail = response.json();
    assert_eq!(problem.code, "BAD_IDENTIFIER");
    assert_eq!(problem.status, 400);
    assert!(problem.detail.contains("abc"));
}

#[tokio::test]
async fn test_rest_unknown_resource() {
    let server = notes_server();
    let response = server.get("/ghost").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let problem: ProblemDetail = response.json();
    assert_eq!(problem.code, "RESOURCE_NOT_FOUND");
}

#[tokio::test]
async fn test_rest_malformed_json_body() {
    let server = notes_server();
    let response = server
        .post("/note")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let problem: ProblemDetail = response.json();
    assert_eq!(problem.code, "INVALID_BODY");
}

#[tokio::test]
async fn test_rest_malformed_query_is_a_problem() {
    let server = notes_server();

    let response = server.get("/note").add_query_param("page", "abc").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.header(header::CONTENT_TYPE),
        "application/problem+json"
    );
    let problem: ProblemDetail = response.json();
    assert_eq!(problem.code, "INVALID_REQUEST");
    assert_eq!(problem.status, 400);

    let response = server.get("/nosuch").add_query_param("page", "abc").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let problem: ProblemDetail = response.json();
    assert_eq!(problem.code, "RESOURCE_NOT_FOUND");
}

#[tokio::test]
async fn test_rest_malformed_input_on_protected_resource_is_forbidden() {
    let server = notes_server();

    let response = server.get("/secret").add_query_param("limit", "-1").await;
    response.assert_status(StatusCode::FORBIDDEN);

    let response = server
        .post("/secret")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let problem: ProblemDetail = response.json();
    assert_eq!(problem.code, "ACCESS_FORBIDDEN");
}

#[tokio::test]
async fn test_rest_undecodable_path_is_a_problem() {
    let server = notes_server();
    let response = server.get("/note/%FF").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let problem: ProblemDetail = response.json();
    assert_eq!(problem.code, "INVALID_REQUEST");
}

#[tokio::test]
async fn test_rest_huge_page_number() {
    let store = InMemoryStore::new(IdentifierKind::Int64, "id")
        .conforming_to::<Note>()
        .with_paging();
    let server = server(
        ServerBuilder::new()
            .register(Component::store::<Note, _>(store).exposed_with(ExposeMarker::new().rule("permit_all"))),
    );
    server
        .post("/note")
        .json(&json!({"title": "only"}))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .get("/note")
        .add_query_param("page", usize::MAX)
        .add_query_param("limit", 100)
        .await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_rest_problem_follows_accept_language() {
    let server = notes_server();

    let response = server
        .get("/note/7")
        .add_header(header::ACCEPT_LANGUAGE, HeaderValue::from_static("fr-CA,fr;q=0.9,en;q=0.5"))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let problem: ProblemDetail = response.json();
    assert_eq!(problem.title, "Enregistrement introuvable");

    let response = server
        .get("/note/7")
        .add_header(header::ACCEPT_LANGUAGE, HeaderValue::from_static("de-DE"))
        .await;
    let problem: ProblemDetail = response.json();
    assert_eq!(problem.title, "Record not found");
}

// =============================================================================
// Authorization through the auth provider
// =============================================================================

#[tokio::test]
async fn test_rest_anonymous_caller_is_forbidden() {
    let server = notes_server();
    let response = server
        .post("/secret")
        .json(&json!({"value": "hunter2"}))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let problem: ProblemDetail = response.json();
    assert_eq!(problem.code, "ACCESS_FORBIDDEN");
}

#[tokio::test]
async fn test_rest_authenticated_caller() {
    let user = AuthContext::User {
        user_id: Uuid::new_v4(),
        tenant_id: None,
        roles: vec![],
    };
    let server = server(
        ServerBuilder::new()
            .with_auth_provider(StaticAuthProvider(user))
            .register(Component::record::<Secret>().exposed_with(
                ExposeMarker::new()
                    .rule("authenticated")
                    .rule_for(Capability::Delete, "admin_only"),
            )),
    );

    server
        .post("/secret")
        .json(&json!({"value": "hunter2"}))
        .await
        .assert_status(StatusCode::CREATED);

    // Delete has its own, stricter rule
    server
        .delete("/secret/1")
        .await
        .assert_status(StatusCode::FORBIDDEN);
    server.get("/secret/1").await.assert_status(StatusCode::OK);
}

// =============================================================================
// Infrastructure routes
// =============================================================================

#[tokio::test]
async fn test_health_routes() {
    let server = notes_server();
    for path in ["/health", "/healthz"] {
        let body: Value = server.get(path).await.json();
        assert_eq!(body["status"], "ok");
    }
}

#[tokio::test]
async fn test_route_index() {
    let server = notes_server();
    let body: Value = server.get("/").await.json();

    let names: Vec<&str> = body["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["note", "secret"]);
    assert_eq!(body["resources"][0]["identifier"], "int64");
    assert_eq!(body["routes"].as_array().unwrap().len(), 10);
    assert_eq!(body["routes"][1]["path"], "/note/{id}");
    assert_eq!(body["routes"][1]["capability"], "get_one");
}

#[tokio::test]
async fn test_custom_routes_take_precedence() {
    let server = server(
        ServerBuilder::new()
            .register(Component::record::<Note>().exposed_with(ExposeMarker::new().rule("permit_all")))
            .with_custom_routes(Router::new().route("/version", get(|| async { "1.0" }))),
    );

    let response = server.get("/version").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.text(), "1.0");
}

#[tokio::test]
async fn test_router_serves_problems_without_test_server() {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    let router = ServerBuilder::new()
        .register(Component::record::<Note>().exposed_with(ExposeMarker::new().rule("permit_all")))
        .build()
        .unwrap();

    let response = router
        .oneshot(Request::get("/note/abc").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/problem+json"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let problem: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(problem["code"], "BAD_IDENTIFIER");
}
