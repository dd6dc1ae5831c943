use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query as QueryParams, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use promptshare_core::error::{classify, FailureClass, ServiceError};
use promptshare_core::generation::ModelFallbackExecutor;
use promptshare_core::store::{Filter, RemoteStore, RestStoreClient, Table};
use promptshare_core::{Category, CollectionSynchronizer, GenerationService, LlmClient, Viewer};

const TOTAL_PROMPTS: usize = 25;

#[derive(Clone, Default)]
struct StoreState {
    selects: Arc<Mutex<Vec<HashMap<String, String>>>>,
    api_keys: Arc<Mutex<Vec<Option<String>>>>,
    prefer: Arc<Mutex<Vec<Option<String>>>>,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn prompt_row(i: usize) -> Value {
    json!({
        "id": format!("prompt-{i:05}"),
        "title": format!("Prompt {i}"),
        "content": format!("content {i}"),
        "tags": ["编程"],
        "author_id": "author",
        "author_name": "Author",
        "likes": i,
        "created_at": format!("2025-01-01T00:{i:02}:00Z"),
        "comments": [],
    })
}

async fn select_prompts(
    State(state): State<StoreState>,
    headers: HeaderMap,
    QueryParams(params): QueryParams<HashMap<String, String>>,
) -> Json<Vec<Value>> {
    state.api_keys.lock().unwrap().push(header_value(&headers, "apikey"));
    let offset = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(usize::MAX);
    state.selects.lock().unwrap().push(params);

    let rows = (0..TOTAL_PROMPTS).rev().skip(offset).take(limit).map(prompt_row).collect();
    Json(rows)
}

async fn insert_prompts(
    State(state): State<StoreState>,
    headers: HeaderMap,
    Json(records): Json<Vec<Value>>,
) -> (StatusCode, Json<Vec<Value>>) {
    state.prefer.lock().unwrap().push(header_value(&headers, "prefer"));
    let rows = records
        .into_iter()
        .enumerate()
        .map(|(i, mut record)| {
            record["id"] = json!(format!("server-{i}"));
            record["created_at"] = json!("2025-03-01T12:00:00Z");
            record
        })
        .collect();
    (StatusCode::CREATED, Json(rows))
}

async fn reject_delete() -> (StatusCode, &'static str) {
    (StatusCode::FORBIDDEN, "permission denied for table prompts")
}

async fn select_likes(QueryParams(params): QueryParams<HashMap<String, String>>) -> Json<Vec<Value>> {
    let rows = match params.get("user_id").map(String::as_str) {
        Some("eq.u1") => vec![json!({"prompt_id": "prompt-00003"})],
        _ => Vec::new(),
    };
    Json(rows)
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

async fn store_server() -> (RestStoreClient, StoreState) {
    let state = StoreState::default();
    let app = Router::new()
        .route(
            "/rest/v1/prompts",
            get(select_prompts).post(insert_prompts).delete(reject_delete),
        )
        .route("/rest/v1/likes", get(select_likes))
        .with_state(state.clone());
    let addr = serve(app).await;
    let client = RestStoreClient::new(format!("http://{addr}/"), "anon-key", Duration::from_secs(5))
        .expect("client");
    (client, state)
}

#[tokio::test]
async fn fetch_all_pages_through_postgrest() {
    let (client, state) = store_server().await;
    let (tx, _rx) = flume::unbounded();
    let sync = CollectionSynchronizer::new(Arc::new(client), 10, tx);

    let snapshot = sync
        .fetch_all(Some(&Viewer::new("u1", "Mai")))
        .await
        .expect("fetch");
    assert_eq!(snapshot.len(), TOTAL_PROMPTS);
    assert_eq!(snapshot[0].id, "prompt-00024");

    let liked: Vec<_> = snapshot.iter().filter(|a| a.viewer_has_liked).map(|a| a.id.as_str()).collect();
    assert_eq!(liked, vec!["prompt-00003"]);

    let selects = state.selects.lock().unwrap().clone();
    assert_eq!(selects.len(), 3);
    assert_eq!(selects[0]["select"], "*,comments(*)");
    assert_eq!(selects[0]["order"], "created_at.desc");
    assert_eq!(selects[0]["limit"], "10");
    let offsets: Vec<_> = selects.iter().map(|p| p["offset"].as_str()).collect();
    assert_eq!(offsets, vec!["0", "10", "20"]);
    assert!(state
        .api_keys
        .lock()
        .unwrap()
        .iter()
        .all(|key| key.as_deref() == Some("anon-key")));
}

#[tokio::test]
async fn insert_asks_for_the_stored_representation() {
    let (client, state) = store_server().await;

    let rows = client
        .insert(Table::Prompts, vec![json!({"title": "New", "content": "c"})])
        .await
        .expect("insert");
    assert_eq!(rows[0]["id"], "server-0");
    assert_eq!(
        state.prefer.lock().unwrap().as_slice(),
        &[Some("return=representation".to_string())]
    );
}

#[tokio::test]
async fn forbidden_delete_is_a_fatal_auth_failure() {
    let (client, _state) = store_server().await;

    let err = client
        .delete(Table::Prompts, &[Filter::eq("id", "prompt-00001")])
        .await
        .expect_err("forbidden");
    assert_eq!(classify(&err), FailureClass::FatalAuth);
    assert!(matches!(
        err.downcast_ref::<ServiceError>(),
        Some(ServiceError::Status { status: 403, .. })
    ));
}

#[derive(Clone, Default)]
struct LlmState {
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn completions(State(state): State<LlmState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.bodies.lock().unwrap().push(body.clone());
    let authorized = header_value(&headers, header::AUTHORIZATION.as_str()).as_deref() == Some("Bearer good-key");

    match body["model"].as_str() {
        Some("overloaded") => (StatusCode::SERVICE_UNAVAILABLE, "The model is overloaded").into_response(),
        _ if !authorized => (StatusCode::UNAUTHORIZED, "API key not valid").into_response(),
        Some("empty") => Json(json!({ "choices": [] })).into_response(),
        _ => {
            let content = json!({
                "prompts": [{"title": "Refactor", "description": "d", "content": "Refactor {code}", "tags": ["Cursor"]}]
            });
            Json(json!({
                "choices": [{"message": {"role": "assistant", "content": content.to_string()}}]
            }))
            .into_response()
        }
    }
}

async fn llm_server(key: &str) -> (Arc<LlmClient>, LlmState) {
    let state = LlmState::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(state.clone());
    let addr = serve(app).await;
    let client = LlmClient::new(format!("http://{addr}/v1"), key, Duration::from_secs(5)).expect("client");
    (Arc::new(client), state)
}

#[tokio::test]
async fn rejected_key_is_fatal_until_replaced() {
    let (client, state) = llm_server("stale-key").await;

    let err = client.generate("gemini", "hi", true).await.expect_err("bad key");
    assert_eq!(classify(&err), FailureClass::FatalAuth);

    client.set_credential("good-key".to_string());
    let text = client.generate("gemini", "hi", true).await.expect("accepted");
    assert!(text.contains("Refactor"));

    let bodies = state.bodies.lock().unwrap().clone();
    assert_eq!(bodies[1]["response_format"]["type"], "json_object");
    assert_eq!(bodies[1]["messages"][0]["content"], "hi");
}

#[tokio::test]
async fn overloaded_and_empty_responses_are_classified() {
    let (client, _state) = llm_server("good-key").await;

    let err = client.generate("overloaded", "hi", false).await.expect_err("503");
    assert_eq!(classify(&err), FailureClass::Transient);

    let err = client.generate("empty", "hi", false).await.expect_err("no choices");
    assert!(matches!(
        err.downcast_ref::<ServiceError>(),
        Some(ServiceError::EmptyResponse { .. })
    ));
}

#[tokio::test]
async fn fallback_skips_an_overloaded_model_over_http() {
    let (client, state) = llm_server("good-key").await;
    let executor = ModelFallbackExecutor::new(client, vec!["overloaded".into(), "gemini".into()]);

    let batch = executor.generate_batch(Category::Coding, 1).await.expect("second model answers");
    assert_eq!(batch.items.len(), 1);
    assert_eq!(batch.items[0].tags, vec!["Cursor"]);
    assert_eq!(state.bodies.lock().unwrap().len(), 2);
}
