use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use serde_json::json;

use super::*;
use crate::schema::IssueCode;
use crate::test_support::serve;

#[derive(Debug, Clone, Default)]
struct Seen {
    method: String,
    authorization: Option<String>,
    apikey: Option<String>,
    query: Option<String>,
    body: Option<Value>,
}

type Log = Arc<Mutex<Vec<Seen>>>;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

fn record(log: &Log, method: &str, headers: &HeaderMap, query: Option<String>, body: Option<Value>) -> bool {
    let seen = Seen {
        method: method.to_owned(),
        authorization: header(headers, "authorization"),
        apikey: header(headers, "apikey"),
        query,
        body,
    };
    let authorized = seen.authorization.is_some();
    log.lock().unwrap().push(seen);
    authorized
}

async fn fake_data_api() -> (String, Log) {
    let log: Log = Arc::default();
    let router = Router::new()
        .route(
            "/rest/v1/projects",
            get(|State(log): State<Log>, headers: HeaderMap, RawQuery(query): RawQuery| async move {
                if !record(&log, "GET", &headers, query, None) {
                    return (StatusCode::UNAUTHORIZED, axum::Json(json!({ "message": "JWT required" })));
                }
                (StatusCode::OK, axum::Json(json!([{ "id": "p1", "name": "Growth" }])))
            })
            .post(
                |State(log): State<Log>, headers: HeaderMap, axum::Json(body): axum::Json<Value>| async move {
                    record(&log, "POST", &headers, None, Some(body.clone()));
                    let mut row = body;
                    row["id"] = json!("p_new");
                    (StatusCode::CREATED, axum::Json(json!([row])))
                },
            )
            .patch(
                |State(log): State<Log>,
                 headers: HeaderMap,
                 RawQuery(query): RawQuery,
                 axum::Json(body): axum::Json<Value>| async move {
                    record(&log, "PATCH", &headers, query, Some(body.clone()));
                    (StatusCode::OK, axum::Json(json!([{ "id": "p1", "name": body["name"] }])))
                },
            )
            .delete(|State(log): State<Log>, headers: HeaderMap, RawQuery(query): RawQuery| async move {
                record(&log, "DELETE", &headers, query, None);
                StatusCode::NO_CONTENT
            }),
        )
        .route(
            "/rest/v1/metric_cards",
            get(|State(log): State<Log>, headers: HeaderMap, RawQuery(query): RawQuery| async move {
                record(&log, "GET", &headers, query, None);
                axum::Json(json!([{ "count": 3 }]))
            }),
        )
        .with_state(log.clone());
    (serve(router).await, log)
}

fn factory(base: &str) -> DataClientFactory {
    DataClientFactory::new(format!("{base}/"), "anon-key", HttpTimeouts::default()).unwrap()
}

fn signed_client(base: &str, token: &str) -> DataClient {
    let client = factory(base).create(no_refresh());
    client.set_authorization(Some(&AuthToken::new(token)));
    client
}

/// Counts calls and answers with `token` without installing it anywhere.
fn counting_supplier(token: &'static str, calls: Arc<AtomicUsize>) -> TokenSupplier {
    Arc::new(move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Some(AuthToken::new(token)) })
    })
}

// =============================================================================
// wire helpers
// =============================================================================

#[test]
fn select_columns_defaults_to_star() {
    assert_eq!(select_columns(None), "*");
    assert_eq!(select_columns(Some(&json!({ "id": false }))), "*");
    assert_eq!(select_columns(Some(&json!({ "id": true, "name": true, "x": false }))), "id,name");
}

#[test]
fn filter_pairs_encode_equality_and_null() {
    let pairs = filter_pairs(&json!({ "project_id": "p1", "group_id": null, "value": 2.5, "read": false }));
    assert!(pairs.contains(&("project_id".into(), "eq.p1".into())));
    assert!(pairs.contains(&("group_id".into(), "is.null".into())));
    assert!(pairs.contains(&("value".into(), "eq.2.5".into())));
    assert!(pairs.contains(&("read".into(), "eq.false".into())));
}

#[test]
fn parse_rows_requires_array() {
    assert_eq!(parse_rows("[]").unwrap(), Vec::<Value>::new());
    assert!(matches!(parse_rows("{}"), Err(ClientError::Parse(_))));
    assert!(matches!(first_row("[]"), Err(ClientError::Parse(_))));
}

#[test]
fn set_authorization_formats_bearer() {
    let client = factory("http://127.0.0.1:9").create(no_refresh());
    assert_eq!(client.authorization(), None);
    client.set_authorization(Some(&AuthToken::new("abc")));
    assert_eq!(client.authorization().as_deref(), Some("Bearer abc"));
    client.set_authorization(None);
    assert_eq!(client.authorization(), None);
}

#[test]
fn error_codes_and_retryability() {
    assert_eq!(ClientError::Unauthorized { status: 401, body: String::new() }.error_code(), "E_UNAUTHORIZED");
    assert!(ClientError::Response { status: 503, body: String::new() }.retryable());
    assert!(!ClientError::Response { status: 404, body: String::new() }.retryable());
    assert!(!ClientError::Unauthorized { status: 401, body: String::new() }.retryable());
}

// =============================================================================
// live fake data API
// =============================================================================

#[tokio::test]
async fn select_sends_installed_header_and_api_key() {
    let (base, log) = fake_data_api().await;
    let client = signed_client(&base, "tok_1");

    let rows = client
        .select(Entity::Projects, Some(&json!({ "id": true, "name": true })), Some(&json!({ "owner_id": "u1" })))
        .await
        .unwrap();

    assert_eq!(rows, vec![json!({ "id": "p1", "name": "Growth" })]);
    let seen = log.lock().unwrap()[0].clone();
    assert_eq!(seen.authorization.as_deref(), Some("Bearer tok_1"));
    assert_eq!(seen.apikey.as_deref(), Some("anon-key"));
    let query = seen.query.unwrap();
    assert!(query.contains("select=id%2Cname"), "{query}");
    assert!(query.contains("owner_id=eq.u1"), "{query}");
}

#[tokio::test]
async fn supplier_runs_before_each_request_but_never_writes_header() {
    let (base, log) = fake_data_api().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let client = factory(&base).create(counting_supplier("from_supplier", calls.clone()));
    client.set_authorization(Some(&AuthToken::new("installed")));

    client.select(Entity::Projects, None, None).await.unwrap();
    client.select(Entity::Projects, None, None).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.authorization().as_deref(), Some("Bearer installed"));
    let log = log.lock().unwrap();
    assert!(log.iter().all(|seen| seen.authorization.as_deref() == Some("Bearer installed")));
}

#[tokio::test]
async fn missing_token_surfaces_unauthorized_from_data_api() {
    let (base, log) = fake_data_api().await;
    let client = factory(&base).create(no_refresh());

    let err = client.select(Entity::Projects, None, None).await.unwrap_err();

    assert!(matches!(err, ClientError::Unauthorized { status: 401, .. }));
    assert_eq!(log.lock().unwrap()[0].authorization, None);
}

#[tokio::test]
async fn invalid_insert_never_reaches_network() {
    let (base, log) = fake_data_api().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let client = factory(&base).create(counting_supplier("tok_1", calls.clone()));

    let err = client
        .insert(Entity::Projects, &json!({ "description": "no name" }))
        .await
        .unwrap_err();

    let ClientError::Validation(validation) = err else {
        panic!("expected validation error");
    };
    assert_eq!(validation.issue("name").unwrap().code, IssueCode::Required);
    assert_eq!(validation.issue("owner_id").unwrap().code, IssueCode::Required);
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn insert_posts_validated_body() {
    let (base, log) = fake_data_api().await;
    let client = signed_client(&base, "tok");
    let data = json!({ "name": "Growth", "owner_id": "u1" });

    let row = client.insert(Entity::Projects, &data).await.unwrap();

    assert_eq!(row["id"], "p_new");
    let seen = log.lock().unwrap()[0].clone();
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.body, Some(data));
}

#[tokio::test]
async fn update_and_delete_filter_by_unique_key() {
    let (base, log) = fake_data_api().await;
    let client = signed_client(&base, "tok");

    let row = client
        .update(Entity::Projects, &json!({ "id": "p1" }), &json!({ "name": "Retention" }))
        .await
        .unwrap();
    assert_eq!(row["name"], "Retention");
    client.delete(Entity::Projects, &json!({ "id": "p1" })).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log[0].method, "PATCH");
    assert_eq!(log[0].query.as_deref(), Some("id=eq.p1"));
    assert_eq!(log[1].method, "DELETE");
    assert_eq!(log[1].query.as_deref(), Some("id=eq.p1"));
}

#[tokio::test]
async fn update_without_unique_key_is_rejected() {
    let (base, log) = fake_data_api().await;
    let client = factory(&base).create(no_refresh());
    let err = client
        .update(Entity::Projects, &json!({ "name": "Growth" }), &json!({ "name": "x" }))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "E_VALIDATION");
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn find_unique_returns_first_row() {
    let (base, _log) = fake_data_api().await;
    let client = signed_client(&base, "tok");
    let row = client
        .find_unique(Entity::Projects, &json!({ "id": "p1" }), None)
        .await
        .unwrap();
    assert_eq!(row.unwrap()["id"], "p1");
}

#[tokio::test]
async fn count_reads_aggregate_row() {
    let (base, log) = fake_data_api().await;
    let client = signed_client(&base, "tok");

    let n = client
        .count(Entity::MetricCards, Some(&json!({ "project_id": "p1" })))
        .await
        .unwrap();

    assert_eq!(n, 3);
    let query = log.lock().unwrap()[0].query.clone().unwrap();
    assert!(query.contains("select=count%28%29"), "{query}");
    assert!(query.contains("project_id=eq.p1"), "{query}");
}
