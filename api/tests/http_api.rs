use api::{AppState, build_router};
use application::{ApplicationError, DatabaseSettings, DocumentStore};
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use domain::{DocumentId, StoredDocument};
use infrastructure::InMemoryDocumentStore;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

/// Store whose every call fails, counting how often it was reached.
#[derive(Default)]
struct UnreachableStore {
    calls: AtomicUsize,
}

#[async_trait]
impl DocumentStore for UnreachableStore {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn insert(
        &self,
        _collection_name: &str,
        _fields: Map<String, Value>,
    ) -> Result<DocumentId, ApplicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ApplicationError::InfrastructureError(
            "localhost:27017: Connection refused".to_string(),
        ))
    }

    async fn list(
        &self,
        _collection_name: &str,
        _limit: Option<usize>,
    ) -> Result<Vec<StoredDocument>, ApplicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ApplicationError::InfrastructureError(
            "localhost:27017: Connection refused".to_string(),
        ))
    }

    async fn list_collections(&self) -> Result<Vec<String>, ApplicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ApplicationError::InfrastructureError(
            "localhost:27017: Connection refused".to_string(),
        ))
    }
}

const CONFIGURED: DatabaseSettings = DatabaseSettings {
    url_set: true,
    name_set: true,
};

fn app_with<S: DocumentStore + 'static>(store: Arc<S>) -> Router {
    let store: Arc<dyn DocumentStore> = store;
    build_router(AppState::new(Some(store), CONFIGURED))
}

fn app_without_store() -> Router {
    build_router(AppState::new(None, CONFIGURED))
}

fn in_memory_app() -> Router {
    app_with(Arc::new(InMemoryDocumentStore::default()))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    post_raw(app, uri, body.to_string()).await
}

async fn post_raw(app: &Router, uri: &str, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

fn appointment(name: &str) -> Value {
    json!({
        "full_name": name,
        "email": "patient@example.com",
        "phone": "+1 555 0100",
        "preferred_date": "2025-02-14",
        "preferred_time": "10:30 AM",
        "service": "Whitening",
        "notes": "First visit"
    })
}

#[tokio::test]
async fn root_reports_service_name_regardless_of_storage() {
    for app in [in_memory_app(), app_without_store()] {
        let (status, body) = get(&app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "name": "Smylor Dental Care API", "status": "ok" })
        );
    }
}

#[tokio::test]
async fn hello_returns_welcome_message() {
    let (status, body) = get(&in_memory_app(), "/api/hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Welcome to Smylor Dental Care" }));
}

#[tokio::test]
async fn contact_submission_returns_created_with_id() {
    let app = in_memory_app();
    let (status, body) = post_json(
        &app,
        "/api/contact",
        json!({ "name": "Jo", "email": "jo@x.com", "message": "Hi" }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ok"], json!(true));
    assert!(!body["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn appointment_round_trips_through_listing() {
    let app = in_memory_app();
    let (status, created) = post_json(&app, "/api/appointments", appointment("Ada")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, listed) = get(&app, "/api/appointments").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["ok"], json!(true));

    let items = listed["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item["id"], created["id"]);
    for (key, value) in appointment("Ada").as_object().unwrap() {
        assert_eq!(&item[key], value, "field {} should round-trip", key);
    }
    assert_eq!(item["source"], json!("website"));
    assert!(item["created_at"].is_string());
    assert!(item.get("_id").is_none());
}

#[tokio::test]
async fn listing_honours_limit_and_newest_first() {
    let app = in_memory_app();
    for name in ["first", "second", "third"] {
        post_json(&app, "/api/appointments", appointment(name)).await;
    }

    let (_, limited) = get(&app, "/api/appointments?limit=2").await;
    let names: Vec<_> = limited["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["full_name"].clone())
        .collect();
    assert_eq!(names, vec![json!("third"), json!("second")]);

    let (_, everything) = get(&app, "/api/appointments?limit=0").await;
    assert_eq!(everything["items"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn listings_are_separated_by_collection() {
    let app = in_memory_app();
    post_json(&app, "/api/appointments", appointment("Ada")).await;
    post_json(
        &app,
        "/api/contact",
        json!({ "name": "Jo", "email": "jo@x.com", "message": "Hi", "subject": "Hours" }),
    )
    .await;

    let (_, contacts) = get(&app, "/api/contact").await;
    let items = contacts["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["subject"], json!("Hours"));
    assert_eq!(items[0]["sent_at"], Value::Null);
}

#[tokio::test]
async fn missing_required_fields_are_rejected_before_storage() {
    let store = Arc::new(UnreachableStore::default());
    let app = app_with(store.clone());

    let (status, body) = post_json(
        &app,
        "/api/appointments",
        json!({ "phone": "555", "email": "someone@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["detail"],
        json!([{ "loc": ["body", "full_name"], "msg": "Field required", "type": "missing" }])
    );

    let (status, body) = post_json(&app, "/api/contact", json!({ "name": "Jo" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let locs: Vec<_> = body["detail"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["loc"][1].clone())
        .collect();
    assert_eq!(locs, vec![json!("email"), json!("message")]);

    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_email_is_rejected() {
    let (status, body) = post_json(
        &in_memory_app(),
        "/api/contact",
        json!({ "name": "Jo", "email": "jo-at-x.com", "message": "Hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["loc"], json!(["body", "email"]));
    assert_eq!(body["detail"][0]["type"], json!("value_error"));
}

#[tokio::test]
async fn unreadable_bodies_and_queries_are_rejected() {
    let app = in_memory_app();

    let (status, body) = post_raw(&app, "/api/contact", "{not json".to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["loc"], json!(["body"]));

    let (status, body) = post_json(&app, "/api/contact", json!("just a string")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["type"], json!("dict_type"));

    let (status, body) = get(&app, "/api/contact?limit=-1").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["loc"], json!(["query", "limit"]));
}

#[tokio::test]
async fn storage_failures_surface_as_500_with_raw_text() {
    let app = app_with(Arc::new(UnreachableStore::default()));

    let (status, body) = post_json(
        &app,
        "/api/contact",
        json!({ "name": "Jo", "email": "jo@x.com", "message": "Hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "detail": "localhost:27017: Connection refused" }));

    let (status, body) = get(&app, "/api/appointments?limit=5").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], json!("localhost:27017: Connection refused"));
}

#[tokio::test]
async fn absent_storage_fails_submissions_with_500() {
    let app = app_without_store();
    let (status, body) = post_json(&app, "/api/appointments", appointment("Ada")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Database not available")
    );
}

#[tokio::test]
async fn diagnostic_endpoint_never_fails() {
    // Storage absent
    let (status, absent) = get(&app_without_store(), "/test").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(absent["backend"], json!("✅ Running"));
    assert_eq!(absent["database"], json!("⚠️  Available but not initialized"));
    assert_eq!(absent["connection_status"], json!("Not Connected"));

    // Storage present but unreachable
    let (status, unreachable) =
        get(&app_with(Arc::new(UnreachableStore::default())), "/test").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        unreachable["database"],
        json!("⚠️  Connected but Error: localhost:27017: Connection refused")
    );
    assert_eq!(unreachable["connection_status"], json!("Connected"));
    assert_eq!(unreachable["collections"], json!([]));

    // Storage working
    let app = in_memory_app();
    post_json(&app, "/api/appointments", appointment("Ada")).await;
    let (status, working) = get(&app, "/test").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(working["database"], json!("✅ Connected & Working"));
    assert_eq!(working["collections"], json!(["appointment"]));
    assert_eq!(working["database_url"], json!("✅ Set"));
    assert_eq!(working["database_name"], json!("✅ Set"));

    assert_ne!(absent["database"], unreachable["database"]);
    assert_ne!(unreachable["database"], working["database"]);
}

#[tokio::test]
async fn diagnostic_reports_unset_configuration() {
    let app = build_router(AppState::new(None, DatabaseSettings::default()));
    let (_, body) = get(&app, "/test").await;
    assert_eq!(body["database_url"], json!("❌ Not Set"));
    assert_eq!(body["database_name"], json!("❌ Not Set"));
}

#[tokio::test]
async fn schema_endpoint_describes_record_kinds() {
    let (status, body) = get(&in_memory_app(), "/schema").await;
    assert_eq!(status, StatusCode::OK);
    let schemas = body["schemas"].as_array().unwrap();
    assert_eq!(schemas.len(), 2);
    assert_eq!(schemas[0]["collection"], json!("appointment"));
    assert_eq!(schemas[1]["collection"], json!("contactmessage"));
    assert_eq!(schemas[0]["fields"][7]["default"], json!("website"));
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let app = in_memory_app();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/contact")
        .header(header::ORIGIN, "https://smylor.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://smylor.example"
    );
    assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
}
