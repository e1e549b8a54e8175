use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Json as JsonResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use application::{
    ApplicationError, CreatedResponse, DatabaseSettings, DiagnosticsService, DocumentStore,
    ListQuery, ListResponse, SchemasResponse, ServiceInfo, SubmissionService, WelcomeMessage,
};
use domain::{Appointment, ContactMessage, DomainError, Record};

pub mod config;

pub const SERVICE_NAME: &str = "Smylor Dental Care API";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    submission_service: Arc<SubmissionService>,
    diagnostics_service: Arc<DiagnosticsService>,
}

impl AppState {
    /// `store` is `None` when no database could be set up; submissions then
    /// fail with 500 and `/test` reports it.
    pub fn new(store: Option<Arc<dyn DocumentStore>>, settings: DatabaseSettings) -> Self {
        Self {
            submission_service: Arc::new(SubmissionService::new(store.clone())),
            diagnostics_service: Arc::new(DiagnosticsService::new(store, settings)),
        }
    }
}

/// All routes, with permissive CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(read_root))
        .route("/api/hello", get(hello))
        .route("/test", get(test_database))
        .route("/schema", get(list_schemas))
        // Appointment Endpoints
        .route(
            "/api/appointments",
            get(list_appointments_handler).post(create_appointment_handler),
        )
        // Contact Endpoints
        .route(
            "/api/contact",
            get(list_contacts_handler).post(submit_contact_handler),
        )
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- API Handlers ---

async fn read_root() -> impl IntoResponse {
    JsonResponse(ServiceInfo {
        name: SERVICE_NAME,
        status: "ok",
    })
}

async fn hello() -> impl IntoResponse {
    JsonResponse(WelcomeMessage {
        message: "Welcome to Smylor Dental Care",
    })
}

/// Handler for the database diagnostic (GET /test). Always 200.
async fn test_database(State(state): State<AppState>) -> impl IntoResponse {
    info!("Diagnostic endpoint called");
    JsonResponse(state.diagnostics_service.report().await)
}

/// Handler for describing the record schemas (GET /schema).
async fn list_schemas() -> impl IntoResponse {
    JsonResponse(SchemasResponse {
        schemas: domain::schemas().to_vec(),
    })
}

async fn create_appointment_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    submit_record::<Appointment>(&state, payload).await
}

async fn list_appointments_handler(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    list_records::<Appointment>(&state, query).await
}

async fn submit_contact_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    submit_record::<ContactMessage>(&state, payload).await
}

async fn list_contacts_handler(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    list_records::<ContactMessage>(&state, query).await
}

/// Shared body of the POST handlers: validate, insert, answer 201.
async fn submit_record<R: Record>(
    state: &AppState,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let collection = R::collection();
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(collection = %collection, "Rejected unreadable request body: {}", rejection.body_text());
            return validation_response(vec![ValidationDetail {
                loc: vec!["body".to_string()],
                msg: rejection.body_text(),
                kind: "json_invalid".to_string(),
            }]);
        }
    };

    info!(collection = %collection, "Received submission");
    match state.submission_service.submit::<R>(&payload).await {
        Ok(id) => {
            info!(collection = %collection, doc_id = %id, "Submission stored via handler");
            (
                StatusCode::CREATED,
                JsonResponse(CreatedResponse {
                    ok: true,
                    id: id.into(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(collection = %collection, "Failed to store submission via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// Shared body of the GET listing handlers.
async fn list_records<R: Record>(
    state: &AppState,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    let collection = R::collection();
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            warn!(collection = %collection, "Rejected listing query: {}", rejection.body_text());
            return validation_response(vec![ValidationDetail {
                loc: vec!["query".to_string(), "limit".to_string()],
                msg: "Input should be a valid non-negative integer".to_string(),
                kind: "int_parsing".to_string(),
            }]);
        }
    };

    info!(collection = %collection, limit = ?query.limit, "Received listing request");
    match state.submission_service.list::<R>(query.limit).await {
        Ok(items) => {
            info!(collection = %collection, count = items.len(), "Listing completed via handler");
            (StatusCode::OK, JsonResponse(ListResponse { ok: true, items })).into_response()
        }
        Err(e) => {
            error!(collection = %collection, "Failed to list submissions via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

// --- Error Mapping ---

/// One entry of a 422 response body.
#[derive(Serialize, Debug)]
struct ValidationDetail {
    loc: Vec<String>,
    msg: String,
    #[serde(rename = "type")]
    kind: String,
}

fn validation_response(details: Vec<ValidationDetail>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        JsonResponse(json!({ "detail": details })),
    )
        .into_response()
}

/// Maps ApplicationError to an HTTP status and JSON body.
/// Validation failures list every field; anything else is a 500 carrying the raw error text.
fn map_application_error_to_response(err: ApplicationError) -> Response {
    match err {
        ApplicationError::Validation(DomainError::InvalidRecord { errors, .. }) => {
            let details = errors
                .into_iter()
                .map(|field_error| {
                    let mut loc = vec!["body".to_string()];
                    loc.extend(field_error.field.map(str::to_string));
                    ValidationDetail {
                        loc,
                        msg: field_error.kind.to_string(),
                        kind: field_error.kind.code().to_string(),
                    }
                })
                .collect();
            validation_response(details)
        }
        other => {
            error!("Request failed: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                JsonResponse(json!({ "detail": other.to_string() })),
            )
                .into_response()
        }
    }
}
