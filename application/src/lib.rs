use async_trait::async_trait;
use domain::{DocumentId, DomainError, Record, RecordSchema, StoredDocument};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

// --- Application Errors ---
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Database not available. Check DATABASE_URL and DATABASE_NAME environment variables.")]
    StoreUnavailable,
    #[error("{0}")]
    InfrastructureError(String),
    #[error("Domain validation error: {0}")]
    Validation(#[from] DomainError), // Propagate domain errors cleanly
}

// --- Infrastructure Interfaces (Traits) ---

/// The document store all persistence is delegated to.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the underlying database.
    fn name(&self) -> &str;
    /// Inserts a document into a collection and returns its assigned ID.
    async fn insert(
        &self,
        collection_name: &str,
        fields: Map<String, Value>,
    ) -> Result<DocumentId, ApplicationError>;
    /// Returns up to `limit` documents, most recent first. `None` returns all of them.
    async fn list(
        &self,
        collection_name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<StoredDocument>, ApplicationError>;
    /// Lists the names of the collections that hold documents.
    async fn list_collections(&self) -> Result<Vec<String>, ApplicationError>;
}

// --- Request/Response Models (Data Transfer Objects - DTOs) ---

#[derive(Serialize, Debug)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub status: &'static str,
}

#[derive(Serialize, Debug)]
pub struct WelcomeMessage {
    pub message: &'static str,
}

/// Response to a successful submission.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct CreatedResponse {
    pub ok: bool,
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ListResponse {
    pub ok: bool,
    pub items: Vec<Map<String, Value>>,
}

/// Query string for the listing endpoints.
#[derive(Deserialize, Debug, Default)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Serialize, Debug)]
pub struct SchemasResponse {
    pub schemas: Vec<&'static RecordSchema>,
}

/// Output of the `/test` diagnostic endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DiagnosticReport {
    pub backend: String,
    pub database: String,
    pub database_url: Option<String>,
    pub database_name: Option<String>,
    pub connection_status: String,
    pub collections: Vec<String>,
}

pub const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_REPORTED_COLLECTIONS: usize = 10;
const MAX_REPORTED_ERROR_CHARS: usize = 50;

/// A `limit` of zero means no limit; an absent one means the default page.
pub fn effective_limit(requested: Option<usize>) -> Option<usize> {
    match requested {
        None => Some(DEFAULT_LIST_LIMIT),
        Some(0) => None,
        Some(n) => Some(n),
    }
}

// --- Application Services (Use Cases) ---

/// Validates submissions and hands them to the store.
pub struct SubmissionService {
    store: Option<Arc<dyn DocumentStore>>,
}

impl SubmissionService {
    pub fn new(store: Option<Arc<dyn DocumentStore>>) -> Self {
        Self { store }
    }

    fn store(&self) -> Result<&Arc<dyn DocumentStore>, ApplicationError> {
        self.store.as_ref().ok_or_else(|| {
            warn!("Document store is not configured");
            ApplicationError::StoreUnavailable
        })
    }

    /// Validates `payload` as `R` and inserts it. The store is only touched once
    /// validation has passed.
    #[instrument(skip(self, payload), fields(collection = %R::collection()))]
    pub async fn submit<R: Record>(&self, payload: &Value) -> Result<DocumentId, ApplicationError> {
        info!("Attempting to store submission");

        let record = R::parse(payload).inspect_err(|e| {
            warn!(collection = %R::collection(), "Submission rejected: {}", e);
        })?;
        let fields = record.to_fields()?;
        debug!(collection = %R::collection(), "Submission validated against schema");

        let store = self.store()?;
        match store.insert(R::collection(), fields).await {
            Ok(id) => {
                info!(collection = %R::collection(), doc_id = %id, "Submission stored successfully");
                Ok(id)
            }
            Err(e) => {
                error!(collection = %R::collection(), "Failed to store submission: {}", e);
                Err(e)
            }
        }
    }

    /// Lists stored `R` records, each exposing its ID as `id`.
    #[instrument(skip(self), fields(collection = %R::collection()))]
    pub async fn list<R: Record>(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<Map<String, Value>>, ApplicationError> {
        let limit = effective_limit(limit);
        info!(?limit, "Attempting to list submissions");

        let store = self.store()?;
        let documents = store.list(R::collection(), limit).await.inspect_err(|e| {
            error!(collection = %R::collection(), "Failed to list submissions: {}", e);
        })?;
        debug!(collection = %R::collection(), count = documents.len(), "Submissions fetched");

        Ok(documents.into_iter().map(StoredDocument::into_item).collect())
    }
}

/// Which database settings were present in the environment at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub url_set: bool,
    pub name_set: bool,
}

/// Builds the `/test` report. Never fails: every problem becomes text in the report.
pub struct DiagnosticsService {
    store: Option<Arc<dyn DocumentStore>>,
    settings: DatabaseSettings,
}

fn set_flag(set: bool) -> String {
    let flag = if set { "✅ Set" } else { "❌ Not Set" };
    flag.to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

impl DiagnosticsService {
    pub fn new(store: Option<Arc<dyn DocumentStore>>, settings: DatabaseSettings) -> Self {
        Self { store, settings }
    }

    #[instrument(skip(self))]
    pub async fn report(&self) -> DiagnosticReport {
        info!("Gathering database diagnostics");

        let mut report = DiagnosticReport {
            backend: "✅ Running".to_string(),
            database: "❌ Not Available".to_string(),
            database_url: None,
            database_name: None,
            connection_status: "Not Connected".to_string(),
            collections: Vec::new(),
        };

        match &self.store {
            Some(store) => {
                report.database = "✅ Available".to_string();
                report.database_url = Some("✅ Configured".to_string());
                report.database_name = Some(store.name().to_string());
                report.connection_status = "Connected".to_string();

                match store.list_collections().await {
                    Ok(collections) => {
                        report.collections = collections
                            .into_iter()
                            .take(MAX_REPORTED_COLLECTIONS)
                            .collect();
                        report.database = "✅ Connected & Working".to_string();
                    }
                    Err(e) => {
                        warn!("Database reachable but listing collections failed: {}", e);
                        report.database = format!(
                            "⚠️  Connected but Error: {}",
                            truncate_chars(&e.to_string(), MAX_REPORTED_ERROR_CHARS)
                        );
                    }
                }
            }
            None => {
                report.database = "⚠️  Available but not initialized".to_string();
            }
        }

        // The startup flags win over whatever the store reported
        report.database_url = Some(set_flag(self.settings.url_set));
        report.database_name = Some(set_flag(self.settings.name_set));

        debug!(?report, "Diagnostics gathered");
        report
    }
}
