use application::{ApplicationError, DocumentStore};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use domain::{DocumentId, StoredDocument};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Document store kept in process memory.
///
/// Each collection is an append-only list in insertion order, so listing
/// newest-first is a reverse walk.
#[derive(Debug, Clone)]
pub struct InMemoryDocumentStore {
    name: String,
    // Collection Name -> Documents (oldest first)
    collections: Arc<DashMap<String, Vec<Arc<StoredDocument>>>>,
}

impl InMemoryDocumentStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new("smylor")
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, fields))]
    async fn insert(
        &self,
        collection_name: &str,
        mut fields: Map<String, Value>,
    ) -> Result<DocumentId, ApplicationError> {
        let id = DocumentId::new(Uuid::new_v4().simple().to_string());
        let now = Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true));
        fields.insert("created_at".to_string(), now.clone());
        fields.insert("updated_at".to_string(), now);

        debug!(collection = %collection_name, doc_id = %id, "Inserting document into in-memory store");
        // Get or create the list for the collection
        self.collections
            .entry(collection_name.to_string())
            .or_default()
            .push(Arc::new(StoredDocument::new(id.clone(), fields)));
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        collection_name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<StoredDocument>, ApplicationError> {
        debug!(collection = %collection_name, ?limit, "Listing documents from in-memory store");
        let Some(documents) = self.collections.get(collection_name) else {
            return Ok(Vec::new()); // Collection doesn't exist yet
        };
        let documents = documents
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .map(|doc| (**doc).clone())
            .collect();
        Ok(documents)
    }

    #[instrument(skip(self))]
    async fn list_collections(&self) -> Result<Vec<String>, ApplicationError> {
        debug!("Listing collections from in-memory store");
        let mut names: Vec<String> = self
            .collections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }
}
