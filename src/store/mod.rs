mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use mongodb::bson::Document;
use thiserror::Error;

use crate::catalog::{CatalogError, IndexSpec, SearchIndexDefinition};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Index conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not supported by this deployment: {0}")]
    Unsupported(String),
    #[error("Invalid index document: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// A search index as reported by the deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchIndexInfo {
    pub name: String,
    pub status: Option<String>,
    pub definition: Document,
}

/// Index management for one collection.
/// The server owns index semantics; implementations only submit and list.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Regular indexes, excluding the implicit `_id_` index.
    async fn list_indexes(&self) -> Result<Vec<IndexSpec>, StoreError>;
    async fn create_index(&self, spec: &IndexSpec) -> Result<(), StoreError>;
    async fn drop_index(&self, name: &str) -> Result<(), StoreError>;
    async fn list_search_indexes(&self) -> Result<Vec<SearchIndexInfo>, StoreError>;
    async fn create_search_index(
        &self,
        name: &str,
        definition: &SearchIndexDefinition,
    ) -> Result<(), StoreError>;
}
