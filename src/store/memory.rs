use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{IndexStore, SearchIndexInfo, StoreError};
use crate::catalog::{IndexSpec, SearchIndexDefinition};

/// In-process index store for development and testing.
///
/// Mirrors the server's conflict rules: a name may only be reused for the same
/// definition, and a definition may only exist under one name.
pub struct MemoryStore {
    indexes: Mutex<Vec<IndexSpec>>,
    search_indexes: Mutex<Vec<SearchIndexInfo>>,
    search_supported: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            indexes: Mutex::new(Vec::new()),
            search_indexes: Mutex::new(Vec::new()),
            search_supported: true,
        }
    }

    /// Start with indexes that already exist on the collection.
    pub fn with_indexes(indexes: Vec<IndexSpec>) -> Self {
        let store = Self::new();
        let indexes = indexes.into_iter().map(stored).collect();
        Self {
            indexes: Mutex::new(indexes),
            ..store
        }
    }

    /// Self-managed deployments without mongot reject search commands.
    pub fn with_search_support(mut self, supported: bool) -> Self {
        self.search_supported = supported;
        self
    }
}

/// The server always reports a name and never the catalog-only flags.
fn stored(spec: IndexSpec) -> IndexSpec {
    IndexSpec {
        name: Some(spec.effective_name()),
        deprecated: false,
        ..spec
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn list_indexes(&self) -> Result<Vec<IndexSpec>, StoreError> {
        Ok(self.indexes.lock().await.clone())
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<(), StoreError> {
        let name = spec.effective_name();
        let mut indexes = self.indexes.lock().await;

        if let Some(existing) = indexes.iter().find(|i| i.effective_name() == name) {
            if existing.same_definition(spec) {
                return Ok(());
            }
            return Err(StoreError::Conflict(format!(
                "An existing index has the same name as the requested index: {name}"
            )));
        }

        if let Some(existing) = indexes.iter().find(|i| i.same_definition(spec)) {
            return Err(StoreError::Conflict(format!(
                "Index already exists with a different name: {}",
                existing.effective_name()
            )));
        }

        indexes.push(stored(spec.clone()));
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> Result<(), StoreError> {
        let mut indexes = self.indexes.lock().await;
        let before = indexes.len();
        indexes.retain(|i| i.effective_name() != name);
        if indexes.len() == before {
            return Err(StoreError::NotFound(format!("index not found with name [{name}]")));
        }
        Ok(())
    }

    async fn list_search_indexes(&self) -> Result<Vec<SearchIndexInfo>, StoreError> {
        if !self.search_supported {
            return Err(StoreError::Unsupported(
                "$listSearchIndexes requires Atlas Search".to_string(),
            ));
        }
        Ok(self.search_indexes.lock().await.clone())
    }

    async fn create_search_index(
        &self,
        name: &str,
        definition: &SearchIndexDefinition,
    ) -> Result<(), StoreError> {
        if !self.search_supported {
            return Err(StoreError::Unsupported(
                "createSearchIndexes requires Atlas Search".to_string(),
            ));
        }

        let mut search_indexes = self.search_indexes.lock().await;
        if search_indexes.iter().any(|i| i.name == name) {
            return Err(StoreError::Conflict(format!(
                "Duplicate search index name: {name}"
            )));
        }

        search_indexes.push(SearchIndexInfo {
            name: name.to_string(),
            status: Some("READY".to_string()),
            definition: definition.to_document()?,
        });
        Ok(())
    }
}
