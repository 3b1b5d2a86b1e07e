//! Shared test helpers for handler tests.

use std::sync::Arc;

use crate::catalog::{listings_indexes, IndexSpec};
use crate::config::{Config, MongoConfig, ProvisionConfig, ServerConfig};
use crate::store::MemoryStore;
use crate::AppState;

/// Create a test AppState backed by an in-memory store that already holds
/// `existing`.
pub fn test_state(existing: Vec<IndexSpec>) -> Arc<AppState> {
    let config = Config {
        mongodb: MongoConfig {
            database: "mls_test".to_string(),
            ..MongoConfig::default()
        },
        provision: ProvisionConfig {
            search_index_name: "listings_search".to_string(),
            ..ProvisionConfig::default()
        },
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            allow_apply: true,
        },
    };

    Arc::new(AppState {
        config,
        catalog: listings_indexes(),
        store: Arc::new(MemoryStore::with_indexes(existing)),
    })
}
