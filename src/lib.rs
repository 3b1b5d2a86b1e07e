//! listings-indexes - Declared MongoDB indexes for the `listings` collection
//!
//! This crate provides:
//! - A typed catalog of the collection's indexes and its Atlas Search mapping
//! - Plan / apply / verify against a live collection through [`store::IndexStore`]
//! - A small HTTP status surface for deployment checks

pub mod api;
pub mod catalog;
pub mod config;
pub mod provision;
pub mod store;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use catalog::IndexSpec;
use config::Config;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub catalog: Vec<IndexSpec>,
    pub store: Arc<dyn store::IndexStore>,
}
