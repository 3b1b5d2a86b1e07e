use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery, JSend};
use crate::catalog::listings_search_index;
use crate::provision::{
    self, ApplyReport, IndexCheck, IndexStatus, ProvisionOptions, SearchCheck,
    VerificationReport,
};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct DeclaredIndex {
    pub name: String,
    pub deprecated: bool,
    pub definition: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub collection: String,
    pub indexes: Vec<DeclaredIndex>,
    pub search: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct IndexCheckResponse {
    pub name: String,
    pub deprecated: bool,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub checked_at: String,
    pub satisfied: bool,
    pub indexes: Vec<IndexCheckResponse>,
    pub search: Option<SearchCheck>,
    pub unmanaged: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    /// Also check the search index.
    #[serde(default)]
    pub search: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApplyParams {
    #[serde(default)]
    pub drop_deprecated: Option<bool>,
    #[serde(default)]
    pub search: Option<bool>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_indexes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<CatalogResponse>>, ApiError> {
    let search = listings_search_index()
        .to_json()
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(JSend::success(CatalogResponse {
        collection: state.config.mongodb.collection.clone(),
        indexes: state
            .catalog
            .iter()
            .map(|spec| DeclaredIndex {
                name: spec.effective_name(),
                deprecated: spec.deprecated,
                definition: spec.to_json(),
            })
            .collect(),
        search,
    }))
}

pub async fn index_status(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<StatusParams>,
) -> Result<Json<JSend<StatusResponse>>, ApiError> {
    let search_index = params
        .search
        .then_some(state.config.provision.search_index_name.as_str());

    let report = provision::verify(state.store.as_ref(), &state.catalog, search_index).await?;
    Ok(JSend::success(report_to_response(report)))
}

pub async fn apply_indexes(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ApplyParams>,
) -> Result<Json<JSend<ApplyReport>>, ApiError> {
    let mut options = ProvisionOptions::from(&state.config.provision);
    if let Some(drop_deprecated) = params.drop_deprecated {
        options.drop_deprecated = drop_deprecated;
    }
    match params.search {
        Some(true) => {
            options.search_index = Some(state.config.provision.search_index_name.clone());
        }
        Some(false) => options.search_index = None,
        None => {}
    }

    let report = provision::apply(state.store.as_ref(), &state.catalog, &options).await?;

    tracing::info!(
        created = report.created.len(),
        dropped = report.dropped.len(),
        conflicts = report.conflicts.len(),
        "Applied index catalog"
    );
    Ok(JSend::success(report))
}

// ============================================================================
// Helpers
// ============================================================================

fn report_to_response(report: VerificationReport) -> StatusResponse {
    StatusResponse {
        checked_at: report.checked_at.to_rfc3339(),
        satisfied: report.is_satisfied(),
        indexes: report.indexes.iter().map(check_to_response).collect(),
        search: report.search,
        unmanaged: report.unmanaged,
    }
}

fn check_to_response(check: &IndexCheck) -> IndexCheckResponse {
    let (status, existing) = match &check.status {
        IndexStatus::Present => ("present", None),
        IndexStatus::Missing => ("missing", None),
        IndexStatus::Mismatch { existing } => ("mismatch", Some(existing.to_json())),
    };
    IndexCheckResponse {
        name: check.name.clone(),
        deprecated: check.deprecated,
        status,
        existing,
    }
}
