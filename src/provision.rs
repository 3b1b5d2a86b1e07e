//! Plan, apply and verify the catalog against an [`IndexStore`].
//!
//! Declarations are processed one at a time in catalog order. Nothing here
//! second-guesses the server: an index that exists under a declared name with
//! a different definition is reported as a conflict, never rebuilt.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{listings_search_index, IndexSpec, SearchIndexDefinition};
use crate::config::ProvisionConfig;
use crate::store::{IndexStore, StoreError};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Failed to {operation} index {index}: {source}")]
    Index {
        operation: &'static str,
        index: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    pub drop_deprecated: bool,
    /// Create the search definition under this name.
    pub search_index: Option<String>,
}

impl From<&ProvisionConfig> for ProvisionOptions {
    fn from(config: &ProvisionConfig) -> Self {
        Self {
            drop_deprecated: config.drop_deprecated,
            search_index: config
                .apply_search_index
                .then(|| config.search_index_name.clone()),
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Create,
    /// An identical index already exists.
    Keep,
    /// Deprecated and present; removed when deprecated drops are enabled.
    Drop,
    /// Deprecated and already absent.
    Skip,
    /// The name or the definition is taken by a different index.
    Conflict { existing: IndexSpec },
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Keep => "keep",
            Action::Drop => "drop",
            Action::Skip => "skip",
            Action::Conflict { .. } => "conflict",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedIndex {
    pub name: String,
    pub spec: IndexSpec,
    pub action: Action,
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub steps: Vec<PlannedIndex>,
    /// Indexes on the collection that the catalog does not declare.
    pub unmanaged: Vec<IndexSpec>,
}

impl Plan {
    /// Number of steps that would change the collection.
    pub fn pending(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.action, Action::Create | Action::Drop))
            .count()
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &PlannedIndex> {
        self.steps
            .iter()
            .filter(|s| matches!(s.action, Action::Conflict { .. }))
    }

    pub fn is_noop(&self) -> bool {
        self.pending() == 0
    }
}

/// Compare declarations with what the collection already has.
pub fn build_plan(
    catalog: &[IndexSpec],
    existing: &[IndexSpec],
    options: &ProvisionOptions,
) -> Plan {
    let steps = catalog
        .iter()
        .map(|spec| {
            let name = spec.effective_name();
            let current = existing.iter().find(|i| i.effective_name() == name);
            let retiring = spec.deprecated && options.drop_deprecated;

            let action = match (retiring, current) {
                (true, Some(_)) => Action::Drop,
                (true, None) => Action::Skip,
                (false, Some(current)) if spec.matches(current) => Action::Keep,
                (false, Some(current)) => Action::Conflict {
                    existing: current.clone(),
                },
                (false, None) => match existing.iter().find(|i| i.same_definition(spec)) {
                    Some(other) => Action::Conflict {
                        existing: other.clone(),
                    },
                    None => Action::Create,
                },
            };

            PlannedIndex {
                name,
                spec: spec.clone(),
                action,
            }
        })
        .collect();

    let unmanaged = existing
        .iter()
        .filter(|i| {
            let name = i.effective_name();
            !catalog.iter().any(|spec| spec.effective_name() == name)
        })
        .cloned()
        .collect();

    Plan { steps, unmanaged }
}

pub async fn plan(
    store: &dyn IndexStore,
    catalog: &[IndexSpec],
    options: &ProvisionOptions,
) -> Result<Plan, ProvisionError> {
    let existing = store.list_indexes().await?;
    Ok(build_plan(catalog, &existing, options))
}

// ============================================================================
// Apply
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SearchOutcome {
    Created,
    AlreadyExists,
    Unsupported(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub created: Vec<String>,
    pub kept: Vec<String>,
    pub dropped: Vec<String>,
    pub skipped: Vec<String>,
    pub conflicts: Vec<String>,
    pub unmanaged: Vec<String>,
    pub search: Option<SearchOutcome>,
}

impl ApplyReport {
    /// No declaration was left unapplied because of a conflict.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Create missing indexes (and drop retired ones) in catalog order.
pub async fn apply(
    store: &dyn IndexStore,
    catalog: &[IndexSpec],
    options: &ProvisionOptions,
) -> Result<ApplyReport, ProvisionError> {
    let plan = plan(store, catalog, options).await?;
    let mut report = ApplyReport::default();

    for step in &plan.steps {
        match &step.action {
            Action::Create => match store.create_index(&step.spec).await {
                Ok(()) => {
                    info!(index = %step.name, "Created index");
                    report.created.push(step.name.clone());
                }
                // Lost a race with another provisioner, or the server applies
                // stricter identity rules than the plan did.
                Err(StoreError::Conflict(message)) => {
                    warn!(
                        index = %step.name,
                        reason = %message,
                        "Index conflicts with an existing index"
                    );
                    report.conflicts.push(step.name.clone());
                }
                Err(source) => {
                    return Err(ProvisionError::Index {
                        operation: "create",
                        index: step.name.clone(),
                        source,
                    })
                }
            },
            Action::Drop => match store.drop_index(&step.name).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {
                    info!(index = %step.name, "Dropped deprecated index");
                    report.dropped.push(step.name.clone());
                }
                Err(source) => {
                    return Err(ProvisionError::Index {
                        operation: "drop",
                        index: step.name.clone(),
                        source,
                    })
                }
            },
            Action::Keep => {
                debug!(index = %step.name, "Index already present");
                report.kept.push(step.name.clone());
            }
            Action::Skip => {
                debug!(index = %step.name, "Deprecated index already absent");
                report.skipped.push(step.name.clone());
            }
            Action::Conflict { existing } => {
                warn!(
                    index = %step.name,
                    declared = %step.spec.to_json(),
                    existing = %existing.to_json(),
                    "Declared index conflicts with an existing index, leaving it in place"
                );
                report.conflicts.push(step.name.clone());
            }
        }
    }

    for index in &plan.unmanaged {
        info!(index = %index.effective_name(), "Leaving unmanaged index in place");
        report.unmanaged.push(index.effective_name());
    }

    if let Some(name) = &options.search_index {
        report.search = Some(apply_search_index(store, name, &listings_search_index()).await?);
    }

    Ok(report)
}

async fn apply_search_index(
    store: &dyn IndexStore,
    name: &str,
    definition: &SearchIndexDefinition,
) -> Result<SearchOutcome, ProvisionError> {
    let existing = match store.list_search_indexes().await {
        Ok(existing) => existing,
        Err(StoreError::Unsupported(message)) => {
            warn!(
                index = %name,
                reason = %message,
                "Search indexes are not supported by this deployment"
            );
            return Ok(SearchOutcome::Unsupported(message));
        }
        Err(e) => return Err(e.into()),
    };

    if existing.iter().any(|i| i.name == name) {
        debug!(index = %name, "Search index already present");
        return Ok(SearchOutcome::AlreadyExists);
    }

    match store.create_search_index(name, definition).await {
        Ok(()) => {
            info!(index = %name, "Created search index");
            Ok(SearchOutcome::Created)
        }
        Err(StoreError::Unsupported(message)) => {
            warn!(
                index = %name,
                reason = %message,
                "Search indexes are not supported by this deployment"
            );
            Ok(SearchOutcome::Unsupported(message))
        }
        Err(source) => Err(ProvisionError::Index {
            operation: "create search",
            index: name.to_string(),
            source,
        }),
    }
}

// ============================================================================
// Verify
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum IndexStatus {
    Present,
    Missing,
    Mismatch { existing: IndexSpec },
}

#[derive(Debug, Clone)]
pub struct IndexCheck {
    pub name: String,
    pub deprecated: bool,
    pub status: IndexStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SearchStatus {
    Ready,
    Missing,
    Mismatch(String),
    Unsupported(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchCheck {
    pub name: String,
    pub status: SearchStatus,
}

#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub checked_at: DateTime<Utc>,
    pub indexes: Vec<IndexCheck>,
    pub search: Option<SearchCheck>,
    pub unmanaged: Vec<String>,
}

impl VerificationReport {
    /// Every live declaration is present exactly as declared, and the search
    /// index (when checked) is ready with the declared mapping. Deprecated
    /// declarations may be missing.
    pub fn is_satisfied(&self) -> bool {
        let indexes_ok = self
            .indexes
            .iter()
            .all(|c| {
                c.status == IndexStatus::Present
                    || (c.deprecated && c.status == IndexStatus::Missing)
            });
        let search_ok = self
            .search
            .as_ref()
            .map_or(true, |s| s.status == SearchStatus::Ready);
        indexes_ok && search_ok
    }

    pub fn missing(&self) -> impl Iterator<Item = &IndexCheck> {
        self.indexes
            .iter()
            .filter(|c| c.status == IndexStatus::Missing)
    }

    pub fn mismatched(&self) -> impl Iterator<Item = &IndexCheck> {
        self.indexes
            .iter()
            .filter(|c| matches!(c.status, IndexStatus::Mismatch { .. }))
    }
}

/// Check each declaration against the collection, and optionally the search
/// index of the given name.
pub async fn verify(
    store: &dyn IndexStore,
    catalog: &[IndexSpec],
    search_index: Option<&str>,
) -> Result<VerificationReport, ProvisionError> {
    let existing = store.list_indexes().await?;

    let indexes = catalog
        .iter()
        .map(|spec| {
            let name = spec.effective_name();
            let status = match existing.iter().find(|i| i.effective_name() == name) {
                Some(current) if spec.matches(current) => IndexStatus::Present,
                Some(current) => IndexStatus::Mismatch {
                    existing: current.clone(),
                },
                None => IndexStatus::Missing,
            };
            IndexCheck {
                name,
                deprecated: spec.deprecated,
                status,
            }
        })
        .collect();

    let unmanaged = existing
        .iter()
        .map(IndexSpec::effective_name)
        .filter(|name| !catalog.iter().any(|spec| spec.effective_name() == *name))
        .collect();

    let search = match search_index {
        Some(name) => Some(SearchCheck {
            name: name.to_string(),
            status: check_search_index(store, name, &listings_search_index()).await?,
        }),
        None => None,
    };

    Ok(VerificationReport {
        checked_at: Utc::now(),
        indexes,
        search,
        unmanaged,
    })
}

async fn check_search_index(
    store: &dyn IndexStore,
    name: &str,
    expected: &SearchIndexDefinition,
) -> Result<SearchStatus, ProvisionError> {
    let existing = match store.list_search_indexes().await {
        Ok(existing) => existing,
        Err(StoreError::Unsupported(message)) => return Ok(SearchStatus::Unsupported(message)),
        Err(e) => return Err(e.into()),
    };

    let Some(info) = existing.iter().find(|i| i.name == name) else {
        return Ok(SearchStatus::Missing);
    };

    let definition = match SearchIndexDefinition::from_document(&info.definition) {
        Ok(definition) => definition,
        Err(e) => return Ok(SearchStatus::Mismatch(e.to_string())),
    };

    let status = if definition.mappings.dynamic {
        SearchStatus::Mismatch("dynamic field mapping is enabled".to_string())
    } else if !definition.is_keyword("listing_id") {
        SearchStatus::Mismatch("listing_id is not analyzed as a keyword".to_string())
    } else if definition != *expected {
        SearchStatus::Mismatch("definition differs from the declared mapping".to_string())
    } else if info.status.as_deref().is_some_and(|s| s != "READY") {
        SearchStatus::Mismatch(format!(
            "search index is not ready: {}",
            info.status.as_deref().unwrap_or_default()
        ))
    } else {
        SearchStatus::Ready
    };
    Ok(status)
}
