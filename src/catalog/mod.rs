//! Declared indexes for the `listings` collection.
//!
//! The catalog is plain data: an ordered list of [`IndexSpec`] values plus the
//! Atlas Search mapping. Nothing here talks to a database; the
//! `provision` module compares these declarations with a live collection.

mod filter;
mod search;

pub use filter::PartialFilter;
pub use search::{
    listings_search_index, FieldMapping, SearchIndexDefinition, SearchMappings,
    KEYWORD_ANALYZER, STANDARD_ANALYZER,
};

use mongodb::bson::{doc, Bson, Document};
use serde::Serialize;
use thiserror::Error;

/// Collection every catalog entry targets unless configured otherwise.
pub const LISTINGS_COLLECTION: &str = "listings";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Malformed index document: {0}")]
    Malformed(String),
    #[error("Unsupported key type for field {field}: {value}")]
    UnsupportedKey { field: String, value: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ============================================================================
// Key patterns
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
    /// Non-ordered key type read back from a collection (`2dsphere`, `text`,
    /// `hashed`, ...). The catalog never declares one.
    Special(String),
}

impl SortOrder {
    /// Value of this key in a key pattern document.
    pub fn to_bson(&self) -> Bson {
        match self {
            SortOrder::Ascending => Bson::Int32(1),
            SortOrder::Descending => Bson::Int32(-1),
            SortOrder::Special(kind) => Bson::String(kind.clone()),
        }
    }

    /// Suffix the server appends to a field in a generated index name.
    fn name_suffix(&self) -> String {
        match self {
            SortOrder::Ascending => "1".to_string(),
            SortOrder::Descending => "-1".to_string(),
            SortOrder::Special(kind) => kind.clone(),
        }
    }

    /// Servers report directions as int32, int64 or double depending on how the
    /// index was created, so any non-zero number is accepted.
    fn from_bson(value: &Bson) -> Option<Self> {
        let n = match value {
            Bson::Int32(n) => f64::from(*n),
            Bson::Int64(n) => *n as f64,
            Bson::Double(n) => *n,
            Bson::String(kind) if !kind.is_empty() => {
                return Some(SortOrder::Special(kind.clone()))
            }
            _ => return None,
        };
        if n > 0.0 {
            Some(SortOrder::Ascending)
        } else if n < 0.0 {
            Some(SortOrder::Descending)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexKey {
    pub field: String,
    pub order: SortOrder,
}

impl IndexKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }
}

// ============================================================================
// Collation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collation {
    pub locale: String,
    pub strength: i32,
}

impl Collation {
    /// ICU strength used when a collation document omits it.
    const DEFAULT_STRENGTH: i32 = 3;

    /// English, secondary strength: ignores case, respects accents.
    pub fn case_insensitive() -> Self {
        Self {
            locale: "en".to_string(),
            strength: 2,
        }
    }

    pub fn to_document(&self) -> Document {
        doc! { "locale": self.locale.as_str(), "strength": self.strength }
    }

    /// Parse a collation as reported by `listIndexes`. The server expands every
    /// ICU option (caseLevel, alternate, version, ...); only locale and strength
    /// are compared. The `simple` locale means binary comparison, i.e. none.
    pub fn from_document(document: &Document) -> Result<Option<Self>, CatalogError> {
        let locale = document
            .get_str("locale")
            .map_err(|_| CatalogError::Malformed("collation without locale".to_string()))?;
        if locale == "simple" {
            return Ok(None);
        }

        let strength = match document.get("strength") {
            None => Self::DEFAULT_STRENGTH,
            Some(Bson::Int32(n)) => *n,
            Some(Bson::Int64(n)) => *n as i32,
            Some(Bson::Double(n)) => *n as i32,
            Some(other) => {
                return Err(CatalogError::Malformed(format!(
                    "collation strength is not a number: {other}"
                )))
            }
        };

        Ok(Some(Self {
            locale: locale.to_string(),
            strength,
        }))
    }
}

// ============================================================================
// Index specification
// ============================================================================

/// One `createIndex` declaration: a key pattern plus optional name, collation
/// and partial filter.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub keys: Vec<IndexKey>,
    pub name: Option<String>,
    pub collation: Option<Collation>,
    pub partial_filter: Option<PartialFilter>,
    /// Still declared but scheduled for removal.
    pub deprecated: bool,
}

impl IndexSpec {
    /// Compound (or single-field) index with every field ascending.
    pub fn ascending<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_keys(fields.into_iter().map(IndexKey::asc).collect())
    }

    pub fn with_keys(keys: Vec<IndexKey>) -> Self {
        Self {
            keys,
            name: None,
            collation: None,
            partial_filter: None,
            deprecated: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    pub fn partial_filter(mut self, filter: PartialFilter) -> Self {
        self.partial_filter = Some(filter);
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// The explicit name, or the name the server generates: every
    /// `<field>_<direction>` pair joined with `_`.
    pub fn effective_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.keys
            .iter()
            .map(|k| format!("{}_{}", k.field, k.order.name_suffix()))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn key_document(&self) -> Document {
        let mut key = Document::new();
        for k in &self.keys {
            key.insert(k.field.clone(), k.order.to_bson());
        }
        key
    }

    /// Render the entry submitted in a `createIndexes` command.
    pub fn to_document(&self) -> Document {
        let mut document = doc! {
            "key": self.key_document(),
            "name": self.effective_name(),
        };
        if let Some(collation) = &self.collation {
            document.insert("collation", collation.to_document());
        }
        if let Some(filter) = &self.partial_filter {
            document.insert("partialFilterExpression", filter.to_document());
        }
        document
    }

    /// Relaxed extended JSON of [`Self::to_document`], for reports and rendering.
    pub fn to_json(&self) -> serde_json::Value {
        Bson::Document(self.to_document()).into_relaxed_extjson()
    }

    /// Parse an entry returned by `listIndexes`.
    pub fn from_document(document: &Document) -> Result<Self, CatalogError> {
        let key = document
            .get_document("key")
            .map_err(|_| CatalogError::Malformed("index without key".to_string()))?;

        let mut keys = Vec::with_capacity(key.len());
        for (field, value) in key {
            let order =
                SortOrder::from_bson(value).ok_or_else(|| CatalogError::UnsupportedKey {
                    field: field.clone(),
                    value: value.to_string(),
                })?;
            keys.push(IndexKey {
                field: field.clone(),
                order,
            });
        }
        if keys.is_empty() {
            return Err(CatalogError::Malformed("empty key pattern".to_string()));
        }

        let collation = match document.get_document("collation") {
            Ok(c) => Collation::from_document(c)?,
            Err(_) => None,
        };

        let partial_filter = match document.get_document("partialFilterExpression") {
            Ok(f) => Some(PartialFilter::from_document(f)?),
            Err(_) => None,
        };

        Ok(Self {
            keys,
            name: document.get_str("name").ok().map(str::to_string),
            collation,
            partial_filter,
            deprecated: false,
        })
    }

    /// Key pattern, collation and partial filter: what the server uses to tell
    /// two indexes apart regardless of their names.
    pub fn same_definition(&self, other: &IndexSpec) -> bool {
        self.keys == other.keys
            && self.collation == other.collation
            && self.partial_filter == other.partial_filter
    }

    /// True when `other` is the same index under the same name.
    pub fn matches(&self, other: &IndexSpec) -> bool {
        self.same_definition(other) && self.effective_name() == other.effective_name()
    }
}

// ============================================================================
// The catalog
// ============================================================================

/// Indexes declared for the `listings` collection, in declaration order.
pub fn listings_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::ascending(["listing_id"])
            .named("listingIdIndex")
            .deprecated(),
        IndexSpec::ascending(["listing_id"])
            .named("listingIdIdxWithCollation")
            .collation(Collation::case_insensitive()),
        IndexSpec::ascending(["source_system_key"]).named("sourceSystemKeyIndex"),
        IndexSpec::ascending(["dash.listing_guid"]).named("listingGuidIndex"),
        IndexSpec::ascending(["property.listing.agent_office.list_agent.list_agent_mls_id"])
            .named("listAgentMlsIdIndex"),
        IndexSpec::ascending(["dash.listing_agent_guid"]).named("listingAgentGuidIndex"),
        IndexSpec::ascending(["master_id.list_agent_master_id"]).named("listAgentMasteridIndex"),
        IndexSpec::ascending(["master_id.list_office_master_id"])
            .collation(Collation::case_insensitive()),
        IndexSpec::ascending(["master_id.company_master_id"])
            .collation(Collation::case_insensitive()),
        IndexSpec::ascending([
            "property.location.address.city",
            "property.location.address.state_or_province",
        ])
        .collation(Collation::case_insensitive()),
        IndexSpec::ascending(["property.location.address.postal_code"]).named("postalCodeIndex"),
        IndexSpec::ascending([
            "_source",
            "property.listing.standard_status",
            "property.property_type",
        ])
        .named("index for retrieval by status, source and property type"),
        IndexSpec::ascending(["dash.company_staff_guid"]).collation(Collation::case_insensitive()),
        IndexSpec::ascending(["source_system_key", "last_change_date"])
            .named("sourceSystemKeyLastChangeDateIndex"),
        IndexSpec::ascending([
            "realogy.is_realogy_listing",
            "realogy.is_luxury_listing",
            "property.listing.standard_status",
            "last_change_date",
        ])
        .named("realogyListingsPartialIndex")
        .partial_filter(
            PartialFilter::new()
                .where_eq("realogy.is_realogy_listing", true)
                .where_eq("realogy.is_luxury_listing", true),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_unique() {
        let catalog = listings_indexes();
        let mut names: Vec<String> = catalog.iter().map(IndexSpec::effective_name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), catalog.len());
    }

    #[test]
    fn test_default_name_for_compound_index() {
        let spec = IndexSpec::ascending([
            "property.location.address.city",
            "property.location.address.state_or_province",
        ]);
        assert_eq!(
            spec.effective_name(),
            "property.location.address.city_1_property.location.address.state_or_province_1"
        );
    }

    #[test]
    fn test_default_name_with_descending_key() {
        let spec = IndexSpec::with_keys(vec![IndexKey::asc("a"), IndexKey::desc("b")]);
        assert_eq!(spec.effective_name(), "a_1_b_-1");
    }

    #[test]
    fn test_key_document_preserves_order() {
        let spec = IndexSpec::ascending(["source_system_key", "last_change_date"]);
        let key = spec.key_document();
        let fields: Vec<&String> = key.keys().collect();
        assert_eq!(fields, vec!["source_system_key", "last_change_date"]);
    }

    #[test]
    fn test_from_document_accepts_double_directions() {
        let document = doc! {
            "v": 2,
            "key": { "listing_id": 1.0 },
            "name": "listingIdIndex",
        };
        let spec = IndexSpec::from_document(&document).unwrap();
        assert_eq!(spec.keys, vec![IndexKey::asc("listing_id")]);
        assert_eq!(spec.name.as_deref(), Some("listingIdIndex"));
    }

    #[test]
    fn test_from_document_ignores_expanded_collation_fields() {
        let document = doc! {
            "v": 2,
            "key": { "dash.company_staff_guid": 1 },
            "name": "dash.company_staff_guid_1",
            "collation": {
                "locale": "en",
                "caseLevel": false,
                "caseFirst": "off",
                "strength": 2,
                "numericOrdering": false,
                "alternate": "non-ignorable",
                "maxVariable": "punct",
                "normalization": false,
                "backwards": false,
                "version": "57.1",
            },
        };
        let parsed = IndexSpec::from_document(&document).unwrap();
        let declared =
            IndexSpec::ascending(["dash.company_staff_guid"]).collation(Collation::case_insensitive());
        assert!(declared.matches(&parsed));
    }

    #[test]
    fn test_from_document_reads_special_key_types() {
        let document = doc! { "key": { "_fts": "text", "_ftsx": 1 }, "name": "text_idx" };
        let spec = IndexSpec::from_document(&document).unwrap();
        assert_eq!(spec.keys[0].order, SortOrder::Special("text".to_string()));
        assert_eq!(spec.keys[1].order, SortOrder::Ascending);
        assert_eq!(spec.key_document(), doc! { "_fts": "text", "_ftsx": 1 });

        let geo = IndexSpec::with_keys(vec![IndexKey {
            field: "property.location.geo".to_string(),
            order: SortOrder::Special("2dsphere".to_string()),
        }]);
        assert_eq!(geo.effective_name(), "property.location.geo_2dsphere");
    }

    #[test]
    fn test_from_document_rejects_zero_direction() {
        let document = doc! { "key": { "listing_id": 0 }, "name": "bad" };
        let err = IndexSpec::from_document(&document).unwrap_err();
        assert!(matches!(err, CatalogError::UnsupportedKey { .. }));
    }

    #[test]
    fn test_simple_collation_is_none() {
        let collation = Collation::from_document(&doc! { "locale": "simple" }).unwrap();
        assert!(collation.is_none());
    }

    #[test]
    fn test_matches_requires_same_collation() {
        let plain = IndexSpec::ascending(["listing_id"]).named("listingIdIndex");
        let collated = plain.clone().collation(Collation::case_insensitive());
        assert!(!plain.matches(&collated));
        assert!(!plain.same_definition(&collated));
    }
}
