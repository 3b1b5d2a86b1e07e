use std::collections::BTreeMap;

use mongodb::bson::{self, Document};
use serde::{Deserialize, Serialize};

use super::CatalogError;

pub const STANDARD_ANALYZER: &str = "lucene.standard";
pub const KEYWORD_ANALYZER: &str = "lucene.keyword";

fn default_analyzer() -> String {
    STANDARD_ANALYZER.to_string()
}

/// Atlas Search index definition (the body of `createSearchIndexes`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexDefinition {
    #[serde(default = "default_analyzer")]
    pub analyzer: String,
    #[serde(default = "default_analyzer")]
    pub search_analyzer: String,
    pub mappings: SearchMappings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMappings {
    pub dynamic: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
}

impl SearchIndexDefinition {
    pub fn to_json(&self) -> Result<serde_json::Value, CatalogError> {
        serde_json::to_value(self).map_err(|e| CatalogError::Serialization(e.to_string()))
    }

    pub fn to_document(&self) -> Result<Document, CatalogError> {
        bson::to_document(self).map_err(|e| CatalogError::Serialization(e.to_string()))
    }

    /// Parse the `latestDefinition` reported by `$listSearchIndexes`.
    pub fn from_document(document: &Document) -> Result<Self, CatalogError> {
        bson::from_document(document.clone())
            .map_err(|e| CatalogError::Serialization(e.to_string()))
    }

    /// Fields analysed as a single token (exact match).
    pub fn keyword_fields(&self) -> Vec<&str> {
        self.mappings
            .fields
            .iter()
            .filter(|(_, mapping)| mapping.analyzer.as_deref() == Some(KEYWORD_ANALYZER))
            .map(|(field, _)| field.as_str())
            .collect()
    }

    pub fn is_keyword(&self, field: &str) -> bool {
        self.mappings
            .fields
            .get(field)
            .is_some_and(|m| m.analyzer.as_deref() == Some(KEYWORD_ANALYZER))
    }
}

/// Static mapping only: `listing_id` is the single indexed field and is
/// matched exactly.
pub fn listings_search_index() -> SearchIndexDefinition {
    let mut fields = BTreeMap::new();
    fields.insert(
        "listing_id".to_string(),
        FieldMapping {
            field_type: "string".to_string(),
            analyzer: Some(KEYWORD_ANALYZER.to_string()),
        },
    );

    SearchIndexDefinition {
        analyzer: STANDARD_ANALYZER.to_string(),
        search_analyzer: STANDARD_ANALYZER.to_string(),
        mappings: SearchMappings {
            dynamic: false,
            fields,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_renders_expected_json() {
        let rendered = listings_search_index().to_json().unwrap();
        assert_eq!(
            rendered,
            json!({
                "analyzer": "lucene.standard",
                "searchAnalyzer": "lucene.standard",
                "mappings": {
                    "dynamic": false,
                    "fields": {
                        "listing_id": { "type": "string", "analyzer": "lucene.keyword" }
                    }
                }
            })
        );
    }

    #[test]
    fn test_listing_id_is_keyword() {
        let definition = listings_search_index();
        assert!(!definition.mappings.dynamic);
        assert!(definition.is_keyword("listing_id"));
        assert!(!definition.is_keyword("property.location.address.city"));
        assert_eq!(definition.keyword_fields(), vec!["listing_id"]);
    }

    #[test]
    fn test_parses_reported_definition_without_fields() {
        let document = bson::doc! { "mappings": { "dynamic": true } };
        let parsed = SearchIndexDefinition::from_document(&document).unwrap();
        assert_eq!(parsed.analyzer, STANDARD_ANALYZER);
        assert!(parsed.mappings.dynamic);
        assert!(parsed.mappings.fields.is_empty());
    }
}
