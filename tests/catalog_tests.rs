use listings_indexes::catalog::{
    listings_indexes, listings_search_index, Collation, IndexSpec, SortOrder,
};
use mongodb::bson::doc;

fn declared(name: &str) -> IndexSpec {
    listings_indexes()
        .into_iter()
        .find(|spec| spec.effective_name() == name)
        .unwrap_or_else(|| panic!("{name} should be declared"))
}

#[test]
fn test_catalog_covers_declared_indexes() {
    let names: Vec<String> = listings_indexes()
        .iter()
        .map(IndexSpec::effective_name)
        .collect();
    assert_eq!(
        names,
        vec![
            "listingIdIndex",
            "listingIdIdxWithCollation",
            "sourceSystemKeyIndex",
            "listingGuidIndex",
            "listAgentMlsIdIndex",
            "listingAgentGuidIndex",
            "listAgentMasteridIndex",
            "master_id.list_office_master_id_1",
            "master_id.company_master_id_1",
            "property.location.address.city_1_property.location.address.state_or_province_1",
            "postalCodeIndex",
            "index for retrieval by status, source and property type",
            "dash.company_staff_guid_1",
            "sourceSystemKeyLastChangeDateIndex",
            "realogyListingsPartialIndex",
        ]
    );
}

#[test]
fn test_only_legacy_listing_id_index_is_deprecated() {
    let deprecated: Vec<String> = listings_indexes()
        .iter()
        .filter(|spec| spec.deprecated)
        .map(IndexSpec::effective_name)
        .collect();
    assert_eq!(deprecated, vec!["listingIdIndex"]);
}

#[test]
fn test_collated_indexes_are_case_insensitive_english() {
    let collated: Vec<String> = listings_indexes()
        .iter()
        .filter(|spec| spec.collation.is_some())
        .map(|spec| {
            assert_eq!(spec.collation, Some(Collation::case_insensitive()));
            spec.effective_name()
        })
        .collect();
    assert_eq!(collated.len(), 5);
    assert!(collated.contains(&"listingIdIdxWithCollation".to_string()));
    assert!(collated.contains(&"dash.company_staff_guid_1".to_string()));
}

#[test]
fn test_all_keys_ascending() {
    for spec in listings_indexes() {
        assert!(spec.keys.iter().all(|k| k.order == SortOrder::Ascending));
    }
}

#[test]
fn test_compound_status_source_type_document() {
    let spec = declared("index for retrieval by status, source and property type");
    assert_eq!(
        spec.to_document(),
        doc! {
            "key": {
                "_source": 1,
                "property.listing.standard_status": 1,
                "property.property_type": 1,
            },
            "name": "index for retrieval by status, source and property type",
        }
    );
}

#[test]
fn test_city_state_document_carries_collation() {
    let spec = declared(
        "property.location.address.city_1_property.location.address.state_or_province_1",
    );
    assert_eq!(
        spec.to_document(),
        doc! {
            "key": {
                "property.location.address.city": 1,
                "property.location.address.state_or_province": 1,
            },
            "name": "property.location.address.city_1_property.location.address.state_or_province_1",
            "collation": { "locale": "en", "strength": 2 },
        }
    );
}

#[test]
fn test_partial_index_document() {
    let spec = declared("realogyListingsPartialIndex");
    assert_eq!(
        spec.to_document(),
        doc! {
            "key": {
                "realogy.is_realogy_listing": 1,
                "realogy.is_luxury_listing": 1,
                "property.listing.standard_status": 1,
                "last_change_date": 1,
            },
            "name": "realogyListingsPartialIndex",
            "partialFilterExpression": {
                "realogy.is_realogy_listing": true,
                "realogy.is_luxury_listing": true,
            },
        }
    );
}

#[test]
fn test_partial_index_includes_only_realogy_luxury_listings() {
    let filter = declared("realogyListingsPartialIndex")
        .partial_filter
        .expect("partial filter declared");

    let luxury = doc! {
        "listing_id": "L1",
        "realogy": { "is_realogy_listing": true, "is_luxury_listing": true },
        "property": { "listing": { "standard_status": "Active" } },
    };
    let not_luxury = doc! {
        "listing_id": "L2",
        "realogy": { "is_realogy_listing": true, "is_luxury_listing": false },
    };
    let not_realogy = doc! {
        "listing_id": "L3",
        "realogy": { "is_realogy_listing": false, "is_luxury_listing": true },
    };
    let untagged = doc! { "listing_id": "L4" };

    assert!(filter.matches(&luxury));
    assert!(!filter.matches(&not_luxury));
    assert!(!filter.matches(&not_realogy));
    assert!(!filter.matches(&untagged));
}

#[test]
fn test_server_reported_index_matches_declaration() {
    let reported = doc! {
        "v": 2,
        "key": {
            "realogy.is_realogy_listing": 1,
            "realogy.is_luxury_listing": 1,
            "property.listing.standard_status": 1,
            "last_change_date": 1,
        },
        "name": "realogyListingsPartialIndex",
        "partialFilterExpression": {
            "realogy.is_realogy_listing": true,
            "realogy.is_luxury_listing": true,
        },
    };
    let parsed = IndexSpec::from_document(&reported).unwrap();
    assert!(declared("realogyListingsPartialIndex").matches(&parsed));
}

#[test]
fn test_missing_partial_filter_does_not_match() {
    let reported = doc! {
        "v": 2,
        "key": {
            "realogy.is_realogy_listing": 1,
            "realogy.is_luxury_listing": 1,
            "property.listing.standard_status": 1,
            "last_change_date": 1,
        },
        "name": "realogyListingsPartialIndex",
    };
    let parsed = IndexSpec::from_document(&reported).unwrap();
    assert!(!declared("realogyListingsPartialIndex").matches(&parsed));
}

#[test]
fn test_key_order_matters() {
    let declared = declared("sourceSystemKeyLastChangeDateIndex");
    let reversed = IndexSpec::ascending(["last_change_date", "source_system_key"])
        .named("sourceSystemKeyLastChangeDateIndex");
    assert!(!declared.matches(&reversed));
}

#[test]
fn test_search_mapping_is_static_with_keyword_listing_id() {
    let definition = listings_search_index();
    assert_eq!(definition.analyzer, "lucene.standard");
    assert_eq!(definition.search_analyzer, "lucene.standard");
    assert!(!definition.mappings.dynamic);
    assert_eq!(definition.mappings.fields.len(), 1);
    let listing_id = &definition.mappings.fields["listing_id"];
    assert_eq!(listing_id.field_type, "string");
    assert_eq!(listing_id.analyzer.as_deref(), Some("lucene.keyword"));
}

#[test]
fn test_search_document_uses_camel_case() {
    let document = listings_search_index().to_document().unwrap();
    assert_eq!(document.get_str("searchAnalyzer").unwrap(), "lucene.standard");
    assert!(!document.get_document("mappings").unwrap().get_bool("dynamic").unwrap());
}
