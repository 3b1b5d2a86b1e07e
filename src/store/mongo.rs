use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{CommandError, ErrorKind};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};

use super::{IndexStore, SearchIndexInfo, StoreError};
use crate::catalog::{IndexSpec, SearchIndexDefinition};
use crate::config::MongoConfig;

const NAMESPACE_NOT_FOUND: i32 = 26;
const INDEX_NOT_FOUND: i32 = 27;
const COMMAND_NOT_FOUND: i32 = 59;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
const COMMAND_NOT_SUPPORTED: i32 = 115;
const SEARCH_NOT_ENABLED: i32 = 31082;
const UNRECOGNIZED_PIPELINE_STAGE: i32 = 40324;

/// Index management against a live MongoDB deployment.
pub struct MongoStore {
    database: Database,
    collection: String,
}

impl MongoStore {
    /// Connect and ping before returning, so a bad URI fails here rather than
    /// on the first index command.
    pub async fn connect(config: &MongoConfig) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(&config.uri).await?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.max_pool_size = Some(config.pool_size);
        options.min_pool_size = Some(1);
        options.connect_timeout = Some(Duration::from_secs(config.connect_timeout_secs));
        options.server_selection_timeout =
            Some(Duration::from_secs(config.server_selection_timeout_secs));

        let client = Client::with_options(options)?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;

        tracing::info!(
            database = %config.database,
            collection = %config.collection,
            "Connected to MongoDB"
        );

        let database = client.database(&config.database);
        Ok(Self {
            database,
            collection: config.collection.clone(),
        })
    }

    async fn command(&self, command: Document) -> Result<Document, StoreError> {
        self.database
            .run_command(command, None)
            .await
            .map_err(classify)
    }
}

#[async_trait]
impl IndexStore for MongoStore {
    async fn list_indexes(&self) -> Result<Vec<IndexSpec>, StoreError> {
        let reply = self
            .command(doc! { "listIndexes": self.collection.as_str() })
            .await;
        let Some(response) = unless_missing(reply)? else {
            return Ok(Vec::new());
        };

        // A collection holds at most 64 indexes, well under the default first
        // batch size, so no getMore is needed.
        let batch = response
            .get_document("cursor")
            .and_then(|cursor| cursor.get_array("firstBatch"))
            .map_err(|e| StoreError::Backend(format!("unexpected listIndexes reply: {e}")))?;

        let mut indexes = Vec::with_capacity(batch.len());
        for entry in batch {
            let Bson::Document(document) = entry else {
                return Err(StoreError::Backend(format!(
                    "unexpected listIndexes entry: {entry}"
                )));
            };
            if matches!(document.get_str("name"), Ok("_id_")) {
                continue;
            }
            indexes.push(IndexSpec::from_document(document)?);
        }
        Ok(indexes)
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<(), StoreError> {
        self.command(doc! {
            "createIndexes": self.collection.as_str(),
            "indexes": [spec.to_document()],
        })
        .await?;
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> Result<(), StoreError> {
        self.command(doc! { "dropIndexes": self.collection.as_str(), "index": name })
            .await?;
        Ok(())
    }

    async fn list_search_indexes(&self) -> Result<Vec<SearchIndexInfo>, StoreError> {
        let reply = self
            .database
            .collection::<Document>(&self.collection)
            .aggregate(vec![doc! { "$listSearchIndexes": {} }], None)
            .await
            .map_err(classify_search);
        let Some(cursor) = unless_missing(reply)? else {
            return Ok(Vec::new());
        };
        let documents: Vec<Document> = cursor.try_collect().await.map_err(classify_search)?;

        documents
            .into_iter()
            .map(|document| -> Result<SearchIndexInfo, StoreError> {
                let name = document
                    .get_str("name")
                    .map_err(|_| StoreError::Backend("search index without name".to_string()))?
                    .to_string();
                let status = document.get_str("status").ok().map(str::to_string);
                let definition = document
                    .get_document("latestDefinition")
                    .cloned()
                    .unwrap_or_default();
                Ok(SearchIndexInfo {
                    name,
                    status,
                    definition,
                })
            })
            .collect()
    }

    async fn create_search_index(
        &self,
        name: &str,
        definition: &SearchIndexDefinition,
    ) -> Result<(), StoreError> {
        let command = doc! {
            "createSearchIndexes": self.collection.as_str(),
            "indexes": [{ "name": name, "definition": definition.to_document()? }],
        };
        self.database
            .run_command(command, None)
            .await
            .map_err(classify_search)?;
        Ok(())
    }
}

/// A collection that does not exist yet has no indexes of any kind.
fn unless_missing<T>(reply: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match reply {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn command_error(error: &mongodb::error::Error) -> Option<&CommandError> {
    match error.kind.as_ref() {
        ErrorKind::Command(command) => Some(command),
        _ => None,
    }
}

/// Translate the server error codes the provisioner reacts to.
fn classify(error: mongodb::error::Error) -> StoreError {
    let code = command_error(&error).map(|c| (c.code, c.message.clone()));
    match code {
        Some((INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT, message)) => {
            StoreError::Conflict(message)
        }
        Some((NAMESPACE_NOT_FOUND | INDEX_NOT_FOUND, message)) => StoreError::NotFound(message),
        _ => StoreError::Mongo(error),
    }
}

fn classify_search(error: mongodb::error::Error) -> StoreError {
    let code = command_error(&error).map(|c| (c.code, c.message.clone()));
    match code {
        Some((
            COMMAND_NOT_FOUND | COMMAND_NOT_SUPPORTED | SEARCH_NOT_ENABLED
            | UNRECOGNIZED_PIPELINE_STAGE,
            message,
        )) => StoreError::Unsupported(message),
        _ => classify(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson;

    fn server_error(code: i32) -> mongodb::error::Error {
        let message = format!("server error {code}");
        let command: CommandError = bson::from_document(doc! {
            "code": code,
            "codeName": "TestError",
            "errmsg": message,
        })
        .unwrap();
        mongodb::error::Error::from(ErrorKind::Command(command))
    }

    #[test]
    fn test_index_conflicts_map_to_conflict() {
        for code in [INDEX_OPTIONS_CONFLICT, INDEX_KEY_SPECS_CONFLICT] {
            match classify(server_error(code)) {
                StoreError::Conflict(message) => {
                    assert_eq!(message, format!("server error {code}"))
                }
                other => panic!("code {code} mapped to {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_namespace_and_index_map_to_not_found() {
        for code in [NAMESPACE_NOT_FOUND, INDEX_NOT_FOUND] {
            assert!(
                matches!(classify(server_error(code)), StoreError::NotFound(_)),
                "code {code}"
            );
        }
    }

    #[test]
    fn test_unmapped_code_stays_a_driver_error() {
        // 11000: DuplicateKey
        assert!(matches!(classify(server_error(11000)), StoreError::Mongo(_)));
        assert!(matches!(classify_search(server_error(11000)), StoreError::Mongo(_)));
    }

    #[test]
    fn test_search_unsupported_codes() {
        for code in [
            COMMAND_NOT_FOUND,
            COMMAND_NOT_SUPPORTED,
            SEARCH_NOT_ENABLED,
            UNRECOGNIZED_PIPELINE_STAGE,
        ] {
            assert!(
                matches!(classify_search(server_error(code)), StoreError::Unsupported(_)),
                "code {code}"
            );
            // Outside search commands these are ordinary driver errors.
            assert!(
                matches!(classify(server_error(code)), StoreError::Mongo(_)),
                "code {code}"
            );
        }
    }

    #[test]
    fn test_missing_collection_lists_nothing() {
        let missing: Result<(), StoreError> =
            Err(classify_search(server_error(NAMESPACE_NOT_FOUND)));
        assert!(matches!(unless_missing(missing), Ok(None)));
        assert!(matches!(unless_missing(Ok(3)), Ok(Some(3))));

        let unsupported: Result<(), StoreError> =
            Err(classify_search(server_error(SEARCH_NOT_ENABLED)));
        assert!(matches!(
            unless_missing(unsupported),
            Err(StoreError::Unsupported(_))
        ));
    }

    #[test]
    fn test_search_falls_back_to_index_codes() {
        assert!(matches!(
            classify_search(server_error(NAMESPACE_NOT_FOUND)),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            classify_search(server_error(INDEX_KEY_SPECS_CONFLICT)),
            StoreError::Conflict(_)
        ));
    }
}
