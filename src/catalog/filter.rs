use mongodb::bson::{Bson, Document};

use super::CatalogError;

/// Equality-only partial filter expression over dotted paths.
///
/// Conditions are ANDed; the order is kept so the rendered document matches
/// what the server echoes back from `listIndexes`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialFilter {
    conditions: Vec<(String, Bson)>,
}

impl PartialFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.conditions.push((path.into(), value.into()));
        self
    }

    /// Whether a document would be included in the partial index.
    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|(path, expected)| {
            lookup(document, path).is_some_and(|actual| values_equal(actual, expected))
        })
    }

    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        for (path, value) in &self.conditions {
            document.insert(path.clone(), value.clone());
        }
        document
    }

    /// Parse a `partialFilterExpression`. Only `{ path: value }` and
    /// `{ path: { $eq: value } }` conditions are understood.
    pub fn from_document(document: &Document) -> Result<Self, CatalogError> {
        let mut filter = Self::new();
        for (path, value) in document {
            if path.starts_with('$') {
                return Err(CatalogError::Malformed(format!(
                    "unsupported partial filter operator: {path}"
                )));
            }
            let value = match value {
                Bson::Document(inner) if inner.keys().any(|k| k.starts_with('$')) => {
                    match (inner.len(), inner.get("$eq")) {
                        (1, Some(eq)) => eq.clone(),
                        _ => {
                            return Err(CatalogError::Malformed(format!(
                                "unsupported partial filter condition on {path}: {inner}"
                            )))
                        }
                    }
                }
                other => other.clone(),
            };
            filter.conditions.push((path.clone(), value));
        }
        Ok(filter)
    }
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// BSON equality with numeric types compared by value, as the server does.
fn values_equal(actual: &Bson, expected: &Bson) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}
