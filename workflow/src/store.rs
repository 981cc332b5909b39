//! Document store collaborator interface
//!
//! Services reach persistence only through [`DocumentStore`]. The engine
//! never calls it; backends live with the application.

use async_trait::async_trait;
use serde_json::{Map, Value};

/// A stored document: a JSON object with an `_id` field
pub type Document = Map<String, Value>;

/// Field holding a document's identifier
pub const ID_FIELD: &str = "_id";

/// Errors from a document store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cannot {op} non-array field '{field}'")]
    NotAnArray { op: &'static str, field: String },

    #[error("duplicate value for unique field '{field}'")]
    Duplicate { field: String },
}

/// Conjunction of top-level field equalities.
///
/// A `null` operand also matches a missing field. An empty selector
/// matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    fields: Vec<(String, Value)>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select documents whose `_id` equals `id`
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().eq(ID_FIELD, Value::String(id.into()))
    }

    /// Require `field == value`
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.fields.iter().all(|(field, expected)| match document.get(field) {
            Some(actual) => actual == expected,
            None => expected.is_null(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The `(field, value)` equalities, in the order they were added
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(field, value)| (field.as_str(), value))
    }
}

/// Mutation applied by `find_one_and_update`: `$set`, `$push` and `$pull`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    set: Vec<(String, Value)>,
    push: Vec<(String, Value)>,
    pull: Vec<(String, Selector)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `field`
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((field.into(), value.into()));
        self
    }

    /// Append `value` to the array in `field`, creating the array if missing
    pub fn push(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push.push((field.into(), value.into()));
        self
    }

    /// Remove every object element of the array in `field` matching `selector`
    pub fn pull(mut self, field: impl Into<String>, selector: Selector) -> Self {
        self.pull.push((field.into(), selector));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.push.is_empty() && self.pull.is_empty()
    }

    /// Apply to `document` in place. `_id` can never be reassigned.
    pub fn apply(&self, document: &mut Document) -> Result<(), StoreError> {
        for (field, value) in &self.set {
            if field != ID_FIELD {
                document.insert(field.clone(), value.clone());
            }
        }

        for (field, value) in &self.push {
            let slot = document
                .entry(field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if slot.is_null() {
                *slot = Value::Array(Vec::new());
            }
            match slot.as_array_mut() {
                Some(items) => items.push(value.clone()),
                None => {
                    return Err(StoreError::NotAnArray {
                        op: "push to",
                        field: field.clone(),
                    })
                }
            }
        }

        for (field, selector) in &self.pull {
            match document.get_mut(field) {
                Some(Value::Array(items)) => items.retain(|item| match item {
                    Value::Object(obj) => !selector.matches(obj),
                    _ => true,
                }),
                None | Some(Value::Null) => {}
                Some(_) => {
                    return Err(StoreError::NotAnArray {
                        op: "pull from",
                        field: field.clone(),
                    })
                }
            }
        }

        Ok(())
    }
}

/// Read/update-by-selector document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Update the first match and return it as it is after the update
    async fn find_one_and_update(
        &self,
        collection: &str,
        selector: &Selector,
        update: &Update,
    ) -> Result<Option<Document>, StoreError>;

    async fn find_one(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<Option<Document>, StoreError>;

    /// Every match, in insertion order
    async fn find(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<Vec<Document>, StoreError>;

    /// Store `document`, assigning an `_id` when it has none.
    ///
    /// Fails with [`StoreError::Duplicate`] when another document of
    /// `collection` has the same `_id`, or the same value in one of the
    /// `unique` fields. Fields missing or `null` in `document` are not
    /// checked. The check and the insert are one atomic step.
    async fn insert_unique(
        &self,
        collection: &str,
        document: Document,
        unique: &[&str],
    ) -> Result<Document, StoreError>;

    /// Store `document` with only its `_id` required to be unique
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
    ) -> Result<Document, StoreError> {
        self.insert_unique(collection, document, &[]).await
    }

    /// Remove every match and return how many were removed
    async fn delete_many(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<usize, StoreError>;
}
