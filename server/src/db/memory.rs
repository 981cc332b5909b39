//! In-process `DocumentStore`

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use kts_workflow::{async_trait, Document, DocumentStore, Selector, StoreError, Update, ID_FIELD};

/// Collections held in memory, each in insertion order
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one_and_update(
        &self,
        collection: &str,
        selector: &Selector,
        update: &Update,
    ) -> Result<Option<Document>, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(document) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| selector.matches(doc)))
        else {
            return Ok(None);
        };

        // Apply to a copy so a failed update leaves the document untouched
        let mut updated = document.clone();
        update.apply(&mut updated)?;
        *document = updated.clone();
        Ok(Some(updated))
    }

    async fn find_one(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| selector.matches(doc)))
            .cloned())
    }

    async fn find(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| selector.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_unique(
        &self,
        collection: &str,
        mut document: Document,
        unique: &[&str],
    ) -> Result<Document, StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        for field in std::iter::once(ID_FIELD).chain(unique.iter().copied()) {
            let Some(value) = document.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            if docs.iter().any(|doc| doc.get(field) == Some(value)) {
                return Err(StoreError::Duplicate {
                    field: field.to_string(),
                });
            }
        }

        if !document.contains_key(ID_FIELD) {
            document.insert(ID_FIELD.to_string(), Uuid::new_v4().to_string().into());
        }
        docs.push(document.clone());
        Ok(document)
    }

    async fn delete_many(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<usize, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !selector.matches(doc));
        Ok(before - docs.len())
    }
}
