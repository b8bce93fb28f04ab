//! An in-memory [`DocumentStore`] used by service-level tests. Not
//! compiled for production use; the real adapter is
//! [`crate::adapters::mongodb_store::MongoStore`].

use crate::domain::errors::DbError;
use crate::domain::ports::{ChangeEvent, ChangeSubscription, Collection, DocumentStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<HashMap<&'static str, Vec<serde_json::Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn get_path<'a>(doc: &'a serde_json::Value, dotted: &str) -> Option<&'a serde_json::Value> {
    let mut current = doc;
    for segment in dotted.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn matches(doc: &serde_json::Value, query: &serde_json::Value) -> bool {
    let Some(query) = query.as_object() else {
        return false;
    };
    query
        .iter()
        .all(|(key, expected)| get_path(doc, key) == Some(expected))
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn count_documents(&self, collection: Collection) -> Result<u64, DbError> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection.name())
            .map(|docs| docs.len() as u64)
            .unwrap_or(0))
    }

    async fn insert_one(&self, collection: Collection, document: serde_json::Value) -> Result<(), DbError> {
        let mut collections = self.collections.lock().await;
        collections.entry(collection.name()).or_default().push(document);
        Ok(())
    }

    async fn insert_many(&self, collection: Collection, documents: Vec<serde_json::Value>) -> Result<(), DbError> {
        let mut collections = self.collections.lock().await;
        collections.entry(collection.name()).or_default().extend(documents);
        Ok(())
    }

    async fn find_one_and_replace(
        &self,
        collection: Collection,
        id: &str,
        document: serde_json::Value,
    ) -> Result<(), DbError> {
        let mut collections = self.collections.lock().await;
        let docs = collections.entry(collection.name()).or_default();
        match docs.iter_mut().find(|d| d.get("id").and_then(|v| v.as_str()) == Some(id)) {
            Some(slot) => *slot = document,
            None => docs.push(document),
        }
        Ok(())
    }

    async fn find_ids(&self, collection: Collection) -> Result<Vec<String>, DbError> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection.name())
            .map(|docs| {
                docs.iter()
                    .filter_map(|d| d.get("id").and_then(|v| v.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_one(
        &self,
        collection: Collection,
        query: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, DbError> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection.name())
            .and_then(|docs| docs.iter().find(|d| matches(d, &query)).cloned()))
    }

    async fn update_one(
        &self,
        collection: Collection,
        query: serde_json::Value,
        fields: serde_json::Value,
    ) -> Result<(), DbError> {
        let mut collections = self.collections.lock().await;
        let docs = collections.entry(collection.name()).or_default();
        if let Some(doc) = docs.iter_mut().find(|d| matches(d, &query)) {
            if let (serde_json::Value::Object(target), serde_json::Value::Object(patch)) = (doc, fields) {
                for (key, value) in patch {
                    target.insert(key, value);
                }
            }
        }
        Ok(())
    }

    async fn watch(
        &self,
        _collection: Collection,
        _resume_token: Option<serde_json::Value>,
    ) -> Result<Box<dyn ChangeSubscription>, DbError> {
        Ok(Box::new(EmptySubscription))
    }
}

/// A change stream that has already reached its end. Real tests that
/// need scripted events script the [`ChangeSubscription`] trait
/// directly rather than through this fixed adapter.
struct EmptySubscription;

#[async_trait]
impl ChangeSubscription for EmptySubscription {
    async fn next(&mut self) -> Result<Option<ChangeEvent>, DbError> {
        Ok(None)
    }
}
