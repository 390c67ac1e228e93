// libs/shared/database/src/memory.rs
use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::store::{Document, DocumentStore, Query};

type Collection = BTreeMap<String, Value>;

/// In-process document store evaluating the same query model as the
/// PostgREST-backed client. Used by tests and by the API when no remote
/// store is configured.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    failure: RwLock<Option<String>>,
    collection_failures: RwLock<HashMap<String, String>>,
    query_counts: Mutex<HashMap<String, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `message` until cleared.
    pub async fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write().await = Some(message.into());
    }

    /// Like `fail_with`, but only calls touching `collection` fail.
    pub async fn fail_collection_with(&self, collection: &str, message: impl Into<String>) {
        self.collection_failures
            .write()
            .await
            .insert(collection.to_string(), message.into());
    }

    pub async fn clear_failure(&self) {
        *self.failure.write().await = None;
        self.collection_failures.write().await.clear();
    }

    /// Number of queries issued against `collection` so far.
    pub async fn query_count(&self, collection: &str) -> usize {
        self.query_counts.lock().await.get(collection).copied().unwrap_or(0)
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    async fn check_failure(&self, collection: &str) -> Result<()> {
        if let Some(message) = self.failure.read().await.as_ref() {
            return Err(anyhow!("{}", message));
        }
        match self.collection_failures.read().await.get(collection) {
            Some(message) => Err(anyhow!("{}: {}", collection, message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn add(&self, collection: &str, data: Value) -> Result<String> {
        self.check_failure(collection).await?;
        let id = Uuid::new_v4().to_string();
        debug!("memory add {}/{}", collection, id);

        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.check_failure(collection).await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        self.check_failure(collection).await?;
        debug!("memory set {}/{}", collection, id);

        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        self.check_failure(&query.collection).await?;
        *self
            .query_counts
            .lock()
            .await
            .entry(query.collection.clone())
            .or_default() += 1;

        let collections = self.collections.read().await;
        let Some(docs) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<Document> = docs
            .iter()
            .filter(|(_, data)| query.matches(data))
            .map(|(id, data)| Document::new(id.clone(), data.clone()))
            .filter(|document| query.is_after_cursor(document))
            .collect();

        results.sort_by(|a, b| query.compare(a, b));
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        debug!("memory query {} -> {} documents", query.collection, results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Direction;
    use serde_json::json;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, date, status) in [
            ("a1", 100, "approved"),
            ("a2", 200, "pending"),
            ("a3", 300, "rejected"),
            ("a4", 300, "approved"),
            ("a5", 400, "approved"),
        ] {
            store
                .set("appointments", id, json!({ "doctor_id": "d1", "selected_date": date, "approval_status": status }))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn add_generates_distinct_ids() {
        let store = MemoryStore::new();
        let first = store.add("symptoms", json!({ "user_id": "u1" })).await.unwrap();
        let second = store.add("symptoms", json!({ "user_id": "u1" })).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.len("symptoms").await, 2);
        let fetched = store.get("symptoms", &first).await.unwrap().unwrap();
        assert_eq!(fetched.data, json!({ "user_id": "u1" }));
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = seeded().await;
        let query = Query::collection("appointments")
            .where_eq("doctor_id", "d1")
            .where_in("approval_status", ["approved", "rejected"])
            .order_by("selected_date", Direction::Descending)
            .limit(3);

        let ids: Vec<String> = store.query(&query).await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a5", "a4", "a3"]);
    }

    #[tokio::test]
    async fn start_after_resumes_without_overlap() {
        let store = seeded().await;
        let base = Query::collection("appointments")
            .order_by("selected_date", Direction::Descending)
            .limit(2);

        let first = store.query(&base).await.unwrap();
        let cursor = first.last().map(|doc| doc.cursor("selected_date"));
        let second = store.query(&base.clone().start_after(cursor)).await.unwrap();

        let first_ids: Vec<_> = first.iter().map(|d| d.id.as_str()).collect();
        let second_ids: Vec<_> = second.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(first_ids, vec!["a5", "a4"]);
        assert_eq!(second_ids, vec!["a3", "a2"]);
    }

    #[tokio::test]
    async fn injected_failure_surfaces_and_clears() {
        let store = seeded().await;
        store.fail_with("permission denied").await;

        let err = store.get("appointments", "a1").await.unwrap_err();
        assert!(err.to_string().contains("permission denied"));

        store.clear_failure().await;
        assert!(store.get("appointments", "a1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn collection_failure_leaves_other_collections_working() {
        let store = seeded().await;
        store.fail_collection_with("user_data", "timeout").await;

        let err = store.query(&Query::collection("user_data")).await.unwrap_err();
        assert!(err.to_string().contains("timeout"));
        assert!(store.get("appointments", "a1").await.unwrap().is_some());

        store.clear_failure().await;
        assert!(store.query(&Query::collection("user_data")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn counts_queries_per_collection() {
        let store = seeded().await;
        store.query(&Query::collection("appointments")).await.unwrap();
        store.query(&Query::collection("user_data")).await.unwrap();
        store.query(&Query::collection("appointments")).await.unwrap();

        assert_eq!(store.query_count("appointments").await, 2);
        assert_eq!(store.query_count("user_data").await, 1);
        assert_eq!(store.query_count("symptoms").await, 0);
    }
}
