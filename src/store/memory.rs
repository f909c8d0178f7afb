//! Process-local event store.
//!
//! Records live in a map of partitions, each partition a `BTreeMap` keyed
//! by `session_id` so reads come back in sort-key order. Nothing survives a
//! restart; use [`RedisStore`](super::RedisStore) for durability.

use super::{check_key, check_record_keys, EventStore, Page, StoreError, DEFAULT_PAGE_SIZE};
use crate::event::{EventRecord, EVENT_TYPE_FIELD};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory [`EventStore`].
#[derive(Debug)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<String, BTreeMap<String, EventRecord>>>,
    page_size: usize,
}

impl MemoryStore {
    /// Create an empty store with the default page size
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create an empty store that returns at most `page_size` records per page
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Total number of records across all partitions
    pub async fn len(&self) -> usize {
        self.partitions
            .read()
            .await
            .values()
            .map(|partition| partition.len())
            .sum()
    }

    /// Returns true if no record has been stored
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Fetch a single record by its full key
    pub async fn get(&self, event_type: &str, session_id: &str) -> Option<EventRecord> {
        self.partitions
            .read()
            .await
            .get(event_type)
            .and_then(|partition| partition.get(session_id))
            .cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, record: &EventRecord) -> Result<(), StoreError> {
        check_record_keys(record)?;

        let mut partitions = self.partitions.write().await;
        let replaced = partitions
            .entry(record.partition_key().to_string())
            .or_default()
            .insert(record.sort_key().to_string(), record.clone())
            .is_some();

        debug!(
            event_type = %record.partition_key(),
            session_id = %record.sort_key(),
            replaced,
            "Stored record in memory"
        );

        Ok(())
    }

    async fn query_page(
        &self,
        event_type: &str,
        start_after: Option<&str>,
    ) -> Result<Page, StoreError> {
        check_key(EVENT_TYPE_FIELD, event_type)?;

        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.get(event_type) else {
            return Ok(Page::default());
        };

        let lower = match start_after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        let items: Vec<EventRecord> = partition
            .range::<str, _>((lower, Bound::Unbounded))
            .take(self.page_size)
            .map(|(_, record)| record.clone())
            .collect();

        Ok(Page::from_items(items, self.page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_query() {
        let store = MemoryStore::new();
        store.put(&EventRecord::new("page_view", "s1")).await.unwrap();

        let records = store.query_by_partition_key("page_view").await.unwrap();
        assert_eq!(records, vec![EventRecord::new("page_view", "s1")]);
    }

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let store = MemoryStore::new();
        store.put(&EventRecord::new("page_view", "s1")).await.unwrap();
        store.put(&EventRecord::new("page_view", "s1")).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert!(store.get("page_view", "s1").await.is_some());
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let store = MemoryStore::new();
        store.put(&EventRecord::new("page_view", "s1")).await.unwrap();
        store.put(&EventRecord::new("click", "s1")).await.unwrap();
        store.put(&EventRecord::new("click", "s2")).await.unwrap();

        assert_eq!(store.query_by_partition_key("page_view").await.unwrap().len(), 1);
        assert_eq!(store.query_by_partition_key("click").await.unwrap().len(), 2);
        assert!(store.query_by_partition_key("purchase").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_returns_sort_key_order() {
        let store = MemoryStore::new();
        for session in ["s3", "s1", "s2"] {
            store.put(&EventRecord::new("click", session)).await.unwrap();
        }

        let sessions: Vec<String> = store
            .query_by_partition_key("click")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(sessions, vec!["s1", "s2", "s3"]);
    }

    #[tokio::test]
    async fn test_query_page_respects_page_size() {
        let store = MemoryStore::with_page_size(2);
        for session in ["a", "b", "c"] {
            store.put(&EventRecord::new("click", session)).await.unwrap();
        }

        let first = store.query_page("click", None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.last_evaluated_key, Some("b".to_string()));

        let second = store.query_page("click", Some("b")).await.unwrap();
        assert_eq!(second.items, vec![EventRecord::new("click", "c")]);
        assert_eq!(second.last_evaluated_key, None);

        assert_eq!(store.query_by_partition_key("click").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_keys_rejected() {
        let store = MemoryStore::new();

        let result = store.put(&EventRecord::new("", "s1")).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));

        let result = store.put(&EventRecord::new("click", "")).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
        assert!(store.is_empty().await);

        let result = store.query_page("", None).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }
}
