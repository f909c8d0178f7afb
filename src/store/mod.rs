//! Storage boundary for Pulse.
//!
//! The [`EventStore`] trait is the only thing the handlers know about
//! persistence: an unconditional upsert and a read of one partition. The
//! read is exposed page by page ([`EventStore::query_page`]) and drained by
//! the provided [`EventStore::query_by_partition_key`], so callers always
//! see every record of a partition regardless of the backend's page size.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: process-local, used by default and in tests
//! - [`RedisStore`]: one sorted set per partition on a shared connection pool
//!
//! A store handle is built once at startup and shared behind an `Arc`; it
//! holds no per-request state.

pub mod memory;
pub mod redis;

use crate::event::{EventRecord, EVENT_TYPE_FIELD, SESSION_ID_FIELD};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Default number of records returned per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No connection to the backend could be obtained
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backend accepted the connection but the command failed
    #[error("storage command failed: {0}")]
    Backend(String),

    /// A key attribute was empty
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// One page of a partition read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Records in ascending sort-key order
    pub items: Vec<EventRecord>,

    /// Sort key of the last record when more records may follow
    pub last_evaluated_key: Option<String>,
}

impl Page {
    /// Build a page, setting the continuation key only when the page is full.
    pub fn from_items(items: Vec<EventRecord>, page_size: usize) -> Self {
        let last_evaluated_key = if items.len() >= page_size {
            items.last().map(|record| record.sort_key().to_string())
        } else {
            None
        };

        Self {
            items,
            last_evaluated_key,
        }
    }
}

/// A key-structured store of [`EventRecord`]s.
///
/// Implementations must be `Send + Sync`: one handle serves every request.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Short backend name used in logs and the health endpoint
    fn name(&self) -> &str;

    /// Insert or overwrite the record for its `(event_type, session_id)` pair.
    async fn put(&self, record: &EventRecord) -> Result<(), StoreError>;

    /// Read one page of records for `event_type`, strictly after `start_after`.
    async fn query_page(
        &self,
        event_type: &str,
        start_after: Option<&str>,
    ) -> Result<Page, StoreError>;

    /// Read every record for `event_type` in sort-key order.
    ///
    /// Pages are fetched one at a time until the backend stops returning a
    /// continuation key. A failure on any page fails the whole read.
    async fn query_by_partition_key(&self, event_type: &str) -> Result<Vec<EventRecord>, StoreError> {
        let mut records = Vec::new();
        let mut start_after: Option<String> = None;

        loop {
            let page = self.query_page(event_type, start_after.as_deref()).await?;
            debug!(
                store = %self.name(),
                event_type = %event_type,
                page_len = page.items.len(),
                more = page.last_evaluated_key.is_some(),
                "Fetched page"
            );
            records.extend(page.items);

            match page.last_evaluated_key {
                Some(key) => start_after = Some(key),
                None => break,
            }
        }

        Ok(records)
    }

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Reject records whose key attributes are empty.
pub(crate) fn check_record_keys(record: &EventRecord) -> Result<(), StoreError> {
    check_key(EVENT_TYPE_FIELD, record.partition_key())?;
    check_key(SESSION_ID_FIELD, record.sort_key())
}

/// Reject an empty key attribute value.
pub(crate) fn check_key(attribute: &str, value: &str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::InvalidKey(format!(
            "key attribute '{}' must not be empty",
            attribute
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a fixed partition in pages of two.
    struct PagedStore {
        records: Vec<EventRecord>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventStore for PagedStore {
        fn name(&self) -> &str {
            "paged"
        }

        async fn put(&self, _record: &EventRecord) -> Result<(), StoreError> {
            Ok(())
        }

        async fn query_page(
            &self,
            _event_type: &str,
            start_after: Option<&str>,
        ) -> Result<Page, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let items: Vec<EventRecord> = self
                .records
                .iter()
                .filter(|r| start_after.map_or(true, |after| r.session_id.as_str() > after))
                .take(2)
                .cloned()
                .collect();
            Ok(Page::from_items(items, 2))
        }
    }

    #[tokio::test]
    async fn test_query_drains_all_pages() {
        let store = PagedStore {
            records: (1..=5)
                .map(|i| EventRecord::new("click", format!("s{}", i)))
                .collect(),
            calls: AtomicUsize::new(0),
        };

        let records = store.query_by_partition_key("click").await.unwrap();

        assert_eq!(records.len(), 5);
        assert_eq!(records[0].session_id, "s1");
        assert_eq!(records[4].session_id, "s5");
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_full_last_page_needs_one_more_read() {
        let store = PagedStore {
            records: vec![EventRecord::new("click", "a"), EventRecord::new("click", "b")],
            calls: AtomicUsize::new(0),
        };

        let records = store.query_by_partition_key("click").await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_page_continuation_key() {
        let full = Page::from_items(
            vec![EventRecord::new("t", "a"), EventRecord::new("t", "b")],
            2,
        );
        assert_eq!(full.last_evaluated_key, Some("b".to_string()));

        let partial = Page::from_items(vec![EventRecord::new("t", "a")], 2);
        assert_eq!(partial.last_evaluated_key, None);

        let empty = Page::from_items(Vec::new(), 2);
        assert_eq!(empty.last_evaluated_key, None);
    }

    #[test]
    fn test_check_record_keys() {
        assert!(check_record_keys(&EventRecord::new("t", "s")).is_ok());

        let err = check_record_keys(&EventRecord::new("", "s")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
        assert!(err.to_string().contains("event_type"));

        let err = check_record_keys(&EventRecord::new("t", "")).unwrap_err();
        assert!(err.to_string().contains("session_id"));
    }
}
