//! Redis-backed event store.
//!
//! Each partition is a sorted set named `{key_prefix}:{event_type}`. Every
//! member has score 0 and is the record's `session_id`, so Redis keeps the
//! members in lexicographic order and a lex range doubles as a sort-key
//! range.
//!
//! ```text
//! ZADD pulse:events:page_view 0 s1                         # put
//! ZRANGEBYLEX pulse:events:page_view (s1 + LIMIT 0 100      # page after s1
//! ```
//!
//! A record has no attributes beyond its two keys, so the member alone is
//! enough to rebuild it. Re-adding an existing member leaves one entry.

use super::{check_key, check_record_keys, EventStore, Page, StoreError, DEFAULT_PAGE_SIZE};
use crate::event::{EventRecord, EVENT_TYPE_FIELD};
use async_trait::async_trait;
use deadpool_redis::redis::cmd;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use tracing::{debug, error};

/// Default key prefix for partition sets.
pub const DEFAULT_KEY_PREFIX: &str = "pulse:events";

/// [`EventStore`] on a shared Redis connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
    page_size: usize,
}

impl RedisStore {
    /// Wrap an existing pool
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Build a pool for `url`. No connection is made until the first command.
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Set the prefix used for partition keys
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the number of members read per page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Redis key holding the partition for `event_type`
    pub fn partition_key(&self, event_type: &str) -> String {
        format!("{}:{}", self.key_prefix, event_type)
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        self.pool.get().await.map_err(|e| {
            error!(error = %e, "Failed to get Redis connection");
            StoreError::Unavailable(e.to_string())
        })
    }
}

/// Lower bound for `ZRANGEBYLEX`: everything, or strictly after `start_after`.
fn lex_lower_bound(start_after: Option<&str>) -> String {
    match start_after {
        Some(key) => format!("({}", key),
        None => "-".to_string(),
    }
}

#[async_trait]
impl EventStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn put(&self, record: &EventRecord) -> Result<(), StoreError> {
        check_record_keys(record)?;

        let key = self.partition_key(record.partition_key());
        let mut conn = self.connection().await?;

        let added: u64 = cmd("ZADD")
            .arg(&key)
            .arg(0)
            .arg(record.sort_key())
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "ZADD failed");
                StoreError::Backend(e.to_string())
            })?;

        debug!(
            key = %key,
            session_id = %record.sort_key(),
            replaced = added == 0,
            "Stored record in Redis"
        );

        Ok(())
    }

    async fn query_page(
        &self,
        event_type: &str,
        start_after: Option<&str>,
    ) -> Result<Page, StoreError> {
        check_key(EVENT_TYPE_FIELD, event_type)?;

        let key = self.partition_key(event_type);
        let mut conn = self.connection().await?;

        let members: Vec<String> = cmd("ZRANGEBYLEX")
            .arg(&key)
            .arg(lex_lower_bound(start_after))
            .arg("+")
            .arg("LIMIT")
            .arg(0)
            .arg(self.page_size)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "ZRANGEBYLEX failed");
                StoreError::Backend(e.to_string())
            })?;

        let items = members
            .into_iter()
            .map(|session_id| EventRecord::new(event_type, session_id))
            .collect();

        Ok(Page::from_items(items, self.page_size))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: String = cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RedisStore {
        RedisStore::from_url("redis://127.0.0.1:6379").unwrap()
    }

    #[test]
    fn test_partition_key() {
        let store = store();
        assert_eq!(store.partition_key("page_view"), "pulse:events:page_view");

        let store = store.with_key_prefix("analytics");
        assert_eq!(store.partition_key("click"), "analytics:click");
    }

    #[test]
    fn test_lex_lower_bound() {
        assert_eq!(lex_lower_bound(None), "-");
        assert_eq!(lex_lower_bound(Some("s1")), "(s1");
    }

    #[test]
    fn test_page_size_floor() {
        let store = store().with_page_size(0);
        assert_eq!(store.page_size, 1);
    }

    #[tokio::test]
    async fn test_empty_keys_rejected_before_connecting() {
        // Port 1 is never a Redis server; validation must fail first.
        let store = RedisStore::from_url("redis://127.0.0.1:1").unwrap();

        let result = store.put(&EventRecord::new("", "s1")).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));

        let result = store.query_page("", None).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let store = RedisStore::from_url("redis://127.0.0.1:1").unwrap();

        let result = store.put(&EventRecord::new("click", "s1")).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
