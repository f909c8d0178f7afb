//! Core record type for Pulse.
//!
//! An [`EventRecord`] is the only entity the service stores. Records are
//! written by the ingest path and read back by the query path, grouped by
//! `event_type` (partition key) and unique per `session_id` (sort key)
//! within a partition.

use serde::{Deserialize, Serialize};

/// Name of the partition key attribute in request bodies and stored items.
pub const EVENT_TYPE_FIELD: &str = "event_type";

/// Name of the sort key attribute in request bodies and stored items.
pub const SESSION_ID_FIELD: &str = "session_id";

/// A stored event.
///
/// # Example
///
/// ```json
/// {
///   "event_type": "page_view",
///   "session_id": "s1"
/// }
/// ```
///
/// Records carry exactly these two attributes. Anything else sent by a
/// client is dropped before the record is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Partition key: groups records that are queried together
    pub event_type: String,

    /// Sort key: unique within one `event_type`
    pub session_id: String,
}

impl EventRecord {
    /// Create a new record from its two key attributes
    pub fn new(event_type: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            session_id: session_id.into(),
        }
    }

    /// The partition key value
    pub fn partition_key(&self) -> &str {
        &self.event_type
    }

    /// The sort key value
    pub fn sort_key(&self) -> &str {
        &self.session_id
    }
}
