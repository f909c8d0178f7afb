//! Ingest and query handlers.
//!
//! [`EventApi`] validates a request, makes exactly one call into the
//! [`EventStore`] and formats the outcome. Every path ends in a
//! [`Response`]; nothing is retried and nothing escapes as a panic or an
//! unhandled error.
//!
//! # Status codes
//!
//! ```text
//! Outcome                              | ingest | query
//! -------------------------------------|--------|------
//! success                              | 201    | 200
//! required field / parameter missing   | 400    | 400
//! body is not a JSON object            | 500    | -
//! key attribute is not a string        | 500    | -
//! store call failed (incl. empty keys) | 500    | 500
//! ```
//!
//! A body that fails to parse is reported as 500, not 400. This is a known
//! inconsistency kept for compatibility with existing clients; the error is
//! still a distinct [`HandlerError::MalformedPayload`] variant.

use crate::event::{EventRecord, EVENT_TYPE_FIELD, SESSION_ID_FIELD};
use crate::response::{format_response, Response};
use crate::store::{EventStore, StoreError};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const INGEST_SUCCESS_MESSAGE: &str = "Data inserted successfully";
pub const MISSING_FIELDS_MESSAGE: &str = "Missing required fields: event_type and session_id";
pub const MISSING_QUERY_PARAMETER_MESSAGE: &str = "Missing required query parameter: event_type";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Everything that can stop a handler short of its happy path.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// `event_type` or `session_id` absent from the write body
    #[error("{}", MISSING_FIELDS_MESSAGE)]
    MissingFields,

    /// `event_type` absent from the query parameters
    #[error("{}", MISSING_QUERY_PARAMETER_MESSAGE)]
    MissingQueryParameter,

    /// The write body is not a JSON object
    #[error("malformed request body: {0}")]
    MalformedPayload(String),

    /// A key attribute is present but not a string
    #[error("invalid value for '{attribute}': expected a string, got {found}")]
    InvalidAttribute {
        attribute: &'static str,
        found: &'static str,
    },

    /// The store call failed
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl HandlerError {
    /// Status code reported to the caller
    pub fn status_code(&self) -> u16 {
        match self {
            HandlerError::MissingFields | HandlerError::MissingQueryParameter => 400,
            HandlerError::MalformedPayload(_)
            | HandlerError::InvalidAttribute { .. }
            | HandlerError::Storage(_) => 500,
        }
    }

    /// Returns true for caller mistakes reported as 400
    pub fn is_validation(&self) -> bool {
        self.status_code() == 400
    }

    /// Format this error as an envelope
    pub fn into_response(self) -> Response {
        if self.is_validation() {
            return format_response(self.status_code(), &json!({ "error": self.to_string() }));
        }

        format_response(
            self.status_code(),
            &json!({
                "error": INTERNAL_ERROR_MESSAGE,
                "details": self.to_string(),
            }),
        )
    }
}

/// The two handlers, sharing one store handle.
///
/// The store is injected once at startup and never mutated through this
/// type, so a single `EventApi` can serve concurrent requests.
#[derive(Clone)]
pub struct EventApi {
    store: Arc<dyn EventStore>,
}

impl EventApi {
    /// Create the handlers around a store
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Handle a write request.
    ///
    /// `raw_body` should be a JSON object holding `event_type` and
    /// `session_id`. An empty body counts as `{}`. Other fields are dropped.
    pub async fn ingest(&self, raw_body: &str) -> Response {
        match self.try_ingest(raw_body).await {
            Ok(record) => {
                info!(
                    event_type = %record.event_type,
                    session_id = %record.session_id,
                    "Event stored"
                );
                format_response(201, &json!({ "message": INGEST_SUCCESS_MESSAGE }))
            }
            Err(e) => log_failure("ingest", e).into_response(),
        }
    }

    /// Handle a write request whose body has not been decoded yet.
    ///
    /// A body that is not valid UTF-8 is a malformed payload and takes the
    /// same 500 path as one that is not JSON.
    pub async fn ingest_bytes(&self, raw_body: &[u8]) -> Response {
        match std::str::from_utf8(raw_body) {
            Ok(raw_body) => self.ingest(raw_body).await,
            Err(e) => log_failure(
                "ingest",
                HandlerError::MalformedPayload(format!("body is not valid UTF-8: {}", e)),
            )
            .into_response(),
        }
    }

    /// Handle a read request.
    ///
    /// Returns every record whose partition key equals the `event_type`
    /// parameter, in sort-key order. No match is an empty array, not an error.
    pub async fn query(&self, params: Option<&HashMap<String, String>>) -> Response {
        match self.try_query(params).await {
            Ok(records) => format_response(200, &json!(records)),
            Err(e) => log_failure("query", e).into_response(),
        }
    }

    async fn try_ingest(&self, raw_body: &str) -> Result<EventRecord, HandlerError> {
        let body = parse_body(raw_body)?;

        if !body.contains_key(EVENT_TYPE_FIELD) || !body.contains_key(SESSION_ID_FIELD) {
            return Err(HandlerError::MissingFields);
        }

        let record = EventRecord::new(
            string_attribute(&body, EVENT_TYPE_FIELD)?,
            string_attribute(&body, SESSION_ID_FIELD)?,
        );

        self.store.put(&record).await?;
        Ok(record)
    }

    async fn try_query(
        &self,
        params: Option<&HashMap<String, String>>,
    ) -> Result<Vec<EventRecord>, HandlerError> {
        let event_type = params
            .and_then(|params| params.get(EVENT_TYPE_FIELD))
            .ok_or(HandlerError::MissingQueryParameter)?;

        let records = self.store.query_by_partition_key(event_type).await?;
        debug!(
            event_type = %event_type,
            count = records.len(),
            "Query completed"
        );

        Ok(records)
    }
}

/// Parse the write body into a JSON object.
fn parse_body(raw_body: &str) -> Result<Map<String, Value>, HandlerError> {
    let raw_body = if raw_body.is_empty() { "{}" } else { raw_body };

    match serde_json::from_str::<Value>(raw_body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(HandlerError::MalformedPayload(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
        Err(e) => Err(HandlerError::MalformedPayload(e.to_string())),
    }
}

/// Read a key attribute that must hold a string.
fn string_attribute(body: &Map<String, Value>, attribute: &'static str) -> Result<String, HandlerError> {
    match body.get(attribute) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(HandlerError::InvalidAttribute {
            attribute,
            found: json_type_name(other),
        }),
        None => Err(HandlerError::MissingFields),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn log_failure(operation: &str, e: HandlerError) -> HandlerError {
    if e.is_validation() {
        warn!(operation = %operation, error = %e, "Rejected request");
    } else {
        error!(operation = %operation, error = %e, "Request failed");
    }
    e
}
