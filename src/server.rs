//! HTTP surface for Pulse.
//!
//! Thin axum adapter over [`EventApi`]: it hands the raw body or the parsed
//! query string to a handler and returns the handler's envelope as is.
//!
//! ```text
//! POST    /events                  -> EventApi::ingest
//! GET     /events?event_type=...   -> EventApi::query
//! OPTIONS /events                  -> CORS preflight
//! GET     /health                  -> store ping
//! ```

use crate::api::EventApi;
use crate::config::{ConfigError, PulseConfig};
use crate::response::{format_response, Response};
use crate::shutdown::ShutdownSignal;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, Instrument};

/// Path of the write and read endpoints.
pub const EVENTS_PATH: &str = "/events";

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Header carrying a caller-supplied correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Build the router around a shared [`EventApi`].
pub fn app(api: Arc<EventApi>) -> Router {
    Router::new()
        .route(
            EVENTS_PATH,
            post(ingest_event).get(query_events).options(preflight),
        )
        .route(HEALTH_PATH, get(health_check))
        // Writes of any size reach the handler; there is no framework 413.
        .layer(DefaultBodyLimit::disable())
        .with_state(api)
}

/// Build the store from `config`, bind, and serve until `shutdown` fires.
pub async fn run(config: PulseConfig, shutdown: ShutdownSignal) -> Result<(), ServerError> {
    let store = config.build_store()?;
    let api = Arc::new(EventApi::new(store));

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!("Pulse server listening on {}", addr);

    axum::serve(listener, app(api))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .map_err(ServerError::Serve)?;

    info!("Pulse server stopped");
    Ok(())
}

/// Read the correlation ID header or generate one.
fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn ingest_event(
    State(api): State<Arc<EventApi>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = correlation_id(&headers);
    let span = tracing::info_span!("ingest", correlation_id = %correlation_id);

    async move {
        debug!(body_len = body.len(), "Received write request");
        let response = api.ingest_bytes(&body).await;
        debug!(status = response.status_code, "Write request handled");
        response
    }
    .instrument(span)
    .await
}

async fn query_events(
    State(api): State<Arc<EventApi>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let correlation_id = correlation_id(&headers);
    let span = tracing::info_span!("query", correlation_id = %correlation_id);

    async move {
        debug!(params = ?params, "Received read request");
        let response = api.query(Some(&params)).await;
        debug!(status = response.status_code, "Read request handled");
        response
    }
    .instrument(span)
    .await
}

async fn preflight() -> Response {
    format_response(200, &json!({}))
}

async fn health_check(State(api): State<Arc<EventApi>>) -> Response {
    let store = api.store();

    match store.ping().await {
        Ok(()) => format_response(200, &json!({ "status": "ok", "storage": store.name() })),
        Err(e) => {
            error!(error = %e, storage = %store.name(), "Health check failed");
            format_response(
                503,
                &json!({ "status": "unavailable", "details": e.to_string() }),
            )
        }
    }
}
