//! # Pulse Event Store
//!
//! A small service that records `{event_type, session_id}` pairs and reads
//! them back by `event_type`.
//!
//! ## Architecture
//!
//! ```text
//! Client -> HTTP (axum) -> EventApi -> EventStore (memory | Redis)
//!                              |
//!                              v
//!                       format_response
//! ```
//!
//! ## Modules
//!
//! - [`event`]: The stored record type
//! - [`api`]: Ingest and query handlers with their error taxonomy
//! - [`response`]: Uniform response envelope with CORS headers
//! - [`store`]: Storage trait and its backends
//! - [`config`]: TOML configuration
//! - [`server`]: axum router and server loop
//! - [`shutdown`]: Graceful shutdown signal

pub mod api;
pub mod config;
pub mod event;
pub mod response;
pub mod server;
pub mod shutdown;
pub mod store;

// Re-export commonly used types at crate root
pub use api::{EventApi, HandlerError};
pub use event::EventRecord;
pub use response::{format_response, Response};
pub use store::{EventStore, MemoryStore, RedisStore, StoreError};
