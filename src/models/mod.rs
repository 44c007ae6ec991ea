//! Core data models for the storage proxy.
//!
//! Nothing here is persisted by the proxy. These types only carry what the
//! remote store reports back to the HTTP layer for the span of one request.

pub mod object;
