//! HTTP request logging middleware for axum.
//!
//! Every request gets a correlation id (reused from the inbound `x-request-id` header when
//! present), a request-scoped child [`Logger`], a "start request" record with an optionally
//! redacted body snapshot, and an "end request" record with response metadata and duration
//! once the response body has been sent.

pub mod config;
pub mod error;
pub mod geo;
pub mod logger;
pub mod middleware;
pub mod redact;
pub mod serializers;

#[cfg(test)]
mod lifecycle_tests;

pub use error::{Error, Result};
pub use logger::{Field, LogRecord, LogSink, Logger, MemorySink, Payload, Serializers, TracingSink};
pub use middleware::{
    request_logger, RequestContext, RequestId, RequestLog, RequestLogOptions, RequestLogger,
};
