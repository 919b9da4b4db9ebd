use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName};
use uuid::Uuid;

pub const DEFAULT_HEADER: &str = "x-request-id";

/// Source of fresh correlation ids.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

pub fn uuid_generator() -> IdGenerator {
    Arc::new(|| Uuid::new_v4().to_string())
}

/// Correlation id of the current request, available from request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reuse the inbound id if the header carries a non-empty value, otherwise generate one.
pub fn resolve_request_id(
    headers: &HeaderMap,
    header_name: &HeaderName,
    generate: &(dyn Fn() -> String + Send + Sync),
) -> String {
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| generate())
}
