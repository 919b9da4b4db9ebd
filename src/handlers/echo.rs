// src/handlers/echo.rs
use axum::{response::IntoResponse, Extension, Json};
use reqlog::{Payload, RequestId, RequestLog};
use serde_json::{json, Value};

/// POST /echo
///
/// Returns the JSON body unchanged, tagged with the request id.
pub async fn echo(
    Extension(RequestLog(log)): Extension<RequestLog>,
    Extension(id): Extension<RequestId>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let fields = body.as_object().map(|o| o.len()).unwrap_or_default();
    log.info(Payload::new().with("fields", json!(fields)), "echoing body");

    Json(json!({ "request_id": id.as_str(), "echo": body }))
}
