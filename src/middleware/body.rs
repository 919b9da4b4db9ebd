use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use futures::{future, stream};
use http_body::Body as HttpBody;
use serde_json::{Map, Value};

/// JavaScript-style truthiness: null, false, 0 and "" count as no body.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Decode a buffered body by content type. Empty or falsy bodies yield `None`.
pub fn decode_body(content_type: Option<&str>, bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let value = if mime == "application/json" || mime.ends_with("+json") {
        serde_json::from_slice(bytes).unwrap_or_else(|_| lossy(bytes))
    } else if mime == "application/x-www-form-urlencoded" {
        decode_form(bytes)
    } else {
        lossy(bytes)
    };

    Some(value).filter(is_truthy)
}

fn lossy(bytes: &[u8]) -> Value {
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}

/// Form fields as an object; repeated keys become arrays.
fn decode_form(bytes: &[u8]) -> Value {
    let mut out = Map::new();
    for (key, value) in url::form_urlencoded::parse(bytes) {
        let value = Value::String(value.into_owned());
        match out.get_mut(&*key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                out.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(out)
}

/// Buffer the request body when its size is known and within `limit`, returning the
/// rebuilt request and the decoded body. Unknown or oversized bodies pass through
/// untouched. A read error is handed on to the downstream handler.
pub async fn snapshot_body(req: Request, limit: usize) -> (Request, Option<Value>) {
    match HttpBody::size_hint(req.body()).upper() {
        Some(len) if len > 0 && len <= limit as u64 => {}
        _ => return (req, None),
    }

    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => {
            let snapshot = decode_body(content_type.as_deref(), &bytes);
            (Request::from_parts(parts, Body::from(bytes)), snapshot)
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to buffer request body for logging");
            let replay = stream::once(future::ready(Err::<Bytes, axum::Error>(err)));
            (Request::from_parts(parts, Body::from_stream(replay)), None)
        }
    }
}
