//! Request/response snapshots and the functions that turn them into log fields.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Request, Response, StatusCode, Version};
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

/// Upper bound on header lines accepted from a raw header block.
const MAX_HEADERS: usize = 100;

/// Transport details of the connection a request arrived on.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Connection {
    pub remote_addr: SocketAddr,
}

/// What is known about an inbound request at the time it is received.
#[derive(Debug, Clone, Serialize)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    #[serde(serialize_with = "serialize_header_map")]
    pub headers: HeaderMap,
    pub connection: Option<Connection>,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HeaderMap::new(),
            connection: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_connection(mut self, remote_addr: SocketAddr) -> Self {
        self.connection = Some(Connection { remote_addr });
        self
    }

    /// Snapshot a request. The connection is taken from axum's `ConnectInfo` extension.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let connection = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(remote_addr)| Connection {
                remote_addr: *remote_addr,
            });

        Self {
            method: req.method().to_string(),
            url: req.uri().to_string(),
            headers: req.headers().clone(),
            connection,
        }
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
    }
}

/// Response status plus the header block as it goes on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseInfo {
    pub status_code: Option<u16>,
    pub raw_header: String,
}

impl ResponseInfo {
    pub fn new(status_code: Option<u16>, raw_header: impl Into<String>) -> Self {
        Self {
            status_code,
            raw_header: raw_header.into(),
        }
    }

    pub fn from_response<B>(res: &Response<B>) -> Self {
        Self::from_parts(res.status(), res.version(), res.headers())
    }

    pub fn from_parts(status: StatusCode, version: Version, headers: &HeaderMap) -> Self {
        let mut raw = format!("{:?} {}\r\n", version, status);
        for (name, value) in headers {
            raw.push_str(name.as_str());
            raw.push_str(": ");
            raw.push_str(&String::from_utf8_lossy(value.as_bytes()));
            raw.push_str("\r\n");
        }
        raw.push_str("\r\n");

        Self {
            status_code: Some(status.as_u16()),
            raw_header: raw,
        }
    }
}

/// Parse a raw header block into a name -> value mapping.
///
/// A leading status line and lines without a colon are skipped. Names are lowercased;
/// repeated names are joined with ", ".
pub fn parse_header_block(raw: &str) -> Map<String, Value> {
    let mut block = String::with_capacity(raw.len() + 4);
    for line in raw.lines() {
        if line.is_empty() || line.starts_with("HTTP/") || !line.contains(':') {
            continue;
        }
        block.push_str(line);
        block.push_str("\r\n");
    }
    block.push_str("\r\n");

    let mut out = Map::new();
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    if let Ok(httparse::Status::Complete((_, parsed))) =
        httparse::parse_headers(block.as_bytes(), &mut headers)
    {
        for h in parsed {
            let value = String::from_utf8_lossy(h.value).into_owned();
            insert_joined(&mut out, h.name.to_ascii_lowercase(), value);
        }
    }
    out
}

/// Header map as a JSON object of strings.
pub fn headers_to_json(headers: &HeaderMap) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        insert_joined(&mut out, name.as_str().to_string(), value);
    }
    out
}

fn insert_joined(out: &mut Map<String, Value>, name: String, value: String) {
    match out.get_mut(&name) {
        Some(Value::String(existing)) => {
            existing.push_str(", ");
            existing.push_str(&value);
        }
        _ => {
            out.insert(name, Value::String(value));
        }
    }
}

fn serialize_header_map<S: Serializer>(headers: &HeaderMap, s: S) -> Result<S::Ok, S::Error> {
    headers_to_json(headers).serialize(s)
}

pub fn raw_request(req: &RequestInfo) -> Value {
    serde_json::to_value(req).unwrap_or(Value::Null)
}

pub fn raw_response(res: &ResponseInfo) -> Value {
    serde_json::to_value(res).unwrap_or(Value::Null)
}

/// Compact request projection. Requests without connection details pass through raw.
pub fn serialize_request(req: &RequestInfo) -> Value {
    let Some(conn) = req.connection else {
        return raw_request(req);
    };

    let mut out = Map::new();
    out.insert("method".to_string(), json!(req.method));
    out.insert("url".to_string(), json!(req.url));
    out.insert(
        "headers".to_string(),
        Value::Object(headers_to_json(&req.headers)),
    );
    out.insert(
        "remote_address".to_string(),
        json!(conn.remote_addr.ip().to_string()),
    );
    out.insert("remote_port".to_string(), json!(conn.remote_addr.port()));
    if let Some(ua) = req.user_agent() {
        out.insert("user_agent".to_string(), json!(ua));
    }
    Value::Object(out)
}

/// Status code plus parsed headers. Responses without a status pass through raw.
pub fn serialize_response(res: &ResponseInfo) -> Value {
    match res.status_code {
        Some(status) => json!({
            "status_code": status,
            "headers": parse_header_block(&res.raw_header),
        }),
        None => raw_response(res),
    }
}

/// Error message plus the messages of its source chain.
pub fn serialize_error(err: &(dyn std::error::Error + Send + Sync)) -> Value {
    let mut sources = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        sources.push(Value::String(source.to_string()));
        current = source.source();
    }

    let mut out = Map::new();
    out.insert("message".to_string(), Value::String(err.to_string()));
    if !sources.is_empty() {
        out.insert("sources".to_string(), Value::Array(sources));
    }
    Value::Object(out)
}
