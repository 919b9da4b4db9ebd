//! Structured logging facility.
//!
//! A [`Logger`] carries a set of bound fields and a [`Serializers`] table. Child loggers
//! inherit both and append their own bindings. Typed fields (`req`, `res`, `err`) stay
//! unserialized until a record passes the sink's level check, so filtered records cost
//! nothing beyond the check itself.

mod sink;

pub use sink::{MemorySink, TracingSink};

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::Level;

use crate::serializers::{self, RequestInfo, ResponseInfo};

pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// A value attached to a record, serialized lazily.
#[derive(Debug, Clone)]
pub enum Field {
    Json(Value),
    Req(Arc<RequestInfo>),
    Res(Arc<ResponseInfo>),
    Err(SharedError),
}

impl From<Value> for Field {
    fn from(value: Value) -> Self {
        Field::Json(value)
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Json(Value::String(value.to_string()))
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Json(Value::String(value))
    }
}

impl From<RequestInfo> for Field {
    fn from(value: RequestInfo) -> Self {
        Field::Req(Arc::new(value))
    }
}

impl From<ResponseInfo> for Field {
    fn from(value: ResponseInfo) -> Self {
        Field::Res(Arc::new(value))
    }
}

/// Functions turning typed fields into loggable JSON.
#[derive(Clone, Copy)]
pub struct Serializers {
    pub req: fn(&RequestInfo) -> Value,
    pub res: fn(&ResponseInfo) -> Value,
    pub err: fn(&(dyn std::error::Error + Send + Sync)) -> Value,
}

impl Serializers {
    /// Compact projections of requests, responses and errors.
    pub fn standard() -> Self {
        Self {
            req: serializers::serialize_request,
            res: serializers::serialize_response,
            err: serializers::serialize_error,
        }
    }

    /// Dump typed fields as they are.
    pub fn raw() -> Self {
        Self {
            req: serializers::raw_request,
            res: serializers::raw_response,
            err: serializers::serialize_error,
        }
    }

    fn render(&self, field: &Field) -> Value {
        match field {
            Field::Json(value) => value.clone(),
            Field::Req(req) => (self.req)(req),
            Field::Res(res) => (self.res)(res),
            Field::Err(err) => (self.err)(err.as_ref()),
        }
    }
}

impl fmt::Debug for Serializers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializers").finish_non_exhaustive()
    }
}

impl Default for Serializers {
    fn default() -> Self {
        Self::raw()
    }
}

/// Ordered key/field pairs for a record or a child binding.
#[derive(Debug, Clone, Default)]
pub struct Payload(Vec<(String, Field)>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, field: impl Into<Field>) -> Self {
        self.0.push((key.into(), field.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A fully serialized log record as handed to a [`LogSink`].
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub msg: String,
    pub fields: Map<String, Value>,
}

impl LogRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    pub fn to_json(&self) -> Value {
        let mut out = self.fields.clone();
        out.insert(
            "level".to_string(),
            Value::String(self.level.as_str().to_ascii_lowercase()),
        );
        out.insert("msg".to_string(), Value::String(self.msg.clone()));
        Value::Object(out)
    }
}

/// Destination for log records. Shared across requests, so it must be thread safe.
pub trait LogSink: Send + Sync {
    fn enabled(&self, level: Level) -> bool;

    fn write(&self, record: LogRecord);
}

/// Handle to the logging facility.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
    bindings: Arc<Vec<(String, Field)>>,
    serializers: Serializers,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("bindings", &self.bindings)
            .field("serializers", &self.serializers)
            .finish_non_exhaustive()
    }
}

impl Logger {
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self::from_sink(Arc::new(sink))
    }

    pub fn from_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            bindings: Arc::new(Vec::new()),
            serializers: Serializers::default(),
        }
    }

    /// Logger writing through `tracing`.
    pub fn tracing() -> Self {
        Self::new(TracingSink)
    }

    /// Derive a logger that carries `bindings` on every record, after the parent's own.
    pub fn child(&self, bindings: Payload) -> Self {
        let mut merged = Vec::with_capacity(self.bindings.len() + bindings.0.len());
        merged.extend(self.bindings.iter().cloned());
        merged.extend(bindings.0);
        Self {
            sink: Arc::clone(&self.sink),
            bindings: Arc::new(merged),
            serializers: self.serializers,
        }
    }

    pub fn with_serializers(mut self, serializers: Serializers) -> Self {
        self.serializers = serializers;
        self
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.sink.enabled(level)
    }

    pub fn log(&self, level: Level, payload: Payload, msg: impl AsRef<str>) {
        if !self.sink.enabled(level) {
            return;
        }

        let mut fields = Map::new();
        for (key, field) in self.bindings.iter().chain(payload.0.iter()) {
            fields.insert(key.clone(), self.serializers.render(field));
        }
        fields.insert("time".to_string(), Value::String(Utc::now().to_rfc3339()));

        self.sink.write(LogRecord {
            level,
            msg: msg.as_ref().to_string(),
            fields,
        });
    }

    pub fn trace(&self, payload: Payload, msg: impl AsRef<str>) {
        self.log(Level::TRACE, payload, msg);
    }

    pub fn debug(&self, payload: Payload, msg: impl AsRef<str>) {
        self.log(Level::DEBUG, payload, msg);
    }

    pub fn info(&self, payload: Payload, msg: impl AsRef<str>) {
        self.log(Level::INFO, payload, msg);
    }

    pub fn warn(&self, payload: Payload, msg: impl AsRef<str>) {
        self.log(Level::WARN, payload, msg);
    }

    pub fn error(&self, payload: Payload, msg: impl AsRef<str>) {
        self.log(Level::ERROR, payload, msg);
    }
}
