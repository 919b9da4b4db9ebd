//! Field-path redaction over JSON bodies.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

/// Replacement written over redacted fields.
pub const REDACTED: &str = "---";

/// Dot-delimited path into nested objects, e.g. `user.password` or `cards.0.number`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Self {
        let segments = if raw.is_empty() {
            Vec::new()
        } else {
            raw.split('.').map(str::to_string).collect()
        };
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for FieldPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Walk `path` into `value`. Objects are indexed by key, arrays by numeric segment;
/// anything else, or a missing key, ends the walk with `None`.
pub fn resolve_mut<'a>(value: &'a mut Value, path: &FieldPath) -> Option<&'a mut Value> {
    if path.segments.is_empty() {
        return None;
    }

    let mut node = value;
    for segment in &path.segments {
        node = match node {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => {
                let index = segment.parse::<usize>().ok()?;
                items.get_mut(index)?
            }
            _ => return None,
        };
    }
    Some(node)
}

/// Deep copy of `body` with every resolvable path overwritten by [`REDACTED`].
pub fn redact(body: &Value, blacklist: &[FieldPath]) -> Value {
    let mut copy = body.clone();
    for path in blacklist {
        if let Some(slot) = resolve_mut(&mut copy, path) {
            *slot = Value::String(REDACTED.to_string());
        }
    }
    copy
}
