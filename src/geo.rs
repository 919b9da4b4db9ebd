//! Client address resolution for the `geo` field.

use axum::http::HeaderMap;
use serde_json::Value;

use crate::serializers::Connection;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Turns a client address into an opaque location value.
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, client_addr: &str) -> Option<Value>;
}

/// Default lookup: the client address itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientAddress;

impl GeoLookup for ClientAddress {
    fn lookup(&self, client_addr: &str) -> Option<Value> {
        Some(Value::String(client_addr.to_string()))
    }
}

impl<F> GeoLookup for F
where
    F: Fn(&str) -> Option<Value> + Send + Sync,
{
    fn lookup(&self, client_addr: &str) -> Option<Value> {
        self(client_addr)
    }
}

/// First `x-forwarded-for` entry, else the peer address. Requests without a connection
/// have no client address.
pub fn client_address(headers: &HeaderMap, connection: Option<&Connection>) -> Option<String> {
    let connection = connection?;
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match forwarded {
        Some(addr) => Some(addr.to_string()),
        None => Some(connection.remote_addr.ip().to_string()),
    }
}
