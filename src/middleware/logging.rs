// src/middleware/logging.rs
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use serde_json::{json, Value};

use super::body::{is_truthy, snapshot_body};
use super::finish::FinishBody;
use super::request_id::{resolve_request_id, uuid_generator, IdGenerator, RequestId, DEFAULT_HEADER};
use crate::error::{Error, Result};
use crate::geo::{self, ClientAddress, GeoLookup};
use crate::logger::{Field, Logger, Payload, Serializers};
use crate::redact::{redact, FieldPath};
use crate::serializers::{RequestInfo, ResponseInfo};

pub const START_MESSAGE: &str = "start request";
pub const END_MESSAGE: &str = "end request";
pub const RECORD_TYPE: &str = "request";

/// Construction options for [`RequestLogger`].
#[derive(Clone)]
pub struct RequestLogOptions {
    pub header_name: String,
    pub blacklist: Vec<String>,
    pub max_body_bytes: usize,
    id_generator: Option<IdGenerator>,
    geo_lookup: Option<Arc<dyn GeoLookup>>,
}

impl Default for RequestLogOptions {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_HEADER.to_string(),
            blacklist: Vec::new(),
            max_body_bytes: 1024 * 1024,
            id_generator: None,
            geo_lookup: None,
        }
    }
}

impl fmt::Debug for RequestLogOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogOptions")
            .field("header_name", &self.header_name)
            .field("blacklist", &self.blacklist)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

impl RequestLogOptions {
    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    pub fn blacklist<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn id_generator(mut self, generate: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.id_generator = Some(Arc::new(generate));
        self
    }

    pub fn geo_lookup(mut self, lookup: impl GeoLookup + 'static) -> Self {
        self.geo_lookup = Some(Arc::new(lookup));
        self
    }
}

struct Inner {
    logger: Logger,
    header_name: HeaderName,
    blacklist: Vec<FieldPath>,
    max_body_bytes: usize,
    id_generator: IdGenerator,
    geo_lookup: Arc<dyn GeoLookup>,
}

/// Request logging interceptor. Cheap to clone; use it as the state of
/// [`request_logger`].
#[derive(Clone)]
pub struct RequestLogger {
    inner: Arc<Inner>,
}

impl fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogger")
            .field("header_name", &self.inner.header_name)
            .field("blacklist", &self.inner.blacklist)
            .field("max_body_bytes", &self.inner.max_body_bytes)
            .finish_non_exhaustive()
    }
}

impl RequestLogger {
    pub fn new(logger: Logger, options: RequestLogOptions) -> Result<Self> {
        let header_name = HeaderName::from_bytes(options.header_name.as_bytes())
            .map_err(|_| Error::InvalidHeaderName(options.header_name.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                logger,
                header_name,
                blacklist: options.blacklist.iter().map(|p| FieldPath::parse(p)).collect(),
                max_body_bytes: options.max_body_bytes,
                id_generator: options.id_generator.unwrap_or_else(uuid_generator),
                geo_lookup: options
                    .geo_lookup
                    .unwrap_or_else(|| Arc::new(ClientAddress) as Arc<dyn GeoLookup>),
            }),
        })
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.inner.header_name
    }

    pub fn max_body_bytes(&self) -> usize {
        self.inner.max_body_bytes
    }

    /// Resolve the correlation id and set up the request-scoped logger.
    /// The clock for the end event's duration starts here.
    pub fn begin(&self, request: RequestInfo) -> RequestContext {
        let started = Instant::now();
        let inner = &self.inner;

        let id = resolve_request_id(
            &request.headers,
            &inner.header_name,
            inner.id_generator.as_ref(),
        );
        let geo = geo::client_address(&request.headers, request.connection.as_ref())
            .and_then(|addr| inner.geo_lookup.lookup(&addr));

        let mut bindings = Payload::new()
            .with("type", RECORD_TYPE)
            .with("id", id.clone())
            .with("req", Field::Req(Arc::new(request)));
        if let Some(geo) = geo {
            bindings = bindings.with("geo", geo);
        }

        RequestContext {
            id,
            log: inner
                .logger
                .child(bindings)
                .with_serializers(Serializers::standard()),
            started,
            interceptor: self.clone(),
        }
    }
}

/// Per-request state between the start and end events.
pub struct RequestContext {
    id: String,
    log: Logger,
    started: Instant,
    interceptor: RequestLogger,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The request-scoped logger.
    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Emit the start event, with a redacted copy of `body` when it is truthy.
    pub fn log_start(&self, body: Option<&Value>) {
        let mut payload = Payload::new();
        if let Some(body) = body.filter(|b| is_truthy(b)) {
            payload = payload.with("body", redact(body, &self.interceptor.inner.blacklist));
        }
        self.log.debug(payload, START_MESSAGE);
    }

    /// Emit the end event. Consumes the context so it can only happen once.
    pub fn finish(self, response: ResponseInfo) {
        let duration = self.started.elapsed().as_secs_f64() * 1e3;
        self.log.debug(
            Payload::new()
                .with("res", Field::Res(Arc::new(response)))
                .with("@metric", json!({ "duration": duration })),
            END_MESSAGE,
        );
    }
}

/// Request-scoped logger, available to handlers from request extensions.
#[derive(Debug, Clone)]
pub struct RequestLog(pub Logger);

/// Whether the server will discard the response body without reading it.
fn carries_no_body(method: &Method, status: StatusCode) -> bool {
    *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Request logging middleware with correlation ID
///
/// The end record's `res.headers` are taken when this middleware returns, so it must be
/// the outermost layer: headers added by layers wrapping it are not logged.
///
/// ```ignore
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(CorsLayer::permissive())
///     .layer(axum::middleware::from_fn_with_state(interceptor, request_logger));
/// ```
pub async fn request_logger(
    State(interceptor): State<RequestLogger>,
    mut req: Request,
    next: Next,
) -> Response {
    let ctx = interceptor.begin(RequestInfo::from_request(&req));
    let method = req.method().clone();
    let header_value = HeaderValue::from_str(ctx.id()).ok();

    if let Some(value) = &header_value {
        req.headers_mut()
            .insert(interceptor.header_name().clone(), value.clone());
    }
    req.extensions_mut().insert(RequestId(ctx.id().to_string()));
    req.extensions_mut().insert(RequestLog(ctx.log().clone()));

    let (req, body) = snapshot_body(req, interceptor.max_body_bytes()).await;
    ctx.log_start(body.as_ref());

    let mut response = next.run(req).await;

    match header_value {
        Some(value) => {
            response
                .headers_mut()
                .insert(interceptor.header_name().clone(), value);
        }
        None => tracing::warn!(id = %ctx.id(), "request id is not a valid header value"),
    }

    let info = ResponseInfo::from_response(&response);
    let bodiless = carries_no_body(&method, response.status());
    response.map(|body| {
        Body::new(FinishBody::new(body, move || ctx.finish(info)).bodiless(bodiless))
    })
}
