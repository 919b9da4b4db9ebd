// End-to-end tests: the middleware mounted on an axum router, records captured in memory
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Extension},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::logger::{LogRecord, Logger, MemorySink, Payload};
use crate::middleware::{request_logger, RequestId, RequestLog, RequestLogOptions, RequestLogger};

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use tower_http::cors::CorsLayer;

    async fn ok() -> &'static str {
        "ok"
    }

    async fn echo(Json(body): Json<Value>) -> Json<Value> {
        Json(body)
    }

    async fn chatty(Extension(RequestLog(log)): Extension<RequestLog>) -> &'static str {
        log.info(Payload::new(), "msg");
        "ok"
    }

    async fn slow() -> &'static str {
        tokio::time::sleep(Duration::from_millis(20)).await;
        "slow"
    }

    async fn seen_id(Extension(id): Extension<RequestId>, headers: HeaderMap) -> String {
        let inbound = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        format!("{}|{}", id.as_str(), inbound)
    }

    async fn teapot() -> StatusCode {
        StatusCode::IM_A_TEAPOT
    }

    async fn no_content() -> StatusCode {
        StatusCode::NO_CONTENT
    }

    async fn not_modified() -> impl IntoResponse {
        (StatusCode::NOT_MODIFIED, "stale copy")
    }

    async fn empty() -> Response {
        Response::new(Body::empty())
    }

    fn routes() -> Router {
        Router::new()
            .route("/a/url", get(ok))
            .route("/echo", post(echo))
            .route("/chatty", get(chatty))
            .route("/slow", get(slow))
            .route("/seen-id", get(seen_id))
            .route("/teapot", get(teapot))
            .route("/no-content", get(no_content))
            .route("/not-modified", get(not_modified))
            .route("/empty", get(empty))
    }

    fn interceptor(sink: &MemorySink, options: RequestLogOptions) -> RequestLogger {
        RequestLogger::new(Logger::new(sink.clone()), options).unwrap()
    }

    fn app(sink: &MemorySink, options: RequestLogOptions) -> Router {
        routes().layer(from_fn_with_state(interceptor(sink, options), request_logger))
    }

    fn get_req(uri: &str) -> Request<Body> {
        let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 5555))));
        req
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 5555))));
        req
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    /// Like a server answering HEAD or 204/304: the body is dropped without being read.
    async fn send_unread(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        drop(response);
        (status, headers)
    }

    fn assert_start_and_end(sink: &MemorySink, headers: &HeaderMap) {
        let records = sink.records();
        assert_eq!(records.len(), 2);
        let id = assert_single_id(&records);
        assert_eq!(header_str(headers, "x-request-id"), id);
        assert_eq!(records[0].msg, "start request");
        assert_eq!(records[1].msg, "end request");
    }

    fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
        headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default()
    }

    fn assert_single_id(records: &[LogRecord]) -> String {
        let id = records[0].id().unwrap().to_string();
        assert!(records.iter().all(|r| r.id() == Some(id.as_str())));
        id
    }

    #[tokio::test]
    async fn test_two_records_share_one_id() {
        let sink = MemorySink::new();
        let (status, headers, _) = send(app(&sink, RequestLogOptions::default()), get_req("/a/url")).await;
        assert_eq!(status, StatusCode::OK);

        let records = sink.records();
        assert_eq!(records.len(), 2);
        let id = assert_single_id(&records);
        assert!(!id.is_empty());
        assert_eq!(header_str(&headers, "x-request-id"), id);

        assert_eq!(records[0].msg, "start request");
        assert_eq!(records[1].msg, "end request");
        for record in &records {
            assert_eq!(record.get("type"), Some(&json!("request")));
            assert_eq!(record.get("req").unwrap()["url"], "/a/url");
            assert_eq!(record.get("req").unwrap()["remote_address"], "127.0.0.1");
            assert!(record.get("body").is_none());
        }
    }

    #[tokio::test]
    async fn test_inbound_id_is_reused() {
        let sink = MemorySink::new();
        let mut req = get_req("/a/url");
        req.headers_mut()
            .insert("x-request-id", "upstream-1234".parse().unwrap());

        let (_, headers, _) = send(app(&sink, RequestLogOptions::default()), req).await;

        assert_eq!(header_str(&headers, "x-request-id"), "upstream-1234");
        assert!(sink.records().iter().all(|r| r.id() == Some("upstream-1234")));
    }

    #[tokio::test]
    async fn test_empty_inbound_id_is_replaced() {
        let sink = MemorySink::new();
        let options = RequestLogOptions::default().id_generator(|| "fresh-id".to_string());
        let mut req = get_req("/a/url");
        req.headers_mut().insert("x-request-id", "".parse().unwrap());

        let (_, headers, _) = send(app(&sink, options), req).await;

        assert_eq!(header_str(&headers, "x-request-id"), "fresh-id");
        assert_eq!(sink.records_for("fresh-id").len(), 2);
    }

    #[tokio::test]
    async fn test_custom_header_name() {
        let sink = MemorySink::new();
        let options = RequestLogOptions::default().header_name("X-Correlation-Id");
        let mut req = get_req("/a/url");
        req.headers_mut()
            .insert("x-correlation-id", "corr-9".parse().unwrap());

        let (_, headers, _) = send(app(&sink, options), req).await;

        assert_eq!(header_str(&headers, "x-correlation-id"), "corr-9");
        assert!(headers.get("x-request-id").is_none());
        assert_eq!(sink.records_for("corr-9").len(), 2);
    }

    #[tokio::test]
    async fn test_body_only_on_start_record() {
        let sink = MemorySink::new();
        let (_, _, _) = send(
            app(&sink, RequestLogOptions::default()),
            post_json("/echo", json!({ "foo": "bar" })),
        )
        .await;

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("body"), Some(&json!({ "foo": "bar" })));
        assert!(records[1].get("body").is_none());
        assert!(records[0].get("res").is_none());
        assert!(records[1].get("res").is_some());
        assert_single_id(&records);
    }

    #[tokio::test]
    async fn test_blacklisted_fields_are_redacted_in_log_only() {
        let sink = MemorySink::new();
        let options =
            RequestLogOptions::default().blacklist(["password", "another_secret", "foo.bar"]);
        let body = json!({
            "password": "secret data for secret logins",
            "username": "publik_data",
            "foo": { "bar": "nested secret" }
        });

        let (_, _, echoed) = send(app(&sink, options), post_json("/echo", body.clone())).await;

        let records = sink.records();
        assert_eq!(
            records[0].get("body"),
            Some(&json!({
                "password": "---",
                "username": "publik_data",
                "foo": { "bar": "---" }
            }))
        );
        assert!(records[1].get("body").is_none());

        // the handler still saw the unredacted body
        let echoed: Value = serde_json::from_slice(&echoed).unwrap();
        assert_eq!(echoed, body);
    }

    #[tokio::test]
    async fn test_handler_logs_through_request_scope() {
        let sink = MemorySink::new();
        send(app(&sink, RequestLogOptions::default()), get_req("/chatty")).await;

        let records = sink.records();
        assert_eq!(records.len(), 3);
        assert_single_id(&records);
        let msgs: Vec<&str> = records.iter().map(|r| r.msg.as_str()).collect();
        assert_eq!(msgs, ["start request", "msg", "end request"]);
        assert!(records.iter().all(|r| r.get("req").is_some()));
    }

    #[tokio::test]
    async fn test_end_record_parses_response_headers() {
        let sink = MemorySink::new();
        let (status, _, _) = send(app(&sink, RequestLogOptions::default()), get_req("/teapot")).await;
        assert_eq!(status, StatusCode::IM_A_TEAPOT);

        let records = sink.records();
        let id = assert_single_id(&records);
        let res = records[1].get("res").unwrap();
        assert_eq!(res["status_code"], 418);
        assert_eq!(res["headers"]["x-request-id"], id.as_str());
    }

    #[tokio::test]
    async fn test_duration_tracks_elapsed_time() {
        let sink = MemorySink::new();
        let started = Instant::now();
        send(app(&sink, RequestLogOptions::default()), get_req("/slow")).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;

        let records = sink.records();
        let duration = records[1].get("@metric").unwrap()["duration"].as_f64().unwrap();
        assert!(duration >= 20.0, "duration {duration} shorter than handler sleep");
        assert!(duration <= elapsed_ms);
    }

    #[tokio::test]
    async fn test_id_is_visible_downstream() {
        let sink = MemorySink::new();
        let options = RequestLogOptions::default().id_generator(|| "down-1".to_string());
        let (_, _, body) = send(app(&sink, options), get_req("/seen-id")).await;
        assert_eq!(&body[..], b"down-1|down-1");
    }

    #[tokio::test]
    async fn test_request_without_connection_info() {
        let sink = MemorySink::new();
        let req = Request::builder().uri("/a/url").body(Body::empty()).unwrap();
        let (status, _, _) = send(app(&sink, RequestLogOptions::default()), req).await;
        assert_eq!(status, StatusCode::OK);

        let records = sink.records();
        assert_eq!(records.len(), 2);
        for record in &records {
            let req = record.get("req").unwrap();
            assert_eq!(req["connection"], Value::Null);
            assert!(req.get("remote_address").is_none());
            assert!(record.get("geo").is_none());
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_do_not_mix() {
        let sink = MemorySink::new();
        let router = app(&sink, RequestLogOptions::default());

        let responses = join_all((0..16).map(|_| send(router.clone(), get_req("/slow")))).await;

        assert_eq!(sink.len(), 32);
        for (_, headers, _) in responses {
            let id = header_str(&headers, "x-request-id");
            let records = sink.records_for(id);
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].msg, "start request");
            assert_eq!(records[1].msg, "end request");
        }
    }

    #[tokio::test]
    async fn test_debug_disabled_sink_receives_nothing() {
        let sink = MemorySink::with_max_level(tracing::Level::INFO);
        let (status, headers, _) =
            send(app(&sink, RequestLogOptions::default()), get_req("/a/url")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!header_str(&headers, "x-request-id").is_empty());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_head_request_logs_end_record() {
        let sink = MemorySink::new();
        let mut req = get_req("/a/url");
        *req.method_mut() = axum::http::Method::HEAD;

        let (status, headers, body) = send(app(&sink, RequestLogOptions::default()), req).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_start_and_end(&sink, &headers);
        assert_eq!(sink.records()[1].get("res").unwrap()["status_code"], 200);
    }

    #[tokio::test]
    async fn test_unread_head_response_logs_end_record() {
        let sink = MemorySink::new();
        let mut req = get_req("/a/url");
        *req.method_mut() = axum::http::Method::HEAD;

        let (_, headers) = send_unread(app(&sink, RequestLogOptions::default()), req).await;

        assert_start_and_end(&sink, &headers);
    }

    #[tokio::test]
    async fn test_no_content_logs_end_record() {
        let sink = MemorySink::new();
        let (status, headers) =
            send_unread(app(&sink, RequestLogOptions::default()), get_req("/no-content")).await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_start_and_end(&sink, &headers);
        assert_eq!(sink.records()[1].get("res").unwrap()["status_code"], 204);
    }

    #[tokio::test]
    async fn test_not_modified_logs_end_record() {
        let sink = MemorySink::new();
        let (status, headers) =
            send_unread(app(&sink, RequestLogOptions::default()), get_req("/not-modified")).await;

        assert_eq!(status, StatusCode::NOT_MODIFIED);
        assert_start_and_end(&sink, &headers);
        assert_eq!(sink.records()[1].get("res").unwrap()["status_code"], 304);
    }

    #[tokio::test]
    async fn test_empty_body_logs_end_record() {
        let sink = MemorySink::new();
        let (status, headers) =
            send_unread(app(&sink, RequestLogOptions::default()), get_req("/empty")).await;

        assert_eq!(status, StatusCode::OK);
        assert_start_and_end(&sink, &headers);
    }

    #[tokio::test]
    async fn test_unread_body_with_content_logs_no_end_record() {
        let sink = MemorySink::new();
        send_unread(app(&sink, RequestLogOptions::default()), get_req("/a/url")).await;

        let msgs: Vec<String> = sink.records().into_iter().map(|r| r.msg).collect();
        assert_eq!(msgs, ["start request"]);
    }

    #[tokio::test]
    async fn test_headers_from_inner_layers_are_logged() {
        let sink = MemorySink::new();
        let app = routes()
            .layer(CorsLayer::permissive())
            .layer(from_fn_with_state(
                interceptor(&sink, RequestLogOptions::default()),
                request_logger,
            ));
        let mut req = get_req("/a/url");
        req.headers_mut()
            .insert(header::ORIGIN, "http://example.com".parse().unwrap());

        let (_, headers, _) = send(app, req).await;

        assert_start_and_end(&sink, &headers);
        let records = sink.records();
        let logged = &records[1].get("res").unwrap()["headers"];
        assert_eq!(
            logged["access-control-allow-origin"],
            header_str(&headers, "access-control-allow-origin")
        );
        assert_eq!(logged["access-control-allow-origin"], "*");
    }
}
