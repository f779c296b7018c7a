use std::sync::Arc;

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::{stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::extract::{extract, RequestEnv};
use crate::{widget, CapturedException, Diagnostics, DiagnosticsError};

/// Set on every response the middleware rewrote.
pub const HANDLED_HEADER: HeaderName = HeaderName::from_static("x-diagnostics-handled");

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Rewrites eligible error responses to carry the diagnostics widget.
///
/// Ineligible responses are returned untouched with their body unread. Once a
/// response is eligible, any failure falls back to the original response; a
/// body that outgrows `max_body_bytes` while streaming is handed back intact.
/// Only a body that errors mid-read comes back empty.
///
/// A [`CapturedException`] in the response extensions takes precedence over
/// one in the request extensions. The request copy is read before the inner
/// service runs, so only layers outside this one can supply it.
pub async fn intercept_mw(
    State(diag): State<Arc<Diagnostics>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_exception = req.extensions().get::<CapturedException>().cloned();

    let response = next.run(req).await;
    let status = response.status();
    if !diag.should_intercept(status) {
        return response;
    }
    if let Some(reason) = skip_reason(&diag, &method, &path, &response) {
        debug!(target: "triage::intercept", %path, status = status.as_u16(), reason, "passing error response through");
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match buffer_bounded(body, diag.config().max_body_bytes).await {
        Buffered::Complete(bytes) => bytes,
        Buffered::Overflow(body) => {
            debug!(target: "triage::intercept", %path, status = status.as_u16(), reason = "body too large", "passing error response through");
            return Response::from_parts(parts, body);
        }
        Buffered::Failed(err) => {
            let err = DiagnosticsError::Body(err);
            warn!(target: "triage::intercept", %path, status = status.as_u16(), error = %err, "could not buffer error response");
            parts.headers.remove(header::TRANSFER_ENCODING);
            parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
            return Response::from_parts(parts, Body::empty());
        }
    };

    let env = RequestEnv {
        path,
        exception: parts
            .extensions
            .get::<CapturedException>()
            .cloned()
            .or(request_exception),
    };
    match rewrite(&diag, &env, status, &parts.headers, &bytes).await {
        Ok((headers, body)) => {
            parts.headers = headers;
            Response::from_parts(parts, Body::from(body))
        }
        Err(err) => {
            error!(target: "triage::intercept", path = %env.path, status = status.as_u16(), error = %err, "widget injection failed; returning original response");
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

enum Buffered {
    Complete(Bytes),
    /// Limit exceeded; the body replays what was read and then the rest.
    Overflow(Body),
    Failed(axum::Error),
}

async fn buffer_bounded(body: Body, limit: usize) -> Buffered {
    let mut rest = body.into_data_stream();
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = rest.next().await {
        match chunk {
            Ok(chunk) if buf.len() + chunk.len() > limit => {
                let head = stream::iter([Ok::<_, axum::Error>(Bytes::from(buf)), Ok(chunk)]);
                return Buffered::Overflow(Body::from_stream(head.chain(rest)));
            }
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(err) => return Buffered::Failed(err),
        }
    }
    Buffered::Complete(Bytes::from(buf))
}

async fn rewrite(
    diag: &Diagnostics,
    env: &RequestEnv,
    status: StatusCode,
    original: &HeaderMap,
    body: &[u8],
) -> Result<(HeaderMap, Vec<u8>), DiagnosticsError> {
    let cfg = diag.config();
    let record = extract(env, status, diag.sampler()).await;
    let fragment = widget::render(&record, &cfg.model, &cfg.endpoint_path)?;
    let spliced = widget::splice(body, &fragment, &cfg.inject_marker);

    let mut headers = original.clone();
    if !is_html(&headers) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
    }
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(spliced.len()));
    headers.insert(HANDLED_HEADER, HeaderValue::from_static("true"));

    info!(
        target: "triage::intercept",
        path = %env.path,
        status = status.as_u16(),
        kind = record.kind(),
        bytes = spliced.len(),
        "injected diagnostics widget"
    );
    Ok((headers, spliced))
}

/// Cases where splicing would corrupt the response or loop back on ourselves.
fn skip_reason(diag: &Diagnostics, method: &Method, path: &str, response: &Response) -> Option<&'static str> {
    let cfg = diag.config();
    if path == cfg.endpoint_path {
        return Some("analysis endpoint");
    }
    if method == Method::HEAD {
        return Some("head request");
    }
    let encoded = response
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.trim().eq_ignore_ascii_case("identity"))
        .unwrap_or(false);
    if encoded {
        return Some("encoded body");
    }
    let declared = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let lower = response.body().size_hint().lower();
    if declared.unwrap_or(lower).max(lower) > cfg.max_body_bytes as u64 {
        return Some("body too large");
    }
    if ignored_extension(path, &cfg.ignore_extensions) {
        return Some("ignored extension");
    }
    None
}

fn ignored_extension(path: &str, ignore: &[String]) -> bool {
    if ignore.is_empty() {
        return false;
    }
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ignore
            .iter()
            .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{attach, widget::WIDGET_MARKER};
    use axum::body::Bytes;
    use axum::http::Request as HttpRequest;
    use axum::response::{Html, IntoResponse};
    use axum::routing::get;
    use axum::{Json, Router};
    use futures_util::stream;
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::io::Write;
    use tower::util::ServiceExt;
    use triage_core::{Config, DeploymentMode};

    const PAGE: &str = "<html><head></head><body><h1>Oops</h1></body></html>";

    struct Harness {
        _dir: tempfile::TempDir,
        app: Router,
    }

    fn harness_with(mode: DeploymentMode, tweak: impl FnOnce(&mut Config)) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut log = std::fs::File::create(dir.path().join("development.log")).expect("log file");
        writeln!(log, "Started GET /broken").unwrap();
        writeln!(log, "Completed 500 Internal Server Error").unwrap();
        let mut cfg = Config {
            logs_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        tweak(&mut cfg);
        let diag = Arc::new(Diagnostics::new(cfg, mode).expect("diagnostics"));
        let host = Router::new()
            .route("/ok", get(|| async { Html(PAGE) }))
            .route(
                "/broken",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Html(PAGE)) }),
            )
            .route(
                "/boom",
                get(|| async {
                    CapturedException::new("NoMethodError: undefined method 'foo'", vec!["a.rb:1".into(), "b.rb:2".into()])
                        .into_error_page(StatusCode::INTERNAL_SERVER_ERROR)
                }),
            )
            .route(
                "/json",
                get(|| async { (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": "bad"}))) }),
            )
            .route(
                "/stream",
                get(|| async {
                    let chunks = vec![
                        Ok::<_, std::io::Error>(Bytes::from_static(b"<html><BODY>")),
                        Ok(Bytes::from_static(b"streamed")),
                        Ok(Bytes::from_static(b"</BODY></html>")),
                    ];
                    (StatusCode::BAD_GATEWAY, Body::from_stream(stream::iter(chunks))).into_response()
                }),
            )
            .route(
                "/torn",
                get(|| async {
                    let chunks = vec![
                        Ok(Bytes::from_static(b"partial")),
                        Err(std::io::Error::other("connection reset")),
                    ];
                    (StatusCode::INTERNAL_SERVER_ERROR, Body::from_stream(stream::iter(chunks))).into_response()
                }),
            )
            .route(
                "/gz",
                get(|| async {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        [(header::CONTENT_ENCODING, "gzip")],
                        vec![0x1fu8, 0x8b, 0x08],
                    )
                }),
            )
            .route(
                "/app.js",
                get(|| async { (StatusCode::NOT_FOUND, "missing asset") }),
            )
            .route("/panic", get(exploding_handler));
        Harness {
            _dir: dir,
            app: attach(host, diag),
        }
    }

    async fn exploding_handler() -> &'static str {
        panic!("handler exploded")
    }

    fn harness(mode: DeploymentMode) -> Harness {
        harness_with(mode, |_| {})
    }

    async fn call(app: &Router, method: Method, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        let request = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.expect("body").to_bytes();
        (status, headers, body.to_vec())
    }

    async fn get_path(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        call(app, Method::GET, uri).await
    }

    fn content_length(headers: &HeaderMap) -> usize {
        headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .expect("content-length header")
    }

    #[tokio::test]
    async fn success_responses_pass_through_unchanged() {
        let h = harness(DeploymentMode::Development);
        let (status, headers, body) = get_path(&h.app, "/ok").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, PAGE.as_bytes());
        assert!(headers.get(HANDLED_HEADER).is_none());
    }

    #[tokio::test]
    async fn disabled_config_passes_errors_through() {
        let h = harness_with(DeploymentMode::Development, |cfg| cfg.enabled = false);
        let (status, headers, body) = get_path(&h.app, "/broken").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, PAGE.as_bytes());
        assert!(headers.get(HANDLED_HEADER).is_none());
    }

    #[tokio::test]
    async fn non_development_modes_pass_errors_through() {
        for mode in [DeploymentMode::Production, DeploymentMode::Test] {
            let h = harness(mode);
            let (_, headers, body) = get_path(&h.app, "/broken").await;
            assert_eq!(body, PAGE.as_bytes(), "{mode}");
            assert!(headers.get(HANDLED_HEADER).is_none());
        }
    }

    #[tokio::test]
    async fn error_page_gets_widget_before_body_close() {
        let h = harness(DeploymentMode::Development);
        let (status, headers, body) = get_path(&h.app, "/broken").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(headers.get(HANDLED_HEADER).unwrap(), "true");
        assert_eq!(content_length(&headers), body.len());
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains(WIDGET_MARKER));
        let widget_at = text.find(WIDGET_MARKER).unwrap();
        let close_at = text.find("</body>").unwrap();
        assert!(widget_at < close_at);
        assert!(text.starts_with("<html><head></head><body><h1>Oops</h1>"));
        assert!(text.contains(r#""status":500"#));
        assert!(text.contains(r#""path":"/broken""#));
        assert!(text.contains("Completed 500 Internal Server Error"));
    }

    #[tokio::test]
    async fn attached_exception_selects_exception_record() {
        let h = harness(DeploymentMode::Development);
        let (_, headers, body) = get_path(&h.app, "/boom").await;
        assert_eq!(content_length(&headers), body.len());
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains(r#""exception":"NoMethodError: undefined method 'foo'""#));
        assert!(text.contains(r#""backtrace":["a.rb:1","b.rb:2"]"#));
        assert!(!text.contains(r#""status":500"#));
    }

    #[tokio::test]
    async fn panics_become_intercepted_exception_pages() {
        let h = harness(DeploymentMode::Development);
        let (status, headers, body) = get_path(&h.app, "/panic").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(headers.get(HANDLED_HEADER).unwrap(), "true");
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains(r#""exception":"panic: handler exploded""#));
    }

    #[tokio::test]
    async fn non_html_errors_are_retyped_as_html() {
        let h = harness(DeploymentMode::Development);
        let (status, headers, body) = get_path(&h.app, "/json").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), HTML_CONTENT_TYPE);
        assert_eq!(content_length(&headers), body.len());
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with(r#"{"error":"bad"}"#), "appended after original body");
        assert!(text.contains(WIDGET_MARKER));
    }

    #[tokio::test]
    async fn unmatched_routes_get_the_widget_too() {
        let h = harness(DeploymentMode::Development);
        let (status, headers, body) = get_path(&h.app, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(content_length(&headers), body.len());
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains(r#""status":404,"path":"/missing""#));
    }

    #[tokio::test]
    async fn streamed_bodies_are_buffered_and_spliced() {
        let h = harness(DeploymentMode::Development);
        let (status, headers, body) = get_path(&h.app, "/stream").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(content_length(&headers), body.len());
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("<html><BODY>streamed"));
        assert!(text.ends_with("</BODY></html>"));
        assert!(text.contains(WIDGET_MARKER));
    }

    #[tokio::test]
    async fn oversized_stream_is_replayed_untouched() {
        let h = harness_with(DeploymentMode::Development, |cfg| cfg.max_body_bytes = 8);
        let (status, headers, body) = get_path(&h.app, "/stream").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body, b"<html><BODY>streamed</BODY></html>".to_vec());
        assert!(headers.get(HANDLED_HEADER).is_none());
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
    }

    #[tokio::test]
    async fn stream_within_limit_is_still_spliced() {
        let limit = b"<html><BODY>streamed</BODY></html>".len();
        let h = harness_with(DeploymentMode::Development, |cfg| cfg.max_body_bytes = limit);
        let (_, headers, body) = get_path(&h.app, "/stream").await;
        assert_eq!(headers.get(HANDLED_HEADER).unwrap(), "true");
        assert_eq!(content_length(&headers), body.len());
    }

    #[tokio::test]
    async fn exception_from_outer_layer_request_extension_is_used() {
        let h = harness(DeploymentMode::Development);
        let app = h.app.clone().layer(axum::middleware::from_fn(
            |mut req: Request, next: Next| async move {
                req.extensions_mut().insert(CapturedException::new(
                    "RecordNotFound: order 7",
                    vec!["orders.rs:12".into()],
                ));
                next.run(req).await
            },
        ));
        let (status, headers, body) = get_path(&app, "/broken").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(headers.get(HANDLED_HEADER).unwrap(), "true");
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains(r#""exception":"RecordNotFound: order 7""#));
        assert!(text.contains(r#""backtrace":["orders.rs:12"]"#));
        assert!(!text.contains(r#""status":500"#));
    }

    #[tokio::test]
    async fn response_exception_wins_over_request_extension() {
        let h = harness(DeploymentMode::Development);
        let app = h.app.clone().layer(axum::middleware::from_fn(
            |mut req: Request, next: Next| async move {
                req.extensions_mut()
                    .insert(CapturedException::new("from request", Vec::new()));
                next.run(req).await
            },
        ));
        let (_, _, body) = get_path(&app, "/boom").await;
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains(r#""exception":"NoMethodError: undefined method 'foo'""#));
        assert!(!text.contains("from request"));
    }

    #[tokio::test]
    async fn unreadable_body_degrades_to_empty_response() {
        let h = harness(DeploymentMode::Development);
        let (status, headers, body) = get_path(&h.app, "/torn").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_empty());
        assert_eq!(content_length(&headers), 0);
        assert!(headers.get(HANDLED_HEADER).is_none());
    }

    #[tokio::test]
    async fn encoded_bodies_are_left_alone() {
        let h = harness(DeploymentMode::Development);
        let (_, headers, body) = get_path(&h.app, "/gz").await;
        assert_eq!(body, vec![0x1f, 0x8b, 0x08]);
        assert!(headers.get(HANDLED_HEADER).is_none());
    }

    #[tokio::test]
    async fn head_requests_are_left_alone() {
        let h = harness(DeploymentMode::Development);
        let (status, headers, _) = call(&h.app, Method::HEAD, "/broken").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(headers.get(HANDLED_HEADER).is_none());
    }

    #[tokio::test]
    async fn oversized_bodies_are_left_alone() {
        let h = harness_with(DeploymentMode::Development, |cfg| cfg.max_body_bytes = 8);
        let (_, headers, body) = get_path(&h.app, "/broken").await;
        assert_eq!(body, PAGE.as_bytes());
        assert!(headers.get(HANDLED_HEADER).is_none());
    }

    #[tokio::test]
    async fn ignored_extensions_are_opt_in() {
        let h = harness(DeploymentMode::Development);
        let (_, headers, _) = get_path(&h.app, "/app.js").await;
        assert!(headers.get(HANDLED_HEADER).is_some(), "intercepted by default");

        let h = harness_with(DeploymentMode::Development, |cfg| {
            cfg.ignore_extensions = vec!["js".into()];
        });
        let (_, headers, body) = get_path(&h.app, "/app.js").await;
        assert_eq!(body, b"missing asset");
        assert!(headers.get(HANDLED_HEADER).is_none());
    }

    #[test]
    fn extension_matching_ignores_dots_and_case() {
        let ignore = vec![".CSS".to_string(), "png".to_string()];
        assert!(ignored_extension("/assets/site.css", &ignore));
        assert!(ignored_extension("/img/logo.PNG", &ignore));
        assert!(!ignored_extension("/assets.css/page", &ignore));
        assert!(!ignored_extension("/.png", &ignore));
        assert!(!ignored_extension("/site.css", &[]));
    }
}
