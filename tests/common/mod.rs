//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use cors_relay::http::ForwardHandler;
use cors_relay::security::{AllowList, AllowLists};
use cors_relay::HttpServer;
use futures_util::{stream, StreamExt};
use tokio::net::TcpListener;

pub const REFERRER: &str = "https://allowed.example/page";
pub const REFERRER_HOST: &str = "allowed.example";

/// How long `/slow` waits before answering.
pub const SLOW_DELAY: Duration = Duration::from_secs(2);

/// A local upstream that counts every request it receives.
pub struct MockUpstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl MockUpstream {
    /// The `host:port` allow-list entry for this upstream.
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start a mock upstream on an ephemeral port.
///
/// Routes:
/// - `/data`: 200 `{"ok":true}`
/// - `/echo-headers`: 200, received headers as sorted `name: value` lines
/// - `/echo-body`: 200, request body echoed back
/// - `/cookies`: 200 with two `Set-Cookie` values and its own allow-origin
/// - `/unavailable`: 503 with `x-upstream: yes`
/// - `/slow`: 200 `slow` after [`SLOW_DELAY`]
/// - `/broken-body`: 200, a first chunk, then the connection drops mid-body
pub async fn start_mock_upstream() -> MockUpstream {
    let hits = Arc::new(AtomicUsize::new(0));

    let app = Router::new()
        .route(
            "/data",
            get(|| async { ([(CONTENT_TYPE, "application/json")], r#"{"ok":true}"#) }),
        )
        .route("/echo-headers", any(echo_headers))
        .route("/echo-body", any(|body: Bytes| async move { body }))
        .route("/cookies", get(cookies))
        .route(
            "/unavailable",
            any(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    [("x-upstream", "yes")],
                    "down for maintenance",
                )
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(SLOW_DELAY).await;
                "slow"
            }),
        )
        .route("/broken-body", get(broken_body))
        .layer(middleware::from_fn_with_state(hits.clone(), count_hits));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockUpstream { addr, hits }
}

async fn count_hits(State(hits): State<Arc<AtomicUsize>>, request: Request, next: Next) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

async fn echo_headers(headers: HeaderMap) -> String {
    let mut lines: Vec<String> = headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value.to_str().unwrap_or("?")))
        .collect();
    lines.sort();
    lines.join("\n")
}

async fn cookies() -> Response {
    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
    headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("https://only.example"),
    );
    (headers, "cookies").into_response()
}

async fn broken_body() -> Response {
    let chunks = stream::iter([Ok(Bytes::from_static(b"partial"))]).chain(stream::once(async {
        // Give the server time to flush the head and first chunk.
        tokio::time::sleep(Duration::from_millis(50)).await;
        Err::<Bytes, _>(io::Error::other("upstream went away"))
    }));
    Response::new(Body::from_stream(chunks))
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Relay router allowing the given target hosts and the standard referrer.
pub fn relay_router(targets: &[String]) -> Router {
    let allow = AllowLists {
        targets: AllowList::new(targets),
        referrers: AllowList::new([REFERRER_HOST]),
    };
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    HttpServer::with_handler(ForwardHandler::new(allow, client, usize::MAX)).router()
}

/// Inbound request for `target` with the standard referrer.
pub fn relay_request(method: &str, target: &str) -> axum::http::request::Builder {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    axum::http::Request::builder()
        .method(method)
        .uri(format!("/?url={encoded}"))
        .header("referer", REFERRER)
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub fn empty() -> Body {
    Body::empty()
}

/// In-memory `tracing` output for asserting on log lines.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route this thread's `tracing` events here until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let logs = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || logs.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
