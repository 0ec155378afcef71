//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router around the forwarding handler
//! - Wire up middleware (request span with request ID)
//! - Serve on a bound listener with graceful shutdown

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::http::handler::ForwardHandler;

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &RelayConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_handler(ForwardHandler::from_config(config)?))
    }

    /// Create a server around an already built handler.
    pub fn with_handler(handler: ForwardHandler) -> Self {
        let handler = Arc::new(handler);

        tracing::debug!(
            target_hosts = handler.allow_lists().targets.len(),
            referrer_hosts = handler.allow_lists().referrers.len(),
            "Allow-lists loaded"
        );

        Self {
            router: Self::build_router(handler),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(handler: Arc<ForwardHandler>) -> Router {
        Router::new()
            .route("/{*path}", any(relay_handler))
            .route("/", any(relay_handler))
            .with_state(handler)
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
    }

    /// The router, for serving through another transport or in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn relay_handler(
    State(handler): State<Arc<ForwardHandler>>,
    request: Request<Body>,
) -> Response {
    handler.handle(request).await
}

fn request_span(request: &Request<Body>) -> tracing::Span {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    tracing::info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        peer = ?peer,
    )
}
