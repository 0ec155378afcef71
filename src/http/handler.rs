//! The forwarding pipeline.
//!
//! ```text
//! referrer check → target check → buffer body → build upstream request
//!     → dispatch → copy headers + CORS → status check → stream body
//! ```
//!
//! Every stage short-circuits with a [`RelayError`]. The caller only ever sees
//! a status code and a generic body; the error is logged with the method and
//! the requested target.

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use futures_util::TryStreamExt;
use url::Url;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::http::request::{build_outbound, referrer, target_param};
use crate::http::response::{failure_response, relay_headers, relayed_response};
use crate::observability::metrics;
use crate::security::AllowLists;

/// Forwards validated requests to allow-listed upstreams.
///
/// Holds only immutable state, so one instance serves every request
/// concurrently.
#[derive(Debug, Clone)]
pub struct ForwardHandler {
    allow: AllowLists,
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl ForwardHandler {
    pub fn new(allow: AllowLists, client: reqwest::Client, max_body_bytes: usize) -> Self {
        Self {
            allow,
            client,
            max_body_bytes,
        }
    }

    /// Build the handler and its upstream client from configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeouts.connect_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = config.timeouts.request_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self::new(
            AllowLists::from_config(&config.allow),
            builder.build()?,
            config.limits.max_body_bytes.unwrap_or(usize::MAX),
        ))
    }

    pub fn allow_lists(&self) -> &AllowLists {
        &self.allow
    }

    /// Handle one inbound request end to end.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let target = target_param(request.uri());

        tracing::info!(method = %method, target = %target, "Forwarding request");

        let mut headers = HeaderMap::new();
        let response = match self.forward(request, &target, &mut headers).await {
            Ok(body) => relayed_response(headers, body),
            Err(err) => {
                tracing::warn!(method = %method, target = %target, error = %err, "Request failed");
                failure_response(err.status(), headers)
            }
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), start);
        response
    }

    /// Run the pipeline, filling `headers` with the relayed response headers.
    ///
    /// Headers are written as soon as the upstream answers, before its status
    /// is checked, so a failure after that point still carries them.
    async fn forward(
        &self,
        request: Request<Body>,
        target: &str,
        headers: &mut HeaderMap,
    ) -> Result<Body, RelayError> {
        let (parts, body) = request.into_parts();

        self.check_referrer(referrer(&parts.headers))?;
        let url = self.check_target(target)?;

        let body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(RelayError::ReadBody)?;

        let outbound = build_outbound(&self.client, parts.method.clone(), url, &parts.headers, body)
            .map_err(RelayError::BuildRequest)?;

        let upstream = self
            .client
            .execute(outbound)
            .await
            .map_err(RelayError::Upstream)?;

        relay_headers(upstream.headers(), headers);

        let status = upstream.status();
        if status != StatusCode::OK {
            return Err(RelayError::UpstreamStatus(status));
        }

        Ok(relay_body(upstream, parts.method, target.to_string()))
    }

    fn check_referrer(&self, referrer: &str) -> Result<(), RelayError> {
        let url = Url::parse(referrer).map_err(|source| RelayError::BadReferrer {
            referrer: referrer.to_string(),
            source,
        })?;
        if !self.allow.referrers.permits(&url) {
            return Err(RelayError::ReferrerNotAllowed(referrer.to_string()));
        }
        Ok(())
    }

    fn check_target(&self, target: &str) -> Result<Url, RelayError> {
        let url = Url::parse(target).map_err(|source| RelayError::BadTarget {
            target: target.to_string(),
            source,
        })?;
        if !self.allow.targets.permits(&url) {
            return Err(RelayError::TargetNotAllowed(target.to_string()));
        }
        Ok(url)
    }
}

/// Stream the upstream body to the caller unchanged.
///
/// The response is already committed once streaming starts, so a mid-body
/// failure can only be logged.
fn relay_body(upstream: reqwest::Response, method: Method, target: String) -> Body {
    let stream = upstream.bytes_stream().inspect_err(move |err| {
        tracing::warn!(method = %method, target = %target, error = %err, "Failed copying response");
    });
    Body::from_stream(stream)
}
