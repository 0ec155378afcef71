//! Inbound request inspection and outbound request construction.
//!
//! # Responsibilities
//! - Extract the forwarding target (`url` query parameter)
//! - Extract the referring page (`Referer` header)
//! - Build the upstream request with only the forwarded header set
//!
//! # Design Decisions
//! - The inbound body is fully buffered before the upstream request is built
//! - Header forwarding is an allow-list; cookies and credentials never leave

use axum::body::Bytes;
use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONTENT_LENGTH,
    CONTENT_TYPE, REFERER,
};
use axum::http::{Method, Uri};
use url::Url;

/// Query parameter carrying the forwarding target.
pub const TARGET_PARAM: &str = "url";

/// Request headers copied from the caller to the upstream.
pub const FORWARDED_HEADERS: [HeaderName; 5] = [
    ACCEPT,
    ACCEPT_ENCODING,
    ACCEPT_LANGUAGE,
    CONTENT_LENGTH,
    CONTENT_TYPE,
];

/// The raw `url` query parameter, form-decoded, or empty if absent.
pub fn target_param(uri: &Uri) -> String {
    uri.query()
        .and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == TARGET_PARAM)
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_default()
}

/// The raw `Referer` header, or empty if absent or not valid text.
pub fn referrer(headers: &HeaderMap) -> &str {
    headers
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Copy the first value of each forwarded header present on `inbound`.
pub fn copy_forwarded_headers(inbound: &HeaderMap, outbound: &mut HeaderMap) {
    for name in FORWARDED_HEADERS.iter() {
        if let Some(value) = inbound.get(name) {
            outbound.insert(name.clone(), value.clone());
        }
    }
}

/// Build the upstream request for a validated target.
///
/// A forwarded `Content-Length` is rewritten to the buffered body's length so
/// it always agrees with what is actually sent.
pub fn build_outbound(
    client: &reqwest::Client,
    method: Method,
    target: Url,
    inbound: &HeaderMap,
    body: Bytes,
) -> Result<reqwest::Request, reqwest::Error> {
    let body_len = body.len();
    let mut request = client.request(method, target).body(body).build()?;

    let headers = request.headers_mut();
    copy_forwarded_headers(inbound, headers);
    if headers.contains_key(CONTENT_LENGTH) {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body_len));
    }

    Ok(request)
}
