//! CGI parameters to HTTP request conversion.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Method, Request};

use crate::net::fastcgi::FastCgiError;

/// Build the HTTP request described by a responder's params and stdin.
pub fn build_request(
    params: &HashMap<String, String>,
    body: Bytes,
) -> Result<Request<Body>, FastCgiError> {
    let method = params
        .get("REQUEST_METHOD")
        .map(String::as_str)
        .unwrap_or("GET");
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| FastCgiError::BadParams(format!("invalid REQUEST_METHOD {method:?}")))?;

    let mut builder = Request::builder().method(method).uri(request_uri(params));

    for (name, value) in params {
        let header = match name.as_str() {
            "CONTENT_TYPE" => Some(CONTENT_TYPE),
            "CONTENT_LENGTH" => Some(CONTENT_LENGTH),
            _ => name
                .strip_prefix("HTTP_")
                .and_then(|h| HeaderName::from_bytes(h.replace('_', "-").as_bytes()).ok()),
        };
        let (Some(header), Ok(value)) = (header, HeaderValue::from_str(value)) else {
            continue;
        };
        if value.is_empty() && (header == CONTENT_TYPE || header == CONTENT_LENGTH) {
            continue;
        }
        builder = builder.header(header, value);
    }

    if let Some(peer) = remote_addr(params) {
        builder = builder.extension(ConnectInfo(peer));
    }

    builder
        .body(Body::from(body))
        .map_err(|e| FastCgiError::BadParams(e.to_string()))
}

/// `REQUEST_URI` when the front-end provides it, otherwise reassembled from
/// the script path and query string.
fn request_uri(params: &HashMap<String, String>) -> String {
    if let Some(uri) = params.get("REQUEST_URI").filter(|u| !u.is_empty()) {
        return uri.clone();
    }

    let script = params.get("SCRIPT_NAME").map(String::as_str).unwrap_or("");
    let path_info = params.get("PATH_INFO").map(String::as_str).unwrap_or("");
    let mut uri = format!("{script}{path_info}");
    if !uri.starts_with('/') {
        uri.insert(0, '/');
    }
    match params.get("QUERY_STRING") {
        Some(query) if !query.is_empty() => format!("{uri}?{query}"),
        _ => uri,
    }
}

fn remote_addr(params: &HashMap<String, String>) -> Option<SocketAddr> {
    let ip: IpAddr = params.get("REMOTE_ADDR")?.parse().ok()?;
    let port = params
        .get("REMOTE_PORT")
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);
    Some(SocketAddr::new(ip, port))
}
