//! Response relay and failure responses.
//!
//! # Responsibilities
//! - Copy upstream headers onto the caller's response
//! - Add `Access-Control-Allow-Origin: *`
//! - Build the generic failure response
//!
//! # Design Decisions
//! - Headers are copied before the upstream status is checked, so they stay
//!   visible on the 500 sent for a non-200 upstream
//! - Failure bodies never carry error details

use axum::body::Body;
use axum::http::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_ENCODING, CONTENT_LENGTH,
    CONTENT_TYPE, TRANSFER_ENCODING, X_CONTENT_TYPE_OPTIONS,
};
use axum::http::StatusCode;
use axum::response::Response;

/// Body sent with every failure status.
pub const FAILURE_BODY: &str = "Failed\n";

/// Copy every upstream header (all values) and set the CORS allow-origin.
///
/// `Transfer-Encoding` is framing between the relay and the upstream and is
/// left for the serving transport to decide.
pub fn relay_headers(upstream: &HeaderMap, relayed: &mut HeaderMap) {
    for (name, value) in upstream.iter() {
        if *name == TRANSFER_ENCODING {
            continue;
        }
        relayed.append(name.clone(), value.clone());
    }
    relayed.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
}

/// Successful relay: status 200 with the relayed headers and upstream body.
pub fn relayed_response(headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.headers_mut() = headers;
    response
}

/// Generic plain-text failure keeping whatever headers were already relayed.
pub fn failure_response(status: StatusCode, mut headers: HeaderMap) -> Response {
    // These describe the upstream body, which is not being sent.
    headers.remove(CONTENT_LENGTH);
    headers.remove(CONTENT_ENCODING);
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    let mut response = Response::new(Body::from(FAILURE_BODY));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::SET_COOKIE;

    #[test]
    fn relay_preserves_multi_value_headers() {
        let mut upstream = HeaderMap::new();
        upstream.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        upstream.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        upstream.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        upstream.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let mut relayed = HeaderMap::new();
        relay_headers(&upstream, &mut relayed);

        let cookies: Vec<_> = relayed.get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(relayed[CONTENT_TYPE], "application/json");
        assert_eq!(relayed[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(!relayed.contains_key(TRANSFER_ENCODING));
    }

    #[test]
    fn relay_overwrites_upstream_allow_origin() {
        let mut upstream = HeaderMap::new();
        upstream.append(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://only.example"),
        );
        upstream.append(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://other.example"),
        );

        let mut relayed = HeaderMap::new();
        relay_headers(&upstream, &mut relayed);

        let origins: Vec<_> = relayed.get_all(ACCESS_CONTROL_ALLOW_ORIGIN).iter().collect();
        assert_eq!(origins, vec!["*"]);
    }

    #[test]
    fn failure_keeps_relayed_headers_but_not_body_framing() {
        let mut relayed = HeaderMap::new();
        relayed.insert("x-upstream", HeaderValue::from_static("yes"));
        relayed.insert(CONTENT_LENGTH, HeaderValue::from_static("1234"));
        relayed.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        relayed.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        relayed.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

        let response = failure_response(StatusCode::INTERNAL_SERVER_ERROR, relayed);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let headers = response.headers();
        assert_eq!(headers["x-upstream"], "yes");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert!(!headers.contains_key(CONTENT_LENGTH));
        assert!(!headers.contains_key(CONTENT_ENCODING));
    }
}
