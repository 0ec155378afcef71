//! Request pipeline errors.
//!
//! Every stage of the forwarding pipeline fails with a [`RelayError`]. The
//! handler boundary logs the error and maps it to a status code; the error
//! text itself never reaches the caller.

use axum::http::StatusCode;
use thiserror::Error;

/// Failure of a single forwarded request.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("bad referrer {referrer:?}: {source}")]
    BadReferrer {
        referrer: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid referrer {0:?}")]
    ReferrerNotAllowed(String),

    #[error("bad URL {target:?}: {source}")]
    BadTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid host in URL {0:?}")]
    TargetNotAllowed(String),

    #[error("failed reading request body: {0}")]
    ReadBody(#[source] axum::Error),

    #[error("failed building upstream request: {0}")]
    BuildRequest(#[source] reqwest::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[source] reqwest::Error),

    #[error("server returned {0}")]
    UpstreamStatus(StatusCode),
}

impl RelayError {
    /// Status code sent to the caller for this failure.
    pub fn status(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// True when the caller supplied an unusable referrer or target.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RelayError::BadReferrer { .. }
                | RelayError::ReferrerNotAllowed(_)
                | RelayError::BadTarget { .. }
                | RelayError::TargetNotAllowed(_)
        )
    }
}
