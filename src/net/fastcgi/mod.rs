//! FastCGI responder mode.
//!
//! # Data Flow
//! ```text
//! front-end web server
//!     → record.rs (framing, name-value pairs)
//!     → server.rs (per-connection request assembly, one task per request)
//!     → request.rs (CGI params → http::Request)
//!     → same axum Router as the HTTP listener
//!     → server.rs (CGI header block + STDOUT records via the connection writer)
//! ```

pub mod record;
pub mod request;
pub mod server;

use thiserror::Error;

pub use server::{serve_connection, FastCgiServer};

#[derive(Debug, Error)]
pub enum FastCgiError {
    #[error("FastCGI I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad FastCGI params: {0}")]
    BadParams(String),

    #[error("FastCGI connection closed")]
    Closed,
}
