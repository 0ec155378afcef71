//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → server.rs (Axum setup, request span)
//!     → handler.rs (forwarding pipeline)
//!     → request.rs (target, referrer, outbound request)
//!     → response.rs (header relay, CORS, failures)
//!     → Send to client
//! ```

pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use handler::ForwardHandler;
pub use server::HttpServer;
