//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → HTTP mode: axum::serve (http::server)
//!     → FastCGI mode: fastcgi::server (record protocol)
//!     → both dispatch into the same forwarding router
//! ```

pub mod fastcgi;
