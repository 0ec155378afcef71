//! CORS relay library.
//!
//! Forwards a caller-chosen URL to allow-listed upstreams and adds
//! `Access-Control-Allow-Origin: *` to the relayed response.

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::RelayConfig;
pub use error::RelayError;
pub use http::{ForwardHandler, HttpServer};
pub use lifecycle::Shutdown;
