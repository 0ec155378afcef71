//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarding handler produces:
//!     → logging.rs (one line on receipt, one per failure)
//!     → metrics.rs (request counter, latency histogram)
//!     → tower-http TraceLayer (span per request with a request ID)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
