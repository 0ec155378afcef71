//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → allow_list.rs (referrer host must be listed)
//!     → allow_list.rs (target host must be listed)
//!     → http::request (only the forwarded header set survives)
//! ```
//!
//! # Design Decisions
//! - Fail closed: an unknown host is always rejected
//! - No trust in client input

pub mod allow_list;

pub use allow_list::{host_key, AllowList, AllowLists};
