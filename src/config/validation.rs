//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject allow-list entries that are not bare hosts
//! - Validate value ranges (timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs after command-line overrides are applied

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::RelayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address must not be empty")]
    EmptyBindAddress,

    #[error("allow.{list} contains an empty entry")]
    EmptyHost { list: &'static str },

    #[error("allow.{list} entry {entry:?} must be a bare host[:port]")]
    NotAHost { list: &'static str, entry: String },

    #[error("timeouts.{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },

    #[error("observability.metrics_address {0:?} is not a socket address")]
    BadMetricsAddress(String),
}

/// Validate a fully assembled configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.trim().is_empty() {
        errors.push(ValidationError::EmptyBindAddress);
    }

    check_hosts("hosts", &config.allow.hosts, &mut errors);
    check_hosts("referrers", &config.allow.referrers, &mut errors);

    if config.timeouts.connect_secs == Some(0) {
        errors.push(ValidationError::ZeroTimeout { field: "connect_secs" });
    }
    if config.timeouts.request_secs == Some(0) {
        errors.push(ValidationError::ZeroTimeout { field: "request_secs" });
    }

    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::BadMetricsAddress(addr.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_hosts(list: &'static str, entries: &[String], errors: &mut Vec<ValidationError>) {
    for entry in entries {
        if entry.trim().is_empty() {
            errors.push(ValidationError::EmptyHost { list });
        } else if entry.contains(|c: char| c == '/' || c == '@' || c == '?' || c.is_whitespace()) {
            errors.push(ValidationError::NotAHost {
                list,
                entry: entry.clone(),
            });
        }
    }
}
