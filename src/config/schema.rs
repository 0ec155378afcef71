//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, protocol).
    pub listener: ListenerConfig,

    /// Target and referrer host allow-lists.
    pub allow: AllowConfig,

    /// Upstream client timeouts.
    pub timeouts: TimeoutConfig,

    /// Inbound request limits.
    pub limits: LimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Protocol spoken on the listening socket.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListenerMode {
    /// Plain HTTP/1.1.
    #[default]
    Http,
    /// FastCGI responder behind a front-end web server.
    FastCgi,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "localhost:8000").
    pub bind_address: String,

    pub mode: ListenerMode,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "localhost:8000".to_string(),
            mode: ListenerMode::Http,
        }
    }
}

/// Allowed hosts, as bare `host[:port]` entries.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AllowConfig {
    /// Hosts that requests may be forwarded to.
    pub hosts: Vec<String>,

    /// Hosts of referring pages that may use the relay.
    pub referrers: Vec<String>,
}

/// Upstream timeouts. Unset means the client waits indefinitely.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: Option<u64>,

    /// Total time for the upstream request/response in seconds.
    pub request_secs: Option<u64>,
}

/// Inbound request limits.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitConfig {
    /// Largest request body that will be buffered for forwarding.
    pub max_body_bytes: Option<usize>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is unset (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prometheus scrape endpoint; metrics are not exported when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [allow]
            hosts = ["api.example"]
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "localhost:8000");
        assert_eq!(config.listener.mode, ListenerMode::Http);
        assert_eq!(config.allow.hosts, vec!["api.example".to_string()]);
        assert!(config.allow.referrers.is_empty());
        assert_eq!(config.timeouts.request_secs, None);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn fastcgi_mode_parses() {
        let config: RelayConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"
            mode = "fastcgi"

            [timeouts]
            request_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.mode, ListenerMode::FastCgi);
        assert_eq!(config.timeouts.request_secs, Some(30));
        assert_eq!(config.timeouts.connect_secs, None);
    }
}
