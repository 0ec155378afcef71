//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{read_config, validate_config, ConfigError, ListenerMode, RelayConfig};

#[derive(Debug, Parser)]
#[command(name = "cors-relay")]
#[command(about = "Forwards HTTP requests and adds 'Access-Control-Allow-Origin: *'.", long_about = None)]
pub struct Cli {
    /// host:port to listen on
    #[arg(long)]
    pub addr: Option<String>,

    /// Serve FastCGI instead of plain HTTP. The responder listens on --addr
    /// over TCP; it does not take over an inherited socket.
    #[arg(long)]
    pub fastcgi: bool,

    /// Comma-separated list of allowed forwarding hosts
    #[arg(long)]
    pub hosts: Option<String>,

    /// Comma-separated list of allowed referrer hosts
    #[arg(long)]
    pub referrers: Option<String>,

    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    pub log_level: Option<String>,

    /// Upstream request timeout in seconds (none by default)
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl Cli {
    /// Assemble the effective configuration: file, then flags, then validation.
    pub fn into_config(self) -> Result<RelayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => RelayConfig::default(),
        };

        if let Some(addr) = self.addr {
            config.listener.bind_address = addr;
        }
        if self.fastcgi {
            config.listener.mode = ListenerMode::FastCgi;
        }
        if let Some(hosts) = self.hosts {
            config.allow.hosts = split_list(&hosts);
        }
        if let Some(referrers) = self.referrers {
            config.allow.referrers = split_list(&referrers);
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeouts.request_secs = Some(secs);
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

/// Split a comma-separated flag value, dropping blank entries.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
