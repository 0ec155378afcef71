//! Host allow-lists for forwarding targets and referring pages.
//!
//! # Design Decisions
//! - Built once at startup, never mutated; shared by reference across tasks
//! - Exact match on `host[:port]`, lowercased
//! - Empty entries are discarded so a blank flag cannot admit a missing referrer

use std::collections::HashSet;
use url::Url;

use crate::config::AllowConfig;

/// An immutable set of permitted hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    hosts: HashSet<String>,
}

impl AllowList {
    /// Build from individual entries, normalizing case and dropping blanks.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = entries
            .into_iter()
            .map(|entry| entry.as_ref().trim().to_lowercase())
            .filter(|entry| !entry.is_empty())
            .collect();
        Self { hosts }
    }

    /// Parse a comma-separated list such as `a.example,b.example:8080`.
    pub fn from_comma_separated(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// Returns true if `host` is permitted.
    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }

    /// Returns true if `url`'s host is permitted.
    pub fn permits(&self, url: &Url) -> bool {
        self.contains(&host_key(url))
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// The pair of allow-lists consulted for every request.
#[derive(Debug, Clone, Default)]
pub struct AllowLists {
    /// Hosts that may be forwarded to.
    pub targets: AllowList,
    /// Hosts of pages that may use the relay.
    pub referrers: AllowList,
}

impl AllowLists {
    pub fn from_config(config: &AllowConfig) -> Self {
        Self {
            targets: AllowList::new(&config.hosts),
            referrers: AllowList::new(&config.referrers),
        }
    }
}

/// The `host[:port]` form of a URL used for allow-list lookups.
///
/// The port is only present when the URL names a non-default one, so
/// `https://api.example:443/` and `https://api.example/` share a key.
/// URLs without a host yield an empty key, which never matches.
pub fn host_key(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}
