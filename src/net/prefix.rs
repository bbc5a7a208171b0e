//! URL prefix parsing and the ordered prefix set a listener is bound to.
//!
//! A prefix looks like `http://host:port/path/`. Hosts `*` and `+` are
//! wildcards and bind every interface.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

use url::Url;

use crate::net::listener::ListenerError;

/// Catch-all prefix the listener installs before any address is configured.
pub const CATCH_ALL_PREFIX: &str = "http://*:80/";

/// A parsed listener prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPrefix {
    host: String,
    port: u16,
    path: String,
}

impl UrlPrefix {
    /// Parse a prefix string. A missing trailing slash is tolerated.
    pub fn parse(raw: &str) -> Result<Self, ListenerError> {
        let url = Url::parse(raw).map_err(|e| ListenerError::InvalidPrefix {
            prefix: raw.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" => {}
            "https" => return Err(ListenerError::UnsupportedScheme(raw.to_string())),
            other => {
                return Err(ListenerError::InvalidPrefix {
                    prefix: raw.to_string(),
                    reason: format!("unknown scheme `{}`", other),
                })
            }
        }

        if url.query().is_some() || url.fragment().is_some() {
            return Err(ListenerError::InvalidPrefix {
                prefix: raw.to_string(),
                reason: "prefixes cannot carry a query or fragment".to_string(),
            });
        }

        let host = url
            .host_str()
            .ok_or_else(|| ListenerError::InvalidPrefix {
                prefix: raw.to_string(),
                reason: "missing host".to_string(),
            })?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_ascii_lowercase();
        let port = url.port_or_known_default().unwrap_or(80);

        let mut path = url.path().to_string();
        if !path.ends_with('/') {
            path.push('/');
        }

        Ok(Self { host, port, path })
    }

    /// Host component, lowercased. `*` and `+` mean "any interface".
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path component, always ending in `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_wildcard(&self) -> bool {
        self.host == "*" || self.host == "+"
    }

    /// Socket address this prefix binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr, ListenerError> {
        if self.is_wildcard() {
            return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port));
        }
        if self.host == "localhost" {
            return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.port));
        }
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }

        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ListenerError::InvalidPrefix {
                prefix: self.to_string(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| ListenerError::InvalidPrefix {
                prefix: self.to_string(),
                reason: "host did not resolve".to_string(),
            })
    }

    /// Whether a request path falls under this prefix.
    ///
    /// `/app/` matches `/app`, `/app/` and anything below it.
    pub fn matches_path(&self, request_path: &str) -> bool {
        if request_path.starts_with(self.path.as_str()) {
            return true;
        }
        let bare = self.path.trim_end_matches('/');
        !bare.is_empty() && request_path == bare
    }
}

impl fmt::Display for UrlPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "http://[{}]:{}{}", self.host, self.port, self.path)
        } else {
            write!(f, "http://{}:{}{}", self.host, self.port, self.path)
        }
    }
}

/// Ordered, de-duplicated set of prefixes owned by a listener.
#[derive(Debug, Clone, Default)]
pub struct ListenerPrefixes {
    entries: Vec<UrlPrefix>,
}

impl ListenerPrefixes {
    /// The set a fresh listener starts with: just the catch-all.
    pub(crate) fn with_catch_all() -> Self {
        Self {
            entries: vec![UrlPrefix {
                host: "*".to_string(),
                port: 80,
                path: "/".to_string(),
            }],
        }
    }

    /// Add a prefix. Returns `false` if it was already present.
    pub fn add(&mut self, raw: &str) -> Result<bool, ListenerError> {
        let prefix = UrlPrefix::parse(raw)?;
        if self.entries.contains(&prefix) {
            return Ok(false);
        }
        self.entries.push(prefix);
        Ok(true)
    }

    /// Remove a prefix. Unparsable or absent prefixes are a no-op.
    pub fn remove(&mut self, raw: &str) -> bool {
        let Ok(prefix) = UrlPrefix::parse(raw) else {
            return false;
        };
        let before = self.entries.len();
        self.entries.retain(|p| p != &prefix);
        before != self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UrlPrefix> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
