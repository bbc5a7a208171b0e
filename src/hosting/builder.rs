//! Host builder and server registration.

use crate::config::{validate_config, ServerConfig};
use crate::hosting::host::{Host, HostError};
use crate::server::{HttpListenerServer, Server};

/// Marker for a builder that has no server registered yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoServer;

/// Builds a [`Host`]. A server must be registered before `build`.
pub struct HostBuilder<S = NoServer> {
    config: ServerConfig,
    factory: fn(&ServerConfig) -> S,
}

impl HostBuilder<NoServer> {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            factory: |_| NoServer,
        }
    }
}

impl Default for HostBuilder<NoServer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> HostBuilder<S> {
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the configured urls.
    pub fn urls<I, U>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<String>,
    {
        self.config.urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Register the listener-backed server as this host's server.
    pub fn use_http_listener(self) -> HostBuilder<HttpListenerServer> {
        self.use_server(HttpListenerServer::from_config)
    }

    /// Register any server, built from the final configuration.
    pub fn use_server<T: Server>(self, factory: fn(&ServerConfig) -> T) -> HostBuilder<T> {
        HostBuilder {
            config: self.config,
            factory,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl<S: Server> HostBuilder<S> {
    /// Validate the configuration and construct the server.
    pub fn build(self) -> Result<Host<S>, HostError> {
        validate_config(&self.config)?;
        let server = (self.factory)(&self.config);
        Ok(Host::new(server, self.config))
    }
}
