//! A built host: one server plus the configuration it runs with.

use std::future::Future;

use crate::application::HttpApplication;
use crate::config::{ServerConfig, ValidationErrors};
use crate::features::ServerAddressesFeature;
use crate::server::{Server, ServerError};

/// Error type for host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationErrors),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Runs a registered server around an application.
pub struct Host<S> {
    server: S,
    config: ServerConfig,
}

impl<S: Server> Host<S> {
    pub(crate) fn new(server: S, config: ServerConfig) -> Self {
        Self { server, config }
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut S {
        &mut self.server
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Hand the configured urls to the server and start it.
    ///
    /// Urls already present on the server's address feature take precedence
    /// over the configuration.
    pub fn start<A: HttpApplication>(&mut self, application: A) -> Result<(), HostError> {
        if let Some(feature) = self.server.features().get::<ServerAddressesFeature>() {
            if feature.addresses.is_empty() {
                for url in &self.config.urls {
                    feature.addresses.add(url.as_str());
                }
            }
        }
        self.server.start(application)?;
        Ok(())
    }

    pub async fn stop(&mut self) {
        self.server.stop().await;
    }

    /// Start, wait for `shutdown`, then stop.
    pub async fn run<A, F>(mut self, application: A, shutdown: F) -> Result<(), HostError>
    where
        A: HttpApplication,
        F: Future<Output = ()>,
    {
        self.start(application)?;
        shutdown.await;
        self.stop().await;
        Ok(())
    }
}
