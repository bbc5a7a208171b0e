//! Server lifecycle: owns the listener, the worker pool and the shutdown
//! signal.
//!
//! # Data Flow
//! ```text
//! start(app):
//!     ServerAddresses → HttpListener prefixes (catch-all removed)
//!     → listener.start() → spawn pool_size × worker::run
//!
//! stop():
//!     CancellationSignal::cancel → await every worker → listener.close()
//! ```
//!
//! # Design Decisions
//! - The listener is closed only after every worker has exited
//! - A server instance starts at most once
//! - `stop` survives being cancelled: a later call picks up where it left off
//! - Dropping a running server cancels and closes without waiting

pub mod pool;
pub mod worker;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::application::HttpApplication;
use crate::config::ServerConfig;
use crate::features::{FeatureCollection, ServerAddresses, ServerAddressesFeature};
use crate::lifecycle::CancellationSignal;
use crate::net::listener::DEFAULT_QUEUE_CAPACITY;
use crate::net::{HttpListener, ListenerError, CATCH_ALL_PREFIX};

pub use pool::{default_pool_size, pool_size};
pub use worker::{diagnostic, process_exchange, ExchangeError};

use worker::Worker;

/// Error type for server lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server has already been started")]
    AlreadyStarted,

    #[error("no addresses configured")]
    NoAddresses,

    #[error("server must be started inside a tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A server a host can start and stop.
pub trait Server: Send {
    /// Server-level features, e.g. [`ServerAddressesFeature`].
    fn features(&self) -> &FeatureCollection;

    fn start<A: HttpApplication>(&mut self, application: A) -> Result<(), ServerError>;

    /// Resolves once the server has fully stopped.
    fn stop(&mut self) -> impl Future<Output = ()> + Send;
}

/// Server driving a pool of worker loops over one [`HttpListener`].
pub struct HttpListenerServer {
    features: FeatureCollection,
    addresses: ServerAddresses,
    pool_size: usize,
    queue_capacity: usize,
    signal: CancellationSignal,
    listener: Option<Arc<HttpListener>>,
    workers: Vec<JoinHandle<()>>,
    started: bool,
}

impl HttpListenerServer {
    /// Server sized for this machine.
    pub fn new() -> Self {
        Self::with_pool_size(default_pool_size())
    }

    /// Server with an explicit worker count (at least one).
    pub fn with_pool_size(pool_size: usize) -> Self {
        let addresses = ServerAddresses::new();
        let mut features = FeatureCollection::new();
        features.set(ServerAddressesFeature {
            addresses: addresses.clone(),
        });

        Self {
            features,
            addresses,
            pool_size: pool_size.max(1),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            signal: CancellationSignal::new(),
            listener: None,
            workers: Vec::new(),
            started: false,
        }
    }

    /// Server tuned from configuration. Addresses are applied by the host.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut server = Self::with_pool_size(config.workers.unwrap_or_else(default_pool_size));
        server.queue_capacity = config.request_queue_capacity.max(1);
        server
    }

    /// Addresses to bind, read once by `start`.
    pub fn addresses(&self) -> &ServerAddresses {
        &self.addresses
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// The running listener, if started and not yet stopped.
    pub fn listener(&self) -> Option<&Arc<HttpListener>> {
        self.listener.as_ref()
    }

    /// Bound socket addresses (useful when a prefix asked for port 0).
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listener
            .as_ref()
            .map(|l| l.local_addrs().to_vec())
            .unwrap_or_default()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|l| l.is_listening())
    }

    /// Worker loops that have not exited yet.
    pub fn running_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    /// Bind the configured addresses and spawn the worker pool.
    ///
    /// Sockets are bound before this returns. A server that started once
    /// cannot be started again, even after `stop`.
    pub fn start<A: HttpApplication>(&mut self, application: A) -> Result<(), ServerError> {
        if self.started {
            return Err(ServerError::AlreadyStarted);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ServerError::NoRuntime)?;

        let addresses = self.addresses.snapshot();
        if addresses.is_empty() {
            return Err(ServerError::NoAddresses);
        }

        let mut listener = HttpListener::with_queue_capacity(self.queue_capacity);
        // Configured addresses replace the listener's implicit catch-all.
        listener.prefixes_mut().remove(CATCH_ALL_PREFIX);
        for address in &addresses {
            listener.prefixes_mut().add(&with_trailing_slash(address))?;
        }
        listener.start()?;
        self.started = true;

        let listener = Arc::new(listener);
        let application = Arc::new(application);
        for id in 0..self.pool_size {
            let worker = Worker {
                id,
                listener: Arc::clone(&listener),
                application: Arc::clone(&application),
                signal: self.signal.clone(),
            };
            self.workers.push(runtime.spawn(worker.run()));
        }

        tracing::info!(
            addresses = ?addresses,
            local_addrs = ?listener.local_addrs(),
            workers = self.pool_size,
            "Server started"
        );
        self.listener = Some(listener);
        Ok(())
    }

    /// Cancel, wait for every worker loop to exit, then close the listener.
    ///
    /// In-flight exchanges finish first, so this takes as long as the
    /// slowest one. A worker handle is only released once it has been
    /// joined, so if this future is dropped part way, the next call resumes
    /// the join and still closes the listener. Calls after a completed stop
    /// do nothing.
    pub async fn stop(&mut self) {
        if self.signal.cancel() {
            tracing::info!(workers = self.workers.len(), "Stopping server");
        }

        while let Some(worker) = self.workers.last_mut() {
            let joined = worker.await;
            self.workers.pop();
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker loop ended abnormally");
            }
        }

        if let Some(listener) = self.listener.take() {
            listener.close();
            tracing::info!("Server stopped");
        }
    }
}

impl Default for HttpListenerServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HttpListenerServer {
    fn drop(&mut self) {
        self.signal.cancel();
        if let Some(listener) = self.listener.take() {
            listener.close();
        }
    }
}

impl Server for HttpListenerServer {
    fn features(&self) -> &FeatureCollection {
        &self.features
    }

    fn start<A: HttpApplication>(&mut self, application: A) -> Result<(), ServerError> {
        HttpListenerServer::start(self, application)
    }

    async fn stop(&mut self) {
        HttpListenerServer::stop(self).await
    }
}

fn with_trailing_slash(address: &str) -> String {
    if address.ends_with('/') {
        address.to_string()
    } else {
        format!("{}/", address)
    }
}
