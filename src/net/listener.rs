//! Prefix-based HTTP listener.
//!
//! # Responsibilities
//! - Bind one TCP socket per distinct prefix endpoint
//! - Serve HTTP/1.1 connections via hyper
//! - Route each request to its longest matching prefix
//! - Queue parsed requests as [`ListenerExchange`]s for [`HttpListener::accept`]
//! - Release sockets, connections and queued exchanges on close

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::exchange::{ConnectionInfo, ListenerExchange, ListenerResponseMessage};
use crate::net::prefix::{ListenerPrefixes, UrlPrefix};
use crate::BoxError;

/// Default number of parsed requests that may wait for a worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid prefix `{prefix}`: {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("https prefixes are not supported: {0}")]
    UnsupportedScheme(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("listener has no prefixes to bind")]
    NoPrefixes,

    #[error("listener must be started inside a tokio runtime")]
    NoRuntime,

    #[error("listener is already started")]
    AlreadyStarted,

    #[error("listener is closed")]
    Closed,
}

/// Prefixes served by one bound socket, longest path first.
#[derive(Debug)]
struct Endpoint {
    local_addr: SocketAddr,
    prefixes: Vec<UrlPrefix>,
}

impl Endpoint {
    fn match_path(&self, path: &str) -> Option<&UrlPrefix> {
        self.prefixes.iter().find(|p| p.matches_path(path))
    }
}

/// State shared between the accept loops and connection tasks.
#[derive(Clone)]
struct Dispatch {
    queue: mpsc::Sender<ListenerExchange>,
    closed: watch::Receiver<bool>,
    connections: ConnectionTracker,
}

/// An HTTP listener bound to a set of URL prefixes.
///
/// Configure prefixes with [`prefixes_mut`](Self::prefixes_mut), then call
/// [`start`](Self::start). After start the listener is normally shared behind
/// an `Arc`; `accept` is safe to call from many tasks at once. A closed
/// listener cannot be started again.
pub struct HttpListener {
    prefixes: ListenerPrefixes,
    listening: AtomicBool,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    queue_tx: mpsc::Sender<ListenerExchange>,
    queue_rx: tokio::sync::Mutex<mpsc::Receiver<ListenerExchange>>,
    local_addrs: Vec<SocketAddr>,
    accept_tasks: Mutex<Vec<JoinHandle<()>>>,
    connections: ConnectionTracker,
}

impl HttpListener {
    /// Create a listener holding only the catch-all prefix.
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(capacity: usize) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
        let (closed_tx, _) = watch::channel(false);
        Self {
            prefixes: ListenerPrefixes::with_catch_all(),
            listening: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            closed_tx,
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(queue_rx),
            local_addrs: Vec::new(),
            accept_tasks: Mutex::new(Vec::new()),
            connections: ConnectionTracker::new(),
        }
    }

    pub fn prefixes(&self) -> &ListenerPrefixes {
        &self.prefixes
    }

    /// Prefix set, editable until the listener is started.
    pub fn prefixes_mut(&mut self) -> &mut ListenerPrefixes {
        &mut self.prefixes
    }

    /// Bind every prefix endpoint and begin accepting connections.
    ///
    /// Sockets are bound before this returns, so `local_addrs` is accurate
    /// immediately afterwards.
    pub fn start(&mut self) -> Result<(), ListenerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ListenerError::Closed);
        }
        if self.listening.load(Ordering::SeqCst) {
            return Err(ListenerError::AlreadyStarted);
        }
        if self.prefixes.is_empty() {
            return Err(ListenerError::NoPrefixes);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ListenerError::NoRuntime)?;

        let mut groups: Vec<(SocketAddr, Vec<UrlPrefix>)> = Vec::new();
        for prefix in self.prefixes.iter() {
            let addr = prefix.bind_addr()?;
            match groups.iter_mut().find(|(a, _)| *a == addr) {
                Some((_, prefixes)) => prefixes.push(prefix.clone()),
                None => groups.push((addr, vec![prefix.clone()])),
            }
        }

        let mut bound = Vec::with_capacity(groups.len());
        for (addr, mut prefixes) in groups {
            let socket = bind_socket(addr, &runtime)?;
            let local_addr = socket.local_addr().map_err(|source| ListenerError::Bind { addr, source })?;
            prefixes.sort_by(|a, b| b.path().len().cmp(&a.path().len()));

            tracing::info!(
                address = %local_addr,
                prefixes = ?prefixes.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "Listener bound"
            );
            bound.push((socket, Endpoint { local_addr, prefixes }));
        }

        let dispatch = Dispatch {
            queue: self.queue_tx.clone(),
            closed: self.closed_tx.subscribe(),
            connections: self.connections.clone(),
        };

        let mut tasks = lock(&self.accept_tasks);
        for (socket, endpoint) in bound {
            self.local_addrs.push(endpoint.local_addr);
            let dispatch = dispatch.clone();
            tasks.push(runtime.spawn(accept_loop(socket, Arc::new(endpoint), dispatch)));
        }
        drop(tasks);

        self.listening.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Addresses the listener's sockets are bound to.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Number of client connections currently open.
    pub fn open_connections(&self) -> u64 {
        self.connections.open_count()
    }

    /// Wait for the next parsed request.
    ///
    /// Cancel-safe: dropping the future never loses a queued exchange.
    /// Returns [`ListenerError::Closed`] once the listener is closed, which
    /// also wakes every caller currently suspended here.
    pub async fn accept(&self) -> Result<ListenerExchange, ListenerError> {
        if !self.is_listening() {
            return Err(ListenerError::Closed);
        }

        let next = async {
            let mut queue = self.queue_rx.lock().await;
            queue.recv().await
        };

        tokio::select! {
            biased;
            _ = wait_closed(self.closed_tx.subscribe()) => Err(ListenerError::Closed),
            exchange = next => exchange.ok_or(ListenerError::Closed),
        }
    }

    /// Stop accepting, shut down open connections and drop queued exchanges.
    ///
    /// Returns `true` only for the call that actually closed the listener.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.listening.store(false, Ordering::SeqCst);
        self.closed_tx.send_replace(true);

        for task in lock(&self.accept_tasks).drain(..) {
            task.abort();
        }

        // Queued exchanges are dropped here; their clients get a 503.
        let mut abandoned = 0usize;
        if let Ok(mut queue) = self.queue_rx.try_lock() {
            queue.close();
            while queue.try_recv().is_ok() {
                abandoned += 1;
            }
        }

        tracing::info!(
            abandoned_requests = abandoned,
            open_connections = self.connections.open_count(),
            "Listener closed"
        );
        true
    }
}

impl Default for HttpListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HttpListener {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for HttpListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpListener")
            .field("prefixes", &self.prefixes)
            .field("listening", &self.is_listening())
            .field("local_addrs", &self.local_addrs)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn bind_socket(addr: SocketAddr, runtime: &tokio::runtime::Handle) -> Result<TcpListener, ListenerError> {
    let bind_err = |source| ListenerError::Bind { addr, source };
    let std_listener = std::net::TcpListener::bind(addr).map_err(bind_err)?;
    std_listener.set_nonblocking(true).map_err(bind_err)?;
    let _guard = runtime.enter();
    TcpListener::from_std(std_listener).map_err(bind_err)
}

/// Resolves once the listener has been closed (or dropped).
async fn wait_closed(mut closed: watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

async fn accept_loop(socket: TcpListener, endpoint: Arc<Endpoint>, dispatch: Dispatch) {
    loop {
        let accepted = tokio::select! {
            _ = wait_closed(dispatch.closed.clone()) => break,
            accepted = socket.accept() => accepted,
        };

        match accepted {
            Ok((stream, remote_addr)) => {
                let guard = dispatch.connections.track();
                tracing::debug!(
                    connection_id = %guard.id(),
                    peer_addr = %remote_addr,
                    local_addr = %endpoint.local_addr,
                    "Connection accepted"
                );
                tokio::spawn(serve_connection(
                    stream,
                    remote_addr,
                    Arc::clone(&endpoint),
                    dispatch.clone(),
                    guard,
                ));
            }
            Err(e) => {
                // Usually fd exhaustion; back off instead of spinning.
                tracing::warn!(error = %e, local_addr = %endpoint.local_addr, "Accept failed");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
    tracing::debug!(local_addr = %endpoint.local_addr, "Accept loop stopped");
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    endpoint: Arc<Endpoint>,
    dispatch: Dispatch,
    guard: ConnectionGuard,
) {
    let connection = ConnectionInfo {
        id: guard.id(),
        remote_addr,
        local_addr: endpoint.local_addr,
    };
    let closed = dispatch.closed.clone();

    let service = service_fn(move |request| {
        route_request(request, connection, Arc::clone(&endpoint), dispatch.clone())
    });
    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = wait_closed(closed) => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        tracing::debug!(connection_id = %connection.id, error = %e, "Connection ended with error");
    }
    drop(guard);
}

async fn route_request(
    request: Request<Incoming>,
    connection: ConnectionInfo,
    endpoint: Arc<Endpoint>,
    dispatch: Dispatch,
) -> Result<ListenerResponseMessage, Infallible> {
    let Some(prefix) = endpoint.match_path(request.uri().path()) else {
        tracing::debug!(path = %request.uri().path(), "No prefix matched");
        return Ok(status_only(StatusCode::NOT_FOUND));
    };
    let path_base = prefix.path().trim_end_matches('/').to_string();

    let (parts, body) = request.into_parts();
    let body = body.map_err(BoxError::from).boxed_unsync();
    let (exchange, response) = ListenerExchange::new(parts, body, path_base, connection);

    let queued = tokio::select! {
        sent = dispatch.queue.send(exchange) => sent.is_ok(),
        _ = wait_closed(dispatch.closed.clone()) => false,
    };
    if !queued {
        return Ok(status_only(StatusCode::SERVICE_UNAVAILABLE));
    }

    // A dropped responder means the exchange was abandoned on close.
    Ok(response
        .await
        .unwrap_or_else(|_| status_only(StatusCode::SERVICE_UNAVAILABLE)))
}

fn status_only(status: StatusCode) -> ListenerResponseMessage {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
