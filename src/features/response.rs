//! Response-side feature and its lifecycle callbacks.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::{HeaderMap, StatusCode};

use crate::net::exchange::ListenerResponse;
use crate::BoxError;

/// A registered `on_starting` / `on_completed` callback.
pub(crate) type ResponseCallback = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Misuse of the response feature.
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("response has already started; status and headers are read-only")]
    AlreadyStarted,

    #[error("response has already completed")]
    AlreadyCompleted,

    #[error("response has already been closed")]
    Closed,
}

#[derive(Default)]
struct Callbacks {
    starting: Vec<ResponseCallback>,
    completed: Vec<ResponseCallback>,
}

/// Status, headers and body of the response, plus lifecycle hooks.
///
/// Status and headers may change until the response starts. The body can be
/// written until the exchange is closed.
#[derive(Clone)]
pub struct HttpResponseFeature {
    response: ListenerResponse,
    callbacks: Arc<Mutex<Callbacks>>,
    starting_fired: Arc<AtomicBool>,
    started: Arc<AtomicBool>,
    completed: Arc<AtomicBool>,
}

impl HttpResponseFeature {
    pub(crate) fn new(response: ListenerResponse) -> Self {
        Self {
            response,
            callbacks: Arc::new(Mutex::new(Callbacks::default())),
            starting_fired: Arc::new(AtomicBool::new(false)),
            started: Arc::new(AtomicBool::new(false)),
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn set_status(&self, status: StatusCode) -> Result<(), ResponseError> {
        self.ensure_not_started()?;
        self.response.set_status(status);
        Ok(())
    }

    /// Canonical reason phrase for the current status, if it has one.
    pub fn reason_phrase(&self) -> Option<&'static str> {
        self.status().canonical_reason()
    }

    pub fn headers(&self) -> HeaderMap {
        self.response.headers()
    }

    pub fn with_headers<R>(&self, f: impl FnOnce(&mut HeaderMap) -> R) -> Result<R, ResponseError> {
        self.ensure_not_started()?;
        Ok(self.response.with_headers(f))
    }

    pub fn write(&self, bytes: &[u8]) -> Result<(), ResponseError> {
        self.response.write(bytes).map_err(|_| ResponseError::Closed)
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Register a callback to run just before the response is flushed.
    ///
    /// Starting callbacks may still change status and headers.
    pub fn on_starting<F, Fut>(&self, callback: F) -> Result<(), ResponseError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        if self.starting_fired.load(Ordering::SeqCst) {
            return Err(ResponseError::AlreadyStarted);
        }
        self.lock().starting.push(Box::new(move || callback().boxed()));
        Ok(())
    }

    /// Register a callback to run once the application has finished.
    pub fn on_completed<F, Fut>(&self, callback: F) -> Result<(), ResponseError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        if self.completed.load(Ordering::SeqCst) {
            return Err(ResponseError::AlreadyCompleted);
        }
        self.lock().completed.push(Box::new(move || callback().boxed()));
        Ok(())
    }

    /// Hand back the starting callbacks, last registered first. Empty on
    /// every call after the first. Status and headers stay writable until
    /// [`mark_started`](Self::mark_started).
    pub(crate) fn begin_start(&self) -> Vec<ResponseCallback> {
        if self.starting_fired.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }
        let mut callbacks = std::mem::take(&mut self.lock().starting);
        callbacks.reverse();
        callbacks
    }

    /// Freeze status and headers.
    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    /// Mark the response completed and hand back the completed callbacks,
    /// last registered first. Empty on every call after the first.
    pub(crate) fn begin_complete(&self) -> Vec<ResponseCallback> {
        if self.completed.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }
        let mut callbacks = std::mem::take(&mut self.lock().completed);
        callbacks.reverse();
        callbacks
    }

    fn ensure_not_started(&self) -> Result<(), ResponseError> {
        if self.has_started() {
            Err(ResponseError::AlreadyStarted)
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Callbacks> {
        self.callbacks.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl std::fmt::Debug for HttpResponseFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponseFeature")
            .field("status", &self.status())
            .field("has_started", &self.has_started())
            .finish()
    }
}
