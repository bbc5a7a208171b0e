//! One accepted request/response pair, as handed out by the listener.
//!
//! The request side is already parsed by hyper. The response side is a
//! buffered handle: nothing reaches the client until [`ListenerResponse::close`]
//! hands the finished response back to the connection task.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use http::{request, HeaderMap, Method, Response, StatusCode, Uri, Version};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::Full;
use tokio::sync::oneshot;

use crate::net::connection::ConnectionId;
use crate::BoxError;

/// Request body stream as the listener hands it out.
pub type RequestBodyStream = UnsyncBoxBody<Bytes, BoxError>;

/// Finished response sent back to the connection task.
pub type ListenerResponseMessage = Response<Full<Bytes>>;

/// Addressing details of the connection an exchange arrived on.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
}

/// Parsed request half of an exchange.
#[derive(Debug)]
pub struct ListenerRequest {
    parts: request::Parts,
    path_base: String,
    body: Option<RequestBodyStream>,
}

impl ListenerRequest {
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn version(&self) -> Version {
        self.parts.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Path of the prefix this request matched, without the trailing slash.
    pub fn path_base(&self) -> &str {
        &self.path_base
    }

    /// Take the body stream. Only the first call gets it.
    pub fn take_body(&mut self) -> Option<RequestBodyStream> {
        self.body.take()
    }
}

#[derive(Debug)]
struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    responder: Option<oneshot::Sender<ListenerResponseMessage>>,
}

/// Error returned when writing to a response that was already closed.
#[derive(Debug, thiserror::Error)]
#[error("response has already been closed")]
pub struct ResponseClosed;

/// Shared handle to the response half of an exchange.
///
/// Clones refer to the same response; closing through any clone closes it
/// for all of them.
#[derive(Debug, Clone)]
pub struct ListenerResponse {
    state: Arc<Mutex<ResponseState>>,
}

impl ListenerResponse {
    fn new(responder: oneshot::Sender<ListenerResponseMessage>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ResponseState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: BytesMut::new(),
                responder: Some(responder),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResponseState> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> StatusCode {
        self.lock().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.lock().status = status;
    }

    /// Snapshot of the current response headers.
    pub fn headers(&self) -> HeaderMap {
        self.lock().headers.clone()
    }

    /// Mutate the response headers in place.
    pub fn with_headers<R>(&self, f: impl FnOnce(&mut HeaderMap) -> R) -> R {
        f(&mut self.lock().headers)
    }

    /// Append bytes to the buffered body.
    pub fn write(&self, bytes: &[u8]) -> Result<(), ResponseClosed> {
        let mut state = self.lock();
        if state.responder.is_none() {
            return Err(ResponseClosed);
        }
        state.body.extend_from_slice(bytes);
        Ok(())
    }

    /// Discard whatever body has been buffered so far.
    pub fn clear_body(&self) {
        self.lock().body.clear();
    }

    /// Copy of the buffered body.
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock().body)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().responder.is_none()
    }

    /// Send the buffered response to the client and release the exchange.
    ///
    /// Returns `true` only for the call that actually closed the response.
    pub fn close(&self) -> bool {
        let (responder, message) = {
            let mut state = self.lock();
            let Some(responder) = state.responder.take() else {
                return false;
            };
            let body = state.body.split().freeze();
            let mut message = Response::new(Full::new(body));
            *message.status_mut() = state.status;
            *message.headers_mut() = std::mem::take(&mut state.headers);
            (responder, message)
        };

        if responder.send(message).is_err() {
            tracing::trace!("Client went away before the response was closed");
        }
        true
    }
}

/// One accepted request and its response, owned by a single worker.
#[derive(Debug)]
pub struct ListenerExchange {
    request: ListenerRequest,
    response: ListenerResponse,
    connection: ConnectionInfo,
}

impl ListenerExchange {
    /// Build an exchange from parsed request parts.
    ///
    /// The returned receiver yields the response once it is closed. The
    /// listener uses this for every request it queues; it also lets an
    /// application be driven without a socket.
    pub fn new(
        parts: request::Parts,
        body: RequestBodyStream,
        path_base: impl Into<String>,
        connection: ConnectionInfo,
    ) -> (Self, oneshot::Receiver<ListenerResponseMessage>) {
        let (tx, rx) = oneshot::channel();
        let exchange = Self {
            request: ListenerRequest {
                parts,
                path_base: path_base.into(),
                body: Some(body),
            },
            response: ListenerResponse::new(tx),
            connection,
        };
        (exchange, rx)
    }

    pub fn request(&self) -> &ListenerRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut ListenerRequest {
        &mut self.request
    }

    pub fn response(&self) -> &ListenerResponse {
        &self.response
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use http_body_util::BodyExt;

    /// Exchange for `method path` carrying `body`, on loopback addresses.
    pub(crate) fn exchange(
        method: Method,
        path: &str,
        body: &'static str,
    ) -> (ListenerExchange, oneshot::Receiver<ListenerResponseMessage>) {
        build(method, path, body, "")
    }

    /// GET exchange whose request matched a prefix with path `path_base`.
    pub(crate) fn exchange_with_base(
        path: &str,
        path_base: &str,
    ) -> (ListenerExchange, oneshot::Receiver<ListenerResponseMessage>) {
        build(Method::GET, path, "", path_base)
    }

    fn build(
        method: Method,
        path: &str,
        body: &'static str,
        path_base: &str,
    ) -> (ListenerExchange, oneshot::Receiver<ListenerResponseMessage>) {
        let (parts, ()) = http::Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost")
            .body(())
            .unwrap()
            .into_parts();
        let body = Full::new(Bytes::from_static(body.as_bytes()))
            .map_err(|never| match never {})
            .boxed_unsync();
        let connection = ConnectionInfo {
            id: ConnectionId::new(),
            remote_addr: "127.0.0.1:40000".parse().unwrap(),
            local_addr: "127.0.0.1:5000".parse().unwrap(),
        };
        ListenerExchange::new(parts, body, path_base, connection)
    }
}
