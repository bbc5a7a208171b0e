//! Request-side features.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderMap, Method, Version};
use http_body_util::BodyExt;

use crate::net::exchange::{ListenerRequest, RequestBodyStream};
use crate::BoxError;

/// Errors reading the request body.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("request body has already been taken")]
    AlreadyTaken,

    #[error("failed to read request body: {0}")]
    Read(#[source] BoxError),
}

/// Take-once handle to the request body stream.
#[derive(Clone, Default)]
pub struct RequestBody {
    stream: Arc<Mutex<Option<RequestBodyStream>>>,
}

impl RequestBody {
    pub(crate) fn new(stream: Option<RequestBodyStream>) -> Self {
        Self {
            stream: Arc::new(Mutex::new(stream)),
        }
    }

    /// Take the raw body stream. Later calls, from any clone, get `None`.
    pub fn take(&self) -> Option<RequestBodyStream> {
        self.stream.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    pub fn is_taken(&self) -> bool {
        self.stream.lock().unwrap_or_else(|p| p.into_inner()).is_none()
    }

    /// Read the whole body into memory.
    pub async fn bytes(&self) -> Result<Bytes, BodyError> {
        let stream = self.take().ok_or(BodyError::AlreadyTaken)?;
        let collected = stream.collect().await.map_err(BodyError::Read)?;
        Ok(collected.to_bytes())
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBody").field("taken", &self.is_taken()).finish()
    }
}

/// The parsed request as seen by the application.
///
/// `path_base` is the path of the prefix that matched; `path` is the rest,
/// always starting with `/`.
#[derive(Debug, Clone)]
pub struct HttpRequestFeature {
    pub protocol: Version,
    pub scheme: &'static str,
    pub method: Method,
    pub path_base: String,
    pub path: String,
    pub query: Option<String>,
    pub raw_target: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl HttpRequestFeature {
    pub(crate) fn from_listener_request(request: &mut ListenerRequest) -> Self {
        let body = RequestBody::new(request.take_body());
        let uri = request.uri();
        let full_path = uri.path();
        let path_base = request.path_base().to_string();

        let path = match full_path.strip_prefix(path_base.as_str()) {
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            Some(rest) => format!("/{}", rest),
            None => full_path.to_string(),
        };
        let raw_target = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| full_path.to_string());

        Self {
            protocol: request.version(),
            scheme: "http",
            method: request.method().clone(),
            path,
            query: uri.query().map(str::to_string),
            raw_target,
            headers: request.headers().clone(),
            path_base,
            body,
        }
    }
}

/// Per-exchange trace identifier.
#[derive(Debug, Clone)]
pub struct HttpRequestIdentifierFeature {
    pub trace_identifier: String,
}

impl HttpRequestIdentifierFeature {
    pub fn generate() -> Self {
        Self {
            trace_identifier: uuid::Uuid::new_v4().to_string(),
        }
    }
}
