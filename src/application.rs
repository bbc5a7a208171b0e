//! The application contract the server drives for every exchange.
//!
//! # Responsibilities
//! - Define the create / process / dispose contract over an opaque context
//! - Provide [`HttpContext`], a ready-made context over the standard features
//! - Provide [`FnApplication`] for hosts that only need an async handler

use std::error::Error;
use std::future::Future;
use std::net::SocketAddr;

use crate::features::{
    FeatureCollection, HttpConnectionFeature, HttpRequestFeature, HttpRequestIdentifierFeature,
    HttpResponseFeature,
};
use crate::BoxError;

/// Application-processing contract.
///
/// For each accepted exchange the server calls `create_context`, then
/// `process_request`, then `dispose_context`. An error from either of the
/// first two, or a panic from any of them, becomes a 500 for that exchange
/// only.
pub trait HttpApplication: Send + Sync + 'static {
    /// Per-exchange state built from the exchange's features.
    type Context: Send + 'static;

    fn create_context(&self, features: FeatureCollection) -> Result<Self::Context, BoxError>;

    fn process_request(
        &self,
        context: &mut Self::Context,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Release the context. `error` is the processing failure, if any.
    fn dispose_context(&self, context: Self::Context, error: Option<&(dyn Error + 'static)>);
}

/// A required feature was absent from the collection.
#[derive(Debug, thiserror::Error)]
#[error("required feature `{0}` is missing")]
pub struct MissingFeature(pub &'static str);

fn require<T: Clone + Send + Sync + 'static>(features: &FeatureCollection) -> Result<T, MissingFeature> {
    features
        .get::<T>()
        .cloned()
        .ok_or(MissingFeature(std::any::type_name::<T>()))
}

/// Context over the standard request, response and connection features.
#[derive(Debug, Clone)]
pub struct HttpContext {
    features: FeatureCollection,
    request: HttpRequestFeature,
    response: HttpResponseFeature,
    connection: Option<HttpConnectionFeature>,
    trace_identifier: Option<String>,
}

impl HttpContext {
    pub fn new(features: FeatureCollection) -> Result<Self, MissingFeature> {
        Ok(Self {
            request: require(&features)?,
            response: require(&features)?,
            connection: features.get::<HttpConnectionFeature>().cloned(),
            trace_identifier: features
                .get::<HttpRequestIdentifierFeature>()
                .map(|f| f.trace_identifier.clone()),
            features,
        })
    }

    pub fn request(&self) -> &HttpRequestFeature {
        &self.request
    }

    pub fn response(&self) -> &HttpResponseFeature {
        &self.response
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.connection.as_ref().map(|c| c.remote_addr)
    }

    pub fn connection(&self) -> Option<&HttpConnectionFeature> {
        self.connection.as_ref()
    }

    pub fn trace_identifier(&self) -> Option<&str> {
        self.trace_identifier.as_deref()
    }

    /// Full feature collection, for features beyond the standard ones.
    pub fn features(&self) -> &FeatureCollection {
        &self.features
    }
}

/// Application built from an async handler over [`HttpContext`].
pub struct FnApplication<F> {
    handler: F,
}

impl<F, Fut> FnApplication<F>
where
    F: Fn(HttpContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F, Fut> HttpApplication for FnApplication<F>
where
    F: Fn(HttpContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    type Context = HttpContext;

    fn create_context(&self, features: FeatureCollection) -> Result<HttpContext, BoxError> {
        Ok(HttpContext::new(features)?)
    }

    fn process_request(
        &self,
        context: &mut HttpContext,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        (self.handler)(context.clone())
    }

    fn dispose_context(&self, context: HttpContext, error: Option<&(dyn Error + 'static)>) {
        if let Some(error) = error {
            tracing::debug!(
                trace_identifier = context.trace_identifier().unwrap_or("-"),
                error = %error,
                "Request handler failed"
            );
        }
    }
}
