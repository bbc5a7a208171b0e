//! Adapts one listener exchange into a [`FeatureCollection`].

use crate::features::collection::FeatureCollection;
use crate::features::connection::HttpConnectionFeature;
use crate::features::request::{HttpRequestFeature, HttpRequestIdentifierFeature};
use crate::features::response::{HttpResponseFeature, ResponseCallback};
use crate::net::exchange::ListenerExchange;
use crate::BoxError;

/// The feature view of a single exchange.
///
/// Construction only wraps handles: the request body is not read and nothing
/// is written to the response.
#[derive(Debug)]
pub struct FeatureContext {
    features: FeatureCollection,
    response: HttpResponseFeature,
}

impl FeatureContext {
    pub fn new(exchange: &mut ListenerExchange) -> Self {
        let connection = HttpConnectionFeature::from(exchange.connection());
        let response = HttpResponseFeature::new(exchange.response().clone());
        let request = HttpRequestFeature::from_listener_request(exchange.request_mut());

        let mut features = FeatureCollection::new();
        features.set(request);
        features.set(response.clone());
        features.set(connection);
        features.set(HttpRequestIdentifierFeature::generate());

        Self { features, response }
    }

    pub fn features(&self) -> &FeatureCollection {
        &self.features
    }

    /// Run the `on_starting` callbacks, then freeze status and headers.
    /// Only the first call runs anything.
    pub async fn fire_on_starting(&self) -> Result<(), BoxError> {
        let result = run_callbacks(self.response.begin_start()).await;
        self.response.mark_started();
        result
    }

    /// Run the `on_completed` callbacks. Only the first call runs anything.
    pub async fn fire_on_completed(&self) -> Result<(), BoxError> {
        run_callbacks(self.response.begin_complete()).await
    }
}

/// Runs callbacks in order, stopping at the first failure.
async fn run_callbacks(callbacks: Vec<ResponseCallback>) -> Result<(), BoxError> {
    for callback in callbacks {
        callback().await?;
    }
    Ok(())
}
