//! Worker loop: accept, adapt, run the application, respond, repeat.
//!
//! Cancellation is non-preemptive. A loop notices the signal at the top of
//! an iteration or while it is idle in `accept`; once it owns an exchange it
//! runs that exchange to completion. There is no per-exchange timeout, so an
//! application that never returns holds its loop (and `stop`) indefinitely.

use std::any::Any;
use std::error::Error;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use tracing::Instrument;

use crate::application::HttpApplication;
use crate::features::FeatureContext;
use crate::lifecycle::CancellationSignal;
use crate::net::exchange::{ListenerExchange, ListenerResponse};
use crate::net::HttpListener;
use crate::BoxError;

/// Why a single exchange failed. Never escapes the exchange it belongs to.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("failed to create the application context")]
    CreateContext(#[source] BoxError),

    #[error("the application failed to process the request")]
    Process(#[source] BoxError),

    #[error("a response starting callback failed")]
    Starting(#[source] BoxError),

    #[error("a response completed callback failed")]
    Completed(#[source] BoxError),

    #[error("the application panicked: {0}")]
    Panic(String),
}

/// Error text plus its whole `source()` chain.
pub fn diagnostic(error: &(dyn Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str("\n  caused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Closes the response when dropped, on every exit path.
struct ResponseGuard(ListenerResponse);

impl Drop for ResponseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// One of the server's concurrent accept loops.
pub(crate) struct Worker<A> {
    pub(crate) id: usize,
    pub(crate) listener: Arc<HttpListener>,
    pub(crate) application: Arc<A>,
    pub(crate) signal: CancellationSignal,
}

impl<A: HttpApplication> Worker<A> {
    pub(crate) async fn run(self) {
        tracing::debug!(worker = self.id, "Worker loop started");
        let mut handled: u64 = 0;

        while self.listener.is_listening() && !self.signal.is_cancelled() {
            let exchange = tokio::select! {
                biased;
                _ = self.signal.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(exchange) => exchange,
                    Err(e) => {
                        tracing::debug!(worker = self.id, error = %e, "Listener stopped accepting");
                        break;
                    }
                },
            };

            let span = tracing::debug_span!(
                "exchange",
                worker = self.id,
                connection_id = %exchange.connection().id,
                method = %exchange.request().method(),
                path = %exchange.request().uri().path(),
            );
            process_exchange(self.application.as_ref(), exchange)
                .instrument(span)
                .await;
            handled += 1;
        }

        tracing::debug!(worker = self.id, handled, "Worker loop exited");
    }
}

/// Drive the application through one exchange and close its response.
///
/// Errors and panics from the application become a 500 whose body is the
/// failure's diagnostic text. The response is closed exactly once, including
/// when this future is dropped before completing.
pub async fn process_exchange<A: HttpApplication>(application: &A, mut exchange: ListenerExchange) {
    let _close = ResponseGuard(exchange.response().clone());

    let outcome = AssertUnwindSafe(run_application(application, &mut exchange))
        .catch_unwind()
        .await;
    let result = outcome.unwrap_or_else(|panic| Err(ExchangeError::Panic(panic_message(panic.as_ref()))));

    if let Err(error) = result {
        tracing::warn!(error = %diagnostic(&error), "Request failed");
        write_failure(exchange.response(), &error);
    }
}

async fn run_application<A: HttpApplication>(
    application: &A,
    exchange: &mut ListenerExchange,
) -> Result<(), ExchangeError> {
    let features = FeatureContext::new(exchange);

    let mut context = application
        .create_context(features.features().clone())
        .map_err(ExchangeError::CreateContext)?;

    let processed = match application.process_request(&mut context).await {
        Ok(()) => features.fire_on_starting().await.map_err(ExchangeError::Starting),
        Err(e) => Err(ExchangeError::Process(e)),
    };

    match &processed {
        Ok(()) => application.dispose_context(context, None),
        Err(error) => application.dispose_context(context, Some(error)),
    }
    processed?;

    features.fire_on_completed().await.map_err(ExchangeError::Completed)
}

fn write_failure(response: &ListenerResponse, error: &ExchangeError) {
    response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
    response.clear_body();
    response.with_headers(|headers| {
        headers.clear();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    });
    if response.write(diagnostic(error).as_bytes()).is_err() {
        tracing::debug!("Response closed before the failure could be written");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{FnApplication, HttpContext};
    use crate::features::FeatureCollection;
    use crate::net::exchange::test_support::exchange;
    use http::Method;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    async fn body_text(response: http::Response<http_body_util::Full<bytes::Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn successful_exchange_is_closed_with_app_output() {
        let app = FnApplication::new(|ctx: HttpContext| async move {
            let body = ctx.request().body.bytes().await?;
            ctx.response().set_status(StatusCode::CREATED)?;
            ctx.response().write(b"echo: ")?;
            ctx.response().write(&body)?;
            Ok::<(), BoxError>(())
        });
        let (exchange, rx) = exchange(Method::POST, "/echo", "ping");
        let response = exchange.response().clone();

        process_exchange(&app, exchange).await;

        assert!(response.is_closed());
        let sent = rx.await.unwrap();
        assert_eq!(sent.status(), StatusCode::CREATED);
        assert_eq!(body_text(sent).await, "echo: ping");
    }

    #[tokio::test]
    async fn processing_error_becomes_500_with_diagnostic() {
        let app = FnApplication::new(|ctx: HttpContext| async move {
            ctx.response().write(b"partial output")?;
            Err::<(), BoxError>("database unreachable".into())
        });
        let (exchange, rx) = exchange(Method::GET, "/", "");

        process_exchange(&app, exchange).await;

        let sent = rx.await.unwrap();
        assert_eq!(sent.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(sent.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        let body = body_text(sent).await;
        assert!(body.contains("failed to process the request"));
        assert!(body.contains("database unreachable"));
        assert!(!body.contains("partial output"));
    }

    #[tokio::test]
    async fn panic_becomes_500() {
        let app = FnApplication::new(|ctx: HttpContext| async move {
            if ctx.request().method == Method::GET {
                panic!("handler blew up");
            }
            Ok::<(), BoxError>(())
        });
        let (exchange, rx) = exchange(Method::GET, "/", "");

        process_exchange(&app, exchange).await;

        let sent = rx.await.unwrap();
        assert_eq!(sent.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(sent).await.contains("handler blew up"));
    }

    /// Records every contract call so ordering can be asserted.
    #[derive(Default)]
    struct Recording {
        calls: Arc<Mutex<Vec<String>>>,
        fail_create: bool,
        fail_process: bool,
    }

    impl Recording {
        fn push(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    impl HttpApplication for Recording {
        type Context = HttpContext;

        fn create_context(&self, features: FeatureCollection) -> Result<HttpContext, BoxError> {
            self.push("create");
            if self.fail_create {
                return Err("no context for you".into());
            }
            let context = HttpContext::new(features)?;
            let calls = Arc::clone(&self.calls);
            context.response().on_starting(move || async move {
                calls.lock().unwrap().push("starting".into());
                Ok::<(), BoxError>(())
            })?;
            let calls = Arc::clone(&self.calls);
            context.response().on_completed(move || async move {
                calls.lock().unwrap().push("completed".into());
                Ok::<(), BoxError>(())
            })?;
            Ok(context)
        }

        async fn process_request(&self, _context: &mut HttpContext) -> Result<(), BoxError> {
            self.push("process");
            if self.fail_process {
                return Err("process failed".into());
            }
            Ok(())
        }

        fn dispose_context(&self, _context: HttpContext, error: Option<&(dyn Error + 'static)>) {
            self.push(if error.is_some() { "dispose(error)" } else { "dispose" });
        }
    }

    #[tokio::test]
    async fn contract_calls_happen_in_order() {
        let app = Recording::default();
        let (exchange, rx) = exchange(Method::GET, "/", "");
        process_exchange(&app, exchange).await;

        assert_eq!(rx.await.unwrap().status(), StatusCode::OK);
        assert_eq!(
            *app.calls.lock().unwrap(),
            vec!["create", "process", "starting", "dispose", "completed"]
        );
    }

    #[tokio::test]
    async fn failed_processing_still_disposes_but_skips_hooks() {
        let app = Recording {
            fail_process: true,
            ..Default::default()
        };
        let (exchange, rx) = exchange(Method::GET, "/", "");
        process_exchange(&app, exchange).await;

        assert_eq!(rx.await.unwrap().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*app.calls.lock().unwrap(), vec!["create", "process", "dispose(error)"]);
    }

    #[tokio::test]
    async fn failed_context_creation_is_a_500() {
        let app = Recording {
            fail_create: true,
            ..Default::default()
        };
        let (exchange, rx) = exchange(Method::GET, "/", "");
        process_exchange(&app, exchange).await;

        let sent = rx.await.unwrap();
        assert_eq!(sent.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(sent).await.contains("no context for you"));
        assert_eq!(*app.calls.lock().unwrap(), vec!["create"]);
    }

    #[tokio::test]
    async fn dropped_exchange_future_still_closes_response() {
        let entered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&entered);
        let app = FnApplication::new(move |_ctx: HttpContext| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<()>().await;
                Ok::<(), BoxError>(())
            }
        });
        let (exchange, rx) = exchange(Method::GET, "/", "");
        let response = exchange.response().clone();

        let stalled = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            process_exchange(&app, exchange),
        )
        .await;
        assert!(stalled.is_err());
        assert_eq!(entered.load(Ordering::SeqCst), 1);
        assert!(response.is_closed());
        assert!(rx.await.is_ok());
    }

    #[test]
    fn diagnostic_includes_source_chain() {
        let error = ExchangeError::Process("root cause".into());
        assert_eq!(
            diagnostic(&error),
            "the application failed to process the request\n  caused by: root cause"
        );
    }
}
