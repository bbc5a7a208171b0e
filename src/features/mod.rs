//! Feature adaptation subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerExchange (parsed request + buffered response)
//!     → context.rs (FeatureContext::new, wraps handles only)
//!     → FeatureCollection {
//!           HttpRequestFeature, HttpResponseFeature,
//!           HttpConnectionFeature, HttpRequestIdentifierFeature
//!       }
//!     → application contract (create/process/dispose)
//!     → context.rs fires on_starting, then on_completed
//! ```
//!
//! # Design Decisions
//! - Features are cheap clone handles; the application and the worker see
//!   the same underlying request and response
//! - The collection is a type map, so hosts can attach their own features
//! - Lifecycle callbacks run last-registered-first

pub mod addresses;
pub mod collection;
pub mod connection;
pub mod context;
pub mod request;
pub mod response;

pub use addresses::{ServerAddresses, ServerAddressesFeature};
pub use collection::FeatureCollection;
pub use connection::HttpConnectionFeature;
pub use context::FeatureContext;
pub use request::{BodyError, HttpRequestFeature, HttpRequestIdentifierFeature, RequestBody};
pub use response::{HttpResponseFeature, ResponseError};
