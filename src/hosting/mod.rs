//! Hosting: registers a server implementation and runs it around an
//! application.
//!
//! # Data Flow
//! ```text
//! HostBuilder::new()
//!     .with_config(cfg)        (validated on build)
//!     .use_http_listener()     (server registration)
//!     .build()                 → Host<HttpListenerServer>
//! Host::run(app, shutdown)
//!     → urls into ServerAddressesFeature → start → await shutdown → stop
//! ```

pub mod builder;
pub mod host;

pub use builder::{HostBuilder, NoServer};
pub use host::{Host, HostError};
