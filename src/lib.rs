//! Listener-backed HTTP server library.
//!
//! An [`HttpListener`](net::HttpListener) queues parsed exchanges; a pool of
//! worker loops adapts each one into a feature collection, drives an
//! [`HttpApplication`] through it and closes the response.

pub mod application;
pub mod config;
pub mod features;
pub mod hosting;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;

/// Error type applications and callbacks report failures with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use application::{FnApplication, HttpApplication, HttpContext};
pub use config::schema::ServerConfig;
pub use hosting::{Host, HostBuilder, HostError};
pub use lifecycle::CancellationSignal;
pub use server::{HttpListenerServer, Server, ServerError};
