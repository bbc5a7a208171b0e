//! Network layer subsystem: the listener primitive the server drives.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop per bound endpoint)
//!     → hyper HTTP/1.1 connection task
//!     → prefix.rs (longest matching prefix, else 404)
//!     → exchange.rs (parsed request + buffered response handle)
//!     → request queue → HttpListener::accept()
//! ```
//!
//! # Design Decisions
//! - Wire handling stays in hyper; this layer only routes and queues
//! - The request queue is bounded, so a saturated worker pool pushes back
//!   on connections instead of buffering without limit
//! - Closing drops queued exchanges; their clients receive 503

pub mod connection;
pub mod exchange;
pub mod listener;
pub mod prefix;

pub use connection::ConnectionId;
pub use exchange::{ConnectionInfo, ListenerExchange, ListenerRequest, ListenerResponse};
pub use listener::{HttpListener, ListenerError};
pub use prefix::{ListenerPrefixes, UrlPrefix, CATCH_ALL_PREFIX};
