//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured `tracing` events throughout; hosts choose the subscriber
//! - Exchanges run inside a span carrying worker, connection, method, path

pub mod logging;
