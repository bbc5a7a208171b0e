//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     stop() → CancellationSignal::cancel → loops exit at their next check
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → host stops the server
//! ```
//!
//! # Design Decisions
//! - Cancellation is cooperative and one-way
//! - In-flight exchanges are never pre-empted

pub mod shutdown;
pub mod signals;

pub use shutdown::CancellationSignal;
pub use signals::shutdown_signal;
