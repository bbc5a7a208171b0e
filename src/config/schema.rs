//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for a listener-backed host.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address prefixes to bind, e.g. `http://localhost:5000`.
    pub urls: Vec<String>,

    /// Worker loop count. Defaults to one less than the core count.
    pub workers: Option<usize>,

    /// Parsed requests allowed to wait for a free worker.
    pub request_queue_capacity: usize,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            urls: vec!["http://localhost:5000".to_string()],
            workers: None,
            request_queue_capacity: 1024,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,

    /// Colorize output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "listener_server=info".to_string(),
            ansi: true,
        }
    }
}
