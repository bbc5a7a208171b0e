//! Configuration validation.
//!
//! Semantic checks that serde cannot express. All problems are collected,
//! not just the first.

use std::fmt;

use tracing_subscriber::EnvFilter;

use crate::config::schema::ServerConfig;
use crate::net::UrlPrefix;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("`urls` must contain at least one address")]
    NoUrls,

    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("`workers` must be at least 1")]
    ZeroWorkers,

    #[error("`request_queue_capacity` must be at least 1")]
    ZeroQueueCapacity,

    #[error("invalid logging filter `{filter}`: {reason}")]
    InvalidLogFilter { filter: String, reason: String },
}

/// Every problem found in one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    if config.urls.is_empty() {
        errors.push(ValidationError::NoUrls);
    }
    for url in &config.urls {
        if let Err(e) = UrlPrefix::parse(url) {
            errors.push(ValidationError::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            });
        }
    }

    if config.workers == Some(0) {
        errors.push(ValidationError::ZeroWorkers);
    }
    if config.request_queue_capacity == 0 {
        errors.push(ValidationError::ZeroQueueCapacity);
    }

    if let Err(e) = EnvFilter::try_new(&config.logging.filter) {
        errors.push(ValidationError::InvalidLogFilter {
            filter: config.logging.filter.clone(),
            reason: e.to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_problem() {
        let config = ServerConfig {
            urls: Vec::new(),
            workers: Some(0),
            request_queue_capacity: 0,
            ..ServerConfig::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors.0,
            vec![
                ValidationError::NoUrls,
                ValidationError::ZeroWorkers,
                ValidationError::ZeroQueueCapacity,
            ]
        );
        assert!(errors.to_string().contains("`workers` must be at least 1"));
    }

    #[test]
    fn rejects_https_and_garbage_urls() {
        let config = ServerConfig {
            urls: vec!["https://localhost:5001".into(), "nonsense".into()],
            ..ServerConfig::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.0.len(), 2);
        assert!(errors
            .0
            .iter()
            .all(|e| matches!(e, ValidationError::InvalidUrl { .. })));
    }
}
