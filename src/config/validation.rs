//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, limits, paths)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FileConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::FileConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &FileConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.hostname.trim().is_empty() {
        errors.push(ValidationError::new("listener.hostname", "must not be empty"));
    }
    if config.listener.port == 0 {
        errors.push(ValidationError::new("listener.port", "must be a fixed port"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.tls.cert_path.trim().is_empty() {
        errors.push(ValidationError::new("tls.cert_path", "must not be empty"));
    }
    if config.tls.key_path.trim().is_empty() {
        errors.push(ValidationError::new("tls.key_path", "must not be empty"));
    }

    if config.gateway.max_body_bytes == 0 {
        errors.push(ValidationError::new("gateway.max_body_bytes", "must be greater than 0"));
    }
    if !config.gateway.metrics_path.starts_with('/') {
        errors.push(ValidationError::new("gateway.metrics_path", "must start with '/'"));
    }

    if let Err(e) = config.logging.filter.parse::<tracing_subscriber::EnvFilter>() {
        errors.push(ValidationError::new("logging.filter", e.to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
