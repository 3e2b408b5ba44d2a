//! Gateway-level error types.

use axum::http::Method;

use crate::net::listener::ListenerError;
use crate::net::tls::TlsError;

/// A startup misconfiguration. Every one of these aborts startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error("RPC method {0} is registered more than once")]
    DuplicateMethod(String),

    #[error("route {verb} {template} is registered more than once")]
    DuplicateRoute { verb: Method, template: String },

    #[error("prefix {0} is mounted more than once")]
    DuplicateMount(String),

    #[error("invalid mount prefix {prefix:?}: {reason}")]
    InvalidPrefix { prefix: String, reason: &'static str },

    #[error("invalid path template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("route {verb} {template} references unregistered method /{service}/{method}")]
    UnknownMethod {
        verb: Method,
        template: String,
        service: String,
        method: String,
    },

    #[error("{scope}: {reason}")]
    Registration { scope: String, reason: String },
}

/// Fatal gateway error.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("TLS material rejected: {0}")]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("invalid gateway setup: {}", join(.0))]
    Setup(Vec<SetupError>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join(errors: &[SetupError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
