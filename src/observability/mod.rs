//! Logs and metrics.
//!
//! # Data Flow
//! ```text
//! logging.rs: tracing events → EnvFilter → stdout (pretty or JSON lines)
//!
//! metrics.rs:
//!     rpc::interceptor   → grpc_server_* (per call, both surfaces)
//!     http::multiplex    → gateway_http_* (per request)
//!     GET metrics path   → Prometheus text
//! ```
//!
//! # Design Decisions
//! - REST requests carry an `x-request-id` into their trace span
//! - A call is counted once, on the engine that runs the handler

pub mod logging;
pub mod metrics;
