//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (http/server.rs):
//!     Configure (TLS) → Register handlers and routes → Freeze → Bind → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: TLS first, then routes, then listener
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: open connections are abandoned after the deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{spawn_signal_handler, wait_for_signal};
