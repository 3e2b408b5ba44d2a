//! Transport layer: TCP accept, TLS, connection accounting.
//!
//! # Data Flow
//! ```text
//! hostname:port
//!     → listener.rs (resolve, bind, permit-bounded accept)
//!     → tls.rs (handshake with the configured key pair, ALPN h2 / http/1.1)
//!     → connection.rs (guard held for the life of the connection)
//!     → http::server (one task per connection)
//!
//! loopback dispatch:
//!     tls.rs DialOptions (trust store from the served chain)
//!     → rpc::loopback
//! ```
//!
//! # Design Decisions
//! - A connection holds its permit until it closes
//! - Shutdown waits on the tracker, not on a poll loop
//! - TLS material is parsed once and shared read-only

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use tls::{DialOptions, TlsError, TlsMaterial};
