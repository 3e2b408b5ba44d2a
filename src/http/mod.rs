//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection (h2 or http/1.1)
//!     → server.rs (hyper-util auto connection, one task per connection)
//!     → multiplex.rs (per request: native RPC or REST)
//!     → request.rs (request ID, call metadata, deadline)
//!     → translate.rs (REST → RPC call → REST)
//!     → response.rs (JSON body, status mapping, metadata headers)
//!     → Send to client
//! ```

pub mod multiplex;
pub mod request;
pub mod response;
pub mod server;
pub mod translate;

pub use multiplex::{classify, Protocol};
pub use request::{METADATA_HEADER_PREFIX, X_REQUEST_ID};
pub use server::{BoundGateway, Gateway, GatewayBuilder, Options};
pub use translate::Translator;
