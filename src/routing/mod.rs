//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     RouteTableBuilder per mount (verb, template, target)
//!     → parse templates (matcher.rs)
//!     → resolve RPC targets against the engine
//!     → detect duplicate routes and mounts
//!     → Freeze as immutable MountTable
//!
//! Incoming Request (verb, path):
//!     → longest matching mount prefix, prefix stripped
//!     → segment trie lookup (router.rs)
//!     → Matched(endpoint, path params) | MethodNotAllowed | NotFound
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::{PathParams, PathTemplate};
pub use router::{
    Endpoint, Lookup, MountTable, MountTableBuilder, RawHandler, Route, RouteMatch, RouteTable,
    RouteTableBuilder,
};
