//! RPC subsystem: the engine boundary and its two variants.
//!
//! # Data Flow
//! ```text
//! registration (startup):
//!     ServiceRegistry::unary(descriptor, handler)
//!     → into_engine() → LocalEngine (frozen)
//!     → Instrumented<LocalEngine> (metrics interceptor)
//!
//! dispatch (per call):
//!     native surface → native::serve → Instrumented<LocalEngine>
//!     REST surface   → translate → in-process: Instrumented<LocalEngine>
//!                                → loopback:   LoopbackEngine → TLS/HTTP2 → native surface
//! ```
//!
//! # Design Decisions
//! - `RpcEngine` is the only seam; the gateway never assumes a wire format
//! - The dispatch variant is chosen at configuration time
//! - Cancellation flows through `CallContext`, never ambient state

pub mod context;
pub mod engine;
pub mod interceptor;
pub mod loopback;
pub mod metadata;
pub mod native;
pub mod registry;
pub mod status;
pub mod wire;

pub use context::CallContext;
pub use engine::{Empty, MessageKind, MethodDescriptor, RpcCall, RpcEngine, RpcOutcome};
pub use interceptor::Instrumented;
pub use loopback::LoopbackEngine;
pub use metadata::Metadata;
pub use registry::{LocalEngine, ServiceRegistry};
pub use status::{Code, ErrorBody, Status};
