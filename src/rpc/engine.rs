//! The RPC engine boundary.
//!
//! The gateway only needs two things from an engine: to describe the methods
//! it can serve, and to dispatch a decoded call. How an engine moves bytes is
//! its own business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::rpc::context::CallContext;
use crate::rpc::metadata::Metadata;
use crate::rpc::status::Status;

/// Schema of a request or response message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// The well-known empty message; REST bodies are ignored.
    Empty,
    /// A named message decoded from a JSON object.
    Named(String),
}

impl MessageKind {
    pub fn named(name: impl Into<String>) -> Self {
        MessageKind::Named(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            MessageKind::Empty => "google.protobuf.Empty",
            MessageKind::Named(name) => name,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, MessageKind::Empty)
    }
}

/// The empty message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Static description of one RPC method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub service: String,
    pub method: String,
    pub request: MessageKind,
    pub response: MessageKind,
}

impl MethodDescriptor {
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        request: MessageKind,
        response: MessageKind,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            request,
            response,
        }
    }

    /// `/{service}/{method}`, the path used on the native surface.
    pub fn path(&self) -> String {
        method_path(&self.service, &self.method)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.service, self.method)
    }
}

pub(crate) fn method_path(service: &str, method: &str) -> String {
    format!("/{}/{}", service, method)
}

/// A decoded inbound call.
#[derive(Debug, Clone)]
pub struct RpcCall {
    pub service: String,
    pub method: String,
    pub message: Value,
}

impl RpcCall {
    pub fn new(descriptor: &MethodDescriptor, message: Value) -> Self {
        Self {
            service: descriptor.service.clone(),
            method: descriptor.method.clone(),
            message,
        }
    }
}

/// Result of a dispatched call together with the metadata the engine attached.
#[derive(Debug, Clone)]
pub struct RpcOutcome {
    pub result: Result<Value, Status>,
    pub header: Metadata,
    pub trailer: Metadata,
}

impl RpcOutcome {
    pub fn failed(status: Status) -> Self {
        Self {
            result: Err(status),
            header: Metadata::new(),
            trailer: Metadata::new(),
        }
    }
}

/// Dispatches calls to registered service methods.
///
/// Implementations must tolerate unbounded concurrent `dispatch` calls and
/// should stop work promptly once `ctx` is cancelled.
#[async_trait]
pub trait RpcEngine: Send + Sync + 'static {
    /// Look up a method this engine can serve.
    fn describe(&self, service: &str, method: &str) -> Option<MethodDescriptor>;

    /// Run one call to completion.
    async fn dispatch(&self, call: RpcCall, ctx: &CallContext) -> RpcOutcome;

    /// Short name used in logs.
    fn kind(&self) -> &'static str;
}
