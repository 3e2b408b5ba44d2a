//! REST ↔ RPC translation.
//!
//! # Data Flow
//! ```text
//! matched route (descriptor, path params) + HTTP request
//!     → decode body as a JSON object (empty body: query parameters)
//!     → merge path variables into the message
//!     → CallContext: token cancelled when this request is dropped,
//!       deadline from grpc-timeout or the configured default,
//!       metadata from authorization / grpc-metadata-* / forwarding headers
//!     → engine.dispatch
//!     → 200 JSON + grpc-metadata-* headers, or mapped error status + JSON body
//! ```
//!
//! # Design Decisions
//! - Decode failures are InvalidArgument and never reach the engine
//! - The gateway only signals cancellation; it never aborts the engine's work
//! - Bodies of methods taking the empty message are ignored

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{request::Parts, Request, Response};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::http::request;
use crate::http::response;
use crate::routing::PathParams;
use crate::rpc::context::CallContext;
use crate::rpc::engine::{MethodDescriptor, RpcCall, RpcEngine};
use crate::rpc::metadata::Metadata;
use crate::rpc::status::Status;
use crate::rpc::wire;

/// Converts matched REST requests into engine calls.
#[derive(Clone)]
pub struct Translator {
    engine: Arc<dyn RpcEngine>,
    max_body_bytes: usize,
    default_timeout: Option<Duration>,
}

impl Translator {
    pub fn new(engine: Arc<dyn RpcEngine>, max_body_bytes: usize, default_timeout: Option<Duration>) -> Self {
        Self {
            engine,
            max_body_bytes,
            default_timeout,
        }
    }

    pub fn engine_kind(&self) -> &'static str {
        self.engine.kind()
    }

    pub async fn translate(
        &self,
        descriptor: &MethodDescriptor,
        request: Request<Body>,
        params: PathParams,
    ) -> Response<Body> {
        let (parts, body) = request.into_parts();

        let message = match self.decode(descriptor, &parts, body, params).await {
            Ok(message) => message,
            Err(status) => {
                tracing::debug!(
                    method = %descriptor,
                    error = %status,
                    "Rejected REST request before dispatch"
                );
                return response::error(&status, &Metadata::new());
            }
        };

        // Dropping this future (client gone) cancels the call.
        let token = CancellationToken::new();
        let _cancel_on_drop = token.clone().drop_guard();

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let mut ctx = CallContext::new(token).with_request_metadata(request::call_metadata(&parts, peer));
        if let Some(timeout) = request::requested_timeout(&parts.headers).or(self.default_timeout) {
            ctx = ctx.with_timeout(timeout);
        }

        let outcome = self
            .engine
            .dispatch(RpcCall::new(descriptor, message), &ctx)
            .await;

        // trailer metadata has no REST equivalent
        match &outcome.result {
            Ok(value) => response::success(value, &outcome.header),
            Err(status) => {
                tracing::debug!(
                    method = %descriptor,
                    engine = self.engine.kind(),
                    code = %status.code(),
                    "Call failed"
                );
                response::error(status, &outcome.header)
            }
        }
    }

    async fn decode(
        &self,
        descriptor: &MethodDescriptor,
        parts: &Parts,
        body: Body,
        params: PathParams,
    ) -> Result<Value, Status> {
        if descriptor.request.is_empty() {
            return Ok(Value::Object(Map::new()));
        }

        let bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| wire::body_read_status(&e))?;

        let mut fields = if bytes.iter().all(u8::is_ascii_whitespace) {
            query_fields(parts)
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(fields)) => fields,
                Ok(_) => {
                    return Err(Status::invalid_argument(format!(
                        "request body for {} must be a JSON object",
                        descriptor.request.name()
                    )))
                }
                Err(e) => return Err(Status::invalid_argument(format!("invalid JSON body: {}", e))),
            }
        };

        for (name, value) in params {
            fields.insert(name, Value::String(value));
        }
        Ok(Value::Object(fields))
    }
}

/// Query parameters as top-level string fields; repeated keys become arrays.
fn query_fields(parts: &Parts) -> Map<String, Value> {
    let mut fields = Map::new();
    let Some(query) = parts.uri.query() else {
        return fields;
    };
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match fields.get_mut(key.as_ref()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                fields.insert(key.into_owned(), value);
            }
        }
    }
    fields
}
