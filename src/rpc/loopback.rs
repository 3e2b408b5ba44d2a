//! Engine that reaches the RPC surface over the network.
//!
//! Translated REST calls are sent back to the gateway's own TLS listener as
//! native calls, over a single shared HTTP/2 connection that is re-dialed
//! when it closes.

use async_trait::async_trait;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http2::{self, SendRequest};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::Value;
use std::collections::HashMap;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::net::tls::DialOptions;
use crate::rpc::context::CallContext;
use crate::rpc::engine::{method_path, MethodDescriptor, RpcCall, RpcEngine, RpcOutcome};
use crate::rpc::metadata::Metadata;
use crate::rpc::status::{Code, Status};
use crate::rpc::wire;

pub struct LoopbackEngine {
    dial: DialOptions,
    methods: HashMap<String, MethodDescriptor>,
    sender: Mutex<Option<SendRequest<Full<Bytes>>>>,
}

impl LoopbackEngine {
    /// `methods` are the descriptors served on the other end.
    pub fn new(dial: DialOptions, methods: impl IntoIterator<Item = MethodDescriptor>) -> Self {
        Self {
            dial,
            methods: methods.into_iter().map(|d| (d.path(), d)).collect(),
            sender: Mutex::new(None),
        }
    }

    async fn sender(&self) -> Result<SendRequest<Full<Bytes>>, Status> {
        let mut slot = self.sender.lock().await;
        if let Some(sender) = slot.as_ref() {
            if !sender.is_closed() {
                return Ok(sender.clone());
            }
        }

        let sender = self.connect().await?;
        *slot = Some(sender.clone());
        Ok(sender)
    }

    async fn connect(&self) -> Result<SendRequest<Full<Bytes>>, Status> {
        let unavailable = |what: &str, e: &dyn std::fmt::Display| {
            Status::unavailable(format!("{} {}: {}", what, self.dial.address, e))
        };

        let tcp = TcpStream::connect(&self.dial.address)
            .await
            .map_err(|e| unavailable("connect to", &e))?;
        let _ = tcp.set_nodelay(true);
        let tls = self
            .dial
            .connector()
            .connect(self.dial.server_name.clone(), tcp)
            .await
            .map_err(|e| unavailable("TLS handshake with", &e))?;
        let (sender, connection) = http2::handshake(TokioExecutor::new(), TokioIo::new(tls))
            .await
            .map_err(|e| unavailable("HTTP/2 handshake with", &e))?;

        let address = self.dial.address.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(address = %address, error = %e, "Loopback connection closed");
            }
        });

        tracing::debug!(address = %self.dial.address, "Loopback connection established");
        Ok(sender)
    }

    async fn call(&self, call: RpcCall, ctx: &CallContext) -> RpcOutcome {
        let path = method_path(&call.service, &call.method);
        let payload = match serde_json::to_vec(&call.message) {
            Ok(payload) => payload,
            Err(e) => return RpcOutcome::failed(Status::internal(e.to_string())),
        };

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("https://{}{}", self.dial.authority(), path))
            .header(header::CONTENT_TYPE, wire::CONTENT_TYPE_JSON)
            .header(header::TE, "trailers");
        for (key, value) in ctx.request_metadata().iter() {
            builder = builder.header(key, value);
        }
        if let Some(remaining) = ctx.remaining() {
            builder = builder.header(wire::GRPC_TIMEOUT, wire::encode_timeout(remaining));
        }
        let request = match builder.body(Full::new(wire::encode_frame(&payload))) {
            Ok(request) => request,
            Err(e) => return RpcOutcome::failed(Status::internal(format!("invalid call metadata: {}", e))),
        };

        let mut sender = match self.sender().await {
            Ok(sender) => sender,
            Err(status) => return RpcOutcome::failed(status),
        };
        if let Err(e) = sender.ready().await {
            return RpcOutcome::failed(Status::unavailable(e.to_string()));
        }

        let response = match sender.send_request(request).await {
            Ok(response) => response,
            Err(e) => return RpcOutcome::failed(Status::unavailable(e.to_string())),
        };

        let (parts, body) = response.into_parts();
        let collected = match body.collect().await {
            Ok(collected) => collected,
            Err(e) => return RpcOutcome::failed(Status::unavailable(e.to_string())),
        };
        let trailers = collected.trailers().cloned().unwrap_or_default();
        let data = collected.to_bytes();

        let header_md = response_metadata(&parts.headers);
        let trailer_md = response_metadata(&trailers);

        let result = match call_status(parts.status, &parts.headers, &trailers) {
            Some(status) => Err(status),
            None => wire::decode_frame(&data).and_then(|payload| {
                serde_json::from_slice::<Value>(payload)
                    .map_err(|e| Status::internal(format!("undecodable response: {}", e)))
            }),
        };

        RpcOutcome {
            result,
            header: header_md,
            trailer: trailer_md,
        }
    }
}

/// `None` when the call succeeded.
fn call_status(http_status: StatusCode, headers: &HeaderMap, trailers: &HeaderMap) -> Option<Status> {
    let code = trailers
        .get(wire::GRPC_STATUS)
        .or_else(|| headers.get(wire::GRPC_STATUS))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i32>().ok());
    let message = trailers
        .get(wire::GRPC_MESSAGE)
        .or_else(|| headers.get(wire::GRPC_MESSAGE))
        .and_then(|v| v.to_str().ok())
        .map(wire::decode_message)
        .unwrap_or_default();

    match code {
        Some(0) => None,
        Some(code) => Some(Status::new(Code::from_i32(code), message)),
        None if http_status != StatusCode::OK => Some(Status::new(
            Code::Unknown,
            format!("HTTP {} without call status", http_status),
        )),
        None => Some(Status::internal("response carried no call status")),
    }
}

fn response_metadata(headers: &HeaderMap) -> Metadata {
    Metadata::from_headers(headers, |name| {
        (!wire::is_reserved_header(name)).then(|| name.to_string())
    })
}

#[async_trait]
impl RpcEngine for LoopbackEngine {
    fn describe(&self, service: &str, method: &str) -> Option<MethodDescriptor> {
        self.methods.get(&method_path(service, method)).cloned()
    }

    async fn dispatch(&self, call: RpcCall, ctx: &CallContext) -> RpcOutcome {
        let deadline = ctx.deadline();
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            outcome = self.call(call, ctx) => outcome,
            _ = ctx.cancelled() => RpcOutcome::failed(Status::cancelled("call cancelled by caller")),
            _ = expired => RpcOutcome::failed(Status::deadline_exceeded("deadline exceeded waiting for loopback call")),
        }
    }

    fn kind(&self) -> &'static str {
        "loopback"
    }
}
