//! Request inspection for the REST surface.
//!
//! # Responsibilities
//! - Attach a request ID (UUID v4) to every REST request and its response
//! - Select the headers forwarded to the engine as call metadata
//! - Read the caller's deadline
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Only `authorization` and `grpc-metadata-*` headers cross into the call;
//!   everything else is HTTP plumbing

use axum::http::{header, request::Parts, HeaderMap};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::rpc::metadata::Metadata;
use crate::rpc::wire;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Prefix marking a header as call metadata, in both directions.
pub const METADATA_HEADER_PREFIX: &str = "grpc-metadata-";

/// Generates `x-request-id` when the caller did not send one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Copies `x-request-id` from the request onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
}

/// Metadata sent with a call translated from `parts`.
pub fn call_metadata(parts: &Parts, peer: Option<SocketAddr>) -> Metadata {
    let mut metadata = Metadata::from_headers(&parts.headers, |name| {
        if name == header::AUTHORIZATION.as_str() || name == X_REQUEST_ID {
            Some(name.to_string())
        } else {
            name.strip_prefix(METADATA_HEADER_PREFIX)
                .filter(|key| !key.is_empty())
                .map(str::to_string)
        }
    });

    let forwarded_for = parts
        .headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok());
    match (forwarded_for, peer) {
        (Some(chain), Some(peer)) => metadata.insert(X_FORWARDED_FOR, format!("{}, {}", chain, peer.ip())),
        (Some(chain), None) => metadata.insert(X_FORWARDED_FOR, chain),
        (None, Some(peer)) => metadata.insert(X_FORWARDED_FOR, peer.ip().to_string()),
        (None, None) => {}
    }

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()));
    if let Some(host) = host {
        metadata.insert(X_FORWARDED_HOST, host);
    }

    metadata
}

/// Deadline requested with `grpc-timeout`, if any.
pub fn requested_timeout(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(wire::GRPC_TIMEOUT)
        .and_then(|v| v.to_str().ok())
        .and_then(wire::parse_timeout)
}
