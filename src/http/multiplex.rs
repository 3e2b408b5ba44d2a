//! Per-request protocol multiplexing.
//!
//! # Data Flow
//! ```text
//! request (any connection, any stream)
//!     → classify(version, content-type)
//!         Rpc  → rpc::native::serve (instrumented in-process engine)
//!         Rest → REST router (request id, trace)
//!                  → metrics path
//!                  → mount table lookup
//!                      Rpc endpoint     → Translator
//!                      Handler endpoint → raw handler
//!                      miss             → 404 (or 405, per policy)
//!     → HTTP request metrics
//! ```
//!
//! # Design Decisions
//! - The decision is made per request, so RPC and REST can share one
//!   HTTP/2 connection
//! - Classification is a pure function of request metadata

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, Response, Version};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::config::VerbMismatchPolicy;
use crate::http::request;
use crate::http::response;
use crate::http::translate::Translator;
use crate::observability::metrics;
use crate::routing::{Endpoint, Lookup, MountTable};
use crate::rpc::engine::RpcEngine;
use crate::rpc::native;
use crate::rpc::wire;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Rpc,
    Rest,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Rpc => "rpc",
            Protocol::Rest => "rest",
        }
    }
}

/// Native RPC needs HTTP/2 and an `application/grpc` content type; anything else is REST.
pub fn classify(version: Version, content_type: Option<&HeaderValue>) -> Protocol {
    let is_rpc_type = content_type
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            ct.strip_prefix(wire::CONTENT_TYPE)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('+') || rest.starts_with(';'))
        })
        .unwrap_or(false);

    if version >= Version::HTTP_2 && is_rpc_type {
        Protocol::Rpc
    } else {
        Protocol::Rest
    }
}

/// Everything a request may be dispatched to. Frozen before serving.
pub(crate) struct Surfaces {
    pub native: Arc<dyn RpcEngine>,
    pub translator: Translator,
    pub mounts: MountTable,
    pub metrics_path: String,
    pub metrics: PrometheusHandle,
    pub verb_mismatch: VerbMismatchPolicy,
    pub max_body_bytes: usize,
}

#[derive(Clone)]
struct MuxState {
    surfaces: Arc<Surfaces>,
    rest: Router,
}

/// The single service every connection is served with.
pub(crate) fn router(surfaces: Surfaces) -> Router {
    let surfaces = Arc::new(surfaces);

    let rest = Router::new()
        .fallback(rest_handler)
        .with_state(Arc::clone(&surfaces))
        .layer(request::propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(request::set_request_id_layer());

    Router::new()
        .fallback(multiplex)
        .with_state(MuxState { surfaces, rest })
}

async fn multiplex(State(state): State<MuxState>, request: Request<Body>) -> Response<Body> {
    let start_time = Instant::now();
    let protocol = classify(request.version(), request.headers().get(header::CONTENT_TYPE));

    let response = match protocol {
        Protocol::Rpc => {
            native::serve(
                state.surfaces.native.as_ref(),
                request,
                state.surfaces.max_body_bytes,
            )
            .await
        }
        Protocol::Rest => match state.rest.oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        },
    };

    metrics::record_http_request(protocol.as_str(), response.status().as_u16(), start_time);
    response
}

async fn rest_handler(State(surfaces): State<Arc<Surfaces>>, request: Request<Body>) -> Response<Body> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if path == surfaces.metrics_path && method == axum::http::Method::GET {
        let mut response = Response::new(Body::from(surfaces.metrics.render()));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
        );
        return response;
    }

    match surfaces.mounts.lookup(&method, &path) {
        Lookup::Matched(found) => match &found.route.endpoint {
            Endpoint::Rpc(descriptor) => {
                tracing::debug!(
                    request_id = request::request_id(request.headers()).unwrap_or("-"),
                    method = %method,
                    path = %path,
                    rpc = %descriptor,
                    "Translating REST request"
                );
                surfaces
                    .translator
                    .translate(descriptor, request, found.params)
                    .await
            }
            Endpoint::Handler(handler) => handler(request, found.params).await,
        },
        Lookup::MethodNotAllowed(allowed) => match surfaces.verb_mismatch {
            VerbMismatchPolicy::NotFound => response::not_found(&method, &path),
            VerbMismatchPolicy::MethodNotAllowed => {
                response::method_not_allowed(&method, &path, &allowed)
            }
        },
        Lookup::NotFound => response::not_found(&method, &path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ct(value: &'static str) -> HeaderValue {
        HeaderValue::from_static(value)
    }

    #[test]
    fn http2_with_grpc_content_type_is_rpc() {
        assert_eq!(classify(Version::HTTP_2, Some(&ct("application/grpc"))), Protocol::Rpc);
        assert_eq!(classify(Version::HTTP_2, Some(&ct("application/grpc+json"))), Protocol::Rpc);
        assert_eq!(classify(Version::HTTP_2, Some(&ct("application/grpc; charset=utf-8"))), Protocol::Rpc);
    }

    #[test]
    fn everything_else_is_rest() {
        assert_eq!(classify(Version::HTTP_11, Some(&ct("application/grpc"))), Protocol::Rest);
        assert_eq!(classify(Version::HTTP_2, Some(&ct("application/json"))), Protocol::Rest);
        assert_eq!(classify(Version::HTTP_2, Some(&ct("application/grpc-web"))), Protocol::Rest);
        assert_eq!(classify(Version::HTTP_2, None), Protocol::Rest);
        assert_eq!(classify(Version::HTTP_10, None), Protocol::Rest);
    }
}
