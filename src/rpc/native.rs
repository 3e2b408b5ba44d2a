//! Server side of the native RPC surface.
//!
//! # Data Flow
//! ```text
//! POST /{service}/{method}  (HTTP/2, application/grpc[+json])
//!     → decode single frame → JSON message
//!     → CallContext (drop-guarded token, grpc-timeout deadline, metadata)
//!     → engine.dispatch
//!     → 200 + header metadata, data frame, trailers (grpc-status, grpc-message)
//! ```

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use bytes::Bytes;
use http_body_util::StreamBody;
use hyper::body::Frame;
use serde_json::Value;
use std::convert::Infallible;
use tokio_util::sync::CancellationToken;

use crate::rpc::context::CallContext;
use crate::rpc::engine::{RpcCall, RpcEngine, RpcOutcome};
use crate::rpc::metadata::Metadata;
use crate::rpc::status::{Code, Status};
use crate::rpc::wire;

/// Serve one native call against `engine`.
pub async fn serve(engine: &dyn RpcEngine, request: Request<Body>, max_body_bytes: usize) -> Response<Body> {
    let (parts, body) = request.into_parts();

    let Some((service, method)) = split_method_path(parts.uri.path()) else {
        return respond(RpcOutcome::failed(Status::unimplemented(format!(
            "malformed method path {}",
            parts.uri.path()
        ))));
    };

    let message = match axum::body::to_bytes(body, max_body_bytes).await {
        Ok(bytes) => decode_message(&bytes),
        Err(e) => Err(wire::body_read_status(&e)),
    };
    let message = match message {
        Ok(message) => message,
        Err(status) => return respond(RpcOutcome::failed(status)),
    };

    let token = CancellationToken::new();
    let _cancel_on_drop = token.clone().drop_guard();
    let mut ctx = CallContext::new(token).with_request_metadata(request_metadata(&parts.headers));
    if let Some(timeout) = parts
        .headers
        .get(wire::GRPC_TIMEOUT)
        .and_then(|v| v.to_str().ok())
        .and_then(wire::parse_timeout)
    {
        ctx = ctx.with_timeout(timeout);
    }

    tracing::debug!(service = %service, method = %method, "Native RPC call");
    let call = RpcCall {
        service: service.to_string(),
        method: method.to_string(),
        message,
    };
    respond(engine.dispatch(call, &ctx).await)
}

fn split_method_path(path: &str) -> Option<(&str, &str)> {
    let (service, method) = path.strip_prefix('/')?.split_once('/')?;
    if service.is_empty() || method.is_empty() || method.contains('/') {
        return None;
    }
    Some((service, method))
}

fn decode_message(body: &Bytes) -> Result<Value, Status> {
    let payload = wire::decode_frame(body)?;
    if payload.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(payload).map_err(|e| Status::invalid_argument(e.to_string()))
}

fn request_metadata(headers: &HeaderMap) -> Metadata {
    Metadata::from_headers(headers, |name| {
        (!wire::is_reserved_header(name)).then(|| name.to_string())
    })
}

fn respond(outcome: RpcOutcome) -> Response<Body> {
    let RpcOutcome {
        result,
        header,
        trailer,
    } = outcome;

    let (data, status) = match result.and_then(|value| {
        serde_json::to_vec(&value)
            .map_err(|e| Status::internal(format!("failed to encode response: {}", e)))
    }) {
        Ok(payload) => (Some(wire::encode_frame(&payload)), None),
        Err(status) => (None, Some(status)),
    };

    let mut trailers = HeaderMap::new();
    let code = status.as_ref().map(|s| s.code()).unwrap_or(Code::Ok);
    trailers.insert(wire::GRPC_STATUS, HeaderValue::from(code.as_i32()));
    if let Some(status) = &status {
        if let Ok(value) = HeaderValue::from_str(&wire::encode_message(status.message())) {
            trailers.insert(wire::GRPC_MESSAGE, value);
        }
    }
    trailer.write_headers(&mut trailers, "");

    let mut frames: Vec<Result<Frame<Bytes>, Infallible>> = Vec::with_capacity(2);
    if let Some(data) = data {
        frames.push(Ok(Frame::data(data)));
    }
    frames.push(Ok(Frame::trailers(trailers)));

    let mut response = Response::new(Body::new(StreamBody::new(futures_util::stream::iter(frames))));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(wire::CONTENT_TYPE_JSON),
    );
    header.write_headers(response.headers_mut(), "");
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::engine::{Empty, MessageKind, MethodDescriptor};
    use crate::rpc::registry::ServiceRegistry;
    use http_body_util::BodyExt;
    use serde_json::json;

    fn engine() -> impl RpcEngine {
        let mut registry = ServiceRegistry::new();
        registry
            .unary(
                MethodDescriptor::new("t.Echo", "Echo", MessageKind::named("Msg"), MessageKind::named("Msg")),
                |msg: Value, ctx: CallContext| async move {
                    if let Some(user) = ctx.request_metadata().get("x-user") {
                        ctx.append_header("x-seen-user", user.to_string());
                    }
                    ctx.append_trailer("x-trailer", "done");
                    Ok::<_, Status>(msg)
                },
            )
            .unwrap();
        registry
            .unary(
                MethodDescriptor::new("t.Echo", "Fail", MessageKind::Empty, MessageKind::Empty),
                |_: Empty, _| async { Err::<Empty, _>(Status::not_found("no such thing")) },
            )
            .unwrap();
        registry.into_engine()
    }

    fn native_request(path: &str, payload: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, wire::CONTENT_TYPE_JSON)
            .header("x-user", "alice")
            .body(Body::from(wire::encode_frame(payload)))
            .unwrap()
    }

    #[tokio::test]
    async fn successful_call_carries_frame_and_ok_trailer() {
        let engine = engine();
        let response = serve(&engine, native_request("/t.Echo/Echo", br#"{"a":1}"#), 1024).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-seen-user"], "alice");

        let collected = response.into_body().collect().await.unwrap();
        let trailers = collected.trailers().cloned().unwrap();
        assert_eq!(trailers[wire::GRPC_STATUS], "0");
        assert_eq!(trailers["x-trailer"], "done");

        let bytes = collected.to_bytes();
        let payload: Value = serde_json::from_slice(wire::decode_frame(&bytes).unwrap()).unwrap();
        assert_eq!(payload, json!({"a": 1}));
    }

    #[tokio::test]
    async fn unreadable_body_is_invalid_argument() {
        let engine = engine();
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(&[0, 0, 0, 0, 9])),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset")),
        ];
        let request = Request::builder()
            .method("POST")
            .uri("/t.Echo/Echo")
            .header(header::CONTENT_TYPE, wire::CONTENT_TYPE_JSON)
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();

        let response = serve(&engine, request, 1024).await;
        let collected = response.into_body().collect().await.unwrap();
        let trailers = collected.trailers().cloned().unwrap();
        assert_eq!(trailers[wire::GRPC_STATUS], "3");
    }

    #[tokio::test]
    async fn oversized_body_is_resource_exhausted() {
        let engine = engine();
        let payload = vec![b' '; 64];
        let response = serve(&engine, native_request("/t.Echo/Echo", &payload), 16).await;
        let collected = response.into_body().collect().await.unwrap();
        let trailers = collected.trailers().cloned().unwrap();
        assert_eq!(trailers[wire::GRPC_STATUS], "8");
    }

    #[tokio::test]
    async fn failed_call_reports_status_in_trailers() {
        let engine = engine();
        let response = serve(&engine, native_request("/t.Echo/Fail", b"{}"), 1024).await;

        let collected = response.into_body().collect().await.unwrap();
        let trailers = collected.trailers().cloned().unwrap();
        assert_eq!(trailers[wire::GRPC_STATUS], "5");
        assert_eq!(trailers[wire::GRPC_MESSAGE], "no such thing");
        assert!(collected.to_bytes().is_empty());
    }

    #[tokio::test]
    async fn bad_payload_is_invalid_argument() {
        let engine = engine();
        let response = serve(&engine, native_request("/t.Echo/Echo", b"not-json"), 1024).await;
        let collected = response.into_body().collect().await.unwrap();
        assert_eq!(collected.trailers().unwrap()[wire::GRPC_STATUS], "3");
    }

    #[test]
    fn method_paths_need_exactly_two_segments() {
        assert_eq!(split_method_path("/a.B/C"), Some(("a.B", "C")));
        assert_eq!(split_method_path("/a.B/C/D"), None);
        assert_eq!(split_method_path("/a.B"), None);
        assert_eq!(split_method_path("//C"), None);
    }
}
