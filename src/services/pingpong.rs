//! The PingPong service and its REST bindings.
//!
//! ```text
//! rpc  /pingpong.PingPong/Ping    PingRequest → PongReply
//! rpc  /pingpong.PingPong/NoPing  Empty       → PongReply
//!
//! POST /pingpong/ping   {"sender": "John"} → {"message": "Hello John"}
//! GET  /pingpong/pong                       → {"message": "HelloPong"}
//! GET  /custom/rest                         → pingpong
//! ```

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Response};
use serde::{Deserialize, Serialize};

use crate::error::SetupError;
use crate::http::Options;
use crate::routing::RouteTableBuilder;
use crate::rpc::context::CallContext;
use crate::rpc::engine::{Empty, MessageKind, MethodDescriptor};
use crate::rpc::registry::ServiceRegistry;
use crate::rpc::status::Status;

pub const SERVICE: &str = "pingpong.PingPong";
pub const PING: &str = "Ping";
pub const NO_PING: &str = "NoPing";

/// Mount point of the translated routes.
pub const REST_PREFIX: &str = "/pingpong/";
/// Mount point of the plain handlers.
pub const CUSTOM_PREFIX: &str = "/custom/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    #[serde(default)]
    pub sender: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongReply {
    #[serde(default)]
    pub message: String,
}

pub fn ping_descriptor() -> MethodDescriptor {
    MethodDescriptor::new(
        SERVICE,
        PING,
        MessageKind::named("pingpong.PingRequest"),
        MessageKind::named("pingpong.PongReply"),
    )
}

pub fn no_ping_descriptor() -> MethodDescriptor {
    MethodDescriptor::new(
        SERVICE,
        NO_PING,
        MessageKind::Empty,
        MessageKind::named("pingpong.PongReply"),
    )
}

pub async fn ping(request: PingRequest, _ctx: CallContext) -> Result<PongReply, Status> {
    Ok(PongReply {
        message: format!("Hello {}", request.sender),
    })
}

pub async fn no_ping(_request: Empty, _ctx: CallContext) -> Result<PongReply, Status> {
    Ok(PongReply {
        message: "HelloPong".to_string(),
    })
}

/// Register both methods with the gateway's engine.
pub fn register(registry: &mut ServiceRegistry) -> Result<(), SetupError> {
    tracing::info!(service = SERVICE, "Registering PingPong service");
    registry
        .unary(ping_descriptor(), ping)?
        .unary(no_ping_descriptor(), no_ping)?;
    Ok(())
}

/// REST bindings, mounted under [`REST_PREFIX`].
pub fn rest_routes(options: &Options) -> RouteTableBuilder {
    tracing::info!(
        rpc_address = %options.dial.authority(),
        dispatch = ?options.dispatch,
        "Registering PingPong REST routes"
    );
    RouteTableBuilder::new()
        .rpc(Method::POST, "/ping", SERVICE, PING)
        .rpc(Method::GET, "/pong", SERVICE, NO_PING)
}

/// Plain handlers, mounted under [`CUSTOM_PREFIX`].
pub fn custom_routes(_options: &Options) -> RouteTableBuilder {
    RouteTableBuilder::new().handler(Method::GET, "/rest", |_request, _params| async {
        let mut response = Response::new(Body::from("pingpong"));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_greets_the_sender() {
        let reply = ping(PingRequest { sender: "John".into() }, CallContext::default())
            .await
            .unwrap();
        assert_eq!(reply.message, "Hello John");
    }

    #[tokio::test]
    async fn no_ping_is_fixed() {
        let reply = no_ping(Empty {}, CallContext::default()).await.unwrap();
        assert_eq!(reply.message, "HelloPong");
    }

    #[test]
    fn registering_twice_is_rejected() {
        let mut registry = ServiceRegistry::new();
        register(&mut registry).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            register(&mut registry),
            Err(SetupError::DuplicateMethod("/pingpong.PingPong/Ping".into()))
        );
    }
}
