//! In-process engine backed by a handler registry.
//!
//! # Responsibilities
//! - Accumulate typed unary handlers during startup
//! - Freeze them into an immutable lookup table
//! - Dispatch calls directly, honoring cancellation and deadlines
//!
//! # Design Decisions
//! - Handlers are strongly typed; JSON is decoded into the handler's request
//!   type at the boundary, and decode failures are `InvalidArgument`
//! - The frozen table is never mutated, so dispatch needs no locking

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::error::SetupError;
use crate::rpc::context::CallContext;
use crate::rpc::engine::{method_path, MethodDescriptor, RpcCall, RpcEngine, RpcOutcome};
use crate::rpc::status::Status;

type BoxHandler = Arc<dyn Fn(Value, CallContext) -> BoxFuture<'static, Result<Value, Status>> + Send + Sync>;

struct Registration {
    descriptor: MethodDescriptor,
    handler: BoxHandler,
}

/// Mutable registry used while the gateway is being configured.
#[derive(Default)]
pub struct ServiceRegistry {
    methods: HashMap<String, Registration>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unary handler for `descriptor`.
    pub fn unary<Req, Resp, F, Fut>(
        &mut self,
        descriptor: MethodDescriptor,
        handler: F,
    ) -> Result<&mut Self, SetupError>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let key = descriptor.path();
        if self.methods.contains_key(&key) {
            return Err(SetupError::DuplicateMethod(key));
        }

        let handler = Arc::new(handler);
        let boxed: BoxHandler = Arc::new(
            move |message: Value, ctx: CallContext| -> BoxFuture<'static, Result<Value, Status>> {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let request: Req = serde_json::from_value(message)
                        .map_err(|e| Status::invalid_argument(e.to_string()))?;
                    let response = handler(request, ctx).await?;
                    serde_json::to_value(response)
                        .map_err(|e| Status::internal(format!("failed to encode response: {}", e)))
                })
            },
        );

        tracing::debug!(method = %key, "Registered RPC handler");
        self.methods.insert(
            key,
            Registration {
                descriptor,
                handler: boxed,
            },
        );
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.values().map(|r| &r.descriptor)
    }

    /// Freeze into an engine. No handler can be added afterwards.
    pub fn into_engine(self) -> LocalEngine {
        LocalEngine {
            methods: Arc::new(self.methods),
        }
    }
}

/// Engine dispatching directly to in-process handlers.
#[derive(Clone)]
pub struct LocalEngine {
    methods: Arc<HashMap<String, Registration>>,
}

impl LocalEngine {
    pub fn descriptors(&self) -> Vec<MethodDescriptor> {
        self.methods.values().map(|r| r.descriptor.clone()).collect()
    }
}

#[async_trait]
impl RpcEngine for LocalEngine {
    fn describe(&self, service: &str, method: &str) -> Option<MethodDescriptor> {
        self.methods
            .get(&method_path(service, method))
            .map(|r| r.descriptor.clone())
    }

    async fn dispatch(&self, call: RpcCall, ctx: &CallContext) -> RpcOutcome {
        let key = method_path(&call.service, &call.method);
        let Some(registration) = self.methods.get(&key) else {
            return RpcOutcome::failed(Status::unimplemented(format!("unknown method {}", key)));
        };

        if ctx.is_cancelled() {
            return RpcOutcome::failed(Status::cancelled("call cancelled before dispatch"));
        }

        let handler = (registration.handler)(call.message, ctx.clone());
        let deadline = ctx.deadline();
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        let result = tokio::select! {
            result = handler => result,
            _ = ctx.cancelled() => Err(Status::cancelled("call cancelled by caller")),
            _ = expired => {
                ctx.cancel();
                Err(Status::deadline_exceeded(format!("deadline exceeded calling {}", key)))
            }
        };

        let (header, trailer) = ctx.take_response_metadata();
        RpcOutcome {
            result,
            header,
            trailer,
        }
    }

    fn kind(&self) -> &'static str {
        "in-process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::engine::{Empty, MessageKind};
    use crate::rpc::status::Code;
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Deserialize)]
    struct Greet {
        name: String,
    }

    #[derive(Serialize)]
    struct Greeting {
        text: String,
    }

    fn greet() -> MethodDescriptor {
        MethodDescriptor::new(
            "test.Greeter",
            "Greet",
            MessageKind::named("Greet"),
            MessageKind::named("Greeting"),
        )
    }

    fn engine() -> LocalEngine {
        let mut registry = ServiceRegistry::new();
        registry
            .unary(greet(), |req: Greet, ctx: CallContext| async move {
                ctx.append_header("x-greeter", "v1");
                ctx.append_trailer("x-cost", "1");
                Ok::<_, Status>(Greeting {
                    text: format!("hi {}", req.name),
                })
            })
            .unwrap();
        registry
            .unary(
                MethodDescriptor::new("test.Greeter", "Hang", MessageKind::Empty, MessageKind::Empty),
                |_: Empty, ctx: CallContext| async move {
                    ctx.cancelled().await;
                    Ok::<_, Status>(Empty {})
                },
            )
            .unwrap();
        registry.into_engine()
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ServiceRegistry::new();
        registry
            .unary(greet(), |_: Empty, _| async { Ok::<_, Status>(Empty {}) })
            .unwrap();
        let err = registry
            .unary(greet(), |_: Empty, _| async { Ok::<_, Status>(Empty {}) })
            .err()
            .unwrap();
        assert_eq!(err, SetupError::DuplicateMethod("/test.Greeter/Greet".into()));
    }

    #[tokio::test]
    async fn dispatch_runs_handler_and_collects_metadata() {
        let engine = engine();
        let ctx = CallContext::default();
        let outcome = engine
            .dispatch(RpcCall::new(&greet(), json!({"name": "Ada"})), &ctx)
            .await;

        assert_eq!(outcome.result.unwrap(), json!({"text": "hi Ada"}));
        assert_eq!(outcome.header.get("x-greeter"), Some("v1"));
        assert_eq!(outcome.trailer.get("x-cost"), Some("1"));
    }

    #[tokio::test]
    async fn undecodable_message_is_invalid_argument() {
        let engine = engine();
        let outcome = engine
            .dispatch(RpcCall::new(&greet(), json!({"name": 7})), &CallContext::default())
            .await;
        assert_eq!(outcome.result.unwrap_err().code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn unknown_method_is_unimplemented() {
        let engine = engine();
        let call = RpcCall {
            service: "test.Greeter".into(),
            method: "Missing".into(),
            message: json!({}),
        };
        let outcome = engine.dispatch(call, &CallContext::default()).await;
        assert_eq!(outcome.result.unwrap_err().code(), Code::Unimplemented);
        assert!(engine.describe("test.Greeter", "Missing").is_none());
        assert!(engine.describe("test.Greeter", "Greet").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_cancels_the_call() {
        let engine = engine();
        let ctx = CallContext::default().with_timeout(Duration::from_millis(20));
        let hang = engine.describe("test.Greeter", "Hang").unwrap();

        let outcome = engine.dispatch(RpcCall::new(&hang, json!({})), &ctx).await;
        assert_eq!(outcome.result.unwrap_err().code(), Code::DeadlineExceeded);
        assert!(ctx.is_cancelled());
    }
}
