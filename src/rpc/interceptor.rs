//! Metrics interceptor wrapped around the serving engine.
//!
//! Every call through the wrapped engine, whichever surface it arrived on,
//! is counted by method and timed. Calls to methods the engine does not
//! serve share one `unknown` label pair, so callers cannot mint new series.

use async_trait::async_trait;
use std::time::Instant;

use crate::observability::metrics;
use crate::rpc::context::CallContext;
use crate::rpc::engine::{MethodDescriptor, RpcCall, RpcEngine, RpcOutcome};
use crate::rpc::status::Code;

const UNKNOWN_LABEL: &str = "unknown";

pub struct Instrumented<E> {
    inner: E,
}

impl<E: RpcEngine> Instrumented<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: RpcEngine> RpcEngine for Instrumented<E> {
    fn describe(&self, service: &str, method: &str) -> Option<MethodDescriptor> {
        self.inner.describe(service, method)
    }

    async fn dispatch(&self, call: RpcCall, ctx: &CallContext) -> RpcOutcome {
        let start_time = Instant::now();
        let (service, method) = match self.inner.describe(&call.service, &call.method) {
            Some(descriptor) => (descriptor.service, descriptor.method),
            None => (UNKNOWN_LABEL.to_string(), UNKNOWN_LABEL.to_string()),
        };
        metrics::record_rpc_started(&service, &method);

        let outcome = self.inner.dispatch(call, ctx).await;

        let code = match &outcome.result {
            Ok(_) => Code::Ok,
            Err(status) => status.code(),
        };
        metrics::record_rpc_handled(&service, &method, code, start_time);
        tracing::debug!(
            service = %service,
            method = %method,
            code = %code,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "RPC handled"
        );
        outcome
    }

    fn kind(&self) -> &'static str {
        self.inner.kind()
    }
}
