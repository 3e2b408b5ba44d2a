//! Metrics collection and exposition.
//!
//! # Metrics
//! - `grpc_server_started_total` (counter): calls started, by service/method
//! - `grpc_server_handled_total` (counter): calls completed, by service/method/code
//! - `grpc_server_handling_seconds` (histogram): call latency
//! - `gateway_http_requests_total` (counter): requests by protocol and HTTP status
//! - `gateway_http_request_duration_seconds` (histogram): request latency
//!
//! # Design Decisions
//! - Backed by the `metrics` facade; the Prometheus recorder is installed once
//!   per process and every gateway renders from the same handle
//! - Updates are lock-free atomic increments inside the recorder

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::error::SetupError;
use crate::rpc::status::Code;

pub const RPC_STARTED: &str = "grpc_server_started_total";
pub const RPC_HANDLED: &str = "grpc_server_handled_total";
pub const RPC_HANDLING_SECONDS: &str = "grpc_server_handling_seconds";
pub const HTTP_REQUESTS: &str = "gateway_http_requests_total";
pub const HTTP_DURATION_SECONDS: &str = "gateway_http_request_duration_seconds";

const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

static HANDLE: OnceLock<Result<PrometheusHandle, String>> = OnceLock::new();

/// Install the Prometheus recorder (first call only) and return its handle.
///
/// Fails when some other recorder already owns the process-wide slot: every
/// counter would land there and the metrics path would render nothing.
pub fn init_metrics() -> Result<PrometheusHandle, SetupError> {
    HANDLE
        .get_or_init(install)
        .clone()
        .map_err(|reason| SetupError::Registration {
            scope: "metrics".to_string(),
            reason: format!("cannot install the Prometheus recorder: {}", reason),
        })
}

fn install() -> Result<PrometheusHandle, String> {
    let builder = match PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("_seconds".to_string()), LATENCY_BUCKETS)
    {
        Ok(builder) => builder,
        Err(e) => {
            tracing::error!(error = %e, "Invalid histogram buckets, using summaries");
            PrometheusBuilder::new()
        }
    };

    match builder.install_recorder() {
        Ok(handle) => {
            tracing::info!("Prometheus recorder installed");
            Ok(handle)
        }
        Err(e) => {
            tracing::error!(error = %e, "Metrics recorder already installed elsewhere");
            Err(e.to_string())
        }
    }
}

/// Periodically drain histogram buffers so rendering stays cheap.
pub fn spawn_upkeep(handle: PrometheusHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPKEEP_INTERVAL);
        loop {
            interval.tick().await;
            handle.run_upkeep();
        }
    })
}

pub fn record_rpc_started(service: &str, method: &str) {
    metrics::counter!(
        RPC_STARTED,
        "grpc_service" => service.to_string(),
        "grpc_method" => method.to_string()
    )
    .increment(1);
}

pub fn record_rpc_handled(service: &str, method: &str, code: Code, start_time: Instant) {
    metrics::counter!(
        RPC_HANDLED,
        "grpc_service" => service.to_string(),
        "grpc_method" => method.to_string(),
        "grpc_code" => code.name()
    )
    .increment(1);
    metrics::histogram!(
        RPC_HANDLING_SECONDS,
        "grpc_service" => service.to_string(),
        "grpc_method" => method.to_string()
    )
    .record(start_time.elapsed().as_secs_f64());
}

pub fn record_http_request(protocol: &'static str, status: u16, start_time: Instant) {
    metrics::counter!(
        HTTP_REQUESTS,
        "protocol" => protocol,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(HTTP_DURATION_SECONDS, "protocol" => protocol)
        .record(start_time.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_is_shared_and_live() {
        let first = init_metrics().unwrap();
        let second = init_metrics().unwrap();

        record_http_request("rest", 299, Instant::now());
        assert!(first.render().contains(r#"status="299""#));
        assert!(second.render().contains(r#"status="299""#));
    }

    #[test]
    fn a_taken_global_slot_is_an_error() {
        init_metrics().unwrap();
        assert!(install().is_err());
    }
}
