//! Configuration schema definitions.
//!
//! `GatewayConfig` is the explicit value the gateway core is built from.
//! `FileConfig` is the TOML document the binary reads; it names the PEM files
//! and is turned into a `GatewayConfig` by the loader.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// How translated REST calls reach the RPC engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Call the registered handlers directly.
    #[default]
    InProcess,
    /// Dial the gateway's own RPC surface over TLS + HTTP/2.
    Loopback,
}

/// Response to a path that exists under another verb.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerbMismatchPolicy {
    /// Plain route miss (404).
    #[default]
    NotFound,
    /// 405 with an `Allow` header.
    MethodNotAllowed,
}

/// Everything the gateway core needs. Immutable once the gateway is configured.
#[derive(Clone)]
pub struct GatewayConfig {
    pub hostname: String,
    pub port: u16,
    /// PEM-encoded certificate chain.
    pub cert_pem: Vec<u8>,
    /// PEM-encoded private key.
    pub key_pem: Vec<u8>,
    pub dispatch: DispatchMode,
    pub verb_mismatch: VerbMismatchPolicy,
    /// Largest request body read by either surface.
    pub max_body_bytes: usize,
    /// Deadline applied to translated calls without `grpc-timeout`.
    pub default_timeout: Option<Duration>,
    pub max_connections: usize,
    /// How long shutdown waits for open connections.
    pub drain_timeout: Duration,
    pub metrics_path: String,
}

impl GatewayConfig {
    pub fn new(hostname: impl Into<String>, port: u16, cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            cert_pem,
            key_pem,
            dispatch: DispatchMode::default(),
            verb_mismatch: VerbMismatchPolicy::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            default_timeout: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            drain_timeout: Duration::from_secs(30),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
        }
    }

    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_verb_mismatch(mut self, policy: VerbMismatchPolicy) -> Self {
        self.verb_mismatch = policy;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // key material stays out of logs
        f.debug_struct("GatewayConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("dispatch", &self.dispatch)
            .field("verb_mismatch", &self.verb_mismatch)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("default_timeout", &self.default_timeout)
            .field("max_connections", &self.max_connections)
            .field("metrics_path", &self.metrics_path)
            .finish_non_exhaustive()
    }
}

/// Root of the TOML configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub listener: ListenerConfig,
    pub tls: TlsConfig,
    pub gateway: GatewaySection,
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host name to bind; also the TLS server name for loopback dials.
    pub hostname: String,

    pub port: u16,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Seconds shutdown waits for open connections to finish.
    pub drain_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 5000,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            drain_timeout_secs: 30,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: "cert.pem".to_string(),
            key_path: "key.pem".to_string(),
        }
    }
}

/// Gateway behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewaySection {
    pub dispatch: DispatchMode,
    pub verb_mismatch: VerbMismatchPolicy,
    pub max_body_bytes: usize,
    /// Default deadline in milliseconds; 0 disables it.
    pub default_timeout_ms: u64,
    pub metrics_path: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::default(),
            verb_mismatch: VerbMismatchPolicy::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            default_timeout_ms: 0,
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration. `RUST_LOG` overrides `filter`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "rpc_gateway=info,tower_http=info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl FileConfig {
    /// Combine with PEM bytes read from the configured paths.
    pub fn into_gateway_config(self, cert_pem: Vec<u8>, key_pem: Vec<u8>) -> GatewayConfig {
        let gateway = self.gateway;
        GatewayConfig {
            hostname: self.listener.hostname,
            port: self.listener.port,
            cert_pem,
            key_pem,
            dispatch: gateway.dispatch,
            verb_mismatch: gateway.verb_mismatch,
            max_body_bytes: gateway.max_body_bytes,
            default_timeout: (gateway.default_timeout_ms > 0)
                .then(|| Duration::from_millis(gateway.default_timeout_ms)),
            max_connections: self.listener.max_connections,
            drain_timeout: Duration::from_secs(self.listener.drain_timeout_secs),
            metrics_path: gateway.metrics_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.hostname, "localhost");
        assert_eq!(config.listener.port, 5000);
        assert_eq!(config.gateway.dispatch, DispatchMode::InProcess);
        assert_eq!(config.gateway.metrics_path, "/metrics");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn parses_every_section() {
        let config: FileConfig = toml::from_str(
            r#"
            [listener]
            hostname = "gateway.local"
            port = 8443

            [tls]
            cert_path = "/etc/gw/cert.pem"
            key_path = "/etc/gw/key.pem"

            [gateway]
            dispatch = "loopback"
            verb_mismatch = "method_not_allowed"
            default_timeout_ms = 1500

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        let gateway = config.into_gateway_config(b"cert".to_vec(), b"key".to_vec());
        assert_eq!(gateway.hostname, "gateway.local");
        assert_eq!(gateway.port, 8443);
        assert_eq!(gateway.dispatch, DispatchMode::Loopback);
        assert_eq!(gateway.verb_mismatch, VerbMismatchPolicy::MethodNotAllowed);
        assert_eq!(gateway.default_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn debug_output_omits_key_material() {
        let config = GatewayConfig::new("localhost", 1, b"CERT".to_vec(), b"SECRET".to_vec());
        assert!(!format!("{config:?}").contains("SECRET"));
    }
}
