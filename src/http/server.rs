//! Gateway configuration, assembly and serving.
//!
//! # Responsibilities
//! - Parse the TLS material and derive the loopback dial options
//! - Collect RPC handlers and REST route sub-tables
//! - Validate every registration before anything is served
//! - Own the TLS listener and the per-connection tasks
//! - Drain connections on shutdown
//!
//! # Design Decisions
//! - Registration accumulates into an owned builder, frozen by `build`
//! - Every configuration problem is reported at once
//! - One task per connection; HTTP/2 streams are served concurrently within it
//! - A failed handshake or broken connection only ends that connection

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;

use crate::config::{DispatchMode, GatewayConfig};
use crate::error::{GatewayError, SetupError};
use crate::http::multiplex::{self, Surfaces};
use crate::http::translate::Translator;
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::net::tls::{DialOptions, TlsMaterial};
use crate::observability::metrics;
use crate::routing::{MountTableBuilder, RouteTableBuilder};
use crate::rpc::engine::RpcEngine;
use crate::rpc::interceptor::Instrumented;
use crate::rpc::loopback::LoopbackEngine;
use crate::rpc::registry::ServiceRegistry;

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// What route builders get to see of the gateway being configured.
#[derive(Debug, Clone)]
pub struct Options {
    pub hostname: String,
    pub port: u16,
    /// How to reach the gateway's own RPC surface.
    pub dial: DialOptions,
    pub dispatch: DispatchMode,
}

/// Entry point: `Gateway::configure(config)`.
pub struct Gateway {
    config: GatewayConfig,
    acceptor: TlsAcceptor,
    router: Router,
    metrics: PrometheusHandle,
}

/// Registration phase of a [`Gateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    tls: TlsMaterial,
    options: Options,
    registry: ServiceRegistry,
    mounts: MountTableBuilder,
    errors: Vec<SetupError>,
}

impl Gateway {
    /// Parse the TLS material and start registration.
    ///
    /// Fails if the certificate or key is malformed or they do not match.
    pub fn configure(config: GatewayConfig) -> Result<GatewayBuilder, GatewayError> {
        let tls = TlsMaterial::from_pem(&config.cert_pem, &config.key_pem)?;
        let dial = tls.dial_options(&config.hostname, config.port)?;

        tracing::info!(
            hostname = %config.hostname,
            port = config.port,
            trust_anchors = tls.trust_anchors(),
            "Gateway configured"
        );

        let options = Options {
            hostname: config.hostname.clone(),
            port: config.port,
            dial,
            dispatch: config.dispatch,
        };

        Ok(GatewayBuilder {
            config,
            tls,
            options,
            registry: ServiceRegistry::new(),
            mounts: MountTableBuilder::new(),
            errors: Vec::new(),
        })
    }

    /// The service every connection is served with.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    /// Bind the listener. A bind failure is fatal.
    pub async fn bind(self) -> Result<BoundGateway, GatewayError> {
        let listener = Listener::bind(
            &self.config.hostname,
            self.config.port,
            self.config.max_connections,
        )
        .await?;
        Ok(BoundGateway {
            gateway: self,
            listener,
        })
    }

    /// Bind, then serve until `shutdown` triggers.
    pub async fn serve(self, shutdown: Shutdown) -> Result<(), GatewayError> {
        self.bind().await?.serve(shutdown).await
    }
}

impl GatewayBuilder {
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Register RPC handlers.
    pub fn register_rpc<F>(mut self, register: F) -> Self
    where
        F: FnOnce(&mut ServiceRegistry) -> Result<(), SetupError>,
    {
        if let Err(e) = register(&mut self.registry) {
            self.errors.push(e);
        }
        self
    }

    /// Mount the sub-table built by `routes` under `prefix`.
    ///
    /// A prefix ending in `/` serves its whole subtree, with the prefix minus
    /// the trailing slash stripped before inner routes are matched.
    pub fn handle<F>(mut self, prefix: &str, routes: F) -> Self
    where
        F: FnOnce(&Options) -> RouteTableBuilder,
    {
        let table = routes(&self.options);
        self.mounts.mount(prefix, table);
        self
    }

    /// Freeze every registration. Reports all configuration errors together.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let GatewayBuilder {
            config,
            tls,
            options,
            registry,
            mounts,
            mut errors,
        } = self;

        if !config.metrics_path.starts_with('/') {
            errors.push(SetupError::InvalidPrefix {
                prefix: config.metrics_path.clone(),
                reason: "metrics path must start with '/'",
            });
        }
        if config.dispatch == DispatchMode::Loopback && config.port == 0 {
            errors.push(SetupError::Registration {
                scope: "dispatch".to_string(),
                reason: "loopback dispatch needs a fixed port".to_string(),
            });
        }

        let metrics = match metrics::init_metrics() {
            Ok(handle) => Some(handle),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let local = registry.into_engine();
        let methods = local.descriptors();
        let native: Arc<Instrumented<_>> = Arc::new(Instrumented::new(local));

        let mounts = match mounts.freeze(|service, method| native.describe(service, method)) {
            Ok(mounts) => Some(mounts),
            Err(mut e) => {
                errors.append(&mut e);
                None
            }
        };

        let (mounts, metrics) = match (mounts, metrics) {
            (Some(mounts), Some(metrics)) if errors.is_empty() => (mounts, metrics),
            _ => {
                for error in &errors {
                    tracing::error!(error = %error, "Invalid gateway setup");
                }
                return Err(GatewayError::Setup(errors));
            }
        };

        let rest_engine: Arc<dyn RpcEngine> = match config.dispatch {
            DispatchMode::InProcess => native.clone(),
            DispatchMode::Loopback => Arc::new(LoopbackEngine::new(options.dial.clone(), methods.iter().cloned())),
        };

        let acceptor = tls.acceptor()?;
        let translator = Translator::new(rest_engine, config.max_body_bytes, config.default_timeout);

        tracing::info!(
            methods = methods.len(),
            mounts = mounts.prefixes().count(),
            rest_dispatch = translator.engine_kind(),
            metrics_path = %config.metrics_path,
            "Gateway routes frozen"
        );

        let router = multiplex::router(Surfaces {
            native,
            translator,
            mounts,
            metrics_path: config.metrics_path.clone(),
            metrics: metrics.clone(),
            verb_mismatch: config.verb_mismatch,
            max_body_bytes: config.max_body_bytes,
        });

        Ok(Gateway {
            config,
            acceptor,
            router,
            metrics,
        })
    }
}

/// A gateway whose listener is bound but not yet accepting.
pub struct BoundGateway {
    gateway: Gateway,
    listener: Listener,
}

impl BoundGateway {
    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` triggers, then drain.
    pub async fn serve(self, shutdown: Shutdown) -> Result<(), GatewayError> {
        let BoundGateway { gateway, listener } = self;
        let local_addr = listener.local_addr()?;
        let upkeep = metrics::spawn_upkeep(gateway.metrics.clone());
        let tracker = ConnectionTracker::new();
        let mut signal = shutdown.subscribe();

        tracing::info!(address = %local_addr, "Gateway serving");

        let result = loop {
            tokio::select! {
                _ = signal.recv() => break Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        tokio::spawn(serve_connection(
                            stream,
                            peer,
                            gateway.acceptor.clone(),
                            gateway.router.clone(),
                            shutdown.subscribe(),
                            tracker.track(),
                            permit,
                        ));
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                    Err(e) => break Err(GatewayError::from(e)),
                },
            }
        };

        drop(listener);
        tracing::info!(
            active_connections = tracker.active_count(),
            "Stopped accepting, draining connections"
        );
        if !tracker.drain(gateway.config.drain_timeout).await {
            tracing::warn!(
                remaining = tracker.active_count(),
                "Drain timeout elapsed with connections still open"
            );
        }
        upkeep.abort();

        tracing::info!("Gateway stopped");
        result
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    router: Router,
    mut shutdown: ShutdownSignal,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
) {
    let connection_id = guard.id();

    let tls = match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => {
            tracing::debug!(connection_id = %connection_id, peer_addr = %peer, error = %e, "TLS handshake failed");
            return;
        }
        Err(_) => {
            tracing::debug!(connection_id = %connection_id, peer_addr = %peer, "TLS handshake timed out");
            return;
        }
    };

    let alpn = tls
        .get_ref()
        .1
        .alpn_protocol()
        .map(|p| String::from_utf8_lossy(p).into_owned());
    tracing::trace!(connection_id = %connection_id, peer_addr = %peer, alpn = ?alpn, "TLS established");

    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        router.clone().oneshot(request.map(Body::new))
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(tls), service);
    tokio::pin!(connection);

    let mut draining = false;
    loop {
        tokio::select! {
            result = connection.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(connection_id = %connection_id, peer_addr = %peer, error = %e, "Connection error");
                }
                break;
            }
            _ = shutdown.recv(), if !draining => {
                draining = true;
                connection.as_mut().graceful_shutdown();
            }
        }
    }
}
