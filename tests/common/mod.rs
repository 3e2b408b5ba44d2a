//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;

use rpc_gateway::config::GatewayConfig;
use rpc_gateway::lifecycle::Shutdown;
use rpc_gateway::services::pingpong;
use rpc_gateway::{Gateway, GatewayBuilder, GatewayError};

pub const CERT: &[u8] = include_bytes!("../fixtures/cert_localhost.pem");
pub const KEY: &[u8] = include_bytes!("../fixtures/key_localhost.pem");
pub const OTHER_KEY: &[u8] = include_bytes!("../fixtures/key_other.pem");

pub const HOST: &str = "localhost";

/// A port that was free a moment ago.
pub async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub fn config(port: u16) -> GatewayConfig {
    GatewayConfig::new(HOST, port, CERT.to_vec(), KEY.to_vec())
}

/// The PingPong service with its REST and custom mounts.
pub fn with_pingpong(builder: GatewayBuilder) -> GatewayBuilder {
    builder
        .register_rpc(pingpong::register)
        .handle(pingpong::REST_PREFIX, pingpong::rest_routes)
        .handle(pingpong::CUSTOM_PREFIX, pingpong::custom_routes)
}

pub fn pingpong_gateway(config: GatewayConfig) -> Gateway {
    with_pingpong(Gateway::configure(config).unwrap()).build().unwrap()
}

/// A gateway serving on a real socket.
pub struct RunningGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), GatewayError>>,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("https://{}:{}{}", HOST, self.addr.port(), path)
    }

    /// HTTPS client trusting only the fixture certificate.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .add_root_certificate(reqwest::Certificate::from_pem(CERT).unwrap())
            .tls_built_in_root_certs(false)
            .resolve(HOST, self.addr)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    /// Same as [`client`](Self::client), restricted to HTTP/1.1.
    pub fn http1_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .add_root_certificate(reqwest::Certificate::from_pem(CERT).unwrap())
            .tls_built_in_root_certs(false)
            .resolve(HOST, self.addr)
            .http1_only()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("gateway stopped in time")
            .unwrap()
            .unwrap();
    }
}

pub async fn start(gateway: Gateway) -> RunningGateway {
    let bound = gateway.bind().await.unwrap();
    let addr = bound.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(bound.serve(shutdown.clone()));
    RunningGateway {
        addr,
        shutdown,
        handle,
    }
}
