//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured `hostname:port`
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Graceful handling of accept errors

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// The configured host did not resolve to any address.
    Resolve { host: String, source: std::io::Error },
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
    /// The connection limit semaphore was closed.
    Closed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Resolve { host, source } => {
                write!(f, "Failed to resolve {}: {}", host, source)
            }
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => f.write_str("Listener closed"),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Resolve { source, .. } => Some(source),
            ListenerError::Bind(e) | ListenerError::Accept(e) => Some(e),
            ListenerError::Closed => None,
        }
    }
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind to `hostname:port` with connection limits.
    ///
    /// The first resolved address that binds wins.
    pub async fn bind(hostname: &str, port: u16, max_connections: usize) -> Result<Self, ListenerError> {
        let authority = format!("{}:{}", hostname, port);
        let addrs: Vec<SocketAddr> = lookup_host(&authority)
            .await
            .map_err(|source| ListenerError::Resolve {
                host: authority.clone(),
                source,
            })?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            match TcpListener::bind(addr).await {
                Ok(listener) => return Self::from_std_listener(listener, max_connections),
                Err(e) => {
                    tracing::debug!(address = %addr, error = %e, "Bind attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(ListenerError::Bind(last_error.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("{} resolved to no addresses", authority),
            )
        })))
    }

    fn from_std_listener(listener: TcpListener, max_connections: usize) -> Result<Self, ListenerError> {
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        let max_connections = max_connections.max(1);

        tracing::info!(
            address = %local_addr,
            max_connections = max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer_addr = %addr, error = %e, "Failed to set TCP_NODELAY");
        }

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool, even if
/// the connection task panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_an_ephemeral_port_and_limits_connections() {
        let listener = Listener::bind("127.0.0.1", 0, 1).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, _peer, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 0);

        drop(permit);
        assert_eq!(listener.available_permits(), 1);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let first = Listener::bind("127.0.0.1", 0, 4).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let err = Listener::bind("127.0.0.1", port, 4).await.err().unwrap();
        assert!(matches!(err, ListenerError::Bind(_)), "{err}");
    }
}
