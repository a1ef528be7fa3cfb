//! Transport factory: dialing and listening

use crate::core::listener::Listener;
use crate::error::{Result, TransportError};
use crate::socket::{Socket, SocketConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connection timeout for `dial`
    pub connect_timeout: Duration,
    /// Maximum concurrent connections served by a listener
    pub max_connections: usize,
    /// Configuration applied to every socket
    pub socket: SocketConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            max_connections: 1000,
            socket: SocketConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set connection timeout
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set maximum connections
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-socket configuration
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_socket_config(mut self, socket: SocketConfig) -> Self {
        self.socket = socket;
        self
    }

    /// Set the primary queue capacity of every socket
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.socket.queue_capacity = capacity;
        self
    }
}

/// Entry point for creating sockets and listeners
///
/// # Example
///
/// ```no_run
/// use rust_duplex_transport::{EchoHandler, Message, Transport};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Transport::new();
///
/// let listener = Arc::new(transport.listen("127.0.0.1:").await?);
/// let server = Arc::clone(&listener);
/// tokio::spawn(async move { server.accept(EchoHandler).await });
///
/// let socket = transport.dial(&listener.addr()).await?;
/// socket.send(&mut Message::new("hello")).await?;
/// let reply = socket.recv().await?;
/// assert_eq!(reply.body().as_ref(), b"hello");
///
/// socket.close().await?;
/// listener.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Transport {
    config: TransportConfig,
}

impl Transport {
    /// Create a transport with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport with custom configuration
    #[must_use]
    pub fn with_config(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Connect to a listener and return the client socket
    pub async fn dial(&self, address: &str) -> Result<Socket> {
        let addr = resolve_address(address).await?;

        let stream = timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::timeout("Connection timed out"))?
            .map_err(|e| TransportError::connection(format!("Failed to connect: {}", e)))?;

        let stream = configure_stream(stream, self.config.socket.keep_alive)?;
        let socket = Socket::from_tcp(stream, self.config.socket.clone())?;

        tracing::info!("Socket {} connected to {}", socket.id(), addr);
        Ok(socket)
    }

    /// Bind a listener
    ///
    /// A trailing `:` without a port (`"127.0.0.1:"`) binds an ephemeral port.
    pub async fn listen(&self, address: &str) -> Result<Listener> {
        let addr = resolve_address(address).await?;
        Listener::bind(addr, self.config.clone()).await
    }
}

/// Resolve `host:port`, treating an empty port as 0
pub(crate) async fn resolve_address(address: &str) -> Result<SocketAddr> {
    let address = if address.ends_with(':') {
        format!("{}0", address)
    } else {
        address.to_string()
    };

    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let resolved = lookup_host(address.as_str())
        .await
        .map_err(|e| TransportError::invalid_address(format!("{}: {}", address, e)))?
        .next()
        .ok_or_else(|| TransportError::invalid_address(format!("{}: no addresses", address)));
    resolved
}

/// Apply TCP options to a fresh connection
pub(crate) fn configure_stream(
    stream: TcpStream,
    keep_alive: Option<Duration>,
) -> Result<TcpStream> {
    stream.set_nodelay(true)?;

    let Some(keep_alive) = keep_alive else {
        return Ok(stream);
    };

    let std_stream = stream.into_std().map_err(|e| {
        TransportError::other(format!("Failed to convert tokio stream to std: {}", e))
    })?;
    let socket = socket2::Socket::from(std_stream);

    let keep_alive = socket2::TcpKeepalive::new().with_time(keep_alive);
    socket
        .set_tcp_keepalive(&keep_alive)
        .map_err(|e| TransportError::other(format!("Failed to set keep-alive: {}", e)))?;

    // socket2 may clear the nonblocking flag that tokio depends on
    socket.set_nonblocking(true).map_err(|e| {
        TransportError::other(format!(
            "Failed to restore nonblocking mode after keep-alive config: {}",
            e
        ))
    })?;

    TcpStream::from_std(socket.into()).map_err(|e| {
        TransportError::other(format!("Failed to convert std socket back to tokio: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config() {
        let config = TransportConfig::new()
            .with_connect_timeout(Duration::from_secs(2))
            .with_max_connections(5)
            .with_queue_capacity(16);

        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.socket.queue_capacity, 16);
    }

    #[tokio::test]
    async fn test_resolve_empty_port() {
        let addr = resolve_address("127.0.0.1:").await.unwrap();
        assert_eq!(addr.port(), 0);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_resolve_hostname() {
        let addr = resolve_address("localhost:").await.unwrap();
        assert_eq!(addr.port(), 0);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_resolve_invalid() {
        assert!(matches!(
            resolve_address("not an address").await,
            Err(TransportError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to find a port nobody listens on
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let transport = Transport::new();
        let result = transport.dial(&format!("127.0.0.1:{}", port)).await;
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }
}
