//! TCP transport to the backend.
//!
//! One persistent connection carrying newline-delimited JSON through
//! [`AcsCodec`]. The client is a plain transport: it neither retries nor
//! keeps the session alive. Reconnect cadence and silence detection belong to
//! the coordinator.
//!
//! Connect and send are bounded by the configured timeout. `recv` waits
//! indefinitely and is cancellation safe, so it can sit in a `select!`
//! next to timers and the request queue.
//!
//! ```no_run
//! use acs_network::{TcpClient, TcpClientConfig};
//! use acs_protocol::{Outbound, OutboundBody};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = TcpClient::new(TcpClientConfig {
//!     server_addr: "192.168.0.100:4000".parse()?,
//!     timeout: Duration::from_millis(3000),
//! });
//! client.connect().await?;
//! client.send(Outbound::new(0, OutboundBody::message("hello"))).await?;
//! let reply = client.recv().await?;
//! println!("Received: {:?}", reply);
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use acs_core::constants::TRANSPORT_TIMEOUT_MS;
use acs_protocol::{AcsCodec, Inbound, Outbound};
use futures::{SinkExt, StreamExt};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone)]
pub struct TcpClientConfig {
    /// Backend address
    pub server_addr: SocketAddr,

    /// Bound on connect and send
    pub timeout: Duration,
}

impl Default for TcpClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 4000)),
            timeout: Duration::from_millis(TRANSPORT_TIMEOUT_MS),
        }
    }
}

/// Errors that can occur during TCP client operations
#[derive(Debug, Error)]
pub enum TcpClientError {
    #[error("Not connected to server")]
    NotConnected,

    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    #[error("Write timeout after {0}ms")]
    WriteTimeout(u64),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Framing or serialization failure from AcsCodec
    #[error("Protocol error: {0}")]
    Protocol(#[from] acs_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct TcpClient {
    server_addr: SocketAddr,

    /// Framed stream, `None` while disconnected
    framed: Option<Framed<TcpStream, AcsCodec>>,

    timeout: Duration,
}

impl TcpClient {
    pub fn new(config: TcpClientConfig) -> Self {
        debug!(server = %config.server_addr, "creating TCP client");

        Self {
            server_addr: config.server_addr,
            framed: None,
            timeout: config.timeout,
        }
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Point the client at another backend. Takes effect on the next connect.
    pub fn set_server_addr(&mut self, server_addr: SocketAddr) {
        self.server_addr = server_addr;
    }

    /// Open the connection, replacing any existing one.
    ///
    /// # Errors
    /// `ConnectionTimeout` if the connect does not finish in time, `Io` if it
    /// is refused or unreachable.
    pub async fn connect(&mut self) -> Result<(), TcpClientError> {
        self.framed = None;
        info!(server = %self.server_addr, "connecting");

        let stream =
            match tokio::time::timeout(self.timeout, TcpStream::connect(self.server_addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    debug!(error = %e, "connection failed");
                    return Err(e.into());
                }
                Err(_) => {
                    warn!("Connection timeout after {}ms", self.timeout.as_millis());
                    return Err(TcpClientError::ConnectionTimeout(
                        self.timeout.as_millis() as u64
                    ));
                }
            };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        self.framed = Some(Framed::new(stream, AcsCodec::new()));
        info!(server = %self.server_addr, "connected");
        Ok(())
    }

    /// Send one record.
    ///
    /// Any failure drops the connection; the caller sees it as a session drop.
    pub async fn send(&mut self, record: Outbound) -> Result<(), TcpClientError> {
        let framed = self.framed.as_mut().ok_or(TcpClientError::NotConnected)?;
        trace!(seq = record.seq, kind = record.body.kind(), "sending record");

        let sent = tokio::time::timeout(self.timeout, framed.send(record)).await;
        let result = match sent {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Failed to send record: {}", e);
                Err(TcpClientError::Protocol(e))
            }
            Err(_) => {
                warn!("Send timeout after {}ms", self.timeout.as_millis());
                Err(TcpClientError::WriteTimeout(self.timeout.as_millis() as u64))
            }
        };

        if result.is_err() {
            self.framed = None;
        }
        result
    }

    /// Wait for the next inbound line.
    ///
    /// Malformed lines are returned as [`Inbound::Malformed`], not as
    /// errors. End of stream and framing errors drop the connection.
    pub async fn recv(&mut self) -> Result<Inbound, TcpClientError> {
        let framed = self.framed.as_mut().ok_or(TcpClientError::NotConnected)?;

        let next = framed.next().await;
        match next {
            Some(Ok(inbound)) => {
                trace!(?inbound, "received line");
                Ok(inbound)
            }
            Some(Err(e)) => {
                error!("Failed to decode inbound line: {}", e);
                self.framed = None;
                Err(TcpClientError::Protocol(e))
            }
            None => {
                warn!("Connection closed by server");
                self.framed = None;
                Err(TcpClientError::ConnectionLost(
                    "Server closed connection".to_string(),
                ))
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Flush and shut down the connection. Idempotent.
    pub async fn close(&mut self) -> Result<(), TcpClientError> {
        if let Some(mut framed) = self.framed.take() {
            info!(server = %self.server_addr, "closing connection");

            let flush_timeout = Duration::from_millis(500);
            match tokio::time::timeout(flush_timeout, framed.flush()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Error flushing during close: {}", e),
                Err(_) => warn!(
                    "Flush timeout during close ({}ms)",
                    flush_timeout.as_millis()
                ),
            }

            let mut stream = framed.into_inner();
            let shutdown_timeout = Duration::from_millis(500);
            match tokio::time::timeout(shutdown_timeout, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Error during shutdown: {}", e),
                Err(_) => warn!(
                    "Shutdown timeout during close ({}ms)",
                    shutdown_timeout.as_millis()
                ),
            }

            debug!("connection closed");
        }

        Ok(())
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        if self.framed.is_some() {
            debug!("TcpClient dropped while connected - connection will be closed");
        }
    }
}
