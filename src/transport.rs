//! Opening byte streams to the chat server.
//!
//! The client only needs something that reads and writes bytes. The
//! [`Connector`] trait hides where those bytes come from, so tests can hand
//! the client an in-memory pipe while production uses [`TcpConnector`].

use std::time::Duration;

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, warn};

use crate::error::TransportError;

/// Opens a fresh stream on every (re)connect.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The byte stream produced.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a new stream.
    async fn connect(&self) -> Result<Self::Stream, TransportError>;
}

/// Plain TCP with keepalive.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpConnector {
    /// Connect to `host:port`, giving up after `timeout`.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
        let sock = SockRef::from(stream);
        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(120))
            .with_interval(Duration::from_secs(30));
        sock.set_tcp_keepalive(&keepalive)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<TcpStream, TransportError> {
        let target = (self.host.as_str(), self.port);
        let addrs: Vec<_> = tokio::time::timeout(self.timeout, lookup_host(target))
            .await
            .map_err(|_| TransportError::Timeout("resolving host"))?
            .map_err(|source| TransportError::Resolve {
                host: self.host.clone(),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::NoAddress(self.host.clone()));
        }

        let mut last_err = None;
        for addr in addrs {
            debug!(%addr, "connecting");
            match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    if let Err(e) = Self::enable_keepalive(&stream) {
                        warn!("failed to enable TCP keepalive: {}", e);
                    }
                    return Ok(stream);
                }
                Ok(Err(e)) => last_err = Some(TransportError::Connect(e)),
                Err(_) => last_err = Some(TransportError::Timeout("connecting")),
            }
        }
        Err(last_err.unwrap_or_else(|| TransportError::NoAddress(self.host.clone())))
    }
}
