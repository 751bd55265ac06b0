//! Raw TCP socket transport.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::config::SocketConfig;
use super::{Transport, TransportKind, within};
use crate::error::TransportError;

/// Receive chunk size.
const CHUNK_SIZE: usize = 1024;

/// Plain TCP connection with no protocol framing.
pub struct SocketTransport {
    config: SocketConfig,
    stream: Option<TcpStream>,
}

impl SocketTransport {
    /// Connect to the configured host.
    pub async fn connect(config: SocketConfig) -> Result<Self, TransportError> {
        let stream = connect_tcp(&config.host, config.port, config.timeout).await?;
        debug!("Socket connected to {}:{}", config.host, config.port);
        Ok(Self {
            config,
            stream: Some(stream),
        })
    }
}

/// Open a TCP stream with NODELAY, bounded by `timeout` (zero waits forever).
pub(super) async fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, TransportError> {
    let stream = within(timeout, TcpStream::connect((host, port)))
        .await?
        .map_err(|source| TransportError::ConnectionFailed {
        host: host.to_string(),
        port,
        source,
    })?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[async_trait]
impl Transport for SocketTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Disconnected)?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Bytes>, TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; CHUNK_SIZE];
        match stream.read(&mut buf).await? {
            0 => {
                self.stream = None;
                Ok(None)
            }
            n => {
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
        }
    }

    fn set_timeout(&mut self, _timeout: Duration) -> bool {
        self.stream.is_some()
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                stream.shutdown().await.ok();
                true
            }
            None => false,
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn peer(&self) -> String {
        format!("tcp://{}:{}", self.config.host, self.config.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, SocketConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, SocketConfig::new("127.0.0.1", port))
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (listener, config) = listener().await;
        let server = tokio::spawn(async move {
            let (mut peer, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = peer.read(&mut buf).await.unwrap();
            peer.write_all(&buf[..n]).await.unwrap();
        });

        let mut transport = SocketTransport::connect(config).await.unwrap();
        transport.send(b"ping").await.unwrap();
        let data = transport.receive().await.unwrap().unwrap();
        assert_eq!(&data[..], b"ping");

        server.await.unwrap();
        assert!(transport.receive().await.unwrap().is_none());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (listener, config) = listener().await;
        let _server = tokio::spawn(async move { listener.accept().await });

        let mut transport = SocketTransport::connect(config).await.unwrap();
        assert!(transport.close().await);
        assert!(!transport.close().await);
        assert!(transport.send(b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let (listener, config) = listener().await;
        drop(listener);
        let result = SocketTransport::connect(config).await;
        assert!(matches!(
            result,
            Err(TransportError::ConnectionFailed { .. })
        ));
    }
}
