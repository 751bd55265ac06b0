//! Transport layer: the byte channels a session runs over.
//!
//! Every backend fulfils the same small contract ([`Transport`]) so the
//! session core never depends on a concrete connection type:
//!
//! - SSH interactive shell channels (russh)
//! - Telnet, with option negotiation
//! - Raw TCP sockets
//! - Serial ports
//! - Child processes attached to a pseudo-terminal

pub mod config;
mod serial;
mod socket;
mod spawn;
mod ssh;
mod telnet;

pub use config::{
    AuthMethod, DataBits, HostKeyVerification, Parity, SerialConfig, SocketConfig, SpawnConfig,
    SshConfig, StopBits, TelnetConfig,
};
pub use serial::SerialTransport;
pub use socket::SocketTransport;
pub use spawn::SpawnTransport;
pub use ssh::SshTransport;
pub use telnet::TelnetTransport;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Transport kind identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// SSH shell channel
    Ssh,
    /// Telnet connection
    Telnet,
    /// Raw TCP socket
    Socket,
    /// Serial port
    Serial,
    /// Spawned process on a pty
    Spawn,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => write!(f, "SSH"),
            Self::Telnet => write!(f, "Telnet"),
            Self::Socket => write!(f, "Socket"),
            Self::Serial => write!(f, "Serial"),
            Self::Spawn => write!(f, "Spawn"),
        }
    }
}

/// How a transport runs the expect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectStrategy {
    /// The session polls [`Transport::receive`] and matches patterns itself.
    Polling,
    /// The transport blocks in [`Transport::expect_any`] until a pattern matches.
    Native,
}

/// Outcome of a native multi-pattern wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeOutcome {
    /// Pattern at this index matched.
    Matched(usize),
    /// No pattern matched before the deadline.
    TimedOut,
    /// The peer closed the connection before any pattern matched.
    Closed,
}

/// Result of [`Transport::expect_any`].
#[derive(Debug, Clone)]
pub struct NativeMatch {
    /// What ended the wait.
    pub outcome: NativeOutcome,
    /// Bytes consumed, up to and including the match.
    pub data: Bytes,
}

/// Capability contract every backend supplies to the session core.
///
/// `receive` doubles as the readiness primitive for the interactive bridge,
/// so implementations must be cancel-safe: dropping a pending `receive` must
/// not lose bytes.
#[async_trait]
pub trait Transport: Send {
    /// Send raw bytes.
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Wait for the next chunk of received bytes.
    ///
    /// Returns `Ok(None)` at end of stream. Never returns an empty chunk.
    async fn receive(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Apply a timeout to the underlying channel. `Duration::ZERO` disables it.
    fn set_timeout(&mut self, timeout: Duration) -> bool;

    /// Check if the transport is still usable.
    fn is_connected(&self) -> bool;

    /// Close the transport. Returns false if it was already closed.
    async fn close(&mut self) -> bool;

    /// Transport kind.
    fn kind(&self) -> TransportKind;

    /// Human-readable peer description.
    fn peer(&self) -> String;

    /// Bytes already buffered by the driver, for transports that can report it.
    fn bytes_waiting(&self) -> Option<usize> {
        None
    }

    /// How the expect cycle should run over this transport.
    fn expect_strategy(&self) -> ExpectStrategy {
        ExpectStrategy::Polling
    }

    /// Block until one of `patterns` matches the incoming stream.
    ///
    /// Patterns are tried in order; the first one that matches wins.
    async fn expect_any(
        &mut self,
        _patterns: &[regex::bytes::Regex],
        _timeout: Option<Duration>,
    ) -> Result<NativeMatch, TransportError> {
        Err(TransportError::Unsupported)
    }
}

/// Run a connect step bounded by `timeout`. Zero waits forever.
pub(crate) async fn within<F: std::future::Future>(
    timeout: Duration,
    step: F,
) -> Result<F::Output, TransportError> {
    if timeout.is_zero() {
        Ok(step.await)
    } else {
        tokio::time::timeout(timeout, step)
            .await
            .map_err(|_| TransportError::Timeout(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_timeout_waits() {
        let value = within(Duration::ZERO, async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            7
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_expired_timeout() {
        let result = within(Duration::from_millis(20), std::future::pending::<()>()).await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }
}
