//! Interactive bridge: hand a live session to the local terminal.
//!
//! Remote output is echoed to stdout as it arrives and local keystrokes are
//! forwarded one read at a time, until the user types the sentinel, local
//! input ends, or the connection closes.

use std::time::Duration;

use bytes::Bytes;
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::session::{Session, cancelled};
use crate::error::{Result, SessionError, TransportError};

/// How often a transport with a driver-side queue is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why interactive mode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractiveExit {
    /// The sentinel was typed.
    Sentinel,
    /// Local input reached end of file.
    LocalEof,
    /// The connection closed or a close was requested.
    Closed,
}

/// Raw mode for the local terminal, restored on drop.
struct RawModeGuard;

impl RawModeGuard {
    fn acquire() -> std::result::Result<Self, SessionError> {
        crossterm::terminal::enable_raw_mode().map_err(SessionError::Terminal)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

enum Wake {
    Remote(std::result::Result<Option<Bytes>, TransportError>),
    Local(std::io::Result<usize>),
    Poll,
    Closed,
}

/// Sentinel matcher over the keys typed since the last line break.
#[derive(Debug)]
struct SentinelLine {
    sentinel: String,
    line: String,
}

impl SentinelLine {
    fn new(sentinel: &str) -> Self {
        Self {
            sentinel: sentinel.to_string(),
            line: String::new(),
        }
    }

    /// Feed typed keys. Returns true once the sentinel has been typed.
    fn feed(&mut self, keys: &[u8]) -> bool {
        if self.sentinel.is_empty() {
            return false;
        }
        self.line.push_str(&String::from_utf8_lossy(keys));
        if self.line.contains(&self.sentinel) {
            return true;
        }
        if let Some(pos) = self.line.rfind(['\r', '\n']) {
            self.line.drain(..=pos);
        }
        false
    }

    /// Backspaces erasing the sentinel on the remote side.
    fn erase(&self, line_ending: &str) -> String {
        let mut erase = "\x08".repeat(self.sentinel.chars().count());
        erase.push_str(line_ending);
        erase
    }
}

impl Session {
    /// Bridge the session to the local terminal until the sentinel is typed,
    /// stdin closes, or the connection ends.
    ///
    /// The terminal is in raw mode for the duration and restored on every
    /// exit path.
    pub async fn interactive(&mut self) -> Result<InteractiveExit> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected.into());
        }

        let _raw = RawModeGuard::acquire()?;
        info!(
            "Entering interactive mode, type '{}' to leave",
            self.options().leave_interactive
        );
        let exit = self
            .bridge(tokio::io::stdin(), tokio::io::stdout())
            .await;
        info!("Leaving interactive mode: {:?}", exit);
        exit
    }

    /// The bridge loop over arbitrary local streams.
    pub(crate) async fn bridge<I, O>(&mut self, mut input: I, mut output: O) -> Result<InteractiveExit>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut sentinel = SentinelLine::new(&self.options().leave_interactive);
        let mut closed = self.close_signal();
        let mut keys = [0u8; 1024];

        loop {
            let wake = {
                let Some(transport) = self.transport_mut() else {
                    return Ok(InteractiveExit::Closed);
                };
                if !transport.is_connected() {
                    Wake::Remote(Ok(None))
                } else {
                    // Serial ports report their driver queue; poll it instead of
                    // parking in receive so local keys are never starved.
                    let waiting = transport.bytes_waiting();
                    let remote_ready = waiting.is_none_or(|n| n > 0);

                    tokio::select! {
                        biased;
                        _ = cancelled(&mut closed) => Wake::Closed,
                        read = transport.receive(), if remote_ready => Wake::Remote(read),
                        read = input.read(&mut keys) => Wake::Local(read),
                        _ = tokio::time::sleep(POLL_INTERVAL), if !remote_ready => Wake::Poll,
                    }
                }
            };

            match wake {
                Wake::Closed => {
                    info!("Close requested, leaving interactive mode");
                    self.close().await;
                    return Ok(InteractiveExit::Closed);
                }
                Wake::Poll => continue,
                Wake::Remote(read) => match read? {
                    Some(data) => {
                        let text = self.ingest(&data);
                        output
                            .write_all(text.as_bytes())
                            .await
                            .map_err(SessionError::Terminal)?;
                        output.flush().await.map_err(SessionError::Terminal)?;
                    }
                    None => {
                        debug!("Connection closed during interactive session");
                        return Ok(InteractiveExit::Closed);
                    }
                },
                Wake::Local(read) => {
                    let n = read.map_err(SessionError::Terminal)?;
                    if n == 0 {
                        return Ok(InteractiveExit::LocalEof);
                    }
                    if sentinel.feed(&keys[..n]) {
                        let erase = sentinel.erase(&self.options().line_ending);
                        self.send_raw(erase.as_bytes()).await?;
                        return Ok(InteractiveExit::Sentinel);
                    }
                    self.send_raw(&keys[..n]).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::session::tests::ScriptedTransport;

    #[test]
    fn test_sentinel_across_reads() {
        let mut line = SentinelLine::new(":END:");
        assert!(!line.feed(b"ls\r"));
        assert!(!line.feed(b":EN"));
        assert!(line.feed(b"D:"));
        assert_eq!(line.erase("\n"), "\x08\x08\x08\x08\x08\n");
    }

    #[test]
    fn test_line_break_resets_match() {
        let mut line = SentinelLine::new(":END:");
        assert!(!line.feed(b":EN\r"));
        assert!(!line.feed(b"D:"));
    }

    #[tokio::test]
    async fn test_bridge_forwards_keys_until_sentinel() {
        let transport = ScriptedTransport::new("remote$ ").on("ls\r", &["file.txt\r\nremote$ "]);
        let sent = transport.sent.clone();
        let mut session = Session::new(Box::new(transport));

        let (mut keyboard, input) = tokio::io::duplex(64);
        let (output, mut screen) = tokio::io::duplex(1024);

        let typing = tokio::spawn(async move {
            keyboard.write_all(b"ls\r").await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            keyboard.write_all(b":END:").await.unwrap();
            keyboard
        });

        let exit = session.bridge(input, output).await.unwrap();
        assert_eq!(exit, InteractiveExit::Sentinel);
        let _keyboard = typing.await.unwrap();

        let mut shown = vec![0u8; 1024];
        let n = screen.read(&mut shown).await.unwrap();
        assert!(String::from_utf8_lossy(&shown[..n]).starts_with("remote$ "));

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0], "ls\r");
        assert_eq!(sent.last().unwrap(), "\x08\x08\x08\x08\x08\n");
    }

    #[tokio::test]
    async fn test_bridge_ends_on_local_eof() {
        let mut session = Session::new(Box::new(ScriptedTransport::new("")));
        let exit = session
            .bridge(tokio::io::empty(), tokio::io::sink())
            .await
            .unwrap();
        assert_eq!(exit, InteractiveExit::LocalEof);
    }

    #[tokio::test]
    async fn test_close_handle_ends_bridge_and_closes_transport() {
        let mut session = Session::new(Box::new(ScriptedTransport::new("")));
        let handle = session.close_handle();
        let (_keyboard, input) = tokio::io::duplex(64);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.close();
        });

        let exit = session.bridge(input, tokio::io::sink()).await.unwrap();
        assert_eq!(exit, InteractiveExit::Closed);
        assert!(session.kind().is_none());
        assert!(!session.close().await);
    }

    #[tokio::test]
    async fn test_not_connected_is_an_error() {
        let mut session = Session::new(Box::new(ScriptedTransport::new("")));
        session.close().await;
        assert!(session.interactive().await.is_err());
    }
}
