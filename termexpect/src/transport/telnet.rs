//! Telnet transport (RFC 854) with option negotiation and login handshake.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::{debug, info, trace};
use memchr::memchr;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use secrecy::ExposeSecret;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::config::TelnetConfig;
use super::socket::connect_tcp;
use super::{ExpectStrategy, NativeMatch, NativeOutcome, Transport, TransportKind};
use crate::error::TransportError;

// Telnet protocol constants
const IAC: u8 = 255; // Interpret As Command
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250; // Subnegotiation Begin
const SE: u8 = 240; // Subnegotiation End

const OPT_ECHO: u8 = 1;
const OPT_SUPPRESS_GO_AHEAD: u8 = 3;

const CHUNK_SIZE: usize = 4096;

static LOGIN_CUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)login: ?").expect("valid regex"));
static PASSWORD_CUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)password: ?").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Iac,
    Option(u8),
    Sub,
    SubIac,
}

/// Incremental Telnet decoder.
///
/// Strips commands from the byte stream and produces negotiation replies.
/// Sequences split across reads are carried over in `state`.
#[derive(Debug)]
struct TelnetCodec {
    state: State,
    /// Options we perform.
    local: [bool; 256],
    /// Options the server performs.
    remote: [bool; 256],
}

impl TelnetCodec {
    fn new() -> Self {
        Self {
            state: State::Data,
            local: [false; 256],
            remote: [false; 256],
        }
    }

    /// Offers sent right after connecting.
    fn initial_offers(&mut self) -> Vec<u8> {
        self.local[OPT_SUPPRESS_GO_AHEAD as usize] = true;
        vec![IAC, WILL, OPT_SUPPRESS_GO_AHEAD]
    }

    fn decode(&mut self, input: &[u8], out: &mut BytesMut, replies: &mut Vec<u8>) {
        let mut rest = input;
        while !rest.is_empty() {
            match self.state {
                State::Data => {
                    let end = memchr(IAC, rest).unwrap_or(rest.len());
                    out.extend(rest[..end].iter().filter(|&&b| b != 0));
                    if end < rest.len() {
                        self.state = State::Iac;
                        rest = &rest[end + 1..];
                    } else {
                        rest = &[];
                    }
                    continue;
                }
                State::Iac => {
                    self.state = match rest[0] {
                        IAC => {
                            out.extend_from_slice(&[IAC]);
                            State::Data
                        }
                        cmd @ (DO | DONT | WILL | WONT) => State::Option(cmd),
                        SB => State::Sub,
                        _ => State::Data,
                    };
                }
                State::Option(cmd) => {
                    self.negotiate(cmd, rest[0], replies);
                    self.state = State::Data;
                }
                State::Sub => {
                    if rest[0] == IAC {
                        self.state = State::SubIac;
                    }
                }
                State::SubIac => {
                    self.state = if rest[0] == SE { State::Data } else { State::Sub };
                }
            }
            rest = &rest[1..];
        }
    }

    fn negotiate(&mut self, cmd: u8, option: u8, replies: &mut Vec<u8>) {
        let idx = option as usize;
        let reply = match cmd {
            WILL => match option {
                OPT_ECHO | OPT_SUPPRESS_GO_AHEAD if !self.remote[idx] => {
                    self.remote[idx] = true;
                    Some(DO)
                }
                OPT_ECHO | OPT_SUPPRESS_GO_AHEAD => None,
                _ => Some(DONT),
            },
            WONT if self.remote[idx] => {
                self.remote[idx] = false;
                Some(DONT)
            }
            DO => match option {
                OPT_SUPPRESS_GO_AHEAD if !self.local[idx] => {
                    self.local[idx] = true;
                    Some(WILL)
                }
                OPT_SUPPRESS_GO_AHEAD => None,
                _ => Some(WONT),
            },
            DONT if self.local[idx] => {
                self.local[idx] = false;
                Some(WONT)
            }
            _ => None,
        };

        trace!("Telnet option {} {} -> {:?}", cmd, option, reply);
        if let Some(reply) = reply {
            replies.extend_from_slice(&[IAC, reply, option]);
        }
    }
}

/// Double every IAC byte in outgoing data.
fn escape(data: &[u8]) -> Cow<'_, [u8]> {
    if memchr(IAC, data).is_none() {
        return Cow::Borrowed(data);
    }
    let mut escaped = Vec::with_capacity(data.len() + 8);
    for &byte in data {
        escaped.push(byte);
        if byte == IAC {
            escaped.push(IAC);
        }
    }
    Cow::Owned(escaped)
}

/// Telnet transport.
pub struct TelnetTransport {
    config: TelnetConfig,
    stream: Option<TcpStream>,
    codec: TelnetCodec,
    /// Decoded bytes not yet handed out.
    pending: BytesMut,
    /// Negotiation replies not yet written.
    replies: Vec<u8>,
}

impl TelnetTransport {
    /// Connect and, when a username is configured, log in.
    pub async fn connect(config: TelnetConfig) -> Result<Self, TransportError> {
        let stream = connect_tcp(&config.host, config.port, config.timeout).await?;
        debug!("Telnet connected to {}:{}", config.host, config.port);

        let mut codec = TelnetCodec::new();
        let replies = codec.initial_offers();
        let mut transport = Self {
            config,
            stream: Some(stream),
            codec,
            pending: BytesMut::new(),
            replies,
        };

        if transport.config.username.is_some() {
            transport.login().await?;
        }

        Ok(transport)
    }

    async fn login(&mut self) -> Result<(), TransportError> {
        let timeout = Some(self.config.timeout);
        let username = self.config.username.clone().unwrap_or_default();

        self.wait_for_cue(&LOGIN_CUE, "login:", timeout).await?;
        self.send(format!("{}\n", username).as_bytes()).await?;

        if let Some(password) = self.config.password.clone() {
            self.wait_for_cue(&PASSWORD_CUE, "Password:", timeout).await?;
            let mut line = password.expose_secret().as_bytes().to_vec();
            line.push(b'\n');
            self.send(&line).await?;
        }

        info!("Telnet login sent for user '{}'", username);
        Ok(())
    }

    async fn wait_for_cue(
        &mut self,
        cue: &Regex,
        name: &'static str,
        timeout: Option<Duration>,
    ) -> Result<(), TransportError> {
        let found = self.expect_any(std::slice::from_ref(cue), timeout).await?;
        match found.outcome {
            NativeOutcome::Matched(_) => Ok(()),
            _ => Err(TransportError::LoginFailed { cue: name }),
        }
    }

    /// Write queued negotiation replies without waiting for the socket.
    fn flush_replies(&mut self) -> Result<(), TransportError> {
        let Some(stream) = self.stream.as_ref() else {
            return Ok(());
        };
        while !self.replies.is_empty() {
            match stream.try_write(&self.replies) {
                Ok(n) => {
                    self.replies.drain(..n);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Read one raw chunk into `pending`. Returns false at end of stream.
    async fn fill(&mut self) -> Result<bool, TransportError> {
        self.flush_replies()?;
        let Some(stream) = self.stream.as_mut() else {
            return Ok(false);
        };

        let mut buf = [0u8; CHUNK_SIZE];
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            self.stream = None;
            return Ok(false);
        }

        self.codec
            .decode(&buf[..n], &mut self.pending, &mut self.replies);
        self.flush_replies()?;
        Ok(true)
    }
}

#[async_trait]
impl Transport for TelnetTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Disconnected)?;
        if !self.replies.is_empty() {
            stream.write_all(&self.replies).await?;
            self.replies.clear();
        }
        stream.write_all(&escape(data)).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Bytes>, TransportError> {
        while self.pending.is_empty() {
            if !self.fill().await? {
                return Ok(None);
            }
        }
        Ok(Some(self.pending.split().freeze()))
    }

    fn set_timeout(&mut self, timeout: Duration) -> bool {
        self.config.timeout = timeout;
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
        TransportKind::Telnet
    }

    fn peer(&self) -> String {
        format!("telnet://{}:{}", self.config.host, self.config.port)
    }

    fn expect_strategy(&self) -> ExpectStrategy {
        ExpectStrategy::Native
    }

    async fn expect_any(
        &mut self,
        patterns: &[Regex],
        timeout: Option<Duration>,
    ) -> Result<NativeMatch, TransportError> {
        let deadline = timeout
            .filter(|t| !t.is_zero())
            .map(|t| Instant::now() + t);

        loop {
            for (index, pattern) in patterns.iter().enumerate() {
                if let Some(m) = pattern.find(&self.pending) {
                    return Ok(NativeMatch {
                        outcome: NativeOutcome::Matched(index),
                        data: self.pending.split_to(m.end()).freeze(),
                    });
                }
            }

            let more = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, self.fill()).await {
                    Ok(result) => result?,
                    Err(_) => {
                        return Ok(NativeMatch {
                            outcome: NativeOutcome::TimedOut,
                            data: self.pending.split().freeze(),
                        });
                    }
                },
                None => self.fill().await?,
            };

            if !more {
                return Ok(NativeMatch {
                    outcome: NativeOutcome::Closed,
                    data: self.pending.split().freeze(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn decode(codec: &mut TelnetCodec, input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut out = BytesMut::new();
        let mut replies = Vec::new();
        codec.decode(input, &mut out, &mut replies);
        (out.to_vec(), replies)
    }

    #[test]
    fn test_negotiation_replies() {
        let mut codec = TelnetCodec::new();
        let (data, replies) = decode(
            &mut codec,
            &[IAC, WILL, OPT_ECHO, b'h', IAC, DO, 24, b'i', IAC, WILL, 31],
        );
        assert_eq!(data, b"hi");
        assert_eq!(
            replies,
            [IAC, DO, OPT_ECHO, IAC, WONT, 24, IAC, DONT, 31]
        );

        // Already agreed: no reply loop
        let (_, replies) = decode(&mut codec, &[IAC, WILL, OPT_ECHO]);
        assert!(replies.is_empty());
    }

    #[test]
    fn test_offered_sga_not_reacknowledged() {
        let mut codec = TelnetCodec::new();
        assert_eq!(codec.initial_offers(), [IAC, WILL, OPT_SUPPRESS_GO_AHEAD]);
        let (_, replies) = decode(&mut codec, &[IAC, DO, OPT_SUPPRESS_GO_AHEAD]);
        assert!(replies.is_empty());
    }

    #[test]
    fn test_split_sequences_and_escapes() {
        let mut codec = TelnetCodec::new();
        let (data, _) = decode(&mut codec, &[b'a', IAC]);
        assert_eq!(data, b"a");
        let (data, replies) = decode(&mut codec, &[WILL]);
        assert!(data.is_empty() && replies.is_empty());
        let (data, replies) = decode(&mut codec, &[OPT_SUPPRESS_GO_AHEAD, IAC, IAC, b'b']);
        assert_eq!(data, [IAC, b'b']);
        assert_eq!(replies, [IAC, DO, OPT_SUPPRESS_GO_AHEAD]);

        let (data, _) = decode(&mut codec, &[IAC, SB, 24, 1, IAC, SE, b'c', 0]);
        assert_eq!(data, b"c");
    }

    #[test]
    fn test_escape_outgoing() {
        assert!(matches!(escape(b"plain"), Cow::Borrowed(_)));
        assert_eq!(&*escape(&[1, IAC, 2]), &[1, IAC, IAC, 2]);
    }

    #[tokio::test]
    async fn test_login_handshake_and_native_expect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut peer, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let mut seen = Vec::new();

            peer.write_all(&[IAC, WILL, OPT_ECHO]).await.unwrap();
            peer.write_all(b"Welcome\r\nLogin: ").await.unwrap();
            while !String::from_utf8_lossy(&seen).contains("admin\n") {
                let n = peer.read(&mut buf).await.unwrap();
                seen.extend_from_slice(&buf[..n]);
            }
            peer.write_all(b"Password: ").await.unwrap();
            while !String::from_utf8_lossy(&seen).contains("secret\n") {
                let n = peer.read(&mut buf).await.unwrap();
                seen.extend_from_slice(&buf[..n]);
            }
            peer.write_all(b"\r\nrouter> ").await.unwrap();
            seen
        });

        let config = TelnetConfig::new("127.0.0.1")
            .port(port)
            .login("admin", Some("secret".into()))
            .timeout(Duration::from_secs(5));
        let mut transport = TelnetTransport::connect(config).await.unwrap();

        let prompt = Regex::new(r"router> \z").unwrap();
        let found = transport
            .expect_any(&[prompt], Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(found.outcome, NativeOutcome::Matched(0));
        assert_eq!(&found.data[..], b"\r\nrouter> ");

        let seen = server.await.unwrap();
        assert!(seen.windows(3).any(|w| w == [IAC, DO, OPT_ECHO]));
        assert!(seen.windows(3).any(|w| w == [IAC, WILL, OPT_SUPPRESS_GO_AHEAD]));

        let closed = transport
            .expect_any(&[Regex::new("never").unwrap()], None)
            .await
            .unwrap();
        assert_eq!(closed.outcome, NativeOutcome::Closed);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_native_expect_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (mut peer, _) = listener.accept().await.unwrap();
            peer.write_all(b"partial").await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TelnetTransport::connect(TelnetConfig::new("127.0.0.1").port(port))
            .await
            .unwrap();
        let started = std::time::Instant::now();
        let found = transport
            .expect_any(&[Regex::new("prompt>").unwrap()], Some(Duration::from_millis(300)))
            .await
            .unwrap();
        assert_eq!(found.outcome, NativeOutcome::TimedOut);
        assert_eq!(&found.data[..], b"partial");
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
