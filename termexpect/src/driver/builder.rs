//! Builder for opening sessions over any transport.

use std::time::Duration;

use log::error;

use super::more::MoreSpec;
use super::options::SessionOptions;
use super::session::Session;
use crate::channel::Charset;
use crate::error::TransportError;
use crate::transport::{
    SerialConfig, SerialTransport, SocketConfig, SocketTransport, SpawnConfig, SpawnTransport,
    SshConfig, SshTransport, TelnetConfig, TelnetTransport, Transport,
};

/// Builder for constructing sessions.
///
/// Connect failures do not surface as errors: the returned session is not
/// connected and reports `CONNECTION_ERROR` from
/// [`exit_code`](Session::exit_code), with the cause in
/// [`last_error`](Session::last_error).
///
/// # Example
///
/// ```rust,no_run
/// use termexpect::driver::SessionBuilder;
/// use termexpect::transport::SshConfig;
///
/// # async fn example() {
/// let mut session = SessionBuilder::new()
///     .prompt("cisco")
///     .more(["more", "yesno"])
///     .ssh(SshConfig::new("192.168.1.1", "admin").password("secret"))
///     .await;
///
/// if let Some(output) = session.execute("show version").await {
///     session.show(&output);
/// }
/// session.close().await;
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SessionBuilder {
    prompt: Option<String>,
    more: Vec<MoreSpec>,
    timeout: Option<Duration>,
    options: SessionOptions,
}

impl SessionBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prompt (library key or literal regex).
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Add continuation rules.
    pub fn more(mut self, spec: impl Into<MoreSpec>) -> Self {
        self.more.push(spec.into());
        self
    }

    /// Set the expect timeout, overriding the backend's default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replace all session options.
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the charset.
    pub fn charset(mut self, charset: Charset) -> Self {
        self.options.charset = charset;
        self
    }

    /// Set the line ending appended to commands.
    pub fn line_ending(mut self, line_ending: impl Into<String>) -> Self {
        self.options.line_ending = line_ending.into();
        self
    }

    /// Set the pause between polls.
    pub fn poll_delay(mut self, delay: Duration) -> Self {
        self.options.poll_delay = delay;
        self
    }

    /// Set the sentinel that leaves interactive mode.
    pub fn leave_interactive(mut self, sentinel: impl Into<String>) -> Self {
        self.options.leave_interactive = sentinel.into();
        self
    }

    /// Open an SSH shell session.
    pub async fn ssh(self, config: SshConfig) -> Session {
        let timeout = config.timeout;
        let transport = SshTransport::connect(config).await.map(boxed);
        self.finish(transport, timeout)
    }

    /// Open a Telnet session, logging in when credentials are configured.
    pub async fn telnet(self, config: TelnetConfig) -> Session {
        let timeout = config.timeout;
        let transport = TelnetTransport::connect(config).await.map(boxed);
        self.finish(transport, timeout)
    }

    /// Open a raw TCP session.
    pub async fn socket(self, config: SocketConfig) -> Session {
        let timeout = config.timeout;
        let transport = SocketTransport::connect(config).await.map(boxed);
        self.finish(transport, timeout)
    }

    /// Open a serial port session.
    pub fn serial(self, config: SerialConfig) -> Session {
        let timeout = config.timeout;
        let transport = SerialTransport::open(config).map(boxed);
        self.finish(transport, timeout)
    }

    /// Spawn a local program on a pseudo-terminal.
    pub fn spawn(self, config: SpawnConfig) -> Session {
        let timeout = config.timeout;
        let transport = SpawnTransport::spawn(config).map(boxed);
        self.finish(transport, timeout)
    }

    /// Wrap an already connected transport.
    pub fn transport(self, transport: Box<dyn Transport>) -> Session {
        let timeout = super::options::DEFAULT_TIMEOUT;
        self.finish(Ok(transport), timeout)
    }

    fn finish(
        self,
        transport: Result<Box<dyn Transport>, TransportError>,
        default_timeout: Duration,
    ) -> Session {
        let (mut session, failure) = match transport {
            Ok(transport) => (Session::new(transport), None),
            Err(e) => {
                error!("Connection failed: {}", e);
                (Session::detached(), Some(e))
            }
        };

        session.set_options(self.options);
        session.set_timeout(self.timeout.unwrap_or(default_timeout));
        if let Some(prompt) = self.prompt {
            session.set_prompt(&prompt);
        }
        for spec in self.more {
            // Rejections are recorded on the session
            let _ = session.add_more(spec);
        }

        // The connect failure outranks any rejected prompt or rule
        if let Some(e) = failure {
            session.record_connect_failure(e.into());
        }
        session
    }
}

fn boxed<T: Transport + 'static>(transport: T) -> Box<dyn Transport> {
    Box::new(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ExitCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_until(peer: &mut TcpStream, seen: &mut Vec<u8>, needle: &[u8]) {
        let mut buf = [0u8; 256];
        while !seen.windows(needle.len()).any(|w| w == needle) {
            let n = peer.read(&mut buf).await.unwrap();
            assert!(n > 0, "client hung up");
            seen.extend_from_slice(&buf[..n]);
        }
    }

    #[tokio::test]
    async fn test_socket_msc_exit_scenario() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut peer, _) = listener.accept().await.unwrap();
            peer.write_all(b"MSC ready\nmsc> ").await.unwrap();
            let mut seen = Vec::new();
            read_until(&mut peer, &mut seen, b"exit;\n").await;
            peer.write_all(b"exit;\nbye\nmsc> ").await.unwrap();
        });

        let mut session = SessionBuilder::new()
            .prompt("msc")
            .timeout(Duration::from_secs(5))
            .socket(SocketConfig::new("127.0.0.1", port))
            .await;
        assert!(session.is_connected());

        let output = session.execute("exit;").await.unwrap();
        assert_eq!(output.as_single(), Some("bye\n"));
        assert_eq!(session.exit_code(), ExitCode::OK);
        assert_eq!(session.welcome(), Some("MSC ready\n"));

        server.await.unwrap();
        assert!(session.close().await);
    }

    #[tokio::test]
    async fn test_telnet_session_pages_through_more() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut peer, _) = listener.accept().await.unwrap();
            peer.write_all(&[255, 251, 1]).await.unwrap();
            peer.write_all(b"router> ").await.unwrap();
            let mut seen = Vec::new();
            read_until(&mut peer, &mut seen, b"show run\n").await;
            peer.write_all(b"line1\n --More-- ").await.unwrap();
            read_until(&mut peer, &mut seen, b" \n").await;
            peer.write_all(b"\rline2\nrouter> ").await.unwrap();
        });

        let mut session = SessionBuilder::new()
            .prompt("juniper")
            .more("more")
            .timeout(Duration::from_secs(5))
            .telnet(TelnetConfig::new("127.0.0.1").port(port))
            .await;

        let output = session.execute("show run").await.unwrap();
        let text = output.as_single().unwrap();
        assert!(text.starts_with("line1\n"));
        assert!(text.ends_with("line2\n"));
        assert_eq!(session.exit_code(), ExitCode::OK);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_telnet_timeout_sets_end_of_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (mut peer, _) = listener.accept().await.unwrap();
            peer.write_all(b"$ ").await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let mut session = SessionBuilder::new()
            .prompt("simple")
            .timeout(Duration::from_secs(1))
            .telnet(TelnetConfig::new("127.0.0.1").port(port))
            .await;

        let started = std::time::Instant::now();
        session.execute("sleep 100").await.unwrap();
        assert_eq!(session.exit_code(), ExitCode::END_OF_CONNECTION);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_connect_failure_is_recorded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut session = SessionBuilder::new()
            .socket(SocketConfig::new("127.0.0.1", port))
            .await;
        assert!(!session.is_connected());
        assert_eq!(session.exit_code(), ExitCode::CONNECTION_ERROR);
        assert!(matches!(
            session.last_error(),
            Some(crate::Error::Transport(TransportError::ConnectionFailed { .. }))
        ));
        assert!(session.execute("ls").await.is_none());
        assert!(!session.close().await);
    }

    #[tokio::test]
    async fn test_connect_failure_outranks_bad_rules() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let session = SessionBuilder::new()
            .prompt("(unclosed")
            .more(["yesno", "no-such-rule"])
            .socket(SocketConfig::new("127.0.0.1", port))
            .await;
        assert!(!session.is_connected());
        assert_eq!(session.exit_code(), ExitCode::CONNECTION_ERROR);
        assert!(matches!(
            session.last_error(),
            Some(crate::Error::Transport(TransportError::ConnectionFailed { .. }))
        ));
        assert_eq!(session.more().len(), 1);
    }

    #[tokio::test]
    async fn test_builder_records_bad_rules() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move { listener.accept().await });

        let session = SessionBuilder::new()
            .more(["yesno", "no-such-rule"])
            .socket(SocketConfig::new("127.0.0.1", port))
            .await;
        assert!(session.is_connected());
        assert_eq!(session.more().len(), 1);
        assert_eq!(session.exit_code(), ExitCode::VALUE_ERROR);
        assert_eq!(session.timeout(), Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_shell_session() {
        let config = SpawnConfig::with_args("/bin/sh", vec![])
            .env("PS1", "sh$ ")
            .env("TERM", "dumb")
            .timeout(Duration::from_secs(5));
        let mut session = SessionBuilder::new().prompt("simple").spawn(config);
        assert!(session.is_connected());

        let output = session.execute("echo hi").await.unwrap();
        assert!(output.as_single().unwrap().contains("hi"));
        assert_eq!(session.exit_code(), ExitCode::OK);

        assert!(session.close().await);
        assert!(!session.close().await);
    }
}
