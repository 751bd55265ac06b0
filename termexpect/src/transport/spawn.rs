//! Local child process attached to a pseudo-terminal.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, trace, warn};
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::sync::mpsc;

use super::config::SpawnConfig;
use super::{Transport, TransportKind};
use crate::error::TransportError;

/// Grace period between SIGTERM and kill.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

const CHUNK_SIZE: usize = 4096;

/// Writes queued ahead of the writer thread.
const INPUT_QUEUE: usize = 16;

/// Shared handle to the child, so teardown can run off the async runtime.
#[derive(Clone)]
struct ChildHandle(Arc<Mutex<Box<dyn Child + Send + Sync>>>);

impl ChildHandle {
    fn process_id(&self) -> Option<u32> {
        self.0.lock().ok().and_then(|child| child.process_id())
    }

    fn running(&self) -> bool {
        match self.0.lock() {
            Ok(mut child) => matches!(child.try_wait(), Ok(None)),
            Err(_) => false,
        }
    }

    fn kill(&self) {
        if let Ok(mut child) = self.0.lock() {
            if let Err(e) = child.kill() {
                debug!("Kill failed: {}", e);
            }
            let _ = child.wait();
        }
    }

    fn reap(&self) {
        if let Ok(mut child) = self.0.lock() {
            let _ = child.try_wait();
        }
    }

    /// Ask the child to exit. Returns false if it has already exited.
    fn terminate(&self) -> bool {
        if !self.running() {
            return false;
        }

        #[cfg(unix)]
        if let Some(pid) = self.process_id() {
            // SAFETY: plain signal delivery to our own child
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            return true;
        }

        self.kill();
        true
    }
}

/// Child process transport.
///
/// Two threads own the blocking pty ends: one pumps master output into a
/// channel, the other drains a channel of input into the master. `send` and
/// `receive` are plain channel operations and never block the runtime.
pub struct SpawnTransport {
    config: SpawnConfig,
    /// Keeps the pty open for the life of the transport.
    _master: Box<dyn MasterPty + Send>,
    input: Option<mpsc::Sender<Bytes>>,
    child: ChildHandle,
    output: mpsc::Receiver<Bytes>,
    eof: bool,
    closed: bool,
}

impl SpawnTransport {
    /// Open a pty pair and start the configured program on it.
    pub fn spawn(config: SpawnConfig) -> Result<Self, TransportError> {
        let spawn_error = |message: String| TransportError::Spawn {
            program: config.program.clone(),
            message,
        };

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TransportError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&config.program);
        cmd.args(&config.args);
        if let Some(cwd) = &config.cwd {
            cmd.cwd(cwd);
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| spawn_error(e.to_string()))?;
        // Only the child may hold the slave, or the master never sees EOF
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TransportError::Pty(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TransportError::Pty(e.to_string()))?;

        let (output_tx, output_rx) = mpsc::channel(64);
        std::thread::Builder::new()
            .name(format!("pty-read-{}", config.program))
            .spawn(move || pump(reader, output_tx))
            .map_err(|e| spawn_error(e.to_string()))?;

        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE);
        std::thread::Builder::new()
            .name(format!("pty-write-{}", config.program))
            .spawn(move || feed(writer, input_rx))
            .map_err(|e| spawn_error(e.to_string()))?;

        debug!(
            "Spawned '{}' (pid {:?})",
            config.command_line(),
            child.process_id()
        );

        Ok(Self {
            config,
            _master: pair.master,
            input: Some(input_tx),
            child: ChildHandle(Arc::new(Mutex::new(child))),
            output: output_rx,
            eof: false,
            closed: false,
        })
    }

    /// Process id of the child, if still known.
    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }
}

/// Reader thread body: forward master output until EOF or error.
fn pump(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<Bytes>) {
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            // EIO once the child side is gone counts as EOF
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                    break;
                }
            }
        }
    }
    trace!("pty reader finished");
}

/// Writer thread body: drain queued input into the master.
fn feed(mut writer: Box<dyn Write + Send>, mut rx: mpsc::Receiver<Bytes>) {
    while let Some(data) = rx.blocking_recv() {
        if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
            debug!("pty write failed: {}", e);
            break;
        }
    }
    trace!("pty writer finished");
}

/// Blocking terminate, wait, kill.
fn shut_down(child: &ChildHandle, program: &str) {
    if child.terminate() {
        std::thread::sleep(TERMINATE_GRACE);
        if child.running() {
            warn!("'{}' ignored SIGTERM, killing", program);
            child.kill();
        } else {
            child.reap();
        }
    }
}

#[async_trait]
impl Transport for SpawnTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let input = match (&self.input, self.closed) {
            (Some(input), false) => input,
            _ => return Err(TransportError::Disconnected),
        };
        // Waits here, not in a blocking write, when the child stops reading
        input
            .send(Bytes::copy_from_slice(data))
            .await
            .map_err(|_| TransportError::Disconnected)
    }

    async fn receive(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.closed || self.eof {
            return Ok(None);
        }
        match self.output.recv().await {
            Some(data) => Ok(Some(data)),
            None => {
                self.eof = true;
                Ok(None)
            }
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> bool {
        self.config.timeout = timeout;
        !self.closed
    }

    fn is_connected(&self) -> bool {
        // Output still queued after exit is readable until EOF
        !self.closed && !self.eof && (self.child.running() || !self.output.is_empty())
    }

    async fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.input = None;

        let child = self.child.clone();
        let program = self.config.command_line();
        if let Err(e) = tokio::task::spawn_blocking(move || shut_down(&child, &program)).await {
            warn!("Shutting down '{}' failed: {}", self.config.command_line(), e);
        }
        self.output.close();
        true
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Spawn
    }

    fn peer(&self) -> String {
        format!("spawn:{}", self.config.command_line())
    }
}

impl Drop for SpawnTransport {
    fn drop(&mut self) {
        if self.closed || !self.child.running() {
            return;
        }
        let child = self.child.clone();
        let program = self.config.command_line();
        // Drop may run on a runtime worker; never sleep on it
        let spawned = std::thread::Builder::new()
            .name("pty-reaper".to_string())
            .spawn(move || shut_down(&child, &program));
        if spawned.is_err() {
            self.child.kill();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    async fn read_until(transport: &mut SpawnTransport, needle: &str) -> String {
        let mut seen = String::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !seen.contains(needle) {
            let chunk = tokio::time::timeout_at(deadline, transport.receive())
                .await
                .expect("timed out waiting for output")
                .unwrap();
            match chunk {
                Some(data) => seen.push_str(&String::from_utf8_lossy(&data)),
                None => break,
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_shell_round_trip() {
        let config = SpawnConfig::with_args("/bin/sh", vec![]).env("PS1", "sh$ ");
        let mut transport = SpawnTransport::spawn(config).unwrap();
        assert!(transport.is_connected());
        assert!(transport.process_id().is_some());

        transport.send(b"echo hel''lo\n").await.unwrap();
        let seen = read_until(&mut transport, "hello").await;
        assert!(seen.contains("hello"));

        assert!(transport.close().await);
        assert!(!transport.close().await);
        assert!(!transport.is_connected());
        assert!(transport.send(b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_exit_reaches_eof() {
        let mut transport = SpawnTransport::spawn(SpawnConfig::new("/bin/echo done")).unwrap();
        let seen = read_until(&mut transport, "never-printed").await;
        assert!(seen.contains("done"));
        assert!(transport.receive().await.unwrap().is_none());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_send_does_not_block_when_child_stops_reading() {
        let mut transport = SpawnTransport::spawn(SpawnConfig::new("/bin/sleep 100")).unwrap();
        let line = vec![b'x'; 64 * 1024];

        // A blocking write would starve this single-threaded runtime and the
        // timeout could never fire
        let _ = tokio::time::timeout(Duration::from_secs(1), async {
            while transport.send(&line).await.is_ok() {}
        })
        .await;

        let started = std::time::Instant::now();
        assert!(transport.close().await);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(transport.send(b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_drop_does_not_stall_runtime() {
        let transport = SpawnTransport::spawn(SpawnConfig::new("/bin/sleep 100")).unwrap();
        let pid = transport.process_id().unwrap();

        let started = std::time::Instant::now();
        drop(transport);
        assert!(started.elapsed() < TERMINATE_GRACE);

        // The reaper thread finishes the child off in the background
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        // SAFETY: signal 0 only checks that the pid exists
        while unsafe { libc::kill(pid as libc::pid_t, 0) } == 0 {
            assert!(std::time::Instant::now() < deadline, "child {} still alive", pid);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[test]
    fn test_missing_program() {
        let result = SpawnTransport::spawn(SpawnConfig::new("/nonexistent/termexpect-binary"));
        assert!(matches!(
            result,
            Err(TransportError::Spawn { .. }) | Err(TransportError::Pty(_))
        ));
    }
}
