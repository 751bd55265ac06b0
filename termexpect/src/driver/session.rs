//! Session core: the expect engine shared by every transport.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use indexmap::IndexMap;
use log::{debug, error, info, trace, warn};
use tokio::sync::watch;
use tokio::time::Instant;

use super::exit::ExitCode;
use super::more::{Action, ContinuationRule, MoreSpec};
use super::options::{DEFAULT_TIMEOUT, SessionOptions};
use super::request::{CommandOutput, CommandRequest, ExecuteOptions};
use crate::channel::{Charset, Decoder, OutputBuffer, Prompt, to_bytes_regex};
use crate::error::{Error, SessionError, TransportError, ValidationError};
use crate::transport::{ExpectStrategy, NativeOutcome, Transport, TransportKind};

/// Cloneable handle that closes a session from another task.
///
/// A pending expect cycle or interactive session stops with
/// connection-closed semantics, and the session then closes its transport.
#[derive(Debug, Clone)]
pub struct CloseHandle(Arc<watch::Sender<bool>>);

impl CloseHandle {
    /// Request the close. Returns false if it was already requested.
    pub fn close(&self) -> bool {
        !self.0.send_replace(true)
    }

    /// Check whether a close was requested.
    pub fn is_closed(&self) -> bool {
        *self.0.borrow()
    }
}

/// What woke the polling loop.
enum Wake {
    Data(Result<Option<Bytes>, TransportError>),
    TimedOut,
    Cancelled,
}

/// An automation session over one transport.
///
/// A session is driven by a single caller: `execute` takes `&mut self`, so
/// commands on one session are serialized by construction.
pub struct Session {
    transport: Option<Box<dyn Transport>>,
    options: SessionOptions,
    prompt: Prompt,
    more: Vec<ContinuationRule>,
    timeout: Duration,
    exit_code: ExitCode,
    welcome: Option<String>,
    buffer: OutputBuffer,
    decoder: Decoder,
    /// Welcome banner not yet captured.
    first: bool,
    last_command: Option<String>,
    last_error: Option<Error>,
    /// Lines queued by rule callbacks, sent once the callback returns.
    queued: Vec<String>,
    close_tx: Arc<watch::Sender<bool>>,
    close_rx: watch::Receiver<bool>,
}

impl Session {
    /// Wrap a connected transport.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        info!("Session opened on {}", transport.peer());
        let mut session = Self::detached();
        session.transport = Some(transport);
        session.apply_timeout();
        session
    }

    /// A session whose transport failed to connect.
    ///
    /// The failure is recorded, not returned: the session reports
    /// `CONNECTION_ERROR` and is never connected.
    pub fn failed(error: impl Into<Error>) -> Self {
        let mut session = Self::detached();
        session.record_connect_failure(error.into());
        session
    }

    /// A session with no transport and nothing recorded yet.
    pub(super) fn detached() -> Self {
        let (tx, rx) = watch::channel(false);
        let options = SessionOptions::default();
        Self {
            transport: None,
            decoder: options.charset.decoder(),
            options,
            prompt: Prompt::auto(),
            more: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            exit_code: ExitCode::OK,
            welcome: None,
            buffer: OutputBuffer::new(),
            first: true,
            last_command: None,
            last_error: None,
            queued: Vec::new(),
            close_tx: Arc::new(tx),
            close_rx: rx,
        }
    }

    /// Set the prompt from a library key or a literal regex.
    ///
    /// An empty value selects the `auto` prompt. An invalid regex leaves the
    /// current prompt in place and records `VALUE_ERROR`.
    pub fn set_prompt(&mut self, value: &str) -> bool {
        match Prompt::resolve(value) {
            Ok(prompt) => {
                info!("Prompt set to {}", prompt);
                self.prompt = prompt;
                true
            }
            Err(e) => self.record(ExitCode::VALUE_ERROR, e.into()),
        }
    }

    /// Restore the `auto` prompt.
    pub fn reset_prompt(&mut self) {
        self.prompt = Prompt::auto();
    }

    /// The active prompt.
    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    /// Register continuation rules: a library name, a literal rule, or a
    /// list of either.
    ///
    /// Valid entries are appended in order. If any entry is rejected the
    /// first rejection is returned and the exit code becomes `VALUE_ERROR`;
    /// valid siblings in the same list stay registered.
    pub fn add_more(&mut self, spec: impl Into<MoreSpec>) -> Result<usize, ValidationError> {
        let mut rules = Vec::new();
        let mut errors = Vec::new();
        spec.into().resolve_into(&mut rules, &mut errors);

        let added = rules.len();
        for rule in rules {
            info!(
                "Continuation rule added: {}",
                rule.name().unwrap_or(rule.pattern().as_str())
            );
            self.more.push(rule);
        }

        match errors.into_iter().next() {
            Some(first) => {
                self.record(ExitCode::VALUE_ERROR, first.clone().into());
                Err(first)
            }
            None => Ok(added),
        }
    }

    /// Remove every continuation rule.
    pub fn clear_more(&mut self) {
        self.more.clear();
    }

    /// The active continuation rules, in match order.
    pub fn more(&self) -> &[ContinuationRule] {
        &self.more
    }

    /// Set the expect timeout. `Duration::ZERO` waits indefinitely.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        self.apply_timeout();
    }

    /// Set the expect timeout in seconds.
    ///
    /// Negative or non-finite values are rejected with a warning and the
    /// previous timeout is kept.
    pub fn set_timeout_secs(&mut self, secs: f64) -> bool {
        match Duration::try_from_secs_f64(secs) {
            Ok(timeout) => {
                self.set_timeout(timeout);
                true
            }
            Err(_) => {
                warn!(
                    "Rejected timeout {}, keeping {:?}",
                    secs, self.timeout
                );
                false
            }
        }
    }

    /// Restore the default timeout.
    pub fn reset_timeout(&mut self) {
        self.set_timeout(DEFAULT_TIMEOUT);
    }

    /// The expect timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Session options.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Replace the session options.
    pub fn set_options(&mut self, options: SessionOptions) {
        self.decoder = options.charset.decoder();
        self.options = options;
    }

    /// Change the charset.
    pub fn set_charset(&mut self, charset: Charset) {
        self.options.charset = charset;
        self.decoder = charset.decoder();
    }

    /// Change the line ending appended to commands.
    pub fn set_line_ending(&mut self, line_ending: impl Into<String>) {
        self.options.line_ending = line_ending.into();
    }

    fn apply_timeout(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            transport.set_timeout(self.timeout);
        }
    }

    /// Check whether the transport is usable and no close was requested.
    pub fn is_connected(&self) -> bool {
        !*self.close_rx.borrow()
            && self
                .transport
                .as_ref()
                .is_some_and(|transport| transport.is_connected())
    }

    /// Backend kind, if a transport is attached.
    pub fn kind(&self) -> Option<TransportKind> {
        self.transport.as_ref().map(|transport| transport.kind())
    }

    /// Exit code of the last operation.
    pub fn exit_code(&self) -> ExitCode {
        self.exit_code
    }

    /// Override the exit code (for rule callbacks).
    pub fn set_exit_code(&mut self, code: impl Into<ExitCode>) {
        self.exit_code = code.into();
    }

    /// Output received before the first command.
    pub fn welcome(&self) -> Option<&str> {
        self.welcome.as_deref()
    }

    /// Text accumulated by the current or last expect cycle.
    pub fn buffer(&self) -> &str {
        self.buffer.as_str()
    }

    /// Last command sent.
    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    /// Last recorded error.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Set the exit code and log `detail` when it is not `OK`.
    ///
    /// Returns true only for `OK`, so call sites can short-circuit on it.
    pub fn error(&mut self, code: ExitCode, detail: &str) -> bool {
        self.exit_code = code;
        if code.is_ok() {
            return true;
        }
        error!("{} ({}): {}", code, code.code(), detail);
        false
    }

    pub(super) fn record_connect_failure(&mut self, error: Error) {
        self.record(ExitCode::CONNECTION_ERROR, error);
    }

    fn record(&mut self, code: ExitCode, error: Error) -> bool {
        let ok = self.error(code, &error.to_string());
        self.last_error = Some(error);
        ok
    }

    /// Queue a line to send once the running rule callback returns.
    pub fn queue_send(&mut self, text: impl Into<String>) {
        self.queued.push(text.into());
    }

    /// Handle for closing this session from another task.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle(self.close_tx.clone())
    }

    /// Close the transport.
    ///
    /// Returns true if a transport was closed, false on every later call and
    /// for a session that never connected.
    pub async fn close(&mut self) -> bool {
        self.close_tx.send_replace(true);
        match self.transport.take() {
            Some(mut transport) => {
                if !transport.close().await {
                    debug!("{} was already closed", transport.peer());
                }
                info!("Session on {} closed", transport.peer());
                true
            }
            None => false,
        }
    }

    /// Print a result to stdout with entry banners.
    pub fn show(&self, output: &CommandOutput) {
        let mut stdout = std::io::stdout().lock();
        let rendered = match output {
            CommandOutput::Single(_) => format!("{}\n", output),
            _ => output.to_string(),
        };
        let _ = stdout.write_all(rendered.as_bytes());
        let _ = stdout.flush();
    }

    /// Send text followed by the line ending.
    pub async fn send_line(&mut self, text: &str) -> Result<(), TransportError> {
        let line = format!("{}{}", text, self.options.line_ending);
        let data = self.options.charset.encode(&line);
        self.send_raw(&data).await
    }

    /// Send bytes, giving up if a close is requested meanwhile.
    pub(super) async fn send_raw(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut closed = self.close_signal();
        let transport = self
            .transport
            .as_mut()
            .ok_or(TransportError::Disconnected)?;
        tokio::select! {
            biased;
            _ = cancelled(&mut closed) => Err(TransportError::Disconnected),
            sent = transport.send(data) => sent,
        }
    }

    /// Decode received bytes into the buffer and return the new text.
    pub(super) fn ingest(&mut self, data: &[u8]) -> String {
        let text = self.decoder.decode(data);
        if !text.is_empty() {
            trace!("{}", text);
            self.buffer.push_str(&text);
        }
        text
    }

    pub(super) fn transport_mut(&mut self) -> Option<&mut Box<dyn Transport>> {
        self.transport.as_mut()
    }

    pub(super) fn close_signal(&self) -> watch::Receiver<bool> {
        self.close_rx.clone()
    }

    /// Run a command, a sequence, or named commands.
    ///
    /// Returns `None` when the session is not connected. The result has the
    /// request's shape.
    pub async fn execute(&mut self, request: impl Into<CommandRequest>) -> Option<CommandOutput> {
        self.execute_with(request, ExecuteOptions::default()).await
    }

    /// [`execute`](Self::execute) with per-call options.
    pub async fn execute_with(
        &mut self,
        request: impl Into<CommandRequest>,
        options: ExecuteOptions,
    ) -> Option<CommandOutput> {
        if !self.is_connected() {
            if self.close_requested() && self.transport.is_some() {
                self.close().await;
            }
            warn!("Session not connected");
            self.last_error = Some(SessionError::NotConnected.into());
            return None;
        }

        if self.first {
            self.first = false;
            self.capture_welcome().await;
        }

        let output = match request.into() {
            CommandRequest::Single(command) if command.is_empty() => CommandOutput::Single(None),
            CommandRequest::Single(command) => CommandOutput::Single(self.run_command(&command).await),
            CommandRequest::Sequence(commands) if options.key_sequence_by_command => {
                let mut results = IndexMap::with_capacity(commands.len());
                for command in commands {
                    let result = self.run_command(&command).await;
                    results.insert(command, result);
                }
                CommandOutput::Map(results)
            }
            CommandRequest::Sequence(commands) => {
                let mut results = Vec::with_capacity(commands.len());
                for command in &commands {
                    results.push(self.run_command(command).await);
                }
                CommandOutput::List(results)
            }
            CommandRequest::Mapping(commands) => {
                let mut results = IndexMap::with_capacity(commands.len());
                for (key, command) in commands {
                    let result = self.run_command(&command).await;
                    results.insert(key, result);
                }
                CommandOutput::Map(results)
            }
        };

        Some(output)
    }

    async fn capture_welcome(&mut self) {
        self.buffer.clear();
        self.expect().await;
        let welcome = self.buffer.take();
        debug!("Welcome banner: {:?}", welcome);
        self.welcome = Some(welcome);
    }

    /// One send + expect cycle. `None` when the send failed.
    async fn run_command(&mut self, command: &str) -> Option<String> {
        self.exit_code = ExitCode::OK;
        self.last_command = Some(command.to_string());

        if !self.is_connected() {
            self.record(ExitCode::COMMAND_ERROR, SessionError::NotConnected.into());
            return None;
        }

        debug!("Sending command '{}'", command);
        if let Err(e) = self.send_line(command).await {
            let error = SessionError::CommandFailed {
                command: command.to_string(),
                source: e,
            };
            self.record(ExitCode::COMMAND_ERROR, error.into());
            if self.close_requested() {
                self.close().await;
            }
            return None;
        }

        self.buffer.clear();
        self.expect().await;
        Some(self.buffer.without_echo(Some(command)))
    }

    /// Run one expect cycle with the transport's strategy.
    async fn expect(&mut self) {
        let Some(strategy) = self.transport.as_ref().map(|t| t.expect_strategy()) else {
            return;
        };

        let result = match strategy {
            ExpectStrategy::Polling => self.expect_polling().await,
            ExpectStrategy::Native => self.expect_native().await,
        };

        if let Err(e) = result {
            warn!("Expect cycle aborted: {}", e);
            self.record(ExitCode::UNKNOWN, e);
        }

        if self.close_requested() && self.transport.is_some() {
            self.close().await;
        }
    }

    fn close_requested(&self) -> bool {
        *self.close_rx.borrow()
    }

    fn deadline(&self) -> Option<Instant> {
        (!self.timeout.is_zero()).then(|| Instant::now() + self.timeout)
    }

    fn timed_out(&mut self) {
        warn!(
            "Timeout after {:?} waiting for prompt {}",
            self.timeout, self.prompt
        );
        self.exit_code = ExitCode::END_OF_CONNECTION;
    }

    fn connection_closed(&mut self) {
        warn!("Connection closed");
        let tail = self.decoder.finish();
        self.buffer.push_str(&tail);
        self.exit_code = ExitCode::OK;
    }

    /// Generic loop: poll the transport and match prompt and rules here.
    async fn expect_polling(&mut self) -> Result<(), Error> {
        let deadline = self.deadline();
        let mut closed = self.close_signal();

        loop {
            let wake = {
                let Some(transport) = self.transport.as_mut() else {
                    return Ok(());
                };
                if !transport.is_connected() {
                    Wake::Data(Ok(None))
                } else {
                    tokio::select! {
                        biased;
                        _ = cancelled(&mut closed) => Wake::Cancelled,
                        _ = until(deadline) => Wake::TimedOut,
                        read = transport.receive() => Wake::Data(read),
                    }
                }
            };

            let data = match wake {
                Wake::Cancelled => {
                    info!("Close requested, ending expect cycle");
                    return Ok(());
                }
                Wake::TimedOut => {
                    self.timed_out();
                    return Ok(());
                }
                Wake::Data(read) => match read? {
                    Some(data) => data,
                    None => {
                        self.connection_closed();
                        return Ok(());
                    }
                },
            };

            self.ingest(&data);

            if self.buffer.strip_prompt(&self.prompt) {
                return Ok(());
            }

            if self.check_rules().await? {
                return Ok(());
            }

            if !self.options.poll_delay.is_zero() {
                tokio::time::sleep(self.options.poll_delay).await;
            }
        }
    }

    /// Native loop: the transport blocks until the prompt (index 0) or a rule
    /// pattern (index 1..) matches.
    async fn expect_native(&mut self) -> Result<(), Error> {
        let mut patterns = Vec::with_capacity(self.more.len() + 1);
        patterns.push(to_bytes_regex(self.prompt.regex())?);
        for rule in &self.more {
            patterns.push(to_bytes_regex(rule.pattern())?);
        }

        let deadline = self.deadline();
        let mut closed = self.close_signal();

        loop {
            let window = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if window.is_some_and(|w| w.is_zero()) {
                self.timed_out();
                return Ok(());
            }

            let found = {
                let Some(transport) = self.transport.as_mut() else {
                    return Ok(());
                };
                tokio::select! {
                    biased;
                    _ = cancelled(&mut closed) => None,
                    found = transport.expect_any(&patterns, window) => Some(found),
                }
            };

            let Some(found) = found else {
                info!("Close requested, ending expect cycle");
                return Ok(());
            };
            let found = found?;
            self.ingest(&found.data);

            match found.outcome {
                NativeOutcome::Matched(0) => {
                    self.buffer.strip_prompt(&self.prompt);
                    return Ok(());
                }
                NativeOutcome::Matched(index) => {
                    let Some(rule) = self.more.get(index - 1).cloned() else {
                        return Ok(());
                    };
                    if self.apply_rule(&rule).await? {
                        return Ok(());
                    }
                }
                NativeOutcome::TimedOut => {
                    self.timed_out();
                    return Ok(());
                }
                NativeOutcome::Closed => {
                    warn!("Connection closed while waiting for prompt");
                    self.exit_code = ExitCode::END_OF_CONNECTION;
                    return Ok(());
                }
            }
        }
    }

    /// Fire the first rule matching text not yet answered.
    ///
    /// Returns true if the rule ended the cycle.
    async fn check_rules(&mut self) -> Result<bool, Error> {
        let hit = self.more.iter().find_map(|rule| {
            self.buffer
                .search_unanswered(rule.pattern())
                .map(|end| (rule.clone(), end))
        });

        match hit {
            Some((rule, end)) => {
                self.buffer.mark_answered(end);
                self.apply_rule(&rule).await
            }
            None => Ok(false),
        }
    }

    async fn apply_rule(&mut self, rule: &ContinuationRule) -> Result<bool, Error> {
        let label = rule.name().unwrap_or(rule.pattern().as_str()).to_string();
        let mut terminate = false;

        for action in rule.actions() {
            match action {
                Action::Send(text) => {
                    debug!("Rule '{}' answering", label);
                    self.send_line(text).await?;
                }
                Action::Exec(callback) => {
                    debug!("Rule '{}' running callback", label);
                    let stop = callback(self);
                    for line in std::mem::take(&mut self.queued) {
                        self.send_line(&line).await?;
                    }
                    if stop {
                        terminate = true;
                        break;
                    }
                }
                Action::ExitWith(code) => {
                    self.error(ExitCode(*code), &format!("rule '{}' matched", label));
                    terminate = true;
                }
            }
        }

        Ok(terminate)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.transport.as_ref().map(|t| t.peer()))
            .field("prompt", &self.prompt.as_str())
            .field("more", &self.more.len())
            .field("timeout", &self.timeout)
            .field("exit_code", &self.exit_code)
            .finish()
    }
}

/// Resolve once a close is requested.
pub(super) async fn cancelled(closed: &mut watch::Receiver<bool>) {
    if closed.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Sleep until `deadline`, or forever without one.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
