//! Error types for termexpect.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for termexpect operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors (connect, handshake, I/O).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session-level errors (command execution).
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Continuation rule or prompt validation errors.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Transport layer errors.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host key not present in known_hosts (strict mode)
    #[error("Unknown host key for {host}:{port}")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Failed to open PTY channel or pseudo-terminal
    #[error("PTY error: {0}")]
    Pty(String),

    /// Failed to spawn the child process
    #[error("Failed to spawn '{program}': {message}")]
    Spawn { program: String, message: String },

    /// Serial port error
    #[error("Serial port '{port}': {message}")]
    Serial { port: String, message: String },

    /// Telnet login handshake did not see the expected cue
    #[error("Telnet login failed: no '{cue}' cue received")]
    LoginFailed { cue: &'static str },

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The transport has no native multi-pattern wait
    #[error("Native expect is not supported by this transport")]
    Unsupported,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Session layer errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session has no live transport
    #[error("Session not connected")]
    NotConnected,

    /// Sending a command failed
    #[error("Command '{command}' failed: {source}")]
    CommandFailed {
        command: String,
        #[source]
        source: TransportError,
    },

    /// Local terminal could not be put into raw mode
    #[error("Terminal error: {0}")]
    Terminal(#[source] io::Error),
}

/// Validation errors raised while registering prompts or continuation rules.
#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    /// Rule has no pattern
    #[error("Continuation rule has no pattern")]
    MissingPattern,

    /// Rule has neither send, exec nor exit
    #[error("Continuation rule '{pattern}' has no send, exec or exit action")]
    MissingAction { pattern: String },

    /// Named rule is not in the library
    #[error("Unknown continuation rule '{0}'")]
    UnknownRule(String),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Result type alias using termexpect's Error.
pub type Result<T> = std::result::Result<T, Error>;
