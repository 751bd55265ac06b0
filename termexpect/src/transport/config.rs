//! Connection configuration for each transport.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For testing and lab use only.
    Disabled,
}

/// SSH connection configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Authentication method.
    pub auth: AuthMethod,

    /// Connection timeout.
    pub timeout: Duration,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    /// Create a configuration with password-less defaults.
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth: AuthMethod::None,
            timeout: Duration::from_secs(60),
            terminal_width: 511,
            terminal_height: 24,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Use private key authentication.
    pub fn private_key(mut self, path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: path.into(),
            passphrase: passphrase.map(SecretString::from),
        };
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the host key verification mode.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use a specific known_hosts file.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Authentication method for SSH connections.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// No authentication (for testing only).
    None,

    /// Password authentication.
    Password(SecretString),

    /// Private key authentication.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },
}

/// Telnet connection configuration.
#[derive(Debug, Clone)]
pub struct TelnetConfig {
    /// Target host.
    pub host: String,

    /// Port (default: 23).
    pub port: u16,

    /// Username for the login handshake. No handshake when unset.
    pub username: Option<String>,

    /// Password sent after the `Password:` cue.
    pub password: Option<SecretString>,

    /// Connection timeout.
    pub timeout: Duration,
}

impl TelnetConfig {
    /// Create a configuration without login.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 23,
            username: None,
            password: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Log in with these credentials after connecting.
    pub fn login(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password.map(SecretString::from);
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Raw TCP socket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    /// Target host.
    pub host: String,

    /// Target port.
    pub port: u16,

    /// Connection timeout.
    #[serde(default = "default_short_timeout", with = "secs")]
    pub timeout: Duration,
}

impl SocketConfig {
    /// Create a socket configuration.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: default_short_timeout(),
        }
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Parity {
    /// No parity
    #[default]
    #[serde(alias = "N", alias = "none")]
    None,
    /// Odd parity
    #[serde(alias = "O", alias = "odd")]
    Odd,
    /// Even parity
    #[serde(alias = "E", alias = "even")]
    Even,
}

/// Serial stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum StopBits {
    /// One stop bit
    #[default]
    #[serde(alias = "1")]
    One,
    /// Two stop bits
    #[serde(alias = "2")]
    Two,
}

/// Serial data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum DataBits {
    /// 5 bits
    #[serde(alias = "5")]
    Five,
    /// 6 bits
    #[serde(alias = "6")]
    Six,
    /// 7 bits
    #[serde(alias = "7")]
    Seven,
    /// 8 bits
    #[default]
    #[serde(alias = "8")]
    Eight,
}

/// Serial port configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    /// Port device (e.g. `/dev/ttyS0`, `COM1`).
    pub port: String,

    /// Baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Data bits.
    #[serde(default)]
    pub data_bits: DataBits,

    /// Parity.
    #[serde(default)]
    pub parity: Parity,

    /// Stop bits.
    #[serde(default)]
    pub stop_bits: StopBits,

    /// Driver-level read timeout.
    #[serde(default = "default_short_timeout", with = "secs")]
    pub timeout: Duration,
}

impl SerialConfig {
    /// Create a configuration with 9600 8N1 defaults.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            timeout: default_short_timeout(),
        }
    }

    /// Set the baud rate.
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the data bits.
    pub fn data_bits(mut self, bits: DataBits) -> Self {
        self.data_bits = bits;
        self
    }

    /// Set the parity.
    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Set the stop bits.
    pub fn stop_bits(mut self, bits: StopBits) -> Self {
        self.stop_bits = bits;
        self
    }

    /// Set the read timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Spawned process configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SpawnConfig {
    /// Program to run.
    pub program: String,

    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Session timeout applied after spawning.
    #[serde(default = "default_short_timeout", with = "secs")]
    pub timeout: Duration,

    /// Pseudo-terminal columns.
    #[serde(default = "default_cols")]
    pub cols: u16,

    /// Pseudo-terminal rows.
    #[serde(default = "default_rows")]
    pub rows: u16,
}

impl SpawnConfig {
    /// Create a configuration from a command line.
    ///
    /// The command line is split on whitespace; no shell quoting applies.
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self::with_args(program, parts.collect())
    }

    /// Create a configuration from a program and its arguments.
    pub fn with_args(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            env: HashMap::new(),
            timeout: default_short_timeout(),
            cols: default_cols(),
            rows: default_rows(),
        }
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the session timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full command line, for logging.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn default_short_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

/// Durations written as (fractional) seconds in configuration files.
pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_command_split() {
        let config = SpawnConfig::new("bash --norc -i");
        assert_eq!(config.program, "bash");
        assert_eq!(config.args, ["--norc", "-i"]);
        assert_eq!(config.command_line(), "bash --norc -i");
    }

    #[test]
    fn test_serial_defaults_from_json() {
        let config: SerialConfig =
            serde_json::from_str(r#"{"port": "/dev/ttyUSB0", "parity": "E", "timeout": 2.5}"#)
                .unwrap();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_socket_from_json() {
        let config: SocketConfig =
            serde_json::from_str(r#"{"host": "10.0.0.1", "port": 5000}"#).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_ssh_password_is_redacted() {
        let config = SshConfig::new("router", "admin").password("hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
