//! # termexpect
//!
//! Async expect-style automation for command-line devices and programs.
//!
//! A session sends commands, waits for the device prompt, answers
//! intermediate questions (pagers, confirmations, credential cues) through
//! continuation rules, and returns the captured output.
//!
//! ## Features
//!
//! - SSH shell channels via russh, Telnet, raw TCP, serial ports and local
//!   programs on a pseudo-terminal
//! - A library of named prompts and continuation rules for common devices
//! - Single commands, ordered sequences and named command maps
//! - Interactive hand-off to the local terminal
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use termexpect::SessionBuilder;
//! use termexpect::transport::SshConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut session = SessionBuilder::new()
//!         .prompt("linux")
//!         .more("yesno")
//!         .ssh(SshConfig::new("192.168.1.1", "admin").password("secret"))
//!         .await;
//!
//!     if let Some(output) = session.execute("uname -a").await {
//!         println!("{}", output);
//!     }
//!     println!("exit code: {}", session.exit_code());
//!
//!     session.close().await;
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod error;
pub mod platform;
pub mod transport;

// Re-export main types for convenience
pub use driver::{
    CommandOutput, CommandRequest, ExecuteOptions, ExitCode, MoreSpec, Session, SessionBuilder,
};
pub use error::Error;
pub use platform::PatternLibrary;
pub use transport::{AuthMethod, SshConfig, Transport};
