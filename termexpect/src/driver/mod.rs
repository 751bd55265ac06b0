//! Session driver: the expect engine and its public API.
//!
//! A [`Session`] sends commands over a [`Transport`](crate::transport::Transport),
//! answers intermediate prompts through continuation rules, and captures
//! output until the prompt reappears.

mod builder;
mod exit;
mod interactive;
mod more;
mod options;
mod request;
mod session;

pub use builder::SessionBuilder;
pub use exit::ExitCode;
pub use interactive::InteractiveExit;
pub use more::{Action, Callback, ContinuationRule, MoreSpec, RuleSpec};
pub use options::{DEFAULT_LEAVE_INTERACTIVE, DEFAULT_TIMEOUT, SessionOptions};
pub use request::{CommandOutput, CommandRequest, ExecuteOptions};
pub use session::{CloseHandle, Session};
