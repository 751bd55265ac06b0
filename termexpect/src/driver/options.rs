//! Session-wide options.

use std::time::Duration;

use serde::Deserialize;

use crate::channel::Charset;

/// Default session timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default sentinel that leaves interactive mode.
pub const DEFAULT_LEAVE_INTERACTIVE: &str = ":END:";

/// Encoding and pacing options shared by every backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Charset used to encode commands and decode output.
    pub charset: Charset,

    /// Appended to every command and every rule answer.
    pub line_ending: String,

    /// Pause between polls of the expect loop.
    #[serde(with = "crate::transport::config::secs")]
    pub poll_delay: Duration,

    /// Typed locally to leave interactive mode.
    pub leave_interactive: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            charset: Charset::default(),
            line_ending: "\n".to_string(),
            poll_delay: Duration::ZERO,
            leave_interactive: DEFAULT_LEAVE_INTERACTIVE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let options: SessionOptions =
            serde_json::from_str(r#"{"charset": "latin1", "line_ending": "\r\n"}"#).unwrap();
        assert_eq!(options.charset, Charset::Latin1);
        assert_eq!(options.line_ending, "\r\n");
        assert_eq!(options.poll_delay, Duration::ZERO);
        assert_eq!(options.leave_interactive, ":END:");
    }
}
