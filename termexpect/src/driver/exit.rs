//! Session exit codes.

use std::fmt;

/// Exit code recorded on a session after each operation.
///
/// Zero is the only success value. Continuation rules may set any integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const OK: ExitCode = ExitCode(0);
    pub const END_OF_CONNECTION: ExitCode = ExitCode(1);
    pub const UNKNOWN: ExitCode = ExitCode(2);
    pub const COMMAND_ERROR: ExitCode = ExitCode(3);
    pub const CONNECTION_ERROR: ExitCode = ExitCode(4);
    pub const VALUE_ERROR: ExitCode = ExitCode(5);

    /// Raw integer value.
    pub fn code(self) -> i32 {
        self.0
    }

    /// True for [`ExitCode::OK`].
    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    /// Known description, if this is one of the predefined codes.
    pub fn description(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("OK"),
            1 => Some("End of connection"),
            2 => Some("Unknown error"),
            3 => Some("Command error"),
            4 => Some("Connection error"),
            5 => Some("Value error"),
            _ => None,
        }
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description().unwrap_or("Unknown error"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_custom_codes() {
        assert_eq!(ExitCode::OK.to_string(), "OK");
        assert_eq!(ExitCode::CONNECTION_ERROR.to_string(), "Connection error");
        assert_eq!(ExitCode(40).to_string(), "Unknown error");
        assert_eq!(ExitCode::from(40).code(), 40);
        assert!(ExitCode::default().is_ok());
    }
}
