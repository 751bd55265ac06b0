//! Command requests, results and their display form.

use std::fmt;

use indexmap::IndexMap;

/// Width of the banner printed above each entry of a multi-command result.
const BANNER_WIDTH: usize = 100;

/// What to run: one command, an ordered list, or named commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    /// A single command.
    Single(String),

    /// Commands run in order.
    Sequence(Vec<String>),

    /// Commands run in insertion order, results keyed by name.
    Mapping(IndexMap<String, String>),
}

impl From<&str> for CommandRequest {
    fn from(command: &str) -> Self {
        CommandRequest::Single(command.to_string())
    }
}

impl From<String> for CommandRequest {
    fn from(command: String) -> Self {
        CommandRequest::Single(command)
    }
}

impl From<Vec<String>> for CommandRequest {
    fn from(commands: Vec<String>) -> Self {
        CommandRequest::Sequence(commands)
    }
}

impl From<Vec<&str>> for CommandRequest {
    fn from(commands: Vec<&str>) -> Self {
        CommandRequest::Sequence(commands.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CommandRequest {
    fn from(commands: [&str; N]) -> Self {
        CommandRequest::Sequence(commands.into_iter().map(str::to_string).collect())
    }
}

impl From<IndexMap<String, String>> for CommandRequest {
    fn from(commands: IndexMap<String, String>) -> Self {
        CommandRequest::Mapping(commands)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for CommandRequest {
    fn from(commands: [(&str, &str); N]) -> Self {
        CommandRequest::Mapping(
            commands
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Per-call options for [`Session::execute_with`](super::Session::execute_with).
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Return a sequence's results as a map keyed by the command text.
    pub key_sequence_by_command: bool,
}

impl ExecuteOptions {
    /// Key sequence results by command.
    pub fn keyed() -> Self {
        Self {
            key_sequence_by_command: true,
        }
    }
}

/// Captured output, shaped like the request. `None` marks an entry with no
/// result (the send failed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    Single(Option<String>),
    List(Vec<Option<String>>),
    Map(IndexMap<String, Option<String>>),
}

impl CommandOutput {
    /// The single result, if this is a single output.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            CommandOutput::Single(text) => text.as_deref(),
            _ => None,
        }
    }

    /// The list entries, if this is a list output.
    pub fn as_list(&self) -> Option<&[Option<String>]> {
        match self {
            CommandOutput::List(items) => Some(items),
            _ => None,
        }
    }

    /// The map entries, if this is a map output.
    pub fn as_map(&self) -> Option<&IndexMap<String, Option<String>>> {
        match self {
            CommandOutput::Map(items) => Some(items),
            _ => None,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        match self {
            CommandOutput::Single(_) => 1,
            CommandOutput::List(items) => items.len(),
            CommandOutput::Map(items) => items.len(),
        }
    }

    /// True for an empty list or map.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutput::Single(text) => write!(f, "{}", text.as_deref().unwrap_or_default()),
            CommandOutput::List(items) => {
                for (i, text) in items.iter().enumerate() {
                    writeln!(f, "{:-^width$}", format!(" {} ", i), width = BANNER_WIDTH)?;
                    writeln!(f, "{}", text.as_deref().unwrap_or_default())?;
                }
                Ok(())
            }
            CommandOutput::Map(items) => {
                for (key, text) in items {
                    writeln!(f, "{:#^width$}", format!(" {} ", key), width = BANNER_WIDTH)?;
                    writeln!(f, "{}", text.as_deref().unwrap_or_default())?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shapes() {
        assert_eq!(
            CommandRequest::from("ls"),
            CommandRequest::Single("ls".into())
        );
        assert!(matches!(
            CommandRequest::from(["a", "b"]),
            CommandRequest::Sequence(ref v) if v.len() == 2
        ));
        match CommandRequest::from([("y", "b"), ("x", "a")]) {
            CommandRequest::Mapping(map) => {
                assert_eq!(map.keys().collect::<Vec<_>>(), ["y", "x"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_display_banners() {
        let list = CommandOutput::List(vec![Some("one".into()), None]);
        let rendered = list.to_string();
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].len(), 100);
        assert!(lines[0].starts_with("-----") && lines[0].contains(" 0 "));
        assert_eq!(lines[1], "one");
        assert_eq!(lines[3], "");

        let mut map = IndexMap::new();
        map.insert("uptime".to_string(), Some("up 3 days".to_string()));
        let rendered = CommandOutput::Map(map).to_string();
        assert!(rendered.starts_with("#####"));
        assert!(rendered.contains(" uptime "));
        assert!(rendered.ends_with("up 3 days\n"));

        assert_eq!(CommandOutput::Single(Some("x".into())).to_string(), "x");
    }
}
