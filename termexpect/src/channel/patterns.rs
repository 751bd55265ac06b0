//! Prompt pattern resolution and matching.

use std::fmt;
use std::ops::Range;

use regex::Regex;

use crate::error::ValidationError;
use crate::platform::PatternLibrary;

/// Name of the fallback prompt used when none is configured.
pub const AUTO_PROMPT: &str = "auto";

/// Compiled prompt pattern marking the end of a command's output.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Library key the prompt was resolved from, if any.
    name: Option<String>,

    /// The compiled pattern.
    pattern: Regex,
}

impl Prompt {
    /// Resolve a prompt from a library key or a literal regex.
    ///
    /// An empty value falls back to the `auto` prompt. A value that is not a
    /// library key is compiled as a regex.
    pub fn resolve(value: &str) -> Result<Self, ValidationError> {
        let key = if value.is_empty() { AUTO_PROMPT } else { value };

        match PatternLibrary::global().prompt(key) {
            Some(pattern) => Ok(Self {
                name: Some(key.to_string()),
                pattern: pattern.clone(),
            }),
            None => Ok(Self {
                name: None,
                pattern: Regex::new(key)?,
            }),
        }
    }

    /// The `auto` prompt.
    pub fn auto() -> Self {
        let pattern = PatternLibrary::global()
            .prompt(AUTO_PROMPT)
            .cloned()
            .unwrap_or_else(|| Regex::new(r"[$#>] *\z").expect("static fallback prompt"));
        Self {
            name: Some(AUTO_PROMPT.to_string()),
            pattern,
        }
    }

    /// Library key this prompt came from (None for literals).
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The pattern source.
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// The compiled regex.
    pub fn regex(&self) -> &Regex {
        &self.pattern
    }

    /// Byte range of the first prompt match in `text`.
    pub fn find(&self, text: &str) -> Option<Range<usize>> {
        self.pattern.find(text).map(|m| m.range())
    }

    /// Check whether the prompt appears in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

impl Default for Prompt {
    fn default() -> Self {
        Self::auto()
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.pattern.as_str()),
            None => write!(f, "{}", self.pattern.as_str()),
        }
    }
}

/// Compile a text pattern for byte-level matching.
///
/// Used by transports with a native multi-pattern wait, which match raw
/// bytes before they are decoded.
pub fn to_bytes_regex(pattern: &Regex) -> Result<regex::bytes::Regex, ValidationError> {
    Ok(regex::bytes::Regex::new(pattern.as_str())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_library_key() {
        let prompt = Prompt::resolve("cisco").unwrap();
        assert_eq!(prompt.name(), Some("cisco"));
        assert!(prompt.is_match("show clock\nrouter#"));
    }

    #[test]
    fn test_resolve_literal() {
        let prompt = Prompt::resolve(r"prompt> $").unwrap();
        assert_eq!(prompt.name(), None);
        assert_eq!(prompt.find("Result\nprompt> "), Some(7..15));
    }

    #[test]
    fn test_empty_falls_back_to_auto() {
        let prompt = Prompt::resolve("").unwrap();
        assert_eq!(prompt.name(), Some(AUTO_PROMPT));
    }

    #[test]
    fn test_invalid_literal_rejected() {
        assert!(matches!(
            Prompt::resolve("(unclosed"),
            Err(ValidationError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_bytes_regex_matches_same_text() {
        let prompt = Prompt::resolve("msc").unwrap();
        let bytes = to_bytes_regex(prompt.regex()).unwrap();
        assert!(bytes.is_match(b"bye\nmsc> "));
    }
}
