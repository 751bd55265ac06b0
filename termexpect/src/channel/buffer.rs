//! Text buffer accumulated during an expect cycle.

use regex::Regex;

use super::patterns::Prompt;

/// Decoded output received since the last command was sent.
///
/// Besides the text, the buffer remembers how far continuation rules have
/// already been answered so a pager cue is only answered once.
#[derive(Debug, Default, Clone)]
pub struct OutputBuffer {
    /// The accumulated text.
    text: String,

    /// Offset from which continuation patterns are searched.
    rules_from: usize,
}

impl OutputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append decoded text.
    pub fn push_str(&mut self, data: &str) {
        self.text.push_str(data);
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.text.clear();
        self.rules_from = 0;
    }

    /// Get the buffer contents.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> String {
        self.rules_from = 0;
        std::mem::take(&mut self.text)
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// If the prompt matches, remove the matched span and return true.
    pub fn strip_prompt(&mut self, prompt: &Prompt) -> bool {
        match prompt.find(&self.text) {
            Some(range) => {
                self.text.replace_range(range, "");
                self.rules_from = self.rules_from.min(self.text.len());
                true
            }
            None => false,
        }
    }

    /// Search the part of the buffer not yet answered by a rule.
    ///
    /// Returns the absolute end offset of the match.
    pub fn search_unanswered(&self, pattern: &Regex) -> Option<usize> {
        let tail = &self.text[self.rules_from..];
        pattern.find(tail).map(|m| self.rules_from + m.end())
    }

    /// Mark everything up to `offset` as answered.
    pub fn mark_answered(&mut self, offset: usize) {
        self.rules_from = offset.min(self.text.len());
    }

    /// Return the contents with a leading echo of `command` removed.
    ///
    /// Whitespace following the echo (the echoed line ending) goes with it.
    pub fn without_echo(&self, command: Option<&str>) -> String {
        match command.and_then(|cmd| self.text.strip_prefix(cmd)) {
            Some(rest) => rest.trim_start().to_string(),
            None => self.text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_prompt_and_echo() {
        let prompt = Prompt::resolve(r"prompt> $").unwrap();
        let mut buffer = OutputBuffer::new();
        buffer.push_str("show version\nResult\nprompt> ");

        assert!(buffer.strip_prompt(&prompt));
        assert_eq!(buffer.as_str(), "show version\nResult\n");
        assert_eq!(buffer.without_echo(Some("show version")), "Result\n");
    }

    #[test]
    fn test_no_echo_keeps_text() {
        let mut buffer = OutputBuffer::new();
        buffer.push_str("Result\n");
        assert_eq!(buffer.without_echo(Some("show version")), "Result\n");
        assert_eq!(buffer.without_echo(None), "Result\n");
    }

    #[test]
    fn test_answered_region_skipped() {
        let pager = Regex::new("--more--").unwrap();
        let mut buffer = OutputBuffer::new();
        buffer.push_str("line 1\n--more--");

        let end = buffer.search_unanswered(&pager).unwrap();
        buffer.mark_answered(end);
        assert!(buffer.search_unanswered(&pager).is_none());

        buffer.push_str("\rline 2\n--more--");
        assert!(buffer.search_unanswered(&pager).is_some());
    }

    #[test]
    fn test_take_clears_buffer() {
        let mut buffer = OutputBuffer::new();
        buffer.push_str("test data");
        assert_eq!(buffer.take(), "test data");
        assert!(buffer.is_empty());
    }
}
