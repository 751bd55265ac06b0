//! Continuation rules ("more" handlers).
//!
//! A continuation rule pairs a pattern with actions to take when the pattern
//! shows up in the middle of a command's output: answering a yes/no
//! confirmation, paging through `--More--`, or aborting on an error banner.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;

use super::session::Session;
use crate::error::ValidationError;
use crate::platform::PatternLibrary;

/// Callback invoked when a rule matches. Returning `true` ends the cycle.
pub type Callback = Arc<dyn Fn(&mut Session) -> bool + Send + Sync>;

/// Action performed when a continuation rule matches.
#[derive(Clone)]
pub enum Action {
    /// Send the text followed by the session line ending.
    Send(String),

    /// Run a callback with the session.
    Exec(Callback),

    /// Set the exit code and end the cycle.
    ExitWith(i32),
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Send(text) => f.debug_tuple("Send").field(text).finish(),
            Action::Exec(_) => f.debug_tuple("Exec").field(&"<callback>").finish(),
            Action::ExitWith(code) => f.debug_tuple("ExitWith").field(code).finish(),
        }
    }
}

/// A validated continuation rule.
#[derive(Debug, Clone)]
pub struct ContinuationRule {
    /// Library key the rule came from, if any.
    name: Option<String>,

    /// Pattern searched in the output buffer.
    pattern: Regex,

    /// Actions in execution order (never empty).
    actions: Vec<Action>,
}

impl ContinuationRule {
    /// Create a rule with a single action.
    pub fn new(pattern: &str, action: Action) -> Result<Self, ValidationError> {
        Ok(Self {
            name: None,
            pattern: Regex::new(pattern)?,
            actions: vec![action],
        })
    }

    /// Rule that answers `pattern` by sending `text`.
    pub fn send(pattern: &str, text: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(pattern, Action::Send(text.into()))
    }

    /// Rule that ends the cycle with `code` when `pattern` appears.
    pub fn exit_with(pattern: &str, code: i32) -> Result<Self, ValidationError> {
        Self::new(pattern, Action::ExitWith(code))
    }

    /// Rule that runs `callback` when `pattern` appears.
    pub fn exec<F>(pattern: &str, callback: F) -> Result<Self, ValidationError>
    where
        F: Fn(&mut Session) -> bool + Send + Sync + 'static,
    {
        Self::new(pattern, Action::Exec(Arc::new(callback)))
    }

    /// Append another action.
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Attach a library name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Library key, if the rule came from the library.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The compiled pattern.
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// The actions in execution order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

/// Unvalidated literal form of a rule, as supplied by callers or config.
///
/// Field names follow the short keys used in rule tables (`er`, `send`,
/// `exit`), with long aliases accepted.
#[derive(Clone, Default, Deserialize)]
pub struct RuleSpec {
    #[serde(alias = "er")]
    pub pattern: Option<String>,

    #[serde(default)]
    pub send: Option<String>,

    #[serde(skip)]
    pub exec: Option<Callback>,

    #[serde(alias = "exit")]
    pub exit_on: Option<i32>,
}

impl RuleSpec {
    /// Start a rule with a pattern.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    /// Set the text to send.
    pub fn send(mut self, text: impl Into<String>) -> Self {
        self.send = Some(text.into());
        self
    }

    /// Set the callback.
    pub fn exec<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut Session) -> bool + Send + Sync + 'static,
    {
        self.exec = Some(Arc::new(callback));
        self
    }

    /// Set the exit code.
    pub fn exit_on(mut self, code: i32) -> Self {
        self.exit_on = Some(code);
        self
    }
}

impl fmt::Debug for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSpec")
            .field("pattern", &self.pattern)
            .field("send", &self.send)
            .field("exec", &self.exec.as_ref().map(|_| "<callback>"))
            .field("exit_on", &self.exit_on)
            .finish()
    }
}

impl TryFrom<RuleSpec> for ContinuationRule {
    type Error = ValidationError;

    fn try_from(spec: RuleSpec) -> Result<Self, Self::Error> {
        let source = spec.pattern.ok_or(ValidationError::MissingPattern)?;

        // send, exec, exit: the order actions run in
        let mut actions = Vec::new();
        if let Some(text) = spec.send {
            actions.push(Action::Send(text));
        }
        if let Some(callback) = spec.exec {
            actions.push(Action::Exec(callback));
        }
        if let Some(code) = spec.exit_on {
            actions.push(Action::ExitWith(code));
        }
        if actions.is_empty() {
            return Err(ValidationError::MissingAction { pattern: source });
        }

        Ok(Self {
            name: None,
            pattern: Regex::new(&source)?,
            actions,
        })
    }
}

/// Anything accepted by [`Session::add_more`].
#[derive(Debug, Clone)]
pub enum MoreSpec {
    /// Key into the continuation library.
    Named(String),

    /// Literal rule to validate.
    Rule(RuleSpec),

    /// Already validated rule.
    Compiled(ContinuationRule),

    /// Several of the above, registered in order.
    List(Vec<MoreSpec>),
}

impl MoreSpec {
    /// Validate and flatten into `rules`, collecting failures in `errors`.
    ///
    /// Valid entries of a list are kept even when a sibling is rejected.
    pub(crate) fn resolve_into(
        self,
        rules: &mut Vec<ContinuationRule>,
        errors: &mut Vec<ValidationError>,
    ) {
        match self {
            MoreSpec::Named(name) => match PatternLibrary::global().more(&name) {
                Some(rule) => rules.push(rule.clone()),
                None => errors.push(ValidationError::UnknownRule(name)),
            },
            MoreSpec::Rule(spec) => match ContinuationRule::try_from(spec) {
                Ok(rule) => rules.push(rule),
                Err(e) => errors.push(e),
            },
            MoreSpec::Compiled(rule) => rules.push(rule),
            MoreSpec::List(items) => {
                for item in items {
                    item.resolve_into(rules, errors);
                }
            }
        }
    }
}

impl From<&str> for MoreSpec {
    fn from(name: &str) -> Self {
        MoreSpec::Named(name.to_string())
    }
}

impl From<String> for MoreSpec {
    fn from(name: String) -> Self {
        MoreSpec::Named(name)
    }
}

impl From<RuleSpec> for MoreSpec {
    fn from(spec: RuleSpec) -> Self {
        MoreSpec::Rule(spec)
    }
}

impl From<ContinuationRule> for MoreSpec {
    fn from(rule: ContinuationRule) -> Self {
        MoreSpec::Compiled(rule)
    }
}

impl<T: Into<MoreSpec>> From<Vec<T>> for MoreSpec {
    fn from(items: Vec<T>) -> Self {
        MoreSpec::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<MoreSpec>, const N: usize> From<[T; N]> for MoreSpec {
    fn from(items: [T; N]) -> Self {
        MoreSpec::List(items.into_iter().map(Into::into).collect())
    }
}
