//! Global pattern library for looking up prompts and continuation rules.

use indexmap::IndexMap;
use log::error;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{mores, prompts};
use crate::driver::ContinuationRule;

/// Global pattern library, built once and read-only afterwards.
static LIBRARY: Lazy<PatternLibrary> = Lazy::new(PatternLibrary::builtin);

/// Named prompt patterns and continuation rules.
#[derive(Debug, Default)]
pub struct PatternLibrary {
    prompts: IndexMap<String, Regex>,
    mores: IndexMap<String, ContinuationRule>,
}

impl PatternLibrary {
    /// Get the global library.
    pub fn global() -> &'static PatternLibrary {
        &LIBRARY
    }

    /// Build the library from the built-in tables.
    fn builtin() -> Self {
        let mut library = Self::default();

        for (name, pattern) in prompts::PROMPTS {
            match Regex::new(pattern) {
                Ok(re) => {
                    library.prompts.insert(name.to_string(), re);
                }
                Err(e) => error!("Built-in prompt '{}' does not compile: {}", name, e),
            }
        }

        for (name, pattern, action) in mores::rules() {
            match ContinuationRule::new(pattern, action) {
                Ok(rule) => {
                    library.mores.insert(name.to_string(), rule.with_name(name));
                }
                Err(e) => error!("Built-in rule '{}' does not compile: {}", name, e),
            }
        }

        library
    }

    /// Get a prompt pattern by name.
    pub fn prompt(&self, name: &str) -> Option<&Regex> {
        self.prompts.get(name)
    }

    /// Get a continuation rule by name.
    pub fn more(&self, name: &str) -> Option<&ContinuationRule> {
        self.mores.get(name)
    }

    /// List prompt names in table order.
    pub fn prompt_names(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(String::as_str)
    }

    /// List continuation rule names in table order.
    pub fn more_names(&self) -> impl Iterator<Item = &str> {
        self.mores.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Action;

    #[test]
    fn test_all_builtins_compile() {
        let library = PatternLibrary::global();
        assert_eq!(library.prompt_names().count(), prompts::PROMPTS.len());
        assert_eq!(library.more_names().count(), mores::rules().len());
    }

    #[test]
    fn test_shell_prompts() {
        let linux = PatternLibrary::global().prompt("linux").unwrap();
        assert!(linux.is_match("ls\r\nfile\r\n[admin@server ~]$ "));
        assert!(linux.is_match("uptime\n-bash-4.2# "));
        assert!(!linux.is_match("[admin@server ~]$ ls\nfile"));
    }

    #[test]
    fn test_cisco_prompts() {
        let cisco = PatternLibrary::global().prompt("cisco").unwrap();
        assert!(cisco.is_match("show clock\r\n*10:00:00\r\nrouter#"));
        assert!(cisco.is_match("\nswitch> (enable) "));
        assert!(!cisco.is_match("router#show clock\n"));
    }

    #[test]
    fn test_msc_prompt_leaves_line_ending() {
        let msc = PatternLibrary::global().prompt("msc").unwrap();
        let text = "bye\nmsc> ";
        let m = msc.find(text).unwrap();
        assert_eq!(&text[..m.start()], "bye\n");
    }

    #[test]
    fn test_huawei_and_juniper() {
        let library = PatternLibrary::global();
        assert!(library.prompt("huawei").unwrap().is_match("\r\n<HUAWEI-01>"));
        assert!(library.prompt("juniper").unwrap().is_match("\nuser@mx480> "));
    }

    #[test]
    fn test_auto_prompt_shapes() {
        let auto = PatternLibrary::global().prompt("auto").unwrap();
        for text in [
            "out\n[root@box /]# ",
            "out\nrouter#",
            "out\nprompt> ",
            "out\nuser@host:~$ ",
            "out\nOverwrite? [Y/N]: ",
            "out\n>> Main# ",
            "Select option ==> ",
        ] {
            assert!(auto.is_match(text), "auto should match {:?}", text);
        }
        assert!(!auto.is_match("still printing output\n"));
    }

    #[test]
    fn test_yesno_rule() {
        let rule = PatternLibrary::global().more("yesno").unwrap();
        assert!(rule.pattern().is_match("Are you sure? [y/N]: "));
        assert!(matches!(rule.actions(), [Action::Send(s)] if s == "n"));
    }

    #[test]
    fn test_more_rule() {
        let rule = PatternLibrary::global().more("more").unwrap();
        assert!(rule.pattern().is_match("line\n --More-- "));
        assert!(matches!(rule.actions(), [Action::Send(s)] if s == " "));
    }

    #[test]
    fn test_try_again_rule() {
        let rule = PatternLibrary::global().more("try_again").unwrap();
        assert!(rule.pattern().is_match("Login incorrect. Please try again.\n"));
        assert!(matches!(rule.actions(), [Action::ExitWith(10)]));
    }

    #[test]
    fn test_unknown_names() {
        let library = PatternLibrary::global();
        assert!(library.prompt("nosuch").is_none());
        assert!(library.more("nosuch").is_none());
    }
}
