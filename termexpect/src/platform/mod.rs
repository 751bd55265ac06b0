//! Pattern library: named prompts and continuation rules.
//!
//! These are data, not behavior. The session resolves prompt keys and
//! continuation names against this library and treats unknown prompt keys
//! as literal regexes.

mod mores;
mod prompts;
mod registry;

pub use registry::PatternLibrary;
