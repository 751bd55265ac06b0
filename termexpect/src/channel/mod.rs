//! Channel layer for decoding and prompt matching.
//!
//! This module handles the receive side of a session: turning transport
//! bytes into text and locating prompts in the accumulated output.

mod buffer;
mod charset;
mod patterns;

pub use buffer::OutputBuffer;
pub use charset::{Charset, Decoder};
pub use patterns::{AUTO_PROMPT, Prompt, to_bytes_regex};
