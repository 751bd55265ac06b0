//! Charset handling for bytes crossing the transport boundary.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Character set used to decode received bytes and encode sent text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Charset {
    /// UTF-8 (invalid sequences become U+FFFD).
    #[default]
    Utf8,
    /// ISO-8859-1, one byte per character.
    Latin1,
    /// 7-bit ASCII, high bytes become U+FFFD.
    Ascii,
}

impl Charset {
    /// Encode text for the wire. Unrepresentable characters become `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Charset::Utf8 => text.as_bytes().to_vec(),
            Charset::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            Charset::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
        }
    }

    /// Create a streaming decoder for this charset.
    pub fn decoder(&self) -> Decoder {
        Decoder {
            charset: *self,
            pending: Vec::new(),
        }
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Charset::Latin1),
            "ascii" | "us-ascii" => Ok(Charset::Ascii),
            other => Err(format!("unsupported charset '{}'", other)),
        }
    }
}

impl TryFrom<String> for Charset {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Charset::Utf8 => write!(f, "utf-8"),
            Charset::Latin1 => write!(f, "latin-1"),
            Charset::Ascii => write!(f, "ascii"),
        }
    }
}

/// Streaming decoder.
///
/// Reads can split a multi-byte UTF-8 sequence; the incomplete tail is held
/// back until the next chunk arrives instead of being replaced.
#[derive(Debug, Clone)]
pub struct Decoder {
    charset: Charset,
    pending: Vec<u8>,
}

impl Decoder {
    /// Decode the next chunk of received bytes.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        match self.charset {
            Charset::Latin1 => chunk.iter().map(|&b| char::from(b)).collect(),
            Charset::Ascii => chunk
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { '\u{FFFD}' })
                .collect(),
            Charset::Utf8 => self.decode_utf8(chunk),
        }
    }

    /// Flush any held-back bytes (lossily).
    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }

    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let data = std::mem::take(&mut self.pending);

        let keep = match std::str::from_utf8(&data) {
            Ok(_) => 0,
            // error_len() == None means the input ended mid-sequence
            Err(e) if e.error_len().is_none() => data.len() - e.valid_up_to(),
            Err(_) => incomplete_tail(&data),
        };

        let split = data.len() - keep;
        self.pending.extend_from_slice(&data[split..]);
        String::from_utf8_lossy(&data[..split]).into_owned()
    }
}

/// Length of a truncated UTF-8 sequence at the end of `data`, if any.
fn incomplete_tail(data: &[u8]) -> usize {
    for back in 1..=3.min(data.len()) {
        let b = data[data.len() - back];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let needed = match b {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return 0,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_split_sequence() {
        let mut decoder = Charset::Utf8.decoder();
        let bytes = "olá".as_bytes();
        let first = decoder.decode(&bytes[..3]);
        assert_eq!(first, "ol");
        let second = decoder.decode(&bytes[3..]);
        assert_eq!(second, "á");
    }

    #[test]
    fn test_utf8_invalid_byte_replaced() {
        let mut decoder = Charset::Utf8.decoder();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_invalid_then_truncated() {
        let mut decoder = Charset::Utf8.decoder();
        // invalid byte followed by the first half of "é"
        assert_eq!(decoder.decode(b"x\xff\xc3"), "x\u{FFFD}");
        assert_eq!(decoder.decode(b"\xa9"), "é");
    }

    #[test]
    fn test_latin1_roundtrip() {
        let encoded = Charset::Latin1.encode("café");
        assert_eq!(encoded, b"caf\xe9");
        let mut decoder = Charset::Latin1.decoder();
        assert_eq!(decoder.decode(&encoded), "café");
    }

    #[test]
    fn test_ascii_encode_replaces() {
        assert_eq!(Charset::Ascii.encode("né"), b"n?");
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("UTF-8".parse::<Charset>().unwrap(), Charset::Utf8);
        assert_eq!("iso_8859_1".parse::<Charset>().unwrap(), Charset::Latin1);
        assert!("ebcdic".parse::<Charset>().is_err());
    }
}
