//! Incremental decoding of the chat endpoint's `data: <json>` stream.
//!
//! Bytes arrive in arbitrary chunks. They are decoded to UTF-8 without ever
//! splitting a code point, cut into newline-delimited records, and each record
//! is classified by [`parse_record`].

use serde::Deserialize;

use crate::state::Source;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_MARKER: &str = "[DONE]";

/// Streaming UTF-8 decoder that holds back incomplete trailing sequences.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `pending + bytes` as possible.
    ///
    /// A multi-byte character cut at the end of the chunk stays buffered until
    /// the next call. Sequences that can never become valid are replaced with
    /// U+FFFD so one bad byte cannot stall the stream.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Append `text` to `buffer` and split off every complete line.
///
/// Returns the complete lines (without `\n` or a trailing `\r`) and the final,
/// possibly incomplete, fragment that becomes the new buffer.
pub fn split_lines(mut buffer: String, text: &str) -> (Vec<String>, String) {
    buffer.push_str(text);

    let Some(last_newline) = buffer.rfind('\n') else {
        return (Vec::new(), buffer);
    };

    let rest = buffer.split_off(last_newline + 1);
    buffer.pop();

    let lines = buffer
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect();

    (lines, rest)
}

/// Owned buffer turning raw byte chunks into complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    decoder: Utf8Decoder,
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(bytes);
        let (lines, rest) = split_lines(std::mem::take(&mut self.pending), &text);
        self.pending = rest;
        lines
    }

    /// The unterminated last line, if the stream ended without a newline.
    pub fn finish(&mut self) -> Option<String> {
        let tail = self.decoder.finish();
        let mut last = std::mem::take(&mut self.pending);
        last.push_str(&tail);
        let last = last.strip_suffix('\r').map(str::to_string).unwrap_or(last);

        if last.is_empty() {
            None
        } else {
            Some(last)
        }
    }
}

/// A typed record from the chat stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Sources {
        #[serde(default)]
        sources: Option<Vec<Source>>,
    },
    Content {
        #[serde(default)]
        chunk: String,
    },
    Done,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Classification of one line of the stream
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Blank keep-alive, comment, or any non-`data: ` line
    Ignored,
    /// The literal `[DONE]` marker
    Done,
    Event(StreamEvent),
    /// The payload could not be understood; carries the parse error
    Malformed(String),
}

pub fn parse_record(line: &str) -> Record {
    if line.trim().is_empty() {
        return Record::Ignored;
    }

    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Record::Ignored;
    };

    if data.trim() == DONE_MARKER {
        return Record::Done;
    }

    match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => Record::Event(event),
        Err(err) => Record::Malformed(err.to_string()),
    }
}
