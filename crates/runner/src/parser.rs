//! Incremental completion parser.
//!
//! The inference process writes an unframed byte stream. The parser
//! accumulates chunks (which may split UTF-8 sequences, terminal escape
//! codes or markers at any byte) and decides when the accumulated text
//! holds a finished reply:
//!
//! ```text
//! Accumulating ──instruction marker──▶ MarkerFound ──end condition──▶ Trimmed
//! ```
//!
//! With [`CompletionStrategy::Punctuation`] the marker is optional and the
//! parser may go straight from `Accumulating` to `Trimmed`.

use std::sync::Arc;

use regex::Regex;
use serde::Serialize;

use rk_domain::config::{CompletionConfig, CompletionStrategy};

use crate::tokenizer::Tokenizer;

/// Label that some models emit before the reply body.
const ASSISTANT_LABEL: &str = "Assistant:";

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Longest escape sequence held back while waiting for its terminator.
const MAX_ESCAPE_CARRY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserState {
    Accumulating,
    MarkerFound,
    Trimmed,
}

/// Why a reply was considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    EndMarker,
    Punctuation,
    Length,
    /// The response deadline elapsed; the text is the fallback reply.
    TimedOut,
}

impl Completion {
    pub fn as_str(self) -> &'static str {
        match self {
            Completion::EndMarker => "end_marker",
            Completion::Punctuation => "punctuation",
            Completion::Length => "length",
            Completion::TimedOut => "timed_out",
        }
    }
}

/// A finished, cleaned reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub text: String,
    pub completion: Completion,
}

pub struct CompletionParser {
    config: CompletionConfig,
    max_reply_tokens: usize,
    tokenizer: Option<Arc<Tokenizer>>,
    ansi: Regex,
    state: ParserState,
    text: String,
    /// Undecoded tail of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    /// Unterminated escape sequence held back from `text`.
    escape_carry: String,
}

impl CompletionParser {
    /// `ansi` strips terminal control sequences from decoded output.
    pub fn new(config: CompletionConfig, ansi: Regex) -> Self {
        let max_reply_tokens = config.max_reply_tokens;
        Self {
            config,
            max_reply_tokens,
            tokenizer: None,
            ansi,
            state: ParserState::Accumulating,
            text: String::new(),
            pending: Vec::new(),
            escape_carry: String::new(),
        }
    }

    /// Use `tokenizer` for the length threshold instead of word counts.
    pub fn with_tokenizer(mut self, tokenizer: Arc<Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Lower the length threshold (never raises it above the configured one).
    pub fn with_max_reply_tokens(mut self, max: usize) -> Self {
        self.max_reply_tokens = self.max_reply_tokens.min(max.max(1));
        self
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Everything accumulated so far, escape codes removed.
    pub fn accumulated(&self) -> &str {
        &self.text
    }

    /// Feed one chunk of raw output. Returns the reply once, on the chunk
    /// that completes it; later chunks are ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Finished> {
        if self.state == ParserState::Trimmed {
            return None;
        }

        let decoded = self.decode(chunk);
        let cleaned = self.strip_escapes(decoded);
        self.text.push_str(&cleaned);

        if self.state == ParserState::Accumulating
            && !self.config.instruction_marker.is_empty()
            && self.text.contains(self.config.instruction_marker.as_str())
        {
            self.state = ParserState::MarkerFound;
        }

        let finished = self.check_complete()?;
        self.state = ParserState::Trimmed;
        Some(finished)
    }

    fn check_complete(&self) -> Option<Finished> {
        let marker_seen = self.state == ParserState::MarkerFound;
        match self.config.strategy {
            CompletionStrategy::Marker if !marker_seen => None,
            CompletionStrategy::Marker => {
                let after = self.after_marker();
                if self.find_end_marker(after).is_some() {
                    let body = clean_reply(&self.text, &self.config)?;
                    return Some(Finished {
                        text: body,
                        completion: Completion::EndMarker,
                    });
                }
                if let Some(done) = self.check_length() {
                    return Some(done);
                }
                if self.config.punctuation_fallback {
                    let body = clean_body(after, &self.config.end_markers);
                    if body.ends_with(SENTENCE_TERMINATORS) {
                        return Some(Finished {
                            text: body.to_owned(),
                            completion: Completion::Punctuation,
                        });
                    }
                }
                None
            }
            CompletionStrategy::Punctuation => {
                if let Some(done) = self.check_length() {
                    return Some(done);
                }
                let body = clean_body(self.after_marker(), &self.config.end_markers);
                let end = body.rfind(SENTENCE_TERMINATORS)?;
                let sentence = body[..=end].trim();
                if sentence.is_empty() {
                    return None;
                }
                Some(Finished {
                    text: sentence.to_owned(),
                    completion: Completion::Punctuation,
                })
            }
        }
    }

    fn check_length(&self) -> Option<Finished> {
        let body = clean_body(self.after_marker(), &self.config.end_markers);
        let tokens = match &self.tokenizer {
            Some(tok) => tok.count(body),
            None => body.split_whitespace().count(),
        };
        if tokens < self.max_reply_tokens {
            return None;
        }
        Some(Finished {
            text: ensure_terminal_punctuation(body),
            completion: Completion::Length,
        })
    }

    /// Text after the last instruction marker, or all text when there is none.
    fn after_marker(&self) -> &str {
        let marker = self.config.instruction_marker.as_str();
        if marker.is_empty() {
            return &self.text;
        }
        match self.text.rfind(marker) {
            Some(idx) => &self.text[idx + marker.len()..],
            None => &self.text,
        }
    }

    fn find_end_marker(&self, text: &str) -> Option<usize> {
        self.config
            .end_markers
            .iter()
            .filter(|m| !m.is_empty())
            .filter_map(|m| text.find(m.as_str()))
            .min()
    }

    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn strip_escapes(&mut self, decoded: String) -> String {
        let mut joined = std::mem::take(&mut self.escape_carry);
        joined.push_str(&decoded);

        // Hold back a trailing escape sequence that has not terminated yet.
        if let Some(esc) = joined.rfind('\x1b') {
            let tail = &joined[esc..];
            let complete = self.ansi.find(tail).is_some_and(|m| m.start() == 0);
            if !complete && tail.len() <= MAX_ESCAPE_CARRY {
                self.escape_carry = tail.to_owned();
                joined.truncate(esc);
            }
        }

        self.ansi.replace_all(&joined, "").into_owned()
    }
}

/// Pattern for CSI terminal control sequences (colours, cursor movement).
pub fn ansi_pattern() -> Result<Regex, regex::Error> {
    Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]")
}

/// Extract the reply from raw accumulated output.
///
/// Takes the text after the last instruction marker and cuts it at the
/// first end / next-turn marker. When nothing follows the marker, the text
/// before it is used instead. Returns `None` when the result is empty.
pub fn clean_reply(raw: &str, config: &CompletionConfig) -> Option<String> {
    let marker = config.instruction_marker.as_str();
    let body = match (marker.is_empty(), raw.rfind(marker)) {
        (false, Some(idx)) => {
            let after = clean_body(&raw[idx + marker.len()..], &config.end_markers);
            if after.is_empty() {
                clean_body(&raw[..idx], &config.end_markers)
            } else {
                after
            }
        }
        _ => clean_body(raw, &config.end_markers),
    };
    if body.is_empty() {
        return None;
    }
    Some(ensure_terminal_punctuation(body))
}

/// Cut at the first end marker, drop a leading assistant label, trim.
fn clean_body<'a>(text: &'a str, end_markers: &[String]) -> &'a str {
    let cut = end_markers
        .iter()
        .filter(|m| !m.is_empty())
        .filter_map(|m| text.find(m.as_str()))
        .min()
        .unwrap_or(text.len());
    let body = text[..cut].trim();
    body.strip_prefix(ASSISTANT_LABEL).unwrap_or(body).trim()
}

/// Append a period unless the text already ends a sentence.
pub fn ensure_terminal_punctuation(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.ends_with(SENTENCE_TERMINATORS) {
        trimmed.to_owned()
    } else {
        format!("{trimmed}.")
    }
}
