//! Approximate tokenizer.
//!
//! Whole-word vocabulary lookup with a per-character fallback. This is only
//! good enough for length estimates; it does not reproduce any real subword
//! algorithm.

use std::collections::HashMap;
use std::path::Path;

use rk_domain::error::{Error, Result};

pub const UNK_ID: u32 = 0;
pub const BOS_ID: u32 = 1;
pub const EOS_ID: u32 = 2;
pub const LF_ID: u32 = 13;

const SPECIAL_TOKENS: [(&str, u32); 4] = [
    ("<unk>", UNK_ID),
    ("<s>", BOS_ID),
    ("</s>", EOS_ID),
    ("<0x0A>", LF_ID),
];

#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    vocab: HashMap<String, u32>,
    inverse: HashMap<u32, String>,
    add_bos: bool,
}

impl Tokenizer {
    /// Tokenizer without a vocabulary: [`Tokenizer::count`] falls back to
    /// whitespace-separated words.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a `token -> id` JSON map.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let vocab: HashMap<String, u32> = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("vocabulary {}: {e}", path.display())))?;
        let tokenizer = Self::from_vocab(vocab);
        tracing::info!(tokens = tokenizer.vocab.len(), path = %path.display(), "loaded vocabulary");
        Ok(tokenizer)
    }

    pub fn from_vocab(mut vocab: HashMap<String, u32>) -> Self {
        for (token, id) in SPECIAL_TOKENS {
            vocab.entry(token.to_owned()).or_insert(id);
        }
        let inverse = vocab.iter().map(|(t, id)| (*id, t.clone())).collect();
        Self {
            vocab,
            inverse,
            add_bos: true,
        }
    }

    pub fn has_vocab(&self) -> bool {
        !self.vocab.is_empty()
    }

    /// Encode text to ids. Words missing from the vocabulary are encoded
    /// character by character, with `<unk>` for unknown characters.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let mut ids = Vec::new();
        if self.add_bos {
            ids.push(BOS_ID);
        }
        for word in text.split_whitespace() {
            if let Some(id) = self.vocab.get(word) {
                ids.push(*id);
                continue;
            }
            let mut buf = [0u8; 4];
            for ch in word.chars() {
                let id = self
                    .vocab
                    .get(&*ch.encode_utf8(&mut buf))
                    .copied()
                    .unwrap_or(UNK_ID);
                ids.push(id);
            }
        }
        ids
    }

    /// Decode ids back to text, skipping BOS/EOS and unknown ids.
    pub fn decode(&self, ids: &[u32]) -> String {
        let mut out = String::new();
        for id in ids {
            match *id {
                BOS_ID | EOS_ID => {}
                LF_ID => out.push('\n'),
                other => {
                    if let Some(token) = self.inverse.get(&other) {
                        out.push_str(token);
                    }
                }
            }
        }
        out.trim().to_owned()
    }

    /// Approximate token count of `text`, excluding BOS.
    pub fn count(&self, text: &str) -> usize {
        if !self.has_vocab() {
            return text.split_whitespace().count();
        }
        let ids = self.encode(text);
        if self.add_bos {
            ids.len().saturating_sub(1)
        } else {
            ids.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tokenizer {
        let vocab = [("hello", 100u32), ("world", 101), ("h", 5), ("i", 6)]
            .into_iter()
            .map(|(t, id)| (t.to_owned(), id))
            .collect();
        Tokenizer::from_vocab(vocab)
    }

    #[test]
    fn encodes_known_words_with_bos() {
        assert_eq!(sample().encode("hello world"), vec![BOS_ID, 100, 101]);
    }

    #[test]
    fn falls_back_to_characters() {
        assert_eq!(sample().encode("hi!"), vec![BOS_ID, 5, 6, UNK_ID]);
    }

    #[test]
    fn decode_skips_specials() {
        let tok = sample();
        assert_eq!(tok.decode(&[BOS_ID, 100, LF_ID, 101, EOS_ID]), "hello\nworld");
    }

    #[test]
    fn count_without_vocab_uses_words() {
        assert_eq!(Tokenizer::empty().count("one two  three"), 3);
        assert_eq!(sample().count("hello hi"), 3);
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(Tokenizer::load(&path).is_err());
    }
}
