//! Content normalization and fingerprinting.
//!
//! Cleans raw row text deterministically and derives the SHA-256
//! fingerprint used as the request cache key.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Cleaned text and its content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedText {
    pub cleaned_text: String,
    /// Lowercase hex SHA-256 of `cleaned_text`.
    pub hash: String,
}

impl NormalizedText {
    pub fn is_empty(&self) -> bool {
        self.cleaned_text.is_empty()
    }
}

/// Normalize raw input text.
///
/// Control characters are dropped, every run of whitespace becomes a
/// single space, and the result is trimmed. The hash depends only on
/// the cleaned text.
pub fn normalize(raw: &str) -> NormalizedText {
    let cleaned_text = clean(raw);
    let hash = fingerprint(&cleaned_text);
    NormalizedText { cleaned_text, hash }
}

fn clean(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut pending_space = false;

    for ch in raw.chars() {
        if ch.is_whitespace() {
            pending_space = true;
        } else if ch.is_control() || is_invisible(ch) {
            continue;
        } else {
            if pending_space && !cleaned.is_empty() {
                cleaned.push(' ');
            }
            pending_space = false;
            cleaned.push(ch);
        }
    }

    cleaned
}

/// Zero-width characters and the byte order mark.
fn is_invisible(ch: char) -> bool {
    matches!(ch, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

/// Hex-encoded SHA-256 digest of the text.
pub fn fingerprint(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let a = normalize("The sky is blue.");
        let b = normalize("The sky is blue.");
        assert_eq!(a, b);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn test_whitespace_variants_share_hash() {
        let a = normalize("  The sky\tis\n\nblue.  ");
        let b = normalize("The sky is blue.");
        assert_eq!(a.cleaned_text, "The sky is blue.");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_control_characters_removed() {
        let a = normalize("Hello\u{0007} world\u{200B}!");
        assert_eq!(a.cleaned_text, "Hello world!");
    }

    #[test]
    fn test_distinct_text_distinct_hash() {
        let a = normalize("The sky is blue.");
        let b = normalize("The sky is Blue.");
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_empty_input() {
        let a = normalize(" \n\t ");
        assert!(a.is_empty());
        assert_eq!(a.hash, fingerprint(""));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
