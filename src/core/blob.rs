//! Content blob type: the unit of stored file content.
//!
//! A `Blob` is either `Text` (valid UTF-8, diffed line-by-line) or `Binary`
//! (opaque bytes, always replaced wholesale, never line-diffed). Classification
//! mirrors the heuristic used by `core::scan`: any file that round-trips
//! through `String::from_utf8` cleanly is text.

use sha2::{Digest, Sha256};
use std::fmt;

/// Whether a blob's bytes are treated as text or opaque binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobKind {
    Text,
    Binary,
}

/// Content of a single file at a single point in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub kind: BlobKind,
    pub bytes: Vec<u8>,
}

/// Bytes sniffed from the head of a file when classifying it.
const SNIFF_LEN: usize = 8 * 1024;
/// Above this fraction of non-printable bytes in the sniffed window, the
/// content is declared binary.
const NON_PRINTABLE_THRESHOLD: f64 = 0.30;

/// Classifies bytes as text or binary by sniffing up to the first 8 KiB:
/// binary if any NUL byte appears, or if more than 30% of the sniffed bytes
/// fall outside printable-ASCII / common whitespace. A classification that
/// also fails UTF-8 validation is always binary, regardless of the sniff,
/// since text blobs are decoded as UTF-8.
pub fn classify(bytes: &[u8]) -> BlobKind {
    let window = &bytes[..bytes.len().min(SNIFF_LEN)];
    if window.contains(&0) {
        return BlobKind::Binary;
    }
    let non_printable = window
        .iter()
        .filter(|&&b| !(b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7e).contains(&b)))
        .count();
    if window.is_empty() {
        return if std::str::from_utf8(bytes).is_ok() {
            BlobKind::Text
        } else {
            BlobKind::Binary
        };
    }
    let ratio = non_printable as f64 / window.len() as f64;
    if ratio > NON_PRINTABLE_THRESHOLD {
        return BlobKind::Binary;
    }
    if std::str::from_utf8(bytes).is_ok() {
        BlobKind::Text
    } else {
        BlobKind::Binary
    }
}

impl Blob {
    /// Builds a blob from raw bytes, classifying it as text or binary per
    /// the 8 KiB sniff heuristic.
    pub fn from_bytes(bytes: Vec<u8>) -> Blob {
        let kind = classify(&bytes);
        Blob { kind, bytes }
    }

    pub fn is_text(&self) -> bool {
        self.kind == BlobKind::Text
    }

    /// Text content as `&str`; panics if called on a binary blob. Callers
    /// must check `is_text()` first — mirrors `core::diff`'s precondition.
    pub fn as_text(&self) -> &str {
        std::str::from_utf8(&self.bytes).expect("Blob::as_text called on a binary blob")
    }

    /// Hex-encoded SHA-256 digest of the blob's bytes, used for content
    /// addressing and binary-equality / rename-similarity checks.
    pub fn hash(&self) -> String {
        hash_bytes(&self.bytes)
    }
}

impl fmt::Display for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BlobKind::Text => write!(f, "Blob(text, {} bytes)", self.bytes.len()),
            BlobKind::Binary => write!(f, "Blob(binary, {} bytes)", self.bytes.len()),
        }
    }
}

/// Hex-encoded SHA-256 digest of arbitrary bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_valid_utf8_as_text() {
        let blob = Blob::from_bytes(b"hello world\n".to_vec());
        assert_eq!(blob.kind, BlobKind::Text);
        assert_eq!(blob.as_text(), "hello world\n");
    }

    #[test]
    fn test_classifies_invalid_utf8_as_binary() {
        let blob = Blob::from_bytes(vec![0xff, 0xfe, 0x00, 0x01]);
        assert_eq!(blob.kind, BlobKind::Binary);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = Blob::from_bytes(b"same content".to_vec());
        let b = Blob::from_bytes(b"same content".to_vec());
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_differs_on_different_content() {
        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_nul_byte_forces_binary_even_if_otherwise_printable() {
        let mut bytes = b"plain text".to_vec();
        bytes.push(0);
        bytes.extend_from_slice(b"more text");
        assert_eq!(classify(&bytes), BlobKind::Binary);
    }

    #[test]
    fn test_mostly_nonprintable_is_binary() {
        let bytes: Vec<u8> = (0..200).map(|i| (i % 256) as u8).collect();
        assert_eq!(classify(&bytes), BlobKind::Binary);
    }

    #[test]
    fn test_classification_stable_across_calls() {
        let bytes = b"fn main() {}\n".to_vec();
        assert_eq!(classify(&bytes), classify(&bytes));
    }
}
