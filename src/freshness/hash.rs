//! Content hashing using blake3.
//!
//! A module's fingerprint is the hash of its raw text. The registry compares
//! fingerprints to skip reparsing unchanged files, and patch requests may carry
//! the fingerprint they were issued against to detect stale node ids.

use std::fmt;
use std::path::Path;

/// A 256-bit content hash (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash a module's raw text.
    pub fn of(text: &str) -> Self {
        Self(*blake3::hash(text.as_bytes()).as_bytes())
    }

    /// Hash a file's contents. `None` if the file cannot be read.
    pub fn of_file(path: &Path) -> Option<Self> {
        let bytes = std::fs::read(path).ok()?;
        Some(Self(*blake3::hash(&bytes).as_bytes()))
    }

    /// Convert to hex string.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// First 16 hex chars, the form sent to the browser runtime.
    pub fn short(self) -> String {
        hex::encode(&self.0[..8])
    }

    /// Check a fingerprint received from a client against this hash.
    ///
    /// Accepts both the full and the short hex form.
    pub fn matches_hex(self, hex_str: &str) -> bool {
        let hex_str = hex_str.trim().to_ascii_lowercase();
        match hex_str.len() {
            64 => self.to_hex() == hex_str,
            16 => self.short() == hex_str,
            _ => false,
        }
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_display() {
        let hash = ContentHash([0xab; 32]);
        assert_eq!(format!("{}", hash), "abababababababab");
    }

    #[test]
    fn test_same_text_same_hash() {
        assert_eq!(ContentHash::of("<A />"), ContentHash::of("<A />"));
        assert_ne!(ContentHash::of("<A />"), ContentHash::of("<B />"));
    }

    #[test]
    fn test_matches_hex_forms() {
        let hash = ContentHash::of("const a = 1;");
        assert!(hash.matches_hex(&hash.to_hex()));
        assert!(hash.matches_hex(&hash.short()));
        assert!(hash.matches_hex(&hash.short().to_ascii_uppercase()));
        assert!(!hash.matches_hex("deadbeef"));
    }

    #[test]
    fn test_of_file_matches_of_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("App.tsx");
        fs::write(&path, "<App />").unwrap();
        assert_eq!(ContentHash::of_file(&path), Some(ContentHash::of("<App />")));
        assert_eq!(ContentHash::of_file(&dir.path().join("missing.tsx")), None);
    }
}
