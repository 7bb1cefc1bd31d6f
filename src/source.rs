//! Source file views and content addressing
//!
//! Every file entering the engine is keyed by the BLAKE3 digest of its
//! exact bytes, hex encoded, with no language or path mixed in. The
//! engine itself only ever holds read-only views registered here.

use crate::adapter::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Hex-encoded 256-bit digest of a file's raw bytes.
///
/// Ordering is lexicographic over the hex string; pair keys are
/// canonicalized with this order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash raw file bytes.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// Wrap an already-computed hex digest (e.g. from a job record).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ingested file: immutable bytes plus the derived attributes the
/// engine needs.
#[derive(Debug)]
pub struct SourceFile {
    pub content_hash: ContentHash,
    pub language: Language,
    pub line_count: u32,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn ingest(bytes: Vec<u8>, language: Language) -> Self {
        let content_hash = ContentHash::of_bytes(&bytes);
        let line_count = count_lines(&bytes);
        Self {
            content_hash,
            language,
            line_count,
            bytes,
        }
    }
}

fn count_lines(bytes: &[u8]) -> u32 {
    if bytes.is_empty() {
        return 0;
    }
    let newlines = bytes.iter().filter(|&&b| b == b'\n').count() as u32;
    if bytes.ends_with(b"\n") {
        newlines
    } else {
        newlines + 1
    }
}

/// Read-only views of the files currently reachable by the engine,
/// keyed by content hash.
///
/// The task runner registers a job's files before analysis and removes
/// them when the job ends; fingerprints outlive the views in the store.
#[derive(Default)]
pub struct SourceRegistry {
    files: RwLock<HashMap<ContentHash, Arc<SourceFile>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, file: SourceFile) -> Arc<SourceFile> {
        let file = Arc::new(file);
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.insert(file.content_hash.clone(), Arc::clone(&file));
        file
    }

    pub fn resolve(&self, hash: &ContentHash) -> Option<Arc<SourceFile>> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.get(hash).cloned()
    }

    pub fn remove(&self, hash: &ContentHash) {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.remove(hash);
    }

    pub fn len(&self) -> usize {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_content_only() {
        let a = ContentHash::of_bytes(b"def f(x):\n    return x + 1\n");
        let b = ContentHash::of_bytes(b"def f(x):\n    return x + 1\n");
        let c = ContentHash::of_bytes(b"def f(x):\n    return x + 2\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn line_counting() {
        assert_eq!(count_lines(b""), 0);
        assert_eq!(count_lines(b"one"), 1);
        assert_eq!(count_lines(b"one\n"), 1);
        assert_eq!(count_lines(b"one\ntwo"), 2);
        assert_eq!(count_lines(b"one\ntwo\n"), 2);
    }

    #[test]
    fn registry_round_trip() {
        let registry = SourceRegistry::new();
        let file = SourceFile::ingest(b"print(1)\n".to_vec(), Language::Python);
        let hash = file.content_hash.clone();
        registry.register(file);

        let view = registry.resolve(&hash).unwrap();
        assert_eq!(view.line_count, 1);

        registry.remove(&hash);
        assert!(registry.resolve(&hash).is_none());
    }
}
