//! Pairwise result types
//!
//! A comparison is always keyed on the canonical ordered pair of
//! content hashes so that caching and persistence are symmetric.

use crate::source::ContentHash;
use serde::{Deserialize, Serialize};

/// Canonicalized unordered pair of content hashes (`a <= b`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    a: ContentHash,
    b: ContentHash,
}

impl PairKey {
    pub fn new(x: ContentHash, y: ContentHash) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    pub fn a(&self) -> &ContentHash {
        &self.a
    }

    pub fn b(&self) -> &ContentHash {
        &self.b
    }

    pub fn involves(&self, hash: &ContentHash) -> bool {
        &self.a == hash || &self.b == hash
    }
}

/// A line-range correspondence between file A and file B, grounded in
/// at least one shared token-fingerprint hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub a_start: u32,
    pub a_end: u32,
    pub b_start: u32,
    pub b_end: u32,
}

impl Match {
    /// Wire form used by the persistent result store.
    pub fn as_tuple(&self) -> [u32; 4] {
        [self.a_start, self.a_end, self.b_start, self.b_end]
    }

    pub fn from_tuple(t: [u32; 4]) -> Self {
        Self {
            a_start: t[0],
            a_end: t[1],
            b_start: t[2],
            b_end: t[3],
        }
    }
}

/// Outcome of comparing one pair of files.
///
/// `matches` are sorted by `a_start` ascending with pairwise disjoint
/// A-ranges. `reason` is set when a tokenize failure forced the zero
/// result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairResult {
    pub key: PairKey,
    pub token_similarity: f64,
    pub ast_similarity: f64,
    pub matches: Vec<Match>,
    pub reason: Option<String>,
}

impl PairResult {
    pub fn new(
        key: PairKey,
        token_similarity: f64,
        ast_similarity: f64,
        matches: Vec<Match>,
    ) -> Self {
        Self {
            key,
            token_similarity,
            ast_similarity,
            matches,
            reason: None,
        }
    }

    /// The zero result written for pairs where one side produced no
    /// token fingerprint.
    pub fn failed(key: PairKey, reason: impl Into<String>) -> Self {
        Self {
            key,
            token_similarity: 0.0,
            ast_similarity: 0.0,
            matches: Vec::new(),
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(label: &str) -> ContentHash {
        ContentHash::of_bytes(label.as_bytes())
    }

    #[test]
    fn pair_key_is_canonical() {
        let (x, y) = (hash("x"), hash("y"));
        let k1 = PairKey::new(x.clone(), y.clone());
        let k2 = PairKey::new(y.clone(), x.clone());
        assert_eq!(k1, k2);
        assert!(k1.a() <= k1.b());
        assert!(k1.involves(&x));
        assert!(k1.involves(&y));
        assert!(!k1.involves(&hash("z")));
    }

    #[test]
    fn self_pair_allowed() {
        let x = hash("x");
        let k = PairKey::new(x.clone(), x.clone());
        assert_eq!(k.a(), k.b());
    }

    #[test]
    fn match_tuple_round_trip() {
        let m = Match { a_start: 1, a_end: 4, b_start: 10, b_end: 13 };
        assert_eq!(Match::from_tuple(m.as_tuple()), m);
    }
}
