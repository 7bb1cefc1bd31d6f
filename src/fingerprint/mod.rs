//! Fingerprint Builder
//!
//! Two fingerprints are derived from every source file: a winnowed
//! k-gram token fingerprint (with source positions, for similarity and
//! match reconstruction) and a set of AST subtree hashes (for
//! structural similarity). Both are pure functions of the bytes, the
//! language, and the engine configuration, hashed with a stable seed
//! baked into the engine version.

pub mod ast;
pub mod winnow;

pub use ast::ast_fingerprint;
pub use winnow::token_fingerprint;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Stable seed for all fingerprint hashing. Changing it is an engine
/// version change: every cached fingerprint becomes stale.
pub const HASH_SEED: u64 = 0x00c0_de91_a67e_0001;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Base of the Karp-Rabin rolling hash over token-kind codes.
pub(crate) const ROLL_BASE: u64 = 1_000_003;

/// Seeded FNV-1a over raw bytes.
pub(crate) fn stable_hash(bytes: &[u8]) -> u64 {
    let mut h = FNV_OFFSET ^ HASH_SEED;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Fold a 64-bit word (e.g. a child hash) into an FNV chain.
pub(crate) fn mix(mut h: u64, word: u64) -> u64 {
    for b in word.to_le_bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Namespace tag separating token and AST hashes in the inverted index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintKind {
    Token,
    Ast,
}

/// Inclusive 1-indexed line range of a fingerprinted region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub start_line: u32,
    pub end_line: u32,
}

/// Winnowed token fingerprint of one file.
///
/// Every hash maps to the non-empty list of spans at which it was
/// emitted, in encounter order. `total_kgrams` counts emissions before
/// deduplication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenFingerprint {
    pub positions: HashMap<u64, Vec<LineSpan>>,
    pub total_kgrams: usize,
}

impl TokenFingerprint {
    pub fn hashes(&self) -> impl Iterator<Item = u64> + '_ {
        self.positions.keys().copied()
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.positions.contains_key(&hash)
    }

    /// Number of distinct hashes.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn intersection_count(&self, other: &Self) -> usize {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.hashes().filter(|h| large.contains(*h)).count()
    }

    /// Distinct hashes present in both fingerprints.
    pub fn shared_hashes(&self, other: &Self) -> Vec<u64> {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.hashes().filter(|h| large.contains(*h)).collect()
    }
}

/// AST subtree fingerprint of one file.
///
/// `parse_failed` marks the empty fingerprint recorded when the
/// grammar could not produce an error-free tree; it forces an AST
/// similarity of zero without blocking the token path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AstFingerprint {
    pub hashes: HashSet<u64>,
    pub total_subtrees: usize,
    #[serde(default)]
    pub parse_failed: bool,
}

impl AstFingerprint {
    pub fn unparsed() -> Self {
        Self {
            hashes: HashSet::new(),
            total_subtrees: 0,
            parse_failed: true,
        }
    }
}

impl AstFingerprint {
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn intersection_count(&self, other: &Self) -> usize {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.hashes.iter().filter(|h| large.hashes.contains(h)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_hash_is_seeded_and_deterministic() {
        assert_eq!(stable_hash(b"<id>"), stable_hash(b"<id>"));
        assert_ne!(stable_hash(b"<id>"), stable_hash(b"<num>"));
        assert_ne!(stable_hash(b""), 0);
    }

    #[test]
    fn mix_depends_on_order() {
        let h = stable_hash(b"node");
        assert_ne!(mix(mix(h, 1), 2), mix(mix(h, 2), 1));
    }

    #[test]
    fn intersection_counting() {
        let mut a = TokenFingerprint::default();
        let mut b = TokenFingerprint::default();
        let span = LineSpan { start_line: 1, end_line: 1 };
        for h in [1u64, 2, 3] {
            a.positions.insert(h, vec![span]);
        }
        for h in [2u64, 3, 4, 5] {
            b.positions.insert(h, vec![span]);
        }
        assert_eq!(a.intersection_count(&b), 2);
        assert_eq!(b.intersection_count(&a), 2);
        let mut shared = a.shared_hashes(&b);
        shared.sort_unstable();
        assert_eq!(shared, vec![2, 3]);
    }
}
