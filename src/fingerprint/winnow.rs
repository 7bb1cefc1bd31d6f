//! Winnowed k-gram token fingerprints
//!
//! A window of `k` normalized token kinds is hashed with a Karp-Rabin
//! rolling hash; over every `w` consecutive k-gram hashes the minimum
//! is selected (rightmost on ties) and emitted once at its canonical
//! position. Any substring of `w + k - 1` shared normalized tokens is
//! therefore guaranteed to contribute at least one shared hash.

use crate::adapter::Token;
use crate::config::EngineConfig;
use crate::fingerprint::{stable_hash, LineSpan, TokenFingerprint, ROLL_BASE};

/// Build the token fingerprint for one normalized token stream.
///
/// Streams shorter than `k` tokens produce an empty fingerprint.
/// Streams of at most `w` k-grams keep every k-gram hash.
pub fn token_fingerprint(
    tokens: &[Token],
    line_count: u32,
    config: &EngineConfig,
) -> TokenFingerprint {
    let k = config.k.max(1);
    if tokens.len() < k {
        return TokenFingerprint::default();
    }

    let codes: Vec<u64> = tokens.iter().map(|t| stable_hash(t.kind.as_bytes())).collect();
    let grams = roll(&codes, k);
    let spans: Vec<LineSpan> = (0..grams.len())
        .map(|i| span_of(&tokens[i..i + k], line_count))
        .collect();

    let w = config.w.max(1);
    let mut fp = TokenFingerprint::default();

    // Below one full window the density bound is moot: keep every
    // k-gram so short files still match each other line for line.
    if grams.len() <= w {
        for (gram, span) in grams.iter().zip(&spans) {
            fp.positions.entry(*gram).or_default().push(*span);
            fp.total_kgrams += 1;
        }
        return fp;
    }

    let mut last_selected: Option<usize> = None;

    for start in 0..=grams.len() - w {
        // Rightmost minimum: `<=` keeps later ties.
        let mut best = start;
        for i in start + 1..start + w {
            if grams[i] <= grams[best] {
                best = i;
            }
        }
        if last_selected != Some(best) {
            fp.positions.entry(grams[best]).or_default().push(spans[best]);
            fp.total_kgrams += 1;
            last_selected = Some(best);
        }
    }

    fp
}

/// Karp-Rabin rolling hashes of every k-gram of kind codes, wrapping
/// 64-bit arithmetic.
fn roll(codes: &[u64], k: usize) -> Vec<u64> {
    let mut pow = 1u64;
    for _ in 0..k - 1 {
        pow = pow.wrapping_mul(ROLL_BASE);
    }

    let mut grams = Vec::with_capacity(codes.len() - k + 1);
    let mut h = 0u64;
    for &c in &codes[..k] {
        h = h.wrapping_mul(ROLL_BASE).wrapping_add(c);
    }
    grams.push(h);

    for i in k..codes.len() {
        h = h
            .wrapping_sub(codes[i - k].wrapping_mul(pow))
            .wrapping_mul(ROLL_BASE)
            .wrapping_add(codes[i]);
        grams.push(h);
    }

    grams
}

fn span_of(window: &[Token], line_count: u32) -> LineSpan {
    let start_line = window[0].start_line;
    let end_line = window[window.len() - 1].end_line;
    let end_line = if line_count > 0 { end_line.min(line_count) } else { end_line };
    LineSpan {
        start_line,
        end_line: end_line.max(start_line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Adapter, Language};

    fn fingerprint(source: &str) -> TokenFingerprint {
        let adapter = Adapter::new(Language::Python);
        let tokens = adapter.tokenize(source.as_bytes()).unwrap();
        let lines = source.lines().count() as u32;
        token_fingerprint(&tokens, lines, &EngineConfig::default())
    }

    #[test]
    fn deterministic_for_identical_input() {
        let src = "def f(x):\n    return x + 1\n";
        assert_eq!(fingerprint(src), fingerprint(src));
    }

    #[test]
    fn rename_invariant() {
        let a = fingerprint("def foo(x): return x*2\n");
        let b = fingerprint("def bar(y): return y*2\n");
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn whitespace_and_comments_invariant() {
        let a = fingerprint("def f(x):\n    return x + 1\n");
        let b = fingerprint("def f(x):   # doubles? no\n\n    return x + 1\n# done\n");
        assert_eq!(a.positions.keys().collect::<std::collections::HashSet<_>>(),
                   b.positions.keys().collect::<std::collections::HashSet<_>>());
    }

    #[test]
    fn short_stream_yields_empty() {
        // Fewer than k tokens: nothing to hash.
        let fp = fingerprint("x\n");
        assert!(fp.is_empty());
        assert_eq!(fp.total_kgrams, 0);
    }

    #[test]
    fn short_file_still_fingerprints() {
        // At least k tokens but at most w k-grams: everything is kept.
        let fp = fingerprint("def foo(x): return x*2\n");
        assert!(!fp.is_empty());
        assert_eq!(fp.total_kgrams, fp.positions.values().map(Vec::len).sum::<usize>());
    }

    #[test]
    fn positions_cover_every_hash() {
        let src = "def f(a, b):\n    c = a + b\n    d = a - b\n    return c * d\n";
        let fp = fingerprint(src);
        assert!(fp.total_kgrams >= fp.len());
        let lines = src.lines().count() as u32;
        for spans in fp.positions.values() {
            assert!(!spans.is_empty());
            for span in spans {
                assert!(span.start_line >= 1);
                assert!(span.start_line <= span.end_line);
                assert!(span.end_line <= lines);
            }
            // Encounter order is ascending by start line.
            for pair in spans.windows(2) {
                assert!(pair[0].start_line <= pair[1].start_line);
            }
        }
    }

    #[test]
    fn winnowing_guarantee() {
        // Two files sharing a contiguous run of >= w + k - 1 normalized
        // tokens must share at least one hash.
        let shared = "q = a + b * c - d / e + f * g - h\n";
        let a = format!("x1 = 1\n{shared}z1 = 2\n");
        let b = format!("first = \"other\"\nsecond = [1, 2, 3]\n{shared}tail = None\n");
        let fa = fingerprint(&a);
        let fb = fingerprint(&b);
        assert!(fa.intersection_count(&fb) >= 1);
    }

    #[test]
    fn repeated_kgrams_accumulate_positions() {
        // The same statement run twice re-emits the same hash at a new
        // canonical position.
        let body = "a = b + c * d - e + f\n";
        let src = format!("{body}{body}{body}{body}");
        let fp = fingerprint(&src);
        assert!(fp.positions.values().any(|spans| spans.len() >= 2));
    }

    #[test]
    fn rightmost_tie_selection() {
        let codes = vec![7u64, 7, 7, 7, 7, 7, 7, 7];
        let grams = roll(&codes, 2);
        // All k-grams hash identically; each window must pick its last.
        assert!(grams.windows(2).all(|p| p[0] == p[1]));
    }
}
