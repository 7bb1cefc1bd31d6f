//! Similarity Engine
//!
//! `compare` is the heart of the analysis: canonicalize the pair,
//! consult the result cache, load or build both fingerprints, score
//! token similarity (Jaccard over winnowed hashes), early-exit below
//! the candidate threshold, score AST similarity, and reconstruct the
//! merged match regions. One worker computes a given pair at a time;
//! everyone else waits on the pair flight and then hits the cache.

pub mod candidates;
pub mod matches;

pub use candidates::{CandidateSelector, Scope};

use crate::adapter::Adapter;
use crate::config::EngineConfig;
use crate::fingerprint::{ast_fingerprint, token_fingerprint, AstFingerprint, TokenFingerprint};
use crate::pair::{PairKey, PairResult};
use crate::source::{ContentHash, SourceRegistry};
use crate::store::Store;
use crate::{Error, Result};
use std::sync::Arc;

pub struct SimilarityEngine {
    store: Arc<Store>,
    sources: Arc<SourceRegistry>,
    config: EngineConfig,
}

enum TokenOutcome {
    Fingerprint(Arc<TokenFingerprint>),
    Failed(String),
}

impl SimilarityEngine {
    pub fn new(store: Arc<Store>, sources: Arc<SourceRegistry>, config: EngineConfig) -> Self {
        Self { store, sources, config }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compare two files by content hash.
    ///
    /// The only error is `FingerprintUnavailable`: a fingerprint can
    /// neither be loaded nor recomputed. Tokenize failures yield a
    /// tagged zero result instead; parse failures zero only the AST
    /// side.
    pub fn compare(&self, a: &ContentHash, b: &ContentHash) -> Result<PairResult> {
        let key = PairKey::new(a.clone(), b.clone());
        if let Some(hit) = self.store.get_pair(&key) {
            return Ok((*hit).clone());
        }

        let flight = self.store.pair_flight(&key);
        let _in_flight = flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(hit) = self.store.get_pair(&key) {
            return Ok((*hit).clone());
        }

        let fp_a = match self.token_fp(key.a())? {
            TokenOutcome::Fingerprint(fp) => fp,
            TokenOutcome::Failed(reason) => {
                return Ok(self.publish(PairResult::failed(key, reason)))
            }
        };
        let fp_b = match self.token_fp(key.b())? {
            TokenOutcome::Fingerprint(fp) => fp,
            TokenOutcome::Failed(reason) => {
                return Ok(self.publish(PairResult::failed(key, reason)))
            }
        };

        let token_sim = token_jaccard(&fp_a, &fp_b);
        if token_sim < self.config.candidate_threshold {
            tracing::debug!(
                token_similarity = token_sim,
                "below candidate threshold, skipping AST comparison"
            );
            return Ok(self.publish(PairResult::new(key, token_sim, 0.0, Vec::new())));
        }

        let ast_a = self.ast_fp(key.a())?;
        let ast_b = self.ast_fp(key.b())?;
        let ast_sim = ast_jaccard(&ast_a, &ast_b);

        let matches = matches::reconstruct(&fp_a, &fp_b, &self.config);
        Ok(self.publish(PairResult::new(key, token_sim, ast_sim, matches)))
    }

    /// Build and index both fingerprints of a file ahead of comparison.
    /// Tokenize and parse failures are tolerated here; they surface
    /// per-pair in `compare`.
    pub fn ensure_indexed(&self, hash: &ContentHash) -> Result<()> {
        match self.token_fp(hash)? {
            TokenOutcome::Fingerprint(_) => {
                self.ast_fp(hash)?;
            }
            TokenOutcome::Failed(reason) => {
                tracing::warn!(file = hash.short(), %reason, "file contributes no fingerprint");
            }
        }
        Ok(())
    }

    fn publish(&self, result: PairResult) -> PairResult {
        (*self.store.put_pair(result)).clone()
    }

    fn token_fp(&self, hash: &ContentHash) -> Result<TokenOutcome> {
        if let Some(fp) = self.store.get_token_fp(hash) {
            return Ok(TokenOutcome::Fingerprint(fp));
        }
        let Some(source) = self.sources.resolve(hash) else {
            return Err(Error::FingerprintUnavailable(hash.short().to_string()));
        };
        let adapter = Adapter::new(source.language);
        match adapter.tokenize(&source.bytes) {
            Ok(tokens) => {
                let fp = token_fingerprint(&tokens, source.line_count, &self.config);
                Ok(TokenOutcome::Fingerprint(self.store.put_token_fp(hash, fp)))
            }
            Err(err) => Ok(TokenOutcome::Failed(err.to_string())),
        }
    }

    fn ast_fp(&self, hash: &ContentHash) -> Result<Arc<AstFingerprint>> {
        if let Some(fp) = self.store.get_ast_fp(hash) {
            return Ok(fp);
        }
        let Some(source) = self.sources.resolve(hash) else {
            return Err(Error::FingerprintUnavailable(hash.short().to_string()));
        };
        let adapter = Adapter::new(source.language);
        match adapter.parse(&source.bytes) {
            Ok(tree) => Ok(self
                .store
                .put_ast_fp(hash, ast_fingerprint(&tree, &self.config))),
            Err(err) => {
                tracing::warn!(file = hash.short(), %err, "parse failed, AST fingerprint empty");
                Ok(self.store.put_ast_fp(hash, AstFingerprint::unparsed()))
            }
        }
    }
}

/// Jaccard coefficient over token hash sets; two empty sets score 0.
fn token_jaccard(a: &TokenFingerprint, b: &TokenFingerprint) -> f64 {
    let shared = a.intersection_count(b);
    let union = a.len() + b.len() - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

/// Jaccard coefficient over AST subtree hashes. A parse-failed side
/// forces 0. Two successfully parsed files that are both too small to
/// yield any qualifying subtree are structurally indistinguishable at
/// this granularity and score 1.
fn ast_jaccard(a: &AstFingerprint, b: &AstFingerprint) -> f64 {
    if a.parse_failed || b.parse_failed {
        return 0.0;
    }
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection_count(b);
    let union = a.len() + b.len() - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Language;
    use crate::config::StoreConfig;
    use crate::source::SourceFile;

    fn engine() -> SimilarityEngine {
        SimilarityEngine::new(
            Arc::new(Store::new(StoreConfig::default())),
            Arc::new(SourceRegistry::new()),
            EngineConfig::default(),
        )
    }

    fn ingest(engine: &SimilarityEngine, source: &str) -> ContentHash {
        let file = SourceFile::ingest(source.as_bytes().to_vec(), Language::Python);
        let hash = file.content_hash.clone();
        engine.sources.register(file);
        hash
    }

    #[test]
    fn identical_files_score_one_with_full_span_match() {
        // S1: bytewise-identical files.
        let engine = engine();
        let src = "def f(x):\n    return x + 1";
        let a = ingest(&engine, src);

        let result = engine.compare(&a, &a).unwrap();
        assert_eq!(result.token_similarity, 1.0);
        assert_eq!(result.ast_similarity, 1.0);
        assert_eq!(result.matches.len(), 1);
        let m = &result.matches[0];
        assert_eq!((m.a_start, m.a_end), (1, 2));
        assert_eq!((m.b_start, m.b_end), (1, 2));
    }

    #[test]
    fn renamed_file_scores_at_least_095() {
        // S2 and the rename-invariance property.
        let engine = engine();
        let a = ingest(&engine, "def foo(x): return x*2\n");
        let b = ingest(&engine, "def bar(y): return y*2\n");

        let result = engine.compare(&a, &b).unwrap();
        assert!(result.token_similarity >= 0.95);
        assert_eq!(result.ast_similarity, 1.0);
    }

    #[test]
    fn unrelated_files_early_exit() {
        // S3: below the candidate threshold nothing else is computed.
        let engine = engine();
        let a = ingest(&engine, "print(\"hello\")\n");
        let b = ingest(&engine, "for i in range(10): pass\n");

        let result = engine.compare(&a, &b).unwrap();
        assert!(result.token_similarity < 0.15);
        assert!(result.ast_similarity < 0.15);
        assert!(result.matches.is_empty());
        // The early exit never touched the AST path.
        assert_eq!(engine.store.stats().ast_fingerprints, 0);
    }

    #[test]
    fn parse_failure_zeroes_ast_only() {
        // S5: one side has a syntax error.
        let engine = engine();
        let good = "def f(x):\n    y = x + 1\n    z = y * 2\n    return y + z + x\n";
        let bad = "def f(x:\n    y = x + 1\n    z = y * 2\n    return y + z + x\n";
        let a = ingest(&engine, good);
        let b = ingest(&engine, bad);

        let result = engine.compare(&a, &b).unwrap();
        assert!(result.token_similarity > 0.15);
        assert!(result.token_similarity.is_finite());
        assert_eq!(result.ast_similarity, 0.0);
        assert!(result.reason.is_none());
    }

    #[test]
    fn comparison_is_symmetric() {
        let engine = engine();
        let a = ingest(&engine, "def f(x):\n    return x + 1\n");
        let b = ingest(&engine, "def f(x):\n    return x + 2\n\ndef g(y):\n    return y\n");

        let forward = engine.compare(&a, &b).unwrap();
        let backward = engine.compare(&b, &a).unwrap();
        assert_eq!(forward.key, backward.key);
        assert_eq!(forward.token_similarity, backward.token_similarity);
        assert_eq!(forward.ast_similarity, backward.ast_similarity);
        assert_eq!(forward.matches, backward.matches);
    }

    #[test]
    fn comparison_is_deterministic_across_engines() {
        let src_a = "def f(a, b):\n    c = a + b\n    d = a - b\n    return c * d\n";
        let src_b = "def g(a, b):\n    c = a + b\n    return c\n";

        let run = || {
            let engine = engine();
            let a = ingest(&engine, src_a);
            let b = ingest(&engine, src_b);
            engine.compare(&a, &b).unwrap()
        };
        let first = run();
        let second = run();
        assert_eq!(first.token_similarity, second.token_similarity);
        assert_eq!(first.ast_similarity, second.ast_similarity);
        assert_eq!(first.matches, second.matches);
    }

    #[test]
    fn missing_fingerprint_is_the_only_error() {
        let engine = engine();
        let unknown_a = ContentHash::of_bytes(b"never registered a");
        let unknown_b = ContentHash::of_bytes(b"never registered b");
        let err = engine.compare(&unknown_a, &unknown_b).unwrap_err();
        assert!(matches!(err, Error::FingerprintUnavailable(_)));
    }

    #[test]
    fn second_compare_hits_the_cache() {
        let engine = engine();
        let a = ingest(&engine, "def f(x):\n    return x + 1\n");
        let b = ingest(&engine, "def g(x):\n    return x + 1\n");

        let first = engine.compare(&a, &b).unwrap();
        assert_eq!(engine.store.stats().cached_pairs, 1);
        // Drop the sources: a cache hit must not need them.
        engine.sources.remove(&a);
        engine.sources.remove(&b);
        let second = engine.compare(&a, &b).unwrap();
        assert_eq!(first.token_similarity, second.token_similarity);
        assert_eq!(first.matches, second.matches);
    }

    #[test]
    fn concurrent_compares_publish_one_value() {
        // Single-flight: both callers see the same result and exactly
        // one cache entry exists afterwards.
        let engine = Arc::new(engine());
        let a = ingest(&engine, "def f(x):\n    return x + 1\n");
        let b = ingest(&engine, "def g(y):\n    return y + 1\n");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = Arc::clone(&engine);
            let (a, b) = (a.clone(), b.clone());
            handles.push(std::thread::spawn(move || engine.compare(&a, &b).unwrap()));
        }
        let results: Vec<PairResult> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for pair in results.windows(2) {
            assert_eq!(pair[0].token_similarity, pair[1].token_similarity);
            assert_eq!(pair[0].matches, pair[1].matches);
        }
        assert_eq!(engine.store.stats().cached_pairs, 1);
    }

    // ===== S4: partial copy =====
    //
    // File A is 200 lines; file B is 300 lines whose lines 50-150 are a
    // verbatim copy of A lines 10-110. The generator keeps three
    // operator vocabularies disjoint (copied region / A filler / B
    // filler) and threads the copied region through an operator-operand
    // sequence in which every adjacent pair is globally unique, so no
    // k-gram window repeats and the match merges into a single run.

    const OPERANDS: [&str; 6] = ["p", "1", "\"s\"", "True", "False", "None"];
    const REGION_OPS: [&str; 19] = [
        "+", "*", "/", "%", "//", "**", "@", "&", "|", "^", "<<", ">>", "<", ">", "<=", ">=",
        "!=", "is", "in",
    ];

    /// Walk over 114 operand/operator symbols in which every adjacent
    /// ordered pair occurs at most once.
    fn super_stream(len: usize) -> Vec<(usize, usize)> {
        let n = 114usize;
        let mut seq: Vec<usize> = Vec::new();
        for a in 0..6 {
            seq.push(a);
            for x in 0..n {
                if x == a || x == a + 1 || x + 1 == a {
                    continue;
                }
                seq.push(x);
                seq.push(a);
            }
        }
        seq.truncate(len);
        seq.into_iter().map(|s| (s % 6, s / 6)).collect()
    }

    fn region_lines(count: usize) -> Vec<String> {
        let stream = super_stream(count * 10);
        (0..count)
            .map(|i| {
                let mut line = String::from("p");
                for (c, o) in &stream[i * 10..(i + 1) * 10] {
                    line.push_str(&format!(" {} {}", REGION_OPS[*o], OPERANDS[*c]));
                }
                line
            })
            .collect()
    }

    /// Filler line built from one reserved operator and an operand
    /// pattern derived from `id`, structurally distinct per id.
    fn filler_line(op: &str, id: usize) -> String {
        let mut line = String::from("p");
        let mut digits = id;
        for _ in 0..10 {
            line.push_str(&format!(" {} {}", op, OPERANDS[digits % 6]));
            digits /= 6;
        }
        line
    }

    fn partial_copy_corpus() -> (String, String) {
        let region = region_lines(101);

        // A: 9 filler lines, the region (lines 10-110), 90 filler lines.
        let mut a_lines: Vec<String> = (0..9).map(|i| filler_line("-", i)).collect();
        a_lines.extend(region.iter().cloned());
        a_lines.extend((9..99).map(|i| filler_line("-", i)));
        assert_eq!(a_lines.len(), 200);

        // B: 49 filler lines, the region (lines 50-150), 150 filler
        // lines cycling twelve shapes.
        let mut b_lines: Vec<String> = (0..49).map(|i| filler_line("==", i % 12)).collect();
        b_lines.extend(region.iter().cloned());
        b_lines.extend((0..150).map(|i| filler_line("==", i % 12)));
        assert_eq!(b_lines.len(), 300);

        (a_lines.join("\n") + "\n", b_lines.join("\n") + "\n")
    }

    #[test]
    fn partial_copy_merges_into_one_match() {
        let engine = engine();
        let (src_a, src_b) = partial_copy_corpus();
        let ha = ingest(&engine, &src_a);
        let hb = ingest(&engine, &src_b);

        let result = engine.compare(&ha, &hb).unwrap();
        assert!(result.token_similarity >= 0.15);
        assert!(
            result.ast_similarity > 0.3 && result.ast_similarity < 0.6,
            "ast similarity {} outside (0.3, 0.6)",
            result.ast_similarity
        );
        assert_eq!(result.matches.len(), 1);

        let m = &result.matches[0];
        // Orient the match to the 200-line file.
        let (a_span, b_span) = if result.key.a() == &ha {
            ((m.a_start, m.a_end), (m.b_start, m.b_end))
        } else {
            ((m.b_start, m.b_end), (m.a_start, m.a_end))
        };
        assert!(a_span.0 <= 10, "a_start {} > 10", a_span.0);
        assert!(a_span.1 >= 110, "a_end {} < 110", a_span.1);
        assert!(b_span.0 <= 50, "b_start {} > 50", b_span.0);
        assert!(b_span.1 >= 150, "b_end {} < 150", b_span.1);
    }
}
