//! AST subtree fingerprints
//!
//! Every subtree spanning at least `min_subtree_tokens` normalized
//! tokens contributes one canonical hash computed from the node kind
//! and its children's hashes in source order. The hash is not
//! commutative: reordering children changes it. Smaller subtrees are
//! excluded so trivial fragments cannot dominate the score.

use crate::adapter::{AstNode, SyntaxTree};
use crate::config::EngineConfig;
use crate::fingerprint::{mix, stable_hash, AstFingerprint};

/// Build the AST fingerprint for one parsed file.
pub fn ast_fingerprint(tree: &SyntaxTree, config: &EngineConfig) -> AstFingerprint {
    let mut fp = AstFingerprint::default();
    walk(&tree.root, config.min_subtree_tokens.max(1), &mut fp);
    fp
}

/// Post-order walk returning `(subtree_hash, normalized_token_count)`.
fn walk(node: &AstNode, min_tokens: usize, fp: &mut AstFingerprint) -> (u64, usize) {
    if node.is_leaf() {
        return (stable_hash(node.kind.as_bytes()), 1);
    }

    let mut hash = stable_hash(node.kind.as_bytes());
    let mut tokens = 0usize;
    for child in &node.children {
        let (child_hash, child_tokens) = walk(child, min_tokens, fp);
        hash = mix(hash, child_hash);
        tokens += child_tokens;
    }

    if tokens >= min_tokens {
        fp.hashes.insert(hash);
        fp.total_subtrees += 1;
    }

    (hash, tokens)
}
