//! Candidate Selector
//!
//! A pre-filter, not a gate: within a task every pair is compared
//! anyway; the selector adds the cross-task files that share enough
//! token hashes to be worth a full comparison.

use crate::config::EngineConfig;
use crate::fingerprint::FingerprintKind;
use crate::source::ContentHash;
use crate::store::Store;
use std::collections::HashSet;

/// Where to look for candidates.
pub enum Scope<'a> {
    /// Only files belonging to the given task.
    WithinTask(&'a HashSet<ContentHash>),
    /// The entire inverted index.
    Global,
}

pub struct CandidateSelector<'a> {
    store: &'a Store,
    config: &'a EngineConfig,
}

impl<'a> CandidateSelector<'a> {
    pub fn new(store: &'a Store, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Files sharing at least `candidate_threshold` of `hash`'s token
    /// fingerprint, best overlap first, capped at
    /// `max_candidates_per_file`. The file itself is never returned;
    /// an unfingerprinted file has no candidates.
    pub fn candidates_for(&self, hash: &ContentHash, scope: Scope<'_>) -> Vec<ContentHash> {
        let Some(fp) = self.store.get_token_fp(hash) else {
            return Vec::new();
        };
        let query: Vec<u64> = fp.hashes().collect();
        self.store
            .candidates(FingerprintKind::Token, query, self.config.candidate_threshold)
            .into_iter()
            .map(|(candidate, _)| candidate)
            .filter(|candidate| candidate != hash)
            .filter(|candidate| match &scope {
                Scope::WithinTask(task_files) => task_files.contains(candidate),
                Scope::Global => true,
            })
            .take(self.config.max_candidates_per_file)
            .collect()
    }
}
