//! Pair-result cache
//!
//! Completed comparisons are cached under the canonical pair key.
//! Reverse refs from each content hash to its dependent pairs make
//! fingerprint eviction invalidate exactly the entries it must.

use crate::pair::{PairKey, PairResult};
use crate::source::ContentHash;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
pub struct PairCache {
    results: HashMap<PairKey, Arc<PairResult>>,
    refs: HashMap<ContentHash, HashSet<PairKey>>,
}

impl PairCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PairKey) -> Option<Arc<PairResult>> {
        self.results.get(key).cloned()
    }

    pub fn put(&mut self, result: PairResult) -> Arc<PairResult> {
        let key = result.key.clone();
        let result = Arc::new(result);
        self.refs.entry(key.a().clone()).or_default().insert(key.clone());
        self.refs.entry(key.b().clone()).or_default().insert(key.clone());
        self.results.insert(key, Arc::clone(&result));
        result
    }

    /// Drop every cached pair involving `hash`. Returns the number of
    /// entries removed.
    pub fn invalidate_file(&mut self, hash: &ContentHash) -> usize {
        let Some(keys) = self.refs.remove(hash) else {
            return 0;
        };
        let mut removed = 0;
        for key in keys {
            if self.results.remove(&key).is_some() {
                removed += 1;
            }
            let other = if key.a() == hash { key.b() } else { key.a() };
            let emptied = match self.refs.get_mut(other) {
                Some(back) => {
                    back.remove(&key);
                    back.is_empty()
                }
                None => false,
            };
            if emptied {
                self.refs.remove(other);
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(label: &str) -> ContentHash {
        ContentHash::of_bytes(label.as_bytes())
    }

    fn result(a: &ContentHash, b: &ContentHash) -> PairResult {
        PairResult::new(PairKey::new(a.clone(), b.clone()), 0.5, 0.25, Vec::new())
    }

    #[test]
    fn symmetric_lookup() {
        let mut cache = PairCache::new();
        let (a, b) = (hash("a"), hash("b"));
        cache.put(result(&a, &b));

        let forward = PairKey::new(a.clone(), b.clone());
        let backward = PairKey::new(b, a);
        assert!(cache.get(&forward).is_some());
        assert!(cache.get(&backward).is_some());
    }

    #[test]
    fn invalidation_removes_every_dependent_pair() {
        let mut cache = PairCache::new();
        let (a, b, c) = (hash("a"), hash("b"), hash("c"));
        cache.put(result(&a, &b));
        cache.put(result(&a, &c));
        cache.put(result(&b, &c));

        assert_eq!(cache.invalidate_file(&a), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&PairKey::new(b.clone(), c.clone())).is_some());

        // Untouched files keep working after the sweep.
        assert_eq!(cache.invalidate_file(&a), 0);
        assert_eq!(cache.invalidate_file(&b), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn self_pair_invalidation() {
        let mut cache = PairCache::new();
        let a = hash("a");
        cache.put(result(&a, &a));
        assert_eq!(cache.invalidate_file(&a), 1);
        assert!(cache.is_empty());
    }
}
