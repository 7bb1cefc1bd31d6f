//! Fingerprint Store
//!
//! Content-addressed cache of per-file fingerprints plus the inverted
//! index and the pair-result cache, behind one lock so that indexing a
//! file is atomic with respect to candidate readers and so that
//! evicting a fingerprint cascades: postings are dropped and dependent
//! pair entries are invalidated in the same critical section.
//!
//! The store is an injected collaborator with explicit lifecycle, the
//! in-process stand-in for a cluster-wide cache service.

pub mod cache;
pub mod index;

use crate::config::StoreConfig;
use crate::fingerprint::{AstFingerprint, FingerprintKind, TokenFingerprint};
use crate::pair::{PairKey, PairResult};
use crate::source::ContentHash;
use cache::PairCache;
use index::InvertedIndex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Aggregate counters for logging and the `stats` command.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct StoreStats {
    pub token_fingerprints: usize,
    pub ast_fingerprints: usize,
    pub indexed_files: usize,
    pub postings: usize,
    pub cached_pairs: usize,
}

struct Slot<T> {
    value: Arc<T>,
    expires_at: Instant,
    tick: u64,
}

struct Inner {
    token_fps: HashMap<ContentHash, Slot<TokenFingerprint>>,
    ast_fps: HashMap<ContentHash, Slot<AstFingerprint>>,
    /// Access order: oldest tick first. One entry per resident slot.
    lru: BTreeMap<u64, (FingerprintKind, ContentHash)>,
    next_tick: u64,
    index: InvertedIndex,
    pairs: PairCache,
}

/// Shared fingerprint store, inverted index, and result cache.
pub struct Store {
    config: StoreConfig,
    inner: Mutex<Inner>,
    flights: Mutex<HashMap<PairKey, Arc<Mutex<()>>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                token_fps: HashMap::new(),
                ast_fps: HashMap::new(),
                lru: BTreeMap::new(),
                next_tick: 0,
                index: InvertedIndex::new(),
                pairs: PairCache::new(),
            }),
            flights: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ttl(&self) -> Duration {
        self.config.ttl()
    }

    // ========== Fingerprint Operations ==========

    pub fn get_token_fp(&self, hash: &ContentHash) -> Option<Arc<TokenFingerprint>> {
        let mut inner = self.lock();
        let now = Instant::now();
        let expired = match inner.token_fps.get(hash) {
            None => return None,
            Some(slot) => now >= slot.expires_at,
        };
        if expired {
            evict(&mut inner, FingerprintKind::Token, hash);
            return None;
        }
        let ttl = self.ttl();
        let tick = next_tick(&mut inner);
        let slot = inner.token_fps.get_mut(hash).expect("slot just observed");
        let value = Arc::clone(&slot.value);
        let old_tick = slot.tick;
        slot.tick = tick;
        slot.expires_at = now + ttl;
        inner.lru.remove(&old_tick);
        inner.lru.insert(tick, (FingerprintKind::Token, hash.clone()));
        Some(value)
    }

    /// Store a token fingerprint and index its hashes atomically.
    pub fn put_token_fp(&self, hash: &ContentHash, fp: TokenFingerprint) -> Arc<TokenFingerprint> {
        let mut inner = self.lock();
        let value = Arc::new(fp);
        let tick = next_tick(&mut inner);
        let slot = Slot {
            value: Arc::clone(&value),
            expires_at: Instant::now() + self.ttl(),
            tick,
        };
        if let Some(old) = inner.token_fps.insert(hash.clone(), slot) {
            inner.lru.remove(&old.tick);
        }
        inner.lru.insert(tick, (FingerprintKind::Token, hash.clone()));
        let hashes: Vec<u64> = value.hashes().collect();
        inner.index.insert_file(hash, FingerprintKind::Token, hashes);
        enforce_capacity(&mut inner, self.config.capacity);
        value
    }

    pub fn get_ast_fp(&self, hash: &ContentHash) -> Option<Arc<AstFingerprint>> {
        let mut inner = self.lock();
        let now = Instant::now();
        let expired = match inner.ast_fps.get(hash) {
            None => return None,
            Some(slot) => now >= slot.expires_at,
        };
        if expired {
            evict(&mut inner, FingerprintKind::Ast, hash);
            return None;
        }
        let ttl = self.ttl();
        let tick = next_tick(&mut inner);
        let slot = inner.ast_fps.get_mut(hash).expect("slot just observed");
        let value = Arc::clone(&slot.value);
        let old_tick = slot.tick;
        slot.tick = tick;
        slot.expires_at = now + ttl;
        inner.lru.remove(&old_tick);
        inner.lru.insert(tick, (FingerprintKind::Ast, hash.clone()));
        Some(value)
    }

    /// Store an AST fingerprint and index its hashes atomically.
    pub fn put_ast_fp(&self, hash: &ContentHash, fp: AstFingerprint) -> Arc<AstFingerprint> {
        let mut inner = self.lock();
        let value = Arc::new(fp);
        let tick = next_tick(&mut inner);
        let slot = Slot {
            value: Arc::clone(&value),
            expires_at: Instant::now() + self.ttl(),
            tick,
        };
        if let Some(old) = inner.ast_fps.insert(hash.clone(), slot) {
            inner.lru.remove(&old.tick);
        }
        inner.lru.insert(tick, (FingerprintKind::Ast, hash.clone()));
        let hashes: Vec<u64> = value.hashes.iter().copied().collect();
        inner.index.insert_file(hash, FingerprintKind::Ast, hashes);
        enforce_capacity(&mut inner, self.config.capacity);
        value
    }

    /// Remove both fingerprints of a file, its postings, and every
    /// dependent pair entry.
    pub fn evict_file(&self, hash: &ContentHash) {
        let mut inner = self.lock();
        evict(&mut inner, FingerprintKind::Token, hash);
        evict(&mut inner, FingerprintKind::Ast, hash);
    }

    // ========== Index Operations ==========

    pub fn candidates(
        &self,
        kind: FingerprintKind,
        query: Vec<u64>,
        min_overlap_ratio: f64,
    ) -> Vec<(ContentHash, usize)> {
        let inner = self.lock();
        inner.index.candidates(kind, query, min_overlap_ratio)
    }

    // ========== Pair Cache Operations ==========

    /// Cached result for a pair, validated against the presence of both
    /// backing token fingerprints.
    pub fn get_pair(&self, key: &PairKey) -> Option<Arc<PairResult>> {
        let mut inner = self.lock();
        let hit = inner.pairs.get(key)?;
        let now = Instant::now();
        let alive = |inner: &Inner, h: &ContentHash| {
            inner
                .token_fps
                .get(h)
                .is_some_and(|slot| now < slot.expires_at)
        };
        let a_alive = alive(&inner, key.a());
        let b_alive = alive(&inner, key.b());
        if a_alive && b_alive {
            return Some(hit);
        }
        if !a_alive {
            inner.pairs.invalidate_file(key.a());
        }
        if !b_alive {
            inner.pairs.invalidate_file(key.b());
        }
        None
    }

    pub fn put_pair(&self, result: PairResult) -> Arc<PairResult> {
        let mut inner = self.lock();
        inner.pairs.put(result)
    }

    /// Per-pair computation lock: at most one worker computes a given
    /// pair at a time; later callers wait and then hit the cache.
    pub fn pair_flight(&self, key: &PairKey) -> Arc<Mutex<()>> {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        if flights.len() > 1024 {
            flights.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(flights.entry(key.clone()).or_default())
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.lock();
        StoreStats {
            token_fingerprints: inner.token_fps.len(),
            ast_fingerprints: inner.ast_fps.len(),
            indexed_files: inner.index.file_count(),
            postings: inner.index.posting_count(),
            cached_pairs: inner.pairs.len(),
        }
    }
}

fn next_tick(inner: &mut Inner) -> u64 {
    let tick = inner.next_tick;
    inner.next_tick += 1;
    tick
}

fn evict(inner: &mut Inner, kind: FingerprintKind, hash: &ContentHash) {
    let removed = match kind {
        FingerprintKind::Token => inner.token_fps.remove(hash).map(|s| s.tick),
        FingerprintKind::Ast => inner.ast_fps.remove(hash).map(|s| s.tick),
    };
    let Some(tick) = removed else { return };
    inner.lru.remove(&tick);
    inner.index.remove_file(hash, kind);
    inner.pairs.invalidate_file(hash);
}

fn enforce_capacity(inner: &mut Inner, capacity: usize) {
    let capacity = capacity.max(1);
    while inner.token_fps.len() + inner.ast_fps.len() > capacity {
        let Some((_, (kind, hash))) = inner.lru.pop_first() else {
            break;
        };
        // pop_first already removed the lru entry; drop the rest.
        match kind {
            FingerprintKind::Token => {
                inner.token_fps.remove(&hash);
            }
            FingerprintKind::Ast => {
                inner.ast_fps.remove(&hash);
            }
        }
        inner.index.remove_file(&hash, kind);
        inner.pairs.invalidate_file(&hash);
    }
}
