//! Inverted fingerprint index
//!
//! Maps individual fingerprint hashes back to the files containing
//! them. Token and AST hashes share no keyspace: the posting key
//! carries the fingerprint kind. The reverse (file -> hashes) side
//! exists so evicting a file can drop its postings exactly.

use crate::fingerprint::FingerprintKind;
use crate::source::ContentHash;
use std::collections::{BTreeSet, HashMap, HashSet};

type PostingKey = (FingerprintKind, u64);

#[derive(Default)]
pub struct InvertedIndex {
    postings: HashMap<PostingKey, BTreeSet<ContentHash>>,
    by_file: HashMap<(ContentHash, FingerprintKind), Vec<u64>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a file's hashes for one fingerprint kind. Re-indexing the
    /// same `(file, kind)` is a no-op.
    pub fn insert_file<I>(&mut self, file: &ContentHash, kind: FingerprintKind, hashes: I)
    where
        I: IntoIterator<Item = u64>,
    {
        let key = (file.clone(), kind);
        if self.by_file.contains_key(&key) {
            return;
        }
        let mut distinct: Vec<u64> = hashes.into_iter().collect::<HashSet<_>>().into_iter().collect();
        distinct.sort_unstable();
        for &h in &distinct {
            self.postings.entry((kind, h)).or_default().insert(file.clone());
        }
        self.by_file.insert(key, distinct);
    }

    pub fn is_indexed(&self, file: &ContentHash, kind: FingerprintKind) -> bool {
        self.by_file.contains_key(&(file.clone(), kind))
    }

    /// Drop every posting for one `(file, kind)`.
    pub fn remove_file(&mut self, file: &ContentHash, kind: FingerprintKind) {
        let Some(hashes) = self.by_file.remove(&(file.clone(), kind)) else {
            return;
        };
        for h in hashes {
            if let Some(files) = self.postings.get_mut(&(kind, h)) {
                files.remove(file);
                if files.is_empty() {
                    self.postings.remove(&(kind, h));
                }
            }
        }
    }

    /// Files sharing at least `ceil(min_overlap_ratio * query.len())`
    /// hashes with the query, sorted by overlap count descending, ties
    /// by content hash ascending.
    pub fn candidates<'a, I>(
        &self,
        kind: FingerprintKind,
        query: I,
        min_overlap_ratio: f64,
    ) -> Vec<(ContentHash, usize)>
    where
        I: IntoIterator<Item = u64>,
    {
        let query: HashSet<u64> = query.into_iter().collect();
        if query.is_empty() {
            return Vec::new();
        }

        let mut overlaps: HashMap<&ContentHash, usize> = HashMap::new();
        for &h in &query {
            if let Some(files) = self.postings.get(&(kind, h)) {
                for file in files {
                    *overlaps.entry(file).or_insert(0) += 1;
                }
            }
        }

        let min_overlap = (min_overlap_ratio * query.len() as f64).ceil() as usize;
        let mut out: Vec<(ContentHash, usize)> = overlaps
            .into_iter()
            .filter(|(_, count)| *count >= min_overlap)
            .map(|(file, count)| (file.clone(), count))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// Distinct files with at least one indexed fingerprint kind.
    pub fn file_count(&self) -> usize {
        self.by_file
            .keys()
            .map(|(file, _)| file)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn posting_count(&self) -> usize {
        self.postings.len()
    }
}
