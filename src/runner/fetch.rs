//! Byte fetcher seam
//!
//! `bytes_ref` resolution is owned by an external object store; the
//! runner only needs the bytes. `FsFetcher` treats the ref as a local
//! path (CLI); `MemoryFetcher` serves tests.

use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait ByteFetcher: Send + Sync {
    async fn fetch(&self, bytes_ref: &str) -> Result<Vec<u8>>;
}

/// Resolves `bytes_ref` as a filesystem path.
#[derive(Default)]
pub struct FsFetcher;

#[async_trait]
impl ByteFetcher for FsFetcher {
    async fn fetch(&self, bytes_ref: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(bytes_ref).await?)
    }
}

/// In-memory blob map keyed by `bytes_ref`.
#[derive(Default)]
pub struct MemoryFetcher {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bytes_ref: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.blobs.insert(bytes_ref.into(), bytes.into());
    }
}

#[async_trait]
impl ByteFetcher for MemoryFetcher {
    async fn fetch(&self, bytes_ref: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(bytes_ref)
            .cloned()
            .ok_or_else(|| Error::StoreUnavailable(format!("no blob for ref {bytes_ref}")))
    }
}
