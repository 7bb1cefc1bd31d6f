//! # Codeplag - Source-Code Plagiarism Detection Engine
//!
//! Language-aware structural similarity for batches of submitted files.
//!
//! Codeplag provides:
//! - Tree-sitter based tokenization with rename-resistant normalization
//! - Winnowed k-gram token fingerprints and AST subtree fingerprints
//! - A shared fingerprint store with an inverted index for candidate pruning
//! - Pairwise similarity scoring with line-range match reconstruction
//! - A task runner that consumes jobs and persists per-pair results

pub mod adapter;
pub mod config;
pub mod engine;
pub mod fingerprint;
pub mod pair;
pub mod runner;
pub mod source;
pub mod storage;
pub mod store;
pub mod ui;

// Re-exports for convenient access
pub use adapter::Language;
pub use config::EngineConfig;
pub use engine::SimilarityEngine;
pub use pair::{Match, PairKey, PairResult};
pub use source::{ContentHash, SourceFile, SourceRegistry};
pub use store::Store;

/// Result type alias for Codeplag operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Codeplag operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Tokenize error: {0}")]
    Tokenize(String),

    #[error("Fingerprint unavailable for {0}")]
    FingerprintUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("Job timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl Error {
    /// Whether the broker should redeliver the job instead of dead-lettering it.
    pub fn is_requeueable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::Timeout(_))
    }
}
