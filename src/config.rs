use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables for fingerprinting and pairwise comparison.
///
/// Defaults follow the engine contract: `k = 6` and `w = 5` give a
/// guaranteed-detect length of `w + k - 1 = 10` normalized tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// k-gram length over normalized token kinds
    pub k: usize,
    /// Winnowing window (consecutive k-gram hashes per selection)
    pub w: usize,
    /// Minimum normalized-token span for an AST subtree to be hashed
    pub min_subtree_tokens: usize,
    /// Early-exit and index-pruning threshold on token similarity
    pub candidate_threshold: f64,
    /// Maximum line gap bridged when merging match regions
    pub gap: u32,
    /// Minimum distinct shared hashes backing a reported match
    pub min_match_kgrams: usize,
    /// Cap on cross-task candidates per file
    pub max_candidates_per_file: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            k: 6,
            w: 5,
            min_subtree_tokens: 20,
            candidate_threshold: 0.15,
            gap: 2,
            min_match_kgrams: 2,
            max_candidates_per_file: 256,
        }
    }
}

/// Per-job option overrides delivered with the job record.
///
/// Any omitted option falls back to the engine defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobOptions {
    pub k: Option<usize>,
    pub w: Option<usize>,
    pub min_subtree_tokens: Option<usize>,
    pub candidate_threshold: Option<f64>,
    pub gap: Option<u32>,
    pub min_match_kgrams: Option<usize>,
    pub max_candidates_per_file: Option<usize>,
}

impl JobOptions {
    /// Merge these overrides onto a base configuration.
    pub fn apply(&self, base: &EngineConfig) -> EngineConfig {
        EngineConfig {
            k: self.k.unwrap_or(base.k),
            w: self.w.unwrap_or(base.w),
            min_subtree_tokens: self.min_subtree_tokens.unwrap_or(base.min_subtree_tokens),
            candidate_threshold: self.candidate_threshold.unwrap_or(base.candidate_threshold),
            gap: self.gap.unwrap_or(base.gap),
            min_match_kgrams: self.min_match_kgrams.unwrap_or(base.min_match_kgrams),
            max_candidates_per_file: self
                .max_candidates_per_file
                .unwrap_or(base.max_candidates_per_file),
        }
    }

    /// True when the overrides would change fingerprint content, in which
    /// case cached fingerprints keyed by content hash alone must not be
    /// shared with this job.
    pub fn changes_fingerprinting(&self, base: &EngineConfig) -> bool {
        self.k.is_some_and(|k| k != base.k)
            || self.w.is_some_and(|w| w != base.w)
            || self
                .min_subtree_tokens
                .is_some_and(|m| m != base.min_subtree_tokens)
    }

    /// True when the overrides would change any cached comparison
    /// output (fingerprints or pair results). Such a job runs against a
    /// task-private store.
    pub fn changes_comparison(&self, base: &EngineConfig) -> bool {
        self.changes_fingerprinting(base)
            || self
                .candidate_threshold
                .is_some_and(|t| t != base.candidate_threshold)
            || self.gap.is_some_and(|g| g != base.gap)
            || self
                .min_match_kgrams
                .is_some_and(|m| m != base.min_match_kgrams)
    }
}

/// Bounds on the shared fingerprint store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of resident fingerprint entries (token + AST)
    pub capacity: usize,
    /// Entry TTL in seconds, refreshed on access
    pub fingerprint_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            fingerprint_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.fingerprint_ttl_secs)
    }
}

/// Worker-side knobs for the task runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Concurrent pair comparisons per job
    pub worker_concurrency: usize,
    /// Whole-job timeout in seconds
    pub job_timeout_secs: u64,
    /// Persist the progress counter every N processed pairs
    pub progress_interval: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 4,
            job_timeout_secs: 600,
            progress_interval: 10,
        }
    }
}

impl RunnerConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/// On-disk configuration: engine option overrides plus store/runner
/// knobs and the default results database location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodeplagConfig {
    pub database: Option<String>,
    #[serde(default)]
    pub engine: JobOptions,
    #[serde(default)]
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub runner: Option<RunnerConfig>,
}

impl CodeplagConfig {
    pub const DEFAULT_PATH: &'static str = "codeplag.toml";
    pub const DEFAULT_DATABASE: &'static str = "codeplag.db";

    pub fn default_path() -> PathBuf {
        PathBuf::from(Self::DEFAULT_PATH)
    }

    /// Load configuration for a run. A file named explicitly must
    /// exist and validate; the well-known `codeplag.toml` is optional
    /// and its absence means defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        if !path.exists() {
            if required {
                anyhow::bail!("config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&std::fs::read_to_string(&path)?)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with before any job is
    /// accepted, rather than failing mid-comparison.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.engine.k == Some(0) {
            anyhow::bail!("engine.k: k-gram length must be at least 1");
        }
        if self.engine.w == Some(0) {
            anyhow::bail!("engine.w: winnow window must be at least 1");
        }
        if let Some(t) = self.engine.candidate_threshold {
            if !(0.0..=1.0).contains(&t) {
                anyhow::bail!("engine.candidate_threshold: {t} is outside [0, 1]");
            }
        }
        if self.engine.min_match_kgrams == Some(0) {
            anyhow::bail!("engine.min_match_kgrams: a match needs at least one backing hash");
        }
        if self.engine.max_candidates_per_file == Some(0) {
            anyhow::bail!("engine.max_candidates_per_file: a zero cap disables cross-task search");
        }
        if let Some(store) = &self.store {
            if store.capacity == 0 {
                anyhow::bail!("store.capacity: the fingerprint cache needs room for one entry");
            }
        }
        if let Some(runner) = &self.runner {
            if runner.worker_concurrency == 0 {
                anyhow::bail!("runner.worker_concurrency: at least one worker is required");
            }
            if runner.job_timeout_secs == 0 {
                anyhow::bail!("runner.job_timeout_secs: a zero timeout abandons every job");
            }
        }
        Ok(())
    }

    /// Where pair results land: an explicit flag wins over the config
    /// file, which wins over `codeplag.db`. Parent directories are
    /// created on demand.
    pub fn resolve_database(&self, flag: Option<&Path>) -> anyhow::Result<PathBuf> {
        let path = flag
            .map(Path::to_path_buf)
            .or_else(|| self.database.as_deref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DATABASE));
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
        }
        Ok(path)
    }

    /// Persist this configuration, refusing to clobber an existing
    /// file unless `force` is set. Only validated configs are written.
    pub fn save(&self, path: &Path, force: bool) -> anyhow::Result<()> {
        self.validate()?;
        if path.exists() && !force {
            anyhow::bail!("{} already exists, pass --force to replace it", path.display());
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
