//! Task Runner
//!
//! Consumes job deliveries, coordinates the pipeline (fetch bytes,
//! fingerprint and index, enumerate within-task pairs plus cross-task
//! candidates, compare in a bounded pool, persist results), and maps
//! outcomes to broker verdicts. Retries are safe end to end: every
//! write is keyed and idempotent, and already-written pairs are
//! skipped by canonical key.

pub mod broker;
pub mod fetch;
pub mod job;

pub use broker::{Delivery, DeliveryOutcome, JobBroker, MemoryBroker};
pub use fetch::{ByteFetcher, FsFetcher, MemoryFetcher};
pub use job::{Job, JobFile};

use crate::adapter::Language;
use crate::config::{EngineConfig, RunnerConfig, StoreConfig};
use crate::engine::{CandidateSelector, Scope, SimilarityEngine};
use crate::pair::PairKey;
use crate::source::{ContentHash, SourceFile, SourceRegistry};
use crate::storage::{ResultStore, TaskStatus};
use crate::store::Store;
use crate::{Error, Result};
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// Summary of one processed job.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct TaskReport {
    pub files: usize,
    pub total_pairs: usize,
    pub processed_pairs: usize,
    /// Cross-task pairs abandoned after the fingerprint retry.
    pub skipped_pairs: usize,
}

pub struct TaskRunner {
    store: Arc<Store>,
    sources: Arc<SourceRegistry>,
    results: Arc<dyn ResultStore>,
    fetcher: Arc<dyn ByteFetcher>,
    engine_config: EngineConfig,
    store_config: StoreConfig,
    config: RunnerConfig,
    on_progress: Option<Arc<ProgressFn>>,
}

impl TaskRunner {
    pub fn new(
        store: Arc<Store>,
        sources: Arc<SourceRegistry>,
        results: Arc<dyn ResultStore>,
        fetcher: Arc<dyn ByteFetcher>,
    ) -> Self {
        Self {
            store,
            sources,
            results,
            fetcher,
            engine_config: EngineConfig::default(),
            store_config: StoreConfig::default(),
            config: RunnerConfig::default(),
            on_progress: None,
        }
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    pub fn with_runner_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, callback: Arc<ProgressFn>) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Consume deliveries until the broker drains, acking successes and
    /// nacking failures (requeue only for transient errors).
    pub async fn run(&self, broker: &dyn JobBroker) {
        while let Some(delivery) = broker.recv().await {
            let task_id = delivery.job.task_id.clone();
            match self.process(&delivery.job).await {
                Ok(report) => {
                    tracing::info!(
                        task = %task_id,
                        pairs = report.processed_pairs,
                        "task completed"
                    );
                    if let Err(err) = broker.ack(&delivery).await {
                        tracing::error!(task = %task_id, %err, "ack failed");
                    }
                }
                Err(err) => {
                    let requeue = err.is_requeueable();
                    tracing::warn!(task = %task_id, %err, requeue, "task failed");
                    if !requeue {
                        self.results
                            .update_task_status(&task_id, TaskStatus::Failed, Some(&err.to_string()))
                            .ok();
                    }
                    if let Err(err) = broker.nack(&delivery, requeue).await {
                        tracing::error!(task = %task_id, %err, "nack failed");
                    }
                }
            }
        }
    }

    /// Process one job to completion.
    pub async fn process(&self, job: &Job) -> Result<TaskReport> {
        self.results.create_task(&job.task_id)?;
        if job.files.len() < 2 {
            return Err(Error::Task(
                "need at least 2 files for plagiarism check".to_string(),
            ));
        }
        self.results
            .update_task_status(&job.task_id, TaskStatus::Processing, None)?;

        // Non-default comparison options run against a task-private
        // store so shared cache entries stay keyed by content alone.
        let merged = job.options.apply(&self.engine_config);
        let store = if job.options.changes_comparison(&self.engine_config) {
            Arc::new(Store::new(self.store_config.clone()))
        } else {
            Arc::clone(&self.store)
        };
        let engine = Arc::new(SimilarityEngine::new(
            Arc::clone(&store),
            Arc::clone(&self.sources),
            merged.clone(),
        ));

        let mut task_hashes: Vec<ContentHash> = Vec::new();
        let outcome = async {
            for file in &job.files {
                let language = Language::from_str(&file.language)?;
                let bytes = self.fetcher.fetch(&file.bytes_ref).await?;
                let source = SourceFile::ingest(bytes, language);
                if source.content_hash.as_str() != file.content_hash {
                    tracing::warn!(
                        file = %file.file_id,
                        claimed = %file.content_hash,
                        computed = %source.content_hash.short(),
                        "content hash mismatch, using computed hash"
                    );
                }
                task_hashes.push(source.content_hash.clone());
                self.sources.register(source);
            }

            for hash in &task_hashes {
                engine.ensure_indexed(hash)?;
            }

            self.compare_pairs(job, &engine, &store, &merged, &task_hashes)
                .await
        }
        .await;

        // The engine keeps fingerprints; the read-only byte views are
        // released with the job.
        for hash in &task_hashes {
            self.sources.remove(hash);
        }

        let report = outcome?;
        self.results
            .update_task_progress(&job.task_id, report.processed_pairs, report.total_pairs)?;
        self.results
            .update_task_status(&job.task_id, TaskStatus::Completed, None)?;
        Ok(report)
    }

    async fn compare_pairs(
        &self,
        job: &Job,
        engine: &Arc<SimilarityEngine>,
        store: &Arc<Store>,
        merged: &EngineConfig,
        task_hashes: &[ContentHash],
    ) -> Result<TaskReport> {
        // Every unordered within-task pair, then cross-task candidates
        // beyond the task's own files.
        let task_set: HashSet<ContentHash> = task_hashes.iter().cloned().collect();
        let mut within: BTreeSet<PairKey> = BTreeSet::new();
        for (i, a) in task_hashes.iter().enumerate() {
            for b in task_hashes.iter().skip(i + 1) {
                within.insert(PairKey::new(a.clone(), b.clone()));
            }
        }
        let selector = CandidateSelector::new(store, merged);
        let mut cross: BTreeSet<PairKey> = BTreeSet::new();
        for hash in task_hashes {
            for candidate in selector.candidates_for(hash, Scope::Global) {
                if task_set.contains(&candidate) {
                    continue;
                }
                let key = PairKey::new(hash.clone(), candidate);
                if !within.contains(&key) {
                    cross.insert(key);
                }
            }
        }

        let total = within.len() + cross.len();
        self.results.update_task_progress(&job.task_id, 0, total)?;
        if let Some(cb) = self.on_progress.as_deref() {
            cb(0, total);
        }

        let processed = Arc::new(AtomicUsize::new(0));
        let skipped = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.config.worker_concurrency.max(1)));
        let progress_interval = self.config.progress_interval.max(1);

        let pairs: Vec<(PairKey, bool)> = within
            .into_iter()
            .map(|k| (k, false))
            .chain(cross.into_iter().map(|k| (k, true)))
            .collect();

        let work = async {
            let mut join: JoinSet<Result<()>> = JoinSet::new();
            for (key, is_cross) in pairs {
                let engine = Arc::clone(engine);
                let results = Arc::clone(&self.results);
                let semaphore = Arc::clone(&semaphore);
                let processed = Arc::clone(&processed);
                let skipped = Arc::clone(&skipped);
                let on_progress = self.on_progress.clone();
                let task_id = job.task_id.clone();

                join.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| Error::Task("worker pool closed".to_string()))?;

                    let bump = |results: &Arc<dyn ResultStore>| {
                        let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                        if done % progress_interval == 0 {
                            results.update_task_progress(&task_id, done, total).ok();
                        }
                        if let Some(cb) = on_progress.as_deref() {
                            cb(done, total);
                        }
                    };

                    // Idempotent retry: keep rows already written for
                    // this task.
                    if results.has_result(&task_id, &key)? {
                        bump(&results);
                        return Ok(());
                    }

                    let outcome = {
                        let engine = Arc::clone(&engine);
                        let (a, b) = (key.a().clone(), key.b().clone());
                        tokio::task::spawn_blocking(move || match engine.compare(&a, &b) {
                            // One retry with a fresh computation.
                            Err(Error::FingerprintUnavailable(_)) => engine.compare(&a, &b),
                            other => other,
                        })
                        .await
                        .map_err(|err| Error::Task(format!("comparison panicked: {err}")))?
                    };

                    match outcome {
                        Ok(result) => {
                            results.upsert_result(&task_id, &result)?;
                            bump(&results);
                            Ok(())
                        }
                        Err(Error::FingerprintUnavailable(hash)) if is_cross => {
                            tracing::warn!(
                                task = %task_id,
                                file = %hash,
                                "cross-task candidate no longer available, skipping pair"
                            );
                            skipped.fetch_add(1, Ordering::SeqCst);
                            bump(&results);
                            Ok(())
                        }
                        Err(err) => Err(err),
                    }
                });
            }

            while let Some(joined) = join.join_next().await {
                joined.map_err(|err| Error::Task(format!("comparison aborted: {err}")))??;
            }
            Ok::<(), Error>(())
        };

        let timeout = self.config.job_timeout();
        tokio::time::timeout(timeout, work)
            .await
            .map_err(|_| Error::Timeout(timeout))??;

        Ok(TaskReport {
            files: task_hashes.len(),
            total_pairs: total,
            processed_pairs: processed.load(Ordering::SeqCst),
            skipped_pairs: skipped.load(Ordering::SeqCst),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteResultStore;

    struct Harness {
        store: Arc<Store>,
        sources: Arc<SourceRegistry>,
        results: Arc<SqliteResultStore>,
        runner: TaskRunner,
    }

    fn harness(files: &[(&str, &str)]) -> Harness {
        let store = Arc::new(Store::new(StoreConfig::default()));
        let sources = Arc::new(SourceRegistry::new());
        let results = Arc::new(SqliteResultStore::open_in_memory().unwrap());
        let mut fetcher = MemoryFetcher::new();
        for (bytes_ref, body) in files {
            fetcher.insert(*bytes_ref, body.as_bytes().to_vec());
        }
        let runner = TaskRunner::new(
            Arc::clone(&store),
            Arc::clone(&sources),
            Arc::clone(&results) as Arc<dyn ResultStore>,
            Arc::new(fetcher),
        );
        Harness { store, sources, results, runner }
    }

    fn job_for(task_id: &str, refs: &[(&str, &str)]) -> Job {
        Job {
            task_id: task_id.to_string(),
            files: refs
                .iter()
                .enumerate()
                .map(|(i, (bytes_ref, body))| JobFile {
                    file_id: format!("f{i}"),
                    content_hash: ContentHash::of_bytes(body.as_bytes()).as_str().to_string(),
                    language: "python".to_string(),
                    bytes_ref: bytes_ref.to_string(),
                })
                .collect(),
            options: Default::default(),
        }
    }

    const F1: &str = "def add(a, b):\n    return a + b\n";
    const F2: &str = "def plus(x, y):\n    return x + y\n";
    const F3: &str = "for i in range(3):\n    print(i)\n";

    #[tokio::test]
    async fn happy_path_processes_all_pairs() {
        let files = [("r1", F1), ("r2", F2), ("r3", F3)];
        let h = harness(&files);
        let job = job_for("t1", &files);

        let broker = MemoryBroker::new();
        let tag = broker.publish(job);
        h.runner.run(&broker).await;

        assert_eq!(broker.outcomes(), vec![(tag, DeliveryOutcome::Acked)]);

        let task = h.results.get_task("t1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.total_pairs, 3);
        assert_eq!(task.processed_pairs, 3);

        let rows = h.results.results_for_task("t1").unwrap();
        assert_eq!(rows.len(), 3);
        // The renamed pair scores high; the unrelated pairs do not.
        let high = rows
            .iter()
            .filter(|r| r.result.token_similarity >= 0.95)
            .count();
        assert_eq!(high, 1);

        // Sources are released after the job; fingerprints stay.
        assert!(h.sources.is_empty());
        assert_eq!(h.store.stats().token_fingerprints, 3);
    }

    #[tokio::test]
    async fn retry_skips_already_written_pairs() {
        let files = [("r1", F1), ("r2", F2)];
        let h = harness(&files);
        let job = job_for("t1", &files);

        let first = h.runner.process(&job).await.unwrap();
        assert_eq!(first.total_pairs, 1);

        let second = h.runner.process(&job).await.unwrap();
        assert_eq!(second.processed_pairs, 1);
        assert_eq!(h.results.results_for_task("t1").unwrap().len(), 1);

        let task = h.results.get_task("t1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn too_few_files_dead_letters() {
        let files = [("r1", F1)];
        let h = harness(&files);
        let broker = MemoryBroker::new();
        let tag = broker.publish(job_for("t1", &files));
        h.runner.run(&broker).await;

        assert_eq!(
            broker.outcomes(),
            vec![(tag, DeliveryOutcome::Nacked { requeue: false })]
        );
        let task = h.results.get_task("t1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn unsupported_language_dead_letters() {
        let files = [("r1", F1), ("r2", F2)];
        let h = harness(&files);
        let mut job = job_for("t1", &files);
        job.files[0].language = "cobol".to_string();

        let broker = MemoryBroker::new();
        let tag = broker.publish(job);
        h.runner.run(&broker).await;

        assert_eq!(
            broker.outcomes(),
            vec![(tag, DeliveryOutcome::Nacked { requeue: false })]
        );
        let task = h.results.get_task("t1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.unwrap().contains("cobol"));
    }

    #[tokio::test]
    async fn missing_bytes_are_retryable() {
        let files = [("r1", F1)];
        let h = harness(&files);
        let mut job = job_for("t1", &files);
        job.files.push(JobFile {
            file_id: "ghost".to_string(),
            content_hash: "0".repeat(64),
            language: "python".to_string(),
            bytes_ref: "missing-ref".to_string(),
        });

        let broker = MemoryBroker::new();
        let tag = broker.publish(job);
        h.runner.run(&broker).await;

        // StoreUnavailable is transient: requeue, and the task is not
        // marked failed.
        assert_eq!(
            broker.outcomes(),
            vec![(tag, DeliveryOutcome::Nacked { requeue: true })]
        );
        let task = h.results.get_task("t1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
    }

    #[tokio::test]
    async fn tokenize_failures_still_write_rows() {
        // A file with no tokens at all still yields written pairs via
        // an empty fingerprint; this exercises the zero-result path.
        let files = [("r1", F1), ("r2", "\n")];
        let h = harness(&files);
        let report = h.runner.process(&job_for("t1", &files)).await.unwrap();
        assert_eq!(report.processed_pairs, 1);

        let rows = h.results.results_for_task("t1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].result.token_similarity, 0.0);
    }

    // ===== S6: candidate pruning =====
    //
    // With a large population of unrelated files already indexed, a new
    // file overlapping exactly two of them triggers exactly two
    // cross-task comparisons; everything else is pruned. Unrelated
    // files use identifier-only operands so no k-gram window collides
    // with the probe family, whose operands are all literals.

    fn unrelated_file(i: usize) -> String {
        const OPS: [&str; 23] = [
            "+", "-", "*", "/", "%", "//", "**", "@", "&", "|", "^", "<<", ">>", "<", ">",
            "<=", ">=", "==", "!=", "is", "in", "and", "or",
        ];
        // Distinct rotation class: first op index strictly below the
        // other two, injective for i < 1050.
        let a = i % 7;
        let b = a + 1 + (i / 7) % 10;
        let c = a + 1 + (i / 70) % 15;
        let (oa, ob, oc) = (OPS[a], OPS[b], OPS[c]);
        let mut line = String::from("p");
        for k in 0..12 {
            let op = match k % 3 {
                0 => oa,
                1 => ob,
                _ => oc,
            };
            line.push_str(&format!(" {op} p"));
        }
        line.push('\n');
        line
    }

    fn probe_lines() -> Vec<String> {
        [
            "True + False * None + 1 * True + None * False + 1 + True * None",
            "1 * None + True * False + None + 1 * True + False * None + 1",
            "False + 1 * True + None * 1 + False * True + None + 1 * False",
            "None * True + 1 * False + True + None * 1 + False * True + None",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[tokio::test]
    async fn candidate_pruning_bounds_cross_task_pairs() {
        let probe: String = probe_lines().join("\n") + "\n";
        let related_one = probe_lines()[..3].join("\n") + "\n";
        let related_two = {
            let mut lines = probe_lines();
            lines.rotate_left(1);
            lines[..3].join("\n") + "\n"
        };
        let helper = "pass\n";

        let files = [("probe", probe.as_str()), ("helper", helper)];
        let h = harness(&files);

        // Pre-index the existing population the way earlier tasks left
        // it: fingerprints in the store, bytes long gone.
        let population_engine = SimilarityEngine::new(
            Arc::clone(&h.store),
            Arc::clone(&h.sources),
            EngineConfig::default(),
        );
        let mut related_hashes = Vec::new();
        for body in [related_one.as_str(), related_two.as_str()] {
            let file = SourceFile::ingest(body.as_bytes().to_vec(), Language::Python);
            let hash = file.content_hash.clone();
            h.sources.register(file);
            population_engine.ensure_indexed(&hash).unwrap();
            h.sources.remove(&hash);
            related_hashes.push(hash);
        }
        for i in 0..1000 {
            let body = unrelated_file(i);
            let file = SourceFile::ingest(body.as_bytes().to_vec(), Language::Python);
            let hash = file.content_hash.clone();
            h.sources.register(file);
            population_engine.ensure_indexed(&hash).unwrap();
            h.sources.remove(&hash);
        }

        let job = job_for("t-probe", &files);
        let report = h.runner.process(&job).await.unwrap();

        // 1 within-task pair + exactly the 2 related cross-task pairs.
        assert_eq!(report.total_pairs, 3);
        assert_eq!(report.processed_pairs, 3);

        let rows = h.results.results_for_task("t-probe").unwrap();
        assert_eq!(rows.len(), 3);
        let probe_hash = ContentHash::of_bytes(probe.as_bytes());
        for related in &related_hashes {
            let key = PairKey::new(probe_hash.clone(), related.clone());
            assert!(h.results.has_result("t-probe", &key).unwrap());
        }

        // The selector ranks the two related files first.
        let engine_config = EngineConfig::default();
        let selector = CandidateSelector::new(&h.store, &engine_config);
        let found = selector.candidates_for(&probe_hash, Scope::Global);
        assert_eq!(found.len(), 2);
        assert!(related_hashes.contains(&found[0]));
        assert!(related_hashes.contains(&found[1]));
    }
}
