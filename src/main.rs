//! Codeplag CLI - structural plagiarism detection for source batches

use clap::{Parser, Subcommand};
use codeplag::adapter::{Adapter, Language};
use codeplag::config::{CodeplagConfig, EngineConfig};
use codeplag::engine::SimilarityEngine;
use codeplag::fingerprint::{ast_fingerprint, token_fingerprint};
use codeplag::runner::{FsFetcher, Job, JobFile, TaskRunner};
use codeplag::source::{ContentHash, SourceFile, SourceRegistry};
use codeplag::storage::{ResultStore, SqliteResultStore};
use codeplag::store::Store;
use codeplag::ui::{theme, PairProgress, Role};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "codeplag")]
#[command(version = "0.1.0")]
#[command(about = "Source-code plagiarism detection - winnowed token and AST fingerprints")]
#[command(long_about = r#"
Codeplag computes pairwise structural similarity over batches of source
files, resistant to renaming and reformatting:
  • Winnowed k-gram fingerprints over normalized token streams
  • AST subtree fingerprints for structural similarity
  • Candidate pruning via an inverted fingerprint index

Example usage:
  codeplag analyze --file-a a.py --file-b b.py --language python
  codeplag batch --path ./submissions --language python
  codeplag stats --database codeplag.db
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a codeplag.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract fingerprints from a single file
    Fingerprint {
        /// Path to the source file
        #[arg(short, long)]
        file: PathBuf,

        /// Source language (python, javascript, typescript, c, cpp, java, go, rust)
        #[arg(short, long)]
        language: String,

        /// Emit JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Compare two files for similarity
    Analyze {
        /// Path to the first file
        #[arg(short = 'a', long)]
        file_a: PathBuf,

        /// Path to the second file
        #[arg(short = 'b', long)]
        file_b: PathBuf,

        /// Source language
        #[arg(short, long)]
        language: String,

        /// Emit JSON instead of a report
        #[arg(long)]
        json: bool,
    },

    /// Analyze a directory of submissions as one task
    Batch {
        /// Directory containing the submitted files
        #[arg(short, long)]
        path: PathBuf,

        /// Source language
        #[arg(short, long)]
        language: String,

        /// Path to the results database (defaults to the config file
        /// setting, then codeplag.db)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Task id (derived from the path when omitted)
        #[arg(short, long)]
        task_id: Option<String>,
    },

    /// Show statistics about stored tasks and results
    Stats {
        /// Path to the results database (defaults to the config file
        /// setting, then codeplag.db)
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Write a default codeplag.toml
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Init writes the config file and must not require one to exist.
    if let Commands::Init { force } = &cli.command {
        let config = CodeplagConfig {
            database: Some(CodeplagConfig::DEFAULT_DATABASE.to_string()),
            ..Default::default()
        };
        let path = cli
            .config
            .clone()
            .unwrap_or_else(CodeplagConfig::default_path);
        config.save(&path, *force)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let file_config = CodeplagConfig::load(cli.config.as_deref())?;
    let engine_config = file_config.engine.apply(&EngineConfig::default());

    match cli.command {
        Commands::Fingerprint { file, language, json } => {
            run_fingerprint(&file, &language, json, &engine_config)
        }
        Commands::Analyze { file_a, file_b, language, json } => {
            run_analyze(&file_a, &file_b, &language, json, &engine_config)
        }
        Commands::Batch { path, language, database, task_id } => {
            let database = file_config.resolve_database(database.as_deref())?;
            run_batch(&path, &language, &database, task_id, &file_config, &engine_config).await
        }
        Commands::Stats { database } => {
            let database = file_config.resolve_database(database.as_deref())?;
            run_stats(&database)
        }
        Commands::Init { .. } => Ok(()),
    }
}

fn run_fingerprint(
    file: &Path,
    language: &str,
    json: bool,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let language = Language::from_str(language)?;
    let bytes = std::fs::read(file)?;
    let source = SourceFile::ingest(bytes, language);
    let adapter = Adapter::new(language);

    let tokens = adapter.tokenize(&source.bytes)?;
    let token_fp = token_fingerprint(&tokens, source.line_count, config);
    let ast_fp = match adapter.parse(&source.bytes) {
        Ok(tree) => ast_fingerprint(&tree, config),
        Err(err) => {
            tracing::warn!(%err, "parse failed, AST fingerprint empty");
            codeplag::fingerprint::AstFingerprint::unparsed()
        }
    };

    if json {
        let fingerprints: Vec<serde_json::Value> = token_fp
            .positions
            .iter()
            .flat_map(|(hash, spans)| {
                spans.iter().map(move |span| {
                    serde_json::json!({
                        "hash": hash,
                        "start": span.start_line,
                        "end": span.end_line,
                    })
                })
            })
            .collect();
        let mut ast_hashes: Vec<u64> = ast_fp.hashes.iter().copied().collect();
        ast_hashes.sort_unstable();
        println!(
            "{}",
            serde_json::json!({
                "file": file.display().to_string(),
                "language": language.as_str(),
                "content_hash": source.content_hash.as_str(),
                "fingerprints": fingerprints,
                "ast_hashes": ast_hashes,
                "token_count": tokens.len(),
                "fingerprint_count": token_fp.total_kgrams,
            })
        );
    } else {
        println!("{}", format!("{}", file.display()).style(theme().style(Role::Header)));
        println!("  content hash     {}", source.content_hash.short());
        println!("  tokens           {}", tokens.len());
        println!("  winnowed k-grams {}", token_fp.total_kgrams);
        println!("  distinct hashes  {}", token_fp.len());
        println!("  ast subtrees     {}", ast_fp.len());
    }
    Ok(())
}

fn run_analyze(
    file_a: &Path,
    file_b: &Path,
    language: &str,
    json: bool,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let language = Language::from_str(language)?;
    let store = Arc::new(Store::default());
    let sources = Arc::new(SourceRegistry::new());
    let engine = SimilarityEngine::new(Arc::clone(&store), Arc::clone(&sources), config.clone());

    let source_a = SourceFile::ingest(std::fs::read(file_a)?, language);
    let source_b = SourceFile::ingest(std::fs::read(file_b)?, language);
    let hash_a = source_a.content_hash.clone();
    let hash_b = source_b.content_hash.clone();
    sources.register(source_a);
    sources.register(source_b);

    let result = engine.compare(&hash_a, &hash_b)?;
    // Orient the match sides back to the argument order.
    let swapped = result.key.a() != &hash_a;

    if json {
        let matches: Vec<[u32; 4]> = result
            .matches
            .iter()
            .map(|m| {
                if swapped {
                    [m.b_start, m.b_end, m.a_start, m.a_end]
                } else {
                    m.as_tuple()
                }
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "file_a": file_a.display().to_string(),
                "file_b": file_b.display().to_string(),
                "language": language.as_str(),
                "token_similarity": result.token_similarity,
                "ast_similarity": result.ast_similarity,
                "matches": matches,
                "reason": result.reason,
            })
        );
    } else {
        println!("{}", "Plagiarism Analysis".style(theme().style(Role::Header)));
        println!(
            "  token similarity {}",
            format!("{:6.2}%", result.token_similarity * 100.0)
                .style(theme().score(result.token_similarity))
        );
        println!(
            "  ast similarity   {}",
            format!("{:6.2}%", result.ast_similarity * 100.0)
                .style(theme().score(result.ast_similarity))
        );
        if let Some(reason) = &result.reason {
            println!("  {}", reason.style(theme().style(Role::Warn)));
        }
        if result.matches.is_empty() {
            println!("  no matching regions");
        } else {
            println!("  matching regions:");
            for m in &result.matches {
                let (a, b) = if swapped {
                    ((m.b_start, m.b_end), (m.a_start, m.a_end))
                } else {
                    ((m.a_start, m.a_end), (m.b_start, m.b_end))
                };
                println!(
                    "    A {:>4}-{:<4}  B {:>4}-{:<4}",
                    a.0, a.1, b.0, b.1
                );
            }
        }
    }
    Ok(())
}

async fn run_batch(
    path: &Path,
    language: &str,
    database: &Path,
    task_id: Option<String>,
    file_config: &CodeplagConfig,
    engine_config: &EngineConfig,
) -> anyhow::Result<()> {
    let language = Language::from_str(language)?;
    let extensions = language.extensions();

    let mut files: Vec<JobFile> = Vec::new();
    for entry in walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let file_path = entry.path();
        let ext = file_path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        if !extensions.contains(&ext.as_str()) {
            continue;
        }
        let bytes = match std::fs::read(file_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(file = %file_path.display(), %err, "skipping unreadable file");
                continue;
            }
        };
        files.push(JobFile {
            file_id: file_path
                .strip_prefix(path)
                .unwrap_or(file_path)
                .display()
                .to_string(),
            content_hash: ContentHash::of_bytes(&bytes).as_str().to_string(),
            language: language.as_str().to_string(),
            bytes_ref: file_path.display().to_string(),
        });
    }

    if files.len() < 2 {
        anyhow::bail!(
            "found {} {} file(s) under {} (need at least 2)",
            files.len(),
            language,
            path.display()
        );
    }

    let task_id = task_id.unwrap_or_else(|| derive_task_id(path));
    println!("Task {}: {} files", task_id.style(theme().style(Role::Info)), files.len());

    let results = Arc::new(SqliteResultStore::open(database)?);
    let store = Arc::new(Store::new(file_config.store.clone().unwrap_or_default()));
    let sources = Arc::new(SourceRegistry::new());

    let progress = PairProgress::new();
    let progress_cb = progress.clone();
    let runner = TaskRunner::new(
        store,
        sources,
        Arc::clone(&results) as Arc<dyn ResultStore>,
        Arc::new(FsFetcher),
    )
    .with_engine_config(engine_config.clone())
    .with_runner_config(file_config.runner.clone().unwrap_or_default())
    .with_progress(Arc::new(move |done, total| progress_cb.update(done, total)));

    let job = Job { task_id: task_id.clone(), files, options: Default::default() };

    let started = std::time::Instant::now();
    let report = match runner.process(&job).await {
        Ok(report) => report,
        Err(err) => {
            results
                .update_task_status(&task_id, codeplag::storage::TaskStatus::Failed, Some(&err.to_string()))
                .ok();
            return Err(err.into());
        }
    };
    progress.finish_with_summary(started.elapsed(), report.files, report.processed_pairs);

    // Surface the most suspicious pairs.
    let mut rows = results.results_for_task(&task_id)?;
    rows.sort_by(|a, b| {
        b.result
            .token_similarity
            .total_cmp(&a.result.token_similarity)
    });
    let flagged: Vec<_> = rows
        .iter()
        .filter(|r| r.result.token_similarity >= 0.5)
        .take(10)
        .collect();
    if flagged.is_empty() {
        println!("No suspicious pairs (token similarity >= 50%).");
    } else {
        println!("Most similar pairs:");
        for row in flagged {
            println!(
                "  {}  token {}  ast {}",
                format!(
                    "{}..{}",
                    &row.result.key.a().short(),
                    &row.result.key.b().short()
                )
                .style(theme().style(Role::Dim)),
                format!("{:5.1}%", row.result.token_similarity * 100.0)
                    .style(theme().score(row.result.token_similarity)),
                format!("{:5.1}%", row.result.ast_similarity * 100.0)
                    .style(theme().score(row.result.ast_similarity)),
            );
        }
    }
    println!("Results saved to {}", database.display());
    Ok(())
}

fn run_stats(database: &Path) -> anyhow::Result<()> {
    let store = SqliteResultStore::open(database)?;
    let stats = store.stats()?;
    println!("{}", "Codeplag Statistics".style(theme().style(Role::Header)));
    println!("  tasks      {}", stats.tasks);
    println!("  completed  {}", stats.completed_tasks);
    println!("  results    {}", stats.results);
    Ok(())
}

fn derive_task_id(path: &Path) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let digest = blake3::hash(format!("{}:{}", path.display(), nanos).as_bytes());
    format!("task-{}", &digest.to_hex().as_str()[..12])
}
