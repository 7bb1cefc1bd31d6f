//! Database schema definitions

/// SQL to create the tasks table
pub const CREATE_TASKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'queued',
    error TEXT,
    total_pairs INTEGER NOT NULL DEFAULT 0,
    processed_pairs INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// SQL to create the similarity results table.
/// One row per compared pair, attributed to the task that scheduled
/// the comparison; the composite key makes retries upsert.
pub const CREATE_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS similarity_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL,
    hash_a TEXT NOT NULL,
    hash_b TEXT NOT NULL,
    token_similarity REAL NOT NULL,
    ast_similarity REAL NOT NULL,
    matches TEXT NOT NULL DEFAULT '[]',
    reason TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(task_id, hash_a, hash_b)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_results_task ON similarity_results(task_id)",
    "CREATE INDEX IF NOT EXISTS idx_results_hashes ON similarity_results(hash_a, hash_b)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_TASKS_TABLE, CREATE_RESULTS_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
