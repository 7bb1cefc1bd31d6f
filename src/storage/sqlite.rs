//! SQLite result store implementation

use super::{schema, ResultStore, TaskStatus};
use crate::pair::{Match, PairKey, PairResult};
use crate::source::ContentHash;
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

/// SQLite-backed persistent store for tasks and pair results
pub struct SqliteResultStore {
    conn: Mutex<Connection>,
}

/// One persisted task row
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskRow {
    pub id: String,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub total_pairs: usize,
    pub processed_pairs: usize,
    pub created_at: String,
}

/// One persisted pair row
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResultRow {
    pub task_id: String,
    pub result: PairResult,
    pub created_at: String,
}

/// Aggregate counters for the `stats` command
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct DbStats {
    pub tasks: usize,
    pub completed_tasks: usize,
    pub results: usize,
}

impl SqliteResultStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock();
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get a task row by id
    pub fn get_task(&self, task_id: &str) -> Result<Option<TaskRow>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, status, error, total_pairs, processed_pairs, created_at FROM tasks WHERE id = ?1",
            [task_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?
        .map(|(id, status, error, total, processed, created_at)| {
            Ok(TaskRow {
                id,
                status: TaskStatus::from_str(&status)?,
                error,
                total_pairs: total as usize,
                processed_pairs: processed as usize,
                created_at,
            })
        })
        .transpose()
    }

    /// All pair rows for a task, canonical order
    pub fn results_for_task(&self, task_id: &str) -> Result<Vec<ResultRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT task_id, hash_a, hash_b, token_similarity, ast_similarity, matches, reason, created_at
             FROM similarity_results WHERE task_id = ?1 ORDER BY hash_a, hash_b",
        )?;
        let rows = stmt
            .query_map([task_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .map(|(task_id, hash_a, hash_b, token, ast, matches, reason, created_at)| {
                let matches = decode_matches(&matches);
                let key = PairKey::new(ContentHash::from_hex(hash_a), ContentHash::from_hex(hash_b));
                ResultRow {
                    task_id,
                    result: PairResult {
                        key,
                        token_similarity: token,
                        ast_similarity: ast,
                        matches,
                        reason,
                    },
                    created_at,
                }
            })
            .collect();
        Ok(rows)
    }

    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.lock();
        let tasks: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |r| r.get(0))?;
        let completed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status = 'completed'",
            [],
            |r| r.get(0),
        )?;
        let results: i64 =
            conn.query_row("SELECT COUNT(*) FROM similarity_results", [], |r| r.get(0))?;
        Ok(DbStats {
            tasks: tasks as usize,
            completed_tasks: completed as usize,
            results: results as usize,
        })
    }
}

impl ResultStore for SqliteResultStore {
    fn create_task(&self, task_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO tasks (id) VALUES (?1) ON CONFLICT(id) DO NOTHING",
            [task_id],
        )?;
        Ok(())
    }

    fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE tasks SET status = ?2, error = ?3 WHERE id = ?1",
            params![task_id, status.as_str(), error],
        )?;
        Ok(())
    }

    fn update_task_progress(&self, task_id: &str, processed: usize, total: usize) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE tasks SET processed_pairs = ?2, total_pairs = ?3 WHERE id = ?1",
            params![task_id, processed as i64, total as i64],
        )?;
        Ok(())
    }

    fn upsert_result(&self, task_id: &str, result: &PairResult) -> Result<()> {
        let tuples: Vec<[u32; 4]> = result.matches.iter().map(Match::as_tuple).collect();
        let matches = serde_json::to_string(&tuples).unwrap_or_else(|_| "[]".to_string());
        let conn = self.lock();
        conn.execute(
            r#"
            INSERT INTO similarity_results
                (task_id, hash_a, hash_b, token_similarity, ast_similarity, matches, reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(task_id, hash_a, hash_b) DO UPDATE SET
                token_similarity = excluded.token_similarity,
                ast_similarity = excluded.ast_similarity,
                matches = excluded.matches,
                reason = excluded.reason
            "#,
            params![
                task_id,
                result.key.a().as_str(),
                result.key.b().as_str(),
                result.token_similarity,
                result.ast_similarity,
                matches,
                result.reason,
            ],
        )?;
        Ok(())
    }

    fn has_result(&self, task_id: &str, key: &PairKey) -> Result<bool> {
        let conn = self.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM similarity_results WHERE task_id = ?1 AND hash_a = ?2 AND hash_b = ?3",
                params![task_id, key.a().as_str(), key.b().as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn decode_matches(json: &str) -> Vec<Match> {
    serde_json::from_str::<Vec<[u32; 4]>>(json)
        .map(|tuples| tuples.into_iter().map(Match::from_tuple).collect())
        .unwrap_or_default()
}
