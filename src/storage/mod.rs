//! Persistent result storage
//!
//! The engine's output surface: per-pair similarity rows and task
//! status/progress, written through the `ResultStore` seam. The
//! shipped implementation is SQLite.

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteResultStore;

use crate::pair::{PairKey, PairResult};
use crate::{Error, Result};
use std::str::FromStr;

/// Externally-owned task status, observed and advanced by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(Error::Task(format!("unknown task status: {other}"))),
        }
    }
}

/// Where per-pair results and task progress land.
///
/// All writes are idempotent: results upsert on the canonical
/// `(task_id, hash_a, hash_b)` key, so a retried job converges.
pub trait ResultStore: Send + Sync {
    fn create_task(&self, task_id: &str) -> Result<()>;
    fn update_task_status(&self, task_id: &str, status: TaskStatus, error: Option<&str>)
        -> Result<()>;
    fn update_task_progress(&self, task_id: &str, processed: usize, total: usize) -> Result<()>;
    fn upsert_result(&self, task_id: &str, result: &PairResult) -> Result<()>;
    fn has_result(&self, task_id: &str, key: &PairKey) -> Result<bool>;
}
