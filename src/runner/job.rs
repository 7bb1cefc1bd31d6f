//! Job wire record
//!
//! The broker delivers one job per task: an ordered list of file refs
//! plus optional engine overrides. Omitted options fall back to the
//! engine defaults.

use crate::config::JobOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFile {
    pub file_id: String,
    pub content_hash: String,
    pub language: String,
    pub bytes_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub task_id: String,
    pub files: Vec<JobFile>,
    #[serde(default)]
    pub options: JobOptions,
}
