//! Task storage with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `sqlite`: SQLite database
//!
//! Holds the audit history rows written when a correction is accepted, the
//! correction aggregates (resubmit/complete), and the per-task state
//! controller configuration.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::forms::QuestionRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which correction flow a record belongs to.
///
/// The two flows persist into sibling tables with identical shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryChannel {
    Complete,
    Resubmit,
}

impl HistoryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryChannel::Complete => "complete",
            HistoryChannel::Resubmit => "resubmit",
        }
    }
}

/// One audit row: the value recorded for a question when a correction was
/// accepted. Natural key: (id_history, id_task) plus question identity.
/// Rows are never updated; they are deleted en masse per (id_history,
/// id_task) when the owning history entry goes away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHistoryEntry {
    pub id_history: i64,
    pub id_task: i64,
    pub question: QuestionRef,
    pub new_value: String,
}

/// The correction aggregate attached to a (history, task) pair: which
/// questions were flagged for correction and whether the correction has been
/// completed. Completion is one-way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCorrection {
    pub id_history: i64,
    pub id_task: i64,
    pub message: Option<String>,
    pub is_complete: bool,
    pub questions: Vec<QuestionRef>,
}

impl ResponseCorrection {
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }
}

/// Per-task configuration: which state a resource must be in for a
/// correction to be accepted, and where it moves afterwards. One row per
/// task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateControllerConfig {
    pub id_task: i64,
    pub id_eligible_state: i64,
    pub id_target_state: i64,
}

/// Task store trait - implemented by all storage backends.
///
/// Storage faults propagate as `Err(String)`; no retry, no partial-success
/// handling.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Persist a new audit row. Writers are serialized by the backend.
    async fn insert_history(
        &self,
        channel: HistoryChannel,
        entry: &TaskHistoryEntry,
    ) -> Result<(), String>;

    /// All audit rows for a (history, task) pair, in storage order.
    /// Empty when nothing matches.
    async fn history_by_history_and_task(
        &self,
        channel: HistoryChannel,
        id_history: i64,
        id_task: i64,
    ) -> Result<Vec<TaskHistoryEntry>, String>;

    /// Remove all audit rows for a (history, task) pair. No-op when nothing
    /// matches; rows of other pairs are untouched.
    async fn delete_history_by_history_and_task(
        &self,
        channel: HistoryChannel,
        id_history: i64,
        id_task: i64,
    ) -> Result<(), String>;

    /// Create or replace the correction aggregate for a (history, task) pair.
    async fn upsert_correction(
        &self,
        channel: HistoryChannel,
        correction: &ResponseCorrection,
    ) -> Result<(), String>;

    /// The correction aggregate for a (history, task) pair, if any.
    async fn correction(
        &self,
        channel: HistoryChannel,
        id_history: i64,
        id_task: i64,
    ) -> Result<Option<ResponseCorrection>, String>;

    /// Mark a correction complete. One-way; completing an already complete
    /// correction is a no-op.
    async fn mark_correction_complete(
        &self,
        channel: HistoryChannel,
        id_history: i64,
        id_task: i64,
    ) -> Result<(), String>;

    /// Physically remove all audit rows and correction aggregates (both
    /// channels) for the given history ids. Archival: DELETE.
    async fn delete_all_for_histories(&self, ids: &[i64]) -> Result<(), String>;

    /// Scrub the recorded values of all audit rows (both channels) for the
    /// given history ids, retaining the rows. Archival: ANONYMIZE.
    async fn anonymize_history_for_histories(&self, ids: &[i64]) -> Result<(), String>;

    /// Insert a new state controller config row.
    async fn insert_config(&self, config: &StateControllerConfig) -> Result<(), String>;

    /// Update an existing state controller config row.
    async fn update_config(&self, config: &StateControllerConfig) -> Result<(), String>;

    /// Delete the config row of a task. No-op when absent.
    async fn delete_config_by_task(&self, id_task: i64) -> Result<(), String>;

    /// The config row of a task, if any.
    async fn config_by_task(&self, id_task: i64) -> Result<Option<StateControllerConfig>, String>;
}

/// Task store type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreType {
    Memory,
    #[default]
    Sqlite,
}

impl StoreType {
    /// Parse from environment variable value.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "memory" => Self::Memory,
            "sqlite" | "db" => Self::Sqlite,
            _ => Self::default(),
        }
    }
}

/// Create a task store based on type and configuration.
pub async fn create_store(
    store_type: StoreType,
    database_path: PathBuf,
) -> Result<Box<dyn TaskStore>, String> {
    match store_type {
        StoreType::Memory => Ok(Box::new(MemoryStore::new())),
        StoreType::Sqlite => {
            let store = SqliteStore::new(database_path).await?;
            Ok(Box::new(store))
        }
    }
}
