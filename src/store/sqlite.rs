//! SQLite-based task store.

use super::{
    HistoryChannel, ResponseCorrection, StateControllerConfig, TaskHistoryEntry, TaskStore,
};
use crate::forms::QuestionRef;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS workflow_task_complete_response_history (
    id_history INTEGER NOT NULL,
    id_task INTEGER NOT NULL,
    id_question INTEGER NOT NULL,
    iteration_number INTEGER NOT NULL,
    new_value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_complete_history_pair
    ON workflow_task_complete_response_history(id_history, id_task);

CREATE TABLE IF NOT EXISTS workflow_task_resubmit_response_history (
    id_history INTEGER NOT NULL,
    id_task INTEGER NOT NULL,
    id_question INTEGER NOT NULL,
    iteration_number INTEGER NOT NULL,
    new_value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_resubmit_history_pair
    ON workflow_task_resubmit_response_history(id_history, id_task);

CREATE TABLE IF NOT EXISTS workflow_task_complete_response (
    id_history INTEGER NOT NULL,
    id_task INTEGER NOT NULL,
    message TEXT,
    is_complete INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (id_history, id_task)
);

CREATE TABLE IF NOT EXISTS workflow_task_resubmit_response (
    id_history INTEGER NOT NULL,
    id_task INTEGER NOT NULL,
    message TEXT,
    is_complete INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (id_history, id_task)
);

CREATE TABLE IF NOT EXISTS workflow_task_complete_response_value (
    id_history INTEGER NOT NULL,
    id_task INTEGER NOT NULL,
    id_question INTEGER NOT NULL,
    iteration_number INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS workflow_task_resubmit_response_value (
    id_history INTEGER NOT NULL,
    id_task INTEGER NOT NULL,
    id_question INTEGER NOT NULL,
    iteration_number INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS workflow_task_forms_state_controller_config (
    id_task INTEGER PRIMARY KEY NOT NULL,
    id_eligible_state INTEGER NOT NULL,
    id_target_state INTEGER NOT NULL
);
"#;

fn history_table(channel: HistoryChannel) -> &'static str {
    match channel {
        HistoryChannel::Complete => "workflow_task_complete_response_history",
        HistoryChannel::Resubmit => "workflow_task_resubmit_response_history",
    }
}

fn response_table(channel: HistoryChannel) -> &'static str {
    match channel {
        HistoryChannel::Complete => "workflow_task_complete_response",
        HistoryChannel::Resubmit => "workflow_task_resubmit_response",
    }
}

fn value_table(channel: HistoryChannel) -> &'static str {
    match channel {
        HistoryChannel::Complete => "workflow_task_complete_response_value",
        HistoryChannel::Resubmit => "workflow_task_resubmit_response_value",
    }
}

/// The connection mutex serializes writers process-wide, which is what the
/// audit-row insert contract requires.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, String> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| format!("Failed to create database dir: {}", e))?;
            }
        }

        // Open database in blocking task
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)
                .map_err(|e| format!("Failed to open SQLite database: {}", e))?;

            conn.execute_batch(SCHEMA)
                .map_err(|e| format!("Failed to run schema: {}", e))?;

            Ok::<_, String>(conn)
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn insert_history(
        &self,
        channel: HistoryChannel,
        entry: &TaskHistoryEntry,
    ) -> Result<(), String> {
        let conn = self.conn.clone();
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                &format!(
                    "INSERT INTO {} (id_history, id_task, id_question, iteration_number, new_value)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    history_table(channel)
                ),
                params![
                    entry.id_history,
                    entry.id_task,
                    entry.question.id,
                    entry.question.iteration_number,
                    entry.new_value,
                ],
            )
            .map_err(|e| format!("Failed to insert history row: {}", e))?;
            Ok(())
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn history_by_history_and_task(
        &self,
        channel: HistoryChannel,
        id_history: i64,
        id_task: i64,
    ) -> Result<Vec<TaskHistoryEntry>, String> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT id_history, id_task, id_question, iteration_number, new_value
                     FROM {} WHERE id_history = ?1 AND id_task = ?2",
                    history_table(channel)
                ))
                .map_err(|e| format!("Failed to prepare select: {}", e))?;

            let rows = stmt
                .query_map(params![id_history, id_task], |row| {
                    Ok(TaskHistoryEntry {
                        id_history: row.get(0)?,
                        id_task: row.get(1)?,
                        question: QuestionRef {
                            id: row.get(2)?,
                            iteration_number: row.get(3)?,
                        },
                        new_value: row.get(4)?,
                    })
                })
                .map_err(|e| format!("Failed to query history: {}", e))?;

            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("Failed to read history row: {}", e))
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn delete_history_by_history_and_task(
        &self,
        channel: HistoryChannel,
        id_history: i64,
        id_task: i64,
    ) -> Result<(), String> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                &format!(
                    "DELETE FROM {} WHERE id_history = ?1 AND id_task = ?2",
                    history_table(channel)
                ),
                params![id_history, id_task],
            )
            .map_err(|e| format!("Failed to delete history rows: {}", e))?;
            Ok(())
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn upsert_correction(
        &self,
        channel: HistoryChannel,
        correction: &ResponseCorrection,
    ) -> Result<(), String> {
        let conn = self.conn.clone();
        let correction = correction.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn
                .transaction()
                .map_err(|e| format!("Failed to open transaction: {}", e))?;

            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO {} (id_history, id_task, message, is_complete)
                     VALUES (?1, ?2, ?3, ?4)",
                    response_table(channel)
                ),
                params![
                    correction.id_history,
                    correction.id_task,
                    correction.message,
                    correction.is_complete as i64,
                ],
            )
            .map_err(|e| format!("Failed to upsert correction: {}", e))?;

            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE id_history = ?1 AND id_task = ?2",
                    value_table(channel)
                ),
                params![correction.id_history, correction.id_task],
            )
            .map_err(|e| format!("Failed to clear correction values: {}", e))?;

            for question in &correction.questions {
                tx.execute(
                    &format!(
                        "INSERT INTO {} (id_history, id_task, id_question, iteration_number)
                         VALUES (?1, ?2, ?3, ?4)",
                        value_table(channel)
                    ),
                    params![
                        correction.id_history,
                        correction.id_task,
                        question.id,
                        question.iteration_number,
                    ],
                )
                .map_err(|e| format!("Failed to insert correction value: {}", e))?;
            }

            tx.commit()
                .map_err(|e| format!("Failed to commit correction: {}", e))
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn correction(
        &self,
        channel: HistoryChannel,
        id_history: i64,
        id_task: i64,
    ) -> Result<Option<ResponseCorrection>, String> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let head: Option<(Option<String>, bool)> = conn
                .query_row(
                    &format!(
                        "SELECT message, is_complete FROM {}
                         WHERE id_history = ?1 AND id_task = ?2",
                        response_table(channel)
                    ),
                    params![id_history, id_task],
                    |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
                )
                .optional()
                .map_err(|e| format!("Failed to query correction: {}", e))?;

            let Some((message, is_complete)) = head else {
                return Ok(None);
            };

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT id_question, iteration_number FROM {}
                     WHERE id_history = ?1 AND id_task = ?2",
                    value_table(channel)
                ))
                .map_err(|e| format!("Failed to prepare value select: {}", e))?;

            let questions = stmt
                .query_map(params![id_history, id_task], |row| {
                    Ok(QuestionRef {
                        id: row.get(0)?,
                        iteration_number: row.get(1)?,
                    })
                })
                .map_err(|e| format!("Failed to query correction values: {}", e))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("Failed to read correction value: {}", e))?;

            Ok(Some(ResponseCorrection {
                id_history,
                id_task,
                message,
                is_complete,
                questions,
            }))
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn mark_correction_complete(
        &self,
        channel: HistoryChannel,
        id_history: i64,
        id_task: i64,
    ) -> Result<(), String> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let changed = conn
                .execute(
                    &format!(
                        "UPDATE {} SET is_complete = 1
                         WHERE id_history = ?1 AND id_task = ?2",
                        response_table(channel)
                    ),
                    params![id_history, id_task],
                )
                .map_err(|e| format!("Failed to mark correction complete: {}", e))?;
            if changed == 0 {
                return Err(format!("Correction ({}, {}) not found", id_history, id_task));
            }
            Ok(())
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn delete_all_for_histories(&self, ids: &[i64]) -> Result<(), String> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn.clone();
        let ids = ids.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let placeholders = vec!["?"; ids.len()].join(", ");
            let tx = conn
                .transaction()
                .map_err(|e| format!("Failed to open transaction: {}", e))?;
            for channel in [HistoryChannel::Complete, HistoryChannel::Resubmit] {
                for table in [
                    history_table(channel),
                    response_table(channel),
                    value_table(channel),
                ] {
                    tx.execute(
                        &format!("DELETE FROM {} WHERE id_history IN ({})", table, placeholders),
                        rusqlite::params_from_iter(ids.iter()),
                    )
                    .map_err(|e| format!("Failed to delete rows of {}: {}", table, e))?;
                }
            }
            tx.commit()
                .map_err(|e| format!("Failed to commit deletion: {}", e))
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn anonymize_history_for_histories(&self, ids: &[i64]) -> Result<(), String> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn.clone();
        let ids = ids.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let placeholders = vec!["?"; ids.len()].join(", ");
            for channel in [HistoryChannel::Complete, HistoryChannel::Resubmit] {
                conn.execute(
                    &format!(
                        "UPDATE {} SET new_value = '' WHERE id_history IN ({})",
                        history_table(channel),
                        placeholders
                    ),
                    rusqlite::params_from_iter(ids.iter()),
                )
                .map_err(|e| format!("Failed to anonymize rows: {}", e))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn insert_config(&self, config: &StateControllerConfig) -> Result<(), String> {
        let conn = self.conn.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO workflow_task_forms_state_controller_config
                 (id_task, id_eligible_state, id_target_state) VALUES (?1, ?2, ?3)",
                params![
                    config.id_task,
                    config.id_eligible_state,
                    config.id_target_state
                ],
            )
            .map_err(|e| format!("Failed to insert config: {}", e))?;
            Ok(())
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn update_config(&self, config: &StateControllerConfig) -> Result<(), String> {
        let conn = self.conn.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "UPDATE workflow_task_forms_state_controller_config
                 SET id_eligible_state = ?2, id_target_state = ?3 WHERE id_task = ?1",
                params![
                    config.id_task,
                    config.id_eligible_state,
                    config.id_target_state
                ],
            )
            .map_err(|e| format!("Failed to update config: {}", e))?;
            Ok(())
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn delete_config_by_task(&self, id_task: i64) -> Result<(), String> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "DELETE FROM workflow_task_forms_state_controller_config WHERE id_task = ?1",
                params![id_task],
            )
            .map_err(|e| format!("Failed to delete config: {}", e))?;
            Ok(())
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn config_by_task(&self, id_task: i64) -> Result<Option<StateControllerConfig>, String> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row(
                "SELECT id_task, id_eligible_state, id_target_state
                 FROM workflow_task_forms_state_controller_config WHERE id_task = ?1",
                params![id_task],
                |row| {
                    Ok(StateControllerConfig {
                        id_task: row.get(0)?,
                        id_eligible_state: row.get(1)?,
                        id_target_state: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(|e| format!("Failed to query config: {}", e))
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }
}
