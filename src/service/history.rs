//! Audit history over accepted corrections.

use super::ServiceError;
use crate::forms::{FormsDirectory, Question};
use crate::store::{HistoryChannel, TaskHistoryEntry, TaskStore};
use std::sync::Arc;

/// An audit row with its question rehydrated to full form.
#[derive(Debug, Clone)]
pub struct ResolvedHistoryEntry {
    pub id_history: i64,
    pub id_task: i64,
    pub question: Question,
    pub new_value: String,
}

/// Creates, loads and removes audit rows for one correction channel.
#[derive(Clone)]
pub struct TaskHistoryService {
    channel: HistoryChannel,
    store: Arc<dyn TaskStore>,
    forms: Arc<dyn FormsDirectory>,
}

impl TaskHistoryService {
    pub fn new(
        channel: HistoryChannel,
        store: Arc<dyn TaskStore>,
        forms: Arc<dyn FormsDirectory>,
    ) -> Self {
        Self {
            channel,
            store,
            forms,
        }
    }

    pub async fn create(&self, entry: &TaskHistoryEntry) -> Result<(), ServiceError> {
        self.store
            .insert_history(self.channel, entry)
            .await
            .map_err(ServiceError::Storage)
    }

    /// Load the audit rows of a (history, task) pair, resolving each stored
    /// question reference into a full question. The persisted iteration
    /// number wins over whatever the directory returns.
    pub async fn load(
        &self,
        id_history: i64,
        id_task: i64,
    ) -> Result<Vec<ResolvedHistoryEntry>, ServiceError> {
        let rows = self
            .store
            .history_by_history_and_task(self.channel, id_history, id_task)
            .await
            .map_err(ServiceError::Storage)?;

        let mut resolved = Vec::with_capacity(rows.len());
        for row in rows {
            let mut question = match self
                .forms
                .question(row.question.id)
                .await
                .map_err(ServiceError::Forms)?
            {
                Some(q) => q,
                None => {
                    // The question was removed from the form after the audit
                    // row was written; keep the row with a bare reference.
                    tracing::warn!(
                        id_question = row.question.id,
                        "audit row references a question the forms plugin no longer knows"
                    );
                    Question {
                        id: row.question.id,
                        title: String::new(),
                        id_step: 0,
                        iteration_number: row.question.iteration_number,
                    }
                }
            };
            question.iteration_number = row.question.iteration_number;
            resolved.push(ResolvedHistoryEntry {
                id_history: row.id_history,
                id_task: row.id_task,
                question,
                new_value: row.new_value,
            });
        }
        Ok(resolved)
    }

    pub async fn remove_all_by_history_and_task(
        &self,
        id_history: i64,
        id_task: i64,
    ) -> Result<(), ServiceError> {
        self.store
            .delete_history_by_history_and_task(self.channel, id_history, id_task)
            .await
            .map_err(ServiceError::Storage)
    }
}
