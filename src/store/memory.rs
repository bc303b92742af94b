//! In-memory task store (non-persistent).

use super::{
    HistoryChannel, ResponseCorrection, StateControllerConfig, TaskHistoryEntry, TaskStore,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    complete_history: Vec<TaskHistoryEntry>,
    resubmit_history: Vec<TaskHistoryEntry>,
    complete_corrections: HashMap<(i64, i64), ResponseCorrection>,
    resubmit_corrections: HashMap<(i64, i64), ResponseCorrection>,
    configs: HashMap<i64, StateControllerConfig>,
}

impl Inner {
    fn history(&self, channel: HistoryChannel) -> &Vec<TaskHistoryEntry> {
        match channel {
            HistoryChannel::Complete => &self.complete_history,
            HistoryChannel::Resubmit => &self.resubmit_history,
        }
    }

    fn history_mut(&mut self, channel: HistoryChannel) -> &mut Vec<TaskHistoryEntry> {
        match channel {
            HistoryChannel::Complete => &mut self.complete_history,
            HistoryChannel::Resubmit => &mut self.resubmit_history,
        }
    }

    fn corrections_mut(
        &mut self,
        channel: HistoryChannel,
    ) -> &mut HashMap<(i64, i64), ResponseCorrection> {
        match channel {
            HistoryChannel::Complete => &mut self.complete_corrections,
            HistoryChannel::Resubmit => &mut self.resubmit_corrections,
        }
    }

    fn corrections(&self, channel: HistoryChannel) -> &HashMap<(i64, i64), ResponseCorrection> {
        match channel {
            HistoryChannel::Complete => &self.complete_corrections,
            HistoryChannel::Resubmit => &self.resubmit_corrections,
        }
    }
}

/// Non-persistent store; insertion order doubles as storage order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn insert_history(
        &self,
        channel: HistoryChannel,
        entry: &TaskHistoryEntry,
    ) -> Result<(), String> {
        self.inner
            .write()
            .await
            .history_mut(channel)
            .push(entry.clone());
        Ok(())
    }

    async fn history_by_history_and_task(
        &self,
        channel: HistoryChannel,
        id_history: i64,
        id_task: i64,
    ) -> Result<Vec<TaskHistoryEntry>, String> {
        Ok(self
            .inner
            .read()
            .await
            .history(channel)
            .iter()
            .filter(|e| e.id_history == id_history && e.id_task == id_task)
            .cloned()
            .collect())
    }

    async fn delete_history_by_history_and_task(
        &self,
        channel: HistoryChannel,
        id_history: i64,
        id_task: i64,
    ) -> Result<(), String> {
        self.inner
            .write()
            .await
            .history_mut(channel)
            .retain(|e| !(e.id_history == id_history && e.id_task == id_task));
        Ok(())
    }

    async fn upsert_correction(
        &self,
        channel: HistoryChannel,
        correction: &ResponseCorrection,
    ) -> Result<(), String> {
        self.inner.write().await.corrections_mut(channel).insert(
            (correction.id_history, correction.id_task),
            correction.clone(),
        );
        Ok(())
    }

    async fn correction(
        &self,
        channel: HistoryChannel,
        id_history: i64,
        id_task: i64,
    ) -> Result<Option<ResponseCorrection>, String> {
        Ok(self
            .inner
            .read()
            .await
            .corrections(channel)
            .get(&(id_history, id_task))
            .cloned())
    }

    async fn mark_correction_complete(
        &self,
        channel: HistoryChannel,
        id_history: i64,
        id_task: i64,
    ) -> Result<(), String> {
        let mut inner = self.inner.write().await;
        let correction = inner
            .corrections_mut(channel)
            .get_mut(&(id_history, id_task))
            .ok_or_else(|| format!("Correction ({}, {}) not found", id_history, id_task))?;
        correction.is_complete = true;
        Ok(())
    }

    async fn delete_all_for_histories(&self, ids: &[i64]) -> Result<(), String> {
        let mut inner = self.inner.write().await;
        for channel in [HistoryChannel::Complete, HistoryChannel::Resubmit] {
            inner
                .history_mut(channel)
                .retain(|e| !ids.contains(&e.id_history));
            inner
                .corrections_mut(channel)
                .retain(|(id_history, _), _| !ids.contains(id_history));
        }
        Ok(())
    }

    async fn anonymize_history_for_histories(&self, ids: &[i64]) -> Result<(), String> {
        let mut inner = self.inner.write().await;
        for channel in [HistoryChannel::Complete, HistoryChannel::Resubmit] {
            for entry in inner.history_mut(channel).iter_mut() {
                if ids.contains(&entry.id_history) {
                    entry.new_value = String::new();
                }
            }
        }
        Ok(())
    }

    async fn insert_config(&self, config: &StateControllerConfig) -> Result<(), String> {
        self.inner
            .write()
            .await
            .configs
            .insert(config.id_task, config.clone());
        Ok(())
    }

    async fn update_config(&self, config: &StateControllerConfig) -> Result<(), String> {
        self.inner
            .write()
            .await
            .configs
            .insert(config.id_task, config.clone());
        Ok(())
    }

    async fn delete_config_by_task(&self, id_task: i64) -> Result<(), String> {
        self.inner.write().await.configs.remove(&id_task);
        Ok(())
    }

    async fn config_by_task(&self, id_task: i64) -> Result<Option<StateControllerConfig>, String> {
        Ok(self.inner.read().await.configs.get(&id_task).cloned())
    }
}
