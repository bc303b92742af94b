//! State controller configuration access.
//!
//! One config row per task, written by the admin screens and read on every
//! correction attempt. Pure delegation to the store; no caching, no
//! validation.

use super::ServiceError;
use crate::store::{StateControllerConfig, TaskStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct StateControllerConfigService {
    store: Arc<dyn TaskStore>,
}

impl StateControllerConfigService {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, config: &StateControllerConfig) -> Result<(), ServiceError> {
        self.store
            .insert_config(config)
            .await
            .map_err(ServiceError::Storage)
    }

    pub async fn update(&self, config: &StateControllerConfig) -> Result<(), ServiceError> {
        self.store
            .update_config(config)
            .await
            .map_err(ServiceError::Storage)
    }

    pub async fn remove_by_task(&self, id_task: i64) -> Result<(), ServiceError> {
        self.store
            .delete_config_by_task(id_task)
            .await
            .map_err(ServiceError::Storage)
    }

    pub async fn find_by_task(
        &self,
        id_task: i64,
    ) -> Result<Option<StateControllerConfig>, ServiceError> {
        self.store
            .config_by_task(id_task)
            .await
            .map_err(ServiceError::Storage)
    }

    /// Create the row if the task has none yet, update it otherwise.
    pub async fn save(&self, config: &StateControllerConfig) -> Result<(), ServiceError> {
        if self.find_by_task(config.id_task).await?.is_some() {
            self.update(config).await
        } else {
            self.create(config).await
        }
    }
}
