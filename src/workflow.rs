//! Workflow engine references.
//!
//! State transitions, actions and resource histories belong to the external
//! workflow engine; this module carries the read/transition surface the
//! correction tasks need, behind the [`WorkflowProvider`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A workflow state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: i64,
    pub name: String,
}

/// The workflow's view of a business resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceWorkflow {
    pub id_resource: i64,
    pub resource_type: String,
    pub id_state: i64,
}

/// A configured task within a workflow action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: i64,
    pub id_action: i64,
}

/// Read/transition access to the workflow engine.
#[async_trait]
pub trait WorkflowProvider: Send + Sync {
    /// The task configured under the given id, if any.
    async fn task(&self, id_task: i64) -> Result<Option<WorkflowTask>, String>;

    /// The resource a history entry was recorded against.
    async fn resource_by_history(&self, id_history: i64)
        -> Result<Option<ResourceWorkflow>, String>;

    /// States reachable from the given action (for the admin config screen).
    async fn states_for_action(&self, id_action: i64) -> Result<Vec<WorkflowState>, String>;

    /// Move the resource behind a history entry to the target state.
    async fn change_state(&self, id_history: i64, id_target_state: i64) -> Result<(), String>;

    /// All history entry ids recorded against a resource.
    async fn histories_for_resource(&self, id_resource: i64) -> Result<Vec<i64>, String>;
}

#[derive(Default)]
struct ProviderInner {
    tasks: HashMap<i64, WorkflowTask>,
    resources: HashMap<i64, ResourceWorkflow>,
    /// id_history -> id_resource
    histories: HashMap<i64, i64>,
    /// id_action -> states
    action_states: HashMap<i64, Vec<WorkflowState>>,
}

/// In-memory workflow provider (tests and demo wiring).
#[derive(Clone, Default)]
pub struct InMemoryWorkflowProvider {
    inner: Arc<RwLock<ProviderInner>>,
}

impl InMemoryWorkflowProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_task(&self, task: WorkflowTask) {
        self.inner.write().await.tasks.insert(task.id, task);
    }

    pub async fn add_resource(&self, resource: ResourceWorkflow) {
        self.inner
            .write()
            .await
            .resources
            .insert(resource.id_resource, resource);
    }

    pub async fn add_history(&self, id_history: i64, id_resource: i64) {
        self.inner
            .write()
            .await
            .histories
            .insert(id_history, id_resource);
    }

    pub async fn set_action_states(&self, id_action: i64, states: Vec<WorkflowState>) {
        self.inner
            .write()
            .await
            .action_states
            .insert(id_action, states);
    }

    /// Directly set a resource state (simulates an out-of-band transition).
    pub async fn set_resource_state(&self, id_resource: i64, id_state: i64) {
        if let Some(resource) = self.inner.write().await.resources.get_mut(&id_resource) {
            resource.id_state = id_state;
        }
    }
}

#[async_trait]
impl WorkflowProvider for InMemoryWorkflowProvider {
    async fn task(&self, id_task: i64) -> Result<Option<WorkflowTask>, String> {
        Ok(self.inner.read().await.tasks.get(&id_task).cloned())
    }

    async fn resource_by_history(
        &self,
        id_history: i64,
    ) -> Result<Option<ResourceWorkflow>, String> {
        let inner = self.inner.read().await;
        Ok(inner
            .histories
            .get(&id_history)
            .and_then(|id| inner.resources.get(id))
            .cloned())
    }

    async fn states_for_action(&self, id_action: i64) -> Result<Vec<WorkflowState>, String> {
        Ok(self
            .inner
            .read()
            .await
            .action_states
            .get(&id_action)
            .cloned()
            .unwrap_or_default())
    }

    async fn change_state(&self, id_history: i64, id_target_state: i64) -> Result<(), String> {
        let mut inner = self.inner.write().await;
        let id_resource = *inner
            .histories
            .get(&id_history)
            .ok_or_else(|| format!("History {} not found", id_history))?;
        let resource = inner
            .resources
            .get_mut(&id_resource)
            .ok_or_else(|| format!("Resource {} not found", id_resource))?;
        resource.id_state = id_target_state;
        Ok(())
    }

    async fn histories_for_resource(&self, id_resource: i64) -> Result<Vec<i64>, String> {
        let mut ids: Vec<i64> = self
            .inner
            .read()
            .await
            .histories
            .iter()
            .filter(|(_, res)| **res == id_resource)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
