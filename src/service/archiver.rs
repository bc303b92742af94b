//! Archival of form response task data.
//!
//! The generic archival pipeline hands us a resource and an archival type;
//! anything that is not a form response passes through untouched. The two
//! archival types map to two typed sub-services, matched exhaustively, so an
//! unknown archival type cannot exist at this level.

use super::ServiceError;
use crate::forms::FORMS_RESOURCE_TYPE;
use crate::store::TaskStore;
use crate::workflow::{ResourceWorkflow, WorkflowProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// How a resource's task data is archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchivalType {
    /// Physical removal of audit rows and correction aggregates.
    Delete,
    /// Field scrubbing; rows are retained without their recorded values.
    Anonymize,
}

/// Deletes everything this module persisted for a resource.
#[derive(Clone)]
pub struct DeleteArchiveProcessing {
    store: Arc<dyn TaskStore>,
    workflow: Arc<dyn WorkflowProvider>,
}

impl DeleteArchiveProcessing {
    pub fn new(store: Arc<dyn TaskStore>, workflow: Arc<dyn WorkflowProvider>) -> Self {
        Self { store, workflow }
    }

    pub async fn archive(&self, resource: &ResourceWorkflow) -> Result<(), ServiceError> {
        let histories = self
            .workflow
            .histories_for_resource(resource.id_resource)
            .await
            .map_err(ServiceError::Workflow)?;
        self.store
            .delete_all_for_histories(&histories)
            .await
            .map_err(ServiceError::Storage)?;
        info!(
            id_resource = resource.id_resource,
            histories = histories.len(),
            "deleted task data for archived resource"
        );
        Ok(())
    }
}

/// Scrubs recorded values while keeping the audit trail.
#[derive(Clone)]
pub struct AnonymizeArchiveProcessing {
    store: Arc<dyn TaskStore>,
    workflow: Arc<dyn WorkflowProvider>,
}

impl AnonymizeArchiveProcessing {
    pub fn new(store: Arc<dyn TaskStore>, workflow: Arc<dyn WorkflowProvider>) -> Self {
        Self { store, workflow }
    }

    pub async fn archive(&self, resource: &ResourceWorkflow) -> Result<(), ServiceError> {
        let histories = self
            .workflow
            .histories_for_resource(resource.id_resource)
            .await
            .map_err(ServiceError::Workflow)?;
        self.store
            .anonymize_history_for_histories(&histories)
            .await
            .map_err(ServiceError::Storage)?;
        info!(
            id_resource = resource.id_resource,
            histories = histories.len(),
            "anonymized task data for archived resource"
        );
        Ok(())
    }
}

/// Dispatches archive requests to the typed sub-services. Does not catch or
/// translate errors from either path.
#[derive(Clone)]
pub struct ResourceArchiver {
    delete: DeleteArchiveProcessing,
    anonymize: AnonymizeArchiveProcessing,
}

impl ResourceArchiver {
    pub fn new(store: Arc<dyn TaskStore>, workflow: Arc<dyn WorkflowProvider>) -> Self {
        Self {
            delete: DeleteArchiveProcessing::new(store.clone(), workflow.clone()),
            anonymize: AnonymizeArchiveProcessing::new(store, workflow),
        }
    }

    /// No-op for anything that is not a form response.
    pub async fn archive_resource(
        &self,
        archival_type: ArchivalType,
        resource: &ResourceWorkflow,
    ) -> Result<(), ServiceError> {
        if resource.resource_type != FORMS_RESOURCE_TYPE {
            return Ok(());
        }
        match archival_type {
            ArchivalType::Delete => self.delete.archive(resource).await,
            ArchivalType::Anonymize => self.anonymize.archive(resource).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::QuestionRef;
    use crate::store::{HistoryChannel, MemoryStore, ResponseCorrection, TaskHistoryEntry};
    use crate::workflow::InMemoryWorkflowProvider;

    async fn seeded() -> (ResourceArchiver, Arc<MemoryStore>, InMemoryWorkflowProvider) {
        let store = Arc::new(MemoryStore::new());
        let workflow = InMemoryWorkflowProvider::new();
        workflow.add_history(1, 100).await;
        workflow.add_history(2, 100).await;
        workflow.add_history(3, 200).await;

        for id_history in [1, 2, 3] {
            store
                .insert_history(
                    HistoryChannel::Resubmit,
                    &TaskHistoryEntry {
                        id_history,
                        id_task: 5,
                        question: QuestionRef {
                            id: 1,
                            iteration_number: 0,
                        },
                        new_value: "sensitive".to_string(),
                    },
                )
                .await
                .expect("insert");
        }
        store
            .upsert_correction(
                HistoryChannel::Resubmit,
                &ResponseCorrection {
                    id_history: 1,
                    id_task: 5,
                    message: None,
                    is_complete: true,
                    questions: vec![],
                },
            )
            .await
            .expect("upsert");

        let archiver = ResourceArchiver::new(store.clone(), Arc::new(workflow.clone()));
        (archiver, store, workflow)
    }

    fn forms_resource(id_resource: i64) -> ResourceWorkflow {
        ResourceWorkflow {
            id_resource,
            resource_type: FORMS_RESOURCE_TYPE.to_string(),
            id_state: 1,
        }
    }

    #[tokio::test]
    async fn non_form_resource_is_untouched() {
        let (archiver, store, _) = seeded().await;
        let resource = ResourceWorkflow {
            id_resource: 100,
            resource_type: "APPOINTMENT".to_string(),
            id_state: 1,
        };

        archiver
            .archive_resource(ArchivalType::Delete, &resource)
            .await
            .expect("archive");
        archiver
            .archive_resource(ArchivalType::Anonymize, &resource)
            .await
            .expect("archive");

        let rows = store
            .history_by_history_and_task(HistoryChannel::Resubmit, 1, 5)
            .await
            .expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].new_value, "sensitive");
    }

    #[tokio::test]
    async fn delete_removes_only_the_resource_histories() {
        let (archiver, store, _) = seeded().await;

        archiver
            .archive_resource(ArchivalType::Delete, &forms_resource(100))
            .await
            .expect("archive");

        for id_history in [1, 2] {
            let rows = store
                .history_by_history_and_task(HistoryChannel::Resubmit, id_history, 5)
                .await
                .expect("select");
            assert!(rows.is_empty());
        }
        assert!(store
            .correction(HistoryChannel::Resubmit, 1, 5)
            .await
            .expect("load")
            .is_none());

        // The other resource's history survives.
        let other = store
            .history_by_history_and_task(HistoryChannel::Resubmit, 3, 5)
            .await
            .expect("select");
        assert_eq!(other.len(), 1);
    }

    #[tokio::test]
    async fn anonymize_scrubs_values_but_keeps_rows() {
        let (archiver, store, _) = seeded().await;

        archiver
            .archive_resource(ArchivalType::Anonymize, &forms_resource(100))
            .await
            .expect("archive");

        let rows = store
            .history_by_history_and_task(HistoryChannel::Resubmit, 1, 5)
            .await
            .expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].new_value, "");
        // Sibling resource untouched.
        let other = store
            .history_by_history_and_task(HistoryChannel::Resubmit, 3, 5)
            .await
            .expect("select");
        assert_eq!(other[0].new_value, "sensitive");
    }
}
