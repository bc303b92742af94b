//! Correction flow over a form response.
//!
//! Two states, one-way: INCOMPLETE -> COMPLETE. The controller enforces the
//! sequencing (validate, edit data, change state, mark complete); the
//! service exposes the individual operations.

use super::history::TaskHistoryService;
use super::ServiceError;
use crate::forms::{FormResponse, FormsDirectory, Question, QuestionRef};
use crate::store::{HistoryChannel, ResponseCorrection, TaskHistoryEntry, TaskStore};
use crate::workflow::WorkflowProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One submitted field correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionAnswer {
    pub id_question: i64,
    pub iteration_number: i32,
    pub value: String,
}

impl CorrectionAnswer {
    fn question(&self) -> QuestionRef {
        QuestionRef {
            id: self.id_question,
            iteration_number: self.iteration_number,
        }
    }
}

/// Correction service for one channel (resubmit or complete).
#[derive(Clone)]
pub struct ResponseTaskService {
    channel: HistoryChannel,
    store: Arc<dyn TaskStore>,
    forms: Arc<dyn FormsDirectory>,
    workflow: Arc<dyn WorkflowProvider>,
    history: TaskHistoryService,
}

impl ResponseTaskService {
    pub fn new(
        channel: HistoryChannel,
        store: Arc<dyn TaskStore>,
        forms: Arc<dyn FormsDirectory>,
        workflow: Arc<dyn WorkflowProvider>,
    ) -> Self {
        let history = TaskHistoryService::new(channel, store.clone(), forms.clone());
        Self {
            channel,
            store,
            forms,
            workflow,
            history,
        }
    }

    pub fn resubmit(
        store: Arc<dyn TaskStore>,
        forms: Arc<dyn FormsDirectory>,
        workflow: Arc<dyn WorkflowProvider>,
    ) -> Self {
        Self::new(HistoryChannel::Resubmit, store, forms, workflow)
    }

    pub fn complete(
        store: Arc<dyn TaskStore>,
        forms: Arc<dyn FormsDirectory>,
        workflow: Arc<dyn WorkflowProvider>,
    ) -> Self {
        Self::new(HistoryChannel::Complete, store, forms, workflow)
    }

    pub fn channel(&self) -> HistoryChannel {
        self.channel
    }

    pub fn history(&self) -> &TaskHistoryService {
        &self.history
    }

    /// The correction aggregate attached to a (history, task) pair.
    pub async fn find(
        &self,
        id_history: i64,
        id_task: i64,
    ) -> Result<Option<ResponseCorrection>, ServiceError> {
        self.store
            .correction(self.channel, id_history, id_task)
            .await
            .map_err(ServiceError::Storage)
    }

    /// Attach a correction to a (history, task) pair, flagging the given
    /// questions for correction. Called when the workflow task executes.
    pub async fn create(
        &self,
        id_history: i64,
        id_task: i64,
        message: Option<String>,
        questions: Vec<QuestionRef>,
    ) -> Result<ResponseCorrection, ServiceError> {
        let correction = ResponseCorrection {
            id_history,
            id_task,
            message,
            is_complete: false,
            questions,
        };
        self.store
            .upsert_correction(self.channel, &correction)
            .await
            .map_err(ServiceError::Storage)?;
        Ok(correction)
    }

    /// The structural question list the correction form must present:
    /// questions flagged for correction that the form response actually
    /// answers, resolved to full questions.
    pub async fn questions_to_edit(
        &self,
        form_response: &FormResponse,
        flagged: &[QuestionRef],
    ) -> Result<Vec<Question>, ServiceError> {
        let mut questions = Vec::new();
        for reference in flagged {
            if !form_response.answers(*reference) {
                continue;
            }
            match self
                .forms
                .question(reference.id)
                .await
                .map_err(ServiceError::Forms)?
            {
                Some(mut question) => {
                    question.iteration_number = reference.iteration_number;
                    questions.push(question);
                }
                None => {
                    tracing::warn!(
                        id_question = reference.id,
                        "flagged question no longer exists, skipping"
                    );
                }
            }
        }
        Ok(questions)
    }

    /// Validate and write submitted field values: every flagged question
    /// must receive a non-empty answer, and no answer may target an
    /// unflagged question. Each accepted answer produces one audit row.
    pub async fn do_edit_response_data(
        &self,
        correction: &ResponseCorrection,
        answers: &[CorrectionAnswer],
    ) -> Result<(), ServiceError> {
        for answer in answers {
            if !correction.questions.contains(&answer.question()) {
                return Err(ServiceError::UnknownQuestion(answer.id_question));
            }
        }
        for flagged in &correction.questions {
            let answered = answers
                .iter()
                .any(|a| a.question() == *flagged && !a.value.trim().is_empty());
            if !answered {
                return Err(ServiceError::MissingAnswer(flagged.id));
            }
        }

        let form_response = self
            .forms
            .response_by_history(correction.id_history)
            .await
            .map_err(ServiceError::Forms)?
            .ok_or_else(|| {
                ServiceError::Forms(format!(
                    "No form response behind history {}",
                    correction.id_history
                ))
            })?;

        for answer in answers {
            self.forms
                .record_answer(form_response.id, answer.question(), &answer.value)
                .await
                .map_err(ServiceError::Forms)?;
            self.history
                .create(&TaskHistoryEntry {
                    id_history: correction.id_history,
                    id_task: correction.id_task,
                    question: answer.question(),
                    new_value: answer.value.clone(),
                })
                .await?;
            debug!(
                channel = self.channel.as_str(),
                id_history = correction.id_history,
                id_task = correction.id_task,
                id_question = answer.id_question,
                "recorded corrected answer"
            );
        }
        Ok(())
    }

    /// Move the workflow resource to the configured target state. A task
    /// without a config row has nowhere to move the resource; nothing
    /// happens then.
    pub async fn do_change_response_state(
        &self,
        correction: &ResponseCorrection,
    ) -> Result<(), ServiceError> {
        let config = self
            .store
            .config_by_task(correction.id_task)
            .await
            .map_err(ServiceError::Storage)?;
        match config {
            Some(config) => self
                .workflow
                .change_state(correction.id_history, config.id_target_state)
                .await
                .map_err(ServiceError::Workflow),
            None => {
                tracing::warn!(
                    id_task = correction.id_task,
                    "no state controller config, leaving resource state untouched"
                );
                Ok(())
            }
        }
    }

    /// Terminal transition; the pair admits no further edits afterwards.
    pub async fn do_complete_response(
        &self,
        correction: &ResponseCorrection,
    ) -> Result<(), ServiceError> {
        self.store
            .mark_correction_complete(self.channel, correction.id_history, correction.id_task)
            .await
            .map_err(ServiceError::Storage)
    }

    /// Re-check at submission time that the resource still sits in the
    /// configured eligible state. A state change can land between form
    /// render and form submit; this closes that window.
    pub async fn is_record_state_valid(
        &self,
        correction: &ResponseCorrection,
    ) -> Result<bool, ServiceError> {
        let config = match self
            .store
            .config_by_task(correction.id_task)
            .await
            .map_err(ServiceError::Storage)?
        {
            Some(config) => config,
            // Unconfigured task: fail closed.
            None => return Ok(false),
        };
        let resource = self
            .workflow
            .resource_by_history(correction.id_history)
            .await
            .map_err(ServiceError::Workflow)?;
        Ok(resource
            .map(|r| r.id_state == config.id_eligible_state)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{FormResponseValue, InMemoryFormsDirectory};
    use crate::store::{MemoryStore, StateControllerConfig};
    use crate::workflow::{InMemoryWorkflowProvider, ResourceWorkflow};

    const ID_HISTORY: i64 = 10;
    const ID_TASK: i64 = 20;
    const ID_RESOURCE: i64 = 30;
    const ELIGIBLE_STATE: i64 = 2;
    const TARGET_STATE: i64 = 3;

    struct Fixture {
        service: ResponseTaskService,
        store: Arc<MemoryStore>,
        forms: InMemoryFormsDirectory,
        workflow: InMemoryWorkflowProvider,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let forms = InMemoryFormsDirectory::new();
        let workflow = InMemoryWorkflowProvider::new();

        forms
            .add_question(Question {
                id: 1,
                title: "Name".to_string(),
                id_step: 1,
                iteration_number: 0,
            })
            .await;
        forms
            .add_question(Question {
                id: 2,
                title: "Address".to_string(),
                id_step: 1,
                iteration_number: 0,
            })
            .await;
        forms
            .add_response(FormResponse {
                id: ID_RESOURCE,
                id_form: 1,
                values: vec![
                    FormResponseValue {
                        question: QuestionRef {
                            id: 1,
                            iteration_number: 0,
                        },
                        value: "old name".to_string(),
                    },
                    FormResponseValue {
                        question: QuestionRef {
                            id: 2,
                            iteration_number: 0,
                        },
                        value: "old address".to_string(),
                    },
                ],
            })
            .await;
        forms.bind_history(ID_HISTORY, ID_RESOURCE).await;

        workflow
            .add_resource(ResourceWorkflow {
                id_resource: ID_RESOURCE,
                resource_type: crate::forms::FORMS_RESOURCE_TYPE.to_string(),
                id_state: ELIGIBLE_STATE,
            })
            .await;
        workflow.add_history(ID_HISTORY, ID_RESOURCE).await;

        store
            .insert_config(&StateControllerConfig {
                id_task: ID_TASK,
                id_eligible_state: ELIGIBLE_STATE,
                id_target_state: TARGET_STATE,
            })
            .await
            .expect("config");

        let service = ResponseTaskService::resubmit(
            store.clone(),
            Arc::new(forms.clone()),
            Arc::new(workflow.clone()),
        );
        Fixture {
            service,
            store,
            forms,
            workflow,
        }
    }

    fn flagged() -> Vec<QuestionRef> {
        vec![QuestionRef {
            id: 1,
            iteration_number: 0,
        }]
    }

    #[tokio::test]
    async fn find_returns_none_before_creation() {
        let f = fixture().await;
        assert!(f
            .service
            .find(ID_HISTORY, ID_TASK)
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn state_check_honors_configured_precondition() {
        let f = fixture().await;
        let correction = f
            .service
            .create(ID_HISTORY, ID_TASK, None, flagged())
            .await
            .expect("create");

        assert!(f
            .service
            .is_record_state_valid(&correction)
            .await
            .expect("valid"));

        // Out-of-band transition between render and submit.
        f.workflow.set_resource_state(ID_RESOURCE, 99).await;
        assert!(!f
            .service
            .is_record_state_valid(&correction)
            .await
            .expect("valid"));
    }

    #[tokio::test]
    async fn state_check_fails_closed_without_config() {
        let f = fixture().await;
        let correction = f
            .service
            .create(ID_HISTORY, ID_TASK, None, flagged())
            .await
            .expect("create");
        f.store
            .delete_config_by_task(ID_TASK)
            .await
            .expect("delete config");

        assert!(!f
            .service
            .is_record_state_valid(&correction)
            .await
            .expect("valid"));
    }

    #[tokio::test]
    async fn edit_writes_answer_and_audit_row() {
        let f = fixture().await;
        let correction = f
            .service
            .create(ID_HISTORY, ID_TASK, Some("fix the name".to_string()), flagged())
            .await
            .expect("create");

        f.service
            .do_edit_response_data(
                &correction,
                &[CorrectionAnswer {
                    id_question: 1,
                    iteration_number: 0,
                    value: "new name".to_string(),
                }],
            )
            .await
            .expect("edit");

        let response = f
            .forms
            .response(ID_RESOURCE)
            .await
            .expect("response")
            .expect("present");
        assert_eq!(response.values[0].value, "new name");
        // The unflagged question is untouched.
        assert_eq!(response.values[1].value, "old address");

        let audit = f
            .service
            .history()
            .load(ID_HISTORY, ID_TASK)
            .await
            .expect("audit");
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].new_value, "new name");
    }

    #[tokio::test]
    async fn edit_rejects_unflagged_question() {
        let f = fixture().await;
        let correction = f
            .service
            .create(ID_HISTORY, ID_TASK, None, flagged())
            .await
            .expect("create");

        let err = f
            .service
            .do_edit_response_data(
                &correction,
                &[
                    CorrectionAnswer {
                        id_question: 1,
                        iteration_number: 0,
                        value: "new name".to_string(),
                    },
                    CorrectionAnswer {
                        id_question: 2,
                        iteration_number: 0,
                        value: "sneaky".to_string(),
                    },
                ],
            )
            .await
            .expect_err("must reject");
        assert!(matches!(err, ServiceError::UnknownQuestion(2)));

        // Nothing was written.
        assert!(f
            .service
            .history()
            .load(ID_HISTORY, ID_TASK)
            .await
            .expect("audit")
            .is_empty());
    }

    #[tokio::test]
    async fn edit_rejects_missing_answer() {
        let f = fixture().await;
        let correction = f
            .service
            .create(ID_HISTORY, ID_TASK, None, flagged())
            .await
            .expect("create");

        let err = f
            .service
            .do_edit_response_data(
                &correction,
                &[CorrectionAnswer {
                    id_question: 1,
                    iteration_number: 0,
                    value: "   ".to_string(),
                }],
            )
            .await
            .expect_err("must reject");
        assert!(matches!(err, ServiceError::MissingAnswer(1)));
    }

    #[tokio::test]
    async fn change_state_moves_resource_to_target() {
        let f = fixture().await;
        let correction = f
            .service
            .create(ID_HISTORY, ID_TASK, None, flagged())
            .await
            .expect("create");

        f.service
            .do_change_response_state(&correction)
            .await
            .expect("change state");

        let resource = f
            .workflow
            .resource_by_history(ID_HISTORY)
            .await
            .expect("resource")
            .expect("present");
        assert_eq!(resource.id_state, TARGET_STATE);
    }

    #[tokio::test]
    async fn completion_is_terminal() {
        let f = fixture().await;
        let correction = f
            .service
            .create(ID_HISTORY, ID_TASK, None, flagged())
            .await
            .expect("create");
        assert!(!correction.is_complete());

        f.service
            .do_complete_response(&correction)
            .await
            .expect("complete");

        let reloaded = f
            .service
            .find(ID_HISTORY, ID_TASK)
            .await
            .expect("find")
            .expect("present");
        assert!(reloaded.is_complete());
    }

    #[tokio::test]
    async fn questions_to_edit_intersects_flagged_with_answered() {
        let f = fixture().await;
        let response = f
            .forms
            .response(ID_RESOURCE)
            .await
            .expect("response")
            .expect("present");

        let flagged = vec![
            QuestionRef {
                id: 1,
                iteration_number: 0,
            },
            // Flagged but never answered in this response.
            QuestionRef {
                id: 1,
                iteration_number: 7,
            },
        ];
        let questions = f
            .service
            .questions_to_edit(&response, &flagged)
            .await
            .expect("questions");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, 1);
        assert_eq!(questions[0].iteration_number, 0);
    }
}
