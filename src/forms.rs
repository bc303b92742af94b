//! Forms plugin model, referenced but never owned by the workflow tasks.
//!
//! The question/response model lives in the forms plugin; this service only
//! resolves questions and steps by id, rehydrates iteration numbers, and
//! writes corrected answers back. Everything goes through the
//! [`FormsDirectory`] trait so tests can run against the in-memory
//! implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Workflow resource type of a form response.
pub const FORMS_RESOURCE_TYPE: &str = "FORMS_FORM_RESPONSE";

/// Reference to a question: identity plus iteration number.
///
/// Forms can repeat sections, so a question is addressed by (id, iteration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionRef {
    pub id: i64,
    pub iteration_number: i32,
}

/// A fully resolved question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub title: String,
    pub id_step: i64,
    pub iteration_number: i32,
}

impl Question {
    /// The reference carried by audit rows and correction aggregates.
    pub fn as_ref(&self) -> QuestionRef {
        QuestionRef {
            id: self.id,
            iteration_number: self.iteration_number,
        }
    }
}

/// A step of a form (groups questions on one screen).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,
    pub title: String,
}

/// One answered field of a form response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormResponseValue {
    pub question: QuestionRef,
    pub value: String,
}

/// A submitted form response (the workflow resource being corrected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormResponse {
    pub id: i64,
    pub id_form: i64,
    pub values: Vec<FormResponseValue>,
}

impl FormResponse {
    /// Whether this response contains an answer for the given question.
    pub fn answers(&self, question: QuestionRef) -> bool {
        self.values.iter().any(|v| v.question == question)
    }
}

/// Read/write access to the forms plugin data this module needs.
#[async_trait]
pub trait FormsDirectory: Send + Sync {
    /// Resolve a question by id (iteration number is left at its default).
    async fn question(&self, id: i64) -> Result<Option<Question>, String>;

    /// Resolve a step by id.
    async fn step(&self, id: i64) -> Result<Option<Step>, String>;

    /// Resolve a form response by its id (the workflow resource id).
    async fn response(&self, id: i64) -> Result<Option<FormResponse>, String>;

    /// Resolve the form response behind a workflow history entry.
    async fn response_by_history(&self, id_history: i64) -> Result<Option<FormResponse>, String>;

    /// Write a corrected answer into the form response.
    async fn record_answer(
        &self,
        id_response: i64,
        question: QuestionRef,
        value: &str,
    ) -> Result<(), String>;
}

#[derive(Default)]
struct DirectoryInner {
    questions: HashMap<i64, Question>,
    steps: HashMap<i64, Step>,
    responses: HashMap<i64, FormResponse>,
    /// id_history -> id_response
    history_bindings: HashMap<i64, i64>,
}

/// In-memory forms directory (tests and demo wiring).
#[derive(Clone, Default)]
pub struct InMemoryFormsDirectory {
    inner: Arc<RwLock<DirectoryInner>>,
}

impl InMemoryFormsDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_question(&self, question: Question) {
        self.inner
            .write()
            .await
            .questions
            .insert(question.id, question);
    }

    pub async fn add_step(&self, step: Step) {
        self.inner.write().await.steps.insert(step.id, step);
    }

    pub async fn add_response(&self, response: FormResponse) {
        self.inner
            .write()
            .await
            .responses
            .insert(response.id, response);
    }

    /// Associate a workflow history entry with a form response.
    pub async fn bind_history(&self, id_history: i64, id_response: i64) {
        self.inner
            .write()
            .await
            .history_bindings
            .insert(id_history, id_response);
    }
}

#[async_trait]
impl FormsDirectory for InMemoryFormsDirectory {
    async fn question(&self, id: i64) -> Result<Option<Question>, String> {
        Ok(self.inner.read().await.questions.get(&id).cloned())
    }

    async fn step(&self, id: i64) -> Result<Option<Step>, String> {
        Ok(self.inner.read().await.steps.get(&id).cloned())
    }

    async fn response(&self, id: i64) -> Result<Option<FormResponse>, String> {
        Ok(self.inner.read().await.responses.get(&id).cloned())
    }

    async fn response_by_history(&self, id_history: i64) -> Result<Option<FormResponse>, String> {
        let inner = self.inner.read().await;
        Ok(inner
            .history_bindings
            .get(&id_history)
            .and_then(|id| inner.responses.get(id))
            .cloned())
    }

    async fn record_answer(
        &self,
        id_response: i64,
        question: QuestionRef,
        value: &str,
    ) -> Result<(), String> {
        let mut inner = self.inner.write().await;
        let response = inner
            .responses
            .get_mut(&id_response)
            .ok_or_else(|| format!("Form response {} not found", id_response))?;
        match response.values.iter_mut().find(|v| v.question == question) {
            Some(existing) => existing.value = value.to_string(),
            None => response.values.push(FormResponseValue {
                question,
                value: value.to_string(),
            }),
        }
        Ok(())
    }
}
