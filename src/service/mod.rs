//! Orchestration over the task store and the external collaborators.

pub mod archiver;
pub mod controller_config;
pub mod history;
pub mod response;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage fault, propagated untranslated from the store.
    #[error("storage error: {0}")]
    Storage(String),

    /// Fault talking to the workflow engine.
    #[error("workflow error: {0}")]
    Workflow(String),

    /// Fault talking to the forms plugin.
    #[error("forms error: {0}")]
    Forms(String),

    /// A submitted answer targets a question not flagged for correction.
    #[error("question {0} is not flagged for correction")]
    UnknownQuestion(i64),

    /// A flagged question was left without an answer.
    #[error("missing answer for question {0}")]
    MissingAnswer(i64),
}
