//! Workflow tasks for form response corrections.
//!
//! A workflow action flags selected answers of a submitted form response for
//! correction; the respondent follows a signed link back to the form, edits
//! exactly those answers once, and the response moves to a configured target
//! state. Two parallel channels exist (resubmitting answered questions and
//! completing never-answered ones), each with its own audit history, plus an
//! archival pipeline that deletes or anonymizes the task data of a resource.

pub mod api;
pub mod config;
pub mod forms;
pub mod service;
pub mod store;
pub mod workflow;

pub use config::Config;
