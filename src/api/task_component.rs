//! Admin task screens and the archive dispatch endpoint.
//!
//! Read/compose only: three HTML fragments built from the services, plus the
//! config CRUD the admin screens post back to. Invoked by the workflow
//! engine's back office, independent of the front-office flow.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::correction::build_step_tree;
use super::routes::AppState;
use super::types::{internal_error, ArchiveRequest, SaveConfigRequest};
use crate::forms::FORMS_RESOURCE_TYPE;
use crate::store::{HistoryChannel, StateControllerConfig};
use crate::workflow::ResourceWorkflow;

/// Create the admin routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/tasks/:id/config",
            get(config_form).post(save_config).delete(delete_config),
        )
        .route("/tasks/:id/form", get(task_form))
        .route("/tasks/:id/information", get(task_information))
        .route("/archive", post(archive))
}

/// GET /admin/tasks/{id}/config
/// The configuration editor fragment: current config plus the states
/// reachable from the task's action.
async fn config_form(State(state): State<Arc<AppState>>, Path(id_task): Path<i64>) -> Response {
    let task = match state.workflow.task(id_task).await {
        Ok(Some(task)) => task,
        Ok(None) => return (StatusCode::NOT_FOUND, "Unknown task").into_response(),
        Err(e) => return internal_error(crate::service::ServiceError::Workflow(e)),
    };
    let states = match state.workflow.states_for_action(task.id_action).await {
        Ok(states) => states,
        Err(e) => return internal_error(crate::service::ServiceError::Workflow(e)),
    };
    let config = match state.controller_config.find_by_task(id_task).await {
        Ok(config) => config,
        Err(e) => return internal_error(e),
    };
    Html(super::templates::config_form(
        id_task,
        config.as_ref(),
        &states,
    ))
    .into_response()
}

/// POST /admin/tasks/{id}/config
async fn save_config(
    State(state): State<Arc<AppState>>,
    Path(id_task): Path<i64>,
    Json(body): Json<SaveConfigRequest>,
) -> Response {
    let config = StateControllerConfig {
        id_task,
        id_eligible_state: body.id_eligible_state,
        id_target_state: body.id_target_state,
    };
    match state.controller_config.save(&config).await {
        Ok(()) => Json(config).into_response(),
        Err(e) => internal_error(e),
    }
}

/// DELETE /admin/tasks/{id}/config
async fn delete_config(State(state): State<Arc<AppState>>, Path(id_task): Path<i64>) -> Response {
    match state.controller_config.remove_by_task(id_task).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct TaskFormParams {
    id_resource: i64,
    resource_type: String,
}

/// GET /admin/tasks/{id}/form
/// Preview of the form the end user will be asked to correct.
async fn task_form(
    State(state): State<Arc<AppState>>,
    Path(_id_task): Path<i64>,
    Query(params): Query<TaskFormParams>,
) -> Response {
    if params.resource_type != FORMS_RESOURCE_TYPE {
        return (StatusCode::BAD_REQUEST, "Not a form response resource").into_response();
    }
    let response = match state.forms.response(params.id_resource).await {
        Ok(Some(response)) => response,
        Ok(None) => return (StatusCode::NOT_FOUND, "Unknown form response").into_response(),
        Err(e) => return internal_error(crate::service::ServiceError::Forms(e)),
    };

    let mut questions = Vec::new();
    for value in &response.values {
        match state.forms.question(value.question.id).await {
            Ok(Some(mut question)) => {
                question.iteration_number = value.question.iteration_number;
                questions.push(question);
            }
            Ok(None) => {}
            Err(e) => return internal_error(crate::service::ServiceError::Forms(e)),
        }
    }
    let steps = match build_step_tree(&state.forms, questions).await {
        Ok(steps) => steps,
        Err(e) => return internal_error(e),
    };
    Html(super::templates::task_form(&steps)).into_response()
}

#[derive(Debug, Deserialize)]
struct TaskInformationParams {
    id_history: i64,
    #[serde(default = "default_channel")]
    channel: HistoryChannel,
}

fn default_channel() -> HistoryChannel {
    HistoryChannel::Resubmit
}

/// GET /admin/tasks/{id}/information
/// The completion-information fragment: config, correction aggregate, the
/// flagged questions, and the audit history once the correction is complete.
async fn task_information(
    State(state): State<Arc<AppState>>,
    Path(id_task): Path<i64>,
    Query(params): Query<TaskInformationParams>,
) -> Response {
    let service = state.service(params.channel);

    let config = match state.controller_config.find_by_task(id_task).await {
        Ok(config) => config,
        Err(e) => return internal_error(e),
    };
    let correction = match service.find(params.id_history, id_task).await {
        Ok(correction) => correction,
        Err(e) => return internal_error(e),
    };

    let mut entries = Vec::new();
    let mut history = Vec::new();
    if let Some(correction) = &correction {
        for reference in &correction.questions {
            match state.forms.question(reference.id).await {
                Ok(Some(mut question)) => {
                    question.iteration_number = reference.iteration_number;
                    entries.push(question);
                }
                Ok(None) => {}
                Err(e) => return internal_error(crate::service::ServiceError::Forms(e)),
            }
        }
        if correction.is_complete() {
            history = match service.history().load(params.id_history, id_task).await {
                Ok(history) => history,
                Err(e) => return internal_error(e),
            };
        }
    }

    Html(super::templates::task_information(
        config.as_ref(),
        correction.as_ref(),
        &entries,
        &history,
    ))
    .into_response()
}

/// POST /admin/archive
/// Entry point for the generic archival pipeline.
async fn archive(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ArchiveRequest>,
) -> Response {
    let resource = ResourceWorkflow {
        id_resource: body.id_resource,
        resource_type: body.resource_type,
        id_state: 0,
    };
    match state
        .archiver
        .archive_resource(body.archival_type, &resource)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error(e),
    }
}
