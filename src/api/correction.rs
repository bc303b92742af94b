//! Front-office correction controllers (resubmit and complete).
//!
//! Every request walks a chain of hard gates; the first failing gate renders
//! a terminal site message page and nothing further happens:
//! 1. signature check over the identifying parameters,
//! 2. `id_history` / `id_task` present and strictly numeric,
//! 3. a correction exists and is not yet complete,
//! 4. the resource still sits in the configured eligible state,
//! 5. (POST) edit the answers, change the resource state, mark complete.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use tracing::info;

use super::routes::AppState;
use super::types::{internal_error, CorrectionParams, SiteMessage, SubmitCorrectionRequest};
use crate::forms::{FormsDirectory, Question, Step};
use crate::service::response::CorrectionAnswer;
use crate::service::ServiceError;
use crate::store::{HistoryChannel, ResponseCorrection};

/// Strictly numeric: non-empty, ASCII digits only.
fn parse_numeric(value: &str) -> Option<i64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn page_title(channel: HistoryChannel) -> &'static str {
    match channel {
        HistoryChannel::Resubmit => "Resubmit your form response",
        HistoryChannel::Complete => "Complete your form response",
    }
}

/// Resolve the flagged questions into the (step, questions) display tree.
pub(super) async fn build_step_tree(
    forms: &Arc<dyn FormsDirectory>,
    questions: Vec<Question>,
) -> Result<Vec<(Step, Vec<Question>)>, ServiceError> {
    let mut steps: Vec<(Step, Vec<Question>)> = Vec::new();
    for question in questions {
        if let Some((_, bucket)) = steps.iter_mut().find(|(s, _)| s.id == question.id_step) {
            bucket.push(question);
            continue;
        }
        let step = forms
            .step(question.id_step)
            .await
            .map_err(ServiceError::Forms)?
            .unwrap_or(Step {
                id: question.id_step,
                title: String::new(),
            });
        steps.push((step, vec![question]));
    }
    Ok(steps)
}

async fn render_page(
    state: &AppState,
    channel: HistoryChannel,
    correction: &ResponseCorrection,
) -> Response {
    let service = state.service(channel);
    let form_response = match state.forms.response_by_history(correction.id_history).await {
        Ok(Some(response)) => response,
        Ok(None) => {
            return internal_error(ServiceError::Forms(format!(
                "No form response behind history {}",
                correction.id_history
            )))
        }
        Err(e) => return internal_error(ServiceError::Forms(e)),
    };
    let questions = match service
        .questions_to_edit(&form_response, &correction.questions)
        .await
    {
        Ok(questions) => questions,
        Err(e) => return internal_error(e),
    };
    let steps = match build_step_tree(&state.forms, questions).await {
        Ok(steps) => steps,
        Err(e) => return internal_error(e),
    };
    Html(super::templates::correction_page(
        page_title(channel),
        correction,
        &steps,
    ))
    .into_response()
}

async fn handle(
    state: Arc<AppState>,
    channel: HistoryChannel,
    params: CorrectionParams,
    answers: Option<Vec<CorrectionAnswer>>,
) -> Response {
    let url_return = params.url_return.clone();

    // Gate 1: signature over the raw parameters.
    let id_history_raw = params.id_history.as_deref().unwrap_or("");
    let id_task_raw = params.id_task.as_deref().unwrap_or("");
    let signature = params.signature.as_deref().unwrap_or("");
    if !state
        .authenticator
        .is_request_authenticated(id_history_raw, id_task_raw, signature)
    {
        return SiteMessage::access_denied(url_return).into_response();
    }

    // Gate 2: both ids present and strictly numeric.
    let (Some(id_history), Some(id_task)) =
        (parse_numeric(id_history_raw), parse_numeric(id_task_raw))
    else {
        return SiteMessage::mandatory_fields(url_return).into_response();
    };

    let service = state.service(channel);

    // Gate 3: a correction exists and admits edits.
    let correction = match service.find(id_history, id_task).await {
        Ok(Some(correction)) if !correction.is_complete() => correction,
        Ok(_) => return SiteMessage::already_completed(url_return).into_response(),
        Err(e) => return internal_error(e),
    };

    // Gate 4: the resource state precondition still holds. Re-checked here
    // because a state change can land between form render and form submit.
    match service.is_record_state_valid(&correction).await {
        Ok(true) => {}
        Ok(false) => return SiteMessage::access_denied(url_return).into_response(),
        Err(e) => return internal_error(e),
    }

    // Gate 5: the edit action. Sequencing: edit data, change state, complete.
    let correction = match answers {
        None => correction,
        Some(answers) => {
            match service.do_edit_response_data(&correction, &answers).await {
                Ok(()) => {}
                Err(ServiceError::UnknownQuestion(_)) | Err(ServiceError::MissingAnswer(_)) => {
                    return SiteMessage::mandatory_fields(url_return).into_response()
                }
                Err(e) => return internal_error(e),
            }
            if let Err(e) = service.do_change_response_state(&correction).await {
                return internal_error(e);
            }
            if let Err(e) = service.do_complete_response(&correction).await {
                return internal_error(e);
            }
            info!(
                channel = channel.as_str(),
                id_history, id_task, "correction accepted and completed"
            );
            ResponseCorrection {
                is_complete: true,
                ..correction
            }
        }
    };

    render_page(&state, channel, &correction).await
}

pub async fn resubmit_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CorrectionParams>,
) -> Response {
    handle(state, HistoryChannel::Resubmit, params, None).await
}

pub async fn resubmit_submit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CorrectionParams>,
    Json(body): Json<SubmitCorrectionRequest>,
) -> Response {
    handle(state, HistoryChannel::Resubmit, params, Some(body.answers)).await
}

pub async fn complete_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CorrectionParams>,
) -> Response {
    handle(state, HistoryChannel::Complete, params, None).await
}

pub async fn complete_submit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CorrectionParams>,
    Json(body): Json<SubmitCorrectionRequest>,
) -> Response {
    handle(state, HistoryChannel::Complete, params, Some(body.answers)).await
}

#[cfg(test)]
mod tests {
    use super::parse_numeric;

    #[test]
    fn numeric_parsing_is_strict() {
        assert_eq!(parse_numeric("42"), Some(42));
        assert_eq!(parse_numeric("0"), Some(0));
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("-1"), None);
        assert_eq!(parse_numeric("12a"), None);
        assert_eq!(parse_numeric(" 12"), None);
        assert_eq!(parse_numeric("1.5"), None);
    }
}
