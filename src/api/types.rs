//! API request and response types.

use crate::service::response::CorrectionAnswer;
use crate::service::ServiceError;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Query parameters of the front-office correction pages. Raw strings;
/// numeric validation is a controller gate, not a deserialization failure.
#[derive(Debug, Clone, Deserialize)]
pub struct CorrectionParams {
    pub id_history: Option<String>,
    pub id_task: Option<String>,
    pub signature: Option<String>,
    pub url_return: Option<String>,
}

/// Body of a correction submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitCorrectionRequest {
    pub answers: Vec<CorrectionAnswer>,
}

/// Body of an admin config save.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveConfigRequest {
    pub id_eligible_state: i64,
    pub id_target_state: i64,
}

/// Body of an archive dispatch from the archival pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveRequest {
    pub archival_type: crate::service::archiver::ArchivalType,
    pub id_resource: i64,
    pub resource_type: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub persistent_store: bool,
}

/// Severity of a site message (mirrors the stop/info distinction of the
/// portal's message screens).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteMessageLevel {
    Stop,
    Info,
}

/// A terminal, user-facing message page. Every controller gate failure ends
/// in one of these; the request performs no further action.
#[derive(Debug, Clone)]
pub struct SiteMessage {
    pub level: SiteMessageLevel,
    pub status: StatusCode,
    pub title: &'static str,
    pub text: &'static str,
    pub url_return: Option<String>,
}

impl SiteMessage {
    pub fn access_denied(url_return: Option<String>) -> Self {
        Self {
            level: SiteMessageLevel::Stop,
            status: StatusCode::FORBIDDEN,
            title: "Access denied",
            text: "You are not allowed to access this page.",
            url_return,
        }
    }

    pub fn mandatory_fields(url_return: Option<String>) -> Self {
        Self {
            level: SiteMessageLevel::Stop,
            status: StatusCode::BAD_REQUEST,
            title: "Mandatory fields",
            text: "Mandatory fields are missing or invalid.",
            url_return,
        }
    }

    pub fn already_completed(url_return: Option<String>) -> Self {
        Self {
            level: SiteMessageLevel::Info,
            status: StatusCode::OK,
            title: "Already completed",
            text: "This response has already been completed.",
            url_return,
        }
    }
}

impl IntoResponse for SiteMessage {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Html(super::templates::site_message_page(&self))).into_response()
    }
}

/// Storage and collaborator faults surface as a framework-level error page;
/// no local recovery.
pub fn internal_error(err: ServiceError) -> Response {
    tracing::error!("request failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(super::templates::error_page()),
    )
        .into_response()
}
