//! HTTP API for the forms workflow service.
//!
//! Endpoints:
//! - `GET /api/health` - Health check
//! - `GET|POST /workflow/resubmit` - Front-office resubmission page (signed link)
//! - `GET|POST /workflow/complete` - Front-office completion page (signed link)
//! - `GET|POST|DELETE /admin/tasks/{id}/config` - Task configuration
//! - `GET /admin/tasks/{id}/form` - Form preview fragment
//! - `GET /admin/tasks/{id}/information` - Completion information fragment
//! - `POST /admin/archive` - Archival pipeline dispatch

mod auth;
mod correction;
mod routes;
mod task_component;
mod templates;
pub mod types;

pub use auth::RequestAuthenticator;
pub use routes::{router, serve, AppState};
