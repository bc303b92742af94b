//! HTTP route handlers and application state.

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::auth::RequestAuthenticator;
use super::correction;
use super::task_component;
use super::types::HealthResponse;
use crate::config::Config;
use crate::forms::{FormsDirectory, InMemoryFormsDirectory};
use crate::service::archiver::ResourceArchiver;
use crate::service::controller_config::StateControllerConfigService;
use crate::service::response::ResponseTaskService;
use crate::store::{create_store, HistoryChannel, TaskStore};
use crate::workflow::{InMemoryWorkflowProvider, WorkflowProvider};

/// Shared application state. Every service is constructed here, once, at
/// startup; nothing is resolved by name at runtime.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn TaskStore>,
    pub forms: Arc<dyn FormsDirectory>,
    pub workflow: Arc<dyn WorkflowProvider>,
    pub authenticator: RequestAuthenticator,
    pub resubmit: ResponseTaskService,
    pub complete: ResponseTaskService,
    pub controller_config: StateControllerConfigService,
    pub archiver: ResourceArchiver,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn TaskStore>,
        forms: Arc<dyn FormsDirectory>,
        workflow: Arc<dyn WorkflowProvider>,
        signing_key: Option<String>,
    ) -> Self {
        let resubmit = ResponseTaskService::resubmit(store.clone(), forms.clone(), workflow.clone());
        let complete = ResponseTaskService::complete(store.clone(), forms.clone(), workflow.clone());
        let controller_config = StateControllerConfigService::new(store.clone());
        let archiver = ResourceArchiver::new(store.clone(), workflow.clone());
        Self {
            config,
            store,
            forms,
            workflow,
            authenticator: RequestAuthenticator::new(signing_key),
            resubmit,
            complete,
            controller_config,
            archiver,
        }
    }

    pub fn service(&self, channel: HistoryChannel) -> &ResponseTaskService {
        match channel {
            HistoryChannel::Resubmit => &self.resubmit,
            HistoryChannel::Complete => &self.complete,
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/workflow/resubmit",
            get(correction::resubmit_page).post(correction::resubmit_submit),
        )
        .route(
            "/workflow/complete",
            get(correction::complete_page).post(correction::complete_submit),
        )
        .nest("/admin", task_component::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store = create_store(config.store_type, config.database_path.clone())
        .await
        .map_err(anyhow::Error::msg)?;
    let store: Arc<dyn TaskStore> = Arc::from(store);

    // The forms plugin and the workflow engine are external systems; the
    // bundled in-memory providers stand in until a deployment wires real
    // adapters here.
    let forms: Arc<dyn FormsDirectory> = Arc::new(InMemoryFormsDirectory::new());
    let workflow: Arc<dyn WorkflowProvider> = Arc::new(InMemoryWorkflowProvider::new());

    let signing_key = match config.signing_key.clone() {
        Some(key) => Some(key),
        None if config.dev_mode => {
            let key = RequestAuthenticator::generate_key();
            warn!("SIGNING_KEY not set, using an ephemeral dev-mode key");
            Some(key)
        }
        None => None,
    };

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, store, forms, workflow, signing_key));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// GET /api/health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        persistent_store: state.store.is_persistent(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::util::ServiceExt;

    use crate::forms::{
        FormResponse, FormResponseValue, Question, QuestionRef, Step, FORMS_RESOURCE_TYPE,
    };
    use crate::store::{MemoryStore, StateControllerConfig};
    use crate::workflow::{InMemoryWorkflowProvider, ResourceWorkflow, WorkflowState, WorkflowTask};

    const ID_HISTORY: i64 = 10;
    const ID_TASK: i64 = 20;
    const ID_RESOURCE: i64 = 30;
    const ELIGIBLE_STATE: i64 = 2;
    const TARGET_STATE: i64 = 3;
    const SIGNING_KEY: &str = "unit-test-signing-key";

    struct Harness {
        state: Arc<AppState>,
        workflow: InMemoryWorkflowProvider,
    }

    async fn harness() -> Harness {
        let store: Arc<dyn TaskStore> = Arc::new(MemoryStore::new());
        let forms_impl = InMemoryFormsDirectory::new();
        let workflow_impl = InMemoryWorkflowProvider::new();

        forms_impl
            .add_step(Step {
                id: 1,
                title: "Identity".to_string(),
            })
            .await;
        forms_impl
            .add_question(Question {
                id: 1,
                title: "Name".to_string(),
                id_step: 1,
                iteration_number: 0,
            })
            .await;
        forms_impl
            .add_response(FormResponse {
                id: ID_RESOURCE,
                id_form: 1,
                values: vec![FormResponseValue {
                    question: QuestionRef {
                        id: 1,
                        iteration_number: 0,
                    },
                    value: "old name".to_string(),
                }],
            })
            .await;
        forms_impl.bind_history(ID_HISTORY, ID_RESOURCE).await;

        workflow_impl
            .add_task(WorkflowTask {
                id: ID_TASK,
                id_action: 7,
            })
            .await;
        workflow_impl
            .set_action_states(
                7,
                vec![
                    WorkflowState {
                        id: ELIGIBLE_STATE,
                        name: "Waiting for correction".to_string(),
                    },
                    WorkflowState {
                        id: TARGET_STATE,
                        name: "Corrected".to_string(),
                    },
                ],
            )
            .await;
        workflow_impl
            .add_resource(ResourceWorkflow {
                id_resource: ID_RESOURCE,
                resource_type: FORMS_RESOURCE_TYPE.to_string(),
                id_state: ELIGIBLE_STATE,
            })
            .await;
        workflow_impl.add_history(ID_HISTORY, ID_RESOURCE).await;

        store
            .insert_config(&StateControllerConfig {
                id_task: ID_TASK,
                id_eligible_state: ELIGIBLE_STATE,
                id_target_state: TARGET_STATE,
            })
            .await
            .expect("config");

        let state = Arc::new(AppState::new(
            Config::new("127.0.0.1".to_string(), 0),
            store,
            Arc::new(forms_impl),
            Arc::new(workflow_impl.clone()),
            Some(SIGNING_KEY.to_string()),
        ));
        Harness {
            state,
            workflow: workflow_impl,
        }
    }

    async fn seed_correction(state: &AppState) {
        state
            .resubmit
            .create(
                ID_HISTORY,
                ID_TASK,
                Some("please fix your name".to_string()),
                vec![QuestionRef {
                    id: 1,
                    iteration_number: 0,
                }],
            )
            .await
            .expect("seed correction");
    }

    fn signed_uri(state: &AppState, id_history: &str, id_task: &str) -> String {
        let signature = state
            .authenticator
            .sign(id_history, id_task)
            .expect("signature");
        format!(
            "/workflow/resubmit?id_history={}&id_task={}&signature={}&url_return=/back",
            id_history, id_task, signature
        )
    }

    async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, String) {
        let response = router(state)
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    async fn post_json(state: Arc<AppState>, uri: &str, body: serde_json::Value) -> (StatusCode, String) {
        let response = router(state)
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    fn answers_body() -> serde_json::Value {
        serde_json::json!({
            "answers": [
                { "id_question": 1, "iteration_number": 0, "value": "new name" }
            ]
        })
    }

    #[tokio::test]
    async fn bad_signature_is_access_denied() {
        let h = harness().await;
        seed_correction(&h.state).await;
        let uri = format!(
            "/workflow/resubmit?id_history={}&id_task={}&signature=bogus",
            ID_HISTORY, ID_TASK
        );
        let (status, body) = get(h.state.clone(), &uri).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("Access denied"));
    }

    #[tokio::test]
    async fn missing_id_task_is_mandatory_fields() {
        let h = harness().await;
        seed_correction(&h.state).await;
        // Signed over the raw values, so the signature gate passes and the
        // numeric gate is what rejects.
        let signature = h.state.authenticator.sign("10", "").expect("signature");
        let uri = format!(
            "/workflow/resubmit?id_history=10&id_task=&signature={}",
            signature
        );
        let (status, body) = get(h.state.clone(), &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Mandatory fields"));
    }

    #[tokio::test]
    async fn non_numeric_id_history_is_mandatory_fields() {
        let h = harness().await;
        seed_correction(&h.state).await;
        let signature = h.state.authenticator.sign("10abc", "20").expect("signature");
        let uri = format!(
            "/workflow/resubmit?id_history=10abc&id_task=20&signature={}",
            signature
        );
        let (status, body) = get(h.state.clone(), &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Mandatory fields"));
        // The rejection happened before any service call: the correction is
        // still editable.
        let correction = h
            .state
            .resubmit
            .find(ID_HISTORY, ID_TASK)
            .await
            .expect("find")
            .expect("present");
        assert!(!correction.is_complete());
    }

    #[tokio::test]
    async fn unknown_pair_reports_already_completed() {
        let h = harness().await;
        let uri = signed_uri(&h.state, "999", "999");
        let (status, body) = get(h.state.clone(), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("already been completed"));
    }

    #[tokio::test]
    async fn stale_workflow_state_is_access_denied() {
        let h = harness().await;
        seed_correction(&h.state).await;
        // The resource moved on after the link was issued.
        h.workflow.set_resource_state(ID_RESOURCE, 99).await;

        let uri = signed_uri(&h.state, "10", "20");
        let (status, body) = get(h.state.clone(), &uri).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("Access denied"));
    }

    #[tokio::test]
    async fn render_shows_flagged_question() {
        let h = harness().await;
        seed_correction(&h.state).await;
        let uri = signed_uri(&h.state, "10", "20");
        let (status, body) = get(h.state.clone(), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Name"));
        assert!(body.contains("answer_1_0"));
        assert!(body.contains("please fix your name"));
    }

    #[tokio::test]
    async fn submit_edits_once_then_locks_the_pair() {
        let h = harness().await;
        seed_correction(&h.state).await;
        let uri = signed_uri(&h.state, "10", "20");

        let (status, body) = post_json(h.state.clone(), &uri, answers_body()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("has been recorded"));

        // Edit applied exactly once, state moved, record complete.
        let audit = h
            .state
            .resubmit
            .history()
            .load(ID_HISTORY, ID_TASK)
            .await
            .expect("audit");
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].new_value, "new name");

        let resource = h
            .workflow
            .resource_by_history(ID_HISTORY)
            .await
            .expect("resource")
            .expect("present");
        assert_eq!(resource.id_state, TARGET_STATE);

        let correction = h
            .state
            .resubmit
            .find(ID_HISTORY, ID_TASK)
            .await
            .expect("find")
            .expect("present");
        assert!(correction.is_complete());

        // A second submission is rejected without touching anything.
        let (status, body) = post_json(h.state.clone(), &uri, answers_body()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("already been completed"));
        let audit = h
            .state
            .resubmit
            .history()
            .load(ID_HISTORY, ID_TASK)
            .await
            .expect("audit");
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn blank_answer_is_mandatory_fields_and_keeps_record_open() {
        let h = harness().await;
        seed_correction(&h.state).await;
        let uri = signed_uri(&h.state, "10", "20");
        let body = serde_json::json!({
            "answers": [
                { "id_question": 1, "iteration_number": 0, "value": "  " }
            ]
        });
        let (status, text) = post_json(h.state.clone(), &uri, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(text.contains("Mandatory fields"));

        let correction = h
            .state
            .resubmit
            .find(ID_HISTORY, ID_TASK)
            .await
            .expect("find")
            .expect("present");
        assert!(!correction.is_complete());
    }

    #[tokio::test]
    async fn health_reports_store_persistence() {
        let h = harness().await;
        let (status, body) = get(h.state.clone(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"persistent_store\":false"));
    }

    #[tokio::test]
    async fn admin_config_crud_roundtrip() {
        let h = harness().await;

        let (status, body) = get(h.state.clone(), &format!("/admin/tasks/{}/config", ID_TASK)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Waiting for correction"));

        let (status, _) = post_json(
            h.state.clone(),
            &format!("/admin/tasks/{}/config", ID_TASK),
            serde_json::json!({ "id_eligible_state": 2, "id_target_state": 5 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let saved = h
            .state
            .controller_config
            .find_by_task(ID_TASK)
            .await
            .expect("find")
            .expect("present");
        assert_eq!(saved.id_target_state, 5);

        let response = router(h.state.clone())
            .oneshot(
                Request::delete(format!("/admin/tasks/{}/config", ID_TASK))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(h
            .state
            .controller_config
            .find_by_task(ID_TASK)
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn information_fragment_shows_history_after_completion() {
        let h = harness().await;
        seed_correction(&h.state).await;
        let uri = signed_uri(&h.state, "10", "20");
        post_json(h.state.clone(), &uri, answers_body()).await;

        let (status, body) = get(
            h.state.clone(),
            &format!(
                "/admin/tasks/{}/information?id_history={}&channel=resubmit",
                ID_TASK, ID_HISTORY
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("data-complete=\"true\""));
        assert!(body.contains("new name"));
    }

    #[tokio::test]
    async fn archive_endpoint_deletes_task_data() {
        let h = harness().await;
        seed_correction(&h.state).await;
        let uri = signed_uri(&h.state, "10", "20");
        post_json(h.state.clone(), &uri, answers_body()).await;

        let (status, _) = post_json(
            h.state.clone(),
            "/admin/archive",
            serde_json::json!({
                "archival_type": "delete",
                "id_resource": ID_RESOURCE,
                "resource_type": FORMS_RESOURCE_TYPE,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        assert!(h
            .state
            .resubmit
            .find(ID_HISTORY, ID_TASK)
            .await
            .expect("find")
            .is_none());
        assert!(h
            .state
            .resubmit
            .history()
            .load(ID_HISTORY, ID_TASK)
            .await
            .expect("audit")
            .is_empty());
    }
}
