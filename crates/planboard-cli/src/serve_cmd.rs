use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use planboard_core::plan::{IngestRequest, PlanIngestor};
use planboard_core::service::NewTaskRequest;
use planboard_core::{BoardService, ErrorKind, PlanboardError, TaskState, Violation};
use planboard_db::models::TaskStatus;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
    violations: Vec<Violation>,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: ErrorKind::InvalidRequest,
            message: message.into(),
            violations: Vec::new(),
        }
    }
}

impl From<PlanboardError> for AppError {
    fn from(err: PlanboardError) -> Self {
        let kind = err.kind();
        let status = match (&err, kind) {
            (PlanboardError::UpstreamUnavailable { timed_out: true, .. }, _) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            (_, ErrorKind::InvalidRequest) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorKind::UnmetDependency | ErrorKind::InvalidTransition | ErrorKind::Conflict) => {
                StatusCode::CONFLICT
            }
            (
                _,
                ErrorKind::UpstreamUnavailable
                | ErrorKind::MalformedResponse
                | ErrorKind::CyclicDependency
                | ErrorKind::ValidationError,
            ) => StatusCode::BAD_GATEWAY,
            (_, ErrorKind::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            (_, ErrorKind::PersistenceFailure) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(%kind, error = %err, "request failed");
        }
        Self {
            status,
            kind,
            message: err.to_string(),
            violations: err.violations().to_vec(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    kind: ErrorKind,
    #[serde(skip_serializing_if = "no_violations")]
    violations: &'a [Violation],
}

fn no_violations(violations: &&[Violation]) -> bool {
    violations.is_empty()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.message,
            kind: self.kind,
            violations: &self.violations,
        };
        (self.status, Json(body)).into_response()
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

fn path_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

// ---------------------------------------------------------------------------
// State and request types
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub board: Arc<BoardService>,
    pub ingestor: Arc<PlanIngestor>,
    /// Cancelled on shutdown; in-flight ingestions stop before committing.
    pub shutdown: CancellationToken,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub status: TaskStatus,
    pub index: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct DependencyQuery {
    #[serde(default)]
    pub transitive: bool,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/ai/plan", post(generate_plan))
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/{id}", get(get_board))
        .route("/api/projects/{id}/columns", get(get_columns))
        .route("/api/projects/{id}/ready", get(get_ready))
        .route("/api/projects/{id}/blocked", get(get_blocked))
        .route("/api/projects/{id}/needs-review", get(get_needs_review))
        .route("/api/projects/{id}/plan", post(ingest_plan))
        .route("/api/projects/{id}/tasks", post(add_task))
        .route("/api/tasks/{id}/dependencies", get(get_dependencies))
        .route("/api/tasks/{id}/transition", post(transition_task))
        .route("/api/tasks/{id}/reorder", post(reorder_task))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("planboard serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    tracing::info!("planboard serve shut down");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    shutdown.cancel();
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index(State(state): State<AppState>) -> Result<Response, AppError> {
    let projects = state.board.list_projects().await?;

    let rows = if projects.is_empty() {
        "<tr><td colspan=\"3\">No projects found.</td></tr>".to_owned()
    } else {
        projects
            .iter()
            .map(|p| {
                format!(
                    "<tr><td><a href=\"/api/projects/{id}\">{title}</a></td><td>{status}</td><td>{id}</td></tr>",
                    id = p.id,
                    title = escape_html(&p.title),
                    status = p.status,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let html = format!(
        "<!DOCTYPE html>\
<html><head><title>planboard</title></head><body>\
<h1>planboard</h1>\
<p><a href=\"/api/projects\">/api/projects</a></p>\
<table><tr><th>Project</th><th>Status</th><th>ID</th></tr>{rows}</table>\
</body></html>"
    );

    Ok(Html(html).into_response())
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn generate_plan(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let cancel = state.shutdown.child_token();
    let plan = state.ingestor.generate_plan(&request, &cancel).await?;
    Ok(Json(plan).into_response())
}

async fn list_projects(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(Json(state.board.list_projects().await?).into_response())
}

async fn create_project(
    State(state): State<AppState>,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let project = state
        .board
        .create_project(&request.title, request.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(project)).into_response())
}

async fn get_board(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    Ok(Json(state.board.board(id).await?).into_response())
}

async fn get_columns(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    Ok(Json(state.board.list_columns(id).await?).into_response())
}

async fn get_ready(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    Ok(Json(state.board.ready_tasks(id).await?).into_response())
}

async fn get_blocked(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    Ok(Json(state.board.blocked_tasks(id).await?).into_response())
}

async fn get_needs_review(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    Ok(Json(state.board.needs_review(id).await?).into_response())
}

async fn ingest_plan(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    let request = json_body(payload)?;
    let cancel = state.shutdown.child_token();
    let commit = state
        .ingestor
        .ingest(&state.board, id, &request, &cancel)
        .await?;
    Ok((StatusCode::CREATED, Json(commit)).into_response())
}

async fn add_task(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<NewTaskRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    let request = json_body(payload)?;
    let task = state.board.add_task(id, request).await?;
    Ok((StatusCode::CREATED, Json(task)).into_response())
}

async fn get_dependencies(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<DependencyQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    let query = query_params(query)?;
    let deps = if query.transitive {
        state.board.transitive_dependencies_of(id).await?
    } else {
        state.board.dependencies_of(id).await?
    };
    Ok(Json(deps).into_response())
}

async fn transition_task(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<TaskState>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    let to = json_body(payload)?;
    Ok(Json(state.board.transition(id, to).await?).into_response())
}

async fn reorder_task(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ReorderRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    let request = json_body(payload)?;
    let outcome = state
        .board
        .reorder(id, request.status, request.index)
        .await?;
    Ok(Json(outcome).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use planboard_core::config::PlannerConfig;
    use planboard_core::model::{GenerateOptions, ModelClient, ModelError};
    use planboard_core::store::MemoryStore;

    use super::*;

    enum Canned {
        Text(String),
        Fail,
        Hang,
    }

    struct CannedModel {
        replies: Mutex<Vec<Canned>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelClient for CannedModel {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _options: &GenerateOptions,
        ) -> std::result::Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().pop();
            match reply {
                Some(Canned::Text(text)) => Ok(text),
                Some(Canned::Fail) => Err(ModelError::Api {
                    status: 500,
                    message: "boom".into(),
                }),
                Some(Canned::Hang) => std::future::pending().await,
                None => Err(ModelError::EmptyResponse),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn plan_json() -> String {
        json!({
            "milestones": [{
                "name": "Foundations",
                "summary": "Get started",
                "tasks": [
                    { "id": "scope", "title": "Define scope", "effort_hours": 3 },
                    { "id": "wire", "title": "Design wireframes", "effort_hours": 5, "depends_on": ["scope"] }
                ]
            }]
        })
        .to_string()
    }

    struct TestApp {
        router: Router,
        model: Arc<CannedModel>,
    }

    /// Replies are served last-first.
    fn test_app(replies: Vec<Canned>, config: PlannerConfig) -> TestApp {
        let model = Arc::new(CannedModel {
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
        });
        let state = AppState {
            board: Arc::new(BoardService::new(Arc::new(MemoryStore::new()))),
            ingestor: Arc::new(PlanIngestor::new(model.clone(), config)),
            shutdown: CancellationToken::new(),
        };
        TestApp {
            router: build_router(state),
            model,
        }
    }

    async fn send(
        app: &TestApp,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn project_with_plan(app: &TestApp) -> (String, Value) {
        let (status, project) = send(
            app,
            "POST",
            "/api/projects",
            Some(json!({ "title": "Website" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = project["id"].as_str().unwrap().to_owned();

        let (status, commit) = send(
            app,
            "POST",
            &format!("/api/projects/{id}/plan"),
            Some(json!({ "objective": "Launch MVP website", "days": 14 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{commit}");
        (id, commit)
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_index_returns_html() {
        let app = test_app(vec![], PlannerConfig::default());
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .expect("should have content-type header")
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/html"), "{content_type}");
    }

    #[tokio::test]
    async fn test_generate_plan_returns_milestones() {
        let app = test_app(vec![Canned::Text(plan_json())], PlannerConfig::default());
        let (status, body) = send(
            &app,
            "POST",
            "/api/ai/plan",
            Some(json!({ "objective": "Launch MVP website", "days": 14 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let milestones = body["milestones"].as_array().unwrap();
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0]["tasks"][1]["depends_on"], json!(["scope"]));
    }

    #[tokio::test]
    async fn test_generate_plan_rejects_bad_request_without_calling_model() {
        let app = test_app(vec![Canned::Text(plan_json())], PlannerConfig::default());

        let (status, body) = send(
            &app,
            "POST",
            "/api/ai/plan",
            Some(json!({ "objective": "  ", "days": 14 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");
        assert!(body["error"].as_str().unwrap().contains("objective"));

        let (status, body) = send(
            &app,
            "POST",
            "/api/ai/plan",
            Some(json!({ "objective": "Launch" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string(), "{body}");

        assert_eq!(app.model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generate_plan_upstream_failure_is_502() {
        let app = test_app(vec![Canned::Fail], PlannerConfig::default());
        let (status, body) = send(
            &app,
            "POST",
            "/api/ai/plan",
            Some(json!({ "objective": "Launch", "days": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "upstream_unavailable");
        assert!(body.get("violations").is_none());
    }

    #[tokio::test]
    async fn test_generate_plan_timeout_is_504() {
        let config = PlannerConfig {
            model_timeout_secs: 1,
            ..PlannerConfig::default()
        };
        let app = test_app(vec![Canned::Hang], config);
        let (status, body) = send(
            &app,
            "POST",
            "/api/ai/plan",
            Some(json!({ "objective": "Launch", "days": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["kind"], "upstream_unavailable");
    }

    #[tokio::test]
    async fn test_generate_plan_cycle_lists_violations() {
        let cyclic = json!({
            "milestones": [{
                "name": "Loop",
                "tasks": [
                    { "title": "A", "effort_hours": 1, "depends_on": ["B"] },
                    { "title": "B", "effort_hours": 1, "depends_on": ["A"] }
                ]
            }]
        });
        let app = test_app(vec![Canned::Text(cyclic.to_string())], PlannerConfig::default());
        let (status, body) = send(
            &app,
            "POST",
            "/api/ai/plan",
            Some(json!({ "objective": "Loop", "days": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "cyclic_dependency");
        let violations = body["violations"].as_array().unwrap();
        assert_eq!(violations.len(), 1);
        assert!(
            violations[0]["reason"]
                .as_str()
                .unwrap()
                .starts_with("dependency cycle:")
        );
    }

    #[tokio::test]
    async fn test_ingest_then_read_columns_and_ready() {
        let app = test_app(vec![Canned::Text(plan_json())], PlannerConfig::default());
        let (id, commit) = project_with_plan(&app).await;
        assert_eq!(commit["task_ids"].as_array().unwrap().len(), 2);
        assert_eq!(commit["version"], 1);

        let (status, columns) = send(&app, "GET", &format!("/api/projects/{id}/columns"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(columns["todo"].as_array().unwrap().len(), 1);
        let blocked = columns["blocked"].as_array().unwrap();
        assert_eq!(blocked[0]["title"], "Design wireframes");
        assert_eq!(blocked[0]["status"], "blocked");
        assert_eq!(blocked[0]["blocked_reason"], "dependency");

        let (status, ready) = send(&app, "GET", &format!("/api/projects/{id}/ready"), None).await;
        assert_eq!(status, StatusCode::OK);
        let ready = ready.as_array().unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0]["title"], "Define scope");
    }

    #[tokio::test]
    async fn test_transition_with_unmet_dependency_is_409() {
        let app = test_app(vec![Canned::Text(plan_json())], PlannerConfig::default());
        let (_, commit) = project_with_plan(&app).await;
        let wire = commit["task_ids"][1].as_str().unwrap().to_owned();

        let uri = format!("/api/tasks/{wire}/transition");
        let (status, _) = send(&app, "POST", &uri, Some(json!({ "status": "blocked" }))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "POST", &uri, Some(json!({ "status": "doing" }))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "POST", &uri, Some(json!({ "status": "done" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "unmet_dependency");
    }

    #[tokio::test]
    async fn test_transition_and_reorder_flow() {
        let app = test_app(vec![Canned::Text(plan_json())], PlannerConfig::default());
        let (id, commit) = project_with_plan(&app).await;
        let scope = commit["task_ids"][0].as_str().unwrap().to_owned();

        let uri = format!("/api/tasks/{scope}/transition");
        send(&app, "POST", &uri, Some(json!({ "status": "doing" }))).await;
        let (status, outcome) = send(&app, "POST", &uri, Some(json!({ "status": "done" }))).await;
        assert_eq!(status, StatusCode::OK, "{outcome}");
        assert_eq!(outcome["to"]["status"], "done");
        assert_eq!(outcome["automatic"].as_array().unwrap().len(), 1);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/tasks/{scope}/reorder"),
            Some(json!({ "status": "todo", "index": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "todo");

        let (_, ready) = send(&app, "GET", &format!("/api/projects/{id}/ready"), None).await;
        let titles: Vec<&str> = ready
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, ["Define scope"]);

        let (_, review) = send(&app, "GET", &format!("/api/projects/{id}/needs-review"), None).await;
        assert_eq!(review, json!([]));
    }

    #[tokio::test]
    async fn test_invalid_transition_is_409() {
        let app = test_app(vec![Canned::Text(plan_json())], PlannerConfig::default());
        let (_, commit) = project_with_plan(&app).await;
        let scope = commit["task_ids"][0].as_str().unwrap().to_owned();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/tasks/{scope}/transition"),
            Some(json!({ "status": "done" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "invalid_transition");
    }

    #[tokio::test]
    async fn test_add_task_and_dependencies() {
        let app = test_app(vec![Canned::Text(plan_json())], PlannerConfig::default());
        let (id, commit) = project_with_plan(&app).await;
        let wire = commit["task_ids"][1].as_str().unwrap().to_owned();

        let (status, task) = send(
            &app,
            "POST",
            &format!("/api/projects/{id}/tasks"),
            Some(json!({ "title": "Build landing page", "effort_hours": 4, "depends_on": [wire] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{task}");
        let task_id = task["id"].as_str().unwrap().to_owned();

        let (_, direct) = send(&app, "GET", &format!("/api/tasks/{task_id}/dependencies"), None).await;
        assert_eq!(direct.as_array().unwrap().len(), 1);
        let (_, all) = send(
            &app,
            "GET",
            &format!("/api/tasks/{task_id}/dependencies?transitive=true"),
            None,
        )
        .await;
        assert_eq!(all.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_bad_query_string_uses_error_body() {
        let app = test_app(vec![Canned::Text(plan_json())], PlannerConfig::default());
        let (_, commit) = project_with_plan(&app).await;
        let wire = commit["task_ids"][1].as_str().unwrap().to_owned();

        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/tasks/{wire}/dependencies?transitive=maybe"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");
        assert!(body["error"].is_string(), "{body}");
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let app = test_app(vec![], PlannerConfig::default());
        let random = Uuid::new_v4();

        let (status, body) = send(&app, "GET", &format!("/api/projects/{random}/columns"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/tasks/{random}/reorder"),
            Some(json!({ "status": "todo", "index": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, "GET", "/api/projects/not-a-uuid/columns", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn test_list_projects() {
        let app = test_app(vec![], PlannerConfig::default());
        let (status, body) = send(&app, "GET", "/api/projects", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, body) = send(&app, "POST", "/api/projects", Some(json!({ "title": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");
    }
}
