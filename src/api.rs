//! HTTP surface: thin pass-throughs to the engine.
//!
//! Every handler validates nothing itself; it forwards to the engine method
//! and maps `EngineError` onto a status code and a JSON error body.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::engine::{Engine, ExternalErrorReport};
use crate::errors::EngineError;

type AppState = Arc<Engine>;

/// Build the API router around a shared engine.
pub fn router(engine: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/projects", post(create_project))
        .route("/api/projects/generate", post(generate))
        .route("/api/projects/stop", post(stop))
        .route("/api/status", get(status))
        .route("/api/errors", post(report_error))
        .route("/api/history", get(history))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

/// Serve the API on `addr` until the process exits.
pub async fn serve(engine: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API listening");
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::NoProject => StatusCode::NOT_FOUND,
            EngineError::InvalidStatus { .. } => StatusCode::CONFLICT,
            EngineError::Initialization(_) | EngineError::Planning(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.0.to_string(),
            "type": self.0.issue_type(),
        });
        (status, Json(body)).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    description: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateProjectResponse {
    project_id: String,
    status: String,
    plan_summary: String,
    task_count: usize,
}

/// Initialize and plan in one call.
async fn create_project(
    State(engine): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<Json<CreateProjectResponse>, ApiError> {
    let init = engine
        .initialize(&request.description, request.name.as_deref())
        .await?;
    let plan = engine.plan().await?;
    Ok(Json(CreateProjectResponse {
        project_id: init.project_id,
        status: engine.status().status.to_string(),
        plan_summary: plan.plan_summary,
        task_count: plan.task_count,
    }))
}

async fn generate(State(engine): State<AppState>) -> Result<Response, ApiError> {
    let response = engine.generate_code(true).await?;
    Ok(Json(response).into_response())
}

async fn stop(State(engine): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({"status": engine.stop()}))
}

async fn status(State(engine): State<AppState>) -> Json<crate::project::StatusSnapshot> {
    Json(engine.status())
}

async fn report_error(
    State(engine): State<AppState>,
    Json(report): Json<ExternalErrorReport>,
) -> Json<serde_json::Value> {
    let issue = engine.report_external_error(report);
    Json(json!({"issue_id": issue.issue_id, "status": "recorded"}))
}

async fn history(State(engine): State<AppState>) -> Result<Response, ApiError> {
    let entries = engine
        .history()
        .entries()
        .map_err(EngineError::Other)?;
    Ok(Json(entries).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::workers::{TemplatePlanner, TemplateWorker, WorkerRegistry};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router(workspace: &std::path::Path) -> Router {
        let config = EngineConfig::default().with_workspace(workspace.to_path_buf());
        let mut registry = WorkerRegistry::new();
        registry.register_for_all_layers(Arc::new(TemplateWorker));
        registry.register("planner", Arc::new(TemplatePlanner));
        router(Arc::new(Engine::new(config).with_registry(registry)))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn create_project_initializes_and_plans() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let request = Request::builder()
            .method("POST")
            .uri("/api/projects")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"description": "A todo app", "name": "todo"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "planned");
        assert!(body["project_id"].as_str().is_some_and(|s| !s.is_empty()));
        assert!(body["task_count"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn generate_without_project_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let request = Request::builder()
            .method("POST")
            .uri("/api/projects/generate")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["type"], "PreconditionError");
    }

    #[tokio::test]
    async fn status_is_idle_before_any_project() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let response = app
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "idle");
        assert_eq!(body["run_active"], false);
    }

    #[tokio::test]
    async fn report_error_records_an_issue() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let request = Request::builder()
            .method("POST")
            .uri("/api/errors")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message": "TypeError in console"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "recorded");
        assert!(body["issue_id"].as_str().is_some_and(|s| !s.is_empty()));
    }

    #[tokio::test]
    async fn stop_always_acknowledges() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let request = Request::builder()
            .method("POST")
            .uri("/api/projects/stop")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(body_json(response).await["status"], "stopping_initiated");
    }

    #[tokio::test]
    async fn history_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());
        let response = app
            .oneshot(Request::builder().uri("/api/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }
}
