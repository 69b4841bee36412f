use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::db::Database;
use crate::models::{JobPatch, NewJob, Stage};
use crate::service::{JobService, ServiceError};

struct AppState {
    service: Mutex<JobService>,
}

type SharedState = Arc<AppState>;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Blocking entry point for the `serve` command.
pub fn run(db: Database, port: u16) -> Result<()> {
    tokio::runtime::Runtime::new()
        .context("Failed to start async runtime")?
        .block_on(serve(db, port))
}

async fn serve(db: Database, port: u16) -> Result<()> {
    let app = app(db);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind 0.0.0.0:{port}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn app(db: Database) -> Router {
    let state = Arc::new(AppState {
        service: Mutex::new(JobService::new(db)),
    });
    router(state)
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/jobs", get(list_jobs).post(create_job))
        .route("/jobs/stats", get(stats))
        .route("/jobs/stage/:stage", get(jobs_by_stage))
        .route(
            "/jobs/:id",
            get(get_job).put(update_job).delete(delete_job),
        )
        .route("/jobs/:id/stage", patch(update_stage))
        .fallback(not_found)
        .with_state(state)
}

fn lock(state: &SharedState) -> MutexGuard<'_, JobService> {
    // A poisoning panic already aborted some request; the service itself
    // holds no half-applied state, so keep serving.
    state.service.lock().unwrap_or_else(|e| e.into_inner())
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn error_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, msg),
        ServiceError::NotFound(_) => json_error(StatusCode::NOT_FOUND, err.to_string()),
        ServiceError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Json extractor whose rejection carries this API's 400 error body
/// instead of axum's default 422 with a plain-text message.
struct AppJson<T>(T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(json_error(StatusCode::BAD_REQUEST, rejection.body_text())),
        }
    }
}

/// Route ids are numeric rowids; anything unparseable cannot match a
/// job, so it reports the same way a missing id does.
fn parse_id(raw: &str) -> Result<i64, Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::NOT_FOUND, "Job not found"))
}

// --- Handlers ---

async fn index() -> Response {
    Json(json!({
        "message": "Job Application Tracker API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "jobs": "/jobs",
            "health": "/health"
        }
    }))
    .into_response()
}

async fn health() -> Response {
    Json(json!({ "status": "OK", "timestamp": Utc::now().to_rfc3339() })).into_response()
}

async fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "Route not found")
}

async fn list_jobs(State(state): State<SharedState>) -> Response {
    match lock(&state).list_jobs() {
        Ok(jobs) => (StatusCode::OK, Json(jobs)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn create_job(
    State(state): State<SharedState>,
    AppJson(input): AppJson<NewJob>,
) -> Response {
    match lock(&state).create_job(input) {
        Ok(job) => {
            tracing::info!(id = job.id, company = %job.company, "job created");
            (StatusCode::CREATED, Json(job)).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn get_job(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match lock(&state).get_job(id) {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn update_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    AppJson(body): AppJson<JobPatch>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match lock(&state).update_job(id, body) {
        Ok(job) => {
            tracing::info!(id = job.id, "job updated");
            (StatusCode::OK, Json(job)).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn delete_job(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match lock(&state).delete_job(id) {
        Ok(()) => {
            tracing::info!(id, "job deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn jobs_by_stage(State(state): State<SharedState>, Path(stage): Path<String>) -> Response {
    let stage = match Stage::from_str(&stage) {
        Ok(stage) => stage,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "Invalid job stage"),
    };
    match lock(&state).list_by_stage(stage) {
        Ok(jobs) => (StatusCode::OK, Json(jobs)).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct StageBody {
    stage: String,
}

async fn update_stage(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    AppJson(body): AppJson<StageBody>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let stage = match Stage::from_str(&body.stage) {
        Ok(stage) => stage,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "Invalid job stage"),
    };
    match lock(&state).update_stage(id, stage) {
        Ok(job) => {
            tracing::info!(id = job.id, stage = %job.current_stage, "stage updated");
            (StatusCode::OK, Json(job)).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn stats(State(state): State<SharedState>) -> Response {
    match lock(&state).get_stats() {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        app(db)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = match body {
            Some(json) => HttpRequest::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => HttpRequest::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create(app: &Router, title: &str, company: &str) -> Value {
        let (status, body) = send(
            app,
            "POST",
            "/jobs",
            Some(json!({ "title": title, "company": company })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    #[tokio::test]
    async fn test_create_job_defaults_to_saved() {
        let app = test_app();
        let job = create(&app, "Backend Engineer", "Acme").await;
        assert_eq!(job["currentStage"], "SAVED");
        assert_eq!(job["contacts"], json!([]));
        assert_eq!(job["interviews"], json!([]));
        assert!(job["applicationDate"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_create_job_with_empty_title_is_400() {
        let app = test_app();
        let (status, body) = send(
            &app,
            "POST",
            "/jobs",
            Some(json!({ "title": "  ", "company": "Acme" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Title and company are required");
    }

    #[tokio::test]
    async fn test_create_job_with_unknown_stage_is_400() {
        let app = test_app();
        let (status, body) = send(
            &app,
            "POST",
            "/jobs",
            Some(json!({ "title": "x", "company": "y", "currentStage": "HIRED" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_get_missing_job_is_404() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/jobs/99", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Job not found");

        let (status, _) = send(&app, "GET", "/jobs/not-a-number", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_jobs_newest_first() {
        let app = test_app();
        create(&app, "First", "A").await;
        create(&app, "Second", "B").await;
        let (status, body) = send(&app, "GET", "/jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        let jobs = body.as_array().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0]["title"], "Second");
        assert_eq!(jobs[1]["title"], "First");
    }

    #[tokio::test]
    async fn test_put_applies_partial_update() {
        let app = test_app();
        let job = create(&app, "Engineer", "Acme").await;
        let id = job["id"].as_i64().unwrap();

        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/jobs/{id}"),
            Some(json!({ "location": "Berlin", "notes": "warm intro" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["location"], "Berlin");
        assert_eq!(updated["title"], "Engineer");

        // explicit null clears, absent keeps
        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/jobs/{id}"),
            Some(json!({ "notes": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["notes"], Value::Null);
        assert_eq!(updated["location"], "Berlin");
    }

    #[tokio::test]
    async fn test_put_rejects_empty_title() {
        let app = test_app();
        let job = create(&app, "Engineer", "Acme").await;
        let id = job["id"].as_i64().unwrap();
        let (status, _) = send(
            &app,
            "PUT",
            &format!("/jobs/{id}"),
            Some(json!({ "title": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_put_missing_job_is_404() {
        let app = test_app();
        let (status, _) = send(&app, "PUT", "/jobs/404", Some(json!({ "title": "x" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_patch_stage_validates_value() {
        let app = test_app();
        let job = create(&app, "Engineer", "Acme").await;
        let id = job["id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            "PATCH",
            &format!("/jobs/{id}/stage"),
            Some(json!({ "stage": "SHORTLISTED" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid job stage");

        let (status, body) = send(
            &app,
            "PATCH",
            &format!("/jobs/{id}/stage"),
            Some(json!({ "stage": "OFFER" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currentStage"], "OFFER");
    }

    #[tokio::test]
    async fn test_jobs_by_stage_filters_and_validates() {
        let app = test_app();
        create(&app, "A", "A Corp").await;
        let job = create(&app, "B", "B Corp").await;
        let id = job["id"].as_i64().unwrap();
        send(
            &app,
            "PATCH",
            &format!("/jobs/{id}/stage"),
            Some(json!({ "stage": "APPLIED" })),
        )
        .await;

        let (status, body) = send(&app, "GET", "/jobs/stage/APPLIED", None).await;
        assert_eq!(status, StatusCode::OK);
        let jobs = body.as_array().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["title"], "B");

        let (status, body) = send(&app, "GET", "/jobs/stage/BOGUS", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid job stage");
    }

    #[tokio::test]
    async fn test_stats_reflect_mutations() {
        let app = test_app();
        let (_, stats) = send(&app, "GET", "/jobs/stats", None).await;
        assert_eq!(stats, json!({ "totalJobs": 0, "jobsByStage": {} }));

        let job = create(&app, "Engineer", "Acme").await;
        let id = job["id"].as_i64().unwrap();
        let (_, stats) = send(&app, "GET", "/jobs/stats", None).await;
        assert_eq!(stats, json!({ "totalJobs": 1, "jobsByStage": { "SAVED": 1 } }));

        send(
            &app,
            "PATCH",
            &format!("/jobs/{id}/stage"),
            Some(json!({ "stage": "REJECTED" })),
        )
        .await;
        let (_, stats) = send(&app, "GET", "/jobs/stats", None).await;
        assert_eq!(stats, json!({ "totalJobs": 1, "jobsByStage": { "REJECTED": 1 } }));
    }

    #[tokio::test]
    async fn test_delete_job_returns_204_then_404() {
        let app = test_app();
        let job = create(&app, "Engineer", "Acme").await;
        let id = job["id"].as_i64().unwrap();

        let (status, body) = send(&app, "DELETE", &format!("/jobs/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, _) = send(&app, "DELETE", &format!("/jobs/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "GET", &format!("/jobs/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_service_descriptor_and_health() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["endpoints"]["jobs"], "/jobs");

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
    }

    #[tokio::test]
    async fn test_unmatched_route_is_404() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Route not found");
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let app = test_app();
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/jobs")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
