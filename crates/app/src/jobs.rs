//! HTTP handlers for the job application CRUD endpoints.
//!
//! Each handler is stateless: it validates the request, issues a single store
//! call (update reads then writes) and renders the outcome as JSON.

use std::{future::Future, time::Instant};

use axum::{
    body::Bytes,
    extract::{rejection::PathRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::{counter, histogram};
use serde_json::json;
use tracing::{error, info, warn};

use job_tracker_core::{new_job_id, JobFields, StoreError, StoreOperation};

use crate::error::ApiError;
use crate::router::AppState;

/// `POST /jobs`
pub async fn create_job(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let outcome = create(&state, &body).await;
    record_outcome("create", &outcome);
    outcome
}

async fn create(state: &AppState, body: &[u8]) -> Result<Response, ApiError> {
    let job = JobFields::from_json(body)?.into_new_job(new_job_id(), state.now())?;

    let created = timed(StoreOperation::Create, state.store().create(&job)).await?;
    info!(stage = "api", op = "create", job_id = %created.id, "job created");

    Ok((StatusCode::CREATED, Json(created)).into_response())
}

/// `GET /jobs`
pub async fn list_jobs(State(state): State<AppState>) -> Result<Response, ApiError> {
    let outcome = list(&state).await;
    record_outcome("list", &outcome);
    outcome
}

async fn list(state: &AppState) -> Result<Response, ApiError> {
    let jobs = timed(StoreOperation::List, state.store().get_all()).await?;
    Ok((StatusCode::OK, Json(jobs)).into_response())
}

/// `PUT /jobs/{id}`
pub async fn update_job(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let outcome = update(&state, id, &body).await;
    record_outcome("update", &outcome);
    outcome
}

async fn update(
    state: &AppState,
    id: Result<Path<String>, PathRejection>,
    body: &[u8],
) -> Result<Response, ApiError> {
    let id = route_id(id)?;

    let existing = timed(StoreOperation::Read, state.store().get_by_id(&id))
        .await?
        .ok_or_else(ApiError::job_not_found)?;

    let patch = JobFields::from_json(body)?;
    let merged = existing.merge(patch, state.now());

    let updated = timed(StoreOperation::Upsert, state.store().upsert(&id, &merged)).await?;
    info!(
        stage = "api",
        op = "update",
        job_id = %updated.id,
        status = %updated.status,
        "job updated"
    );

    Ok((StatusCode::OK, Json(updated)).into_response())
}

/// `DELETE /jobs/{id}`
pub async fn delete_job(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Response, ApiError> {
    let outcome = delete(&state, id).await;
    record_outcome("delete", &outcome);
    outcome
}

async fn delete(
    state: &AppState,
    id: Result<Path<String>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = route_id(id)?;

    let deleted = timed(StoreOperation::Delete, state.store().delete(&id)).await?;
    if !deleted {
        return Err(ApiError::job_not_found());
    }
    info!(stage = "api", op = "delete", job_id = %id, "job deleted");

    let body = json!({ "message": "Job deleted successfully", "id": id });
    Ok((StatusCode::OK, Json(body)).into_response())
}

/// `PUT|DELETE /jobs/` with an empty id segment.
pub async fn missing_id() -> ApiError {
    warn!(stage = "api", "request without job id");
    ApiError::missing_id()
}

/// Fallback for paths no route matches.
pub async fn route_not_found() -> ApiError {
    ApiError::route_not_found()
}

/// Fallback for a known job path hit with an unsupported method.
pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

fn route_id(id: Result<Path<String>, PathRejection>) -> Result<String, ApiError> {
    match id {
        Ok(Path(id)) if !id.trim().is_empty() => Ok(id),
        Ok(_) => Err(ApiError::missing_id()),
        Err(rejection) => Err(ApiError::Validation(rejection.body_text())),
    }
}

async fn timed<T, F>(operation: StoreOperation, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let start = Instant::now();
    let result = call.await;
    histogram!("store_call_seconds", "op" => operation.as_str())
        .record(start.elapsed().as_secs_f64());
    result
}

fn record_outcome(op: &'static str, outcome: &Result<Response, ApiError>) {
    let result = match outcome {
        Ok(_) => "ok",
        Err(err) => {
            match err {
                ApiError::Validation(detail) => {
                    warn!(stage = "api", op, %detail, "rejected invalid request")
                }
                ApiError::NotFound(_) => info!(stage = "api", op, "job not found"),
                ApiError::MethodNotAllowed(detail) => {
                    warn!(stage = "api", op, %detail, "rejected request method")
                }
                ApiError::Store(source) => {
                    error!(stage = "api", op, error = %source, "store call failed")
                }
            }
            err.metric_label()
        }
    };
    counter!("api_job_requests_total", "op" => op, "result" => result).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Method, Request},
    };
    use chrono::{DateTime, TimeZone, Utc};
    use http_body_util::BodyExt;
    use job_tracker_core::{JobApplication, JobStore};
    use job_tracker_storage::{Database, MemoryJobStore};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::router::app_router;
    use crate::telemetry;

    fn fixed_clock(at: DateTime<Utc>) -> Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> {
        Arc::new(move || at)
    }

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn state_with(store: Arc<dyn JobStore>) -> AppState {
        let metrics = telemetry::init_metrics().expect("metrics init");
        AppState::new(metrics, store)
    }

    fn memory_state() -> (AppState, Arc<MemoryJobStore>) {
        let store = Arc::new(MemoryJobStore::new());
        (state_with(store.clone()), store)
    }

    fn request(method: Method, uri: &str, body: Option<&str>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
        let response = app_router(state.clone())
            .oneshot(req)
            .await
            .expect("handler should respond");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes();
        let value = serde_json::from_slice(&bytes).expect("json body");
        (status, value)
    }

    async fn create_acme(state: &AppState) -> Value {
        let (status, body) = send(
            state,
            request(
                Method::POST,
                "/jobs",
                Some(r#"{"company":"Acme","position":"Engineer","status":"applied"}"#),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    struct FailingStore;

    #[async_trait]
    impl JobStore for FailingStore {
        async fn get_all(&self) -> Result<Vec<JobApplication>, StoreError> {
            Err(StoreError::backend(StoreOperation::List, "backend unavailable"))
        }

        async fn get_by_id(&self, _id: &str) -> Result<Option<JobApplication>, StoreError> {
            Err(StoreError::backend(StoreOperation::Read, "backend unavailable"))
        }

        async fn create(&self, _job: &JobApplication) -> Result<JobApplication, StoreError> {
            Err(StoreError::backend(StoreOperation::Create, "backend unavailable"))
        }

        async fn upsert(
            &self,
            _id: &str,
            _job: &JobApplication,
        ) -> Result<JobApplication, StoreError> {
            Err(StoreError::backend(StoreOperation::Upsert, "backend unavailable"))
        }

        async fn delete(&self, _id: &str) -> Result<bool, StoreError> {
            Err(StoreError::backend(StoreOperation::Delete, "backend unavailable"))
        }
    }

    #[tokio::test]
    async fn create_populates_generated_fields_and_defaults() {
        let (state, _store) = memory_state();
        let state = state.with_clock(fixed_clock(t(9)));

        let body = create_acme(&state).await;

        assert!(!body["id"].as_str().expect("id").is_empty());
        assert_eq!(body["createdAt"], "2024-05-01T09:00:00.000Z");
        assert_eq!(body["appliedDate"], "2024-05-01T09:00:00.000Z");
        assert_eq!(body["location"], "");
        assert_eq!(body["salary"], "");
        assert_eq!(body["notes"], "");
        assert!(body.get("updatedAt").is_none());
    }

    #[tokio::test]
    async fn create_reports_first_missing_field_and_persists_nothing() {
        let (state, store) = memory_state();

        let cases = [
            (r#"{"position":"Engineer","status":"applied"}"#, "company"),
            (r#"{"company":"Acme","status":"applied"}"#, "position"),
            (r#"{"company":"Acme","position":"Engineer"}"#, "status"),
            (r#"{}"#, "company"),
        ];
        for (payload, field) in cases {
            let (status, body) = send(&state, request(Method::POST, "/jobs", Some(payload))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], format!("Missing required field: {field}"));
        }

        assert!(store.get_all().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn create_rejects_malformed_json() {
        let (state, store) = memory_state();

        let (status, body) = send(&state, request(Method::POST, "/jobs", Some("{oops"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON in request body");
        assert!(store.get_all().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn create_generates_unique_ids() {
        let (state, _store) = memory_state();

        let mut ids = std::collections::HashSet::new();
        for _ in 0..25 {
            let body = create_acme(&state).await;
            ids.insert(body["id"].as_str().expect("id").to_string());
        }
        assert_eq!(ids.len(), 25);
    }

    #[tokio::test]
    async fn created_record_round_trips_through_list() {
        let (state, _store) = memory_state();

        let (status, created) = send(
            &state,
            request(
                Method::POST,
                "/jobs",
                Some(
                    r#"{"company":"Globex","position":"SRE","status":"interviewing","salary":"120k","appliedDate":"2024-04-20"}"#,
                ),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, listed) = send(&state, request(Method::GET, "/jobs", None)).await;
        assert_eq!(status, StatusCode::OK);
        let listed = listed.as_array().expect("array");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], created);
        assert_eq!(listed[0]["company"], "Globex");
        assert_eq!(listed[0]["salary"], "120k");
        assert_eq!(listed[0]["appliedDate"], "2024-04-20");
        assert_eq!(listed[0]["location"], "");
        assert_eq!(listed[0]["notes"], "");
    }

    #[tokio::test]
    async fn update_merges_only_supplied_fields() {
        let (state, _store) = memory_state();
        let created = create_acme(&state.clone().with_clock(fixed_clock(t(9)))).await;
        let id = created["id"].as_str().expect("id").to_string();

        let later = state.with_clock(fixed_clock(t(11)));
        let (status, updated) = send(
            &later,
            request(
                Method::PUT,
                &format!("/jobs/{id}"),
                Some(r#"{"status":"interviewing"}"#),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "interviewing");
        for field in [
            "id",
            "company",
            "position",
            "location",
            "salary",
            "notes",
            "appliedDate",
            "createdAt",
        ] {
            assert_eq!(updated[field], created[field], "field {field} changed");
        }
        let updated_at = updated["updatedAt"].as_str().expect("updatedAt");
        assert_eq!(updated_at, "2024-05-01T11:00:00.000Z");
        assert!(updated_at >= created["createdAt"].as_str().expect("createdAt"));
    }

    #[tokio::test]
    async fn status_accepts_arbitrary_values() {
        let (state, _store) = memory_state();

        let (status, created) = send(
            &state,
            request(
                Method::POST,
                "/jobs",
                Some(r#"{"company":"Initech","position":"Analyst","status":"ghosted"}"#),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "ghosted");
        let id = created["id"].as_str().expect("id").to_string();

        let (status, updated) = send(
            &state,
            request(Method::PUT, &format!("/jobs/{id}"), Some(r#"{"status":"???"}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "???");
    }

    #[tokio::test]
    async fn update_ignores_id_and_created_at_in_body() {
        let (state, store) = memory_state();
        let created = create_acme(&state).await;
        let id = created["id"].as_str().expect("id").to_string();

        let (status, updated) = send(
            &state,
            request(
                Method::PUT,
                &format!("/api/jobs/{id}"),
                Some(r#"{"id":"hijack","createdAt":"1999-01-01","notes":"follow up"}"#),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["id"], id.as_str());
        assert_eq!(updated["createdAt"], created["createdAt"]);
        assert_eq!(updated["notes"], "follow up");
        assert!(store.get_by_id("hijack").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn update_checks_existence_before_parsing_body() {
        let (state, _store) = memory_state();

        let (status, body) =
            send(&state, request(Method::PUT, "/jobs/missing", Some("{oops"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Job not found");
    }

    #[tokio::test]
    async fn update_rejects_malformed_json_for_existing_job() {
        let (state, store) = memory_state();
        let created = create_acme(&state).await;
        let id = created["id"].as_str().expect("id").to_string();

        let (status, body) =
            send(&state, request(Method::PUT, &format!("/jobs/{id}"), Some("{oops"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON in request body");

        let stored = store.get_by_id(&id).await.expect("read").expect("present");
        assert!(stored.updated_at.is_none());
    }

    #[tokio::test]
    async fn empty_id_is_a_client_error() {
        let (state, _store) = memory_state();

        for method in [Method::PUT, Method::DELETE] {
            let (status, body) = send(&state, request(method, "/jobs/", Some("{}"))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Job ID is required");
        }

        let (status, body) = send(&state, request(Method::DELETE, "/jobs/%20", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Job ID is required");
    }

    #[tokio::test]
    async fn delete_twice_returns_ok_then_not_found() {
        let (state, store) = memory_state();
        let keep = create_acme(&state).await;
        let created = create_acme(&state).await;
        let id = created["id"].as_str().expect("id").to_string();

        let uri = format!("/jobs/{id}");
        let (status, body) = send(&state, request(Method::DELETE, &uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({ "message": "Job deleted successfully", "id": id })
        );

        let (status, body) = send(&state, request(Method::DELETE, &uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Job not found");

        let (status, _) = send(
            &state,
            request(Method::PUT, &format!("/jobs/{id}"), Some(r#"{"status":"offer"}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let remaining = store.get_all().await.expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep["id"].as_str().expect("id"));
    }

    #[tokio::test]
    async fn store_failures_map_to_server_errors() {
        let state = state_with(Arc::new(FailingStore));

        let cases = [
            (Method::GET, "/jobs", None, "error retrieving jobs: backend unavailable"),
            (
                Method::POST,
                "/jobs",
                Some(r#"{"company":"Acme","position":"Engineer","status":"applied"}"#),
                "error creating job: backend unavailable",
            ),
            (
                Method::PUT,
                "/jobs/job-1",
                Some(r#"{"status":"offer"}"#),
                "error retrieving job: backend unavailable",
            ),
            (Method::DELETE, "/jobs/job-1", None, "error deleting job: backend unavailable"),
        ];

        for (method, uri, payload, message) in cases {
            let (status, body) = send(&state, request(method, uri, payload)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["error"], message);
        }
    }

    #[tokio::test]
    async fn validation_happens_before_store_calls() {
        let state = state_with(Arc::new(FailingStore));

        let (status, body) = send(
            &state,
            request(Method::POST, "/jobs", Some(r#"{"company":"Acme"}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required field: position");
    }

    #[tokio::test]
    async fn handlers_work_against_sqlite_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("jobs.db").display());
        let database = Database::connect(&url).await.expect("connect");
        database.run_migrations().await.expect("migrations");
        let state = state_with(Arc::new(database.jobs()));

        let created = create_acme(&state).await;
        let id = created["id"].as_str().expect("id").to_string();

        let (status, updated) = send(
            &state,
            request(Method::PUT, &format!("/jobs/{id}"), Some(r#"{"status":"offer"}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "offer");

        let (status, listed) = send(&state, request(Method::GET, "/jobs", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed, Value::Array(vec![updated]));
    }
}
