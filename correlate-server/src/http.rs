//! Correlate HTTP REST API
//!
//! Axum-based HTTP server exposing the employee demo endpoints. Every store
//! operation goes through the correlation pipeline: correlation id
//! resolution, workload routing, session tuning and context binding, then
//! execution.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /                             — banner
//! - GET  /health                       — store probe through the pipeline
//! - GET  /version                      — server version info
//! - GET  /api/employees                — employee list
//! - GET  /api/employees/high-salary    — salary filter
//! - POST /api/employees                — insert employee
//! - GET  /api/analytics/salary-stats   — monthly salary aggregates
//! - GET  /api/analytics/hiring-trend   — yearly hiring aggregates
//! - GET  /api/reports/salary-bands     — salary band report
//! - GET  /api/complex-query            — self-join with aggregation
//! - GET  /api/slow-query               — cartesian product

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use correlate_core::db::PgConnector;
use correlate_core::trace::CORRELATION_ID_HEADER;
use correlate_core::{
    telemetry, CorrelateConfig, CorrelateError, OperationFailure, OperationOutcome,
    OperationRequest, Pipeline, RequestHeaders, ThreadRandom,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::catalog::{self, NewEmployee, HIGH_SALARY_THRESHOLD};

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub pipeline: Pipeline,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/api/employees", get(employees_handler).post(create_employee_handler))
        .route("/api/employees/high-salary", get(high_salary_handler))
        .route("/api/analytics/salary-stats", get(salary_stats_handler))
        .route("/api/analytics/hiring-trend", get(hiring_trend_handler))
        .route("/api/reports/salary-bands", get(salary_bands_handler))
        .route("/api/complex-query", get(complex_query_handler))
        .route("/api/slow-query", get(slow_query_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address against PostgreSQL.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    config: CorrelateConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let pipeline = Pipeline::new(
        Arc::new(config),
        Arc::new(PgConnector),
        Arc::new(ThreadRandom),
    )?;
    let state = Arc::new(HttpState { pipeline });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Correlate HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Run one operation through the pipeline inside its own span and shape the
/// success payload with `payload`. The correlation envelope is merged in.
pub async fn run_inner<F>(
    pipeline: &Pipeline,
    request: OperationRequest,
    headers: &RequestHeaders,
    payload: F,
) -> (StatusCode, Value)
where
    F: FnOnce(&OperationOutcome) -> Value,
{
    let span = telemetry::operation_span(&request.operation);
    let result = pipeline
        .run(request, headers, &span)
        .instrument(span.clone())
        .await;

    match result {
        Ok(outcome) => {
            let mut body = payload(&outcome);
            if let Some(obj) = body.as_object_mut() {
                obj.insert("correlation_id".to_string(), json!(outcome.correlation.correlation_id));
                obj.insert("observability".to_string(), outcome.observability());
            }
            (StatusCode::OK, body)
        }
        Err(failure) => failure_to_http(&failure),
    }
}

pub fn root_inner() -> Value {
    json!({"message": "Correlate API - ready to trigger correlated database queries"})
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "correlate/1",
    })
}

pub async fn health_inner(pipeline: &Pipeline, headers: &RequestHeaders) -> (StatusCode, Value) {
    let (status, body) = run_inner(pipeline, catalog::health_probe(), headers, |_| {
        json!({"status": "healthy", "database": "connected"})
    })
    .await;

    if status == StatusCode::OK {
        return (status, body);
    }
    (
        StatusCode::SERVICE_UNAVAILABLE,
        json!({
            "status": "unhealthy",
            "error": body["error"],
            "correlation_id": body["correlation_id"],
        }),
    )
}

pub async fn employees_inner(pipeline: &Pipeline, headers: &RequestHeaders) -> (StatusCode, Value) {
    run_inner(pipeline, catalog::list_employees(), headers, |outcome| {
        json!({
            "query_type": "employees_list",
            "explain_plan_hint": "FULL table scan with ORDER BY",
            "count": outcome.records.len(),
            "employees": outcome.records,
        })
    })
    .await
}

pub async fn high_salary_inner(pipeline: &Pipeline, headers: &RequestHeaders) -> (StatusCode, Value) {
    run_inner(pipeline, catalog::high_salary_employees(), headers, |outcome| {
        json!({
            "query_type": "high_salary_filter",
            "explain_plan_hint": "INDEX range scan on salary",
            "threshold": HIGH_SALARY_THRESHOLD,
            "count": outcome.records.len(),
            "employees": outcome.records,
        })
    })
    .await
}

pub async fn create_employee_inner(
    pipeline: &Pipeline,
    headers: &RequestHeaders,
    new_employee: NewEmployee,
) -> (StatusCode, Value) {
    let row = new_employee.fill(&mut rand::thread_rng());
    run_inner(pipeline, catalog::create_employee(&row), headers, |outcome| {
        json!({
            "query_type": "employee_insert",
            "explain_plan_hint": "INSERT with index maintenance",
            "employee": outcome.records.first(),
        })
    })
    .await
}

pub async fn salary_stats_inner(pipeline: &Pipeline, headers: &RequestHeaders) -> (StatusCode, Value) {
    run_inner(pipeline, catalog::salary_stats(), headers, |outcome| {
        json!({
            "query_type": "salary_analytics",
            "explain_plan_hint": "FULL scan with GROUP BY aggregation",
            "analytics": outcome.records,
        })
    })
    .await
}

pub async fn hiring_trend_inner(pipeline: &Pipeline, headers: &RequestHeaders) -> (StatusCode, Value) {
    run_inner(pipeline, catalog::hiring_trend(), headers, |outcome| {
        json!({
            "query_type": "hiring_trend",
            "explain_plan_hint": "FULL scan with yearly aggregation",
            "trend": outcome.records,
        })
    })
    .await
}

pub async fn salary_bands_inner(pipeline: &Pipeline, headers: &RequestHeaders) -> (StatusCode, Value) {
    run_inner(pipeline, catalog::salary_bands(), headers, |outcome| {
        json!({
            "query_type": "salary_bands_report",
            "explain_plan_hint": "FULL scan with hash aggregation",
            "bands": outcome.records,
        })
    })
    .await
}

pub async fn complex_query_inner(pipeline: &Pipeline, headers: &RequestHeaders) -> (StatusCode, Value) {
    run_inner(pipeline, catalog::complex_query(), headers, |outcome| {
        json!({
            "query_type": "complex_self_join",
            "explain_plan_hint": "Nested loops self-join with aggregation",
            "description": "Shows each employee and count of colleagues earning more",
            "results": outcome.records,
        })
    })
    .await
}

pub async fn slow_query_inner(pipeline: &Pipeline, headers: &RequestHeaders) -> (StatusCode, Value) {
    run_inner(pipeline, catalog::slow_query(), headers, |outcome| {
        let count = outcome
            .records
            .first()
            .and_then(|r| r.get("cartesian_count"))
            .cloned()
            .unwrap_or(json!(0));
        json!({
            "query_type": "slow_cartesian_product",
            "explain_plan_hint": "Cartesian product without indexes",
            "warning": "This query intentionally generates heavy load",
            "result": {"cartesian_count": count},
        })
    })
    .await
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn root_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(root_inner()))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    respond(health_inner(&state.pipeline, &request_headers(&headers)).await)
}

pub async fn employees_handler(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    respond(employees_inner(&state.pipeline, &request_headers(&headers)).await)
}

pub async fn high_salary_handler(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    respond(high_salary_inner(&state.pipeline, &request_headers(&headers)).await)
}

pub async fn create_employee_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Json(new_employee): Json<NewEmployee>,
) -> Response {
    respond(create_employee_inner(&state.pipeline, &request_headers(&headers), new_employee).await)
}

pub async fn salary_stats_handler(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    respond(salary_stats_inner(&state.pipeline, &request_headers(&headers)).await)
}

pub async fn hiring_trend_handler(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    respond(hiring_trend_inner(&state.pipeline, &request_headers(&headers)).await)
}

pub async fn salary_bands_handler(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    respond(salary_bands_inner(&state.pipeline, &request_headers(&headers)).await)
}

pub async fn complex_query_handler(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    respond(complex_query_inner(&state.pipeline, &request_headers(&headers)).await)
}

pub async fn slow_query_handler(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    respond(slow_query_inner(&state.pipeline, &request_headers(&headers)).await)
}

// ============================================================================
// Helpers
// ============================================================================

/// Extract the correlation-relevant headers. Non-UTF-8 values are skipped.
pub fn request_headers(headers: &HeaderMap) -> RequestHeaders {
    RequestHeaders::from_pairs(
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
    )
}

/// HTTP status for a fatal pipeline error.
pub fn status_for(error: &CorrelateError) -> StatusCode {
    match error {
        CorrelateError::ConnectionFailure { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a pipeline failure into `(status, error body)`.
pub fn failure_to_http(failure: &OperationFailure) -> (StatusCode, Value) {
    (
        status_for(&failure.error),
        json!({
            "error": failure.error.to_string(),
            "status": "error",
            "correlation_id": failure.correlation.correlation_id,
            "instance": failure.error.instance(),
        }),
    )
}

/// Build the response, echoing the correlation id as a header.
fn respond((status, body): (StatusCode, Value)) -> Response {
    let correlation = body["correlation_id"]
        .as_str()
        .and_then(|id| HeaderValue::from_str(id).ok());
    let mut response = (status, Json(body)).into_response();
    if let Some(value) = correlation {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

// ============================================================================
// Unit Tests — pure helpers
// ============================================================================
