//! HTTP integration tests for the Correlate REST API.
//!
//! The store is an in-memory fake, so these run without PostgreSQL. They use
//! both the inner function approach and the Axum `oneshot` approach for full
//! handler dispatch.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use correlate_core::config::{
    BindingConfig, ExecutionConfig, HttpConfig, RoutingConfig, ServiceConfig, StoreCredentials,
    TuningConfig,
};
use correlate_core::{
    CorrelateConfig, InstanceDescriptor, Pipeline, RandomSource, RequestHeaders, ResultSet,
    SqlValue, Statement, StoreConnector, StoreError, StoreSession, Tier, WorkloadType,
};
use correlate_server::http::{build_router, employees_inner, health_inner, HttpState};
use serde_json::{json, Value};
use tower::ServiceExt;

const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

// ===========================================================================
// Fakes
// ===========================================================================

#[derive(Default, Clone)]
struct Behaviour {
    refuse_connect: bool,
    reject_binding: bool,
    fail_execute: bool,
}

#[derive(Default)]
struct FakeStore {
    behaviour: Behaviour,
    log: Arc<Mutex<Vec<String>>>,
}

struct FakeSession {
    behaviour: Behaviour,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl StoreConnector for FakeStore {
    async fn connect(
        &self,
        instance: &InstanceDescriptor,
        _credentials: &StoreCredentials,
    ) -> Result<Box<dyn StoreSession>, StoreError> {
        self.log.lock().unwrap().push(format!("connect:{}", instance.name));
        if self.behaviour.refuse_connect {
            return Err(StoreError::Rejected("could not connect to server".into()));
        }
        Ok(Box::new(FakeSession {
            behaviour: self.behaviour.clone(),
            log: self.log.clone(),
        }))
    }
}

#[async_trait]
impl StoreSession for FakeSession {
    async fn apply_setting(&mut self, _statement: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn set_client_info(&mut self, blob: &str) -> Result<(), StoreError> {
        self.log.lock().unwrap().push(format!("client_info:{blob}"));
        if self.behaviour.reject_binding {
            return Err(StoreError::Rejected("permission denied".into()));
        }
        Ok(())
    }

    async fn set_client_identifier(&mut self, identifier: &str) -> Result<(), StoreError> {
        self.log.lock().unwrap().push(format!("identifier:{identifier}"));
        if self.behaviour.reject_binding {
            return Err(StoreError::Rejected("permission denied".into()));
        }
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<ResultSet, StoreError> {
        if self.behaviour.fail_execute {
            return Err(StoreError::Rejected("relation \"employees\" does not exist".into()));
        }
        if statement.sql.starts_with("SELECT 1") {
            return Ok(ResultSet {
                columns: vec!["ok".into()],
                rows: vec![vec![SqlValue::Int(1)]],
                rows_affected: 1,
            });
        }
        let hired = chrono::NaiveDate::from_ymd_opt(2023, 5, 14)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Ok(ResultSet {
            columns: vec![
                "employee_id".into(),
                "first_name".into(),
                "salary".into(),
                "hire_date".into(),
            ],
            rows: vec![vec![
                SqlValue::Int(101),
                SqlValue::Text("Ada".into()),
                SqlValue::Float(91234.567),
                SqlValue::Timestamp(hired),
            ]],
            rows_affected: 1,
        })
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.log.lock().unwrap().push("close".into());
        Ok(())
    }
}

/// Always stays on the preferred instance.
struct NoOverflow;

impl RandomSource for NoOverflow {
    fn next_float(&self) -> f64 {
        0.5
    }
}

fn instance(name: &str, tier: Tier, workload_type: WorkloadType, weight: f64) -> InstanceDescriptor {
    InstanceDescriptor {
        name: name.into(),
        host: "localhost".into(),
        port: 5432,
        service: "hr".into(),
        tier,
        workload_type,
        max_connections: 10,
        routing_weight: weight,
    }
}

fn config() -> CorrelateConfig {
    CorrelateConfig {
        service: ServiceConfig::default(),
        http: HttpConfig::default(),
        store: StoreCredentials::default(),
        instances: vec![
            instance("primary", Tier::Production, WorkloadType::Oltp, 0.6),
            instance("analytics", Tier::Analytics, WorkloadType::Dss, 0.25),
            instance("reporting", Tier::Reporting, WorkloadType::Reporting, 0.15),
        ],
        routing: RoutingConfig::default(),
        binding: BindingConfig::default(),
        tuning: TuningConfig::default(),
        execution: ExecutionConfig::default(),
    }
}

fn make_state(behaviour: Behaviour) -> (Arc<HttpState>, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(FakeStore {
        behaviour,
        log: log.clone(),
    });
    let pipeline = Pipeline::new(Arc::new(config()), store, Arc::new(NoOverflow)).unwrap();
    (Arc::new(HttpState { pipeline }), log)
}

async fn send(state: Arc<HttpState>, req: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let resp = build_router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let header = resp
        .headers()
        .get("x-correlation-id")
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, header, serde_json::from_slice(&body).unwrap())
}

// ===========================================================================
// TEST 1: GET /api/employees with explicit correlation id
// ===========================================================================
#[tokio::test]
async fn test_employees_echo_explicit_correlation_id() {
    let (state, log) = make_state(Behaviour::default());
    let req = Request::builder()
        .uri("/api/employees")
        .header("x-correlation-id", "abc-123")
        .body(Body::empty())
        .unwrap();

    let (status, header, body) = send(state, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header.as_deref(), Some("abc-123"));
    assert_eq!(body["correlation_id"], "abc-123");
    assert_eq!(body["query_type"], "employees_list");
    assert_eq!(body["count"], 1);
    assert_eq!(body["employees"][0]["salary"], 91234.57);
    assert_eq!(body["employees"][0]["hire_date"], "2023-05-14T00:00:00");

    let obs = &body["observability"];
    assert_eq!(obs["user_action"], "employees");
    assert_eq!(obs["sql_executed"], true);
    assert_eq!(obs["table"], "employees");
    assert_eq!(obs["correlation_method"], "client_info");
    assert_eq!(obs["instance"], "primary");
    assert_eq!(obs["overflowed"], false);

    let log = log.lock().unwrap();
    assert!(log.contains(&"identifier:abc-123".to_string()));
    assert_eq!(log.last().unwrap(), "close");
}

// ===========================================================================
// TEST 2: traceparent wins over x-correlation-id
// ===========================================================================
#[tokio::test]
async fn test_traceparent_derives_rum_correlation_id() {
    let (state, log) = make_state(Behaviour::default());
    let req = Request::builder()
        .uri("/api/analytics/salary-stats")
        .header("traceparent", TRACEPARENT)
        .header("x-correlation-id", "ignored")
        .header("x-user-action", "dashboard-load")
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(state, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["correlation_id"], "rum-4bf92f3577b3-00f067aa");
    assert_eq!(body["observability"]["user_action"], "dashboard-load");
    assert_eq!(body["observability"]["instance"], "analytics");
    assert_eq!(body["observability"]["workload"], "analytics");

    let log = log.lock().unwrap();
    let client_info = log.iter().find(|e| e.starts_with("client_info:")).unwrap();
    assert!(client_info.contains("otel_span=00f067aa0ba902b7"), "{client_info}");
    assert!(client_info.contains("correlation=rum-4bf92f3577b3-00f067aa"));
}

// ===========================================================================
// TEST 3: no headers → generated api- id
// ===========================================================================
#[tokio::test]
async fn test_missing_headers_generate_api_id() {
    let (state, _) = make_state(Behaviour::default());
    let req = Request::builder()
        .uri("/api/slow-query")
        .body(Body::empty())
        .unwrap();

    let (status, header, body) = send(state, req).await;
    assert_eq!(status, StatusCode::OK);
    let id = body["correlation_id"].as_str().unwrap();
    assert!(id.starts_with("api-"), "{id}");
    assert_eq!(header.as_deref(), Some(id));
    assert_eq!(body["observability"]["instance"], "reporting");
    assert_eq!(body["observability"]["user_action"], "slow-query");
}

// ===========================================================================
// TEST 4: both binding channels fail → still 200, degraded method
// ===========================================================================
#[tokio::test]
async fn test_binding_failure_is_invisible_except_method() {
    let (state, _) = make_state(Behaviour {
        reject_binding: true,
        ..Default::default()
    });
    let req = Request::builder()
        .uri("/api/employees/high-salary")
        .header("x-correlation-id", "abc-123")
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(state, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["threshold"], 60000);
    assert_eq!(body["observability"]["sql_executed"], true);
    assert_eq!(body["observability"]["correlation_method"], "degraded");
}

// ===========================================================================
// TEST 5: connection failure → 503 naming the instance
// ===========================================================================
#[tokio::test]
async fn test_connection_failure_returns_503() {
    let (state, _) = make_state(Behaviour {
        refuse_connect: true,
        ..Default::default()
    });
    let req = Request::builder()
        .uri("/api/complex-query")
        .header("x-correlation-id", "abc-123")
        .body(Body::empty())
        .unwrap();

    let (status, header, body) = send(state, req).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(header.as_deref(), Some("abc-123"));
    assert_eq!(body["status"], "error");
    assert_eq!(body["instance"], "analytics");
    assert!(body["error"].as_str().unwrap().contains("could not connect"));
}

// ===========================================================================
// TEST 6: execution failure → 500 with store message, connection closed
// ===========================================================================
#[tokio::test]
async fn test_execution_failure_returns_500() {
    let (state, log) = make_state(Behaviour {
        fail_execute: true,
        ..Default::default()
    });
    let (status, body) = employees_inner(&state.pipeline, &RequestHeaders::default()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("does not exist"));
    assert!(body["correlation_id"].as_str().unwrap().starts_with("api-"));
    assert_eq!(log.lock().unwrap().last().unwrap(), "close");
}

// ===========================================================================
// TEST 7: POST /api/employees fills missing fields
// ===========================================================================
#[tokio::test]
async fn test_create_employee() {
    let (state, _) = make_state(Behaviour::default());
    let req = Request::builder()
        .method("POST")
        .uri("/api/employees")
        .header("content-type", "application/json")
        .body(Body::from(json!({"first_name": "Ada"}).to_string()))
        .unwrap();

    let (status, _, body) = send(state, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query_type"], "employee_insert");
    assert!(body["employee"].is_object());
    assert_eq!(body["observability"]["workload"], "crud");
    assert_eq!(body["observability"]["user_action"], "create-employee");
}

// ===========================================================================
// TEST 8: health
// ===========================================================================
#[tokio::test]
async fn test_health_reports_store_status() {
    let (state, _) = make_state(Behaviour::default());
    let (status, body) = health_inner(&state.pipeline, &RequestHeaders::default()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["observability"]["instance"], "reporting");

    let (state, _) = make_state(Behaviour {
        refuse_connect: true,
        ..Default::default()
    });
    let (status, body) = health_inner(&state.pipeline, &RequestHeaders::default()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert!(body["error"].is_string());
}

// ===========================================================================
// TEST 9: version and banner need no store
// ===========================================================================
#[tokio::test]
async fn test_version_endpoint() {
    let (state, log) = make_state(Behaviour::default());
    let req = Request::builder()
        .uri("/version")
        .body(Body::empty())
        .unwrap();

    let (status, header, body) = send(state, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(header.is_none());
    assert_eq!(body["protocol"], "correlate/1");
    assert!(log.lock().unwrap().is_empty());
}
