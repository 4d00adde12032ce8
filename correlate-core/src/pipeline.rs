//! Per-operation pipeline.
//!
//! ```text
//! RESOLVE_CORRELATION -> CLASSIFY -> ROUTE -> ACQUIRE_CONNECTION
//!   -> CONFIGURE_SESSION -> BIND_CONTEXT -> EXECUTE -> RELEASE_CONNECTION -> RESPOND
//! ```
//!
//! Only ACQUIRE_CONNECTION and EXECUTE can end in FAIL. Tuning and binding
//! return [`SessionOutcome`] rather than `Result`, so a side-channel problem
//! can never be reported as, or hide, an execution failure. Each side-channel
//! write has its own deadline; the statement deadline covers EXECUTE only.
//! Expiry while acquiring or executing is an execution failure. A session
//! that was opened is closed on every path, including deadline expiry.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::timeout;

use crate::config::CorrelateConfig;
use crate::correlation::{CorrelationContext, CorrelationResolver};
use crate::error::CorrelateError;
use crate::executor::{execute_statement, Record};
use crate::models::InstanceDescriptor;
use crate::routing::{InstanceRouter, RandomSource, RoutingDecision};
use crate::session::{bind_context, configure_session, BindReport, SessionOutcome};
use crate::store::{Statement, StoreConnector, StoreSession};
use crate::telemetry::{self, SpanRecorder};
use crate::trace::RequestHeaders;
use crate::workload::classify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveCorrelation,
    Classify,
    Route,
    AcquireConnection,
    ConfigureSession,
    BindContext,
    Execute,
    ReleaseConnection,
    Respond,
    Fail,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolveCorrelation => "RESOLVE_CORRELATION",
            Stage::Classify => "CLASSIFY",
            Stage::Route => "ROUTE",
            Stage::AcquireConnection => "ACQUIRE_CONNECTION",
            Stage::ConfigureSession => "CONFIGURE_SESSION",
            Stage::BindContext => "BIND_CONTEXT",
            Stage::Execute => "EXECUTE",
            Stage::ReleaseConnection => "RELEASE_CONNECTION",
            Stage::Respond => "RESPOND",
            Stage::Fail => "FAIL",
        };
        f.write_str(name)
    }
}

/// A logical operation to run through the pipeline.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    /// Logical name used for workload classification, e.g. `employees.list`.
    pub operation: String,
    /// Table reported in the response envelope.
    pub table: String,
    /// Replaces an `"unknown"` user action.
    pub default_user_action: String,
    pub statement: Statement,
}

#[derive(Debug)]
pub struct OperationOutcome {
    pub correlation: CorrelationContext,
    pub routing: RoutingDecision,
    pub table: String,
    pub records: Vec<Record>,
    pub rows_affected: u64,
    pub tuning: SessionOutcome,
    pub binding: BindReport,
}

impl OperationOutcome {
    /// The `observability` object of the response envelope.
    pub fn observability(&self) -> Value {
        json!({
            "user_action": self.correlation.user_action,
            "sql_executed": true,
            "table": self.table,
            "correlation_method": self.binding.correlation_method().as_str(),
            "instance": self.routing.resolved_instance,
            "workload": self.routing.category.as_str(),
            "overflowed": self.routing.overflowed,
        })
    }
}

/// A fatal failure, still carrying the correlation for the error response.
#[derive(Debug)]
pub struct OperationFailure {
    pub correlation: CorrelationContext,
    pub routing: Option<RoutingDecision>,
    pub error: CorrelateError,
}

pub struct Pipeline {
    config: Arc<CorrelateConfig>,
    router: InstanceRouter,
    resolver: CorrelationResolver,
    connector: Arc<dyn StoreConnector>,
}

impl Pipeline {
    /// Validates `config` before building the router.
    pub fn new(
        config: Arc<CorrelateConfig>,
        connector: Arc<dyn StoreConnector>,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, CorrelateError> {
        config.validate()?;
        let router = InstanceRouter::new(&config, random)?;
        Ok(Self {
            config,
            router,
            resolver: CorrelationResolver::new(),
            connector,
        })
    }

    pub fn config(&self) -> &CorrelateConfig {
        &self.config
    }

    /// Resolve a correlation context without touching the store.
    pub fn correlate(&self, headers: &RequestHeaders, default_user_action: &str) -> CorrelationContext {
        self.resolver
            .resolve(headers)
            .with_default_user_action(default_user_action)
    }

    pub async fn run(
        &self,
        request: OperationRequest,
        headers: &RequestHeaders,
        span: &dyn SpanRecorder,
    ) -> Result<OperationOutcome, OperationFailure> {
        let correlation = self.correlate(headers, &request.default_user_action);
        trace_stage(Stage::ResolveCorrelation, &correlation);
        span.set_attribute(telemetry::CORRELATION_ID, correlation.correlation_id.as_str().into());
        span.set_attribute(
            telemetry::CORRELATION_SOURCE,
            format!("{:?}", correlation.source).to_uppercase().into(),
        );
        span.set_attribute(telemetry::USER_ACTION, correlation.user_action.as_str().into());
        span.set_attribute(telemetry::DATABASE_TABLE, request.table.as_str().into());

        let category = classify(&request.operation);
        trace_stage(Stage::Classify, &correlation);
        span.set_attribute(telemetry::WORKLOAD_CATEGORY, category.as_str().into());

        let (routing, instance) = self.router.resolve(category);
        trace_stage(Stage::Route, &correlation);
        span.set_attribute(telemetry::DB_INSTANCE, instance.name.as_str().into());
        span.set_attribute(telemetry::ROUTING_OVERFLOWED, routing.overflowed.into());
        tracing::info!(
            correlation_id = %correlation.correlation_id,
            operation = %request.operation,
            workload = %category,
            preferred = %routing.preferred_instance,
            instance = %routing.resolved_instance,
            overflowed = routing.overflowed,
            "Routed operation"
        );

        trace_stage(Stage::AcquireConnection, &correlation);
        let mut session = match self.acquire(instance).await {
            Ok(session) => session,
            Err(error) => return Err(self.fail(correlation, Some(routing), error, span)),
        };

        let (tuning, binding, executed) = self
            .prepare_and_execute(session.as_mut(), instance, &correlation, &request.statement)
            .await;

        trace_stage(Stage::ReleaseConnection, &correlation);
        if let Err(e) = session.close().await {
            tracing::warn!(instance = %instance.name, error = %e, "Failed to close store session");
        }

        span.set_attribute(
            telemetry::CORRELATION_METHOD,
            binding.correlation_method().as_str().into(),
        );

        let (records, rows_affected) = match executed {
            Ok(done) => done,
            Err(error) => return Err(self.fail(correlation, Some(routing), error, span)),
        };

        trace_stage(Stage::Respond, &correlation);
        span.set_attribute(telemetry::RECORD_COUNT, (records.len() as i64).into());
        span.set_attribute(telemetry::STATUS, "OK".into());

        Ok(OperationOutcome {
            correlation,
            routing,
            table: request.table,
            records,
            rows_affected,
            tuning,
            binding,
        })
    }

    async fn acquire(
        &self,
        instance: &InstanceDescriptor,
    ) -> Result<Box<dyn StoreSession>, CorrelateError> {
        let deadline = self.config.execution.connect_timeout();
        match timeout(deadline, self.connector.connect(instance, &self.config.store)).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => Err(CorrelateError::ConnectionFailure {
                instance: instance.name.clone(),
                message: e.to_string(),
            }),
            Err(_) => Err(deadline_exceeded(instance, self.config.execution.connect_timeout_ms)),
        }
    }

    async fn prepare_and_execute(
        &self,
        session: &mut dyn StoreSession,
        instance: &InstanceDescriptor,
        correlation: &CorrelationContext,
        statement: &Statement,
    ) -> (
        SessionOutcome,
        BindReport,
        Result<(Vec<Record>, u64), CorrelateError>,
    ) {
        let execution = &self.config.execution;

        trace_stage(Stage::ConfigureSession, correlation);
        let tuning = configure_session(
            session,
            instance,
            &self.config.tuning,
            execution.session_write_timeout(),
        )
        .await;

        trace_stage(Stage::BindContext, correlation);
        let binding = bind_context(
            session,
            instance,
            correlation,
            &self.config.binding,
            execution.session_write_timeout(),
        )
        .await;

        trace_stage(Stage::Execute, correlation);
        let executed = match timeout(
            execution.statement_timeout(),
            execute_statement(session, instance, statement),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(deadline_exceeded(instance, execution.statement_timeout_ms)),
        };

        (tuning, binding, executed)
    }

    fn fail(
        &self,
        correlation: CorrelationContext,
        routing: Option<RoutingDecision>,
        error: CorrelateError,
        span: &dyn SpanRecorder,
    ) -> OperationFailure {
        trace_stage(Stage::Fail, &correlation);
        span.set_attribute(telemetry::STATUS, "ERROR".into());
        tracing::error!(
            correlation_id = %correlation.correlation_id,
            error = %error,
            "Operation failed"
        );
        OperationFailure {
            correlation,
            routing,
            error,
        }
    }
}

fn deadline_exceeded(instance: &InstanceDescriptor, millis: u64) -> CorrelateError {
    CorrelateError::ExecutionFailure {
        instance: instance.name.clone(),
        message: format!("deadline of {millis}ms exceeded"),
    }
}

fn trace_stage(stage: Stage, correlation: &CorrelationContext) {
    tracing::debug!(stage = %stage, correlation_id = %correlation.correlation_id, "Pipeline stage");
}
