//! Best-effort session preparation: workload tuning and context binding.
//!
//! Nothing in this module can fail an operation. Every store error, and every
//! write that outlives its deadline, is logged and folded into
//! [`SessionOutcome::Degraded`].

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;

use crate::config::{BindingConfig, TuningConfig};
use crate::correlation::CorrelationContext;
use crate::error::StoreError;
use crate::models::{InstanceDescriptor, WorkloadType};
use crate::store::StoreSession;

const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// Result of a side-channel session write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Applied,
    Degraded(String),
}

impl SessionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, SessionOutcome::Applied)
    }
}

/// Run one side-channel write under `deadline`.
async fn bounded_write<F>(deadline: Duration, write: F) -> Result<(), String>
where
    F: Future<Output = Result<(), StoreError>>,
{
    match timeout(deadline, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(DEADLINE_EXCEEDED.to_string()),
    }
}

/// Binder channel a reader should trust for joining store activity to traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    ClientInfo,
    SessionIdentifier,
    Degraded,
}

impl CorrelationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientInfo => "client_info",
            Self::SessionIdentifier => "session_identifier",
            Self::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindReport {
    pub client_info: SessionOutcome,
    pub session_identifier: SessionOutcome,
}

impl BindReport {
    pub fn correlation_method(&self) -> CorrelationMethod {
        if self.client_info.is_applied() {
            CorrelationMethod::ClientInfo
        } else if self.session_identifier.is_applied() {
            CorrelationMethod::SessionIdentifier
        } else {
            CorrelationMethod::Degraded
        }
    }
}

// ============================================================================
// Instance session configurator
// ============================================================================

/// Tuning statements for a workload type.
///
/// OLTP favours first-rows latency; DSS and REPORTING favour full-result
/// throughput with larger sort or hash memory respectively.
pub fn tuning_statements(workload: WorkloadType, tuning: &TuningConfig) -> Vec<String> {
    match workload {
        WorkloadType::Oltp => vec!["SET cursor_tuple_fraction = 0.1".to_string()],
        WorkloadType::Dss => vec![
            "SET cursor_tuple_fraction = 1.0".to_string(),
            format!("SET work_mem = '{}'", tuning.sort_work_mem),
        ],
        WorkloadType::Reporting => vec![
            "SET cursor_tuple_fraction = 1.0".to_string(),
            format!("SET hash_mem_multiplier = {}", tuning.hash_mem_multiplier),
        ],
    }
}

/// Apply workload tuning. Every statement is attempted, each under
/// `deadline`; the first failure reason is reported.
pub async fn configure_session(
    session: &mut dyn StoreSession,
    instance: &InstanceDescriptor,
    tuning: &TuningConfig,
    deadline: Duration,
) -> SessionOutcome {
    let mut outcome = SessionOutcome::Applied;
    for statement in tuning_statements(instance.workload_type, tuning) {
        if let Err(reason) = bounded_write(deadline, session.apply_setting(&statement)).await {
            tracing::warn!(
                instance = %instance.name,
                statement = %statement,
                error = %reason,
                "Session tuning rejected, continuing with defaults"
            );
            if outcome.is_applied() {
                outcome = SessionOutcome::Degraded(reason);
            }
        }
    }
    outcome
}

// ============================================================================
// Session context binder
// ============================================================================

/// Structured diagnostic blob. The trace id is shortened when the full blob
/// would exceed `client_info_max_len`.
pub fn client_info_blob(ctx: &CorrelationContext, limits: &BindingConfig) -> String {
    let blob = format_blob(&ctx.trace_id, ctx);
    if blob.len() <= limits.client_info_max_len {
        return blob;
    }
    let short: String = ctx.trace_id.chars().take(limits.trace_id_max_len).collect();
    format_blob(&short, ctx)
}

fn format_blob(trace_id: &str, ctx: &CorrelationContext) -> String {
    format!(
        "otel_trace={},otel_span={},correlation={},user_action={}",
        trace_id, ctx.span_id, ctx.correlation_id, ctx.user_action
    )
}

/// Write both binding channels, in order, independently of each other.
/// Each write gets its own `deadline`.
pub async fn bind_context(
    session: &mut dyn StoreSession,
    instance: &InstanceDescriptor,
    ctx: &CorrelationContext,
    limits: &BindingConfig,
    deadline: Duration,
) -> BindReport {
    let blob = client_info_blob(ctx, limits);
    let client_info = match bounded_write(deadline, session.set_client_info(&blob)).await {
        Ok(()) => SessionOutcome::Applied,
        Err(reason) => {
            tracing::warn!(
                instance = %instance.name,
                correlation_id = %ctx.correlation_id,
                error = %reason,
                "Failed to bind client info"
            );
            SessionOutcome::Degraded(reason)
        }
    };

    let identifier = bounded_write(deadline, session.set_client_identifier(&ctx.correlation_id));
    let session_identifier = match identifier.await {
        Ok(()) => SessionOutcome::Applied,
        Err(reason) => {
            tracing::warn!(
                instance = %instance.name,
                correlation_id = %ctx.correlation_id,
                error = %reason,
                "Failed to bind session identifier"
            );
            SessionOutcome::Degraded(reason)
        }
    };

    BindReport {
        client_info,
        session_identifier,
    }
}
