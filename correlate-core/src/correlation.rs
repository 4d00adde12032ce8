//! Correlation identifier resolution.
//!
//! One [`CorrelationContext`] is produced per inbound operation using a fixed
//! fallback chain, first match wins:
//!
//! 1. valid non-zero trace id: `rum-<trace[..12]>-<span[..8]>`
//! 2. vendor RUM header with at least four segments: `rum-<segment[1][..12]>`
//! 3. explicit `x-correlation-id`, verbatim
//! 4. generated `api-<ISO-8601 timestamp>`

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::trace::{RequestHeaders, TraceIds, UNKNOWN};

/// Which branch of the fallback chain produced the correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrelationSource {
    Trace,
    Header,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelationContext {
    pub correlation_id: String,
    pub trace_id: String,
    pub span_id: String,
    pub user_action: String,
    pub source: CorrelationSource,
}

impl CorrelationContext {
    /// Replace an `"unknown"` user action with an endpoint default. The
    /// correlation id is never touched.
    pub fn with_default_user_action(mut self, default: &str) -> Self {
        if self.user_action == UNKNOWN {
            self.user_action = default.to_string();
        }
        self
    }
}

/// Resolves correlation contexts. Holds the last generated timestamp so that
/// `api-` ids stay unique and increasing within the process.
#[derive(Debug, Default)]
pub struct CorrelationResolver {
    last_generated_micros: AtomicI64,
}

impl CorrelationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, headers: &RequestHeaders) -> CorrelationContext {
        let ids = TraceIds::from_headers(headers);
        let user_action = headers
            .user_action
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();

        let (correlation_id, source) = match resolve_from_headers(headers, &ids) {
            Some(found) => found,
            None => (self.generate(), CorrelationSource::Generated),
        };

        CorrelationContext {
            correlation_id,
            trace_id: ids.trace_id,
            span_id: ids.span_id,
            user_action,
            source,
        }
    }

    fn generate(&self) -> String {
        let now = Utc::now().timestamp_micros();
        let mut last = self.last_generated_micros.load(Ordering::Relaxed);
        let issued = loop {
            let next = now.max(last + 1);
            match self.last_generated_micros.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break next,
                Err(current) => last = current,
            }
        };

        let stamp = DateTime::from_timestamp_micros(issued)
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        format!("api-{stamp}")
    }
}

/// The deterministic branches (1-3) of the fallback chain.
fn resolve_from_headers(
    headers: &RequestHeaders,
    ids: &TraceIds,
) -> Option<(String, CorrelationSource)> {
    if ids.has_valid_trace() {
        let id = format!("rum-{}-{}", prefix(&ids.trace_id, 12), prefix(&ids.span_id, 8));
        return Some((id, CorrelationSource::Trace));
    }

    if let Some(rum) = headers.rum_traceparent.as_deref() {
        let segments: Vec<&str> = rum.split('-').collect();
        if segments.len() >= 4 {
            return Some((format!("rum-{}", prefix(segments[1], 12)), CorrelationSource::Trace));
        }
    }

    headers
        .correlation_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(|id| (id.to_string(), CorrelationSource::Header))
}

fn prefix(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}
