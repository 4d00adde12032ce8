//! Span attributes, passed explicitly through the call chain.

use tracing::field::Empty;
use tracing::Span;

pub const CORRELATION_ID: &str = "correlation.id";
pub const CORRELATION_SOURCE: &str = "correlation.source";
pub const CORRELATION_METHOD: &str = "correlation.method";
pub const USER_ACTION: &str = "user.action";
pub const WORKLOAD_CATEGORY: &str = "workload.category";
pub const DB_INSTANCE: &str = "db.instance";
pub const ROUTING_OVERFLOWED: &str = "routing.overflowed";
pub const DATABASE_TABLE: &str = "database.table";
pub const RECORD_COUNT: &str = "response.record_count";
pub const STATUS: &str = "otel.status_code";

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Str(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

/// The span API the pipeline writes attributes through.
pub trait SpanRecorder: Send + Sync {
    fn set_attribute(&self, key: &str, value: AttributeValue);
}

/// Records into fields declared by [`operation_span`]. Undeclared keys are
/// dropped by `tracing`.
impl SpanRecorder for Span {
    fn set_attribute(&self, key: &str, value: AttributeValue) {
        match value {
            AttributeValue::Str(s) => self.record(key, s.as_str()),
            AttributeValue::Bool(b) => self.record(key, b),
            AttributeValue::Int(i) => self.record(key, i),
        };
    }
}

/// Span for one correlated operation with every attribute field declared.
pub fn operation_span(operation: &str) -> Span {
    tracing::info_span!(
        "db_operation",
        operation = %operation,
        observability.layer = "api",
        correlation.id = Empty,
        correlation.source = Empty,
        correlation.method = Empty,
        user.action = Empty,
        workload.category = Empty,
        db.instance = Empty,
        routing.overflowed = Empty,
        database.table = Empty,
        response.record_count = Empty,
        otel.status_code = Empty,
    )
}
