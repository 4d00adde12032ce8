//! Runs the business statement and maps rows into JSON records.

use chrono::SecondsFormat;
use serde_json::{Map, Value};

use crate::error::CorrelateError;
use crate::models::{InstanceDescriptor, SqlValue};
use crate::store::{ResultSet, Statement, StoreSession};

/// One result row, field name to value, in select-list order.
pub type Record = Map<String, Value>;

/// Execute `statement` on an already prepared session.
pub async fn execute_statement(
    session: &mut dyn StoreSession,
    instance: &InstanceDescriptor,
    statement: &Statement,
) -> Result<(Vec<Record>, u64), CorrelateError> {
    let result = session
        .execute(statement)
        .await
        .map_err(|e| CorrelateError::ExecutionFailure {
            instance: instance.name.clone(),
            message: e.to_string(),
        })?;

    tracing::debug!(
        instance = %instance.name,
        rows = result.rows.len(),
        rows_affected = result.rows_affected,
        "Statement executed"
    );

    let affected = result.rows_affected;
    Ok((map_records(&result), affected))
}

pub fn map_records(result: &ResultSet) -> Vec<Record> {
    result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .zip(row)
                .map(|(name, value)| (name.clone(), to_json(value)))
                .collect()
        })
        .collect()
}

/// Temporal values become ISO-8601 strings, floats are rounded to cents.
pub fn to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Int(i) => Value::from(*i),
        SqlValue::Float(f) => Value::from(round2(*f)),
        SqlValue::Text(s) => Value::String(s.clone()),
        SqlValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        SqlValue::Timestamp(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        SqlValue::TimestampTz(ts) => {
            Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
