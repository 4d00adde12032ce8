//! PostgreSQL implementation of the store collaborator.
//!
//! One unpooled `PgConnection` per operation. Binding channels:
//! - client info: custom setting `correlate.client_info`
//! - session identifier: `application_name`, visible in `pg_stat_activity`
//!
//! NUMERIC columns are not decoded; statements cast aggregates to `float8`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Postgres, Row, TypeInfo, ValueRef};

use crate::config::StoreCredentials;
use crate::error::StoreError;
use crate::models::{InstanceDescriptor, SqlValue};
use crate::store::{ResultSet, Statement, StoreConnector, StoreSession};

pub const CLIENT_INFO_SETTING: &str = "correlate.client_info";

#[derive(Debug, Default, Clone, Copy)]
pub struct PgConnector;

#[async_trait]
impl StoreConnector for PgConnector {
    async fn connect(
        &self,
        instance: &InstanceDescriptor,
        credentials: &StoreCredentials,
    ) -> Result<Box<dyn StoreSession>, StoreError> {
        let options = PgConnectOptions::new()
            .host(&instance.host)
            .port(instance.port)
            .database(&instance.service)
            .username(&credentials.user)
            .password(&credentials.password)
            .application_name("correlate");
        let conn = PgConnection::connect_with(&options).await?;
        Ok(Box::new(PgSession { conn }))
    }
}

pub struct PgSession {
    conn: PgConnection,
}

#[async_trait]
impl StoreSession for PgSession {
    async fn apply_setting(&mut self, statement: &str) -> Result<(), StoreError> {
        sqlx::query(statement).execute(&mut self.conn).await?;
        Ok(())
    }

    async fn set_client_info(&mut self, blob: &str) -> Result<(), StoreError> {
        sqlx::query("SELECT set_config($1, $2, false)")
            .bind(CLIENT_INFO_SETTING)
            .bind(blob)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn set_client_identifier(&mut self, identifier: &str) -> Result<(), StoreError> {
        sqlx::query("SELECT set_config('application_name', $1, false)")
            .bind(identifier)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<ResultSet, StoreError> {
        let query = statement
            .params
            .iter()
            .fold(sqlx::query(&statement.sql), bind_value);
        let rows = query.fetch_all(&mut self.conn).await?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let decoded = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;

        Ok(ResultSet {
            columns,
            rows_affected: decoded.len() as u64,
            rows: decoded,
        })
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.conn.close().await?;
        Ok(())
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Date(d) => query.bind(*d),
        SqlValue::Timestamp(ts) => query.bind(*ts),
        SqlValue::TimestampTz(ts) => query.bind(*ts),
    }
}

fn decode_row(row: &PgRow) -> Result<Vec<SqlValue>, StoreError> {
    row.columns()
        .iter()
        .map(|column| {
            let i = column.ordinal();
            if row.try_get_raw(i)?.is_null() {
                return Ok(SqlValue::Null);
            }
            let value = match column.type_info().name() {
                "BOOL" => SqlValue::Bool(row.try_get(i)?),
                "INT2" => SqlValue::Int(row.try_get::<i16, _>(i)? as i64),
                "INT4" => SqlValue::Int(row.try_get::<i32, _>(i)? as i64),
                "INT8" => SqlValue::Int(row.try_get(i)?),
                "FLOAT4" => SqlValue::Float(row.try_get::<f32, _>(i)? as f64),
                "FLOAT8" => SqlValue::Float(row.try_get(i)?),
                "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => SqlValue::Text(row.try_get(i)?),
                "DATE" => SqlValue::Date(row.try_get::<NaiveDate, _>(i)?),
                "TIMESTAMP" => SqlValue::Timestamp(row.try_get::<NaiveDateTime, _>(i)?),
                "TIMESTAMPTZ" => SqlValue::TimestampTz(row.try_get::<DateTime<Utc>, _>(i)?),
                other => {
                    return Err(StoreError::UnsupportedType {
                        column: column.name().to_string(),
                        type_name: other.to_string(),
                    })
                }
            };
            Ok(value)
        })
        .collect()
}

/// Connect to `instance`, return its server version, close.
pub async fn health_check(
    connector: &dyn StoreConnector,
    instance: &InstanceDescriptor,
    credentials: &StoreCredentials,
) -> Result<String, StoreError> {
    let mut session = connector.connect(instance, credentials).await?;
    let result = session.execute(&Statement::new("SELECT version()")).await;
    if let Err(e) = session.close().await {
        tracing::debug!(instance = %instance.name, error = %e, "Close after health check failed");
    }

    match result?.rows.first().and_then(|row| row.first()) {
        Some(SqlValue::Text(version)) => Ok(version.clone()),
        _ => Err(StoreError::Rejected("health check returned no version".into())),
    }
}
