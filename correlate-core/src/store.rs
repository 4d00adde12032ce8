//! Collaborator interface to the relational store.
//!
//! A [`StoreConnector`] leases one [`StoreSession`] per operation. Sessions
//! are never shared or reused: the pipeline closes every session it opens.

use async_trait::async_trait;

use crate::config::StoreCredentials;
use crate::error::StoreError;
use crate::models::{InstanceDescriptor, SqlValue};

/// A parameterized statement. Placeholders follow the store's syntax
/// (`$1`, `$2`, ... for PostgreSQL).
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// Rows returned by a statement, columns in select-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    pub rows_affected: u64,
}

#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(
        &self,
        instance: &InstanceDescriptor,
        credentials: &StoreCredentials,
    ) -> Result<Box<dyn StoreSession>, StoreError>;
}

#[async_trait]
pub trait StoreSession: Send {
    /// Run a session tuning statement.
    async fn apply_setting(&mut self, statement: &str) -> Result<(), StoreError>;

    /// Write the structured diagnostic blob into session state.
    async fn set_client_info(&mut self, blob: &str) -> Result<(), StoreError>;

    /// Write the plain session identifier into session state.
    async fn set_client_identifier(&mut self, identifier: &str) -> Result<(), StoreError>;

    async fn execute(&mut self, statement: &Statement) -> Result<ResultSet, StoreError>;

    async fn close(self: Box<Self>) -> Result<(), StoreError>;
}
