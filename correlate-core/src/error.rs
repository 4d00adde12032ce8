use thiserror::Error;

/// Fatal failures of a correlated operation.
///
/// Only connection and execution failures abort an operation. Session tuning
/// and context binding problems are reported as
/// [`SessionOutcome::Degraded`](crate::session::SessionOutcome) instead.
#[derive(Error, Debug)]
pub enum CorrelateError {
    #[error("Connection to instance '{instance}' failed: {message}")]
    ConnectionFailure { instance: String, message: String },

    #[error("Execution on instance '{instance}' failed: {message}")]
    ExecutionFailure { instance: String, message: String },

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CorrelateError {
    /// Name of the store instance the failure is attributed to, if any.
    pub fn instance(&self) -> Option<&str> {
        match self {
            Self::ConnectionFailure { instance, .. } | Self::ExecutionFailure { instance, .. } => {
                Some(instance)
            }
            _ => None,
        }
    }
}

/// Errors raised by a [`StoreConnector`](crate::store::StoreConnector) or
/// [`StoreSession`](crate::store::StoreSession).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unsupported column type '{type_name}' for column '{column}'")]
    UnsupportedType { column: String, type_name: String },

    #[error("{0}")]
    Rejected(String),
}
