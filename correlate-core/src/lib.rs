pub mod config;
pub mod correlation;
pub mod db;
pub mod error;
pub mod executor;
pub mod models;
pub mod pipeline;
pub mod routing;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod trace;
pub mod workload;

pub use config::CorrelateConfig;
pub use correlation::{CorrelationContext, CorrelationResolver, CorrelationSource};
pub use error::{CorrelateError, StoreError};
pub use models::{InstanceDescriptor, SqlValue, Tier, WorkloadType};
pub use pipeline::{OperationFailure, OperationOutcome, OperationRequest, Pipeline};
pub use routing::{InstanceRouter, RandomSource, RoutingDecision, SeededRandom, ThreadRandom};
pub use session::{BindReport, CorrelationMethod, SessionOutcome};
pub use store::{ResultSet, Statement, StoreConnector, StoreSession};
pub use trace::{RequestHeaders, TraceIds};
pub use workload::{classify, WorkloadCategory};
