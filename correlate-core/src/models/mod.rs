pub mod instance;
pub mod value;

pub use instance::{InstanceDescriptor, Tier, WorkloadType};
pub use value::SqlValue;
