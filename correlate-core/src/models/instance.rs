use serde::{Deserialize, Serialize};

/// Deployment tier of a store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Production,
    Analytics,
    Reporting,
}

/// Declared workload profile, drives session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkloadType {
    Oltp,
    Dss,
    Reporting,
}

/// Static description of one store instance. Loaded once from config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Database / service name to connect to.
    pub service: String,
    pub tier: Tier,
    pub workload_type: WorkloadType,
    pub max_connections: u32,
    /// Share of overflow traffic, in `[0, 1]`.
    pub routing_weight: f64,
}
